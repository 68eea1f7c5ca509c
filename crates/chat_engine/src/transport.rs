use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::protocol::ServerEvent;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::channel::ChannelHandle;

/// Running websocket link behind a [`ChannelHandle`]. Does not reconnect.
pub struct RelayConnection {
    handle: Arc<ChannelHandle>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RelayConnection {
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
        self.handle.close();
    }
}

/// `http(s)://host/relay` + `direct` -> `ws(s)://host/relay/direct`.
pub fn relay_endpoint(relay_url: &str, handle: &ChannelHandle) -> Result<Url> {
    let mut url = Url::parse(relay_url).with_context(|| format!("invalid relay url: {relay_url}"))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(anyhow!("unsupported relay url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot use scheme {scheme} for {relay_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("relay url cannot be a base: {relay_url}"))?
        .pop_if_empty()
        .push(handle.kind().path_segment());
    Ok(url)
}

pub async fn connect_websocket(handle: Arc<ChannelHandle>, relay_url: &str) -> Result<RelayConnection> {
    let endpoint = relay_endpoint(relay_url, &handle)?;
    let (ws_stream, _) = connect_async(endpoint.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {endpoint}"))?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let mut outbound = handle.open();
    let writer = tokio::spawn(async move {
        while let Some(request) = outbound.recv().await {
            let text = match serde_json::to_string(&request) {
                Ok(text) => text,
                Err(err) => {
                    warn!("channel: failed to encode outbound frame: {err}");
                    continue;
                }
            };
            if let Err(err) = ws_writer.send(Message::Text(text)).await {
                warn!("channel: websocket send failed: {err}");
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    let reader_handle = Arc::clone(&handle);
    let reader = tokio::spawn(async move {
        while let Some(frame) = ws_reader.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => reader_handle.deliver(event),
                    Err(err) => warn!("channel: skipping malformed frame: {err}"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!("channel: websocket receive failed: {err}");
                    break;
                }
            }
        }
        info!(kind = ?reader_handle.kind(), "channel: websocket reader finished");
        reader_handle.close();
    });

    Ok(RelayConnection {
        handle,
        reader,
        writer,
    })
}
