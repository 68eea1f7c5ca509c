use std::sync::Arc;

use anyhow::Result;
use chat_engine::{
    connect_websocket, load_settings, ChannelHandle, ChatSession, Credentials, HistoryApi,
    HttpHistoryApi, MissingHistoryApi, SessionEvent, StaticIdentity,
};
use clap::{Parser, ValueEnum};
use shared::domain::{Message, MessageStatus, RelayKind, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Direct,
    Public,
    Group,
}

impl From<Kind> for RelayKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Direct => RelayKind::Direct,
            Kind::Public => RelayKind::Public,
            Kind::Group => RelayKind::Group,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    counterpart: String,
    #[arg(long, value_enum, default_value_t = Kind::Direct)]
    kind: Kind,
    /// Overrides `relay_url` from chat.toml / environment.
    #[arg(long)]
    relay_url: Option<String>,
    /// Overrides `history_url` from chat.toml / environment.
    #[arg(long)]
    history_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(relay_url) = args.relay_url {
        settings.relay_url = relay_url;
    }
    if let Some(history_url) = args.history_url {
        settings.history_url = history_url;
    }

    let channel = ChannelHandle::new(args.kind.into());
    let connection = connect_websocket(Arc::clone(&channel), &settings.relay_url).await?;
    let history: Arc<dyn HistoryApi> = if settings.history_url.is_empty() {
        warn!("history_url is empty; older messages will not load");
        Arc::new(MissingHistoryApi)
    } else {
        Arc::new(HttpHistoryApi::new(&settings.history_url)?)
    };
    let identity = StaticIdentity(Some(Credentials {
        user_id: UserId::new(args.user_id),
        email: args.email,
    }));

    let session = ChatSession::mount(
        Arc::clone(&channel),
        history,
        &identity,
        UserId::new(args.counterpart),
        settings,
    )
    .await?;
    info!(relay = %session.settings().relay_url, "connected; type /help for commands");

    let printer = {
        let session = Arc::clone(&session);
        let mut events = BroadcastStream::new(session.subscribe_events());
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => print_event(&session, event).await,
                    Err(err) => warn!("event stream lagged: {err}"),
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/help", _) => {
                println!("/older  /login  /retry  /switch <user>  /quit; anything else is sent");
            }
            ("/older", _) => {
                if !session.request_older_page().await {
                    println!("(no older page to load)");
                }
            }
            ("/login", _) => session.login().await,
            ("/retry", _) => {
                for message in session.messages().await {
                    if message.status != MessageStatus::Failed {
                        continue;
                    }
                    if let Some(correlation_id) = message.correlation_id {
                        if let Err(err) = session.retry_send(&correlation_id).await {
                            println!("retry failed: {err}");
                        }
                    }
                }
            }
            ("/switch", counterpart) if !counterpart.is_empty() => {
                session
                    .switch_counterpart(UserId::from(counterpart.trim()))
                    .await;
            }
            _ if line.is_empty() => {}
            _ => {
                session.on_composer_input(line).await;
                if let Err(err) = session.send_message(line).await {
                    println!("not sent: {err}");
                }
            }
        }
    }

    session.unmount().await;
    printer.abort();
    connection.shutdown();
    Ok(())
}

async fn print_event(session: &ChatSession, event: SessionEvent) {
    match event {
        SessionEvent::ConnectionChanged(state) => println!("* connection: {state:?}"),
        SessionEvent::AuthWarning(warning) => println!("! {warning}; /login to retry"),
        SessionEvent::MessagesChanged { outcome, len } => {
            let messages = session.messages().await;
            if outcome.prepended > 0 {
                println!("* loaded {} older messages ({len} total)", outcome.prepended);
            }
            let fresh = outcome.appended + outcome.inserted;
            for message in messages.iter().skip(messages.len().saturating_sub(fresh)) {
                print_message(message);
            }
        }
        SessionEvent::TypingChanged(true) => println!("* typing..."),
        SessionEvent::TypingChanged(false) => {}
        SessionEvent::HistoryFailed { page, error } => {
            println!("! history page {page} failed: {error}; /older to retry");
        }
        SessionEvent::SendFailed { error, .. } => println!("! send failed: {error}; /retry"),
        SessionEvent::ContextReset(context) => println!("* now chatting {context}"),
        SessionEvent::RelayError(error) => println!("! relay error: {}", error.message),
        SessionEvent::Scroll(_) => {}
    }
}

fn print_message(message: &Message) {
    let who = if message.is_self {
        "me"
    } else {
        message.sender_id.as_str()
    };
    println!(
        "[{}] {who}: {} ({:?})",
        message.timestamp, message.content, message.status
    );
}
