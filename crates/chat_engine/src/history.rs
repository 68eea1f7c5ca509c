//! Paginated access to the external message-history API.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::UserId,
    error::ApiError,
    protocol::{HistoryPageResponse, MessagePayload},
};
use tracing::{info, warn};
use url::Url;

use crate::{error::HistoryFetchError, reconciler::ContextTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub items: Vec<MessagePayload>,
    pub has_more: bool,
    pub page: u32,
}

/// Page 1 is the newest `page_size` messages; higher pages go back in time.
/// No ordering is promised within or across pages.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn fetch_page(
        &self,
        self_id: &UserId,
        counterpart_id: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage, HistoryFetchError>;
}

pub struct MissingHistoryApi;

#[async_trait]
impl HistoryApi for MissingHistoryApi {
    async fn fetch_page(
        &self,
        _self_id: &UserId,
        _counterpart_id: &UserId,
        _page: u32,
        _page_size: u32,
    ) -> Result<HistoryPage, HistoryFetchError> {
        Err(HistoryFetchError::Unavailable)
    }
}

pub struct HttpHistoryApi {
    http: Client,
    messages_url: Url,
}

impl HttpHistoryApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut messages_url =
            Url::parse(base_url).with_context(|| format!("invalid history url: {base_url}"))?;
        messages_url
            .path_segments_mut()
            .map_err(|_| anyhow!("history url cannot be a base: {base_url}"))?
            .pop_if_empty()
            .push("messages");
        Ok(Self {
            http: Client::new(),
            messages_url,
        })
    }
}

#[async_trait]
impl HistoryApi for HttpHistoryApi {
    async fn fetch_page(
        &self,
        self_id: &UserId,
        counterpart_id: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage, HistoryFetchError> {
        let response = self
            .http
            .get(self.messages_url.clone())
            .query(&[
                ("senderId", self_id.as_str().to_string()),
                ("recipientId", counterpart_id.as_str().to_string()),
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ApiError>().await.ok();
            warn!(status = status.as_u16(), page, "history: request rejected");
            return Err(HistoryFetchError::from_status(status.as_u16(), body));
        }

        let body: HistoryPageResponse = response.json().await?;
        Ok(HistoryPage {
            items: body.data,
            has_more: body.has_more,
            page: body.page,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub tag: ContextTag,
    pub page: u32,
    pub page_size: u32,
}

/// Cursor over history pages for one context.
#[derive(Debug)]
pub struct HistoryPager {
    page_size: u32,
    next_page: u32,
    has_more: bool,
    in_flight: Option<PageRequest>,
    last_error: Option<String>,
}

impl HistoryPager {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            next_page: 1,
            has_more: true,
            in_flight: None,
            last_error: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.page_size);
    }

    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> Option<PageRequest> {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Sentinel-driven trigger: visible sentinel, nothing outstanding, more
    /// pages known, and the initial auto-scroll is over.
    pub fn should_trigger(&self, sentinel_visible: bool, initial_phase: bool) -> bool {
        sentinel_visible && self.in_flight.is_none() && self.has_more && !initial_phase
    }

    pub fn begin(&mut self, tag: ContextTag) -> Option<PageRequest> {
        if self.in_flight.is_some() || !self.has_more {
            return None;
        }
        let request = PageRequest {
            tag,
            page: self.next_page,
            page_size: self.page_size,
        };
        self.in_flight = Some(request);
        Some(request)
    }

    /// Advances the cursor. Returns false for a request this pager no longer tracks.
    pub fn on_success(&mut self, request: &PageRequest, has_more: bool) -> bool {
        if self.in_flight.as_ref() != Some(request) {
            return false;
        }
        self.in_flight = None;
        self.last_error = None;
        self.next_page = request.page + 1;
        self.has_more = has_more;
        info!(page = request.page, has_more, "history: cursor advanced");
        true
    }

    /// Leaves the cursor in place so the same page can be requested again.
    pub fn on_failure(&mut self, request: &PageRequest, error: &HistoryFetchError) -> bool {
        if self.in_flight.as_ref() != Some(request) {
            return false;
        }
        self.in_flight = None;
        self.last_error = Some(error.to_string());
        warn!(page = request.page, "history: page fetch failed: {error}");
        true
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
