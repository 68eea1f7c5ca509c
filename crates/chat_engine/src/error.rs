use shared::{
    domain::{CorrelationId, UserId},
    error::ApiError,
};
use thiserror::Error;

use crate::handshake::ConnectionState;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("channel is not usable for sending: {0}")]
    Transport(#[from] TransportError),
    #[error("history fetch failed: {0}")]
    HistoryFetch(#[from] HistoryFetchError),
    #[error("relay rejected login for user {user_id}")]
    AuthRejected { user_id: UserId },
    #[error("update tagged for a superseded conversation context was discarded")]
    StaleContext,
    #[error("message content must not be blank")]
    EmptyMessage,
    #[error("no message with correlation id {0} in the current conversation")]
    UnknownMessage(CorrelationId),
    #[error("no identity available to log in with")]
    MissingIdentity,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel is not open")]
    NotOpen,
    #[error("channel is {0:?}, sends require an authenticated session")]
    NotAuthenticated(ConnectionState),
}

#[derive(Debug, Clone, Error)]
pub enum HistoryFetchError {
    #[error("history request failed: {0}")]
    Transport(String),
    #[error("history API returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("history API returned an unreadable body: {0}")]
    Decode(String),
    #[error("history backend unavailable")]
    Unavailable,
}

impl HistoryFetchError {
    pub(crate) fn from_status(status: u16, body: Option<ApiError>) -> Self {
        let message = body
            .map(|err| err.message)
            .unwrap_or_else(|| "no error body".to_string());
        HistoryFetchError::Status { status, message }
    }
}

impl From<reqwest::Error> for HistoryFetchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            HistoryFetchError::Decode(value.to_string())
        } else {
            HistoryFetchError::Transport(value.to_string())
        }
    }
}
