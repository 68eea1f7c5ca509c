use serde::{Deserialize, Serialize};

/// Codes the relay puts on an `error` event and the history API puts on a
/// non-2xx body. Anything newer decodes as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame sent before `loginSuccess`, or history queried for a foreign pair.
    Unauthorized,
    /// Malformed frame or query parameters.
    InvalidRequest,
    /// Recipient is not a known user.
    UnknownRecipient,
    Internal,
    #[serde(other)]
    Unknown,
}

/// Error body returned by the relay (`error` event) and by the history API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
