use serde::{Deserialize, Serialize};

use crate::{
    domain::{CorrelationId, Message, MessageStatus, TimestampMs, UserId},
    error::ApiError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub user_id: UserId,
    pub email: String,
}

/// A message as it travels over the channel and the history API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub content: String,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub timestamp: TimestampMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<CorrelationId>,
}

impl MessagePayload {
    /// Builds the display model. `is_self` is derived here and never transmitted;
    /// a payload without a status has already reached the relay.
    pub fn into_message(self, self_id: &UserId) -> Message {
        Message {
            is_self: &self.sender_id == self_id,
            content: self.content,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            timestamp: self.timestamp,
            status: self.status.unwrap_or(MessageStatus::Delivered),
            correlation_id: self.client_message_id,
        }
    }
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            timestamp: message.timestamp,
            status: Some(message.status),
            client_message_id: message.correlation_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub message: MessagePayload,
    pub by: UserId,
    pub to: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceivedPayload {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub sender_id: UserId,
    pub recipient_id: UserId,
}

/// Outbound channel events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientRequest {
    Login(LoginPayload),
    SendMessageToUser(SendMessagePayload),
    MessageReceived(MessageReceivedPayload),
    StartTyping(TypingPayload),
    StopTyping(TypingPayload),
}

/// Inbound channel events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    LoginSuccess(EmptyPayload),
    LoginFailure(EmptyPayload),
    NewMessage(MessagePayload),
    StartTyping(TypingPayload),
    StopTyping(TypingPayload),
    Error(ApiError),
}

impl ServerEvent {
    pub fn name(&self) -> EventName {
        match self {
            ServerEvent::LoginSuccess(_) => EventName::LoginSuccess,
            ServerEvent::LoginFailure(_) => EventName::LoginFailure,
            ServerEvent::NewMessage(_) => EventName::NewMessage,
            ServerEvent::StartTyping(_) => EventName::StartTyping,
            ServerEvent::StopTyping(_) => EventName::StopTyping,
            ServerEvent::Error(_) => EventName::Error,
        }
    }
}

/// Names a subscriber can register for on a channel: the two lifecycle
/// signals plus every inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Opened,
    Closed,
    LoginSuccess,
    LoginFailure,
    NewMessage,
    StartTyping,
    StopTyping,
    Error,
}

/// Body of `GET messages(senderId, recipientId, page, pageSize)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPageResponse {
    pub data: Vec<MessagePayload>,
    pub has_more: bool,
    pub page: u32,
}
