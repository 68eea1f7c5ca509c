//! Login/authentication over an already-open channel.
//!
//! The machine never reconnects on its own. It reacts to the `opened` and
//! `closed` signals the channel delivers and treats every fresh `opened` as a
//! new chance to authenticate.

use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    protocol::{ClientRequest, LoginPayload},
};
use tracing::{debug, info, warn};

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ConnectedUnauth,
    Authenticating,
    Authenticated,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Connecting
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub email: String,
}

/// Result of feeding the machine one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutput {
    None,
    SendLogin(ClientRequest),
    /// Login was rejected; shown as a transient, non-fatal warning.
    AuthWarning { user_id: UserId },
}

#[derive(Debug)]
pub struct HandshakeMachine {
    state: ConnectionState,
    credentials: Option<Credentials>,
}

impl HandshakeMachine {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            credentials,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Gate for every higher-level protocol use.
    pub fn require_authenticated(&self) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Authenticated => Ok(()),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(TransportError::NotOpen)
            }
            other => Err(TransportError::NotAuthenticated(other)),
        }
    }

    pub fn on_connecting(&mut self) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
        }
    }

    pub fn on_open(&mut self) -> HandshakeOutput {
        self.state = ConnectionState::ConnectedUnauth;
        self.begin_login()
    }

    /// Explicit caller re-trigger, e.g. after a `loginFailure`.
    pub fn login(&mut self) -> HandshakeOutput {
        match self.state {
            ConnectionState::ConnectedUnauth => self.begin_login(),
            state => {
                debug!(?state, "handshake: login ignored in current state");
                HandshakeOutput::None
            }
        }
    }

    pub fn on_login_success(&mut self) {
        if self.state != ConnectionState::Authenticating {
            debug!(state = ?self.state, "handshake: unsolicited loginSuccess");
        }
        if self.state.is_open() {
            self.state = ConnectionState::Authenticated;
            info!("handshake: authenticated");
        }
    }

    pub fn on_login_failure(&mut self) -> HandshakeOutput {
        if !self.state.is_open() {
            return HandshakeOutput::None;
        }
        self.state = ConnectionState::ConnectedUnauth;
        let user_id = self
            .credentials
            .as_ref()
            .map(|c| c.user_id.clone())
            .unwrap_or_else(|| UserId::from(""));
        warn!(user_id = %user_id, "handshake: relay rejected login");
        HandshakeOutput::AuthWarning { user_id }
    }

    pub fn on_close(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!(previous = ?self.state, "handshake: transport closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn begin_login(&mut self) -> HandshakeOutput {
        let Some(credentials) = self.credentials.clone() else {
            return HandshakeOutput::None;
        };
        self.state = ConnectionState::Authenticating;
        info!(user_id = %credentials.user_id, "handshake: sending login");
        HandshakeOutput::SendLogin(ClientRequest::Login(LoginPayload {
            user_id: credentials.user_id,
            email: credentials.email,
        }))
    }
}

#[cfg(test)]
#[path = "tests/handshake_tests.rs"]
mod tests;
