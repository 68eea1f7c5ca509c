//! Real-time chat synchronization engine.
//!
//! Keeps one conversation's timeline consistent across the live relay
//! channel, the paginated history API and local optimistic sends, and runs
//! the login handshake and typing presence over the same channel.

pub mod channel;
pub mod config;
pub mod error;
pub mod handshake;
pub mod history;
pub mod reconciler;
pub mod scroll;
pub mod session;
pub mod transport;
pub mod typing;

pub use channel::{ChannelHandle, ChannelSignal, Registration, Subscription};
pub use config::{load_settings, EngineSettings};
pub use error::{EngineError, HistoryFetchError, TransportError};
pub use handshake::{ConnectionState, Credentials};
pub use history::{HistoryApi, HttpHistoryApi, MissingHistoryApi};
pub use reconciler::{MergeOutcome, MessageStore};
pub use scroll::{ScrollAction, Viewport};
pub use session::{ChatSession, SessionEvent, SessionSnapshot};
pub use transport::{connect_websocket, RelayConnection};

/// Supplies the local identity and login credentials.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Credentials>;
}

pub struct StaticIdentity(pub Option<Credentials>);

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Option<Credentials> {
        self.0.clone()
    }
}
