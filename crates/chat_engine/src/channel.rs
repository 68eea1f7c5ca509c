//! Publish/subscribe hub for one persistent relay connection.
//!
//! Components register only for the event names they own and receive
//! [`ChannelSignal`]s on a private queue, or on one queue shared by several
//! registrations when their relative order matters. The transport side drives the handle
//! through [`ChannelHandle::open`], [`ChannelHandle::deliver`] and
//! [`ChannelHandle::close`].

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use shared::{
    domain::RelayKind,
    protocol::{ClientRequest, EventName, ServerEvent},
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Opened,
    Closed,
    Event(ServerEvent),
}

impl ChannelSignal {
    pub fn name(&self) -> EventName {
        match self {
            ChannelSignal::Opened => EventName::Opened,
            ChannelSignal::Closed => EventName::Closed,
            ChannelSignal::Event(event) => event.name(),
        }
    }
}

struct Subscriber {
    names: HashSet<EventName>,
    tx: mpsc::UnboundedSender<ChannelSignal>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

pub struct ChannelHandle {
    kind: RelayKind,
    registry: Mutex<Registry>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientRequest>>>,
}

impl ChannelHandle {
    pub fn new(kind: RelayKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            registry: Mutex::new(Registry::default()),
            outbound: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> RelayKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    pub fn subscribe(self: &Arc<Self>, names: &[EventName]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        Subscription {
            registration: self.register(names, tx),
            rx,
        }
    }

    /// Registers `names` onto a caller-owned queue. Registrations sharing one
    /// queue see their signals on it in delivery order.
    pub fn register(
        self: &Arc<Self>,
        names: &[EventName],
        tx: mpsc::UnboundedSender<ChannelSignal>,
    ) -> Registration {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(
            id,
            Subscriber {
                names: names.iter().copied().collect(),
                tx,
            },
        );
        debug!(kind = ?self.kind, id, ?names, "channel: subscribed");
        Registration {
            id,
            handle: Arc::downgrade(self),
            active: true,
        }
    }

    /// Fire-and-forget send. Fails synchronously when the channel is not open;
    /// nothing is buffered across a disconnect.
    pub fn emit(&self, request: ClientRequest) -> Result<(), TransportError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = outbound.as_ref().ok_or(TransportError::NotOpen)?;
        tx.send(request).map_err(|_| TransportError::NotOpen)
    }

    /// Transport side: the connection is up. Returns the queue of frames to write.
    pub fn open(&self) -> mpsc::UnboundedReceiver<ClientRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        info!(kind = ?self.kind, "channel: opened");
        self.broadcast(ChannelSignal::Opened);
        rx
    }

    /// Transport side: an inbound event arrived.
    pub fn deliver(&self, event: ServerEvent) {
        self.broadcast(ChannelSignal::Event(event));
    }

    /// Transport side: the connection dropped. Idempotent.
    pub fn close(&self) {
        let was_open = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if was_open {
            info!(kind = ?self.kind, "channel: closed");
            self.broadcast(ChannelSignal::Closed);
        }
    }

    fn broadcast(&self, signal: ChannelSignal) {
        let name = signal.name();
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.retain(|id, subscriber| {
            if !subscriber.names.contains(&name) {
                return true;
            }
            let delivered = subscriber.tx.send(signal.clone()).is_ok();
            if !delivered {
                debug!(id, "channel: dropping subscriber with closed queue");
            }
            delivered
        });
    }

    fn unsubscribe(&self, id: u64) {
        let removed = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .remove(&id)
            .is_some();
        if removed {
            debug!(kind = ?self.kind, id, "channel: unsubscribed");
        }
    }
}

/// Interest in a set of event names on a [`ChannelHandle`]. Deregisters
/// exactly once, either via [`Registration::unsubscribe`] or on drop.
pub struct Registration {
    id: u64,
    handle: Weak<ChannelHandle>,
    active: bool,
}

impl Registration {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(handle) = self.handle.upgrade() {
            handle.unsubscribe(self.id);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

/// A [`Registration`] with its own private queue.
pub struct Subscription {
    registration: Registration,
    rx: mpsc::UnboundedReceiver<ChannelSignal>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChannelSignal> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelSignal> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        self.registration.unsubscribe();
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
