//! Debounced typing presence.
//!
//! Nothing here owns a runtime timer: callers feed the current instant in and
//! schedule a wake-up for [`TypingController::deadline`]. That keeps the state
//! machine testable without a UI or a live clock.

use std::time::Duration;

use shared::{
    domain::UserId,
    protocol::{ClientRequest, TypingPayload},
};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DebounceTimer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// (Re)starts the timer from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.duration);
    }

    /// Returns true if a running timer was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires at most once per arm.
    pub fn on_expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSignal {
    Start(TypingPayload),
    Stop(TypingPayload),
}

impl TypingSignal {
    pub fn into_request(self) -> ClientRequest {
        match self {
            TypingSignal::Start(payload) => ClientRequest::StartTyping(payload),
            TypingSignal::Stop(payload) => ClientRequest::StopTyping(payload),
        }
    }
}

/// Local side: turns composer input into start/stop signals.
#[derive(Debug)]
pub struct TypingController {
    key: TypingPayload,
    timer: DebounceTimer,
}

impl TypingController {
    pub fn new(sender_id: UserId, recipient_id: UserId, debounce: Duration) -> Self {
        Self {
            key: TypingPayload {
                sender_id,
                recipient_id,
            },
            timer: DebounceTimer::new(debounce),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn on_input(&mut self, content: &str, now: Instant) -> Option<TypingSignal> {
        if content.trim().is_empty() {
            return None;
        }
        let starting = !self.timer.is_armed();
        self.timer.arm(now);
        starting.then(|| TypingSignal::Start(self.key.clone()))
    }

    pub fn on_timer(&mut self, now: Instant) -> Option<TypingSignal> {
        self.timer
            .on_expire(now)
            .then(|| TypingSignal::Stop(self.key.clone()))
    }

    /// Explicit send or teardown: never leave presence stuck on.
    pub fn stop_now(&mut self) -> Option<TypingSignal> {
        self.timer
            .cancel()
            .then(|| TypingSignal::Stop(self.key.clone()))
    }

    /// Switches the recipient, stopping any presence sent to the old one.
    pub fn retarget(&mut self, recipient_id: UserId) -> Option<TypingSignal> {
        let stop = self.stop_now();
        self.key.recipient_id = recipient_id;
        stop
    }
}

/// Remote side: display-only flag for the active counterpart.
#[derive(Debug)]
pub struct TypingPresence {
    self_id: UserId,
    counterpart_id: UserId,
    typing: bool,
}

impl TypingPresence {
    pub fn new(self_id: UserId, counterpart_id: UserId) -> Self {
        Self {
            self_id,
            counterpart_id,
            typing: false,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Returns the new value when the flag changed.
    pub fn on_remote(&mut self, started: bool, payload: &TypingPayload) -> Option<bool> {
        if payload.sender_id != self.counterpart_id || payload.recipient_id != self.self_id {
            debug!(
                sender = %payload.sender_id,
                "typing: ignoring presence for inactive conversation"
            );
            return None;
        }
        if self.typing == started {
            return None;
        }
        self.typing = started;
        Some(started)
    }

    pub fn reset(&mut self, counterpart_id: UserId) {
        self.counterpart_id = counterpart_id;
        self.typing = false;
    }
}

#[cfg(test)]
#[path = "tests/typing_tests.rs"]
mod tests;
