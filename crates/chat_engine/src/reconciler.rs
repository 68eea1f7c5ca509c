//! Per-conversation message store.
//!
//! History pages, live channel events and optimistic local sends all funnel
//! through [`MessageStore::merge`], which keeps the retained sequence sorted
//! ascending by timestamp with at most one entry per timestamp.

use std::collections::HashMap;

use shared::domain::{
    ConversationContext, CorrelationId, Message, MessageStatus, TimestampMs,
};
use tracing::{debug, info};

use crate::error::EngineError;

/// Generation counter identifying which context an async result was requested
/// for. Bumped on every reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextTag(u64);

/// What one merge did to the store, relative to the sequence before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// New entries older than the previous head.
    pub prepended: usize,
    /// New entries newer than the previous tail, or any entry into an empty store.
    pub appended: usize,
    /// New entries that landed between the previous head and tail.
    pub inserted: usize,
    /// Existing entries whose status or timestamp changed.
    pub updated: usize,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        *self == MergeOutcome::default()
    }

    pub fn added(&self) -> usize {
        self.prepended + self.appended + self.inserted
    }

    /// Folds a later merge into this one, for consumers that batch renders.
    pub fn absorb(&mut self, later: MergeOutcome) {
        self.prepended += later.prepended;
        self.appended += later.appended;
        self.inserted += later.inserted;
        self.updated += later.updated;
    }
}

#[derive(Debug)]
pub struct MessageStore {
    context: ConversationContext,
    tag: ContextTag,
    messages: Vec<Message>,
    history_pages: usize,
}

impl MessageStore {
    pub fn new(context: ConversationContext) -> Self {
        Self {
            context,
            tag: ContextTag(0),
            messages: Vec::new(),
            history_pages: 0,
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn tag(&self) -> ContextTag {
        self.tag
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn history_pages_applied(&self) -> usize {
        self.history_pages
    }

    pub fn find(&self, correlation_id: &CorrelationId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.correlation_id.as_ref() == Some(correlation_id))
    }

    /// Clears the store and invalidates every tag handed out so far.
    pub fn reset_for_context(&mut self, context: ConversationContext) -> ContextTag {
        info!(
            previous = %self.context,
            next = %context,
            dropped = self.messages.len(),
            "store: reset for context"
        );
        self.context = context;
        self.tag = ContextTag(self.tag.0 + 1);
        self.messages.clear();
        self.history_pages = 0;
        self.tag
    }

    pub fn apply_history_page(
        &mut self,
        tag: ContextTag,
        items: Vec<Message>,
    ) -> Result<MergeOutcome, EngineError> {
        if tag != self.tag {
            debug!(
                context = %self.context,
                items = items.len(),
                "store: discarded history page for superseded context"
            );
            return Err(EngineError::StaleContext);
        }
        self.history_pages += 1;
        Ok(self.merge(items))
    }

    pub fn apply_live_message(&mut self, message: Message) -> MergeOutcome {
        self.merge(vec![message])
    }

    /// Inserts a locally authored message before any acknowledgement.
    ///
    /// The returned copy carries the timestamp and correlation id that must be
    /// sent to the relay so its echo collapses into this entry.
    pub fn apply_optimistic_send(
        &mut self,
        content: String,
        now_ms: TimestampMs,
    ) -> (Message, MergeOutcome) {
        let mut timestamp = now_ms;
        while self.position_of(timestamp).is_ok() {
            timestamp += 1;
        }
        let message = Message {
            content,
            sender_id: self.context.self_id.clone(),
            recipient_id: self.context.counterpart_id.clone(),
            timestamp,
            status: MessageStatus::Sent,
            is_self: true,
            correlation_id: Some(CorrelationId::generate()),
        };
        let outcome = self.merge(vec![message.clone()]);
        (message, outcome)
    }

    pub fn mark_failed(&mut self, correlation_id: &CorrelationId) -> Result<(), EngineError> {
        let entry = self.find_mut(correlation_id)?;
        entry.status = MessageStatus::Failed;
        Ok(())
    }

    /// `failed -> sent`; the only backwards status move a message may make.
    pub fn retry(&mut self, correlation_id: &CorrelationId) -> Result<Message, EngineError> {
        let entry = self.find_mut(correlation_id)?;
        if entry.status == MessageStatus::Failed {
            entry.status = MessageStatus::Sent;
        }
        Ok(entry.clone())
    }

    fn find_mut(&mut self, correlation_id: &CorrelationId) -> Result<&mut Message, EngineError> {
        self.messages
            .iter_mut()
            .find(|m| m.correlation_id.as_ref() == Some(correlation_id))
            .ok_or_else(|| EngineError::UnknownMessage(correlation_id.clone()))
    }

    fn position_of(&self, timestamp: TimestampMs) -> Result<usize, usize> {
        self.messages.binary_search_by_key(&timestamp, |m| m.timestamp)
    }

    /// Concatenate, dedup, sort. Existing entries win a collision, except that
    /// their status is promoted and a correlated echo's timestamp is adopted.
    fn merge(&mut self, incoming: Vec<Message>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if incoming.is_empty() {
            return outcome;
        }

        let head = self.messages.first().map(|m| m.timestamp);
        let tail = self.messages.last().map(|m| m.timestamp);

        if incoming.iter().any(|m| m.correlation_id.is_some()) {
            let index: HashMap<CorrelationId, usize> = self
                .messages
                .iter()
                .enumerate()
                .filter_map(|(i, m)| m.correlation_id.clone().map(|id| (id, i)))
                .collect();
            for message in &incoming {
                let Some(i) = message.correlation_id.as_ref().and_then(|id| index.get(id)) else {
                    continue;
                };
                let existing = &mut self.messages[*i];
                if existing.timestamp != message.timestamp {
                    debug!(
                        local = existing.timestamp,
                        relay = message.timestamp,
                        "store: adopting relay timestamp for correlated message"
                    );
                    existing.timestamp = message.timestamp;
                    outcome.updated += 1;
                }
            }
        }

        let mut combined: Vec<(Message, bool)> = self
            .messages
            .drain(..)
            .map(|m| (m, false))
            .chain(incoming.into_iter().map(|m| (m, true)))
            .collect();
        // Stable: for equal timestamps the existing entry stays in front.
        combined.sort_by_key(|(m, _)| m.timestamp);
        combined.dedup_by(|(later, _), (kept, _)| {
            if later.timestamp != kept.timestamp {
                return false;
            }
            let promoted = kept.status.promote(later.status);
            if promoted != kept.status {
                kept.status = promoted;
                outcome.updated += 1;
            }
            if kept.correlation_id.is_none() {
                kept.correlation_id = later.correlation_id.take();
            }
            true
        });

        for (message, is_new) in &combined {
            if !is_new {
                continue;
            }
            match (head, tail) {
                (Some(head), _) if message.timestamp < head => outcome.prepended += 1,
                (_, Some(tail)) if message.timestamp <= tail => outcome.inserted += 1,
                _ => outcome.appended += 1,
            }
        }

        self.messages = combined.into_iter().map(|(m, _)| m).collect();
        debug!(
            context = %self.context,
            len = self.messages.len(),
            prepended = outcome.prepended,
            appended = outcome.appended,
            inserted = outcome.inserted,
            updated = outcome.updated,
            "store: merged"
        );
        outcome
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
