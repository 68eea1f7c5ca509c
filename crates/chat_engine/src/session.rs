//! One mounted conversation view.
//!
//! All store mutation happens under the session lock, driven by three
//! producers that may interleave in any order: channel signals (one pump
//! task draining them in delivery order), history completions (one spawned task per page), and calls from the
//! rendering layer.

use std::sync::{Arc, Weak};

use shared::{
    domain::{local_clock_ms, ConversationContext, CorrelationId, Message, UserId},
    error::ApiError,
    protocol::{
        ClientRequest, EventName, MessagePayload, MessageReceivedPayload, SendMessagePayload,
        ServerEvent,
    },
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelHandle, ChannelSignal, Registration},
    config::EngineSettings,
    error::{EngineError, HistoryFetchError},
    handshake::{ConnectionState, HandshakeMachine, HandshakeOutput},
    history::{HistoryApi, HistoryPage, HistoryPager, PageRequest},
    reconciler::{MergeOutcome, MessageStore},
    scroll::{ScrollAction, ScrollCoordinator, Viewport},
    typing::{TypingController, TypingPresence, TypingSignal},
    IdentityProvider,
};

const HANDSHAKE_EVENTS: &[EventName] = &[
    EventName::Opened,
    EventName::Closed,
    EventName::LoginSuccess,
    EventName::LoginFailure,
    EventName::Error,
];
const MESSAGE_EVENTS: &[EventName] = &[EventName::NewMessage];
const PRESENCE_EVENTS: &[EventName] = &[EventName::StartTyping, EventName::StopTyping];

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionState),
    /// Non-fatal: carries [`EngineError::AuthRejected`].
    AuthWarning(EngineError),
    MessagesChanged { outcome: MergeOutcome, len: usize },
    Scroll(ScrollAction),
    TypingChanged(bool),
    HistoryFailed { page: u32, error: String },
    SendFailed {
        correlation_id: CorrelationId,
        error: String,
    },
    ContextReset(ConversationContext),
    RelayError(ApiError),
}

/// What the rendering layer reads.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub context: ConversationContext,
    pub connection: ConnectionState,
    pub messages: Vec<Message>,
    pub counterpart_typing: bool,
    pub history_loading: bool,
    pub history_error: Option<String>,
    pub has_more_history: bool,
}

struct SessionState {
    handshake: HandshakeMachine,
    store: MessageStore,
    pager: HistoryPager,
    typing: TypingController,
    presence: TypingPresence,
    scroll: ScrollCoordinator,
    viewport: Viewport,
    unrendered: MergeOutcome,
    history_task: Option<JoinHandle<()>>,
    typing_timer: Option<JoinHandle<()>>,
    pump: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

/// One registration per component, all feeding a single queue so the pump
/// sees signals in the order the channel delivered them.
struct SessionSubscriptions {
    handshake: Registration,
    messages: Registration,
    presence: Registration,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
}

impl SessionSubscriptions {
    fn register(channel: &Arc<ChannelHandle>) -> Self {
        let (tx, signals) = mpsc::unbounded_channel();
        Self {
            handshake: channel.register(HANDSHAKE_EVENTS, tx.clone()),
            messages: channel.register(MESSAGE_EVENTS, tx.clone()),
            presence: channel.register(PRESENCE_EVENTS, tx),
            signals,
        }
    }

    fn unsubscribe(self) {
        self.handshake.unsubscribe();
        self.messages.unsubscribe();
        self.presence.unsubscribe();
    }
}

pub struct ChatSession {
    channel: Arc<ChannelHandle>,
    history: Arc<dyn HistoryApi>,
    settings: EngineSettings,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Builds the session, registers on the channel and requests the newest
    /// history page.
    pub async fn mount(
        channel: Arc<ChannelHandle>,
        history: Arc<dyn HistoryApi>,
        identity: &dyn IdentityProvider,
        counterpart_id: UserId,
        settings: EngineSettings,
    ) -> Result<Arc<Self>, EngineError> {
        let credentials = identity
            .current_identity()
            .ok_or(EngineError::MissingIdentity)?;
        let self_id = credentials.user_id.clone();
        let context = ConversationContext::new(self_id.clone(), counterpart_id.clone());

        let (events, _) = broadcast::channel(1024);
        let session = Arc::new(Self {
            inner: Mutex::new(SessionState {
                handshake: HandshakeMachine::new(Some(credentials)),
                store: MessageStore::new(context.clone()),
                pager: HistoryPager::new(settings.page_size),
                typing: TypingController::new(
                    self_id.clone(),
                    counterpart_id.clone(),
                    settings.typing_debounce(),
                ),
                presence: TypingPresence::new(self_id, counterpart_id),
                scroll: ScrollCoordinator::new(
                    settings.follow_threshold_px,
                    settings.sentinel_threshold_px,
                ),
                viewport: Viewport::default(),
                unrendered: MergeOutcome::default(),
                history_task: None,
                typing_timer: None,
                pump: None,
            }),
            channel,
            history,
            settings,
            events,
        });

        let subscriptions = SessionSubscriptions::register(&session.channel);

        let mut guard = session.inner.lock().await;
        info!(context = %context, kind = ?session.channel.kind(), "session: mounted");
        if session.channel.is_open() {
            session.on_signal(&mut guard, ChannelSignal::Opened);
        } else {
            guard.handshake.on_connecting();
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let pump = session.spawn_pump(subscriptions, stop_rx);
        guard.pump = Some((stop_tx, pump));
        session.spawn_history_fetch(&mut guard);
        drop(guard);

        Ok(session)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.handshake.state()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.lock().await.store.messages().to_vec()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.inner.lock().await;
        SessionSnapshot {
            context: guard.store.context().clone(),
            connection: guard.handshake.state(),
            messages: guard.store.messages().to_vec(),
            counterpart_typing: guard.presence.is_typing(),
            history_loading: guard.pager.in_flight().is_some(),
            history_error: guard.pager.last_error().map(str::to_string),
            has_more_history: guard.pager.has_more(),
        }
    }

    /// Re-triggers login, e.g. after the relay rejected it.
    pub async fn login(&self) {
        let mut guard = self.inner.lock().await;
        let before = guard.handshake.state();
        let output = guard.handshake.login();
        self.apply_handshake_output(&mut guard, before, output);
    }

    /// Optimistically inserts `content` and emits it to the relay.
    pub async fn send_message(&self, content: &str) -> Result<Message, EngineError> {
        if content.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let mut guard = self.inner.lock().await;
        guard.handshake.require_authenticated()?;

        if let Some(stop) = guard.typing.stop_now() {
            self.emit_typing(stop);
        }
        if let Some(timer) = guard.typing_timer.take() {
            timer.abort();
        }

        let (message, outcome) = guard
            .store
            .apply_optimistic_send(content.to_string(), local_clock_ms());
        self.record_change(&mut guard, outcome);
        self.emit_send(&mut guard, message)
    }

    /// `failed -> sent` and re-emit.
    pub async fn retry_send(&self, correlation_id: &CorrelationId) -> Result<Message, EngineError> {
        let mut guard = self.inner.lock().await;
        guard.handshake.require_authenticated()?;
        let message = guard.store.retry(correlation_id)?;
        self.record_change(
            &mut guard,
            MergeOutcome {
                updated: 1,
                ..MergeOutcome::default()
            },
        );
        self.emit_send(&mut guard, message)
    }

    pub async fn on_composer_input(self: &Arc<Self>, content: &str) {
        let mut guard = self.inner.lock().await;
        if !guard.handshake.is_authenticated() {
            return;
        }
        if let Some(start) = guard.typing.on_input(content, Instant::now()) {
            self.emit_typing(start);
        }
        let Some(deadline) = guard.typing.deadline() else {
            return;
        };
        if let Some(previous) = guard.typing_timer.take() {
            previous.abort();
        }
        let session = Arc::downgrade(self);
        guard.typing_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(session) = session.upgrade() else {
                return;
            };
            let mut guard = session.inner.lock().await;
            if let Some(stop) = guard.typing.on_timer(Instant::now()) {
                session.emit_typing(stop);
            }
        }));
    }

    /// Records the latest geometry and triggers backward pagination when the
    /// sentinel has come into view.
    pub async fn update_viewport(self: &Arc<Self>, viewport: Viewport) {
        let mut guard = self.inner.lock().await;
        guard.viewport = viewport;
        let visible = guard.scroll.sentinel_visible(viewport);
        if guard
            .pager
            .should_trigger(visible, guard.scroll.in_initial_phase())
        {
            self.spawn_history_fetch(&mut guard);
        }
    }

    pub async fn on_sentinel_visible(self: &Arc<Self>) -> bool {
        let mut guard = self.inner.lock().await;
        if !guard
            .pager
            .should_trigger(true, guard.scroll.in_initial_phase())
        {
            return false;
        }
        self.spawn_history_fetch(&mut guard)
    }

    /// Explicit user re-trigger, e.g. after an inline history error.
    pub async fn request_older_page(self: &Arc<Self>) -> bool {
        let mut guard = self.inner.lock().await;
        self.spawn_history_fetch(&mut guard)
    }

    /// Called once the rendering layer has laid out the current sequence.
    pub async fn on_rendered(&self, content_height: f64) -> ScrollAction {
        let mut guard = self.inner.lock().await;
        let outcome = std::mem::take(&mut guard.unrendered);
        let before = guard.viewport;
        let loading_complete = guard.store.history_pages_applied() > 0;
        let len = guard.store.len();
        let action =
            guard
                .scroll
                .on_store_changed(&outcome, len, loading_complete, before, content_height);
        guard.viewport.scroll_top = action.resolve(before, content_height);
        guard.viewport.content_height = content_height;
        if action != ScrollAction::None {
            let _ = self.events.send(SessionEvent::Scroll(action));
        }
        action
    }

    pub async fn switch_counterpart(self: &Arc<Self>, counterpart_id: UserId) {
        let mut guard = self.inner.lock().await;
        if guard.store.context().counterpart_id == counterpart_id {
            return;
        }
        if let Some(stop) = guard.typing.retarget(counterpart_id.clone()) {
            self.emit_typing(stop);
        }
        if let Some(timer) = guard.typing_timer.take() {
            timer.abort();
        }
        if let Some(task) = guard.history_task.take() {
            task.abort();
        }

        let context = ConversationContext::new(
            guard.store.context().self_id.clone(),
            counterpart_id.clone(),
        );
        guard.store.reset_for_context(context.clone());
        guard.pager.reset();
        guard.presence.reset(counterpart_id);
        guard.scroll.rearm();
        guard.unrendered = MergeOutcome::default();
        let _ = self.events.send(SessionEvent::ContextReset(context));
        self.spawn_history_fetch(&mut guard);
    }

    /// Teardown: stops typing presence, cancels timers and fetches, and
    /// releases the channel registrations.
    pub async fn unmount(&self) {
        let pump = {
            let mut guard = self.inner.lock().await;
            if let Some(stop) = guard.typing.stop_now() {
                self.emit_typing(stop);
            }
            if let Some(timer) = guard.typing_timer.take() {
                timer.abort();
            }
            if let Some(task) = guard.history_task.take() {
                task.abort();
            }
            guard.pump.take()
        };
        if let Some((stop, task)) = pump {
            let _ = stop.send(());
            let _ = task.await;
            info!("session: unmounted");
        }
    }

    fn spawn_pump(
        self: &Arc<Self>,
        subscriptions: SessionSubscriptions,
        mut stop: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        let session: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut subscriptions = subscriptions;
            loop {
                let signal = tokio::select! {
                    _ = &mut stop => break,
                    signal = subscriptions.signals.recv() => signal,
                };
                let Some(signal) = signal else {
                    break;
                };
                let Some(session) = session.upgrade() else {
                    break;
                };
                let mut guard = session.inner.lock().await;
                session.on_signal(&mut guard, signal);
            }
            subscriptions.unsubscribe();
        })
    }

    fn on_signal(&self, state: &mut SessionState, signal: ChannelSignal) {
        let before = state.handshake.state();
        match signal {
            ChannelSignal::Opened => {
                if before.is_open() {
                    debug!("session: duplicate opened signal ignored");
                    return;
                }
                let output = state.handshake.on_open();
                self.apply_handshake_output(state, before, output);
            }
            ChannelSignal::Closed => {
                state.handshake.on_close();
                self.notify_connection(before, state.handshake.state());
            }
            ChannelSignal::Event(ServerEvent::LoginSuccess(_)) => {
                state.handshake.on_login_success();
                self.notify_connection(before, state.handshake.state());
            }
            ChannelSignal::Event(ServerEvent::LoginFailure(_)) => {
                let output = state.handshake.on_login_failure();
                self.apply_handshake_output(state, before, output);
            }
            ChannelSignal::Event(ServerEvent::Error(error)) => {
                warn!(code = ?error.code, "session: relay reported error: {}", error.message);
                let _ = self.events.send(SessionEvent::RelayError(error));
            }
            ChannelSignal::Event(ServerEvent::NewMessage(payload)) => {
                self.on_live_message(state, payload);
            }
            ChannelSignal::Event(ServerEvent::StartTyping(payload)) => {
                if let Some(typing) = state.presence.on_remote(true, &payload) {
                    let _ = self.events.send(SessionEvent::TypingChanged(typing));
                }
            }
            ChannelSignal::Event(ServerEvent::StopTyping(payload)) => {
                if let Some(typing) = state.presence.on_remote(false, &payload) {
                    let _ = self.events.send(SessionEvent::TypingChanged(typing));
                }
            }
        }
    }

    fn on_live_message(&self, state: &mut SessionState, payload: MessagePayload) {
        let context = state.store.context();
        if !context.involves(&payload.sender_id, &payload.recipient_id) {
            debug!(
                sender = %payload.sender_id,
                recipient = %payload.recipient_id,
                "session: live message for another conversation ignored"
            );
            return;
        }
        let message = payload.into_message(&context.self_id);
        let ack = (!message.is_self).then(|| message.ack_key());
        let outcome = state.store.apply_live_message(message);
        self.record_change(state, outcome);

        if let Some(message_id) = ack {
            if state.handshake.is_authenticated() {
                let request = ClientRequest::MessageReceived(MessageReceivedPayload { message_id });
                if let Err(err) = self.channel.emit(request) {
                    debug!("session: ack not sent: {err}");
                }
            }
        }
    }

    fn apply_handshake_output(
        &self,
        state: &mut SessionState,
        before: ConnectionState,
        output: HandshakeOutput,
    ) {
        match output {
            HandshakeOutput::None => {}
            HandshakeOutput::SendLogin(request) => {
                if let Err(err) = self.channel.emit(request) {
                    warn!("session: login request not sent: {err}");
                }
            }
            HandshakeOutput::AuthWarning { user_id } => {
                let _ = self
                    .events
                    .send(SessionEvent::AuthWarning(EngineError::AuthRejected { user_id }));
            }
        }
        self.notify_connection(before, state.handshake.state());
    }

    fn notify_connection(&self, before: ConnectionState, after: ConnectionState) {
        if before != after {
            let _ = self.events.send(SessionEvent::ConnectionChanged(after));
        }
    }

    fn emit_typing(&self, signal: TypingSignal) {
        if let Err(err) = self.channel.emit(signal.into_request()) {
            debug!("typing: signal not sent: {err}");
        }
    }

    fn emit_send(
        &self,
        state: &mut SessionState,
        message: Message,
    ) -> Result<Message, EngineError> {
        let context = state.store.context();
        let request = ClientRequest::SendMessageToUser(SendMessagePayload {
            message: MessagePayload::from(&message),
            by: context.self_id.clone(),
            to: context.counterpart_id.clone(),
        });
        match self.channel.emit(request) {
            Ok(()) => {
                info!(timestamp = message.timestamp, "session: message sent");
                Ok(message)
            }
            Err(err) => {
                let Some(correlation_id) = message.correlation_id.clone() else {
                    return Err(err.into());
                };
                state.store.mark_failed(&correlation_id)?;
                self.record_change(
                    state,
                    MergeOutcome {
                        updated: 1,
                        ..MergeOutcome::default()
                    },
                );
                warn!(correlation_id = %correlation_id, "session: send failed: {err}");
                let _ = self.events.send(SessionEvent::SendFailed {
                    correlation_id,
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    fn record_change(&self, state: &mut SessionState, outcome: MergeOutcome) {
        if outcome.is_noop() {
            return;
        }
        state.unrendered.absorb(outcome);
        let _ = self.events.send(SessionEvent::MessagesChanged {
            outcome,
            len: state.store.len(),
        });
    }

    fn spawn_history_fetch(self: &Arc<Self>, state: &mut SessionState) -> bool {
        let Some(request) = state.pager.begin(state.store.tag()) else {
            return false;
        };
        let context = state.store.context().clone();
        info!(context = %context, page = request.page, "history: requesting page");
        let history = Arc::clone(&self.history);
        let session = Arc::downgrade(self);
        state.history_task = Some(tokio::spawn(async move {
            let result = history
                .fetch_page(
                    &context.self_id,
                    &context.counterpart_id,
                    request.page,
                    request.page_size,
                )
                .await;
            if let Some(session) = session.upgrade() {
                session.complete_history_fetch(request, result).await;
            }
        }));
        true
    }

    async fn complete_history_fetch(
        &self,
        request: PageRequest,
        result: Result<HistoryPage, HistoryFetchError>,
    ) {
        let mut guard = self.inner.lock().await;
        if request.tag != guard.store.tag() {
            debug!(page = request.page, "history: late page for superseded context dropped");
            return;
        }
        guard.history_task = None;

        match result {
            Ok(page) => {
                let self_id = guard.store.context().self_id.clone();
                let items = page
                    .items
                    .into_iter()
                    .map(|payload| payload.into_message(&self_id))
                    .collect();
                match guard.store.apply_history_page(request.tag, items) {
                    Ok(outcome) => {
                        guard.pager.on_success(&request, page.has_more);
                        info!(
                            page = request.page,
                            added = outcome.added(),
                            len = guard.store.len(),
                            "history: page merged"
                        );
                        self.record_change(&mut guard, outcome);
                    }
                    Err(err) => debug!("history: {err}"),
                }
            }
            Err(err) => {
                guard.pager.on_failure(&request, &err);
                let _ = self.events.send(SessionEvent::HistoryFailed {
                    page: request.page,
                    error: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
