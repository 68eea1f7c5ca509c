use super::*;
use shared::{
    domain::UserId,
    protocol::{EmptyPayload, MessagePayload, TypingPayload},
};

fn typing() -> TypingPayload {
    TypingPayload {
        sender_id: UserId::from("u2"),
        recipient_id: UserId::from("u1"),
    }
}

#[test]
fn subscribers_only_see_registered_events() {
    let handle = ChannelHandle::new(RelayKind::Direct);
    let mut auth = handle.subscribe(&[EventName::LoginSuccess, EventName::Opened]);
    let mut presence = handle.subscribe(&[EventName::StartTyping]);

    handle.open();
    handle.deliver(ServerEvent::LoginSuccess(EmptyPayload {}));
    handle.deliver(ServerEvent::StartTyping(typing()));

    assert_eq!(auth.try_recv(), Some(ChannelSignal::Opened));
    assert_eq!(
        auth.try_recv(),
        Some(ChannelSignal::Event(ServerEvent::LoginSuccess(EmptyPayload {})))
    );
    assert_eq!(auth.try_recv(), None);

    assert_eq!(
        presence.try_recv(),
        Some(ChannelSignal::Event(ServerEvent::StartTyping(typing())))
    );
    assert_eq!(presence.try_recv(), None);
}

#[test]
fn emit_fails_synchronously_when_not_open() {
    let handle = ChannelHandle::new(RelayKind::Direct);
    let request = ClientRequest::StopTyping(typing());
    assert_eq!(handle.emit(request.clone()), Err(TransportError::NotOpen));

    let mut outbound = handle.open();
    assert!(handle.is_open());
    handle.emit(request.clone()).expect("emit while open");
    assert_eq!(outbound.try_recv().ok(), Some(request.clone()));

    handle.close();
    assert!(!handle.is_open());
    assert_eq!(handle.emit(request), Err(TransportError::NotOpen));
}

#[test]
fn close_is_signalled_once() {
    let handle = ChannelHandle::new(RelayKind::Group);
    let mut lifecycle = handle.subscribe(&[EventName::Opened, EventName::Closed]);

    handle.open();
    handle.close();
    handle.close();

    assert_eq!(lifecycle.try_recv(), Some(ChannelSignal::Opened));
    assert_eq!(lifecycle.try_recv(), Some(ChannelSignal::Closed));
    assert_eq!(lifecycle.try_recv(), None);
}

#[test]
fn unsubscribe_and_drop_release_registration_once() {
    let handle = ChannelHandle::new(RelayKind::Public);
    let explicit = handle.subscribe(&[EventName::NewMessage]);
    let dropped = handle.subscribe(&[EventName::NewMessage]);
    assert_eq!(handle.subscriber_count(), 2);

    explicit.unsubscribe();
    assert_eq!(handle.subscriber_count(), 1);

    drop(dropped);
    assert_eq!(handle.subscriber_count(), 0);
}

#[tokio::test]
async fn recv_waits_for_delivery() {
    let handle = ChannelHandle::new(RelayKind::Direct);
    let mut sub = handle.subscribe(&[EventName::LoginFailure]);

    let sender = Arc::clone(&handle);
    tokio::spawn(async move {
        sender.deliver(ServerEvent::LoginFailure(EmptyPayload {}));
    });

    assert_eq!(
        sub.recv().await,
        Some(ChannelSignal::Event(ServerEvent::LoginFailure(EmptyPayload {})))
    );
}

#[test]
fn registrations_sharing_a_queue_keep_delivery_order() {
    let handle = ChannelHandle::new(RelayKind::Direct);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let auth = handle.register(&[EventName::LoginSuccess], tx.clone());
    let messages = handle.register(&[EventName::NewMessage], tx.clone());
    let presence = handle.register(&[EventName::StartTyping], tx);

    let message = MessagePayload {
        content: "hi".into(),
        sender_id: UserId::from("u2"),
        recipient_id: UserId::from("u1"),
        timestamp: 10,
        status: None,
        client_message_id: None,
    };
    handle.deliver(ServerEvent::StartTyping(typing()));
    handle.deliver(ServerEvent::LoginSuccess(EmptyPayload {}));
    handle.deliver(ServerEvent::NewMessage(message));

    let names: Vec<EventName> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|signal| signal.name())
        .collect();
    assert_eq!(
        names,
        vec![EventName::StartTyping, EventName::LoginSuccess, EventName::NewMessage]
    );

    assert_eq!(handle.subscriber_count(), 3);
    auth.unsubscribe();
    drop(messages);
    assert_eq!(handle.subscriber_count(), 1);
    presence.unsubscribe();
    assert_eq!(handle.subscriber_count(), 0);
}
