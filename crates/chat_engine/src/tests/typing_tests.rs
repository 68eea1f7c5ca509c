use super::*;

const DEBOUNCE: Duration = Duration::from_millis(2000);

fn controller() -> TypingController {
    TypingController::new(UserId::from("u1"), UserId::from("u2"), DEBOUNCE)
}

fn key() -> TypingPayload {
    TypingPayload {
        sender_id: UserId::from("u1"),
        recipient_id: UserId::from("u2"),
    }
}

#[test]
fn start_once_then_stop_exactly_once_at_deadline() {
    let t0 = Instant::now();
    let mut typing = controller();

    assert_eq!(typing.on_input("h", t0), Some(TypingSignal::Start(key())));
    assert_eq!(typing.deadline(), Some(t0 + DEBOUNCE));

    assert_eq!(typing.on_timer(t0 + Duration::from_millis(1999)), None);
    assert_eq!(
        typing.on_timer(t0 + DEBOUNCE),
        Some(TypingSignal::Stop(key()))
    );
    assert_eq!(typing.on_timer(t0 + Duration::from_millis(2500)), None);
    assert_eq!(typing.stop_now(), None);
}

#[test]
fn further_input_resets_timer_without_restarting() {
    let t0 = Instant::now();
    let mut typing = controller();
    typing.on_input("h", t0);

    let t1 = t0 + Duration::from_millis(1500);
    assert_eq!(typing.on_input("he", t1), None);
    assert_eq!(typing.on_timer(t0 + DEBOUNCE), None);
    assert_eq!(typing.on_timer(t1 + DEBOUNCE), Some(TypingSignal::Stop(key())));
}

#[test]
fn blank_input_does_not_signal() {
    let mut typing = controller();
    assert_eq!(typing.on_input("   ", Instant::now()), None);
    assert_eq!(typing.deadline(), None);
}

#[test]
fn teardown_before_deadline_stops_immediately_and_cancels() {
    let t0 = Instant::now();
    let mut typing = controller();
    typing.on_input("h", t0);

    assert_eq!(typing.stop_now(), Some(TypingSignal::Stop(key())));
    assert_eq!(typing.deadline(), None);
    assert_eq!(typing.on_timer(t0 + DEBOUNCE), None);
}

#[test]
fn retarget_stops_presence_for_previous_counterpart() {
    let mut typing = controller();
    typing.on_input("h", Instant::now());

    assert_eq!(
        typing.retarget(UserId::from("u3")),
        Some(TypingSignal::Stop(key()))
    );
    let Some(TypingSignal::Start(payload)) = typing.on_input("x", Instant::now()) else {
        panic!("expected start for new counterpart");
    };
    assert_eq!(payload.recipient_id, UserId::from("u3"));
}

#[test]
fn presence_tracks_only_active_counterpart() {
    let mut presence = TypingPresence::new(UserId::from("u1"), UserId::from("u2"));
    let from_u2 = TypingPayload {
        sender_id: UserId::from("u2"),
        recipient_id: UserId::from("u1"),
    };
    let from_u3 = TypingPayload {
        sender_id: UserId::from("u3"),
        recipient_id: UserId::from("u1"),
    };

    assert_eq!(presence.on_remote(true, &from_u3), None);
    assert_eq!(presence.on_remote(true, &from_u2), Some(true));
    assert_eq!(presence.on_remote(true, &from_u2), None);
    assert!(presence.is_typing());

    presence.reset(UserId::from("u3"));
    assert!(!presence.is_typing());
    assert_eq!(presence.on_remote(false, &from_u3), None);
}
