use super::*;
use shared::domain::UserId;

fn context(counterpart: &str) -> ConversationContext {
    ConversationContext::new(UserId::from("u1"), UserId::from(counterpart))
}

fn incoming(timestamp: TimestampMs, content: &str) -> Message {
    Message {
        content: content.to_string(),
        sender_id: UserId::from("u2"),
        recipient_id: UserId::from("u1"),
        timestamp,
        status: MessageStatus::Delivered,
        is_self: false,
        correlation_id: None,
    }
}

fn timestamps(store: &MessageStore) -> Vec<TimestampMs> {
    store.messages().iter().map(|m| m.timestamp).collect()
}

fn assert_sorted_unique(store: &MessageStore) {
    let ts = timestamps(store);
    assert!(
        ts.windows(2).all(|w| w[0] < w[1]),
        "store not strictly ascending: {ts:?}"
    );
}

#[test]
fn first_page_is_sorted_ascending() {
    let mut store = MessageStore::new(context("u2"));
    let tag = store.tag();
    let outcome = store
        .apply_history_page(tag, vec![incoming(300, "c"), incoming(100, "a"), incoming(200, "b")])
        .expect("page");

    assert_eq!(timestamps(&store), vec![100, 200, 300]);
    assert_eq!(outcome.appended, 3);
    assert_eq!(store.history_pages_applied(), 1);
}

#[test]
fn applying_same_page_twice_is_idempotent() {
    let mut store = MessageStore::new(context("u2"));
    let tag = store.tag();
    let page = vec![incoming(100, "a"), incoming(200, "b")];

    store.apply_history_page(tag, page.clone()).expect("first");
    let once = store.messages().to_vec();
    let outcome = store.apply_history_page(tag, page).expect("second");

    assert_eq!(store.messages(), once.as_slice());
    assert!(outcome.is_noop());
}

#[test]
fn overlapping_older_page_merges_with_live_message() {
    let mut store = MessageStore::new(context("u2"));
    let tag = store.tag();

    store
        .apply_history_page(tag, vec![incoming(100, "a"), incoming(200, "b")])
        .expect("page 1");
    let live = store.apply_live_message(incoming(150, "live"));
    assert_eq!(live.inserted, 1);

    let older = store
        .apply_history_page(tag, vec![incoming(150, "history copy"), incoming(50, "old")])
        .expect("page 2");

    assert_eq!(timestamps(&store), vec![50, 100, 150, 200]);
    assert_eq!(older.prepended, 1);
    assert_eq!(older.added(), 1);
    // The live copy was there first and is retained.
    assert_eq!(store.messages()[2].content, "live");
}

#[test]
fn optimistic_send_collapses_with_echo_on_same_timestamp() {
    let mut store = MessageStore::new(context("u2"));
    let (sent, _) = store.apply_optimistic_send("hello".into(), 500);
    assert_eq!(sent.status, MessageStatus::Sent);
    assert!(sent.is_self);

    let mut echo = sent.clone();
    echo.correlation_id = None;
    echo.status = MessageStatus::Delivered;
    store.apply_live_message(echo);

    assert_eq!(store.len(), 1);
    assert_eq!(store.messages()[0].timestamp, 500);
    assert_eq!(store.messages()[0].status, MessageStatus::Delivered);
}

#[test]
fn correlated_echo_with_different_timestamp_still_collapses() {
    let mut store = MessageStore::new(context("u2"));
    store.apply_live_message(incoming(400, "before"));
    let (sent, _) = store.apply_optimistic_send("hello".into(), 500);

    let mut echo = sent.clone();
    echo.timestamp = 520;
    echo.status = MessageStatus::Delivered;
    let outcome = store.apply_live_message(echo);

    assert_eq!(timestamps(&store), vec![400, 520]);
    assert_eq!(store.messages()[1].status, MessageStatus::Delivered);
    assert_eq!(outcome.added(), 0);
    assert_eq!(outcome.updated, 2);
}

#[test]
fn optimistic_sends_in_same_millisecond_stay_distinct() {
    let mut store = MessageStore::new(context("u2"));
    let (first, _) = store.apply_optimistic_send("one".into(), 700);
    let (second, outcome) = store.apply_optimistic_send("two".into(), 700);

    assert_eq!(first.timestamp, 700);
    assert_eq!(second.timestamp, 701);
    assert_eq!(outcome.appended, 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn status_never_moves_backwards_on_merge() {
    let mut store = MessageStore::new(context("u2"));
    let mut read = incoming(100, "a");
    read.status = MessageStatus::Read;
    store.apply_live_message(read);

    let tag = store.tag();
    store
        .apply_history_page(tag, vec![incoming(100, "a")])
        .expect("page");
    assert_eq!(store.messages()[0].status, MessageStatus::Read);
}

#[test]
fn failed_send_can_be_retried() {
    let mut store = MessageStore::new(context("u2"));
    let (sent, _) = store.apply_optimistic_send("retry me".into(), 10);
    let id = sent.correlation_id.clone().expect("correlation id");

    store.mark_failed(&id).expect("mark failed");
    assert_eq!(store.find(&id).map(|m| m.status), Some(MessageStatus::Failed));

    let retried = store.retry(&id).expect("retry");
    assert_eq!(retried.status, MessageStatus::Sent);
    assert_eq!(retried.timestamp, 10);

    let unknown = CorrelationId::from("missing");
    assert!(matches!(
        store.retry(&unknown),
        Err(EngineError::UnknownMessage(_))
    ));
}

#[test]
fn stale_page_after_reset_is_discarded() {
    let mut store = MessageStore::new(context("u2"));
    let stale = store.tag();
    let fresh = store.reset_for_context(context("u3"));
    assert_ne!(stale, fresh);

    let result = store.apply_history_page(stale, vec![incoming(100, "from u2")]);
    assert!(matches!(result, Err(EngineError::StaleContext)));
    assert!(store.is_empty());
    assert_eq!(store.context().counterpart_id, UserId::from("u3"));
}

#[test]
fn interleavings_keep_store_sorted_and_unique() {
    let mut store = MessageStore::new(context("u2"));
    let tag = store.tag();
    // Pseudo-random interleaving of the three producers with repeated timestamps.
    let mut seed: i64 = 17;
    for round in 0..200 {
        seed = (seed * 1_103_515_245 + 12_345) % 2_147_483_648;
        let ts = seed % 97;
        match round % 3 {
            0 => {
                store
                    .apply_history_page(tag, vec![incoming(ts, "h"), incoming(ts / 2, "h2")])
                    .expect("page");
            }
            1 => {
                store.apply_live_message(incoming(ts, "l"));
            }
            _ => {
                store.apply_optimistic_send("o".into(), ts);
            }
        }
        assert_sorted_unique(&store);
    }
}
