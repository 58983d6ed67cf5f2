//! MessageStore invariants: dedup by id, total order, pagination
//! low-water mark, and idempotent upsert.

use lanchat_client::message::{DeliveryStatus, Direction, Message};
use lanchat_client::store::MessageStore;

fn msg(id: &str, ts: u64) -> Message {
    Message {
        msg_id: id.to_string(),
        ts,
        updated_at: 0,
        direction: Direction::Inbound,
        status: None,
        content: format!("body {id}"),
        from_node_id: Some("node-a".to_string()),
        from_name: None,
    }
}

fn outbound(id: &str, ts: u64, status: DeliveryStatus) -> Message {
    Message {
        msg_id: id.to_string(),
        ts,
        updated_at: 0,
        direction: Direction::Outbound,
        status: Some(status),
        content: format!("body {id}"),
        from_node_id: None,
        from_name: None,
    }
}

fn ids(store: &MessageStore) -> Vec<String> {
    store.ordered().into_iter().map(|m| m.msg_id).collect()
}

#[test]
fn upsert_orders_by_timestamp_then_id() {
    let mut store = MessageStore::new();
    let outcome = store.upsert(&[msg("a", 100), msg("b", 50)]);

    assert!(outcome.changed);
    assert_eq!(outcome.inserted, 2);
    assert_eq!(ids(&store), vec!["b", "a"]);
    assert_eq!(store.oldest_ts(), Some(50));
}

#[test]
fn equal_timestamps_break_ties_lexicographically() {
    let mut store = MessageStore::new();
    store.upsert(&[msg("z", 100), msg("a", 100), msg("m", 100)]);
    assert_eq!(ids(&store), vec!["a", "m", "z"]);
}

#[test]
fn overwrite_updates_in_place_without_reordering() {
    let mut store = MessageStore::new();
    store.upsert(&[outbound("a", 100, DeliveryStatus::Sent), msg("b", 200)]);

    let outcome = store.upsert(&[outbound("a", 100, DeliveryStatus::Delivered)]);
    assert!(outcome.changed);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get("a").unwrap().status,
        Some(DeliveryStatus::Delivered)
    );
    assert_eq!(ids(&store), vec!["a", "b"]);
}

#[test]
fn upsert_is_idempotent() {
    let batch = vec![msg("a", 100), msg("b", 50), msg("c", 75)];
    let mut store = MessageStore::new();
    store.upsert(&batch);
    let first_order = ids(&store);
    let first_oldest = store.oldest_ts();

    let outcome = store.upsert(&batch);
    // An identical overwrite still counts as a change (no deep-equality
    // check), but inserts nothing and leaves order and cursor alone.
    assert!(outcome.changed);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(store.len(), 3);
    assert_eq!(ids(&store), first_order);
    assert_eq!(store.oldest_ts(), first_oldest);
}

#[test]
fn later_batch_with_older_timestamps_is_sorted_in() {
    let mut store = MessageStore::new();
    store.upsert(&[msg("new", 1_000)]);
    // Backward pagination raced in after a poll; its rows predate what we
    // already hold.
    store.upsert(&[msg("old2", 400), msg("old1", 200)]);
    assert_eq!(ids(&store), vec!["old1", "old2", "new"]);
    assert_eq!(store.oldest_ts(), Some(200));
}

#[test]
fn empty_ids_are_dropped() {
    let mut store = MessageStore::new();
    let outcome = store.upsert(&[msg("", 100)]);
    assert!(!outcome.changed);
    assert_eq!(outcome.inserted, 0);
    assert!(store.is_empty());
    assert_eq!(store.oldest_ts(), None);
}

#[test]
fn timestampless_messages_sort_first_and_skip_the_cursor() {
    let mut store = MessageStore::new();
    store.upsert(&[msg("a", 100), msg("no-ts", 0)]);
    assert_eq!(ids(&store), vec!["no-ts", "a"]);
    // Only defined, nonzero timestamps feed the pagination cursor.
    assert_eq!(store.oldest_ts(), Some(100));
}

#[test]
fn clear_resets_everything() {
    let mut store = MessageStore::new();
    store.upsert(&[msg("a", 100)]);
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.oldest_ts(), None);
    assert!(store.ordered().is_empty());

    // The store is reusable after a clear.
    store.upsert(&[msg("b", 50)]);
    assert_eq!(ids(&store), vec!["b"]);
    assert_eq!(store.oldest_ts(), Some(50));
}

#[test]
fn ordered_is_a_snapshot_not_a_live_view() {
    let mut store = MessageStore::new();
    store.upsert(&[msg("a", 100)]);
    let snapshot = store.ordered();
    store.upsert(&[msg("b", 50)]);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.ordered().len(), 2);
}
