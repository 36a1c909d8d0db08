//! Exercises the batch/credit bookkeeping in `stream_bridge`, spec.md §4.5.
//!
//! `range` is a cold source whose `IterSubscription` delivers synchronously
//! within `request(n)`, so every batch becomes ready the moment
//! `StreamBridge::new`/`ack` issues the matching upstream request — no
//! coordinator pump is needed here.

use flow_core::{range, BridgeCredits, Disposable, FlowConfig, StreamBridge};
use std::cell::Cell;

fn drain_all<T>(bridge: &StreamBridge<T>) -> Vec<T> {
    let mut collected = Vec::new();
    loop {
        for batch in bridge.poll_batches(usize::MAX) {
            collected.extend(batch);
            bridge.ack(1);
        }
        if bridge.terminal_status().is_some() {
            break;
        }
    }
    collected
}

#[test]
fn batches_are_sized_and_delivered_in_order() {
    let credits = BridgeCredits {
        max_items_per_batch: 4,
        max_in_flight_items: 16,
        request_threshold_items: 8,
    };
    let bridge = StreamBridge::new(range(0, 20), credits, FlowConfig::default());

    let items = drain_all(&bridge);
    let expected: Vec<i64> = (0..20).collect();
    assert_eq!(items, expected);
    match bridge.terminal_status() {
        Some(None) => {}
        other => panic!("expected a clean completion, got {other:?}"),
    }
}

#[test]
fn a_partial_final_batch_is_flushed_on_completion() {
    let credits = BridgeCredits {
        max_items_per_batch: 4,
        max_in_flight_items: 16,
        request_threshold_items: 8,
    };
    // 18 is not a multiple of the batch size, so the last batch must still
    // be flushed with fewer than `max_items_per_batch` items once upstream
    // completes.
    let bridge = StreamBridge::new(range(0, 18), credits, FlowConfig::default());
    let items = drain_all(&bridge);
    assert_eq!(items, (0..18).collect::<Vec<i64>>());
}

#[test]
fn terminal_status_is_none_while_batches_remain_ready() {
    let credits = BridgeCredits {
        max_items_per_batch: 4,
        max_in_flight_items: 16,
        request_threshold_items: 8,
    };
    let bridge = StreamBridge::new(range(0, 4), credits, FlowConfig::default());
    // `range(0, 4)`'s iterator delivers exactly the 4 items the initial
    // `request(4)` asks for without being polled a 5th time, so it hasn't
    // signalled completion yet even though its one ready batch is full.
    assert!(bridge.terminal_status().is_none(), "a ready batch must be drained before terminal_status reports it");

    let batches = bridge.poll_batches(usize::MAX);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![0i64, 1, 2, 3]);
    assert!(
        bridge.terminal_status().is_none(),
        "upstream hasn't been asked for a 5th item yet, so it hasn't completed"
    );

    // Acking replenishes credit, which re-requests from upstream; this time
    // the iterator is empty and upstream completes.
    bridge.ack(1);
    match bridge.terminal_status() {
        Some(None) => {}
        other => panic!("expected a clean completion once upstream is asked past its last item, got {other:?}"),
    }
}

#[test]
fn bridge_once_rejects_a_second_bridge_attempt() {
    let credits = BridgeCredits {
        max_items_per_batch: 2,
        max_in_flight_items: 8,
        request_threshold_items: 4,
    };
    let already_bridged = Cell::new(false);
    let first = flow_core::bridge_once(range(0, 10), credits, FlowConfig::default(), &already_bridged);
    assert!(first.is_ok());

    let second = flow_core::bridge_once(range(0, 10), credits, FlowConfig::default(), &already_bridged);
    assert!(second.is_err());
    assert_eq!(second.unwrap_err().code(), flow_core::codes::CANNOT_RESUBSCRIBE_STREAM);
}

#[test]
fn subscription_request_forwards_to_upstream_and_dispose_cancels_it() {
    let credits = BridgeCredits {
        max_items_per_batch: 2,
        max_in_flight_items: 8,
        request_threshold_items: 4,
    };
    // A large range with a small per-batch size so the initial `request(2)`
    // the bridge issues on subscribe does not exhaust the source, keeping
    // the bridge non-terminal until we dispose it ourselves.
    let bridge = StreamBridge::new(range(0, 1000), credits, FlowConfig::default());
    let sub = bridge.subscription();
    assert!(!sub.is_disposed());
    sub.dispose();
    assert!(sub.is_disposed());
}
