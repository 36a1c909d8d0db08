//! Benchmarks for step-chain dispatch and the stream bridge's batch/credit
//! round trip, mirroring the teacher's manual-`main` criterion harness
//! (`harness = false` in Cargo.toml) rather than the `criterion_group!`
//! macros.

use criterion::{black_box, Criterion};
use flow_core::{range, BridgeCredits, Coordinator, FlowConfig, ObsOps, Observability, StreamBridge};
use std::cell::RefCell;
use std::env;
use std::rc::Rc;
use std::time::Duration;

/// Dispatch cost through a five-stage operator chain
/// (`map -> filter -> map -> take -> for_each`) over 10,000 items.
fn bench_operator_chain_dispatch(c: &mut Criterion) {
    c.bench_function("operator_chain_dispatch", |b| {
        b.iter(|| {
            let coordinator = Coordinator::with_system_clock(Observability::noop());
            let source = range(0, 10_000)
                .map(|x| x + 1)
                .filter(|x| x % 2 == 0)
                .map(|x| x * 3)
                .take(4_000);

            let sum = Rc::new(RefCell::new(0i64));
            let sum_sink = sum.clone();
            let _subscription = source.for_each(coordinator, move |x| *sum_sink.borrow_mut() += x, |_e| {}, || {});
            black_box(*sum.borrow())
        });
    });
}

/// The batch/credit replenish loop a `StreamBridge` runs to move 10,000
/// items from a cold source out to a polling consumer.
fn bench_stream_bridge_round_trip(c: &mut Criterion) {
    c.bench_function("stream_bridge_round_trip", |b| {
        b.iter(|| {
            let credits = BridgeCredits {
                max_items_per_batch: 64,
                max_in_flight_items: 512,
                request_threshold_items: 256,
            };
            let bridge = StreamBridge::new(range(0, 10_000), credits, FlowConfig::default());
            let mut total = 0usize;
            loop {
                let batches = bridge.poll_batches(usize::MAX);
                if batches.is_empty() && bridge.terminal_status().is_some() {
                    break;
                }
                for batch in batches {
                    total += batch.len();
                    bridge.ack(1);
                }
            }
            black_box(total)
        });
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_operator_chain_dispatch(&mut criterion);
    bench_stream_bridge_round_trip(&mut criterion);
    criterion.final_summary();
}
