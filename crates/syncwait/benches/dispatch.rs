// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::semicolon_if_nothing_returned)] // Benchmark code formatting
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncwait::{
    message_pipe, Directory, EventWaitSet, HandleSignals, ResetPolicy, SignalEvent,
    WaitMultiplexer, WaitSet, WakeReason, Watchable,
};

fn multiplexer() -> Arc<WaitMultiplexer> {
    WaitMultiplexer::new(Box::new(
        EventWaitSet::with_capacity(256).expect("wait set"),
    ))
}

// ============================================================================
// Multiplexer dispatch
// ============================================================================

/// Benchmark: one message -> one callback -> flag set -> wait returns.
fn bench_dispatch_single_channel(c: &mut Criterion) {
    let mux = multiplexer();
    let (tx, rx) = message_pipe();
    let done = Arc::new(AtomicBool::new(false));

    let (port, flag) = (Arc::clone(&rx), Arc::clone(&done));
    mux.register_channel(&rx, HandleSignals::READABLE, move |_| {
        black_box(port.read());
        flag.store(true, Ordering::Release);
    });

    c.bench_function("dispatch_single_channel", |b| {
        b.iter(|| {
            done.store(false, Ordering::Relaxed);
            tx.write(black_box(&b"ping"[..])).expect("write");
            assert!(mux.wait(&[&*done]));
        })
    });
}

/// Benchmark: dispatch with 64 idle channels armed next to the active one.
fn bench_dispatch_among_idle(c: &mut Criterion) {
    let mux = multiplexer();
    let idle: Vec<_> = (0..64).map(|_| message_pipe()).collect();
    for (_, rx) in &idle {
        mux.register_channel(rx, HandleSignals::READABLE, |_| {});
    }

    let (tx, rx) = message_pipe();
    let done = Arc::new(AtomicBool::new(false));
    let (port, flag) = (Arc::clone(&rx), Arc::clone(&done));
    mux.register_channel(&rx, HandleSignals::READABLE, move |_| {
        black_box(port.read());
        flag.store(true, Ordering::Release);
    });

    c.bench_function("dispatch_among_64_idle", |b| {
        b.iter(|| {
            done.store(false, Ordering::Relaxed);
            tx.write(black_box(&b"ping"[..])).expect("write");
            assert!(mux.wait(&[&*done]));
        })
    });
}

/// Benchmark: register + unregister round on the multiplexer.
fn bench_register_unregister(c: &mut Criterion) {
    let mux = multiplexer();
    let (_tx, rx) = message_pipe();

    c.bench_function("register_unregister_channel", |b| {
        b.iter(|| {
            assert!(mux.register_channel(&rx, HandleSignals::READABLE, |_| {}));
            mux.unregister_channel(black_box(rx.handle()));
        })
    });
}

// ============================================================================
// Wait set / directory
// ============================================================================

/// Benchmark: auto-reset event signal -> block_for_one.
fn bench_event_block_for_one(c: &mut Criterion) {
    let mut ws = EventWaitSet::with_capacity(8).expect("wait set");
    let event = SignalEvent::shared(ResetPolicy::Automatic);
    ws.arm_event(&event).expect("arm");

    c.bench_function("event_block_for_one", |b| {
        b.iter(|| {
            event.signal();
            let reason = ws.block_for_one().expect("block");
            assert_eq!(reason, WakeReason::Event(event.id()));
        })
    });
}

/// Benchmark: Directory::current lookup of a live instance.
fn bench_directory_lookup(c: &mut Criterion) {
    let dir = Directory::default();
    let _keep = dir.current();

    c.bench_function("directory_current_hit", |b| {
        b.iter(|| black_box(dir.current()))
    });
}

criterion_group!(
    benches,
    bench_dispatch_single_channel,
    bench_dispatch_among_idle,
    bench_register_unregister,
    bench_event_block_for_one,
    bench_directory_lookup
);
criterion_main!(benches);
