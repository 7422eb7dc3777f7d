// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::similar_names)] // Test variable naming
#![allow(clippy::too_many_lines)] // Example/test code
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Re-entrant sync calls over message pipes.
//!
//! A "client" sequence issues a sync request on one pipe; while it waits, the
//! "service" on the other side calls back into the client over a second pipe
//! and the client must answer that nested request before its own reply can
//! arrive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syncwait::{
    message_pipe, Endpoint, EventWaitSet, HandleSignals, ResetPolicy, SignalEvent,
    WaitMultiplexer, Watchable,
};

fn multiplexer() -> Arc<WaitMultiplexer> {
    WaitMultiplexer::new(Box::new(
        EventWaitSet::with_capacity(32).expect("wait set"),
    ))
}

/// Echo service: answers `requests` requests on `port` after `delay`, then
/// hands the endpoint back so it stays open until joined.
fn spawn_echo(
    port: Arc<Endpoint>,
    requests: usize,
    delay: Duration,
) -> thread::JoinHandle<Arc<Endpoint>> {
    thread::spawn(move || {
        let mut served = 0;
        while served < requests {
            match port.read() {
                Some(msg) => {
                    thread::sleep(delay);
                    let mut reply = b"re:".to_vec();
                    reply.extend_from_slice(&msg);
                    if port.write(reply).is_err() {
                        break;
                    }
                    served += 1;
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        port
    })
}

#[test]
fn nested_request_is_served_while_outer_call_waits() {
    let mux = multiplexer();

    // Pipe 1: client -> service (outer sync call).
    let (client_port, service_port) = message_pipe();
    // Pipe 2: service -> client (callback into the client).
    let (callback_port, client_callback_port) = message_pipe();

    let outer_reply = Arc::new(AtomicBool::new(false));
    let nested_served = Arc::new(AtomicUsize::new(0));

    {
        let (port, flag) = (Arc::clone(&client_port), Arc::clone(&outer_reply));
        assert!(mux.register_channel(&client_port, HandleSignals::READABLE, move |_| {
            if port.read().is_some() {
                flag.store(true, Ordering::SeqCst);
            }
        }));
    }
    {
        let (port, served) = (Arc::clone(&client_callback_port), Arc::clone(&nested_served));
        assert!(mux.register_channel(
            &client_callback_port,
            HandleSignals::READABLE,
            move |_| {
                while let Some(msg) = port.read() {
                    port.write(msg).expect("answer nested request");
                    served.fetch_add(1, Ordering::SeqCst);
                }
            }
        ));
    }

    // Service: on request, call back into the client and only reply once the
    // callback was answered.
    let service = thread::spawn(move || {
        loop {
            if service_port.read().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        callback_port.write("who are you?").expect("callback");
        loop {
            if callback_port.read().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        service_port.write("done").expect("reply");
    });

    client_port.write("do work").expect("request");
    assert!(mux.wait(&[&*outer_reply]));
    assert_eq!(nested_served.load(Ordering::SeqCst), 1);

    service.join().expect("service");
    mux.unregister_channel(client_port.handle());
    mux.unregister_channel(client_callback_port.handle());
    assert_eq!(mux.registered_channels(), 0);
}

#[test]
fn nested_waits_unwind_in_order() {
    const DEPTH: usize = 4;

    let mux = multiplexer();
    let mut ports = Vec::new();
    let mut services = Vec::new();
    for _ in 0..DEPTH {
        let (client, service) = message_pipe();
        services.push(spawn_echo(service, 1, Duration::from_millis(2)));
        ports.push(client);
    }

    let flags: Arc<Vec<AtomicBool>> = Arc::new((0..DEPTH).map(|_| AtomicBool::new(false)).collect());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for level in 0..DEPTH {
        let port = Arc::clone(&ports[level]);
        let next = ports.get(level + 1).cloned();
        let weak = Arc::downgrade(&mux);
        let (flags, order) = (Arc::clone(&flags), Arc::clone(&order));
        mux.register_channel(&ports[level], HandleSignals::READABLE, move |_| {
            if port.read().is_none() {
                return;
            }
            // Reply for `level` arrived; go one level deeper before finishing.
            if let Some(next) = &next {
                next.write("deeper").expect("nested request");
                let mux = weak.upgrade().expect("multiplexer");
                assert!(mux.wait(&[&flags[level + 1]]));
            }
            order.lock().push(level);
            flags[level].store(true, Ordering::SeqCst);
        });
    }

    ports[0].write("start").expect("request");
    assert!(mux.wait(&[&flags[0]]));

    assert_eq!(*order.lock(), vec![3, 2, 1, 0]);
    for service in services {
        service.join().expect("service");
    }
}

#[test]
fn random_interleaving_of_channels_and_events() {
    const MESSAGES: usize = 64;

    let mux = multiplexer();
    let (tx_a, rx_a) = message_pipe();
    let (tx_b, rx_b) = message_pipe();
    let tick = SignalEvent::shared(ResetPolicy::Automatic);

    let received = Arc::new(AtomicUsize::new(0));
    let ticks = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    for rx in [&rx_a, &rx_b] {
        let (port, received, done) = (Arc::clone(rx), Arc::clone(&received), Arc::clone(&done));
        mux.register_channel(rx, HandleSignals::READABLE, move |_| {
            while port.read().is_some() {
                if received.fetch_add(1, Ordering::SeqCst) + 1 == MESSAGES {
                    done.store(true, Ordering::SeqCst);
                }
            }
        });
    }
    {
        let ticks = Arc::clone(&ticks);
        mux.register_event(&tick, move || {
            ticks.fetch_add(1, Ordering::SeqCst);
        });
    }

    let producer_tick = Arc::clone(&tick);
    let producer = thread::spawn(move || {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for i in 0..MESSAGES {
            let port = if rng.bool() { &tx_a } else { &tx_b };
            port.write(vec![i as u8]).expect("write");
            if rng.u8(..4) == 0 {
                producer_tick.signal();
            }
            if rng.bool() {
                thread::sleep(Duration::from_micros(rng.u64(50..500)));
            }
        }
        (tx_a, tx_b)
    });

    assert!(mux.wait(&[&*done]));
    assert_eq!(received.load(Ordering::SeqCst), MESSAGES);

    let _keep_open = producer.join().expect("producer");
    assert!(ticks.load(Ordering::SeqCst) <= MESSAGES);
}
