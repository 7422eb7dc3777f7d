// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process message pipe.
//!
//! Two connected [`Endpoint`]s exchanging opaque byte messages. Each endpoint
//! implements [`Watchable`], so it can be registered on a wait multiplexer:
//! `READABLE` while its inbox is non-empty, `WRITABLE` while the peer is
//! open, `PEER_CLOSED` once the peer closed or was dropped.
//!
//! Messages are not framed or inspected.

use crate::error::{Error, Result};
use crate::rt::waitset::{WaitsetSignal, WatcherList};
use crate::signals::{ChannelHandle, HandleSignals, HandleSignalsState, Watchable};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Create a connected pair of endpoints.
pub fn message_pipe() -> (Arc<Endpoint>, Arc<Endpoint>) {
    let shared = Arc::new(PipeShared {
        sides: [Side::new(), Side::new()],
    });
    log::debug!(
        "[pipe] created {} <-> {}",
        shared.sides[0].handle,
        shared.sides[1].handle
    );
    (
        Arc::new(Endpoint {
            shared: Arc::clone(&shared),
            side: 0,
        }),
        Arc::new(Endpoint { shared, side: 1 }),
    )
}

struct PipeShared {
    sides: [Side; 2],
}

struct Side {
    handle: ChannelHandle,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
    watchers: WatcherList,
}

impl Side {
    fn new() -> Self {
        Self {
            handle: ChannelHandle::next(),
            inbox: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            watchers: WatcherList::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One end of a message pipe. Closed on drop.
pub struct Endpoint {
    shared: Arc<PipeShared>,
    side: usize,
}

impl Endpoint {
    fn own(&self) -> &Side {
        &self.shared.sides[self.side]
    }

    fn peer(&self) -> &Side {
        &self.shared.sides[self.side ^ 1]
    }

    /// Queue a message on the peer's inbox.
    ///
    /// `InvalidHandle` if this end is closed, `NotFound` if the peer is.
    pub fn write(&self, message: impl Into<Vec<u8>>) -> Result<()> {
        if self.own().is_closed() {
            return Err(Error::InvalidHandle);
        }
        let peer = self.peer();
        {
            let mut inbox = peer.inbox.lock();
            // Checked under the inbox lock so close() cannot interleave.
            if peer.is_closed() {
                return Err(Error::NotFound);
            }
            inbox.push_back(message.into());
        }
        peer.watchers.notify_all();
        Ok(())
    }

    /// Take the oldest queued message.
    pub fn read(&self) -> Option<Vec<u8>> {
        self.own().inbox.lock().pop_front()
    }

    /// Number of queued messages.
    pub fn pending(&self) -> usize {
        self.own().inbox.lock().len()
    }

    /// Close this end. Idempotent.
    pub fn close(&self) {
        let own = self.own();
        {
            let mut inbox = own.inbox.lock();
            if own.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            inbox.clear();
        }
        log::debug!("[pipe] closed {}", own.handle);
        own.watchers.notify_all();
        self.peer().watchers.notify_all();
    }
}

impl Watchable for Endpoint {
    fn handle(&self) -> ChannelHandle {
        self.own().handle
    }

    fn signals_state(&self) -> HandleSignalsState {
        let readable = self.pending() > 0;
        let peer_closed = self.peer().is_closed();

        let mut satisfied = HandleSignals::NONE;
        if readable {
            satisfied = satisfied | HandleSignals::READABLE;
        }
        let satisfiable = if peer_closed {
            satisfied = satisfied | HandleSignals::PEER_CLOSED;
            satisfied
        } else {
            satisfied = satisfied | HandleSignals::WRITABLE;
            HandleSignals::ALL
        };

        HandleSignalsState {
            satisfied,
            satisfiable,
        }
    }

    fn is_closed(&self) -> bool {
        self.own().is_closed()
    }

    fn add_watcher(&self, signal: Arc<dyn WaitsetSignal>) {
        self.own().watchers.add(&signal);
        let state = self.signals_state();
        if !state.satisfied.is_empty() {
            signal.signal();
        }
    }

    fn remove_watcher(&self, signal_id: u64) {
        self.own().watchers.remove(signal_id);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("handle", &self.own().handle)
            .field("pending", &self.pending())
            .field("closed", &self.own().is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_in_order() {
        let (a, b) = message_pipe();
        a.write(b"one".to_vec()).expect("write one");
        a.write("two").expect("write two");

        assert_eq!(b.pending(), 2);
        assert_eq!(b.read().as_deref(), Some(&b"one"[..]));
        assert_eq!(b.read().as_deref(), Some(&b"two"[..]));
        assert!(b.read().is_none());
        assert!(a.read().is_none());
    }

    #[test]
    fn readable_signal_tracks_inbox() {
        let (a, b) = message_pipe();
        assert!(!b.signals_state().satisfies(HandleSignals::READABLE));
        assert!(b.signals_state().satisfies(HandleSignals::WRITABLE));

        a.write("ping").expect("write");
        assert!(b.signals_state().satisfies(HandleSignals::READABLE));

        b.read();
        assert!(!b.signals_state().satisfies(HandleSignals::READABLE));
    }

    #[test]
    fn peer_close_raises_peer_closed() {
        let (a, b) = message_pipe();
        a.write("last words").expect("write");
        drop(a);

        let state = b.signals_state();
        assert!(state.satisfies(HandleSignals::PEER_CLOSED));
        assert!(state.satisfies(HandleSignals::READABLE));
        assert!(!state.satisfiable.contains(HandleSignals::WRITABLE));

        b.read();
        let state = b.signals_state();
        assert!(state.never_satisfies(HandleSignals::READABLE));
        assert!(matches!(b.write("echo"), Err(Error::NotFound)));
    }

    #[test]
    fn closed_end_rejects_writes() {
        let (a, _b) = message_pipe();
        a.close();
        a.close();
        assert!(a.is_closed());
        assert!(matches!(a.write("x"), Err(Error::InvalidHandle)));
    }

    #[test]
    fn handles_differ_per_end() {
        let (a, b) = message_pipe();
        assert_ne!(a.handle(), b.handle());
    }
}
