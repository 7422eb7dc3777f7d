// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic cross-thread event.
//!
//! A [`SignalEvent`] is unrelated to any channel: any thread may `signal()`
//! it (e.g. "background computation finished") and a wait set armed on it
//! wakes up the sequence blocked in the multiplexer.

use crate::rt::waitset::{WaitsetSignal, WatcherList};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a [`SignalEvent`], used as the multiplexer's event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ev#{}", self.0)
    }
}

/// What happens to the signalled state once a waiter observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Stays signalled until [`SignalEvent::reset`].
    Manual,
    /// Cleared by the wait set that delivers it; one delivery per signal.
    Automatic,
}

/// Signalable event that can be armed in a wait set.
pub struct SignalEvent {
    id: EventId,
    policy: ResetPolicy,
    signaled: AtomicBool,
    watchers: WatcherList,
}

impl SignalEvent {
    /// Create an unsignalled event.
    pub fn new(policy: ResetPolicy) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: EventId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            policy,
            signaled: AtomicBool::new(false),
            watchers: WatcherList::new(),
        }
    }

    /// Shorthand for `Arc::new(SignalEvent::new(policy))`.
    pub fn shared(policy: ResetPolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// Set the event and wake every attached wait set.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
        self.watchers.notify_all();
    }

    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Observe the signalled state on behalf of a waiter.
    ///
    /// Automatic-reset events are cleared atomically so exactly one waiter
    /// wins; manual-reset events are only read.
    pub fn try_consume(&self) -> bool {
        match self.policy {
            ResetPolicy::Manual => self.is_signaled(),
            ResetPolicy::Automatic => self.signaled.swap(false, Ordering::AcqRel),
        }
    }

    pub(crate) fn add_watcher(&self, signal: Arc<dyn WaitsetSignal>) {
        self.watchers.add(&signal);
        if self.is_signaled() {
            signal.signal();
        }
    }

    pub(crate) fn remove_watcher(&self, signal_id: u64) {
        self.watchers.remove(signal_id);
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

impl std::fmt::Debug for SignalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEvent")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
