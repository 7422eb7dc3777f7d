// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel readiness vocabulary: handles, signal masks, wait results, and the
//! [`Watchable`] contract a channel endpoint implements so a wait set can
//! observe it.

use crate::rt::waitset::WaitsetSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque key identifying one channel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    /// Allocate a process-unique handle.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Readiness signals a channel endpoint can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleSignals(u32);

impl HandleSignals {
    pub const NONE: HandleSignals = HandleSignals(0);

    /// At least one message is queued for reading.
    pub const READABLE: HandleSignals = HandleSignals(1 << 0);

    /// A write would be accepted.
    pub const WRITABLE: HandleSignals = HandleSignals(1 << 1);

    /// The other end of the channel is closed.
    pub const PEER_CLOSED: HandleSignals = HandleSignals(1 << 2);

    pub const ALL: HandleSignals = HandleSignals(0b111);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        HandleSignals(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set in `self`.
    #[must_use]
    pub const fn contains(&self, other: HandleSignals) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(&self, other: HandleSignals) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for HandleSignals {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        HandleSignals(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for HandleSignals {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        HandleSignals(self.0 & rhs.0)
    }
}

/// Snapshot of an endpoint's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleSignalsState {
    /// Signals raised right now.
    pub satisfied: HandleSignals,
    /// Signals that could still be raised in the future.
    pub satisfiable: HandleSignals,
}

impl HandleSignalsState {
    /// A wait on `watched` is ready now.
    #[must_use]
    pub fn satisfies(&self, watched: HandleSignals) -> bool {
        self.satisfied.intersects(watched)
    }

    /// A wait on `watched` can never complete.
    #[must_use]
    pub fn never_satisfies(&self, watched: HandleSignals) -> bool {
        !self.satisfiable.intersects(watched)
    }
}

/// Outcome delivered to a channel callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// One of the watched signals is raised.
    Ready(HandleSignalsState),
    /// The endpoint was closed or dropped while armed.
    Cancelled,
    /// None of the watched signals can ever be raised (e.g. waiting for
    /// `READABLE` on a drained channel whose peer closed).
    FailedPrecondition(HandleSignalsState),
}

impl WaitResult {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitResult::Ready(_))
    }
}

/// Contract between a channel endpoint and a wait set.
///
/// The endpoint keeps the attached [`WaitsetSignal`]s (weakly is fine) and
/// calls `signal()` on each whenever its [`HandleSignalsState`] changes.
pub trait Watchable: Send + Sync {
    fn handle(&self) -> ChannelHandle;

    fn signals_state(&self) -> HandleSignalsState;

    /// Closed endpoints cannot be armed.
    fn is_closed(&self) -> bool;

    /// Attach a wake signal. If the endpoint already satisfies something it
    /// should signal immediately.
    fn add_watcher(&self, signal: Arc<dyn WaitsetSignal>);

    /// Detach the signal with this id.
    fn remove_watcher(&self, signal_id: u64);
}
