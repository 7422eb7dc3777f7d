// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wait sets: block until exactly one armed channel or event is ready.
//!
//! [`WaitSet`] is the capability the multiplexer composes; [`EventWaitSet`]
//! is the stock implementation on top of [`WaitDriver`].

mod bitmap;
mod driver;
mod event_waitset;
mod hooks;

pub use driver::{SlotRegistration, WaitDriver, WaitsetSignal, WaitsetWaitError};
pub use event_waitset::EventWaitSet;
pub use hooks::WatcherList;

use crate::error::Result;
use crate::event::{EventId, SignalEvent};
use crate::signals::{ChannelHandle, HandleSignals, WaitResult, Watchable};
use std::sync::Arc;

/// Why [`WaitSet::block_for_one`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// An armed channel is ready (or failed); `result` says which.
    Channel {
        handle: ChannelHandle,
        result: WaitResult,
    },
    /// An armed event is signalled.
    Event(EventId),
    /// Woken without a deliverable item.
    None,
}

/// Blocking multiplexer over channels and events.
///
/// Implementations are driven from a single sequence; arming and disarming
/// never block, only `block_for_one` does.
pub trait WaitSet: Send {
    /// Watch `channel` for any of `signals`.
    ///
    /// Fails with `AlreadyExists`, `InvalidHandle` (closed endpoint),
    /// `InvalidArgument` (empty mask) or `CapacityExceeded`.
    fn arm(&mut self, channel: &Arc<dyn Watchable>, signals: HandleSignals) -> Result<()>;

    /// Stop watching `handle`. `NotFound` if it was not armed.
    fn disarm(&mut self, handle: ChannelHandle) -> Result<()>;

    /// Watch `event`. `AlreadyExists` if it is already armed.
    fn arm_event(&mut self, event: &Arc<SignalEvent>) -> Result<()>;

    /// Stop watching the event. `NotFound` if it was not armed.
    fn disarm_event(&mut self, event: EventId) -> Result<()>;

    /// Whether `event` is currently armed.
    fn has_event(&self, event: EventId) -> bool;

    /// Block until one armed item is ready and report it.
    ///
    /// Exactly one item per call; simultaneous readiness is reported over
    /// successive calls. `Err` means the blocking primitive itself failed.
    fn block_for_one(&mut self) -> Result<WakeReason>;
}
