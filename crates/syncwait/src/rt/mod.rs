// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime primitives: the wait driver and the wait sets built on it.

pub mod waitset;

pub use waitset::{
    EventWaitSet, SlotRegistration, WaitDriver, WaitSet, WaitsetSignal, WaitsetWaitError,
    WakeReason, WatcherList,
};
