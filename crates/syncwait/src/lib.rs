// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # syncwait - per-context synchronous wait multiplexing
//!
//! Lets a sequence block on a synchronous call while still servicing every
//! other channel and event registered on the same context. One
//! [`WaitMultiplexer`] exists per execution context; nested waits issued from
//! callbacks share it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use syncwait::{message_pipe, HandleSignals, WaitMultiplexer};
//!
//! let (tx, rx) = message_pipe();
//! let mux = WaitMultiplexer::current();
//! let done = Arc::new(AtomicBool::new(false));
//!
//! let (reader, flag) = (Arc::clone(&rx), Arc::clone(&done));
//! mux.register_channel(&rx, HandleSignals::READABLE, move |_| {
//!     let _reply = reader.read();
//!     flag.store(true, Ordering::Release);
//! });
//!
//! tx.write("ping").unwrap();
//! assert!(mux.wait(&[&*done]));
//! mux.unregister_channel(syncwait::Watchable::handle(&*rx));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  ChannelWatcher / EventWatcher       (register-on-demand helpers)   |
//! +---------------------------------------------------------------------+
//! |  Directory          context -> Weak<WaitMultiplexer>                |
//! |    tier 1/2: sequence tokens (shared table)                          |
//! |    tier 3:   bare thread (thread-local slot)                         |
//! +---------------------------------------------------------------------+
//! |  WaitMultiplexer    handle/event -> callback, re-entrant wait loop  |
//! +---------------------------------------------------------------------+
//! |  WaitSet (trait)    EventWaitSet: level-triggered, one per call     |
//! |  WaitDriver         slots + eventfd/poll (condvar elsewhere)        |
//! +---------------------------------------------------------------------+
//! |  Watchable sources  pipe::Endpoint, SignalEvent                     |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`multiplexer`] - the wait loop (start here)
//! - [`directory`] - per-context instance lookup
//! - [`rt`] - wait sets and the driver beneath them
//! - [`context`] - sequence tokens and affinity checks

/// Runtime configuration (slot limits, environment overrides).
pub mod config;
/// Execution-context identity and sequence affinity.
pub mod context;
/// Per-context multiplexer directory.
pub mod directory;
/// Error type and result alias.
pub mod error;
/// Cross-thread signalable events.
pub mod event;
/// Re-entrant wait loop over registered channels and events.
pub mod multiplexer;
/// In-process message pipe implementing [`Watchable`].
pub mod pipe;
/// Wait driver and wait sets.
pub mod rt;
/// Channel handles, signal masks and wait results.
pub mod signals;
/// Single-item sync watchers.
pub mod watcher;

pub use config::WaitConfig;
pub use context::{ContextIdentity, ContextKey, ScopedLegacySequence, ScopedSequence, Token};
pub use directory::Directory;
pub use error::{Error, Result};
pub use event::{EventId, ResetPolicy, SignalEvent};
pub use multiplexer::{ChannelCallback, EventCallback, WaitMultiplexer};
pub use pipe::{message_pipe, Endpoint};
pub use rt::{EventWaitSet, WaitSet, WakeReason};
pub use signals::{ChannelHandle, HandleSignals, HandleSignalsState, WaitResult, Watchable};
pub use watcher::{ChannelWatcher, EventWatcher};
