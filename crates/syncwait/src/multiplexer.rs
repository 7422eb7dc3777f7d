// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-context synchronous wait multiplexer.
//!
//! One [`WaitMultiplexer`] exists per execution context (see
//! [`crate::directory`]). Callers register the channels and events they want
//! to hear about, each with a callback, then call [`WaitMultiplexer::wait`]
//! with one or more stop flags. Each wakeup of the underlying [`WaitSet`]
//! dispatches exactly one callback; flags are re-checked before every block.
//!
//! # Re-entrancy
//!
//! A callback may call `wait` again on the same instance (a nested sync call
//! issued while handling an incoming message). The nested loop has its own
//! stop flags; registrations are shared by every nesting level, so messages
//! for an outer waiter are still dispatched while the inner one blocks.
//!
//! ```text
//! wait([outer])
//!   block -> ch A ready -> A's callback
//!                            wait([inner])
//!                              block -> ch B ready -> B's callback sets inner
//!                            <- true
//!   block -> ...             (outer keeps looping until `outer` is set)
//! ```
//!
//! No lock is held while a callback runs.

use crate::context::{ContextIdentity, ContextKey, SequenceChecker, ThreadContext};
use crate::directory::DirectoryLink;
use crate::event::{EventId, SignalEvent};
use crate::rt::waitset::{WaitSet, WakeReason};
use crate::signals::{ChannelHandle, HandleSignals, WaitResult, Watchable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked when a registered channel becomes ready.
pub type ChannelCallback = Arc<dyn Fn(WaitResult) + Send + Sync>;

/// Callback invoked when a registered event is signalled.
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Registration tables and the wait set they are mirrored into.
///
/// Invariant: `handles.keys() ∪ events.keys()` is exactly the armed set of
/// `wait_set`.
struct Inner {
    wait_set: Box<dyn WaitSet>,
    handles: HashMap<ChannelHandle, ChannelCallback>,
    events: HashMap<EventId, EventCallback>,
}

impl Inner {
    fn is_empty(&self) -> bool {
        self.handles.is_empty() && self.events.is_empty()
    }
}

/// Blocks the owning sequence until one of its registered channels/events
/// is ready, dispatching callbacks until a stop flag is set.
pub struct WaitMultiplexer {
    instance_id: u64,
    inner: Mutex<Inner>,
    sequence: SequenceChecker,
    directory: Option<DirectoryLink>,
}

impl WaitMultiplexer {
    /// Multiplexer for the calling context, from the process-wide directory.
    pub fn current() -> Arc<Self> {
        crate::directory::current()
    }

    /// Stand-alone multiplexer bound to the calling context (thread
    /// identity), not tracked by any directory.
    pub fn new(wait_set: Box<dyn WaitSet>) -> Arc<Self> {
        Self::with_identity(wait_set, Arc::new(ThreadContext))
    }

    /// Stand-alone multiplexer bound to the calling context as seen by
    /// `identity`.
    pub fn with_identity(
        wait_set: Box<dyn WaitSet>,
        identity: Arc<dyn ContextIdentity>,
    ) -> Arc<Self> {
        Arc::new(Self::build(wait_set, SequenceChecker::new(identity), None))
    }

    pub(crate) fn build(
        wait_set: Box<dyn WaitSet>,
        sequence: SequenceChecker,
        directory: Option<DirectoryLink>,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let instance_id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[syncwait] multiplexer #{} created for {}",
            instance_id,
            sequence.owner()
        );

        Self {
            instance_id,
            inner: Mutex::new(Inner {
                wait_set,
                handles: HashMap::new(),
                events: HashMap::new(),
            }),
            sequence,
            directory,
        }
    }

    /// Watch `channel` for `signals`; `callback` runs on every wakeup it
    /// causes.
    ///
    /// Returns `false` (and changes nothing) if the channel is already
    /// registered or the wait set refuses it (closed endpoint, empty mask,
    /// no free slot).
    pub fn register_channel<W, F>(&self, channel: &Arc<W>, signals: HandleSignals, callback: F) -> bool
    where
        W: Watchable + 'static,
        F: Fn(WaitResult) + Send + Sync + 'static,
    {
        self.assert_on_sequence("register_channel");

        let channel: Arc<dyn Watchable> = Arc::clone(channel) as Arc<dyn Watchable>;
        let handle = channel.handle();
        let mut inner = self.inner.lock();

        if inner.handles.contains_key(&handle) {
            log::debug!("[syncwait] {} already registered", handle);
            return false;
        }
        if let Err(err) = inner.wait_set.arm(&channel, signals) {
            log::debug!("[syncwait] wait set refused {}: {}", handle, err);
            return false;
        }

        inner.handles.insert(handle, Arc::new(callback));
        true
    }

    /// Stop watching `handle`. No-op if it is not registered.
    pub fn unregister_channel(&self, handle: ChannelHandle) {
        self.assert_on_sequence("unregister_channel");

        let removed = {
            let mut inner = self.inner.lock();
            let Some(callback) = inner.handles.remove(&handle) else {
                return;
            };
            if let Err(err) = inner.wait_set.disarm(handle) {
                panic!(
                    "[syncwait] {} registered but not armed in the wait set: {}",
                    handle, err
                );
            }
            callback
        };
        // Captured state may unregister other items when it drops.
        drop(removed);
    }

    /// Watch `event`; `callback` runs each time it is delivered.
    ///
    /// Returns `false` (and changes nothing) if the event is already
    /// registered or already known to the wait set.
    pub fn register_event<F>(&self, event: &Arc<SignalEvent>, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.assert_on_sequence("register_event");

        let id = event.id();
        let mut inner = self.inner.lock();

        if inner.events.contains_key(&id) || inner.wait_set.has_event(id) {
            log::debug!("[syncwait] {} already registered", id);
            return false;
        }
        if let Err(err) = inner.wait_set.arm_event(event) {
            log::debug!("[syncwait] wait set refused {}: {}", id, err);
            return false;
        }

        inner.events.insert(id, Arc::new(callback));
        true
    }

    /// Stop watching `event`. No-op if it is not registered.
    pub fn unregister_event(&self, event: EventId) {
        self.assert_on_sequence("unregister_event");

        let removed = {
            let mut inner = self.inner.lock();
            let Some(callback) = inner.events.remove(&event) else {
                return;
            };
            if let Err(err) = inner.wait_set.disarm_event(event) {
                panic!(
                    "[syncwait] {} registered but not armed in the wait set: {}",
                    event, err
                );
            }
            callback
        };
        drop(removed);
    }

    /// Dispatch ready callbacks until any of `stop_flags` is set.
    ///
    /// Flags are checked before every block, including the first, so a flag
    /// that is already set returns immediately without dispatching anything.
    /// Returns `true` when a flag stopped the loop, `false` if the wait set
    /// failed or there was nothing registered to wait for.
    pub fn wait(self: &Arc<Self>, stop_flags: &[&AtomicBool]) -> bool {
        self.assert_on_sequence("wait");
        debug_assert!(
            !stop_flags.is_empty(),
            "[syncwait] wait() without stop flags can never return true"
        );

        // Held for the whole call: a callback may drop the last external
        // reference to this instance.
        let this = Arc::clone(self);

        loop {
            if stop_flags.iter().any(|flag| flag.load(Ordering::Acquire)) {
                return true;
            }

            let reason = {
                let mut inner = this.inner.lock();
                let armed = !inner.is_empty();
                debug_assert!(
                    armed,
                    "[syncwait] wait() with nothing registered would block forever"
                );
                if !armed {
                    log::error!(
                        "[syncwait] multiplexer #{}: wait() with nothing registered, giving up",
                        this.instance_id
                    );
                    return false;
                }
                inner.wait_set.block_for_one()
            };

            match reason {
                Ok(WakeReason::Channel { handle, result }) => {
                    let callback = this.inner.lock().handles.get(&handle).cloned();
                    let Some(callback) = callback else {
                        panic!(
                            "[syncwait] wait set reported {} which has no registration",
                            handle
                        );
                    };
                    callback(result);
                }
                Ok(WakeReason::Event(id)) => {
                    let callback = this.inner.lock().events.get(&id).cloned();
                    let Some(callback) = callback else {
                        panic!(
                            "[syncwait] wait set reported {} which has no registration",
                            id
                        );
                    };
                    callback();
                }
                Ok(WakeReason::None) => {}
                Err(err) => {
                    log::error!(
                        "[syncwait] multiplexer #{}: wait set failed: {}",
                        this.instance_id,
                        err
                    );
                    return false;
                }
            }
        }
    }

    /// Process-unique id of this instance.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Context this instance is bound to.
    pub fn owner(&self) -> ContextKey {
        self.sequence.owner()
    }

    /// Number of registered channels.
    ///
    /// Like the other introspection calls, only valid on the owning
    /// sequence; elsewhere it would block behind a running `wait`.
    pub fn registered_channels(&self) -> usize {
        self.assert_on_sequence("registered_channels");
        self.inner.lock().handles.len()
    }

    pub fn registered_events(&self) -> usize {
        self.assert_on_sequence("registered_events");
        self.inner.lock().events.len()
    }

    pub fn is_channel_registered(&self, handle: ChannelHandle) -> bool {
        self.assert_on_sequence("is_channel_registered");
        self.inner.lock().handles.contains_key(&handle)
    }

    pub fn is_event_registered(&self, event: EventId) -> bool {
        self.assert_on_sequence("is_event_registered");
        self.inner.lock().events.contains_key(&event)
    }

    fn assert_on_sequence(&self, op: &str) {
        assert!(
            self.sequence.called_on_valid_sequence(),
            "[syncwait] {} on multiplexer #{} from {} (owned by {})",
            op,
            self.instance_id,
            self.sequence.current(),
            self.sequence.owner()
        );
    }
}

impl Drop for WaitMultiplexer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.assert_on_sequence("drop");
        }
        log::debug!("[syncwait] multiplexer #{} destroyed", self.instance_id);
        if let Some(link) = self.directory.take() {
            link.clear(self.instance_id);
        }
    }
}

impl std::fmt::Debug for WaitMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("WaitMultiplexer");
        out.field("instance_id", &self.instance_id)
            .field("owner", &self.sequence.owner());
        // Held by the owner for as long as it blocks in `wait`.
        match self.inner.try_lock() {
            Some(inner) => out
                .field("channels", &inner.handles.len())
                .field("events", &inner.events.len()),
            None => out.field("state", &"<waiting>"),
        };
        out.finish()
    }
}
