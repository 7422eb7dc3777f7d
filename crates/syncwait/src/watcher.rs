// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-item convenience watchers.
//!
//! [`ChannelWatcher`] and [`EventWatcher`] wrap one registration on the
//! context's [`WaitMultiplexer`]. The item is only registered while someone
//! needs it: for the duration of a [`sync_watch`](ChannelWatcher::sync_watch)
//! call, or permanently after
//! [`allow_woken_up_by_others`](ChannelWatcher::allow_woken_up_by_others),
//! which lets sync waits issued by *other* watchers on the same context
//! dispatch this item's callback too.

use crate::event::SignalEvent;
use crate::multiplexer::{ChannelCallback, EventCallback, WaitMultiplexer};
use crate::signals::{HandleSignals, WaitResult, Watchable};
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Reference-counted registration state.
#[derive(Debug, Default)]
struct Registration {
    requests: u32,
    registered: bool,
    allowed_by_others: bool,
}

impl Registration {
    fn acquire(&mut self, register: impl FnOnce() -> bool) -> bool {
        self.requests += 1;
        if !self.registered {
            self.registered = register();
        }
        self.registered
    }

    fn release(&mut self, unregister: impl FnOnce()) {
        self.requests = self.requests.saturating_sub(1);
        if self.requests == 0 && self.registered {
            unregister();
            self.registered = false;
        }
    }
}

/// Watches one channel endpoint through the context's multiplexer.
pub struct ChannelWatcher<W: Watchable + 'static> {
    mux: Arc<WaitMultiplexer>,
    channel: Arc<W>,
    signals: HandleSignals,
    callback: ChannelCallback,
    state: Mutex<Registration>,
}

impl<W: Watchable + 'static> ChannelWatcher<W> {
    /// Watcher on the calling context's multiplexer. Nothing is registered
    /// yet.
    pub fn new<F>(channel: Arc<W>, signals: HandleSignals, callback: F) -> Self
    where
        F: Fn(WaitResult) + Send + Sync + 'static,
    {
        Self::with_multiplexer(WaitMultiplexer::current(), channel, signals, callback)
    }

    pub fn with_multiplexer<F>(
        mux: Arc<WaitMultiplexer>,
        channel: Arc<W>,
        signals: HandleSignals,
        callback: F,
    ) -> Self
    where
        F: Fn(WaitResult) + Send + Sync + 'static,
    {
        Self {
            mux,
            channel,
            signals,
            callback: Arc::new(callback),
            state: Mutex::new(Registration::default()),
        }
    }

    /// Keep the channel registered so sync waits by other watchers on this
    /// context also dispatch it. Idempotent.
    pub fn allow_woken_up_by_others(&self) {
        let mut state = self.state.lock();
        if state.allowed_by_others {
            return;
        }
        state.allowed_by_others = true;
        state.acquire(|| self.register());
    }

    /// Block until any of `stop_flags` is set, dispatching this channel (and
    /// whatever else is registered on the context) meanwhile.
    ///
    /// Returns `false` if the channel could not be registered or the wait
    /// failed.
    pub fn sync_watch(&self, stop_flags: &[&AtomicBool]) -> bool {
        if !self.state.lock().acquire(|| self.register()) {
            self.release();
            log::debug!(
                "[syncwait] sync_watch on {} refused: registration failed",
                self.channel.handle()
            );
            return false;
        }

        let stopped = self.mux.wait(stop_flags);
        self.release();
        stopped
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn register(&self) -> bool {
        let callback = Arc::clone(&self.callback);
        self.mux
            .register_channel(&self.channel, self.signals, move |result| callback(result))
    }

    fn release(&self) {
        let handle = self.channel.handle();
        self.state
            .lock()
            .release(|| self.mux.unregister_channel(handle));
    }
}

impl<W: Watchable + 'static> Drop for ChannelWatcher<W> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.registered {
            self.mux.unregister_channel(self.channel.handle());
            state.registered = false;
        }
    }
}

/// Watches one [`SignalEvent`] through the context's multiplexer.
pub struct EventWatcher {
    mux: Arc<WaitMultiplexer>,
    event: Arc<SignalEvent>,
    callback: EventCallback,
    state: Mutex<Registration>,
}

impl EventWatcher {
    pub fn new<F>(event: Arc<SignalEvent>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_multiplexer(WaitMultiplexer::current(), event, callback)
    }

    pub fn with_multiplexer<F>(mux: Arc<WaitMultiplexer>, event: Arc<SignalEvent>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            mux,
            event,
            callback: Arc::new(callback),
            state: Mutex::new(Registration::default()),
        }
    }

    /// See [`ChannelWatcher::allow_woken_up_by_others`].
    pub fn allow_woken_up_by_others(&self) {
        let mut state = self.state.lock();
        if state.allowed_by_others {
            return;
        }
        state.allowed_by_others = true;
        state.acquire(|| self.register());
    }

    /// See [`ChannelWatcher::sync_watch`].
    pub fn sync_watch(&self, stop_flags: &[&AtomicBool]) -> bool {
        if !self.state.lock().acquire(|| self.register()) {
            self.release();
            log::debug!(
                "[syncwait] sync_watch on {} refused: registration failed",
                self.event.id()
            );
            return false;
        }

        let stopped = self.mux.wait(stop_flags);
        self.release();
        stopped
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn register(&self) -> bool {
        let callback = Arc::clone(&self.callback);
        self.mux.register_event(&self.event, move || callback())
    }

    fn release(&self) {
        let id = self.event.id();
        self.state
            .lock()
            .release(|| self.mux.unregister_event(id));
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.registered {
            self.mux.unregister_event(self.event.id());
            state.registered = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ResetPolicy;
    use crate::pipe::message_pipe;
    use crate::rt::waitset::EventWaitSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn mux() -> Arc<WaitMultiplexer> {
        WaitMultiplexer::new(Box::new(
            EventWaitSet::with_capacity(16).expect("wait set"),
        ))
    }

    #[test]
    fn registered_only_during_sync_watch() {
        let mux = mux();
        let (tx, rx) = message_pipe();
        let done = Arc::new(AtomicBool::new(false));

        let (reader, d) = (Arc::clone(&rx), Arc::clone(&done));
        let watcher = ChannelWatcher::with_multiplexer(
            Arc::clone(&mux),
            Arc::clone(&rx),
            HandleSignals::READABLE,
            move |_| {
                reader.read();
                d.store(true, Ordering::SeqCst);
            },
        );
        assert!(!watcher.is_registered());

        tx.write("reply").expect("write");
        assert!(watcher.sync_watch(&[&*done]));
        assert!(!watcher.is_registered());
        assert_eq!(mux.registered_channels(), 0);
    }

    #[test]
    fn allowed_watcher_fires_during_other_sync_watch() {
        let mux = mux();
        let (tx_a, rx_a) = message_pipe();
        let (tx_b, rx_b) = message_pipe();
        let hits_a = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let (reader, h) = (Arc::clone(&rx_a), Arc::clone(&hits_a));
        let background = ChannelWatcher::with_multiplexer(
            Arc::clone(&mux),
            Arc::clone(&rx_a),
            HandleSignals::READABLE,
            move |_| {
                reader.read();
                h.fetch_add(1, Ordering::SeqCst);
            },
        );
        background.allow_woken_up_by_others();
        background.allow_woken_up_by_others();
        assert!(background.is_registered());

        let (reader, d) = (Arc::clone(&rx_b), Arc::clone(&done));
        let foreground = ChannelWatcher::with_multiplexer(
            Arc::clone(&mux),
            Arc::clone(&rx_b),
            HandleSignals::READABLE,
            move |_| {
                reader.read();
                d.store(true, Ordering::SeqCst);
            },
        );

        tx_a.write("incoming").expect("write a");
        tx_b.write("reply").expect("write b");
        assert!(foreground.sync_watch(&[&*done]));
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert!(background.is_registered());

        drop(background);
        assert_eq!(mux.registered_channels(), 0);
    }

    #[test]
    fn sync_watch_on_closed_channel_fails() {
        let mux = mux();
        let (_tx, rx) = message_pipe();
        rx.close();
        let watcher =
            ChannelWatcher::with_multiplexer(Arc::clone(&mux), rx, HandleSignals::READABLE, |_| {});

        let never = AtomicBool::new(false);
        assert!(!watcher.sync_watch(&[&never]));
        assert!(!watcher.is_registered());
    }

    #[test]
    fn event_watcher_waits_for_signal() {
        let mux = mux();
        let event = SignalEvent::shared(ResetPolicy::Manual);
        let done = Arc::new(AtomicBool::new(false));

        let d = Arc::clone(&done);
        let watcher = EventWatcher::with_multiplexer(Arc::clone(&mux), Arc::clone(&event), move || {
            d.store(true, Ordering::SeqCst);
        });

        let remote = Arc::clone(&event);
        let signaller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.signal();
        });

        assert!(watcher.sync_watch(&[&*done]));
        signaller.join().expect("join");
        assert!(!watcher.is_registered());
        assert_eq!(mux.registered_events(), 0);
    }

    #[test]
    fn registration_refcount() {
        let mut reg = Registration::default();
        let mut registered = 0;
        let mut unregistered = 0;

        assert!(reg.acquire(|| {
            registered += 1;
            true
        }));
        assert!(reg.acquire(|| {
            registered += 1;
            true
        }));
        reg.release(|| unregistered += 1);
        assert_eq!(unregistered, 0);
        reg.release(|| unregistered += 1);

        assert_eq!(registered, 1);
        assert_eq!(unregistered, 1);
        assert!(!reg.registered);
    }
}
