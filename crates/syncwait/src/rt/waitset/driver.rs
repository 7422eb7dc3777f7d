// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wait driver: slot bookkeeping plus the one blocking primitive.
//!
//! Every armed channel or event owns one slot. Watched resources hold a
//! [`WaitsetSignal`] for their slot and call `signal()` from any thread when
//! their state changes; the owning sequence blocks in [`WaitDriver::wait`]
//! and gets back the slots that fired.
//!
//! - Linux/Android: `eventfd` + `poll`.
//! - Elsewhere: `parking_lot` mutex/condvar pair.

use super::bitmap::ReadyBits;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Errors returned by [`WaitDriver::wait`].
#[derive(Debug)]
pub enum WaitsetWaitError {
    Timeout,
    Io(io::Error),
}

impl From<WaitsetWaitError> for Error {
    fn from(err: WaitsetWaitError) -> Self {
        match err {
            WaitsetWaitError::Timeout => {
                Error::IoError(io::Error::new(io::ErrorKind::TimedOut, "wait timed out"))
            }
            WaitsetWaitError::Io(err) => Error::IoError(err),
        }
    }
}

/// Handle given to a watched resource so it can wake the driver.
///
/// Resources keep these behind `Weak` and drop dead ones lazily; `id()` lets
/// a resource detach one specific registration.
pub trait WaitsetSignal: Send + Sync {
    /// Mark the associated slot ready and wake the waiter.
    fn signal(&self);

    /// Process-unique identifier for this registration.
    fn id(&self) -> u64;
}

/// Slot allocator + wake primitive shared with every outstanding signal.
#[derive(Clone)]
pub struct WaitDriver {
    inner: Arc<DriverInner>,
}

impl WaitDriver {
    /// Create a driver able to track `max_slots` concurrent registrations.
    pub fn new(max_slots: usize) -> Result<Self> {
        if max_slots == 0 {
            return Err(Error::InvalidArgument("max_slots must be > 0".into()));
        }

        let wake = platform::WakePrimitive::new()?;

        Ok(Self {
            inner: Arc::new(DriverInner {
                wake,
                ready: ReadyBits::new(max_slots),
                owners: (0..max_slots).map(|_| AtomicU64::new(0)).collect(),
                table: Mutex::new(SlotTable::default()),
                max_slots,
            }),
        })
    }

    /// Allocate a slot and the signal bound to it.
    pub fn register_slot(&self) -> Result<SlotRegistration> {
        self.inner.register_slot()
    }

    /// Release a slot. Returns `false` if `(slot, id)` is not a live
    /// registration.
    pub fn release_slot(&self, slot: usize, id: u64) -> bool {
        self.inner.release_slot(slot, id)
    }

    /// Block until at least one slot fired (or [`Self::notify`] was called)
    /// and append the fired slots to `out`.
    ///
    /// A wakeup may legitimately report nothing; callers loop.
    pub fn wait_into(
        &self,
        timeout: Option<Duration>,
        out: &mut Vec<usize>,
    ) -> core::result::Result<(), WaitsetWaitError> {
        self.inner.wake.wait(timeout)?;
        self.inner.wake.drain();
        self.inner.ready.drain_into(out);
        Ok(())
    }

    /// Convenience wrapper over [`Self::wait_into`].
    pub fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> core::result::Result<Vec<usize>, WaitsetWaitError> {
        let mut out = Vec::new();
        self.wait_into(timeout, &mut out)?;
        Ok(out)
    }

    /// Wake the waiter without marking any slot.
    pub fn notify(&self) {
        self.inner.wake.kick();
    }

    pub fn max_slots(&self) -> usize {
        self.inner.max_slots
    }

    /// Number of live registrations.
    pub fn live_slots(&self) -> usize {
        self.inner.table.lock().live
    }
}

struct DriverInner {
    wake: platform::WakePrimitive,
    ready: ReadyBits,
    /// Registration id currently owning each slot (0 = free). Lets a stale
    /// signal from a released registration become a no-op without locking.
    owners: Box<[AtomicU64]>,
    table: Mutex<SlotTable>,
    max_slots: usize,
}

impl DriverInner {
    fn register_slot(self: &Arc<Self>) -> Result<SlotRegistration> {
        // Process-wide: a resource watched by several drivers detaches hooks
        // by id.
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let slot = self.table.lock().allocate(self.max_slots)?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        self.ready.clear(slot);
        self.owners[slot].store(id, Ordering::Release);

        Ok(SlotRegistration {
            slot,
            id,
            signal: Arc::new(SlotSignal {
                driver: Arc::downgrade(self),
                slot,
                id,
            }),
        })
    }

    fn release_slot(&self, slot: usize, id: u64) -> bool {
        if slot >= self.max_slots {
            return false;
        }
        if self.owners[slot]
            .compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.ready.clear(slot);
        self.table.lock().release(slot);
        true
    }

    fn signal_slot(&self, slot: usize, id: u64) {
        if self.owners[slot].load(Ordering::Acquire) != id {
            return;
        }
        if !self.ready.mark(slot) {
            self.wake.kick();
        }
    }
}

#[derive(Default)]
struct SlotTable {
    free: Vec<usize>,
    high_water: usize,
    live: usize,
}

impl SlotTable {
    fn allocate(&mut self, max_slots: usize) -> Result<usize> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None if self.high_water < max_slots => {
                self.high_water += 1;
                self.high_water - 1
            }
            None => return Err(Error::CapacityExceeded(max_slots)),
        };

        self.live += 1;
        Ok(slot)
    }

    fn release(&mut self, slot: usize) {
        self.free.push(slot);
        self.live -= 1;
    }
}

/// Result of [`WaitDriver::register_slot`].
pub struct SlotRegistration {
    pub slot: usize,
    pub id: u64,
    pub signal: Arc<dyn WaitsetSignal>,
}

struct SlotSignal {
    driver: Weak<DriverInner>,
    slot: usize,
    id: u64,
}

impl WaitsetSignal for SlotSignal {
    fn signal(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.signal_slot(self.slot, self.id);
        }
    }

    fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use super::WaitsetWaitError;
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::time::{Duration, Instant};

    /// Non-blocking eventfd; the counter is the "something fired" latch.
    pub(super) struct WakePrimitive {
        fd: OwnedFd,
    }

    impl WakePrimitive {
        pub(super) fn new() -> io::Result<Self> {
            // SAFETY: eventfd takes no pointers; flags are valid constants.
            let raw = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
            if raw < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };
            Ok(Self { fd })
        }

        pub(super) fn wait(&self, timeout: Option<Duration>) -> Result<(), WaitsetWaitError> {
            let deadline = timeout.map(|t| Instant::now() + t);
            loop {
                let timeout_ms: libc::c_int = match deadline {
                    None => -1,
                    Some(deadline) => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        // Round up so a sub-millisecond remainder still sleeps.
                        let ms = left.as_micros().div_ceil(1000);
                        libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
                    }
                };

                let mut pollfd = libc::pollfd {
                    fd: self.fd.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                };
                // SAFETY: one valid pollfd on the stack, count matches.
                let res = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
                match res {
                    0 => return Err(WaitsetWaitError::Timeout),
                    n if n > 0 => return Ok(()),
                    _ => {
                        let err = io::Error::last_os_error();
                        if err.kind() == io::ErrorKind::Interrupted {
                            continue;
                        }
                        return Err(WaitsetWaitError::Io(err));
                    }
                }
            }
        }

        pub(super) fn kick(&self) {
            let one = 1u64.to_ne_bytes();
            loop {
                // SAFETY: 8-byte stack buffer, the size eventfd requires.
                let ret = unsafe { libc::write(self.fd.as_raw_fd(), one.as_ptr().cast(), one.len()) };
                if ret >= 0 {
                    return;
                }
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    // Counter saturated: the waiter is going to wake anyway.
                    io::ErrorKind::WouldBlock => return,
                    _ => {
                        log::debug!("[rt] eventfd write failed: {}", err);
                        return;
                    }
                }
            }
        }

        pub(super) fn drain(&self) {
            let mut buf = [0u8; 8];
            loop {
                // SAFETY: 8-byte stack buffer, the size eventfd requires.
                let ret =
                    unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
                if ret >= 0 {
                    return;
                }
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => return,
                    _ => {
                        log::debug!("[rt] eventfd read failed: {}", err);
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod platform {
    use super::WaitsetWaitError;
    use parking_lot::{Condvar, Mutex};
    use std::io;
    use std::time::{Duration, Instant};

    /// Latch + condvar fallback for platforms without eventfd.
    pub(super) struct WakePrimitive {
        pending: Mutex<bool>,
        cond: Condvar,
    }

    impl WakePrimitive {
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self {
                pending: Mutex::new(false),
                cond: Condvar::new(),
            })
        }

        pub(super) fn wait(&self, timeout: Option<Duration>) -> Result<(), WaitsetWaitError> {
            let deadline = timeout.map(|t| Instant::now() + t);
            let mut pending = self.pending.lock();
            while !*pending {
                match deadline {
                    None => self.cond.wait(&mut pending),
                    Some(deadline) => {
                        if self.cond.wait_until(&mut pending, deadline).timed_out() && !*pending {
                            return Err(WaitsetWaitError::Timeout);
                        }
                    }
                }
            }
            Ok(())
        }

        pub(super) fn kick(&self) {
            *self.pending.lock() = true;
            self.cond.notify_all();
        }

        pub(super) fn drain(&self) {
            *self.pending.lock() = false;
        }
    }
}
