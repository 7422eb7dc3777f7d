// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stock [`WaitSet`] backed by a [`WaitDriver`].
//!
//! Each armed item owns one driver slot. Delivery is level-triggered: a
//! channel that stays readable, or a manual-reset event that stays set, is
//! reported again on the next call. Slots reported by the driver are queued
//! in the order they fired and re-validated before delivery, so an item
//! disarmed while pending is never reported.

use super::{WaitDriver, WaitSet, WaitsetSignal, WakeReason};
use crate::config::WaitConfig;
use crate::error::{Error, Result};
use crate::event::{EventId, SignalEvent};
use crate::signals::{ChannelHandle, HandleSignals, WaitResult, Watchable};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

pub struct EventWaitSet {
    driver: WaitDriver,
    /// Indexed by driver slot.
    slots: Vec<Option<Armed>>,
    channels: HashMap<ChannelHandle, usize>,
    events: HashMap<EventId, usize>,
    pending: VecDeque<usize>,
    cursor: usize,
    scratch: Vec<usize>,
}

struct Armed {
    slot_id: u64,
    signal: Arc<dyn WaitsetSignal>,
    target: Target,
}

enum Target {
    Channel {
        handle: ChannelHandle,
        source: Weak<dyn Watchable>,
        signals: HandleSignals,
        cancel_delivered: bool,
    },
    Event {
        id: EventId,
        event: Weak<SignalEvent>,
    },
}

impl EventWaitSet {
    /// Create a wait set sized from `config`.
    pub fn new(config: &WaitConfig) -> Result<Self> {
        config.validate()?;
        Self::with_capacity(config.max_slots)
    }

    /// Create a wait set able to arm `max_slots` items at once.
    pub fn with_capacity(max_slots: usize) -> Result<Self> {
        Ok(Self {
            driver: WaitDriver::new(max_slots)?,
            slots: Vec::new(),
            channels: HashMap::new(),
            events: HashMap::new(),
            pending: VecDeque::new(),
            cursor: 0,
            scratch: Vec::new(),
        })
    }

    /// Number of armed items.
    pub fn armed_len(&self) -> usize {
        self.channels.len() + self.events.len()
    }

    fn install(&mut self, slot: usize, armed: Armed) {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(armed);
    }

    fn release(&mut self, slot: usize) {
        let Some(armed) = self.slots.get_mut(slot).and_then(Option::take) else {
            return;
        };
        let signal_id = armed.signal.id();
        match &armed.target {
            Target::Channel { source, .. } => {
                if let Some(source) = source.upgrade() {
                    source.remove_watcher(signal_id);
                }
            }
            Target::Event { event, .. } => {
                if let Some(event) = event.upgrade() {
                    event.remove_watcher(signal_id);
                }
            }
        }
        self.pending.retain(|&pending| pending != slot);
        if !self.driver.release_slot(slot, armed.slot_id) {
            log::debug!("[waitset] slot {} already released", slot);
        }
    }

    /// Deliverable wake reason for `slot`, if it is armed and ready now.
    fn poll_slot(&mut self, slot: usize) -> Option<WakeReason> {
        let armed = self.slots.get_mut(slot)?.as_mut()?;
        match &mut armed.target {
            Target::Channel {
                handle,
                source,
                signals,
                cancel_delivered,
            } => {
                let live = source.upgrade().filter(|source| !source.is_closed());
                let Some(source) = live else {
                    if *cancel_delivered {
                        return None;
                    }
                    *cancel_delivered = true;
                    return Some(WakeReason::Channel {
                        handle: *handle,
                        result: WaitResult::Cancelled,
                    });
                };

                let state = source.signals_state();
                let result = if state.satisfies(*signals) {
                    WaitResult::Ready(state)
                } else if state.never_satisfies(*signals) {
                    WaitResult::FailedPrecondition(state)
                } else {
                    return None;
                };
                Some(WakeReason::Channel {
                    handle: *handle,
                    result,
                })
            }
            Target::Event { id, event } => event
                .upgrade()
                .filter(|event| event.try_consume())
                .map(|_| WakeReason::Event(*id)),
        }
    }

    fn scan_ready(&mut self) -> Option<WakeReason> {
        let len = self.slots.len();
        for step in 0..len {
            let slot = (self.cursor + step) % len;
            if let Some(reason) = self.poll_slot(slot) {
                self.cursor = (slot + 1) % len;
                return Some(reason);
            }
        }
        None
    }
}

impl WaitSet for EventWaitSet {
    fn arm(&mut self, channel: &Arc<dyn Watchable>, signals: HandleSignals) -> Result<()> {
        let handle = channel.handle();
        if signals.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "empty signal mask for {}",
                handle
            )));
        }
        if self.channels.contains_key(&handle) {
            return Err(Error::AlreadyExists);
        }
        if channel.is_closed() {
            return Err(Error::InvalidHandle);
        }

        let registration = self.driver.register_slot()?;
        let signal = Arc::clone(&registration.signal);
        self.install(
            registration.slot,
            Armed {
                slot_id: registration.id,
                signal: registration.signal,
                target: Target::Channel {
                    handle,
                    source: Arc::downgrade(channel),
                    signals,
                    cancel_delivered: false,
                },
            },
        );
        self.channels.insert(handle, registration.slot);
        channel.add_watcher(signal);

        log::debug!(
            "[waitset] armed {} signals={:#x} slot={}",
            handle,
            signals.bits(),
            registration.slot
        );
        Ok(())
    }

    fn disarm(&mut self, handle: ChannelHandle) -> Result<()> {
        let slot = self.channels.remove(&handle).ok_or(Error::NotFound)?;
        self.release(slot);
        log::debug!("[waitset] disarmed {} slot={}", handle, slot);
        Ok(())
    }

    fn arm_event(&mut self, event: &Arc<SignalEvent>) -> Result<()> {
        let id = event.id();
        if self.events.contains_key(&id) {
            return Err(Error::AlreadyExists);
        }

        let registration = self.driver.register_slot()?;
        let signal = Arc::clone(&registration.signal);
        self.install(
            registration.slot,
            Armed {
                slot_id: registration.id,
                signal: registration.signal,
                target: Target::Event {
                    id,
                    event: Arc::downgrade(event),
                },
            },
        );
        self.events.insert(id, registration.slot);
        event.add_watcher(signal);

        log::debug!("[waitset] armed {} slot={}", id, registration.slot);
        Ok(())
    }

    fn disarm_event(&mut self, event: EventId) -> Result<()> {
        let slot = self.events.remove(&event).ok_or(Error::NotFound)?;
        self.release(slot);
        log::debug!("[waitset] disarmed {} slot={}", event, slot);
        Ok(())
    }

    fn has_event(&self, event: EventId) -> bool {
        self.events.contains_key(&event)
    }

    fn block_for_one(&mut self) -> Result<WakeReason> {
        loop {
            while let Some(slot) = self.pending.pop_front() {
                if let Some(reason) = self.poll_slot(slot) {
                    return Ok(reason);
                }
            }

            if let Some(reason) = self.scan_ready() {
                return Ok(reason);
            }

            self.scratch.clear();
            self.driver.wait_into(None, &mut self.scratch)?;
            self.pending.extend(self.scratch.drain(..));
        }
    }
}

impl Drop for EventWaitSet {
    fn drop(&mut self) {
        for slot in 0..self.slots.len() {
            self.release(slot);
        }
    }
}
