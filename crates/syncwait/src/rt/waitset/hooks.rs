// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::WaitsetSignal;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Wait-set signals attached to one watched resource.
///
/// Held weakly: a wait set that goes away without detaching simply stops
/// being notified, and its entry is pruned on the next add/notify.
#[derive(Default)]
pub struct WatcherList {
    hooks: Mutex<Vec<Hook>>,
}

struct Hook {
    id: u64,
    signal: Weak<dyn WaitsetSignal>,
}

impl WatcherList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, signal: &Arc<dyn WaitsetSignal>) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.strong_count() > 0);
        hooks.push(Hook {
            id: signal.id(),
            signal: Arc::downgrade(signal),
        });
    }

    pub fn remove(&self, signal_id: u64) {
        self.hooks.lock().retain(|hook| hook.id != signal_id);
    }

    /// Fire every live signal.
    pub fn notify_all(&self) {
        // Signal outside the lock.
        let live: Vec<Arc<dyn WaitsetSignal>> = {
            let mut hooks = self.hooks.lock();
            hooks.retain(|hook| hook.signal.strong_count() > 0);
            hooks.iter().filter_map(|hook| hook.signal.upgrade()).collect()
        };
        for signal in live {
            signal.signal();
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
