// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-context multiplexer directory.
//!
//! Hands out "the" [`WaitMultiplexer`] of the calling execution context,
//! creating it on first use. The directory never owns an instance: it keeps
//! a `Weak` back-pointer, and the instance erases that entry from its own
//! `Drop`.
//!
//! # Layout
//!
//! ```text
//! Directory
//! +-- identity: Arc<dyn ContextIdentity>     (tier resolution)
//! +-- factory:  builds the wait set for a new instance
//! +-- table: Mutex<HashMap<ContextKey, Entry>>   tiers 1+2 (sequence tokens)
//!
//! THREAD_SLOTS (thread_local)                     tier 3 (bare threads)
//! +-- HashMap<directory id, Entry>
//! ```
//!
//! Sequence tokens can be resolved from several threads (a sequence hops
//! between pool workers), hence the lock; thread slots are only ever touched
//! by their own thread.

use crate::config::WaitConfig;
use crate::context::{ContextIdentity, ContextKey, SequenceChecker, ThreadContext};
use crate::error::Result;
use crate::multiplexer::WaitMultiplexer;
use crate::rt::waitset::{EventWaitSet, WaitSet};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Builds the wait set of a newly created multiplexer.
pub type WaitSetFactory = Arc<dyn Fn() -> Result<Box<dyn WaitSet>> + Send + Sync>;

/// Multiplexer for the calling context, from the process-wide directory.
pub fn current() -> Arc<WaitMultiplexer> {
    Directory::global().current()
}

struct Entry {
    instance_id: u64,
    mux: Weak<WaitMultiplexer>,
}

impl Entry {
    fn new(mux: &Arc<WaitMultiplexer>) -> Self {
        Self {
            instance_id: mux.instance_id(),
            mux: Arc::downgrade(mux),
        }
    }
}

thread_local! {
    static THREAD_SLOTS: RefCell<HashMap<u64, Entry>> = RefCell::new(HashMap::new());
}

/// Directory of live multiplexers, one per execution context.
pub struct Directory {
    shared: Arc<DirectoryShared>,
}

struct DirectoryShared {
    id: u64,
    identity: Arc<dyn ContextIdentity>,
    factory: WaitSetFactory,
    table: Mutex<HashMap<ContextKey, Entry>>,
}

impl Directory {
    /// Directory with an explicit identity provider and wait-set factory.
    pub fn new(identity: Arc<dyn ContextIdentity>, factory: WaitSetFactory) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            shared: Arc::new(DirectoryShared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                identity,
                factory,
                table: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Directory using [`ThreadContext`] and [`EventWaitSet`]s sized by
    /// `config`.
    pub fn with_config(config: WaitConfig) -> Self {
        let factory: WaitSetFactory = Arc::new(move || -> Result<Box<dyn WaitSet>> {
            let wait_set = EventWaitSet::new(&config)?;
            Ok(Box::new(wait_set) as Box<dyn WaitSet>)
        });
        Self::new(Arc::new(ThreadContext), factory)
    }

    /// The process-wide directory (configured from the environment).
    pub fn global() -> &'static Directory {
        static GLOBAL: OnceLock<Directory> = OnceLock::new();
        GLOBAL.get_or_init(|| Directory::with_config(WaitConfig::from_env()))
    }

    /// Multiplexer for the calling context, created if absent.
    ///
    /// # Panics
    ///
    /// If the wait-set factory fails (e.g. the process is out of file
    /// descriptors). Use [`Self::try_current`] to handle that case.
    #[allow(clippy::expect_used)] // no usable fallback without a wait set
    pub fn current(&self) -> Arc<WaitMultiplexer> {
        self.try_current()
            .expect("wait set creation failed for the current context")
    }

    /// Multiplexer for the calling context, created if absent.
    ///
    /// The factory runs while the sequence table is locked for tier 1/2
    /// contexts; it must not call back into this directory.
    pub fn try_current(&self) -> Result<Arc<WaitMultiplexer>> {
        let key = ContextKey::resolve(self.shared.identity.as_ref());
        match key {
            ContextKey::Thread(_) => self.thread_slot_get_or_create(key),
            _ => self.table_get_or_create(key),
        }
    }

    /// Live multiplexer for the calling context, without creating one.
    pub fn peek_current(&self) -> Option<Arc<WaitMultiplexer>> {
        let key = ContextKey::resolve(self.shared.identity.as_ref());
        match key {
            ContextKey::Thread(_) => THREAD_SLOTS.with(|slots| {
                slots
                    .borrow()
                    .get(&self.shared.id)
                    .and_then(|entry| entry.mux.upgrade())
            }),
            _ => self
                .shared
                .table
                .lock()
                .get(&key)
                .and_then(|entry| entry.mux.upgrade()),
        }
    }

    /// Whether the calling context has a bookkeeping entry (live or being
    /// torn down).
    pub fn contains_current(&self) -> bool {
        let key = ContextKey::resolve(self.shared.identity.as_ref());
        match key {
            ContextKey::Thread(_) => {
                THREAD_SLOTS.with(|slots| slots.borrow().contains_key(&self.shared.id))
            }
            _ => self.shared.table.lock().contains_key(&key),
        }
    }

    /// Number of sequence-token entries (tiers 1 and 2).
    pub fn sequence_entries(&self) -> usize {
        self.shared.table.lock().len()
    }

    fn create(&self, key: ContextKey) -> Result<Arc<WaitMultiplexer>> {
        let wait_set = (self.shared.factory)()?;
        let link = DirectoryLink {
            directory: Arc::downgrade(&self.shared),
            directory_id: self.shared.id,
            key,
        };
        let sequence = SequenceChecker::new(Arc::clone(&self.shared.identity));
        let mux = Arc::new(WaitMultiplexer::build(wait_set, sequence, Some(link)));
        log::debug!(
            "[directory] #{} created multiplexer #{} for {}",
            self.shared.id,
            mux.instance_id(),
            key
        );
        Ok(mux)
    }

    fn table_get_or_create(&self, key: ContextKey) -> Result<Arc<WaitMultiplexer>> {
        let mut table = self.shared.table.lock();

        if let Some(existing) = table.get(&key).and_then(|entry| entry.mux.upgrade()) {
            return Ok(existing);
        }

        // An entry whose instance is mid-drop is replaced here; its Drop
        // sees the new instance id and leaves the entry alone.
        let mux = self.create(key)?;
        table.insert(key, Entry::new(&mux));
        Ok(mux)
    }

    fn thread_slot_get_or_create(&self, key: ContextKey) -> Result<Arc<WaitMultiplexer>> {
        let id = self.shared.id;
        let existing = THREAD_SLOTS.with(|slots| {
            slots
                .borrow()
                .get(&id)
                .and_then(|entry| entry.mux.upgrade())
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        // Built outside the borrow: the factory is free to touch other
        // directories on this thread.
        let mux = self.create(key)?;
        THREAD_SLOTS.with(|slots| slots.borrow_mut().insert(id, Entry::new(&mux)));
        Ok(mux)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::with_config(WaitConfig::default())
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("id", &self.shared.id)
            .field("sequence_entries", &self.sequence_entries())
            .finish()
    }
}

/// Back-reference from a multiplexer to the entry it was created under.
pub(crate) struct DirectoryLink {
    directory: Weak<DirectoryShared>,
    directory_id: u64,
    key: ContextKey,
}

impl DirectoryLink {
    /// Erase the entry for `instance_id`. Called once, from the
    /// multiplexer's `Drop`, on its owning context.
    pub(crate) fn clear(self, instance_id: u64) {
        let outcome = match self.key {
            ContextKey::Thread(_) => {
                // Thread-local storage may already be gone at thread exit.
                THREAD_SLOTS
                    .try_with(|slots| {
                        clear_entry(&mut *slots.borrow_mut(), &self.directory_id, instance_id)
                    })
                    .unwrap_or(ClearOutcome::Removed)
            }
            key => match self.directory.upgrade() {
                Some(directory) => {
                    let mut table = directory.table.lock();
                    clear_entry(&mut *table, &key, instance_id)
                }
                // Directory dropped first; nothing left to clean.
                None => ClearOutcome::Removed,
            },
        };

        match outcome {
            ClearOutcome::Removed => {}
            ClearOutcome::Superseded => log::debug!(
                "[directory] #{}: entry for {} already replaced, keeping it",
                self.directory_id,
                self.key
            ),
            ClearOutcome::Missing => {
                if !std::thread::panicking() {
                    panic!(
                        "[directory] #{}: no entry for {} while dropping multiplexer #{}",
                        self.directory_id, self.key, instance_id
                    );
                }
            }
        }
    }
}

enum ClearOutcome {
    Removed,
    Superseded,
    Missing,
}

fn clear_entry<K>(map: &mut HashMap<K, Entry>, key: &K, instance_id: u64) -> ClearOutcome
where
    K: std::hash::Hash + Eq,
{
    match map.get(key) {
        Some(entry) if entry.instance_id == instance_id => {
            map.remove(key);
            ClearOutcome::Removed
        }
        Some(_) => ClearOutcome::Superseded,
        None => ClearOutcome::Missing,
    }
}
