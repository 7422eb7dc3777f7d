// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Execution-context identity.
//!
//! A logical sequence is identified by a [`Token`]. Task runners publish the
//! token of the sequence they are running on the current thread with
//! [`ScopedSequence`] (or [`ScopedLegacySequence`] for the older worker
//! pool); plain threads carry no token and fall back to their thread id.
//!
//! ```text
//! resolve():
//!   modern token?  -> ContextKey::Sequence
//!   legacy token?  -> ContextKey::Legacy
//!   otherwise      -> ContextKey::Thread(current thread)
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, LocalKey, ThreadId};

/// Identifier of one logical sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    /// Allocate a process-unique token.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static CURRENT_SEQUENCE: Cell<Option<Token>> = const { Cell::new(None) };
    static CURRENT_LEGACY: Cell<Option<Token>> = const { Cell::new(None) };
}

fn swap_token(slot: &'static LocalKey<Cell<Option<Token>>>, token: Option<Token>) -> Option<Token> {
    slot.with(|cell| cell.replace(token))
}

/// Marks the current thread as running `token`'s sequence until dropped.
///
/// Guards nest; dropping restores the previous token. Not `Send`: it must be
/// dropped on the thread that created it.
#[must_use = "the sequence is only current while the guard lives"]
pub struct ScopedSequence {
    prev: Option<Token>,
    _thread_bound: PhantomData<*const ()>,
}

impl ScopedSequence {
    pub fn enter(token: Token) -> Self {
        Self {
            prev: swap_token(&CURRENT_SEQUENCE, Some(token)),
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for ScopedSequence {
    fn drop(&mut self) {
        swap_token(&CURRENT_SEQUENCE, self.prev);
    }
}

/// Legacy-pool counterpart of [`ScopedSequence`].
#[must_use = "the sequence is only current while the guard lives"]
pub struct ScopedLegacySequence {
    prev: Option<Token>,
    _thread_bound: PhantomData<*const ()>,
}

impl ScopedLegacySequence {
    pub fn enter(token: Token) -> Self {
        Self {
            prev: swap_token(&CURRENT_LEGACY, Some(token)),
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for ScopedLegacySequence {
    fn drop(&mut self) {
        swap_token(&CURRENT_LEGACY, self.prev);
    }
}

/// Source of the current sequence identity.
pub trait ContextIdentity: Send + Sync {
    fn current_modern_token(&self) -> Option<Token>;

    fn current_legacy_token(&self) -> Option<Token>;
}

/// Default identity: the tokens published by the scoped guards above.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadContext;

impl ContextIdentity for ThreadContext {
    fn current_modern_token(&self) -> Option<Token> {
        CURRENT_SEQUENCE.with(Cell::get)
    }

    fn current_legacy_token(&self) -> Option<Token> {
        CURRENT_LEGACY.with(Cell::get)
    }
}

/// Resolved identity of a context, in tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Sequence(Token),
    Legacy(Token),
    Thread(ThreadId),
}

impl ContextKey {
    /// Resolve the calling context against `identity`.
    pub fn resolve(identity: &dyn ContextIdentity) -> Self {
        if let Some(token) = identity.current_modern_token() {
            return ContextKey::Sequence(token);
        }
        if let Some(token) = identity.current_legacy_token() {
            return ContextKey::Legacy(token);
        }
        ContextKey::Thread(thread::current().id())
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextKey::Sequence(token) => write!(f, "sequence:{}", token.0),
            ContextKey::Legacy(token) => write!(f, "legacy:{}", token.0),
            ContextKey::Thread(id) => write!(f, "thread:{:?}", id),
        }
    }
}

/// Remembers the context that created an object and checks later callers
/// against it.
pub struct SequenceChecker {
    owner: ContextKey,
    identity: Arc<dyn ContextIdentity>,
}

impl SequenceChecker {
    /// Bind to the calling context.
    pub fn new(identity: Arc<dyn ContextIdentity>) -> Self {
        let owner = ContextKey::resolve(identity.as_ref());
        Self { owner, identity }
    }

    pub fn owner(&self) -> ContextKey {
        self.owner
    }

    pub fn current(&self) -> ContextKey {
        ContextKey::resolve(self.identity.as_ref())
    }

    pub fn called_on_valid_sequence(&self) -> bool {
        self.current() == self.owner
    }
}

impl std::fmt::Debug for SequenceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceChecker")
            .field("owner", &self.owner)
            .finish()
    }
}
