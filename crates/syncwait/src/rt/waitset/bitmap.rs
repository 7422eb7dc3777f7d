// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::sync::atomic::{AtomicUsize, Ordering};

const WORD_BITS: usize = usize::BITS as usize;

/// Lock-free set of driver slots that were signalled since the last drain.
///
/// Writers are arbitrary threads (event `signal()`, pipe writes); the single
/// reader is the sequence blocked in the driver.
pub(super) struct ReadyBits {
    words: Box<[AtomicUsize]>,
    capacity: usize,
}

impl ReadyBits {
    pub(super) fn new(capacity: usize) -> Self {
        let words = (0..capacity.div_ceil(WORD_BITS))
            .map(|_| AtomicUsize::new(0))
            .collect();
        Self { words, capacity }
    }

    /// Mark `slot` ready. Returns `true` if it was already marked, in which
    /// case the caller does not need to kick the wake primitive again.
    pub(super) fn mark(&self, slot: usize) -> bool {
        if slot >= self.capacity {
            return true;
        }
        let bit = 1usize << (slot % WORD_BITS);
        let prev = self.words[slot / WORD_BITS].fetch_or(bit, Ordering::AcqRel);
        prev & bit != 0
    }

    /// Clear a single slot (used when a slot is released so a stale mark is
    /// not reported for the next owner).
    pub(super) fn clear(&self, slot: usize) {
        if slot >= self.capacity {
            return;
        }
        let bit = 1usize << (slot % WORD_BITS);
        self.words[slot / WORD_BITS].fetch_and(!bit, Ordering::AcqRel);
    }

    /// Take every marked slot, ascending.
    pub(super) fn drain_into(&self, out: &mut Vec<usize>) {
        for (word_idx, word) in self.words.iter().enumerate() {
            let mut value = word.swap(0, Ordering::AcqRel);
            while value != 0 {
                let bit = value.trailing_zeros() as usize;
                value &= value - 1;
                let slot = word_idx * WORD_BITS + bit;
                if slot < self.capacity {
                    out.push(slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_reports_previous_state() {
        let bits = ReadyBits::new(130);
        assert!(!bits.mark(3));
        assert!(bits.mark(3));
        assert!(!bits.mark(129));

        let mut out = Vec::new();
        bits.drain_into(&mut out);
        assert_eq!(out, vec![3, 129]);

        out.clear();
        bits.drain_into(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn clear_drops_stale_mark() {
        let bits = ReadyBits::new(8);
        bits.mark(5);
        bits.clear(5);
        let mut out = Vec::new();
        bits.drain_into(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_range_is_ignored() {
        let bits = ReadyBits::new(4);
        assert!(bits.mark(64));
        let mut out = Vec::new();
        bits.drain_into(&mut out);
        assert!(out.is_empty());
    }
}
