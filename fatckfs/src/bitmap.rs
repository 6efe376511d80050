// SPDX-License-Identifier: BSD-2-Clause

//! Fixed-size bit-vector over cluster indices.
//!
//! Two instances drive all corruption detection: the *used* bitmap
//! (all-clear at construction, set once per cluster as traversals claim
//! it) and the *head* bitmap (all-set at construction, cleared for every
//! cluster some entry points at). A `set` that finds the bit already set
//! is not an incidental error: it is the cross-link detector, so the
//! condition is returned to the caller instead of asserted away.

use crate::errors::{CheckError, CheckResult};

/// Bits per word-skip probe window, see [`ClusterBitmap::any_in_word`].
pub const WORD_BITS: usize = 64;

#[derive(Debug, Clone)]
pub struct ClusterBitmap {
    words: Vec<u64>,
    bits: usize,
    count: usize,
}

impl ClusterBitmap {
    /// Allocates a bitmap for `bits` clusters, every bit set to `fill`.
    ///
    /// Allocation is fallible on purpose: a FAT32 table can describe 2^28
    /// clusters and the checker must report allocation failure instead of
    /// aborting.
    pub fn try_new(bits: usize, fill: bool) -> CheckResult<Self> {
        let len = bits.div_ceil(WORD_BITS);
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| CheckError::Alloc("No space for cluster bitmap"))?;
        words.resize(len, if fill { u64::MAX } else { 0 });
        Ok(Self {
            words,
            bits,
            count: if fill { bits } else { 0 },
        })
    }

    /// Sets bit `i`. Returns `false` (without changing the count) when the
    /// bit was already set — the caller's corruption signal.
    #[inline]
    pub fn set(&mut self, i: usize) -> bool {
        debug_assert!(i < self.bits);
        let mask = 1u64 << (i % WORD_BITS);
        let word = &mut self.words[i / WORD_BITS];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.count += 1;
        true
    }

    /// Clears bit `i`. Returns `false` when the bit was already clear.
    #[inline]
    pub fn clear(&mut self, i: usize) -> bool {
        debug_assert!(i < self.bits);
        let mask = 1u64 << (i % WORD_BITS);
        let word = &mut self.words[i / WORD_BITS];
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        self.count -= 1;
        true
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.bits);
        self.words[i / WORD_BITS] & (1u64 << (i % WORD_BITS)) != 0
    }

    /// Number of set bits, maintained incrementally. Used as an upper
    /// bound to terminate sparse scans early.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether any bit is set in the word containing bit `i`. Lets a scan
    /// skip a whole all-clear `WORD_BITS` block in O(1).
    #[inline]
    pub fn any_in_word(&self, i: usize) -> bool {
        self.words[i / WORD_BITS] != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}
