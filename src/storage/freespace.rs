//! # Free-Space Manager
//!
//! Tracks byte ranges inside a file that were allocated once and have since
//! been released (unlinked datasets, shrunk chunks, superseded metadata
//! blocks). Allocation requests are served from these ranges before the file
//! grows at its end of allocated space.
//!
//! ## Structure
//!
//! ```text
//! by_offset:  BTreeMap<offset, len>        authoritative, sorted, no overlap,
//!                                          no two entries touching
//!
//! buckets[c]: BTreeSet<(len, offset)>      size class c = floor(log2(len))
//!   c=2  [ (4,960) (6,1200) ]
//!   c=5  [ (40,2048) ]
//!   c=12 [ (4096,128) ]
//! ```
//!
//! ## Allocation Strategy
//!
//! Best fit. The search starts in the request's size class at the first
//! `(len, offset) >= (request, 0)`; if that class has no fit, the smallest
//! entry of the next non-empty larger class wins. Ties break on the lower
//! offset, so the result depends only on the current free list. An entry
//! larger than the request is split and its tail stays free. `None` tells the
//! caller to grow the file.
//!
//! ## Reclaim
//!
//! `reclaim` rejects zero-length and overlapping ranges with `InvalidRange`,
//! then coalesces with the neighbours it touches on either side.
//!
//! ## Thread Safety
//!
//! Not synchronized. Every instance is owned by one `FileSpace` which lives
//! behind the registry mutex.

use std::collections::{BTreeMap, BTreeSet};

use eyre::Result;

use crate::error::H5Error;

const SIZE_CLASSES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub offset: u64,
    pub len: u64,
}

impl FreeRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

#[derive(Debug, Clone)]
pub struct FreeSpaceManager {
    by_offset: BTreeMap<u64, u64>,
    buckets: Vec<BTreeSet<(u64, u64)>>,
    total: u64,
}

impl Default for FreeSpaceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn size_class(len: u64) -> usize {
    debug_assert!(len > 0);
    (63 - len.leading_zeros()) as usize
}

impl FreeSpaceManager {
    pub fn new() -> Self {
        Self {
            by_offset: BTreeMap::new(),
            buckets: vec![BTreeSet::new(); SIZE_CLASSES],
            total: 0,
        }
    }

    /// Rebuilds a manager from persisted entries, validating each one.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = FreeRange>,
    {
        let mut fsm = Self::new();
        for e in entries {
            fsm.reclaim(e.offset, e.len)?;
        }
        Ok(fsm)
    }

    pub fn total_free_bytes(&self) -> u64 {
        self.total
    }

    pub fn entry_count(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Entries in address order.
    pub fn entries(&self) -> impl Iterator<Item = FreeRange> + '_ {
        self.by_offset
            .iter()
            .map(|(&offset, &len)| FreeRange { offset, len })
    }

    fn insert_entry(&mut self, offset: u64, len: u64) {
        self.by_offset.insert(offset, len);
        self.buckets[size_class(len)].insert((len, offset));
        self.total += len;
    }

    fn remove_entry(&mut self, offset: u64, len: u64) {
        self.by_offset.remove(&offset);
        self.buckets[size_class(len)].remove(&(len, offset));
        self.total -= len;
    }

    pub fn reclaim(&mut self, offset: u64, len: u64) -> Result<()> {
        let end = match offset.checked_add(len) {
            Some(end) if len > 0 => end,
            _ => return Err(H5Error::InvalidRange { offset, length: len }.into()),
        };

        let pred = self
            .by_offset
            .range(..=offset)
            .next_back()
            .map(|(&o, &l)| (o, l));
        let succ = self
            .by_offset
            .range(offset..)
            .next()
            .map(|(&o, &l)| (o, l));

        if let Some((po, pl)) = pred {
            if po + pl > offset {
                return Err(H5Error::InvalidRange { offset, length: len }.into());
            }
        }
        if let Some((so, _)) = succ {
            if so < end {
                return Err(H5Error::InvalidRange { offset, length: len }.into());
            }
        }

        let mut start = offset;
        let mut stop = end;
        if let Some((po, pl)) = pred {
            if po + pl == offset {
                self.remove_entry(po, pl);
                start = po;
            }
        }
        if let Some((so, sl)) = succ {
            if so == end {
                self.remove_entry(so, sl);
                stop = so + sl;
            }
        }

        self.insert_entry(start, stop - start);
        Ok(())
    }

    /// Best-fit allocation. Returns `None` when no entry is large enough.
    pub fn allocate(&mut self, len: u64) -> Option<u64> {
        if len == 0 {
            return None;
        }

        let first = size_class(len);
        let found = self.buckets[first]
            .range((len, 0)..)
            .next()
            .copied()
            .or_else(|| {
                self.buckets[first + 1..]
                    .iter()
                    .find_map(|bucket| bucket.iter().next().copied())
            });

        let (entry_len, offset) = found?;
        self.remove_entry(offset, entry_len);
        if entry_len > len {
            self.insert_entry(offset + len, entry_len - len);
        }
        Some(offset)
    }

    /// Removes every entry, returning them in address order.
    pub fn drain(&mut self) -> Vec<FreeRange> {
        let out: Vec<FreeRange> = self.entries().collect();
        self.by_offset.clear();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.total = 0;
        out
    }
}
