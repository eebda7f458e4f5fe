//! # File Space
//!
//! `FileSpace` owns a file's storage and decides where new bytes go. All
//! addresses it hands out are relative to the base address, which sits just
//! past the userblock.
//!
//! ## Allocation
//!
//! ```text
//! allocate(pool, len)
//!     │
//!     ├─> pool's FreeSpaceManager has a fit? ──> reuse it
//!     │
//!     └─> otherwise append at EOA and advance EOA
//! ```
//!
//! Two pools are kept apart: `Raw` for dataset chunks and `Meta` for metadata
//! blocks. A dataset's storage therefore never lands in a hole left by an old
//! metadata block, and the raw pool's total is exactly the reclaimed dataset
//! footprint. EOA only ever grows.
//!
//! ## SWMR Deferral
//!
//! While a SWMR writer holds the file, released ranges are parked in a
//! deferred list tagged with the generation at which they become reusable.
//! A reader that loaded an older generation may still follow pointers into
//! them, so they stay untouched for `SWMR_FREE_DELAY_FLUSHES` flushes.

use eyre::{Result, WrapErr};
use tracing::debug;

use crate::config::SWMR_FREE_DELAY_FLUSHES;
use crate::dataset::{ChunkRead, ChunkStore};
use crate::error::H5Error;
use crate::storage::{AnyStorage, FreeRange, FreeSpaceManager, StorageDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    Raw,
    Meta,
}

impl Pool {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Pool::Raw => 0,
            Pool::Meta => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Pool::Raw),
            1 => Ok(Pool::Meta),
            other => Err(H5Error::Corrupt(format!("unknown free-space pool {}", other)).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredFree {
    pub pool: Pool,
    pub offset: u64,
    pub len: u64,
    /// First generation at which the range may be handed out again.
    pub release_at: u64,
}

#[derive(Debug)]
pub struct FileSpace {
    storage: AnyStorage,
    base: u64,
    eoa: u64,
    raw_free: FreeSpaceManager,
    meta_free: FreeSpaceManager,
    deferred: Vec<DeferredFree>,
    swmr: bool,
    generation: u64,
}

impl FileSpace {
    pub fn new(storage: AnyStorage, base: u64, eoa: u64) -> Self {
        Self {
            storage,
            base,
            eoa,
            raw_free: FreeSpaceManager::new(),
            meta_free: FreeSpaceManager::new(),
            deferred: Vec::new(),
            swmr: false,
            generation: 0,
        }
    }

    /// Rebuilds the space state of an existing file from its metadata.
    pub fn restore(
        storage: AnyStorage,
        base: u64,
        eoa: u64,
        generation: u64,
        raw: Vec<FreeRange>,
        meta: Vec<FreeRange>,
        deferred: Vec<DeferredFree>,
    ) -> Result<Self> {
        let raw_free = FreeSpaceManager::from_entries(raw).wrap_err("invalid raw free list")?;
        let meta_free = FreeSpaceManager::from_entries(meta).wrap_err("invalid metadata free list")?;
        Ok(Self {
            storage,
            base,
            eoa,
            raw_free,
            meta_free,
            deferred,
            swmr: false,
            generation,
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn eoa(&self) -> u64 {
        self.eoa
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_swmr(&self) -> bool {
        self.swmr
    }

    pub fn set_swmr(&mut self, on: bool) {
        self.swmr = on;
    }

    pub fn storage(&self) -> &AnyStorage {
        &self.storage
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut FreeSpaceManager {
        match pool {
            Pool::Raw => &mut self.raw_free,
            Pool::Meta => &mut self.meta_free,
        }
    }

    pub fn pool(&self, pool: Pool) -> &FreeSpaceManager {
        match pool {
            Pool::Raw => &self.raw_free,
            Pool::Meta => &self.meta_free,
        }
    }

    pub fn deferred(&self) -> &[DeferredFree] {
        &self.deferred
    }

    /// Allocatable bytes in the raw pool.
    pub fn free_space(&self) -> u64 {
        self.raw_free.total_free_bytes()
    }

    pub fn metadata_free_space(&self) -> u64 {
        self.meta_free.total_free_bytes()
    }

    pub fn deferred_free_space(&self) -> u64 {
        self.deferred.iter().map(|d| d.len).sum()
    }

    /// Returns the address of `len` bytes. Raw allocations are zero-filled on
    /// disk before the address is returned.
    pub fn allocate(&mut self, pool: Pool, len: u64) -> Result<u64> {
        if len == 0 {
            return Err(H5Error::InvalidArgument("zero-length allocation".to_string()).into());
        }
        let addr = match self.pool_mut(pool).allocate(len) {
            Some(addr) => addr,
            None => {
                let addr = self.eoa;
                let new_eoa = self
                    .eoa
                    .checked_add(len)
                    .filter(|e| e.checked_add(self.base).is_some())
                    .ok_or(H5Error::AllocationFailure { requested: len })?;
                self.eoa = new_eoa;
                addr
            }
        };
        if pool == Pool::Raw {
            let zeros = vec![0u8; len as usize];
            self.write(addr, &zeros)
                .wrap_err_with(|| format!("failed to zero-fill {} bytes at {}", len, addr))?;
        }
        debug!(?pool, addr, len, eoa = self.eoa, "allocated file space");
        Ok(addr)
    }

    /// Returns a range to its pool, or to the deferred list in SWMR mode.
    pub fn release(&mut self, pool: Pool, offset: u64, len: u64) -> Result<()> {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| len > 0 && end <= self.eoa);
        if !in_bounds {
            return Err(H5Error::InvalidRange { offset, length: len }.into());
        }
        if self.swmr {
            let release_at = self.generation + SWMR_FREE_DELAY_FLUSHES;
            debug!(?pool, offset, len, release_at, "deferred release");
            self.deferred.push(DeferredFree {
                pool,
                offset,
                len,
                release_at,
            });
            return Ok(());
        }
        self.pool_mut(pool).reclaim(offset, len)
    }

    /// Records that `generation` is now committed and moves every deferred
    /// range that has waited long enough into its pool.
    pub fn advance_generation(&mut self, generation: u64) -> Result<()> {
        self.generation = generation;
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|d| d.release_at <= generation);
        self.deferred = waiting;
        for d in ready {
            self.pool_mut(d.pool).reclaim(d.offset, d.len)?;
        }
        Ok(())
    }

    /// Moves every deferred range into its pool regardless of age.
    pub fn release_deferred(&mut self) -> Result<()> {
        for d in std::mem::take(&mut self.deferred) {
            self.pool_mut(d.pool).reclaim(d.offset, d.len)?;
        }
        Ok(())
    }

    fn check_bounds(&self, addr: u64, len: usize) -> Result<u64> {
        let fits = addr
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.eoa);
        if !fits {
            return Err(H5Error::InvalidRange {
                offset: addr,
                length: len as u64,
            }
            .into());
        }
        Ok(self.base + addr)
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let abs = self.check_bounds(addr, buf.len())?;
        self.storage.read_at(abs, buf)
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let abs = self.check_bounds(addr, data.len())?;
        self.storage.write_at(abs, data)
    }

    pub fn sync(&self) -> Result<()> {
        self.storage.sync()
    }
}

impl ChunkRead for FileSpace {
    fn read_chunk(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.read(addr, buf)
    }
}

impl ChunkStore for FileSpace {
    fn allocate_chunk(&mut self, len: u64) -> Result<u64> {
        self.allocate(Pool::Raw, len)
    }

    fn release_chunk(&mut self, addr: u64, len: u64) -> Result<()> {
        self.release(Pool::Raw, addr, len)
    }

    fn write_chunk(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.write(addr, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::INITIAL_EOA;
    use crate::error::{error_kind, ErrorKind};
    use crate::storage::MemoryStorage;

    fn space() -> FileSpace {
        FileSpace::new(AnyStorage::Memory(MemoryStorage::new()), 0, INITIAL_EOA)
    }

    #[test]
    fn allocation_appends_at_eoa_then_reuses_pool() {
        let mut fs = space();

        let a = fs.allocate(Pool::Raw, 4).unwrap();
        let b = fs.allocate(Pool::Raw, 4).unwrap();
        fs.release(Pool::Raw, a, 4).unwrap();
        let c = fs.allocate(Pool::Raw, 4).unwrap();

        assert_eq!(a, INITIAL_EOA);
        assert_eq!(b, INITIAL_EOA + 4);
        assert_eq!(c, a);
        assert_eq!(fs.eoa(), INITIAL_EOA + 8);
    }

    #[test]
    fn pools_do_not_share_ranges() {
        let mut fs = space();
        let meta = fs.allocate(Pool::Meta, 64).unwrap();
        fs.release(Pool::Meta, meta, 64).unwrap();

        let raw = fs.allocate(Pool::Raw, 16).unwrap();

        assert_ne!(raw, meta);
        assert_eq!(fs.free_space(), 0);
        assert_eq!(fs.metadata_free_space(), 64);
    }

    #[test]
    fn raw_allocations_are_zero_filled() {
        let mut fs = space();
        let a = fs.allocate(Pool::Raw, 8).unwrap();
        fs.write(a, &[0xAB; 8]).unwrap();
        fs.release(Pool::Raw, a, 8).unwrap();

        let b = fs.allocate(Pool::Raw, 8).unwrap();
        let mut buf = [0xFFu8; 8];
        fs.read(b, &mut buf).unwrap();

        assert_eq!(b, a);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn release_outside_eoa_is_invalid_range() {
        let mut fs = space();

        let err = fs.release(Pool::Raw, INITIAL_EOA, 4).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::InvalidRange);
    }

    #[test]
    fn access_past_eoa_is_rejected() {
        let fs = space();
        let mut buf = [0u8; 4];

        let err = fs.read(INITIAL_EOA - 2, &mut buf).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::InvalidRange);
    }

    #[test]
    fn swmr_release_waits_for_generations() {
        let mut fs = space();
        let a = fs.allocate(Pool::Raw, 32).unwrap();
        fs.set_swmr(true);

        fs.release(Pool::Raw, a, 32).unwrap();
        assert_eq!(fs.free_space(), 0);
        assert_eq!(fs.deferred_free_space(), 32);

        fs.advance_generation(SWMR_FREE_DELAY_FLUSHES - 1).unwrap();
        assert_eq!(fs.free_space(), 0);

        fs.advance_generation(SWMR_FREE_DELAY_FLUSHES).unwrap();
        assert_eq!(fs.free_space(), 32);
        assert_eq!(fs.deferred_free_space(), 0);
    }

    #[test]
    fn release_deferred_ignores_age() {
        let mut fs = space();
        let a = fs.allocate(Pool::Meta, 10).unwrap();
        fs.set_swmr(true);
        fs.release(Pool::Meta, a, 10).unwrap();

        fs.release_deferred().unwrap();

        assert_eq!(fs.metadata_free_space(), 10);
        assert!(fs.deferred().is_empty());
    }

    #[test]
    fn growth_past_address_space_fails() {
        let mut fs = FileSpace::new(AnyStorage::Memory(MemoryStorage::new()), 0, u64::MAX - 2);

        let err = fs.allocate(Pool::Meta, 16).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::AllocationFailure);
    }
}
