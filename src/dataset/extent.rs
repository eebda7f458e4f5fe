//! # Dataset Storage and the Extension Protocol
//!
//! A `DatasetRecord` is the persistent description of one dataset: its
//! datatype, dataspace, chunk shape, allocation-time policy and the map from
//! chunk coordinates to file blocks. Contiguous datasets are stored as a
//! single chunk spanning the whole (fixed) extent, so one code path serves
//! both layouts.
//!
//! ## Chunk Map
//!
//! ```text
//! dims = [10, 7], chunk = [4, 3]
//!
//!          axis 1 ─►
//!        ┌─────┬─────┬─────┐
//! axis 0 │ 0,0 │ 0,1 │ 0,2 │   chunk (i, j) covers rows 4i..4i+4,
//!   │    ├─────┼─────┼─────┤   columns 3j..3j+3; edge chunks are
//!   ▼    │ 1,0 │ 1,1 │ 1,2 │   stored full-size
//!        ├─────┼─────┼─────┤
//!        │ 2,0 │ 2,1 │ 2,2 │
//!        └─────┴─────┴─────┘
//! ```
//!
//! ## Extension
//!
//! `set_extent` validates every axis before changing anything, then works on
//! a staged copy of the record that replaces it only once every allocation
//! has succeeded. Shrinking releases chunks that lie entirely outside the new
//! extent and swaps each chunk it keeps for a copy whose out-of-extent part
//! is zeroed, so a later regrow reads zeros rather than stale values and a
//! SWMR reader on the previous snapshot never sees its blocks change.
//! Growing allocates the newly covered chunks when the dataset keeps full
//! coverage (early allocation, or late allocation after its first write).
//! Incremental datasets allocate on write only.
//!
//! ## Storage Seam
//!
//! Chunk I/O goes through `ChunkStore`/`ChunkRead`, implemented by the file
//! layer's `FileSpace` for writers and by the SWMR reader for read-only
//! snapshots. Freshly allocated blocks are zero-filled by the store.

use std::collections::BTreeMap;

use eyre::Result;
use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::dataspace::{checked_byte_len, transfer_len, Dataspace, Dims};
use super::datatype::Datatype;
use super::layout::{check_chunk_bytes, AllocTime, DatasetCreateProps, Layout};
use super::selection::{copy_block, for_each_coord, strides, Hyperslab};
use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;

pub type ChunkCoord = SmallVec<[u64; 4]>;

pub trait ChunkRead {
    fn read_chunk(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
}

pub trait ChunkStore: ChunkRead {
    /// Returns the address of `len` zero-filled bytes.
    fn allocate_chunk(&mut self, len: u64) -> Result<u64>;

    fn release_chunk(&mut self, addr: u64, len: u64) -> Result<()>;

    fn write_chunk(&mut self, addr: u64, data: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBlock {
    pub addr: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    datatype: Datatype,
    space: Dataspace,
    chunk: Dims,
    contiguous: bool,
    alloc_time: AllocTime,
    fully_allocated: bool,
    chunks: BTreeMap<ChunkCoord, ChunkBlock>,
}

impl DatasetRecord {
    pub fn create<S: ChunkStore>(
        datatype: Datatype,
        space: Dataspace,
        dcpl: &DatasetCreateProps,
        store: &mut S,
    ) -> Result<Self> {
        datatype.validate()?;
        let chunk = dcpl.chunk_shape_for(&space, datatype.size())?;
        let contiguous = matches!(dcpl.layout(), Layout::Contiguous);
        let alloc_time = dcpl.resolved_alloc_time();

        let mut record = Self {
            datatype,
            space,
            chunk,
            contiguous,
            alloc_time,
            fully_allocated: false,
            chunks: BTreeMap::new(),
        };

        if alloc_time == AllocTime::Early {
            let footprint: Dims = record
                .space
                .dims()
                .iter()
                .zip(record.space.max_dims())
                .map(|(&d, &m)| m.unwrap_or(d))
                .collect();
            record.staged(store, |next, store| {
                next.allocate_covering(&footprint, store)?;
                next.fully_allocated = true;
                Ok(Vec::new())
            })?;
        }
        Ok(record)
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn dataspace(&self) -> &Dataspace {
        &self.space
    }

    pub fn dims(&self) -> &[u64] {
        self.space.dims()
    }

    pub fn max_dims(&self) -> &[Option<u64>] {
        self.space.max_dims()
    }

    pub fn element_size(&self) -> usize {
        self.datatype.size()
    }

    pub fn chunk_dims(&self) -> &[u64] {
        &self.chunk
    }

    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    pub fn alloc_time(&self) -> AllocTime {
        self.alloc_time
    }

    pub fn allocated_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn storage_size(&self) -> u64 {
        self.chunks.values().map(|b| b.size).sum()
    }

    pub fn chunk_blocks(&self) -> impl Iterator<Item = ChunkBlock> + '_ {
        self.chunks.values().copied()
    }

    /// Bounded by `MAX_CHUNK_BYTES` for every created or decoded record.
    fn chunk_bytes(&self) -> u64 {
        self.chunk.iter().product::<u64>() * self.element_size() as u64
    }

    fn chunk_start(&self, coord: &[u64]) -> Dims {
        coord.iter().zip(&self.chunk).map(|(&c, &n)| c * n).collect()
    }

    /// Coordinates of every chunk overlapping `[0, extent)`.
    fn covering(&self, extent: &[u64]) -> Vec<ChunkCoord> {
        if extent.iter().any(|&e| e == 0) {
            return Vec::new();
        }
        let grid: Dims = extent
            .iter()
            .zip(&self.chunk)
            .map(|(&e, &n)| e.div_ceil(n))
            .collect();
        let mut out = Vec::new();
        for_each_coord(&grid, |c| out.push(ChunkCoord::from_slice(c)));
        out
    }

    fn intersecting(&self, sel: &Hyperslab) -> Vec<ChunkCoord> {
        if sel.is_empty() {
            return Vec::new();
        }
        let lo: Dims = sel
            .offset()
            .iter()
            .zip(&self.chunk)
            .map(|(&o, &n)| o / n)
            .collect();
        let span: Dims = sel
            .offset()
            .iter()
            .zip(sel.count())
            .zip(&self.chunk)
            .zip(&lo)
            .map(|(((&o, &c), &n), &l)| (o + c - 1) / n - l + 1)
            .collect();
        let mut out = Vec::new();
        for_each_coord(&span, |c| {
            out.push(c.iter().zip(&lo).map(|(&i, &l)| i + l).collect());
        });
        out
    }

    fn ensure_chunk<S: ChunkStore>(&mut self, coord: &[u64], store: &mut S) -> Result<ChunkBlock> {
        if let Some(block) = self.chunks.get(coord) {
            return Ok(*block);
        }
        let size = self.chunk_bytes();
        let addr = store.allocate_chunk(size)?;
        let block = ChunkBlock { addr, size };
        debug!(?coord, addr, size, "allocated chunk");
        self.chunks.insert(ChunkCoord::from_slice(coord), block);
        Ok(block)
    }

    fn allocate_covering<S: ChunkStore>(&mut self, extent: &[u64], store: &mut S) -> Result<()> {
        for coord in self.covering(extent) {
            self.ensure_chunk(&coord, store)?;
        }
        Ok(())
    }

    /// Applies `change` to a copy of the record and adopts the copy only if
    /// every step succeeds. Blocks returned by `change` are released after
    /// the swap; on failure, blocks the copy allocated are handed back and
    /// the record is left as it was.
    fn staged<S, F>(&mut self, store: &mut S, change: F) -> Result<()>
    where
        S: ChunkStore,
        F: FnOnce(&mut Self, &mut S) -> Result<Vec<ChunkBlock>>,
    {
        let mut next = self.clone();
        match change(&mut next, &mut *store) {
            Ok(retired) => {
                *self = next;
                for block in retired {
                    store.release_chunk(block.addr, block.size)?;
                    debug!(addr = block.addr, size = block.size, "released chunk");
                }
                Ok(())
            }
            Err(err) => {
                let kept: HashSet<u64> = self.chunks.values().map(|b| b.addr).collect();
                for block in next.chunks.values().filter(|b| !kept.contains(&b.addr)) {
                    if let Err(e) = store.release_chunk(block.addr, block.size) {
                        warn!(addr = block.addr, error = %e, "failed to return staged chunk");
                    }
                }
                Err(err)
            }
        }
    }

    /// Checks a new extent without touching the record or its storage.
    pub fn check_extent(&self, new_dims: &[u64]) -> Result<()> {
        let rank = self.space.rank();
        if new_dims.len() != rank {
            return Err(H5Error::RankMismatch {
                expected: rank,
                actual: new_dims.len(),
            }
            .into());
        }
        for (axis, (&n, &m)) in new_dims.iter().zip(self.space.max_dims()).enumerate() {
            if let Some(max) = m {
                if n > max {
                    return Err(H5Error::ExceedsMaximumExtent {
                        axis,
                        requested: n,
                        max,
                    }
                    .into());
                }
            }
        }
        if checked_byte_len(new_dims, self.element_size()).is_none() {
            return Err(H5Error::InvalidArgument(format!(
                "extent {:?} of {}-byte elements overflows",
                new_dims,
                self.element_size()
            ))
            .into());
        }
        if self.contiguous {
            let old = self.space.dims();
            if let Some(axis) = (0..rank).find(|&a| new_dims[a] != old[a]) {
                return Err(H5Error::InvalidShrink {
                    axis,
                    reason: "contiguous datasets have a fixed extent",
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn set_extent<S: ChunkStore>(&mut self, new_dims: &[u64], store: &mut S) -> Result<()> {
        self.check_extent(new_dims)?;
        let old: Dims = Dims::from_slice(self.space.dims());
        self.staged(store, |next, store| {
            let retired = if new_dims.iter().zip(&old).any(|(n, o)| n < o) {
                next.shrink_storage(&old, new_dims, store)?
            } else {
                Vec::new()
            };
            next.space.set_dims(new_dims);
            if next.fully_allocated {
                next.allocate_covering(new_dims, store)?;
            }
            Ok(retired)
        })?;
        debug!(old = ?old.as_slice(), new = ?new_dims, "dataset extent changed");
        Ok(())
    }

    /// Drops chunks outside the new extent from the map and replaces every
    /// straddling chunk with a fresh copy whose out-of-extent part is zeroed.
    /// Returns the blocks the caller must release.
    fn shrink_storage<S: ChunkStore>(
        &mut self,
        old: &[u64],
        new: &[u64],
        store: &mut S,
    ) -> Result<Vec<ChunkBlock>> {
        let mut retired = Vec::new();
        let outside: Vec<ChunkCoord> = self
            .chunks
            .keys()
            .filter(|coord| {
                coord
                    .iter()
                    .zip(&self.chunk)
                    .zip(new)
                    .any(|((&c, &n), &d)| c * n >= d)
            })
            .cloned()
            .collect();
        for coord in outside {
            if let Some(block) = self.chunks.remove(&coord) {
                retired.push(block);
            }
        }

        let straddling: Vec<(ChunkCoord, ChunkBlock)> = self
            .chunks
            .iter()
            .filter(|(coord, _)| {
                (0..new.len()).any(|a| new[a] < old[a] && (coord[a] + 1) * self.chunk[a] > new[a])
            })
            .map(|(c, b)| (c.clone(), *b))
            .collect();

        let elem = self.element_size();
        let chunk_strides = strides(&self.chunk);
        for (coord, block) in straddling {
            let start = self.chunk_start(&coord);
            let mut data = vec![0u8; block.size as usize];
            store.read_chunk(block.addr, &mut data)?;
            for_each_coord(&self.chunk, |idx| {
                if idx.iter().zip(&start).zip(new).any(|((&i, &s), &d)| s + i >= d) {
                    let lin: u64 = idx.iter().zip(&chunk_strides).map(|(&i, &s)| i * s).sum();
                    let at = lin as usize * elem;
                    data[at..at + elem].fill(0);
                }
            });
            let addr = store.allocate_chunk(block.size)?;
            let copy = ChunkBlock { addr, size: block.size };
            self.chunks.insert(coord, copy);
            store.write_chunk(addr, &data)?;
            retired.push(block);
        }
        Ok(retired)
    }

    /// Checks a write's selection and buffer length against the current
    /// extent without touching storage.
    pub fn check_write(&self, sel: &Hyperslab, buf: &[u8]) -> Result<()> {
        sel.validate(self.space.dims())?;
        let expected = transfer_len(sel.count(), self.element_size())?;
        if buf.len() != expected {
            return Err(H5Error::BufferSizeMismatch {
                expected,
                actual: buf.len(),
            }
            .into());
        }
        Ok(())
    }

    pub fn write_region<S: ChunkStore>(&mut self, sel: &Hyperslab, buf: &[u8], store: &mut S) -> Result<()> {
        self.check_write(sel, buf)?;
        if sel.is_empty() {
            return Ok(());
        }

        if self.alloc_time == AllocTime::Late && !self.fully_allocated {
            let dims = Dims::from_slice(self.space.dims());
            self.staged(store, |next, store| {
                next.allocate_covering(&dims, store)?;
                next.fully_allocated = true;
                Ok(Vec::new())
            })?;
        }

        let elem = self.element_size();
        let chunk = self.chunk.clone();
        for coord in self.intersecting(sel) {
            let start = self.chunk_start(&coord);
            let Some(part) = sel.intersect(&start, &chunk) else {
                continue;
            };
            let block = self.ensure_chunk(&coord, store)?;

            let mut data = vec![0u8; block.size as usize];
            if part.count() != chunk.as_slice() {
                store.read_chunk(block.addr, &mut data)?;
            }
            let src_start: Dims = part.offset().iter().zip(sel.offset()).map(|(&p, &s)| p - s).collect();
            let dst_start: Dims = part.offset().iter().zip(&start).map(|(&p, &s)| p - s).collect();
            copy_block(buf, sel.count(), &src_start, &mut data, &chunk, &dst_start, part.count(), elem);
            store.write_chunk(block.addr, &data)?;
        }
        Ok(())
    }

    /// Reads the selected elements; unallocated chunks read as zeros.
    pub fn read_region<S: ChunkRead + ?Sized>(&self, sel: &Hyperslab, store: &S) -> Result<Vec<u8>> {
        sel.validate(self.space.dims())?;
        let elem = self.element_size();
        let mut out = vec![0u8; transfer_len(sel.count(), elem)?];

        for coord in self.intersecting(sel) {
            let Some(block) = self.chunks.get(&coord) else {
                continue;
            };
            let start = self.chunk_start(&coord);
            let Some(part) = sel.intersect(&start, &self.chunk) else {
                continue;
            };
            let mut data = vec![0u8; block.size as usize];
            store.read_chunk(block.addr, &mut data)?;
            let src_start: Dims = part.offset().iter().zip(&start).map(|(&p, &s)| p - s).collect();
            let dst_start: Dims = part.offset().iter().zip(sel.offset()).map(|(&p, &s)| p - s).collect();
            copy_block(&data, &self.chunk, &src_start, &mut out, sel.count(), &dst_start, part.count(), elem);
        }
        Ok(out)
    }

    /// Returns every chunk to the store. Used when the dataset is unlinked.
    pub fn release_all<S: ChunkStore>(&mut self, store: &mut S) -> Result<()> {
        for (_, block) in std::mem::take(&mut self.chunks) {
            store.release_chunk(block.addr, block.size)?;
        }
        self.fully_allocated = false;
        Ok(())
    }

    pub fn encode(&self, w: &mut MetaWriter) {
        self.datatype.encode(w);
        self.space.encode(w);
        w.put_u32(self.chunk.len() as u32);
        for &c in &self.chunk {
            w.put_u64(c);
        }
        w.put_bool(self.contiguous);
        self.alloc_time.encode(w);
        w.put_bool(self.fully_allocated);
        w.put_u32(self.chunks.len() as u32);
        for (coord, block) in &self.chunks {
            for &c in coord {
                w.put_u64(c);
            }
            w.put_u64(block.addr);
            w.put_u64(block.size);
        }
    }

    pub fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        let datatype = Datatype::decode(r)?;
        let space = Dataspace::decode(r)?;
        let rank = r.count("chunk rank", 8)?;
        let mut chunk = Dims::with_capacity(rank);
        for _ in 0..rank {
            chunk.push(r.u64("chunk dimension")?);
        }
        if rank != space.rank() {
            return Err(H5Error::Corrupt(format!(
                "chunk rank {} does not match dataspace rank {}",
                rank,
                space.rank()
            ))
            .into());
        }
        let contiguous = r.bool("contiguous")?;
        if !contiguous && chunk.iter().any(|&c| c == 0) {
            return Err(H5Error::Corrupt("zero-sized chunk dimension".to_string()).into());
        }
        check_chunk_bytes(&chunk, datatype.size())
            .map_err(|e| H5Error::Corrupt(format!("stored layout: {}", e)))?;
        let alloc_time = AllocTime::decode(r)?;
        let fully_allocated = r.bool("fully allocated")?;

        let mut record = Self {
            datatype,
            space,
            chunk,
            contiguous,
            alloc_time,
            fully_allocated,
            chunks: BTreeMap::new(),
        };
        let expected_size = record.chunk_bytes();
        let n = r.count("chunk map", rank * 8 + 16)?;
        for _ in 0..n {
            let mut coord = ChunkCoord::with_capacity(rank);
            for _ in 0..rank {
                coord.push(r.u64("chunk coordinate")?);
            }
            let addr = r.u64("chunk address")?;
            let size = r.u64("chunk size")?;
            if size != expected_size {
                return Err(H5Error::Corrupt(format!(
                    "chunk at {} has size {}, expected {}",
                    addr, size, expected_size
                ))
                .into());
            }
            record.chunks.insert(coord, ChunkBlock { addr, size });
        }
        Ok(record)
    }
}
