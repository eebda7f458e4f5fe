//! # Physical File
//!
//! A `PhysicalFile` is one open storage resource: the OS file, its space
//! allocator, its object catalog and the superblock that ties them together.
//! Several logical handles may share one `PhysicalFile`; the registry decides
//! when it is finally closed.
//!
//! ## Flush Protocol
//!
//! The superblock is the single commit point. Everything it points to is
//! written and synced before it changes:
//!
//! ```text
//! 1. sync raw data                         chunk writes are durable
//! 2. size payload, allocate new block      Meta pool or EOA
//! 3. release old block                     pool, or deferred under SWMR
//! 4. encode, write block, sync             new generation, CRC sealed
//! 5. rewrite superblock, sync              address, size, generation, EOA
//! ```
//!
//! A reader that loads the superblock before step 5 sees the previous
//! generation in full; one that loads it after sees the new one. Step 1
//! always runs; a clean file stops there.
//!
//! ## Locating the Superblock
//!
//! With a userblock the superblock does not start at byte 0. Opening probes
//! offset 0, then 512, 1024, 2048, ... for the signature, the same places a
//! userblock may end.

use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use tracing::{debug, warn};

use super::catalog::{parent_path, AttributeRecord, Catalog, ObjectBody, ObjectRecord};
use super::close_degree::EffectiveDegree;
use super::payload::{encode_payload, MetadataPayload};
use super::props::{AccessMode, CreateMode, FileCreateProps};
use super::space::{FileSpace, Pool};
use crate::config::{INITIAL_EOA, METADATA_SLACK, MIN_USERBLOCK_SIZE, SIGNATURE, SUPERBLOCK_SIZE};
use crate::dataset::{DatasetCreateProps, DatasetRecord, Dataspace, Datatype, Hyperslab};
use crate::error::H5Error;
use crate::storage::{
    decode_metadata_block, encode_metadata_block, metadata_block_len, AnyStorage, FileIdentity,
    FileStorage, StorageDriver, Superblock,
};

/// Finds the base address by probing for the superblock signature.
pub(crate) fn locate_base<S: StorageDriver + ?Sized>(storage: &S) -> Result<u64> {
    let len = storage.len()?;
    let mut candidate = 0u64;
    let mut sig = [0u8; 8];
    while candidate + SUPERBLOCK_SIZE as u64 <= len {
        storage.read_at(candidate, &mut sig)?;
        if sig == SIGNATURE {
            return Ok(candidate);
        }
        candidate = if candidate == 0 {
            MIN_USERBLOCK_SIZE
        } else {
            candidate * 2
        };
    }
    Err(H5Error::Corrupt("no superblock signature found".to_string()).into())
}

pub(crate) fn read_superblock<S: StorageDriver + ?Sized>(storage: &S, base: u64) -> Result<Superblock> {
    let mut bytes = [0u8; SUPERBLOCK_SIZE];
    storage.read_at(base, &mut bytes)?;
    let sb = Superblock::from_bytes(&bytes)?;
    ensure!(
        sb.userblock_size() == base,
        H5Error::Corrupt(format!(
            "superblock at {} records a userblock of {} bytes",
            base,
            sb.userblock_size()
        ))
    );
    Ok(sb)
}

/// Reads and validates the metadata block the superblock points to.
pub(crate) fn read_metadata<S: StorageDriver + ?Sized>(
    storage: &S,
    base: u64,
    sb: &Superblock,
) -> Result<MetadataPayload> {
    let size = usize::try_from(sb.metadata_size())
        .map_err(|_| H5Error::Corrupt("metadata block size overflows".to_string()))?;
    ensure!(
        sb.metadata_addr() >= INITIAL_EOA
            && sb.metadata_addr().saturating_add(sb.metadata_size()) <= sb.eoa(),
        H5Error::Corrupt(format!(
            "metadata block [{}, +{}) lies outside allocated space",
            sb.metadata_addr(),
            size
        ))
    );
    let mut block = vec![0u8; size];
    storage.read_at(base + sb.metadata_addr(), &mut block)?;
    let (generation, payload) = decode_metadata_block(&block)?;
    ensure!(
        generation == sb.generation(),
        H5Error::Corrupt(format!(
            "metadata block generation {} does not match superblock generation {}",
            generation,
            sb.generation()
        ))
    );
    MetadataPayload::decode(payload)
}

#[derive(Debug)]
pub struct PhysicalFile {
    path: PathBuf,
    identity: FileIdentity,
    writable: bool,
    degree: EffectiveDegree,
    create_props: FileCreateProps,
    superblock: Superblock,
    space: FileSpace,
    catalog: Catalog,
    dirty: bool,
}

impl PhysicalFile {
    pub fn create(
        path: &Path,
        mode: CreateMode,
        create_props: FileCreateProps,
        degree: EffectiveDegree,
        swmr_write: bool,
    ) -> Result<Self> {
        create_props.validate()?;
        let storage = FileStorage::create(path, mode == CreateMode::Exclusive)?;
        let identity = storage.identity()?;
        let base = create_props.userblock_size();
        let mut storage = AnyStorage::File(storage);
        if base > 0 {
            storage
                .write_at(0, &vec![0u8; base as usize])
                .wrap_err("failed to write userblock")?;
        }

        let mut superblock = create_props.to_superblock();
        superblock.set_eoa(INITIAL_EOA);
        let mut space = FileSpace::new(storage, base, INITIAL_EOA);
        space.write(0, &superblock.to_bytes())?;
        space.set_swmr(swmr_write);

        let mut file = Self {
            path: path.to_path_buf(),
            identity,
            writable: true,
            degree,
            create_props,
            superblock,
            space,
            catalog: Catalog::new(),
            dirty: true,
        };
        file.flush()
            .wrap_err_with(|| format!("failed to initialize '{}'", path.display()))?;
        debug!(path = %path.display(), ?mode, base, %degree, "created file");
        Ok(file)
    }

    pub fn open(
        path: &Path,
        mode: AccessMode,
        degree: EffectiveDegree,
        swmr_write: bool,
    ) -> Result<Self> {
        if swmr_write && !mode.is_writable() {
            return Err(H5Error::InvalidArgument(
                "SWMR write access requires a read-write open".to_string(),
            )
            .into());
        }
        let storage = FileStorage::open(path, mode.is_writable())?;
        let identity = storage.identity()?;
        let base = locate_base(&storage)
            .wrap_err_with(|| format!("'{}' is not an h5lite file", path.display()))?;
        let superblock = read_superblock(&storage, base)
            .wrap_err_with(|| format!("failed to read superblock of '{}'", path.display()))?;
        let payload = read_metadata(&storage, base, &superblock)
            .wrap_err_with(|| format!("failed to read metadata of '{}'", path.display()))?;

        let space = FileSpace::restore(
            AnyStorage::File(storage),
            base,
            superblock.eoa(),
            superblock.generation(),
            payload.raw_free,
            payload.meta_free,
            payload.deferred,
        )?;

        let mut file = Self {
            path: path.to_path_buf(),
            identity,
            writable: mode.is_writable(),
            degree,
            create_props: FileCreateProps::from_superblock(&superblock),
            superblock,
            space,
            catalog: payload.catalog,
            dirty: false,
        };

        if file.writable {
            if file.superblock.swmr_write() {
                warn!(path = %path.display(), "SWMR flag left set by a writer that did not close");
            }
            if swmr_write {
                file.space.set_swmr(true);
                file.dirty = true;
            } else if file.superblock.swmr_write() || !file.space.deferred().is_empty() {
                file.space.release_deferred()?;
                file.dirty = true;
            }
            file.flush()?;
        }
        debug!(
            path = %path.display(),
            ?mode,
            base,
            generation = file.superblock.generation(),
            "opened file"
        );
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn degree(&self) -> EffectiveDegree {
        self.degree
    }

    pub fn create_props(&self) -> FileCreateProps {
        self.create_props
    }

    pub fn generation(&self) -> u64 {
        self.superblock.generation()
    }

    pub fn is_swmr_write(&self) -> bool {
        self.space.is_swmr()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn free_space(&self) -> u64 {
        self.space.free_space()
    }

    pub fn metadata_free_space(&self) -> u64 {
        self.space.metadata_free_space()
    }

    pub fn deferred_free_space(&self) -> u64 {
        self.space.deferred_free_space()
    }

    pub fn eoa(&self) -> u64 {
        self.space.eoa()
    }

    fn ensure_writable(&self) -> Result<()> {
        ensure!(
            self.writable,
            H5Error::ReadOnly(self.path.display().to_string())
        );
        Ok(())
    }

    /// Commits the catalog and free lists if anything changed since the last
    /// flush. Raw data is synced either way.
    pub fn flush(&mut self) -> Result<()> {
        self.space.sync().wrap_err("failed to sync raw data")?;
        if !self.dirty || !self.writable {
            return Ok(());
        }

        let generation = self.superblock.generation() + 1;
        let estimate = encode_payload(&self.space, &self.catalog).len();
        let block_len = metadata_block_len(estimate) + METADATA_SLACK;
        let block_addr = self.space.allocate(Pool::Meta, block_len as u64)?;

        let old_addr = self.superblock.metadata_addr();
        let old_size = self.superblock.metadata_size();
        if old_size > 0 {
            self.space.release(Pool::Meta, old_addr, old_size)?;
        }
        self.space.advance_generation(generation)?;

        let payload = encode_payload(&self.space, &self.catalog);
        let block = encode_metadata_block(&payload, generation, block_len)?;
        self.space
            .write(block_addr, &block)
            .wrap_err_with(|| format!("failed to write metadata block at {}", block_addr))?;
        self.space.sync().wrap_err("failed to sync metadata block")?;

        self.superblock.set_metadata_addr(block_addr);
        self.superblock.set_metadata_size(block_len as u64);
        self.superblock.set_generation(generation);
        self.superblock.set_eoa(self.space.eoa());
        self.superblock.set_swmr_write(self.space.is_swmr());
        self.space
            .write(0, &self.superblock.to_bytes())
            .wrap_err("failed to write superblock")?;
        self.space.sync().wrap_err("failed to sync superblock")?;

        self.dirty = false;
        debug!(
            path = %self.path.display(),
            generation,
            block_addr,
            block_len,
            eoa = self.space.eoa(),
            "flushed metadata"
        );
        Ok(())
    }

    /// Final flush before the file is dropped. Leaving SWMR mode releases
    /// every deferred range so nothing stays parked on disk.
    pub fn close(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        if self.space.is_swmr() {
            self.space.set_swmr(false);
            self.space.release_deferred()?;
            self.dirty = true;
        }
        self.flush()
            .wrap_err_with(|| format!("failed to close '{}'", self.path.display()))
    }

    pub fn start_swmr_write(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.space.is_swmr() {
            return Ok(());
        }
        self.space.set_swmr(true);
        self.dirty = true;
        self.flush()
    }

    fn ensure_new_object(&self, path: &str) -> Result<()> {
        if self.catalog.contains(path) {
            return Err(H5Error::AlreadyExists(path.to_string()).into());
        }
        self.catalog.require_group(parent_path(path))
    }

    pub fn create_group(&mut self, path: &str) -> Result<()> {
        self.ensure_writable()?;
        self.catalog
            .insert(path, ObjectRecord::new(ObjectBody::Group))?;
        self.dirty = true;
        Ok(())
    }

    pub fn create_dataset(
        &mut self,
        path: &str,
        datatype: Datatype,
        space: Dataspace,
        dcpl: &DatasetCreateProps,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_new_object(path)?;
        let record = DatasetRecord::create(datatype, space, dcpl, &mut self.space)
            .wrap_err_with(|| format!("failed to create dataset '{}'", path))?;
        self.catalog
            .insert(path, ObjectRecord::new(ObjectBody::Dataset(record)))?;
        self.dirty = true;
        Ok(())
    }

    pub fn commit_datatype(&mut self, path: &str, datatype: Datatype) -> Result<()> {
        self.ensure_writable()?;
        datatype.validate()?;
        self.catalog
            .insert(path, ObjectRecord::new(ObjectBody::Datatype(datatype)))?;
        self.dirty = true;
        Ok(())
    }

    pub fn dataset(&self, path: &str) -> Result<&DatasetRecord> {
        self.catalog.dataset(path)
    }

    /// Marks the file dirty once the request has been validated, so storage
    /// touched by a change that fails part-way is still committed.
    pub fn set_extent(&mut self, path: &str, dims: &[u64]) -> Result<()> {
        self.ensure_writable()?;
        let record = self.catalog.dataset_mut(path)?;
        record.check_extent(dims)?;
        self.dirty = true;
        record.set_extent(dims, &mut self.space)
    }

    pub fn write_dataset(&mut self, path: &str, sel: &Hyperslab, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let record = self.catalog.dataset_mut(path)?;
        record.check_write(sel, buf)?;
        self.dirty = true;
        record.write_region(sel, buf, &mut self.space)
    }

    pub fn read_dataset(&self, path: &str, sel: &Hyperslab) -> Result<Vec<u8>> {
        self.catalog.dataset(path)?.read_region(sel, &self.space)
    }

    pub fn create_attribute(
        &mut self,
        object: &str,
        name: &str,
        datatype: Datatype,
        space: Dataspace,
    ) -> Result<()> {
        self.ensure_writable()?;
        let attr = AttributeRecord::new(datatype, space)?;
        self.catalog.get_mut(object)?.add_attribute(name, attr)?;
        self.dirty = true;
        Ok(())
    }

    pub fn attribute(&self, object: &str, name: &str) -> Result<&AttributeRecord> {
        self.catalog.get(object)?.attribute(name)
    }

    pub fn write_attribute(&mut self, object: &str, name: &str, value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.catalog
            .get_mut(object)?
            .attribute_mut(name)?
            .set_value(value)?;
        self.dirty = true;
        Ok(())
    }

    /// Removes an object and its descendants, returning dataset storage to
    /// the raw pool. Returns the removed paths.
    pub fn unlink(&mut self, path: &str) -> Result<Vec<String>> {
        self.ensure_writable()?;
        let removed = self.catalog.unlink(path)?;
        let mut paths = Vec::with_capacity(removed.len());
        for (p, mut record) in removed {
            if let ObjectBody::Dataset(ds) = record.body_mut() {
                ds.release_all(&mut self.space)
                    .wrap_err_with(|| format!("failed to release storage of '{}'", p))?;
            }
            paths.push(p);
        }
        self.dirty = true;
        debug!(path, removed = paths.len(), free = self.space.free_space(), "unlinked");
        Ok(paths)
    }
}
