//! Independent SWMR reader.
//!
//! A `SwmrReader` holds its own OS handle and never touches a `Registry`.
//! Each `refresh` reads the superblock, then the metadata block it points
//! to. Because the writer commits by rewriting the superblock last, a reader
//! either sees a complete generation or a checksum or generation mismatch
//! from catching the writer mid-commit, which is retried.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use eyre::{Result, WrapErr};
use tracing::{debug, warn};

use crate::config::{SWMR_READ_RETRIES, SWMR_RETRY_DELAY_MS};
use crate::dataset::{ChunkRead, DatasetRecord, Datatype, Hyperslab};
use crate::error::{error_kind, ErrorKind};
use crate::file::physical::{locate_base, read_metadata, read_superblock};
use crate::file::Catalog;
use crate::storage::{FileStorage, StorageDriver};

/// Chunk reads against a snapshot, offset by the base address.
struct SnapshotStore<'a> {
    storage: &'a FileStorage,
    base: u64,
}

impl ChunkRead for SnapshotStore<'_> {
    fn read_chunk(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.storage.read_at(self.base + addr, buf)
    }
}

#[derive(Debug)]
pub struct SwmrReader {
    path: PathBuf,
    storage: FileStorage,
    base: u64,
    generation: u64,
    writer_active: bool,
    catalog: Catalog,
}

impl SwmrReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let storage = FileStorage::open(path, false)?;
        let base = locate_base(&storage)
            .wrap_err_with(|| format!("'{}' is not an h5lite file", path.display()))?;
        let mut reader = Self {
            path: path.to_path_buf(),
            storage,
            base,
            generation: 0,
            writer_active: false,
            catalog: Catalog::new(),
        };
        reader.refresh()?;
        debug!(path = %path.display(), generation = reader.generation, "SWMR reader opened");
        Ok(reader)
    }

    /// Reloads metadata. Returns whether a newer generation was observed.
    pub fn refresh(&mut self) -> Result<bool> {
        let mut attempt = 0;
        loop {
            match self.load() {
                Ok(changed) => return Ok(changed),
                Err(e) if error_kind(&e) == ErrorKind::Corrupt && attempt < SWMR_READ_RETRIES => {
                    attempt += 1;
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        error = %e,
                        "metadata changed during read, retrying"
                    );
                    thread::sleep(Duration::from_millis(SWMR_RETRY_DELAY_MS));
                }
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!("failed to refresh '{}'", self.path.display())
                    })
                }
            }
        }
    }

    fn load(&mut self) -> Result<bool> {
        let sb = read_superblock(&self.storage, self.base)?;
        if sb.generation() == self.generation {
            self.writer_active = sb.swmr_write();
            return Ok(false);
        }
        let payload = read_metadata(&self.storage, self.base, &sb)?;
        self.generation = sb.generation();
        self.writer_active = sb.swmr_write();
        self.catalog = payload.catalog;
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the last refresh found a writer in SWMR mode.
    pub fn writer_active(&self) -> bool {
        self.writer_active
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.catalog.datasets().map(|(p, _)| p.to_string()).collect()
    }

    fn record(&self, name: &str) -> Result<&DatasetRecord> {
        let path = crate::file::resolve_path(crate::file::ROOT, name)?;
        self.catalog.dataset(&path)
    }

    pub fn dataset_extent(&self, name: &str) -> Result<Vec<u64>> {
        Ok(self.record(name)?.dims().to_vec())
    }

    pub fn dataset_datatype(&self, name: &str) -> Result<Datatype> {
        Ok(self.record(name)?.datatype().clone())
    }

    /// Reads the whole current extent.
    pub fn read_dataset(&self, name: &str) -> Result<Vec<u8>> {
        let record = self.record(name)?;
        self.read_region(name, &Hyperslab::all(record.dims()))
    }

    pub fn read_region(&self, name: &str, sel: &Hyperslab) -> Result<Vec<u8>> {
        let store = SnapshotStore {
            storage: &self.storage,
            base: self.base,
        };
        self.record(name)?
            .read_region(sel, &store)
            .wrap_err_with(|| format!("failed to read '{}' at generation {}", name, self.generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetCreateProps, Dataspace};
    use crate::file::{CreateMode, FileAccessProps, FileCreateProps};
    use crate::registry::Registry;
    use tempfile::tempdir;

    #[test]
    fn reader_sees_only_flushed_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("swmr.h5");
        let reg = Registry::new();
        let fid = reg
            .create_file(
                &path,
                CreateMode::Truncate,
                &FileCreateProps::new(),
                &FileAccessProps::new().swmr_write(true),
            )
            .unwrap();
        let space = Dataspace::extendable(&[2], &[None]).unwrap();
        let did = reg
            .create_dataset(fid, "d", Datatype::u32(), space, &DatasetCreateProps::new().chunked(&[4]))
            .unwrap();
        reg.write_dataset(did, &Hyperslab::all(&[2]), &[1, 0, 0, 0, 2, 0, 0, 0])
            .unwrap();
        reg.flush_dataset(did).unwrap();

        let mut reader = SwmrReader::open(&path).unwrap();
        assert!(reader.writer_active());
        assert_eq!(reader.dataset_extent("d").unwrap(), vec![2]);

        reg.set_extent(did, &[3]).unwrap();
        reg.write_dataset(did, &Hyperslab::new(&[2], &[1]).unwrap(), &[3, 0, 0, 0])
            .unwrap();
        assert!(!reader.refresh().unwrap());
        assert_eq!(reader.dataset_extent("d").unwrap(), vec![2]);

        reg.flush_dataset(did).unwrap();
        assert!(reader.refresh().unwrap());

        assert_eq!(reader.dataset_extent("/d").unwrap(), vec![3]);
        assert_eq!(
            reader.read_dataset("d").unwrap(),
            vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.h5");
        let reg = Registry::new();
        let fid = reg
            .create_file(&path, CreateMode::Truncate, &FileCreateProps::new(), &FileAccessProps::new())
            .unwrap();
        reg.close_file(fid).unwrap();

        let reader = SwmrReader::open(&path).unwrap();
        let err = reader.dataset_extent("nope").unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::NotFound);
        assert!(!reader.writer_active());
    }
}
