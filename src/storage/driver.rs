//! # Storage Driver Abstraction Layer
//!
//! `StorageDriver` is the byte-addressed, copy-based interface every
//! PhysicalFile performs its I/O through. Addresses here are absolute file
//! offsets; the base-address (userblock) translation happens one layer up in
//! `FileSpace`.
//!
//! ```text
//! fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
//! fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;
//! ```
//!
//! ## Storage Backends
//!
//! | Backend       | Medium          | Sync       |
//! |---------------|-----------------|------------|
//! | FileStorage   | std::fs::File   | fsync      |
//! | MemoryStorage | Vec<u8>         | no-op      |
//!
//! `AnyStorage` wraps both so the file layer works with either backend
//! without generics. `MemoryStorage` backs unit tests of the allocator and
//! catalog code; every registry-level file uses `FileStorage`.
//!
//! ## File Identity
//!
//! Two paths that name the same inode must resolve to the same PhysicalFile.
//! `FileStorage::identity` returns `(device, inode)` on Unix and the
//! canonical path elsewhere.

use eyre::{ensure, Result, WrapErr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::H5Error;

pub trait StorageDriver: Send {
    /// Fills `buf` from `offset`. Reading past the end of storage is an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` at `offset`, growing the storage if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    fn len(&self) -> Result<u64>;

    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flushes all pending writes to the durable medium.
    fn sync(&self) -> Result<()>;

    fn is_writable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    Inode { dev: u64, ino: u64 },
    Path(PathBuf),
}

#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
    writable: bool,
}

impl FileStorage {
    /// Creates a new file. With `exclusive`, an existing path is an
    /// `AlreadyExists` error; otherwise existing content is truncated.
    pub fn create(path: &Path, exclusive: bool) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true);
        if exclusive {
            opts.create_new(true);
        } else {
            opts.create(true).truncate(true);
        }

        let file = match opts.open(path) {
            Ok(f) => f,
            Err(e) if exclusive && e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(H5Error::AlreadyExists(path.display().to_string()).into());
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to create file '{}'", path.display()));
            }
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            writable: true,
        })
    }

    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .wrap_err_with(|| format!("failed to open file '{}'", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> Result<FileIdentity> {
        file_identity(&self.path, &self.file)
    }
}

#[cfg(unix)]
fn file_identity(path: &Path, file: &File) -> Result<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    let meta = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?;
    Ok(FileIdentity::Inode {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_identity(path: &Path, _file: &File) -> Result<FileIdentity> {
    let canonical = path
        .canonicalize()
        .wrap_err_with(|| format!("failed to canonicalize '{}'", path.display()))?;
    Ok(FileIdentity::Path(canonical))
}

/// Identity of a path that may already be open, without opening it for I/O.
pub fn path_identity(path: &Path) -> Result<Option<FileIdentity>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).wrap_err_with(|| format!("failed to open '{}'", path.display()))?;
    file_identity(path, &file).map(Some)
}

impl StorageDriver for FileStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to {} in '{}'", offset, self.path.display()))?;
        f.read_exact(buf).wrap_err_with(|| {
            format!(
                "failed to read {} bytes at {} from '{}'",
                buf.len(),
                offset,
                self.path.display()
            )
        })
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        ensure!(self.writable, "'{}' is open read-only", self.path.display());
        self.file
            .seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to {} in '{}'", offset, self.path.display()))?;
        self.file.write_all(data).wrap_err_with(|| {
            format!(
                "failed to write {} bytes at {} to '{}'",
                data.len(),
                offset,
                self.path.display()
            )
        })
    }

    fn len(&self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(meta.len())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .wrap_err_with(|| format!("failed to resize '{}' to {} bytes", self.path.display(), len))
    }

    fn sync(&self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.file
            .sync_data()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl StorageDriver for MemoryStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        ensure!(
            end <= self.data.len(),
            "read of {} bytes at {} past end of memory storage ({})",
            buf.len(),
            offset,
            self.data.len()
        );
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.data.resize(len as usize, 0);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// Type-erased storage backend that implements `StorageDriver`.
#[derive(Debug)]
pub enum AnyStorage {
    File(FileStorage),
    Memory(MemoryStorage),
}

impl AnyStorage {
    pub fn as_file(&self) -> Option<&FileStorage> {
        match self {
            AnyStorage::File(s) => Some(s),
            AnyStorage::Memory(_) => None,
        }
    }
}

impl StorageDriver for AnyStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            AnyStorage::File(s) => s.read_at(offset, buf),
            AnyStorage::Memory(s) => s.read_at(offset, buf),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        match self {
            AnyStorage::File(s) => s.write_at(offset, data),
            AnyStorage::Memory(s) => s.write_at(offset, data),
        }
    }

    fn len(&self) -> Result<u64> {
        match self {
            AnyStorage::File(s) => s.len(),
            AnyStorage::Memory(s) => s.len(),
        }
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        match self {
            AnyStorage::File(s) => s.set_len(len),
            AnyStorage::Memory(s) => s.set_len(len),
        }
    }

    fn sync(&self) -> Result<()> {
        match self {
            AnyStorage::File(s) => s.sync(),
            AnyStorage::Memory(s) => s.sync(),
        }
    }

    fn is_writable(&self) -> bool {
        match self {
            AnyStorage::File(s) => s.is_writable(),
            AnyStorage::Memory(s) => s.is_writable(),
        }
    }
}
