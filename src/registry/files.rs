//! File-level registry operations.
//!
//! ## Open Compatibility
//!
//! | Already registered as | Request            | Result                  |
//! |-----------------------|--------------------|-------------------------|
//! | any                   | create, exclusive  | `AlreadyExists`         |
//! | any                   | create, truncate   | `AlreadyOpen`           |
//! | degree D              | open, degree != D  | `IncompatibleCloseDegree` |
//! | read-only             | open read-write    | `AlreadyOpenReadOnly`   |
//! | read-write            | open read-only     | new read-only handle    |
//!
//! The degree check runs first. `Default` is resolved with the registry's
//! configured library default before comparing.

use std::path::Path;

use eyre::Result;
use tracing::{debug, warn};

use super::handle::{HandleKind, Hid};
use super::state::HandleBody;
use super::Registry;
use crate::error::H5Error;
use crate::file::{
    AccessMode, CloseAction, CloseDegree, CreateMode, FileAccessProps, FileCreateProps,
    PhysicalFile,
};
use crate::storage::path_identity;

impl Registry {
    pub fn create_file(
        &self,
        path: impl AsRef<Path>,
        mode: CreateMode,
        create_props: &FileCreateProps,
        access_props: &FileAccessProps,
    ) -> Result<Hid> {
        let path = path.as_ref();
        let mut st = self.state.lock();
        if let Some(identity) = path_identity(path)? {
            if st.by_identity.contains_key(&identity) {
                let name = path.display().to_string();
                return Err(match mode {
                    CreateMode::Exclusive => H5Error::AlreadyExists(name),
                    CreateMode::Truncate => H5Error::AlreadyOpen(name),
                }
                .into());
            }
        }

        let degree = access_props.degree().resolve(self.config.default_close_degree);
        let file = PhysicalFile::create(
            path,
            mode,
            *create_props,
            degree,
            access_props.is_swmr_write(),
        )?;
        let phys = st.register_file(file);
        let fid = st.mint_file_handle(phys, true, *access_props);
        debug!(%fid, path = %path.display(), "file created");
        Ok(fid)
    }

    pub fn open_file(
        &self,
        path: impl AsRef<Path>,
        mode: AccessMode,
        access_props: &FileAccessProps,
    ) -> Result<Hid> {
        let path = path.as_ref();
        if access_props.is_swmr_write() && !mode.is_writable() {
            return Err(H5Error::InvalidArgument(
                "SWMR write access requires a read-write open".to_string(),
            )
            .into());
        }
        let requested = access_props.degree().resolve(self.config.default_close_degree);
        let mut st = self.state.lock();

        let registered = match path_identity(path)? {
            Some(identity) => st.by_identity.get(&identity).copied(),
            None => None,
        };

        let phys = match registered {
            Some(phys) => {
                let file = st.file_mut(phys)?;
                if file.degree() != requested {
                    return Err(H5Error::IncompatibleCloseDegree {
                        requested: requested.name(),
                        existing: file.degree().name(),
                    }
                    .into());
                }
                if mode.is_writable() && !file.is_writable() {
                    return Err(H5Error::AlreadyOpenReadOnly(path.display().to_string()).into());
                }
                if access_props.is_swmr_write() {
                    file.start_swmr_write()?;
                }
                phys
            }
            None => {
                let file = PhysicalFile::open(path, mode, requested, access_props.is_swmr_write())?;
                st.register_file(file)
            }
        };

        let fid = st.mint_file_handle(phys, mode.is_writable(), *access_props);
        debug!(%fid, path = %path.display(), ?mode, "file opened");
        Ok(fid)
    }

    /// A new logical handle on the same physical file, with the same access
    /// intent and no compatibility checks.
    pub fn reopen_file(&self, fid: Hid) -> Result<Hid> {
        let mut st = self.state.lock();
        let entry = st.expect_kind(fid, HandleKind::File)?;
        let writable = entry.writable;
        let access = match &entry.body {
            HandleBody::File { access } => *access,
            _ => FileAccessProps::default(),
        };
        let phys = st.phys_of(fid)?;
        Ok(st.mint_file_handle(phys, writable, access))
    }

    /// Drops one reference to a file handle. When the last logical handle of
    /// a physical file goes away, the file's close degree decides what
    /// happens to the objects still open in it.
    pub fn close_file(&self, fid: Hid) -> Result<()> {
        let mut st = self.state.lock();
        let entry = st.expect_kind(fid, HandleKind::File)?;
        if entry.refs > 1 {
            st.entry_mut(fid)?.refs -= 1;
            return Ok(());
        }
        let phys = st.phys_of(fid)?;
        if st.logical_opens(phys) > 1 {
            st.handles.remove(&fid);
            debug!(%fid, "closed logical handle, file still open");
            return Ok(());
        }

        let objects = st.open_objects(phys);
        let degree = st.file(phys)?.degree();
        match degree.on_last_close(objects.len()) {
            CloseAction::Refuse => Err(H5Error::ObjectsStillOpen {
                count: objects.len(),
            }
            .into()),
            CloseAction::Release => {
                st.handles.remove(&fid);
                st.teardown(phys)
            }
            CloseAction::CloseObjectsThenRelease => {
                warn!(%fid, count = objects.len(), "closing objects still open in file");
                for hid in objects {
                    st.handles.remove(&hid);
                }
                st.handles.remove(&fid);
                st.teardown(phys)
            }
            CloseAction::Defer => {
                st.handles.remove(&fid);
                debug!(%fid, count = objects.len(), "file close deferred until objects close");
                Ok(())
            }
        }
    }

    /// Flushes the file behind any handle that belongs to one.
    pub fn flush_file(&self, hid: Hid) -> Result<()> {
        let mut st = self.state.lock();
        st.file_of_mut(hid)?.flush()
    }

    pub fn start_swmr_write(&self, fid: Hid) -> Result<()> {
        let mut st = self.state.lock();
        let entry = st.expect_kind(fid, HandleKind::File)?;
        if !entry.writable {
            let path = st.file_of(fid)?.path().display().to_string();
            return Err(H5Error::ReadOnly(path).into());
        }
        st.file_of_mut(fid)?.start_swmr_write()
    }

    pub fn file_create_props(&self, fid: Hid) -> Result<FileCreateProps> {
        let st = self.state.lock();
        st.expect_kind(fid, HandleKind::File)?;
        Ok(st.file_of(fid)?.create_props())
    }

    /// Access properties in effect: the resolved close degree and whether
    /// the file is in SWMR-write mode.
    pub fn file_access_props(&self, fid: Hid) -> Result<FileAccessProps> {
        let st = self.state.lock();
        st.expect_kind(fid, HandleKind::File)?;
        let file = st.file_of(fid)?;
        Ok(FileAccessProps::new()
            .close_degree(CloseDegree::from(file.degree()))
            .swmr_write(file.is_swmr_write()))
    }

    pub fn file_path(&self, hid: Hid) -> Result<std::path::PathBuf> {
        let st = self.state.lock();
        Ok(st.file_of(hid)?.path().to_path_buf())
    }

    /// Allocatable bytes reclaimed from dataset storage.
    pub fn free_space(&self, hid: Hid) -> Result<u64> {
        let st = self.state.lock();
        Ok(st.file_of(hid)?.free_space())
    }

    pub fn metadata_free_space(&self, hid: Hid) -> Result<u64> {
        let st = self.state.lock();
        Ok(st.file_of(hid)?.metadata_free_space())
    }

    /// Bytes released under SWMR that are not yet reusable.
    pub fn deferred_free_space(&self, hid: Hid) -> Result<u64> {
        let st = self.state.lock();
        Ok(st.file_of(hid)?.deferred_free_space())
    }

    /// Number of physical files currently open.
    pub fn open_file_count(&self) -> usize {
        self.state.lock().files.len()
    }
}
