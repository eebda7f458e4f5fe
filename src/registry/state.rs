//! Registry tables and the lookups every public operation builds on. All of
//! it runs with the registry mutex held.

use eyre::Result;
use hashbrown::HashMap;
use tracing::debug;

use super::handle::{HandleKind, Hid, PropertyList};
use crate::error::H5Error;
use crate::file::{FileAccessProps, PhysicalFile};
use crate::storage::FileIdentity;

pub(crate) type PhysId = u64;

#[derive(Debug)]
pub(crate) enum HandleBody {
    File { access: FileAccessProps },
    Object { path: String },
    Attribute { object: String, name: String },
    PropertyList(PropertyList),
}

#[derive(Debug)]
pub(crate) struct HandleEntry {
    pub kind: HandleKind,
    pub refs: u32,
    pub phys: Option<PhysId>,
    /// Write intent inherited from the logical open the handle came from.
    pub writable: bool,
    /// File handle the object was opened through, possibly closed since.
    pub origin: Option<Hid>,
    pub body: HandleBody,
}

impl HandleEntry {
    pub fn path(&self) -> Option<&str> {
        match &self.body {
            HandleBody::Object { path } => Some(path),
            HandleBody::File { .. } => Some(crate::file::ROOT),
            _ => None,
        }
    }
}

/// Where a new object is created or looked up.
#[derive(Debug, Clone)]
pub(crate) struct Location {
    pub phys: PhysId,
    pub path: String,
    pub writable: bool,
    pub origin: Hid,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    next_hid: u64,
    next_phys: PhysId,
    pub handles: HashMap<Hid, HandleEntry>,
    pub files: HashMap<PhysId, PhysicalFile>,
    pub by_identity: HashMap<FileIdentity, PhysId>,
}

impl State {
    pub fn mint(&mut self, entry: HandleEntry) -> Hid {
        self.next_hid += 1;
        let hid = Hid(self.next_hid);
        self.handles.insert(hid, entry);
        hid
    }

    pub fn register_file(&mut self, file: PhysicalFile) -> PhysId {
        self.next_phys += 1;
        let phys = self.next_phys;
        self.by_identity.insert(file.identity().clone(), phys);
        self.files.insert(phys, file);
        phys
    }

    pub fn mint_file_handle(&mut self, phys: PhysId, writable: bool, access: FileAccessProps) -> Hid {
        self.mint(HandleEntry {
            kind: HandleKind::File,
            refs: 1,
            phys: Some(phys),
            writable,
            origin: None,
            body: HandleBody::File { access },
        })
    }

    pub fn entry(&self, hid: Hid) -> Result<&HandleEntry> {
        self.handles
            .get(&hid)
            .ok_or_else(|| H5Error::InvalidHandle(hid).into())
    }

    pub fn entry_mut(&mut self, hid: Hid) -> Result<&mut HandleEntry> {
        self.handles
            .get_mut(&hid)
            .ok_or_else(|| H5Error::InvalidHandle(hid).into())
    }

    pub fn expect_kind(&self, hid: Hid, expected: HandleKind) -> Result<&HandleEntry> {
        let entry = self.entry(hid)?;
        if entry.kind != expected {
            return Err(H5Error::WrongHandleKind {
                hid,
                expected,
                actual: entry.kind,
            }
            .into());
        }
        Ok(entry)
    }

    pub fn phys_of(&self, hid: Hid) -> Result<PhysId> {
        self.entry(hid)?
            .phys
            .ok_or_else(|| H5Error::NotAssociatedWithFile(hid).into())
    }

    pub fn file(&self, phys: PhysId) -> Result<&PhysicalFile> {
        debug_assert!(self.files.contains_key(&phys), "handle refers to a released file");
        self.files
            .get(&phys)
            .ok_or_else(|| H5Error::Corrupt(format!("physical file {} is not registered", phys)).into())
    }

    pub fn file_mut(&mut self, phys: PhysId) -> Result<&mut PhysicalFile> {
        debug_assert!(self.files.contains_key(&phys), "handle refers to a released file");
        self.files
            .get_mut(&phys)
            .ok_or_else(|| H5Error::Corrupt(format!("physical file {} is not registered", phys)).into())
    }

    pub fn file_of(&self, hid: Hid) -> Result<&PhysicalFile> {
        self.file(self.phys_of(hid)?)
    }

    pub fn file_of_mut(&mut self, hid: Hid) -> Result<&mut PhysicalFile> {
        let phys = self.phys_of(hid)?;
        self.file_mut(phys)
    }

    /// Resolves a file or group handle to a location for path lookups.
    pub fn location(&self, hid: Hid) -> Result<Location> {
        let entry = self.entry(hid)?;
        let origin = match entry.kind {
            HandleKind::File => hid,
            HandleKind::Group => entry.origin.unwrap_or(hid),
            actual => {
                return Err(H5Error::WrongHandleKind {
                    hid,
                    expected: HandleKind::Group,
                    actual,
                }
                .into())
            }
        };
        let phys = self.phys_of(hid)?;
        let path = entry.path().unwrap_or(crate::file::ROOT).to_string();
        Ok(Location {
            phys,
            path,
            writable: entry.writable,
            origin,
        })
    }

    /// Resolves any handle that can carry attributes to its object path.
    pub fn attribute_target(&self, hid: Hid) -> Result<Location> {
        let entry = self.entry(hid)?;
        let (path, origin) = match (&entry.body, entry.kind) {
            (HandleBody::File { .. }, _) => (crate::file::ROOT.to_string(), hid),
            (HandleBody::Object { path }, _) => (path.clone(), entry.origin.unwrap_or(hid)),
            (_, actual) => {
                return Err(H5Error::WrongHandleKind {
                    hid,
                    expected: HandleKind::Group,
                    actual,
                }
                .into())
            }
        };
        Ok(Location {
            phys: self.phys_of(hid)?,
            path,
            writable: entry.writable,
            origin,
        })
    }

    pub fn ensure_writable(&self, loc: &Location) -> Result<()> {
        if !loc.writable {
            let path = self.file(loc.phys)?.path().display().to_string();
            return Err(H5Error::ReadOnly(path).into());
        }
        Ok(())
    }

    /// Live file handles on `phys`.
    pub fn logical_opens(&self, phys: PhysId) -> usize {
        self.handles
            .values()
            .filter(|h| h.kind == HandleKind::File && h.phys == Some(phys))
            .count()
    }

    /// Live non-file handles on `phys`, in identifier order.
    pub fn open_objects(&self, phys: PhysId) -> Vec<Hid> {
        let mut out: Vec<Hid> = self
            .handles
            .iter()
            .filter(|(_, h)| h.kind != HandleKind::File && h.phys == Some(phys))
            .map(|(&hid, _)| hid)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn is_referenced(&self, phys: PhysId) -> bool {
        self.handles.values().any(|h| h.phys == Some(phys))
    }

    /// Removes the physical file from the tables and performs its final
    /// flush. No handle may still refer to it.
    pub fn teardown(&mut self, phys: PhysId) -> Result<()> {
        debug_assert!(!self.is_referenced(phys));
        let Some(mut file) = self.files.remove(&phys) else {
            return Ok(());
        };
        self.by_identity.remove(file.identity());
        debug!(path = %file.path().display(), "releasing physical file");
        file.close()
    }
}
