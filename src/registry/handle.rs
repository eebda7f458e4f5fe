//! Identifier types shared by every registry operation.

use std::fmt;
use std::ops::BitOr;

use crate::dataset::DatasetCreateProps;
use crate::file::{FileAccessProps, FileCreateProps};

/// Opaque handle identifier. Never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hid(pub(crate) u64);

impl Hid {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Hid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hid#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    File,
    Group,
    Dataset,
    Datatype,
    Attribute,
    PropertyList,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::File => "file",
            HandleKind::Group => "group",
            HandleKind::Dataset => "dataset",
            HandleKind::Datatype => "datatype",
            HandleKind::Attribute => "attribute",
            HandleKind::PropertyList => "property list",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind filter for object counting and listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMask(u8);

impl ObjectMask {
    pub const FILE: ObjectMask = ObjectMask(0x01);
    pub const DATASET: ObjectMask = ObjectMask(0x02);
    pub const GROUP: ObjectMask = ObjectMask(0x04);
    pub const DATATYPE: ObjectMask = ObjectMask(0x08);
    pub const ATTRIBUTE: ObjectMask = ObjectMask(0x10);
    pub const ALL: ObjectMask = ObjectMask(0x1F);

    /// Everything except file handles.
    pub const OBJECTS: ObjectMask = ObjectMask(0x1E);

    pub fn matches(self, kind: HandleKind) -> bool {
        let bit = match kind {
            HandleKind::File => Self::FILE,
            HandleKind::Dataset => Self::DATASET,
            HandleKind::Group => Self::GROUP,
            HandleKind::Datatype => Self::DATATYPE,
            HandleKind::Attribute => Self::ATTRIBUTE,
            HandleKind::PropertyList => return false,
        };
        self.0 & bit.0 != 0
    }
}

impl BitOr for ObjectMask {
    type Output = ObjectMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ObjectMask(self.0 | rhs.0)
    }
}

/// Which files an object count covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileScope {
    All,
    /// Every logical open of the physical file behind this handle.
    File(Hid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyList {
    FileCreate(FileCreateProps),
    FileAccess(FileAccessProps),
    DatasetCreate(DatasetCreateProps),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_matches_kinds() {
        let m = ObjectMask::GROUP | ObjectMask::DATASET;

        assert!(m.matches(HandleKind::Group));
        assert!(m.matches(HandleKind::Dataset));
        assert!(!m.matches(HandleKind::File));
        assert!(ObjectMask::ALL.matches(HandleKind::Attribute));
        assert!(!ObjectMask::ALL.matches(HandleKind::PropertyList));
        assert!(!ObjectMask::OBJECTS.matches(HandleKind::File));
    }
}
