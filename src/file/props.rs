//! # File Property Lists
//!
//! Creation and access settings for files, in builder form:
//!
//! ```ignore
//! let fcpl = FileCreateProps::new()
//!     .userblock(512)
//!     .sizes(8, 8)
//!     .sym_k(32, 8);
//! let fapl = FileAccessProps::new().close_degree(CloseDegree::Semi);
//! ```
//!
//! ## Creation Properties
//!
//! | Property       | Default | Valid values                       |
//! |----------------|---------|------------------------------------|
//! | userblock_size | 0       | 0 or a power of two >= 512         |
//! | offset_size    | 8       | 2, 4, 8, 16, 32                    |
//! | length_size    | 8       | 2, 4, 8, 16, 32                    |
//! | sym_internal_k | 16      | > 0                                |
//! | sym_leaf_k     | 4       | > 0                                |
//!
//! Creation properties are written into the superblock and read back on
//! every open, so `file_create_props` reports the same values for a created
//! and a reopened file.

use eyre::Result;

use super::close_degree::CloseDegree;
use crate::config::{
    DEFAULT_LENGTH_SIZE, DEFAULT_OFFSET_SIZE, DEFAULT_SYM_INTERNAL_K, DEFAULT_SYM_LEAF_K,
    DEFAULT_USERBLOCK_SIZE, MIN_USERBLOCK_SIZE, VALID_ADDRESS_SIZES,
};
use crate::error::H5Error;
use crate::storage::Superblock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCreateProps {
    userblock_size: u64,
    offset_size: u8,
    length_size: u8,
    sym_internal_k: u16,
    sym_leaf_k: u16,
}

impl Default for FileCreateProps {
    fn default() -> Self {
        Self {
            userblock_size: DEFAULT_USERBLOCK_SIZE,
            offset_size: DEFAULT_OFFSET_SIZE,
            length_size: DEFAULT_LENGTH_SIZE,
            sym_internal_k: DEFAULT_SYM_INTERNAL_K,
            sym_leaf_k: DEFAULT_SYM_LEAF_K,
        }
    }
}

impl FileCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn userblock(mut self, size: u64) -> Self {
        self.userblock_size = size;
        self
    }

    pub fn sizes(mut self, offset_size: u8, length_size: u8) -> Self {
        self.offset_size = offset_size;
        self.length_size = length_size;
        self
    }

    /// Symbol-table fan-out: internal-node K first, then leaf K.
    pub fn sym_k(mut self, internal_k: u16, leaf_k: u16) -> Self {
        self.sym_internal_k = internal_k;
        self.sym_leaf_k = leaf_k;
        self
    }

    pub fn userblock_size(&self) -> u64 {
        self.userblock_size
    }

    pub fn offset_size(&self) -> u8 {
        self.offset_size
    }

    pub fn length_size(&self) -> u8 {
        self.length_size
    }

    pub fn sym_internal_k(&self) -> u16 {
        self.sym_internal_k
    }

    pub fn sym_leaf_k(&self) -> u16 {
        self.sym_leaf_k
    }

    pub fn validate(&self) -> Result<()> {
        let ub = self.userblock_size;
        if ub != 0 && (ub < MIN_USERBLOCK_SIZE || !ub.is_power_of_two()) {
            return Err(H5Error::InvalidArgument(format!(
                "userblock size {} must be 0 or a power of two >= {}",
                ub, MIN_USERBLOCK_SIZE
            ))
            .into());
        }
        for (what, size) in [("offset", self.offset_size), ("length", self.length_size)] {
            if !VALID_ADDRESS_SIZES.contains(&size) {
                return Err(H5Error::InvalidArgument(format!(
                    "{} size {} not in {:?}",
                    what, size, VALID_ADDRESS_SIZES
                ))
                .into());
            }
        }
        if self.sym_internal_k == 0 || self.sym_leaf_k == 0 {
            return Err(H5Error::InvalidArgument("symbol-table K must be positive".to_string()).into());
        }
        Ok(())
    }

    pub(crate) fn to_superblock(self) -> Superblock {
        Superblock::new(
            self.userblock_size,
            self.offset_size,
            self.length_size,
            self.sym_leaf_k,
            self.sym_internal_k,
        )
    }

    pub(crate) fn from_superblock(sb: &Superblock) -> Self {
        Self {
            userblock_size: sb.userblock_size(),
            offset_size: sb.offset_size(),
            length_size: sb.length_size(),
            sym_internal_k: sb.sym_internal_k(),
            sym_leaf_k: sb.sym_leaf_k(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAccessProps {
    close_degree: CloseDegree,
    swmr_write: bool,
}

impl FileAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close_degree(mut self, degree: CloseDegree) -> Self {
        self.close_degree = degree;
        self
    }

    pub fn swmr_write(mut self, on: bool) -> Self {
        self.swmr_write = on;
        self
    }

    pub fn degree(&self) -> CloseDegree {
        self.close_degree
    }

    pub fn is_swmr_write(&self) -> bool {
        self.swmr_write
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Fail if the path exists.
    Exclusive,
    /// Replace existing content unless the file is open.
    Truncate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn defaults_match_library_defaults() {
        let p = FileCreateProps::new();

        assert_eq!(p.userblock_size(), 0);
        assert_eq!(p.offset_size(), 8);
        assert_eq!(p.length_size(), 8);
        assert_eq!(p.sym_internal_k(), 16);
        assert_eq!(p.sym_leaf_k(), 4);
        p.validate().unwrap();
    }

    #[test]
    fn userblock_must_be_power_of_two_at_least_512() {
        for bad in [1, 256, 600, 1000] {
            let err = FileCreateProps::new().userblock(bad).validate().unwrap_err();
            assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
        }
        for good in [0, 512, 1024, 4096] {
            FileCreateProps::new().userblock(good).validate().unwrap();
        }
    }

    #[test]
    fn sizes_and_k_are_validated() {
        assert!(FileCreateProps::new().sizes(3, 8).validate().is_err());
        assert!(FileCreateProps::new().sizes(8, 64).validate().is_err());
        assert!(FileCreateProps::new().sym_k(0, 4).validate().is_err());
        FileCreateProps::new().sizes(4, 16).validate().unwrap();
    }

    #[test]
    fn props_survive_superblock() {
        let p = FileCreateProps::new().userblock(512).sym_k(32, 8);

        let back = FileCreateProps::from_superblock(&p.to_superblock());

        assert_eq!(back, p);
    }

    #[test]
    fn access_props_default_to_default_degree() {
        let fapl = FileAccessProps::new();

        assert_eq!(fapl.degree(), CloseDegree::Default);
        assert!(!fapl.is_swmr_write());
    }
}
