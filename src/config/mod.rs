//! # h5lite Configuration Module
//!
//! Every format constant and policy default lives here so that values which
//! depend on each other (superblock size and checksum offset, metadata header
//! size and slack) cannot drift apart. Interdependencies are enforced with
//! compile-time assertions in [`constants`].
//!
//! Runtime configuration is carried by property structs instead:
//! `FileCreateProps`, `FileAccessProps`, `DatasetCreateProps` and
//! `RegistryConfig`.

pub mod constants;
pub use constants::*;
