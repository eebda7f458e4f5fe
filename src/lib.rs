//! # h5lite - Hierarchical Data Files with SWMR-Safe Extension
//!
//! h5lite stores groups, typed N-dimensional datasets, named datatypes and
//! attributes in a single file. Open files and the objects inside them are
//! reached through reference-counted identifiers managed by a [`Registry`].
//!
//! - **Shared physical files**: several logical opens of one path share one
//!   open file; a per-file close degree decides what closing the last one
//!   does to objects that are still open
//! - **Exact free-space accounting**: storage released by unlinked or shrunk
//!   datasets is merged and reused, and survives close and reopen
//! - **SWMR**: a writer extends datasets while independent readers poll; a
//!   reader never sees an extent that points at unwritten data
//!
//! ## Quick Start
//!
//! ```ignore
//! use h5lite::{Registry, CreateMode, FileCreateProps, FileAccessProps};
//! use h5lite::dataset::{Dataspace, Datatype, DatasetCreateProps, Hyperslab};
//!
//! let reg = Registry::new();
//! let fid = reg.create_file("data.h5", CreateMode::Truncate,
//!     &FileCreateProps::new(), &FileAccessProps::new())?;
//! let space = Dataspace::extendable(&[0], &[None])?;
//! let did = reg.create_dataset(fid, "samples", Datatype::f64(), space,
//!     &DatasetCreateProps::new().chunked(&[1024]))?;
//!
//! reg.set_extent(did, &[3])?;
//! reg.write_dataset(did, &Hyperslab::all(&[3]), &bytes)?;
//! reg.flush_dataset(did)?;
//! reg.close_dataset(did)?;
//! reg.close_file(fid)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Registry (handles, close degree)   │
//! ├──────────────────┬──────────────────┤
//! │   PhysicalFile   │   SwmrReader     │
//! │ catalog + flush  │  (own OS handle) │
//! ├──────────────────┴──────────────────┤
//! │  Dataset records (chunk map, extent) │
//! ├─────────────────────────────────────┤
//! │  FileSpace: Raw/Meta free-space pools│
//! ├─────────────────────────────────────┤
//! │  Superblock + metadata block (CRC)   │
//! ├─────────────────────────────────────┤
//! │  StorageDriver (file or memory)      │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! [userblock][superblock 128B][metadata block | chunk data | free ranges ...]
//!            ^ base address: every stored address is relative to here
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: format and policy constants
//! - [`error`]: `H5Error` and `error_kind`
//! - [`encoding`]: metadata codec
//! - [`storage`]: drivers, superblock, free-space manager
//! - [`file`]: physical files, catalog, properties, close degree
//! - [`dataset`]: datatypes, dataspaces, selections, layout, extension
//! - [`registry`]: identifiers and the object tracker
//! - [`swmr`]: reader, watcher, rendezvous
//! - [`cli`]: the `extend_dset` driver

#[macro_use]
mod macros;

pub mod cli;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod file;
pub mod registry;
pub mod storage;
pub mod swmr;

pub use error::{error_kind, ErrorKind, H5Error};
pub use file::{
    AccessMode, CloseDegree, CreateMode, EffectiveDegree, FileAccessProps, FileCreateProps,
};
pub use registry::{FileScope, HandleKind, Hid, ObjectMask, PropertyList, Registry, RegistryConfig};
