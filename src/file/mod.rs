//! # File Module
//!
//! Everything that belongs to one physical file, independent of how many
//! handles refer to it:
//!
//! ```text
//! PhysicalFile
//!   ├── Superblock      commit point (address, generation, EOA, flags)
//!   ├── FileSpace       storage + Raw/Meta free-space pools + SWMR deferral
//!   └── Catalog         path-keyed groups, datasets, named types, attributes
//! ```
//!
//! ## Module Organization
//!
//! - `props`: `FileCreateProps`, `FileAccessProps`, access and create modes
//! - `close_degree`: the close-degree table
//! - `catalog`: object hierarchy and path resolution
//! - `space`: allocation pools and the `ChunkStore` implementation
//! - `payload`: metadata block body shared by writers and SWMR readers
//! - `physical`: `PhysicalFile`, open/create and the flush protocol

pub mod catalog;
pub mod close_degree;
pub mod payload;
pub mod physical;
pub mod props;
pub mod space;

pub use catalog::{is_within, parent_path, resolve_path, AttributeRecord, Catalog, ObjectBody, ObjectRecord, ROOT};
pub use close_degree::{CloseAction, CloseDegree, EffectiveDegree};
pub use payload::MetadataPayload;
pub use physical::PhysicalFile;
pub use props::{AccessMode, CreateMode, FileAccessProps, FileCreateProps};
pub use space::{DeferredFree, FileSpace, Pool};
