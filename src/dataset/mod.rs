//! # Dataset Module
//!
//! Everything needed to describe a dataset and move its bytes: element
//! datatypes, dataspaces with optional maxima, rectangular selections, the
//! chunked storage layout with its allocation-time policy, and the extension
//! protocol that grows and shrinks a dataset in place.
//!
//! ## Module Organization
//!
//! - `datatype`: integer, float and nested compound element types
//! - `dataspace`: current and maximum dimensions (`None` = unlimited)
//! - `selection`: hyperslab blocks and row-major block copies
//! - `layout`: contiguous/chunked layout, allocation time, `DatasetCreateProps`
//! - `extent`: `DatasetRecord`, the chunk map and `set_extent`/`write_region`
//!
//! The module is storage-agnostic: chunk I/O goes through the `ChunkStore`
//! and `ChunkRead` traits.

pub mod dataspace;
pub mod datatype;
pub mod extent;
pub mod layout;
pub mod selection;

pub use dataspace::{Dataspace, Dims, MaxDims};
pub use datatype::{CompoundBuilder, CompoundField, Datatype};
pub use extent::{ChunkBlock, ChunkCoord, ChunkRead, ChunkStore, DatasetRecord};
pub use layout::{AllocTime, DatasetCreateProps, Layout};
pub use selection::Hyperslab;
