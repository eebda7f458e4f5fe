//! # Storage Module
//!
//! The byte-level foundation of h5lite. Nothing in here knows about groups,
//! datasets or handles; it only moves bytes, frames headers and tracks which
//! byte ranges are free.
//!
//! ## Architecture Overview
//!
//! ```text
//!        FileSpace (file module)
//!            │ allocate / release / read / write (base-relative)
//!            ▼
//! ┌──────────────────────┐   ┌───────────────────────────┐
//! │ FreeSpaceManager     │   │ AnyStorage                │
//! │  best-fit, coalesce  │   │  FileStorage | Memory     │
//! └──────────────────────┘   └───────────────────────────┘
//!                                     ▲
//!                        Superblock / metadata block framing (headers)
//! ```
//!
//! ## Module Organization
//!
//! - `driver`: `StorageDriver` trait, file and in-memory backends, file identity
//! - `headers`: zerocopy superblock, metadata block framing, CRC-64
//! - `freespace`: size-class bucketed best-fit free-space manager
//!
//! ## Thread Safety
//!
//! Drivers are `Send`. Shared access is serialized by the registry mutex;
//! SWMR readers in other processes (or threads) use their own `FileStorage`.

pub mod driver;
pub mod freespace;
pub mod headers;

pub use driver::{path_identity, AnyStorage, FileIdentity, FileStorage, MemoryStorage, StorageDriver};
pub use freespace::{FreeRange, FreeSpaceManager};
pub use headers::{
    checksum, decode_metadata_block, encode_metadata_block, metadata_block_len, MetaBlockHeader,
    Superblock,
};
