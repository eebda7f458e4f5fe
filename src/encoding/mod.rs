//! # Encoding Module
//!
//! Fixed-width little-endian codec used for the metadata block payload
//! (free-space entries and the object catalog).

pub mod codec;

pub use codec::{MetaReader, MetaWriter};
