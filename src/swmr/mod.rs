//! # Single-Writer / Multiple-Reader Access
//!
//! A writer in SWMR mode keeps released storage out of circulation for a
//! few flushes (see `file::space`) and commits every flush through the
//! superblock. Readers here never share state with the writer's registry:
//!
//! ```text
//! writer process                       reader process
//! ──────────────                       ──────────────
//! set_extent / write                   SwmrReader::open(path)
//! flush ── data, metadata, superblock ─► refresh() sees generation N+1
//! ```
//!
//! - `reader`: `SwmrReader`, snapshot reads with retry on a torn commit
//! - `watcher`: `DatasetWatcher`, reports extent changes and appended data
//! - `rendezvous`: `Rendezvous` trait with channel and message-file backends

pub mod reader;
pub mod rendezvous;
pub mod watcher;

pub use reader::SwmrReader;
pub use rendezvous::{ChannelRendezvous, FileRendezvous, Rendezvous, READER_MESSAGE, WRITER_MESSAGE};
pub use watcher::{DatasetWatcher, ExtentChange};
