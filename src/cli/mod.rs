//! # Extension Driver
//!
//! Library side of the `extend_dset` binary: argument parsing, the
//! dataset-name dispatch table, the one- and two-axis extension protocols,
//! and the WATCH fixture they run against.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   bin/extend_dset.rs                        │
//! │   logging setup, usage errors, exit status                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        extend                               │
//! │   ExtendRequest ─► protocol_for ─► extend_dataset           │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │            fill              │          fixtures            │
//! │   element patterns           │   WATCH file, dataset names  │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! extend_dset WATCH.h5 DSET_ONE 2 0      # append two elements
//! extend_dset WATCH.h5 DSET_TWO -1 3     # one row fewer, three more columns
//! ```
//!
//! ## Environment
//!
//! | Variable                 | Meaning                                  |
//! |--------------------------|------------------------------------------|
//! | `H5LITE_LOG`             | log level, default `warn`                |
//! | `H5LITE_EXTEND_PAUSE_MS` | pause after the handshake, default 0     |
//! | `H5LITE_MESSAGE_DIR`     | message-file directory, default the file's directory |

pub mod extend;
pub mod fill;
pub mod fixtures;

pub use extend::{extend_dataset, protocol_for, ExtendOptions, ExtendRequest, Protocol, USAGE};
pub use fixtures::create_watch_fixture;
