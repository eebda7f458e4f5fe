//! # Handle Registry
//!
//! The `Registry` is the context object that owns every open file and every
//! handle derived from one. It plays two roles:
//!
//! - **File handle registry**: maps storage identities to `PhysicalFile`s so
//!   several logical opens of one path share a single physical file, and
//!   enforces create/open compatibility (exclusive create, truncation of an
//!   open file, close degree, read-only mixing).
//! - **Object reference tracker**: counts and lists live handles by kind and
//!   applies the close-degree table when the last logical open goes away.
//!
//! ## Ownership
//!
//! ```text
//! handles: Hid ──────────────► HandleEntry { kind, refs, phys, origin, .. }
//!                                      │ phys (PhysId)
//!                                      ▼
//! files:   PhysId ───────────► PhysicalFile
//! by_identity: (dev, ino) ───► PhysId
//! ```
//!
//! Handles never own their file; they carry its `PhysId` and every access is
//! a table lookup. Object handles remember the file handle they were opened
//! through (`origin`), but closing that handle does not invalidate them.
//!
//! ## Thread Safety
//!
//! One `parking_lot::Mutex` guards all tables. Every public method takes
//! `&self`, so a registry can be shared through an `Arc`.
//!
//! ## Module Organization
//!
//! - `handle`: `Hid`, `HandleKind`, `ObjectMask`, `FileScope`, `PropertyList`
//! - `state`: tables and lookup helpers
//! - `files`: create, open, reopen, close, flush and file queries
//! - `objects`: groups, datasets, named datatypes, attributes, property lists
//! - `tracker`: counting, listing, `file_of` and reference counts
//! - `io`: dataset extent, read, write and flush

mod files;
pub mod handle;
mod io;
mod objects;
mod state;
mod tracker;

pub use handle::{FileScope, HandleKind, Hid, ObjectMask, PropertyList};

use eyre::Result;
use parking_lot::Mutex;
use tracing::warn;

use crate::file::EffectiveDegree;
use state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// What `CloseDegree::Default` resolves to.
    pub default_close_degree: EffectiveDegree,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_close_degree: EffectiveDegree::Weak,
        }
    }
}

impl RegistryConfig {
    pub fn default_close_degree(mut self, degree: EffectiveDegree) -> Self {
        self.default_close_degree = degree;
        self
    }
}

#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    state: Mutex<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Closes every physical file and invalidates every handle. Returns the
    /// first error met; the remaining files are still closed.
    pub fn shutdown(&self) -> Result<()> {
        let mut st = self.state.lock();
        st.handles.clear();
        let mut phys: Vec<_> = st.files.keys().copied().collect();
        phys.sort_unstable();
        let mut first_err = None;
        for p in phys {
            if let Err(e) = st.teardown(p) {
                warn!(error = %e, "failed to close file during shutdown");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "registry dropped with a file that failed to close");
        }
    }
}
