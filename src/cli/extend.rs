//! # Dataset Extension Driver
//!
//! Opens a fixture file as the SWMR writer, handshakes with a watching
//! reader, extends one named dataset and writes the new elements.
//!
//! ## Dispatch
//!
//! | Dataset                                   | Protocol |
//! |-------------------------------------------|----------|
//! | `DSET_ONE`, `DSET_ALLOC_LATE`, `DSET_ALLOC_EARLY`, `DSET_CMPD`, `DSET_CMPD_ESC` | one axis by `delta1` |
//! | `DSET_TWO`, `DSET_CMPD_TWO`               | two axes by `delta1`, `delta2` |
//!
//! ## Sequence
//!
//! ```text
//! open RW+SWMR ─► open dataset ─► send writer_message ─► wait reader_message
//!   ─► pause ─► read extent ─► set_extent ─► write ─► flush ─► close
//! ```
//!
//! The one-axis protocol writes only the appended region, element `i`
//! numbered from zero. The two-axis protocol rewrites the whole new extent
//! with `delta1`.

use std::env;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use eyre::{Result, WrapErr};
use tracing::{debug, info};

use super::fill::{indexed_fill, pattern_fill};
use super::fixtures::{
    DSET_ALLOC_EARLY, DSET_ALLOC_LATE, DSET_CMPD, DSET_CMPD_ESC, DSET_CMPD_TWO, DSET_ONE, DSET_TWO,
};
use crate::dataset::Hyperslab;
use crate::error::H5Error;
use crate::file::{AccessMode, FileAccessProps};
use crate::registry::{Hid, Registry};
use crate::swmr::{Rendezvous, READER_MESSAGE, WRITER_MESSAGE};

pub const ENV_PAUSE_MS: &str = "H5LITE_EXTEND_PAUSE_MS";
pub const ENV_MESSAGE_DIR: &str = "H5LITE_MESSAGE_DIR";

pub const USAGE: &str = "Should have file name, dataset name, and the extended amount...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OneAxis,
    TwoAxis,
}

pub fn protocol_for(dataset: &str) -> Option<Protocol> {
    match dataset {
        DSET_ONE | DSET_ALLOC_LATE | DSET_ALLOC_EARLY | DSET_CMPD | DSET_CMPD_ESC => {
            Some(Protocol::OneAxis)
        }
        DSET_TWO | DSET_CMPD_TWO => Some(Protocol::TwoAxis),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendRequest {
    pub file: PathBuf,
    pub dataset: String,
    pub delta1: i64,
    pub delta2: i64,
}

impl ExtendRequest {
    /// Parses `<file> <dataset> <delta1> <delta2>`, program name excluded.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let [file, dataset, d1, d2] = args else {
            return Err(H5Error::InvalidArgument(USAGE.to_string()).into());
        };
        let delta = |s: &str| -> Result<i64> {
            s.trim()
                .parse()
                .map_err(|_| H5Error::InvalidArgument(format!("'{}' is not an integer", s)).into())
        };
        Ok(Self {
            file: PathBuf::from(file),
            dataset: dataset.clone(),
            delta1: delta(d1)?,
            delta2: delta(d2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendOptions {
    /// Stands in for application work between the handshake and the extend.
    pub pause: Duration,
    pub message_dir: PathBuf,
}

impl ExtendOptions {
    pub fn for_file(file: &Path) -> Self {
        let message_dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            pause: Duration::ZERO,
            message_dir,
        }
    }

    /// Defaults for `file`, overridden by `H5LITE_EXTEND_PAUSE_MS` and
    /// `H5LITE_MESSAGE_DIR`.
    pub fn from_env(file: &Path) -> Result<Self> {
        let mut opts = Self::for_file(file);
        if let Ok(ms) = env::var(ENV_PAUSE_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                H5Error::InvalidArgument(format!("{} must be a number of milliseconds", ENV_PAUSE_MS))
            })?;
            opts.pause = Duration::from_millis(ms);
        }
        if let Ok(dir) = env::var(ENV_MESSAGE_DIR) {
            opts.message_dir = PathBuf::from(dir);
        }
        Ok(opts)
    }
}

fn grow(current: u64, delta: i64, axis: usize) -> Result<u64> {
    current.checked_add_signed(delta).ok_or_else(|| {
        if delta < 0 {
            H5Error::InvalidShrink {
                axis,
                reason: "extent would fall below zero",
            }
            .into()
        } else {
            H5Error::InvalidArgument(format!("axis {}: extent overflows", axis)).into()
        }
    })
}

fn expect_rank(dims: &[u64], rank: usize) -> Result<()> {
    if dims.len() != rank {
        return Err(H5Error::RankMismatch {
            expected: rank,
            actual: dims.len(),
        }
        .into());
    }
    Ok(())
}

fn extend_one(reg: &Registry, did: Hid, delta: i64) -> Result<Vec<u64>> {
    let cur = reg.dataset_extent(did)?;
    expect_rank(&cur, 1)?;
    let new = vec![grow(cur[0], delta, 0)?];
    let appended = if delta > 0 {
        let dt = reg.dataset_datatype(did)?;
        let count = delta as u64;
        Some((Hyperslab::new(&[cur[0]], &[count])?, indexed_fill(&dt, count)?))
    } else {
        None
    };
    reg.set_extent(did, &new)?;
    if let Some((sel, data)) = appended {
        reg.write_dataset(did, &sel, &data)?;
    }
    Ok(new)
}

fn extend_two(reg: &Registry, did: Hid, delta1: i64, delta2: i64) -> Result<Vec<u64>> {
    let cur = reg.dataset_extent(did)?;
    expect_rank(&cur, 2)?;
    let new = vec![grow(cur[0], delta1, 0)?, grow(cur[1], delta2, 1)?];
    let count = new
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| H5Error::InvalidArgument(format!("extent {:?} overflows", new)))?;
    let data = if count > 0 {
        let dt = reg.dataset_datatype(did)?;
        Some(pattern_fill(&dt, count, delta1)?)
    } else {
        None
    };
    reg.set_extent(did, &new)?;
    if let Some(data) = data {
        reg.write_dataset(did, &Hyperslab::all(&new), &data)?;
    }
    Ok(new)
}

/// Runs the full writer sequence and returns the dataset's new extent.
pub fn extend_dataset(
    reg: &Registry,
    req: &ExtendRequest,
    opts: &ExtendOptions,
    rendezvous: &dyn Rendezvous,
) -> Result<Vec<u64>> {
    let protocol = protocol_for(&req.dataset).ok_or_else(|| {
        H5Error::InvalidArgument(format!("dataset '{}' cannot be extended", req.dataset))
    })?;

    let fapl = FileAccessProps::new().swmr_write(true);
    let fid = reg
        .open_file(&req.file, AccessMode::ReadWrite, &fapl)
        .wrap_err_with(|| format!("failed to open '{}'", req.file.display()))?;
    let did = reg.open_dataset(fid, &req.dataset)?;

    rendezvous.send_message(WRITER_MESSAGE)?;
    rendezvous.wait_message(READER_MESSAGE)?;
    if !opts.pause.is_zero() {
        debug!(pause_ms = opts.pause.as_millis() as u64, "pausing before extend");
        thread::sleep(opts.pause);
    }

    let new = match protocol {
        Protocol::OneAxis => extend_one(reg, did, req.delta1),
        Protocol::TwoAxis => extend_two(reg, did, req.delta1, req.delta2),
    }
    .wrap_err_with(|| format!("failed to extend '{}'", req.dataset))?;

    reg.flush_dataset(did)?;
    reg.close_dataset(did)?;
    reg.close_file(fid)?;
    info!(dataset = %req.dataset, extent = ?new, "extended dataset");
    Ok(new)
}
