//! # Error Kinds
//!
//! All fallible operations in h5lite return `eyre::Result`. Failures that are
//! part of the observable contract (a refused close, an incompatible open, an
//! extent past its maximum) are raised as an [`H5Error`] at the root of the
//! report, so callers can branch on them while still getting the context that
//! `wrap_err` adds on the way up.
//!
//! ```ignore
//! match registry.close_file(fid) {
//!     Err(e) if h5lite::error_kind(&e) == ErrorKind::ObjectsStillOpen => { /* retry later */ }
//!     other => other?,
//! }
//! ```
//!
//! Underlying medium failures are plain `std::io::Error`s wrapped with
//! context; [`error_kind`] reports them as [`ErrorKind::IoFailure`].

use thiserror::Error;

use crate::registry::{HandleKind, Hid};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum H5Error {
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("file '{0}' is already open and cannot be truncated")]
    AlreadyOpen(String),

    #[error("file '{0}' is already open read-only")]
    AlreadyOpenReadOnly(String),

    #[error("file close degree {requested} is incompatible with the open file's degree {existing}")]
    IncompatibleCloseDegree {
        requested: &'static str,
        existing: &'static str,
    },

    #[error("{count} object(s) still open")]
    ObjectsStillOpen { count: usize },

    #[error("axis {axis}: extent {requested} exceeds maximum {max}")]
    ExceedsMaximumExtent { axis: usize, requested: u64, max: u64 },

    #[error("axis {axis}: cannot shrink: {reason}")]
    InvalidShrink { axis: usize, reason: &'static str },

    #[error("invalid byte range: offset {offset}, length {length}")]
    InvalidRange { offset: u64, length: u64 },

    #[error("{0} is not associated with a file")]
    NotAssociatedWithFile(Hid),

    #[error("cannot allocate {requested} bytes")]
    AllocationFailure { requested: u64 },

    #[error("invalid identifier {0}")]
    InvalidHandle(Hid),

    #[error("{hid} is a {actual} handle, expected {expected}")]
    WrongHandleKind {
        hid: Hid,
        expected: HandleKind,
        actual: HandleKind,
    },

    #[error("no write intent on '{0}'")]
    ReadOnly(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    #[error("selection exceeds the dataset extent on axis {axis}")]
    SelectionOutOfBounds { axis: usize },

    #[error("buffer holds {actual} bytes, selection needs {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupt file structure: {0}")]
    Corrupt(String),

    #[error("timed out waiting for '{0}'")]
    Timeout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    AlreadyOpen,
    AlreadyOpenReadOnly,
    IncompatibleCloseDegree,
    ObjectsStillOpen,
    ExceedsMaximumExtent,
    InvalidShrink,
    InvalidRange,
    NotAssociatedWithFile,
    AllocationFailure,
    IoFailure,
    InvalidHandle,
    WrongHandleKind,
    ReadOnly,
    NotFound,
    RankMismatch,
    SelectionOutOfBounds,
    BufferSizeMismatch,
    InvalidArgument,
    Corrupt,
    Timeout,
    Other,
}

impl H5Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            H5Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            H5Error::AlreadyOpen(_) => ErrorKind::AlreadyOpen,
            H5Error::AlreadyOpenReadOnly(_) => ErrorKind::AlreadyOpenReadOnly,
            H5Error::IncompatibleCloseDegree { .. } => ErrorKind::IncompatibleCloseDegree,
            H5Error::ObjectsStillOpen { .. } => ErrorKind::ObjectsStillOpen,
            H5Error::ExceedsMaximumExtent { .. } => ErrorKind::ExceedsMaximumExtent,
            H5Error::InvalidShrink { .. } => ErrorKind::InvalidShrink,
            H5Error::InvalidRange { .. } => ErrorKind::InvalidRange,
            H5Error::NotAssociatedWithFile(_) => ErrorKind::NotAssociatedWithFile,
            H5Error::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            H5Error::InvalidHandle(_) => ErrorKind::InvalidHandle,
            H5Error::WrongHandleKind { .. } => ErrorKind::WrongHandleKind,
            H5Error::ReadOnly(_) => ErrorKind::ReadOnly,
            H5Error::NotFound(_) => ErrorKind::NotFound,
            H5Error::RankMismatch { .. } => ErrorKind::RankMismatch,
            H5Error::SelectionOutOfBounds { .. } => ErrorKind::SelectionOutOfBounds,
            H5Error::BufferSizeMismatch { .. } => ErrorKind::BufferSizeMismatch,
            H5Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            H5Error::Corrupt(_) => ErrorKind::Corrupt,
            H5Error::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Classifies a report by the first contract error or I/O error in its chain.
pub fn error_kind(report: &eyre::Report) -> ErrorKind {
    for cause in report.chain() {
        if let Some(e) = cause.downcast_ref::<H5Error>() {
            return e.kind();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorKind::IoFailure;
        }
    }
    ErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn error_kind_finds_root_contract_error() {
        let result: eyre::Result<()> = Err(H5Error::ObjectsStillOpen { count: 3 }.into());
        let report = result.wrap_err("failed to close file").unwrap_err();

        assert_eq!(error_kind(&report), ErrorKind::ObjectsStillOpen);
        assert!(report.to_string().contains("failed to close file"));
    }

    #[test]
    fn error_kind_maps_io_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let result: eyre::Result<()> = Err(io.into());
        let report = result.wrap_err("failed to open").unwrap_err();

        assert_eq!(error_kind(&report), ErrorKind::IoFailure);
    }

    #[test]
    fn error_kind_falls_back_to_other() {
        let report = eyre::eyre!("something unrelated");

        assert_eq!(error_kind(&report), ErrorKind::Other);
    }
}
