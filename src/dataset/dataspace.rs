//! # Dataspaces
//!
//! The shape of a dataset or attribute: current dimensions plus, per axis, an
//! optional maximum. `None` marks an unlimited axis. A scalar dataspace has
//! rank 0 and exactly one element.

use eyre::Result;
use smallvec::SmallVec;

use crate::config::{MAX_RANK, MAX_TRANSFER_BYTES, UNLIMITED_ENCODED};
use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;

pub type Dims = SmallVec<[u64; 4]>;
pub type MaxDims = SmallVec<[Option<u64>; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    dims: Dims,
    max_dims: MaxDims,
}

impl Dataspace {
    pub fn scalar() -> Self {
        Self {
            dims: Dims::new(),
            max_dims: MaxDims::new(),
        }
    }

    /// Fixed-size dataspace; maximum equals current on every axis.
    pub fn simple(dims: &[u64]) -> Result<Self> {
        let max: Vec<Option<u64>> = dims.iter().map(|&d| Some(d)).collect();
        Self::extendable(dims, &max)
    }

    pub fn extendable(dims: &[u64], max_dims: &[Option<u64>]) -> Result<Self> {
        if dims.len() != max_dims.len() {
            return Err(H5Error::RankMismatch {
                expected: dims.len(),
                actual: max_dims.len(),
            }
            .into());
        }
        if dims.len() > MAX_RANK {
            return Err(H5Error::InvalidArgument(format!(
                "rank {} exceeds maximum {}",
                dims.len(),
                MAX_RANK
            ))
            .into());
        }
        for (axis, (&d, &m)) in dims.iter().zip(max_dims).enumerate() {
            if let Some(max) = m {
                if d > max {
                    return Err(H5Error::ExceedsMaximumExtent {
                        axis,
                        requested: d,
                        max,
                    }
                    .into());
                }
                if max == UNLIMITED_ENCODED {
                    return Err(H5Error::InvalidArgument(format!(
                        "axis {} maximum collides with the unlimited marker",
                        axis
                    ))
                    .into());
                }
            }
        }
        let space = Self {
            dims: SmallVec::from_slice(dims),
            max_dims: SmallVec::from_slice(max_dims),
        };
        space.checked_num_elements()?;
        Ok(space)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn max_dims(&self) -> &[Option<u64>] {
        &self.max_dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// True when any axis may change size.
    pub fn is_extendable(&self) -> bool {
        self.dims
            .iter()
            .zip(&self.max_dims)
            .any(|(&d, &m)| m != Some(d))
    }

    pub fn num_elements(&self) -> u64 {
        self.dims.iter().product()
    }

    fn checked_num_elements(&self) -> Result<u64> {
        self.dims
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| H5Error::InvalidArgument("dataspace element count overflows".to_string()).into())
    }

    /// Replaces the current dimensions after the caller has validated them
    /// against the maxima and with `checked_byte_len`.
    pub(crate) fn set_dims(&mut self, dims: &[u64]) {
        debug_assert_eq!(dims.len(), self.dims.len());
        self.dims = SmallVec::from_slice(dims);
    }

    pub fn encode(&self, w: &mut MetaWriter) {
        w.put_u32(self.rank() as u32);
        for (&d, &m) in self.dims.iter().zip(&self.max_dims) {
            w.put_u64(d);
            w.put_u64(m.unwrap_or(UNLIMITED_ENCODED));
        }
    }

    pub fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        let rank = r.count("dataspace rank", 16)?;
        let mut dims = Vec::with_capacity(rank);
        let mut max = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(r.u64("dimension")?);
            let m = r.u64("maximum dimension")?;
            max.push(if m == UNLIMITED_ENCODED { None } else { Some(m) });
        }
        Self::extendable(&dims, &max)
            .map_err(|e| H5Error::Corrupt(format!("invalid stored dataspace: {}", e)).into())
    }
}

/// Bytes held by `dims` elements of `elem_size` bytes, or `None` when the
/// product does not fit in a `u64`.
pub(crate) fn checked_byte_len(dims: &[u64], elem_size: usize) -> Option<u64> {
    dims.iter()
        .try_fold(elem_size as u64, |acc, &d| acc.checked_mul(d))
}

/// Length of an in-memory buffer for `dims` elements, bounded by
/// `MAX_TRANSFER_BYTES`.
pub(crate) fn transfer_len(dims: &[u64], elem_size: usize) -> Result<usize> {
    checked_byte_len(dims, elem_size)
        .filter(|&n| n <= MAX_TRANSFER_BYTES)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            H5Error::InvalidArgument(format!(
                "buffer for {:?} elements of {} bytes exceeds {} bytes",
                dims, elem_size, MAX_TRANSFER_BYTES
            ))
            .into()
        })
}
