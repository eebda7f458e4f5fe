//! # Hyperslab Selections
//!
//! A selection is a single rectangular block: a start offset and a count per
//! axis. Buffers exchanged with datasets hold exactly the selected elements in
//! row-major order.
//!
//! `copy_block` moves a rectangular block between two row-major arrays of
//! different shapes one contiguous row (last axis) at a time:
//!
//! ```text
//! src (shape 4x6)            dst (shape 2x3 chunk)
//! . . . . . .                x x x
//! . . x x x .    ──────►     x x x
//! . . x x x .
//! . . . . . .
//! ```

use eyre::Result;
use smallvec::SmallVec;

use super::dataspace::Dims;
use crate::error::H5Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperslab {
    offset: Dims,
    count: Dims,
}

impl Hyperslab {
    pub fn new(offset: &[u64], count: &[u64]) -> Result<Self> {
        if offset.len() != count.len() {
            return Err(H5Error::RankMismatch {
                expected: offset.len(),
                actual: count.len(),
            }
            .into());
        }
        Ok(Self {
            offset: SmallVec::from_slice(offset),
            count: SmallVec::from_slice(count),
        })
    }

    /// Selects every element of an array with the given dimensions.
    pub fn all(dims: &[u64]) -> Self {
        Self {
            offset: SmallVec::from_elem(0, dims.len()),
            count: SmallVec::from_slice(dims),
        }
    }

    pub fn offset(&self) -> &[u64] {
        &self.offset
    }

    pub fn count(&self) -> &[u64] {
        &self.count
    }

    pub fn rank(&self) -> usize {
        self.offset.len()
    }

    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.count.iter().any(|&c| c == 0)
    }

    /// Checks rank and that the block lies inside `dims`.
    pub fn validate(&self, dims: &[u64]) -> Result<()> {
        if self.rank() != dims.len() {
            return Err(H5Error::RankMismatch {
                expected: dims.len(),
                actual: self.rank(),
            }
            .into());
        }
        for (axis, ((&o, &c), &d)) in self.offset.iter().zip(&self.count).zip(dims).enumerate() {
            match o.checked_add(c) {
                Some(end) if end <= d => {}
                _ => return Err(H5Error::SelectionOutOfBounds { axis }.into()),
            }
        }
        Ok(())
    }

    /// Intersection with the block `[start, start + extent)`, if any.
    pub fn intersect(&self, start: &[u64], extent: &[u64]) -> Option<Hyperslab> {
        let mut offset = Dims::new();
        let mut count = Dims::new();
        for axis in 0..self.rank() {
            let lo = self.offset[axis].max(start[axis]);
            let hi = (self.offset[axis] + self.count[axis]).min(start[axis] + extent[axis]);
            if lo >= hi {
                return None;
            }
            offset.push(lo);
            count.push(hi - lo);
        }
        Some(Hyperslab { offset, count })
    }
}

/// Row-major element strides for `shape`.
pub fn strides(shape: &[u64]) -> Dims {
    let mut out: Dims = SmallVec::from_elem(1, shape.len());
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        out[axis] = out[axis + 1] * shape[axis + 1];
    }
    out
}

fn linear(strides: &[u64], start: &[u64], idx: &[u64]) -> u64 {
    strides
        .iter()
        .zip(start)
        .zip(idx)
        .map(|((&s, &b), &i)| s * (b + i))
        .sum()
}

/// Copies a `count`-shaped block located at `src_start` in a `src_shape`
/// array to `dst_start` in a `dst_shape` array. Both arrays are row-major
/// with `elem` bytes per element. Rank 0 copies a single element.
#[allow(clippy::too_many_arguments)]
pub fn copy_block(
    src: &[u8],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    count: &[u64],
    elem: usize,
) {
    let rank = count.len();
    if rank == 0 {
        dst[..elem].copy_from_slice(&src[..elem]);
        return;
    }
    if count.iter().any(|&c| c == 0) {
        return;
    }

    let src_strides = strides(src_shape);
    let dst_strides = strides(dst_shape);
    let row_bytes = count[rank - 1] as usize * elem;
    let mut idx: Dims = SmallVec::from_elem(0, rank);

    loop {
        let s = linear(&src_strides, src_start, &idx) as usize * elem;
        let d = linear(&dst_strides, dst_start, &idx) as usize * elem;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);

        // odometer over every axis except the last
        let mut axis = rank - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < count[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

/// Calls `f` with the coordinate of every element of a `shape` array, in
/// row-major order.
pub fn for_each_coord<F: FnMut(&[u64])>(shape: &[u64], mut f: F) {
    if shape.iter().any(|&d| d == 0) {
        return;
    }
    let rank = shape.len();
    let mut idx: Dims = SmallVec::from_elem(0, rank);
    loop {
        f(&idx);
        let mut axis = rank;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < shape[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn validate_rejects_blocks_past_extent() {
        let sel = Hyperslab::new(&[8], &[3]).unwrap();

        let err = sel.validate(&[10]).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::SelectionOutOfBounds);
    }

    #[test]
    fn validate_rejects_rank_mismatch() {
        let sel = Hyperslab::new(&[0, 0], &[1, 1]).unwrap();

        let err = sel.validate(&[10]).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::RankMismatch);
    }

    #[test]
    fn intersect_clips_to_block() {
        let sel = Hyperslab::new(&[3, 1], &[4, 4]).unwrap();

        let part = sel.intersect(&[4, 0], &[4, 3]).unwrap();

        assert_eq!(part.offset(), &[4, 1]);
        assert_eq!(part.count(), &[3, 2]);
        assert!(sel.intersect(&[0, 8], &[4, 4]).is_none());
    }

    #[test]
    fn strides_are_row_major() {
        assert_eq!(strides(&[4, 6, 5]).as_slice(), &[30, 5, 1]);
        assert!(strides(&[]).is_empty());
    }

    #[test]
    fn copy_block_moves_interior_rectangle() {
        let src: Vec<u8> = (0..24).collect();
        let mut dst = vec![0u8; 6];

        copy_block(&src, &[4, 6], &[1, 2], &mut dst, &[2, 3], &[0, 0], &[2, 3], 1);

        assert_eq!(dst, vec![8, 9, 10, 14, 15, 16]);
    }

    #[test]
    fn copy_block_handles_multibyte_elements_and_rank_zero() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];

        copy_block(&src, &[], &[], &mut dst, &[], &[], &[], 4);

        assert_eq!(dst, src);
    }

    #[test]
    fn for_each_coord_visits_in_row_major_order() {
        let mut seen = Vec::new();

        for_each_coord(&[2, 2], |c| seen.push(c.to_vec()));

        assert_eq!(seen, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn for_each_coord_visits_scalar_once() {
        let mut n = 0;

        for_each_coord(&[], |_| n += 1);

        assert_eq!(n, 1);
    }
}
