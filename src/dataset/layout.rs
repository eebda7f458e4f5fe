//! # Storage Layout and Allocation Time
//!
//! `DatasetCreateProps` carries the two creation-time choices that decide how
//! a dataset's bytes are placed in the file:
//!
//! | Layout     | Chunk shape               | Extent changes |
//! |------------|---------------------------|----------------|
//! | Contiguous | the whole extent, 1 chunk | never          |
//! | Chunked    | caller-chosen             | up to maxima   |
//!
//! | AllocTime   | Storage appears                                      |
//! |-------------|------------------------------------------------------|
//! | Early       | at creation, for the maximum (or current if unlimited)|
//! | Late        | at the first write, for the whole current extent     |
//! | Incremental | per chunk, at the first write touching it            |
//! | Default     | Late for contiguous, Incremental for chunked         |

use eyre::Result;

use super::dataspace::{checked_byte_len, Dataspace, Dims};
use crate::config::MAX_CHUNK_BYTES;
use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocTime {
    #[default]
    Default,
    Early,
    Late,
    Incremental,
}

impl AllocTime {
    fn tag(self) -> u8 {
        match self {
            AllocTime::Default => 0,
            AllocTime::Early => 1,
            AllocTime::Late => 2,
            AllocTime::Incremental => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(AllocTime::Default),
            1 => Ok(AllocTime::Early),
            2 => Ok(AllocTime::Late),
            3 => Ok(AllocTime::Incremental),
            other => Err(H5Error::Corrupt(format!("unknown allocation time {}", other)).into()),
        }
    }

    pub(crate) fn encode(self, w: &mut MetaWriter) {
        w.put_u8(self.tag());
    }

    pub(crate) fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        Self::from_tag(r.u8("allocation time")?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Contiguous,
    Chunked(Dims),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetCreateProps {
    layout: Layout,
    alloc_time: AllocTime,
}

impl DatasetCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunked(mut self, chunk_dims: &[u64]) -> Self {
        self.layout = Layout::Chunked(Dims::from_slice(chunk_dims));
        self
    }

    pub fn contiguous(mut self) -> Self {
        self.layout = Layout::Contiguous;
        self
    }

    pub fn alloc_time(mut self, alloc_time: AllocTime) -> Self {
        self.alloc_time = alloc_time;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn requested_alloc_time(&self) -> AllocTime {
        self.alloc_time
    }

    /// The concrete allocation time after resolving `Default` for the layout.
    pub fn resolved_alloc_time(&self) -> AllocTime {
        match (self.alloc_time, &self.layout) {
            (AllocTime::Default, Layout::Contiguous) => AllocTime::Late,
            (AllocTime::Default, Layout::Chunked(_)) => AllocTime::Incremental,
            (t, _) => t,
        }
    }

    /// Validates the layout against a dataspace and element size and returns
    /// the chunk shape the dataset will be stored with.
    pub fn chunk_shape_for(&self, space: &Dataspace, element_size: usize) -> Result<Dims> {
        let chunk = self.raw_chunk_shape(space)?;
        check_chunk_bytes(&chunk, element_size).map_err(|e| {
            H5Error::InvalidArgument(format!("{:?} chunk: {}", chunk.as_slice(), e))
        })?;
        Ok(chunk)
    }

    fn raw_chunk_shape(&self, space: &Dataspace) -> Result<Dims> {
        match &self.layout {
            Layout::Contiguous => {
                if space.is_extendable() {
                    return Err(H5Error::InvalidArgument(
                        "extendable dataspaces require a chunked layout".to_string(),
                    )
                    .into());
                }
                Ok(Dims::from_slice(space.dims()))
            }
            Layout::Chunked(chunk) => {
                if space.is_scalar() {
                    return Err(H5Error::InvalidArgument(
                        "scalar datasets cannot be chunked".to_string(),
                    )
                    .into());
                }
                if chunk.len() != space.rank() {
                    return Err(H5Error::RankMismatch {
                        expected: space.rank(),
                        actual: chunk.len(),
                    }
                    .into());
                }
                if chunk.iter().any(|&c| c == 0) {
                    return Err(H5Error::InvalidArgument(
                        "chunk dimensions must be positive".to_string(),
                    )
                    .into());
                }
                Ok(chunk.clone())
            }
        }
    }
}

/// Byte size of one chunk, which must not exceed `MAX_CHUNK_BYTES`.
pub(crate) fn check_chunk_bytes(chunk: &[u64], element_size: usize) -> Result<u64, String> {
    match checked_byte_len(chunk, element_size) {
        Some(n) if n <= MAX_CHUNK_BYTES => Ok(n),
        _ => Err(format!("chunk size exceeds {} bytes", MAX_CHUNK_BYTES)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn default_alloc_time_depends_on_layout() {
        let contiguous = DatasetCreateProps::new();
        let chunked = DatasetCreateProps::new().chunked(&[10]);

        assert_eq!(contiguous.resolved_alloc_time(), AllocTime::Late);
        assert_eq!(chunked.resolved_alloc_time(), AllocTime::Incremental);
    }

    #[test]
    fn explicit_alloc_time_is_kept() {
        let dcpl = DatasetCreateProps::new().alloc_time(AllocTime::Early);

        assert_eq!(dcpl.resolved_alloc_time(), AllocTime::Early);
    }

    #[test]
    fn contiguous_rejects_extendable_space() {
        let space = Dataspace::extendable(&[10], &[None]).unwrap();

        let err = DatasetCreateProps::new().chunk_shape_for(&space, 4).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    }

    #[test]
    fn contiguous_chunk_is_whole_extent() {
        let space = Dataspace::simple(&[4, 6]).unwrap();

        let chunk = DatasetCreateProps::new().chunk_shape_for(&space, 4).unwrap();

        assert_eq!(chunk.as_slice(), &[4, 6]);
    }

    #[test]
    fn chunked_rejects_wrong_rank_and_zero_dims() {
        let space = Dataspace::extendable(&[10, 10], &[None, None]).unwrap();

        let rank = DatasetCreateProps::new().chunked(&[5]).chunk_shape_for(&space, 4);
        let zero = DatasetCreateProps::new().chunked(&[5, 0]).chunk_shape_for(&space, 4);

        assert_eq!(error_kind(&rank.unwrap_err()), ErrorKind::RankMismatch);
        assert_eq!(error_kind(&zero.unwrap_err()), ErrorKind::InvalidArgument);
    }

    #[test]
    fn oversized_chunks_are_rejected() {
        let space = Dataspace::extendable(&[0], &[None]).unwrap();

        let overflow = DatasetCreateProps::new().chunked(&[1 << 62]).chunk_shape_for(&space, 4);
        let too_big = DatasetCreateProps::new().chunked(&[1 << 31]).chunk_shape_for(&space, 4);
        let fits = DatasetCreateProps::new().chunked(&[1 << 20]).chunk_shape_for(&space, 4);

        assert_eq!(error_kind(&overflow.unwrap_err()), ErrorKind::InvalidArgument);
        assert_eq!(error_kind(&too_big.unwrap_err()), ErrorKind::InvalidArgument);
        assert_eq!(fits.unwrap().as_slice(), &[1 << 20]);
    }

    #[test]
    fn contiguous_extent_is_bounded_by_chunk_limit() {
        let space = Dataspace::simple(&[1 << 20, 1 << 20]).unwrap();

        let err = DatasetCreateProps::new().chunk_shape_for(&space, 1).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    }
}
