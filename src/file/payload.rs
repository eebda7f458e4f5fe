//! # Metadata Payload
//!
//! The body of a metadata block. Writers build it from their `FileSpace` and
//! `Catalog`; SWMR readers decode the same bytes without any write state.
//!
//! ```text
//! u32 n  + n * (offset u64, len u64)                          raw free list
//! u32 n  + n * (offset u64, len u64)                          meta free list
//! u32 n  + n * (pool u8, offset u64, len u64, release u64)    deferred frees
//! catalog
//! ```

use eyre::Result;

use super::catalog::Catalog;
use super::space::{DeferredFree, FileSpace, Pool};
use crate::config::{DEFERRED_ENTRY_ENCODED_SIZE, FREE_ENTRY_ENCODED_SIZE};
use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;
use crate::storage::FreeRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPayload {
    pub raw_free: Vec<FreeRange>,
    pub meta_free: Vec<FreeRange>,
    pub deferred: Vec<DeferredFree>,
    pub catalog: Catalog,
}

fn put_ranges<I: Iterator<Item = FreeRange>>(w: &mut MetaWriter, n: usize, ranges: I) {
    w.put_u32(n as u32);
    for r in ranges {
        w.put_u64(r.offset);
        w.put_u64(r.len);
    }
}

fn get_ranges(r: &mut MetaReader<'_>, what: &str) -> Result<Vec<FreeRange>> {
    let n = r.count(what, FREE_ENTRY_ENCODED_SIZE)?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let offset = r.u64("free range offset")?;
        let len = r.u64("free range length")?;
        out.push(FreeRange { offset, len });
    }
    Ok(out)
}

/// Encodes the live state of a writer without cloning the catalog.
pub fn encode_payload(space: &FileSpace, catalog: &Catalog) -> Vec<u8> {
    let mut w = MetaWriter::new();
    let raw = space.pool(Pool::Raw);
    put_ranges(&mut w, raw.entry_count(), raw.entries());
    let meta = space.pool(Pool::Meta);
    put_ranges(&mut w, meta.entry_count(), meta.entries());
    encode_deferred(&mut w, space.deferred());
    catalog.encode(&mut w);
    w.into_inner()
}

fn encode_deferred(w: &mut MetaWriter, deferred: &[DeferredFree]) {
    w.put_u32(deferred.len() as u32);
    for d in deferred {
        w.put_u8(d.pool.tag());
        w.put_u64(d.offset);
        w.put_u64(d.len);
        w.put_u64(d.release_at);
    }
}

impl MetadataPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = MetaWriter::new();
        put_ranges(&mut w, self.raw_free.len(), self.raw_free.iter().copied());
        put_ranges(&mut w, self.meta_free.len(), self.meta_free.iter().copied());
        encode_deferred(&mut w, &self.deferred);
        self.catalog.encode(&mut w);
        w.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = MetaReader::new(bytes);
        let raw_free = get_ranges(&mut r, "raw free list")?;
        let meta_free = get_ranges(&mut r, "metadata free list")?;

        let n = r.count("deferred list", DEFERRED_ENTRY_ENCODED_SIZE)?;
        let mut deferred = Vec::with_capacity(n);
        for _ in 0..n {
            deferred.push(DeferredFree {
                pool: Pool::from_tag(r.u8("deferred pool")?)?,
                offset: r.u64("deferred offset")?,
                len: r.u64("deferred length")?,
                release_at: r.u64("deferred generation")?,
            });
        }

        let catalog = Catalog::decode(&mut r)?;
        if r.remaining() != 0 {
            return Err(H5Error::Corrupt(format!(
                "{} trailing bytes after metadata payload",
                r.remaining()
            ))
            .into());
        }
        Ok(Self {
            raw_free,
            meta_free,
            deferred,
            catalog,
        })
    }
}
