//! Deterministic element patterns written by the extension driver.
//!
//! Values are stored into every leaf of an element: integers truncated to
//! their width in two's complement, floats converted.

use eyre::Result;

use crate::dataset::dataspace::transfer_len;
use crate::dataset::Datatype;

/// Writes `value` into every leaf of one element.
fn store(dt: &Datatype, value: i64, out: &mut [u8]) {
    match dt {
        Datatype::Integer { size, .. } => {
            let bytes = value.to_le_bytes();
            let n = (*size).min(bytes.len());
            out[..n].copy_from_slice(&bytes[..n]);
        }
        Datatype::Float { size: 4 } => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
        Datatype::Float { .. } => out[..8].copy_from_slice(&(value as f64).to_le_bytes()),
        Datatype::Compound { fields, .. } => {
            for f in fields {
                let end = f.offset + f.datatype.size();
                store(&f.datatype, value, &mut out[f.offset..end]);
            }
        }
    }
}

/// Element `i` of a run: an integer holds `i`; a compound's k-th top-level
/// field (1-based) holds `i + k` in every leaf.
fn store_indexed(dt: &Datatype, i: i64, out: &mut [u8]) {
    match dt {
        Datatype::Compound { fields, .. } => {
            for (k, f) in fields.iter().enumerate() {
                let end = f.offset + f.datatype.size();
                store(&f.datatype, i + k as i64 + 1, &mut out[f.offset..end]);
            }
        }
        _ => store(dt, i, out),
    }
}

/// `count` elements numbered from zero.
pub fn indexed_fill(dt: &Datatype, count: u64) -> Result<Vec<u8>> {
    let size = dt.size();
    let mut buf = vec![0u8; transfer_len(&[count], size)?];
    for (i, elem) in buf.chunks_exact_mut(size).enumerate() {
        store_indexed(dt, i as i64, elem);
    }
    Ok(buf)
}

/// `count` elements with every leaf set to `value`.
pub fn pattern_fill(dt: &Datatype, count: u64, value: i64) -> Result<Vec<u8>> {
    let size = dt.size();
    let mut buf = vec![0u8; transfer_len(&[count], size)?];
    for elem in buf.chunks_exact_mut(size) {
        store(dt, value, elem);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fixtures::set_type;
    use crate::error::{error_kind, ErrorKind};

    fn u32_at(buf: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
    }

    #[test]
    fn indexed_compound_offsets_fields() {
        let dt = set_type().unwrap();

        let buf = indexed_fill(&dt, 3).unwrap();

        let e2 = &buf[80..120];
        assert_eq!(u32_at(e2, 0), 3);
        assert_eq!(u32_at(e2, 4), 4);
        assert_eq!(u32_at(e2, 12), 4);
        assert_eq!(u32_at(e2, 20), 4);
        assert_eq!(f64::from_le_bytes(e2[24..32].try_into().unwrap()), 5.0);
        assert_eq!(u32_at(e2, 36), 6);
    }

    #[test]
    fn pattern_fill_negative_integer() {
        let buf = pattern_fill(&Datatype::i32(), 2, -3).unwrap();

        assert_eq!(buf, [(-3i32).to_le_bytes(), (-3i32).to_le_bytes()].concat());
    }

    #[test]
    fn oversized_fill_is_refused() {
        let err = indexed_fill(&Datatype::i32(), 1 << 40).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);

        let err = pattern_fill(&Datatype::u64(), u64::MAX, 1).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    }
}
