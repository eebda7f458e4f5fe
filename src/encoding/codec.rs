//! # Metadata Codec
//!
//! Fixed-width little-endian encoding for the metadata block payload. Every
//! integer is written at its natural width; variable-size items (names,
//! attribute values, dimension lists) are prefixed with a `u32` count.
//!
//! ```text
//! u8      1 byte
//! u16     2 bytes LE
//! u32     4 bytes LE
//! u64     8 bytes LE
//! bytes   u32 length + raw bytes
//! str     u32 length + UTF-8 bytes
//! ```
//!
//! The reader never panics on short or malformed input; every accessor
//! returns a `Corrupt` error naming what was being decoded.

use eyre::Result;

use crate::error::H5Error;

#[derive(Debug, Default)]
pub struct MetaWriter {
    buf: Vec<u8>,
}

impl MetaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(v as u8);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct MetaReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MetaReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(H5Error::Corrupt(format!(
                "truncated {} at byte {}: need {}, have {}",
                what,
                self.pos,
                n,
                self.remaining()
            ))
            .into());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    pub fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    pub fn bool(&mut self, what: &str) -> Result<bool> {
        match self.u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(H5Error::Corrupt(format!("invalid {} flag {}", what, other)).into()),
        }
    }

    pub fn bytes(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.u32(what)? as usize;
        self.take(len, what)
    }

    pub fn str(&mut self, what: &str) -> Result<String> {
        let raw = self.bytes(what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| H5Error::Corrupt(format!("{} is not valid UTF-8", what)).into())
    }

    /// Reads a `u32` element count and rejects counts that could not possibly
    /// fit in the remaining input, given each element is at least
    /// `min_elem_size` bytes.
    pub fn count(&mut self, what: &str, min_elem_size: usize) -> Result<usize> {
        let n = self.u32(what)? as usize;
        if n.saturating_mul(min_elem_size.max(1)) > self.remaining() {
            return Err(H5Error::Corrupt(format!(
                "{} count {} exceeds remaining {} bytes",
                what,
                n,
                self.remaining()
            ))
            .into());
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn writer_emits_little_endian_fixed_width() {
        let mut w = MetaWriter::new();
        w.put_u16(0x0102);
        w.put_u32(0x03040506);
        w.put_str("ab");

        assert_eq!(
            w.as_slice(),
            &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 2, 0, 0, 0, b'a', b'b']
        );
    }

    #[test]
    fn reader_decodes_what_writer_wrote() {
        let mut w = MetaWriter::new();
        w.put_u8(7);
        w.put_u64(u64::MAX - 1);
        w.put_bool(true);
        w.put_str("/group/dset");
        let bytes = w.into_inner();

        let mut r = MetaReader::new(&bytes);
        assert_eq!(r.u8("tag").unwrap(), 7);
        assert_eq!(r.u64("addr").unwrap(), u64::MAX - 1);
        assert!(r.bool("flag").unwrap());
        assert_eq!(r.str("name").unwrap(), "/group/dset");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn reader_reports_truncation_as_corrupt() {
        let bytes = [1u8, 2, 3];
        let mut r = MetaReader::new(&bytes);

        let err = r.u64("eoa").unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::Corrupt);
        assert!(err.to_string().contains("eoa"));
    }

    #[test]
    fn reader_rejects_oversized_counts() {
        let mut w = MetaWriter::new();
        w.put_u32(1_000_000);
        let bytes = w.into_inner();
        let mut r = MetaReader::new(&bytes);

        assert!(r.count("entries", 16).is_err());
    }

    #[test]
    fn reader_rejects_invalid_bool() {
        let bytes = [2u8];
        let mut r = MetaReader::new(&bytes);

        assert!(r.bool("signed").is_err());
    }
}
