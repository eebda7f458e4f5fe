//! # On-Disk Header Definitions
//!
//! Two fixed headers frame everything h5lite stores: the superblock at the
//! base address and the header of the metadata block it points to.
//!
//! ## File Layout
//!
//! ```text
//! absolute 0        +----------------------+
//!                   | Userblock (optional) |  userblock_size zero bytes
//! base address      +----------------------+
//! relative 0        | Superblock (128B)    |  CRC-64 over bytes 0..120
//!                   +----------------------+
//! relative 128..    | Chunks, metadata     |  allocated out of EOA and the
//!                   | blocks, free ranges  |  free-space manager
//! relative EOA      +----------------------+
//! ```
//!
//! ## Superblock Layout
//!
//! ```text
//! Offset  Size  Field
//! 0       8     signature \x89H5L\r\n\x1a\n
//! 8       4     format version
//! 12      4     flags (bit 0 = SWMR writer active)
//! 16      8     userblock size
//! 24      1     offset size
//! 25      1     length size
//! 26      2     symbol-table leaf K
//! 28      2     symbol-table internal K
//! 30      2     reserved
//! 32      8     end of allocated space (EOA)
//! 40      8     metadata block address
//! 48      8     metadata block allocated size
//! 56      8     flush generation
//! 64      56    reserved
//! 120     8     CRC-64/ECMA-182 of bytes 0..120
//! ```
//!
//! ## Metadata Block Layout
//!
//! ```text
//! +--------------------+----------------+----------+-----------+
//! | MetaBlockHeader 28 | payload (len)  | CRC-64 8 | zero pad  |
//! +--------------------+----------------+----------+-----------+
//! ```
//!
//! The CRC covers header and payload. A reader that finds a mismatch has
//! raced a writer and retries.
//!
//! ## Endianness
//!
//! All multi-byte fields are little-endian zerocopy wrappers; accessors are
//! generated by `le_accessors!`.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    FLAG_SWMR_WRITE, FORMAT_VERSION, METADATA_HEADER_SIZE, METADATA_MAGIC, METADATA_TRAILER_SIZE,
    SIGNATURE, SUPERBLOCK_CHECKSUM_OFFSET, SUPERBLOCK_SIZE,
};
use crate::error::H5Error;
use crate::le_accessors;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

pub fn checksum(bytes: &[u8]) -> u64 {
    CRC64.checksum(bytes)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Superblock {
    signature: [u8; 8],
    version: U32,
    flags: U32,
    userblock_size: U64,
    offset_size: u8,
    length_size: u8,
    sym_leaf_k: U16,
    sym_internal_k: U16,
    reserved0: [u8; 2],
    eoa: U64,
    metadata_addr: U64,
    metadata_size: U64,
    generation: U64,
    reserved1: [u8; 56],
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<Superblock>() == SUPERBLOCK_SIZE);

impl Superblock {
    pub fn new(
        userblock_size: u64,
        offset_size: u8,
        length_size: u8,
        sym_leaf_k: u16,
        sym_internal_k: u16,
    ) -> Self {
        Self {
            signature: SIGNATURE,
            version: U32::new(FORMAT_VERSION),
            flags: U32::new(0),
            userblock_size: U64::new(userblock_size),
            offset_size,
            length_size,
            sym_leaf_k: U16::new(sym_leaf_k),
            sym_internal_k: U16::new(sym_internal_k),
            reserved0: [0; 2],
            eoa: U64::new(0),
            metadata_addr: U64::new(0),
            metadata_size: U64::new(0),
            generation: U64::new(0),
            reserved1: [0; 56],
            checksum: U64::new(0),
        }
    }

    /// Parses and validates a superblock. Signature, version and checksum
    /// failures are all reported as `Corrupt`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= SUPERBLOCK_SIZE,
            H5Error::Corrupt(format!(
                "superblock truncated: {} < {} bytes",
                bytes.len(),
                SUPERBLOCK_SIZE
            ))
        );
        let raw = &bytes[..SUPERBLOCK_SIZE];
        let sb = Self::read_from_bytes(raw)
            .map_err(|e| H5Error::Corrupt(format!("failed to parse superblock: {:?}", e)))?;

        ensure!(
            sb.signature == SIGNATURE,
            H5Error::Corrupt("bad superblock signature".to_string())
        );
        ensure!(
            sb.version() == FORMAT_VERSION,
            H5Error::Corrupt(format!(
                "unsupported format version {} (expected {})",
                sb.version(),
                FORMAT_VERSION
            ))
        );
        let expected = checksum(&raw[..SUPERBLOCK_CHECKSUM_OFFSET]);
        ensure!(
            sb.checksum() == expected,
            H5Error::Corrupt(format!(
                "superblock checksum mismatch: stored {:#018x}, computed {:#018x}",
                sb.checksum(),
                expected
            ))
        );
        Ok(sb)
    }

    /// Serializes with a freshly computed checksum.
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut sealed = *self;
        let sum = checksum(&self.as_bytes()[..SUPERBLOCK_CHECKSUM_OFFSET]);
        sealed.checksum = U64::new(sum);
        let mut out = [0u8; SUPERBLOCK_SIZE];
        out.copy_from_slice(sealed.as_bytes());
        out
    }

    le_accessors! {
        version: u32,
        flags: u32,
        userblock_size: u64,
        sym_leaf_k: u16,
        sym_internal_k: u16,
        eoa: u64,
        metadata_addr: u64,
        metadata_size: u64,
        generation: u64,
        checksum: u64,
    }

    pub fn offset_size(&self) -> u8 {
        self.offset_size
    }

    pub fn length_size(&self) -> u8 {
        self.length_size
    }

    pub fn swmr_write(&self) -> bool {
        self.flags() & FLAG_SWMR_WRITE != 0
    }

    pub fn set_swmr_write(&mut self, on: bool) {
        let flags = if on {
            self.flags() | FLAG_SWMR_WRITE
        } else {
            self.flags() & !FLAG_SWMR_WRITE
        };
        self.set_flags(flags);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct MetaBlockHeader {
    magic: [u8; 8],
    version: U32,
    payload_len: U64,
    generation: U64,
}

const _: () = assert!(std::mem::size_of::<MetaBlockHeader>() == METADATA_HEADER_SIZE);

impl MetaBlockHeader {
    pub fn new(payload_len: u64, generation: u64) -> Self {
        Self {
            magic: METADATA_MAGIC,
            version: U32::new(FORMAT_VERSION),
            payload_len: U64::new(payload_len),
            generation: U64::new(generation),
        }
    }

    le_accessors! {
        version: u32,
        payload_len: u64,
        generation: u64,
    }
}

/// Bytes a metadata block with a payload of `payload_len` occupies before
/// padding.
pub fn metadata_block_len(payload_len: usize) -> usize {
    METADATA_HEADER_SIZE + payload_len + METADATA_TRAILER_SIZE
}

/// Frames `payload` as a metadata block, zero-padded to `allocated` bytes.
pub fn encode_metadata_block(payload: &[u8], generation: u64, allocated: usize) -> Result<Vec<u8>> {
    let used = metadata_block_len(payload.len());
    ensure!(
        used <= allocated,
        "metadata block needs {} bytes but only {} were allocated",
        used,
        allocated
    );

    let header = MetaBlockHeader::new(payload.len() as u64, generation);
    let mut out = Vec::with_capacity(allocated);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    let sum = checksum(&out);
    out.extend_from_slice(&sum.to_le_bytes());
    out.resize(allocated, 0);
    Ok(out)
}

/// Validates a metadata block and returns its generation and payload.
pub fn decode_metadata_block(bytes: &[u8]) -> Result<(u64, &[u8])> {
    ensure!(
        bytes.len() >= METADATA_HEADER_SIZE + METADATA_TRAILER_SIZE,
        H5Error::Corrupt(format!("metadata block truncated: {} bytes", bytes.len()))
    );
    let header = MetaBlockHeader::read_from_bytes(&bytes[..METADATA_HEADER_SIZE])
        .map_err(|e| H5Error::Corrupt(format!("failed to parse metadata header: {:?}", e)))?;
    ensure!(
        header.magic == METADATA_MAGIC,
        H5Error::Corrupt("bad metadata block magic".to_string())
    );
    ensure!(
        header.version() == FORMAT_VERSION,
        H5Error::Corrupt(format!("unsupported metadata version {}", header.version()))
    );

    let payload_len = usize::try_from(header.payload_len())
        .map_err(|_| H5Error::Corrupt("metadata payload length overflows".to_string()))?;
    let end = METADATA_HEADER_SIZE
        .checked_add(payload_len)
        .filter(|&end| end + METADATA_TRAILER_SIZE <= bytes.len())
        .ok_or_else(|| {
            H5Error::Corrupt(format!(
                "metadata payload of {} bytes exceeds block of {} bytes",
                payload_len,
                bytes.len()
            ))
        })?;

    let mut stored = [0u8; 8];
    stored.copy_from_slice(&bytes[end..end + METADATA_TRAILER_SIZE]);
    let stored = u64::from_le_bytes(stored);
    let computed = checksum(&bytes[..end]);
    ensure!(
        stored == computed,
        H5Error::Corrupt(format!(
            "metadata checksum mismatch: stored {:#018x}, computed {:#018x}",
            stored, computed
        ))
    );

    Ok((header.generation(), &bytes[METADATA_HEADER_SIZE..end]))
}
