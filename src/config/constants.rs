//! # h5lite Configuration Constants
//!
//! This module centralizes the numeric and byte-level constants of the file
//! format together with the policy knobs of the handle registry and the SWMR
//! machinery. Constants that depend on each other are co-located and checked
//! with compile-time assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! SUPERBLOCK_SIZE (128 bytes)
//!       │
//!       ├─> SUPERBLOCK_CHECKSUM_OFFSET (SUPERBLOCK_SIZE - 8)
//!       │     CRC-64 covers every byte before this offset
//!       │
//!       └─> INITIAL_EOA (== SUPERBLOCK_SIZE)
//!             The first allocation lands right after the superblock
//!
//! METADATA_HEADER_SIZE (28 bytes) + METADATA_TRAILER_SIZE (8 bytes)
//!       │
//!       └─> METADATA_SLACK (one deferred-free entry)
//!             A flush may add one free entry between sizing and encoding
//!
//! SWMR_FREE_DELAY_FLUSHES (2)
//!       │
//!       └─> Released ranges become allocatable after this many flushes
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use crate::config::{SUPERBLOCK_SIZE, SIGNATURE};
//! ```

// ============================================================================
// SUPERBLOCK LAYOUT
// ============================================================================

/// File signature written at the base address. Mirrors the HDF5 signature
/// shape: a non-ASCII lead byte, a format tag, then CR LF, EOF and LF bytes
/// that catch text-mode transfer damage.
pub const SIGNATURE: [u8; 8] = *b"\x89H5L\r\n\x1a\n";

pub const FORMAT_VERSION: u32 = 1;

pub const SUPERBLOCK_SIZE: usize = 128;

pub const SUPERBLOCK_CHECKSUM_OFFSET: usize = SUPERBLOCK_SIZE - 8;

/// End of allocated space for a freshly created file, relative to the base
/// address.
pub const INITIAL_EOA: u64 = SUPERBLOCK_SIZE as u64;

/// Superblock flag: a writer currently holds the file open in SWMR mode.
pub const FLAG_SWMR_WRITE: u32 = 0x1;

const _: () = assert!(SUPERBLOCK_CHECKSUM_OFFSET + 8 == SUPERBLOCK_SIZE);

// ============================================================================
// METADATA BLOCK LAYOUT
// ============================================================================

pub const METADATA_MAGIC: [u8; 8] = *b"H5LMETA\0";

/// magic (8) + version (4) + payload length (8) + generation (8)
pub const METADATA_HEADER_SIZE: usize = 28;

/// Trailing CRC-64.
pub const METADATA_TRAILER_SIZE: usize = 8;

/// Encoded size of one free-space entry (offset + length).
pub const FREE_ENTRY_ENCODED_SIZE: usize = 16;

/// Encoded size of one deferred SWMR free: pool (1) + offset (8) + length (8)
/// + release generation (8).
pub const DEFERRED_ENTRY_ENCODED_SIZE: usize = 25;

/// Extra bytes reserved when sizing a new metadata block. Between sizing the
/// block and encoding it, releasing the previous block adds at most one entry
/// to either a free list or the deferred list.
pub const METADATA_SLACK: usize = DEFERRED_ENTRY_ENCODED_SIZE;

const _: () = assert!(METADATA_HEADER_SIZE == 8 + 4 + 8 + 8);
const _: () = assert!(METADATA_SLACK >= FREE_ENTRY_ENCODED_SIZE);

// ============================================================================
// FILE CREATION DEFAULTS
// ============================================================================

pub const DEFAULT_USERBLOCK_SIZE: u64 = 0;
pub const DEFAULT_OFFSET_SIZE: u8 = 8;
pub const DEFAULT_LENGTH_SIZE: u8 = 8;
pub const DEFAULT_SYM_LEAF_K: u16 = 4;
pub const DEFAULT_SYM_INTERNAL_K: u16 = 16;

/// A non-zero userblock must be a power of two of at least this size.
pub const MIN_USERBLOCK_SIZE: u64 = 512;

/// Accepted encodings for addresses and lengths.
pub const VALID_ADDRESS_SIZES: [u8; 5] = [2, 4, 8, 16, 32];

// ============================================================================
// DATASET LIMITS
// ============================================================================

/// Largest supported dataspace rank.
pub const MAX_RANK: usize = 32;

/// Dimension sentinel stored on disk for an unlimited axis.
pub const UNLIMITED_ENCODED: u64 = u64::MAX;

/// Largest chunk in bytes. A contiguous dataset is stored as one chunk, so
/// this also bounds its total size.
pub const MAX_CHUNK_BYTES: u64 = u32::MAX as u64;

/// Largest buffer a single read, attribute value or generated fill may
/// occupy.
pub const MAX_TRANSFER_BYTES: u64 = 1 << 32;

const _: () = assert!(MAX_CHUNK_BYTES <= MAX_TRANSFER_BYTES);

// ============================================================================
// SWMR
// ============================================================================

/// Number of flushes a released range waits in the deferred list while the
/// file is open for SWMR writing.
pub const SWMR_FREE_DELAY_FLUSHES: u64 = 2;

/// Attempts a SWMR reader makes to obtain a checksum-consistent snapshot.
pub const SWMR_READ_RETRIES: u32 = 20;

/// Pause between SWMR reader retries.
pub const SWMR_RETRY_DELAY_MS: u64 = 5;

const _: () = assert!(SWMR_FREE_DELAY_FLUSHES >= 1);
const _: () = assert!(SWMR_READ_RETRIES >= 1);

// ============================================================================
// RENDEZVOUS
// ============================================================================

/// Poll interval for message-file rendezvous.
pub const MESSAGE_POLL_INTERVAL_MS: u64 = 20;

/// How long `wait_message` waits before failing.
pub const MESSAGE_TIMEOUT_MS: u64 = 60_000;

const _: () = assert!(MESSAGE_POLL_INTERVAL_MS < MESSAGE_TIMEOUT_MS);
