//! Fuzz testing for the superblock decoder.
//!
//! Arbitrary 128-byte images must either decode or fail with an error,
//! never panic. Images that do decode must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;

use h5lite::config::SUPERBLOCK_SIZE;
use h5lite::storage::Superblock;

fuzz_target!(|data: &[u8]| {
    if data.len() < SUPERBLOCK_SIZE {
        let _ = Superblock::from_bytes(data);
        return;
    }
    let image = &data[..SUPERBLOCK_SIZE];
    if let Ok(sb) = Superblock::from_bytes(image) {
        assert_eq!(&sb.to_bytes()[..], image);
    }
});
