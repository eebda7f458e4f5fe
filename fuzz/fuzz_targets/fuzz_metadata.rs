//! Fuzz testing for the metadata block and its payload.
//!
//! Drives the checksummed block decoder with raw bytes, and the payload
//! decoder with bytes sealed into a valid block, so both the framing and
//! the catalog/free-list codec see malformed input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use h5lite::file::MetadataPayload;
use h5lite::storage::{decode_metadata_block, encode_metadata_block, metadata_block_len};

#[derive(Debug, Arbitrary)]
enum MetadataInput {
    RawBlock(Vec<u8>),
    SealedPayload { generation: u64, payload: Vec<u8> },
}

fuzz_target!(|input: MetadataInput| {
    match input {
        MetadataInput::RawBlock(bytes) => {
            if let Ok((_, payload)) = decode_metadata_block(&bytes) {
                let _ = MetadataPayload::decode(payload);
            }
        }
        MetadataInput::SealedPayload { generation, payload } => {
            let len = metadata_block_len(payload.len());
            let Ok(block) = encode_metadata_block(&payload, generation, len) else {
                return;
            };
            let (got_gen, got) = decode_metadata_block(&block).expect("sealed block must decode");
            assert_eq!(got_gen, generation);
            assert_eq!(got, payload.as_slice());
            if let Ok(decoded) = MetadataPayload::decode(got) {
                assert_eq!(MetadataPayload::decode(&decoded.encode()).ok(), Some(decoded));
            }
        }
    }
});
