//! # Dataset Extension Test Suite
//!
//! Growing and shrinking chunked datasets through the registry: maximum
//! extents, allocation-time policies, data preservation and persistence.
//!
//! ## Test Categories
//!
//! 1. **Bounds**: maximum extents, rank checks, contiguous layouts
//! 2. **Allocation time**: early, late and incremental storage
//! 3. **Data**: existing elements survive growth, shrunk elements are gone
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test dataset_extend
//! ```

use std::path::Path;

use h5lite::dataset::{AllocTime, DatasetCreateProps, Dataspace, Datatype, Hyperslab};
use h5lite::{
    error_kind, AccessMode, CreateMode, ErrorKind, FileAccessProps, FileCreateProps, Hid, Registry,
};
use tempfile::tempdir;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn create(reg: &Registry, path: &Path) -> Hid {
    reg.create_file(path, CreateMode::Truncate, &FileCreateProps::new(), &FileAccessProps::new())
        .unwrap()
}

fn i32_bytes(values: impl IntoIterator<Item = i32>) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn chunked_1d(reg: &Registry, fid: Hid, name: &str, len: u64, max: Option<u64>, alloc: AllocTime) -> Hid {
    let space = Dataspace::extendable(&[len], &[max]).unwrap();
    let dcpl = DatasetCreateProps::new().chunked(&[4]).alloc_time(alloc);
    reg.create_dataset(fid, name, Datatype::i32(), space, &dcpl).unwrap()
}

// ============================================================================
// BOUNDS
// ============================================================================

#[test]
fn growth_past_maximum_is_refused() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("max.h5"));
    let did = chunked_1d(&reg, fid, "d", 4, Some(10), AllocTime::Incremental);

    reg.set_extent(did, &[10]).unwrap();
    let err = reg.set_extent(did, &[11]).unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::ExceedsMaximumExtent);
    assert_eq!(reg.dataset_extent(did).unwrap(), vec![10]);
    assert_eq!(reg.dataset_max_extent(did).unwrap(), vec![Some(10)]);
}

#[test]
fn rank_must_match() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("rank.h5"));
    let did = chunked_1d(&reg, fid, "d", 4, None, AllocTime::Incremental);

    let err = reg.set_extent(did, &[4, 4]).unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::RankMismatch);
}

#[test]
fn overflowing_extent_is_refused_and_file_stays_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overflow.h5");
    let reg = Registry::new();
    let fid = create(&reg, &path);
    let space = Dataspace::extendable(&[2, 2], &[None, None]).unwrap();
    let did = reg
        .create_dataset(fid, "d", Datatype::i32(), space, &DatasetCreateProps::new().chunked(&[2, 2]))
        .unwrap();

    let err = reg.set_extent(did, &[1 << 33, 1 << 33]).unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    assert_eq!(reg.dataset_extent(did).unwrap(), vec![2, 2]);
    reg.flush_dataset(did).unwrap();
    reg.close_dataset(did).unwrap();
    reg.close_file(fid).unwrap();
    let fid = reg.open_file(&path, AccessMode::ReadOnly, &FileAccessProps::new()).unwrap();
    let did = reg.open_dataset(fid, "d").unwrap();
    assert_eq!(reg.dataset_extent(did).unwrap(), vec![2, 2]);
}

#[test]
fn oversized_chunk_is_refused() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("huge_chunk.h5"));
    let space = Dataspace::extendable(&[0], &[None]).unwrap();

    let err = reg
        .create_dataset(fid, "d", Datatype::i32(), space, &DatasetCreateProps::new().chunked(&[1 << 62]))
        .unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    let missing = reg.open_dataset(fid, "d").unwrap_err();
    assert_eq!(error_kind(&missing), ErrorKind::NotFound);
}

#[test]
fn contiguous_extent_is_fixed() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("contig.h5"));
    let did = reg
        .create_dataset(
            fid,
            "c",
            Datatype::i32(),
            Dataspace::simple(&[6]).unwrap(),
            &DatasetCreateProps::new().contiguous(),
        )
        .unwrap();

    let err = reg.set_extent(did, &[3]).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::InvalidShrink);
    reg.set_extent(did, &[6]).unwrap();
}

#[test]
fn extendable_space_needs_chunking() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("needs_chunk.h5"));

    let err = reg
        .create_dataset(
            fid,
            "e",
            Datatype::i32(),
            Dataspace::extendable(&[1], &[None]).unwrap(),
            &DatasetCreateProps::new(),
        )
        .unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
}

#[test]
fn read_only_handle_cannot_extend() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ro.h5");
    let reg = Registry::new();
    let fid = create(&reg, &path);
    let did = chunked_1d(&reg, fid, "d", 4, None, AllocTime::Incremental);
    reg.close_dataset(did).unwrap();
    reg.close_file(fid).unwrap();

    let fid = reg.open_file(&path, AccessMode::ReadOnly, &FileAccessProps::new()).unwrap();
    let did = reg.open_dataset(fid, "d").unwrap();
    let err = reg.set_extent(did, &[8]).unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::ReadOnly);
}

// ============================================================================
// ALLOCATION TIME
// ============================================================================

#[test]
fn early_allocates_on_create_and_growth() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("early.h5"));
    let did = chunked_1d(&reg, fid, "d", 6, None, AllocTime::Early);

    assert_eq!(reg.dataset_storage_size(did).unwrap(), 32);
    reg.set_extent(did, &[12]).unwrap();
    assert_eq!(reg.dataset_storage_size(did).unwrap(), 48);
}

#[test]
fn late_allocates_on_first_write() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("late.h5"));
    let did = chunked_1d(&reg, fid, "d", 8, None, AllocTime::Late);
    assert_eq!(reg.dataset_storage_size(did).unwrap(), 0);

    reg.write_dataset(did, &Hyperslab::new(&[0], &[1]).unwrap(), &i32_bytes([7])).unwrap();

    assert_eq!(reg.dataset_storage_size(did).unwrap(), 32);
}

#[test]
fn incremental_allocates_touched_chunks() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("incr.h5"));
    let did = chunked_1d(&reg, fid, "d", 16, None, AllocTime::Incremental);

    reg.write_dataset(did, &Hyperslab::new(&[9], &[2]).unwrap(), &i32_bytes([1, 2])).unwrap();

    assert_eq!(reg.dataset_storage_size(did).unwrap(), 16);
    let all = reg.read_dataset(did, &Hyperslab::all(&[16])).unwrap();
    let mut expected = vec![0i32; 16];
    expected[9] = 1;
    expected[10] = 2;
    assert_eq!(all, i32_bytes(expected));
}

// ============================================================================
// DATA
// ============================================================================

#[test]
fn two_axis_growth_preserves_elements() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grid.h5");
    let reg = Registry::new();
    let fid = create(&reg, &path);
    let space = Dataspace::extendable(&[2, 3], &[None, None]).unwrap();
    let did = reg
        .create_dataset(fid, "grid", Datatype::i32(), space, &DatasetCreateProps::new().chunked(&[2, 2]))
        .unwrap();
    reg.write_dataset(did, &Hyperslab::all(&[2, 3]), &i32_bytes(0..6)).unwrap();

    reg.set_extent(did, &[3, 4]).unwrap();
    reg.flush_dataset(did).unwrap();
    reg.close_dataset(did).unwrap();
    reg.close_file(fid).unwrap();

    let fid = reg.open_file(&path, AccessMode::ReadOnly, &FileAccessProps::new()).unwrap();
    let did = reg.open_dataset(fid, "grid").unwrap();
    assert_eq!(reg.dataset_extent(did).unwrap(), vec![3, 4]);
    let got = reg.read_dataset(did, &Hyperslab::all(&[3, 4])).unwrap();
    assert_eq!(got, i32_bytes([0, 1, 2, 0, 3, 4, 5, 0, 0, 0, 0, 0]));
}

#[test]
fn shrink_then_grow_reads_zeros() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("regrow.h5"));
    let did = chunked_1d(&reg, fid, "d", 8, None, AllocTime::Incremental);
    reg.write_dataset(did, &Hyperslab::all(&[8]), &i32_bytes(1..=8)).unwrap();

    reg.set_extent(did, &[2]).unwrap();
    reg.set_extent(did, &[8]).unwrap();

    let got = reg.read_dataset(did, &Hyperslab::all(&[8])).unwrap();
    assert_eq!(got, i32_bytes([1, 2, 0, 0, 0, 0, 0, 0]));
}

#[test]
fn shrink_to_zero_releases_everything() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("zero.h5"));
    let did = chunked_1d(&reg, fid, "d", 8, None, AllocTime::Early);

    reg.set_extent(did, &[0]).unwrap();

    assert_eq!(reg.dataset_storage_size(did).unwrap(), 0);
    assert_eq!(reg.free_space(fid).unwrap(), 32);
    let err = reg
        .read_dataset(did, &Hyperslab::new(&[0], &[1]).unwrap())
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::SelectionOutOfBounds);
}

#[test]
fn wrong_buffer_size_is_refused() {
    let dir = tempdir().unwrap();
    let reg = Registry::new();
    let fid = create(&reg, &dir.path().join("buf.h5"));
    let did = chunked_1d(&reg, fid, "d", 4, None, AllocTime::Incremental);

    let err = reg
        .write_dataset(did, &Hyperslab::all(&[4]), &i32_bytes([1, 2, 3]))
        .unwrap_err();

    assert_eq!(error_kind(&err), ErrorKind::BufferSizeMismatch);
}
