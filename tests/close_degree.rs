//! # Close Degree Test Suite
//!
//! Drives the create/open/close sequences of every close degree against one
//! shared physical file and checks which handles survive each close.
//!
//! ## Test Categories
//!
//! 1. **Open compatibility**: a second open must request the same degree
//! 2. **Strong**: last close force-closes open objects
//! 3. **Semi**: last close is refused while objects are open
//! 4. **Weak**: objects outlive the file handles
//! 5. **Default**: resolves to the registry's configured degree
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test close_degree
//! ```

use std::path::Path;

use h5lite::dataset::{DatasetCreateProps, Dataspace, Datatype, Hyperslab};
use h5lite::{
    error_kind, AccessMode, CloseDegree, CreateMode, EffectiveDegree, ErrorKind, FileAccessProps,
    FileCreateProps, FileScope, Hid, ObjectMask, Registry, RegistryConfig,
};
use tempfile::tempdir;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

struct Objects {
    dset: Hid,
    group1: Hid,
    group2: Hid,
    group3: Hid,
}

fn fapl(degree: CloseDegree) -> FileAccessProps {
    FileAccessProps::new().close_degree(degree)
}

fn create(reg: &Registry, path: &Path, degree: CloseDegree) -> Hid {
    reg.create_file(path, CreateMode::Truncate, &FileCreateProps::new(), &fapl(degree))
        .unwrap()
}

fn open(reg: &Registry, path: &Path, degree: CloseDegree) -> eyre::Result<Hid> {
    reg.open_file(path, AccessMode::ReadWrite, &fapl(degree))
}

/// One dataset through `fid1`, one group created and opened twice through
/// `fid2`. Checks the counts before and after.
fn create_objects(reg: &Registry, fid1: Hid, fid2: Hid) -> Objects {
    assert_eq!(reg.count_open_objects(FileScope::File(fid1), ObjectMask::ALL).unwrap(), 2);
    assert_eq!(reg.count_open_objects(FileScope::File(fid2), ObjectMask::ALL).unwrap(), 2);
    assert_eq!(reg.count_open_objects(FileScope::File(fid1), ObjectMask::OBJECTS).unwrap(), 0);

    let dset = reg
        .create_dataset(
            fid1,
            "/dset",
            Datatype::i32(),
            Dataspace::simple(&[4, 6]).unwrap(),
            &DatasetCreateProps::new(),
        )
        .unwrap();
    let mut data = Vec::new();
    for i in 0..4i32 {
        for j in 0..6i32 {
            data.extend_from_slice(&(i * 10 + j).to_le_bytes());
        }
    }
    reg.write_dataset(dset, &Hyperslab::all(&[4, 6]), &data).unwrap();

    let group1 = reg.create_group(fid2, "/group").unwrap();
    let group2 = reg.open_group(fid2, "/group").unwrap();
    let group3 = reg.open_group(fid2, "/group").unwrap();

    for fid in [fid1, fid2] {
        assert_eq!(reg.count_open_objects(FileScope::File(fid), ObjectMask::ALL).unwrap(), 6);
        assert_eq!(reg.count_open_objects(FileScope::File(fid), ObjectMask::OBJECTS).unwrap(), 4);
    }

    Objects {
        dset,
        group1,
        group2,
        group3,
    }
}

// ============================================================================
// OPEN COMPATIBILITY
// ============================================================================

#[test]
fn default_file_refuses_strong_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Default);

    let err = open(&reg, &path, CloseDegree::Strong).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);

    let fid2 = open(&reg, &path, CloseDegree::Default).unwrap();
    reg.close_file(fid1).unwrap();
    reg.close_file(fid2).unwrap();
}

#[test]
fn default_file_accepts_weak_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Default);

    let fid2 = open(&reg, &path, CloseDegree::Weak).unwrap();

    reg.close_file(fid1).unwrap();
    reg.close_file(fid2).unwrap();
    assert_eq!(reg.open_file_count(), 0);
}

// ============================================================================
// STRONG
// ============================================================================

#[test]
fn strong_close_force_closes_objects() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Strong);

    let err = open(&reg, &path, CloseDegree::Weak).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);
    let fid2 = open(&reg, &path, CloseDegree::Strong).unwrap();

    let objs = create_objects(&reg, fid1, fid2);

    reg.close_file(fid1).unwrap();
    assert!(reg.is_valid(objs.dset));
    reg.close_file(fid2).unwrap();

    for hid in [objs.dset, objs.group1, objs.group2, objs.group3] {
        assert!(!reg.is_valid(hid));
        let err = reg.close_group(hid).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::InvalidHandle);
    }
    assert_eq!(reg.count_open_objects(FileScope::All, ObjectMask::ALL).unwrap(), 0);
    assert_eq!(reg.open_file_count(), 0);
}

// ============================================================================
// SEMI
// ============================================================================

#[test]
fn semi_close_refused_until_objects_closed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Semi);

    let err = open(&reg, &path, CloseDegree::Default).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);
    let fid2 = open(&reg, &path, CloseDegree::Semi).unwrap();

    let objs = create_objects(&reg, fid1, fid2);

    reg.close_file(fid1).unwrap();
    let err = reg.close_file(fid2).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::ObjectsStillOpen);
    assert!(reg.is_valid(fid2));

    reg.close_dataset(objs.dset).unwrap();
    reg.close_group(objs.group1).unwrap();
    reg.close_group(objs.group2).unwrap();
    let err = reg.close_file(fid2).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::ObjectsStillOpen);

    reg.close_group(objs.group3).unwrap();
    reg.close_file(fid2).unwrap();

    assert_eq!(reg.open_file_count(), 0);
}

// ============================================================================
// WEAK
// ============================================================================

#[test]
fn weak_objects_outlive_file_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Weak);

    let err = open(&reg, &path, CloseDegree::Semi).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);
    let fid2 = open(&reg, &path, CloseDegree::Default).unwrap();

    let objs = create_objects(&reg, fid1, fid2);
    assert_eq!(reg.count_open_objects(FileScope::All, ObjectMask::FILE).unwrap(), 2);

    reg.close_file(fid1).unwrap();
    reg.close_file(fid2).unwrap();

    assert_eq!(reg.count_open_objects(FileScope::All, ObjectMask::FILE).unwrap(), 0);
    assert_eq!(reg.count_open_objects(FileScope::All, ObjectMask::ALL).unwrap(), 4);
    assert_eq!(reg.open_file_count(), 1);

    let data = reg.read_dataset(objs.dset, &Hyperslab::new(&[1, 2], &[1, 1]).unwrap()).unwrap();
    assert_eq!(data, 12i32.to_le_bytes());

    reg.close_dataset(objs.dset).unwrap();
    reg.close_group(objs.group1).unwrap();
    reg.close_group(objs.group2).unwrap();
    assert_eq!(reg.open_file_count(), 1);
    reg.close_group(objs.group3).unwrap();

    assert_eq!(reg.open_file_count(), 0);
}

#[test]
fn weak_file_is_reopened_with_its_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Weak);
    let fid2 = open(&reg, &path, CloseDegree::Weak).unwrap();
    let objs = create_objects(&reg, fid1, fid2);
    reg.close_file(fid1).unwrap();
    reg.close_file(fid2).unwrap();
    for g in [objs.group1, objs.group2, objs.group3] {
        reg.close_group(g).unwrap();
    }
    reg.close_dataset(objs.dset).unwrap();

    let fid = open(&reg, &path, CloseDegree::Strong).unwrap();

    let dset = reg.open_dataset(fid, "dset").unwrap();
    assert_eq!(reg.dataset_extent(dset).unwrap(), vec![4, 6]);
    reg.open_group(fid, "group").unwrap();
    reg.close_file(fid).unwrap();
    assert!(!reg.is_valid(dset));
}

// ============================================================================
// DEFAULT
// ============================================================================

#[test]
fn default_degree_behaves_weak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::new();
    let fid1 = create(&reg, &path, CloseDegree::Default);

    let err = open(&reg, &path, CloseDegree::Semi).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);
    let fid2 = open(&reg, &path, CloseDegree::Default).unwrap();
    assert_eq!(reg.file_access_props(fid2).unwrap().degree(), CloseDegree::Weak);

    let objs = create_objects(&reg, fid1, fid2);

    reg.close_file(fid1).unwrap();
    reg.close_file(fid2).unwrap();
    reg.close_dataset(objs.dset).unwrap();
    reg.close_group(objs.group1).unwrap();
    reg.close_group(objs.group2).unwrap();
    reg.close_group(objs.group3).unwrap();

    assert_eq!(reg.count_open_objects(FileScope::All, ObjectMask::ALL).unwrap(), 0);
    assert_eq!(reg.open_file_count(), 0);
}

#[test]
fn configured_default_degree_applies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tfile1.h5");
    let reg = Registry::with_config(
        RegistryConfig::default().default_close_degree(EffectiveDegree::Strong),
    );
    let fid = create(&reg, &path, CloseDegree::Default);
    let gid = reg.create_group(fid, "g").unwrap();

    let err = open(&reg, &path, CloseDegree::Weak).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::IncompatibleCloseDegree);
    assert_eq!(reg.file_access_props(fid).unwrap().degree(), CloseDegree::Strong);

    reg.close_file(fid).unwrap();
    assert!(!reg.is_valid(gid));
}
