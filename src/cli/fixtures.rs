//! The WATCH fixture: the named datasets the extension driver knows about.

use std::path::Path;

use eyre::{Result, WrapErr};
use tracing::info;

use super::fill::{indexed_fill, pattern_fill};
use crate::dataset::{AllocTime, DatasetCreateProps, Dataspace, Datatype, Hyperslab};
use crate::file::{CreateMode, FileAccessProps, FileCreateProps};
use crate::registry::Registry;

pub const DSET_ONE: &str = "DSET_ONE";
pub const DSET_TWO: &str = "DSET_TWO";
pub const DSET_CMPD: &str = "DSET_CMPD";
pub const DSET_CMPD_ESC: &str = "DSET_CMPD_ESC";
pub const DSET_CMPD_TWO: &str = "DSET_CMPD_TWO";
pub const DSET_ALLOC_LATE: &str = "DSET_ALLOC_LATE";
pub const DSET_ALLOC_EARLY: &str = "DSET_ALLOC_EARLY";

pub const ONE_DIM_LEN: u64 = 10;
pub const TWO_DIMS: [u64; 2] = [4, 10];

/// The 40-byte compound element used by the compound datasets.
pub fn set_type() -> Result<Datatype> {
    let sub22 = Datatype::compound(12)
        .field("a", 0, Datatype::u32())
        .field("b", 4, Datatype::u32())
        .field("c", 8, Datatype::u32())
        .build()?;
    let sub2 = Datatype::compound(20)
        .field("a", 0, Datatype::u32())
        .field("b", 4, sub22)
        .field("c", 16, Datatype::u32())
        .build()?;
    let sub4 = Datatype::compound(8)
        .field("a", 0, Datatype::u32())
        .field("b", 4, Datatype::u32())
        .build()?;
    Datatype::compound(40)
        .field("field1", 0, Datatype::u32())
        .field("field2", 4, sub2)
        .field("field3", 24, Datatype::f64())
        .field("field4", 32, sub4)
        .build()
}

struct FixtureDataset {
    name: &'static str,
    datatype: Datatype,
    dims: &'static [u64],
    chunk: &'static [u64],
    alloc_time: AllocTime,
}

/// Creates (or truncates) `path` with every dataset the driver can extend.
/// All of them are chunked with unlimited axes and start filled: one-axis
/// datasets with the same pattern the driver appends, two-axis datasets
/// with zeros.
pub fn create_watch_fixture(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let set_t = set_type()?;
    let datasets = [
        FixtureDataset {
            name: DSET_ONE,
            datatype: Datatype::i32(),
            dims: &[ONE_DIM_LEN],
            chunk: &[5],
            alloc_time: AllocTime::Incremental,
        },
        FixtureDataset {
            name: DSET_ALLOC_LATE,
            datatype: Datatype::i32(),
            dims: &[ONE_DIM_LEN],
            chunk: &[5],
            alloc_time: AllocTime::Late,
        },
        FixtureDataset {
            name: DSET_ALLOC_EARLY,
            datatype: Datatype::i32(),
            dims: &[ONE_DIM_LEN],
            chunk: &[5],
            alloc_time: AllocTime::Early,
        },
        FixtureDataset {
            name: DSET_CMPD,
            datatype: set_t.clone(),
            dims: &[ONE_DIM_LEN],
            chunk: &[5],
            alloc_time: AllocTime::Incremental,
        },
        FixtureDataset {
            name: DSET_CMPD_ESC,
            datatype: set_t.clone(),
            dims: &[ONE_DIM_LEN],
            chunk: &[5],
            alloc_time: AllocTime::Incremental,
        },
        FixtureDataset {
            name: DSET_TWO,
            datatype: Datatype::i32(),
            dims: &TWO_DIMS,
            chunk: &[2, 5],
            alloc_time: AllocTime::Incremental,
        },
        FixtureDataset {
            name: DSET_CMPD_TWO,
            datatype: set_t,
            dims: &TWO_DIMS,
            chunk: &[2, 5],
            alloc_time: AllocTime::Incremental,
        },
    ];

    let reg = Registry::new();
    let fid = reg
        .create_file(path, CreateMode::Truncate, &FileCreateProps::new(), &FileAccessProps::new())
        .wrap_err_with(|| format!("failed to create fixture '{}'", path.display()))?;
    for ds in datasets {
        let max = vec![None; ds.dims.len()];
        let space = Dataspace::extendable(ds.dims, &max)?;
        let dcpl = DatasetCreateProps::new()
            .chunked(ds.chunk)
            .alloc_time(ds.alloc_time);
        let did = reg.create_dataset(fid, ds.name, ds.datatype.clone(), space, &dcpl)?;
        let count: u64 = ds.dims.iter().product();
        let data = if ds.dims.len() == 1 {
            indexed_fill(&ds.datatype, count)?
        } else {
            pattern_fill(&ds.datatype, count, 0)?
        };
        reg.write_dataset(did, &Hyperslab::all(ds.dims), &data)?;
        reg.close_dataset(did)?;
    }
    reg.close_file(fid)?;
    info!(path = %path.display(), "created watch fixture");
    Ok(())
}
