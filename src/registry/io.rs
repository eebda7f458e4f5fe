//! Dataset extent, raw I/O and flush through dataset handles.

use eyre::{Result, WrapErr};

use super::handle::{HandleKind, Hid};
use super::state::{Location, State};
use super::Registry;
use crate::dataset::{Datatype, Hyperslab};

fn dataset_location(st: &State, did: Hid) -> Result<Location> {
    let entry = st.expect_kind(did, HandleKind::Dataset)?;
    Ok(Location {
        phys: st.phys_of(did)?,
        path: entry.path().unwrap_or_default().to_string(),
        writable: entry.writable,
        origin: entry.origin.unwrap_or(did),
    })
}

impl Registry {
    pub fn dataset_extent(&self, did: Hid) -> Result<Vec<u64>> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        Ok(st.file(loc.phys)?.dataset(&loc.path)?.dims().to_vec())
    }

    /// Declared maximum per axis; `None` is unlimited.
    pub fn dataset_max_extent(&self, did: Hid) -> Result<Vec<Option<u64>>> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        Ok(st.file(loc.phys)?.dataset(&loc.path)?.max_dims().to_vec())
    }

    pub fn dataset_datatype(&self, did: Hid) -> Result<Datatype> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        Ok(st.file(loc.phys)?.dataset(&loc.path)?.datatype().clone())
    }

    pub fn dataset_element_size(&self, did: Hid) -> Result<usize> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        Ok(st.file(loc.phys)?.dataset(&loc.path)?.element_size())
    }

    /// Bytes of chunk storage currently allocated.
    pub fn dataset_storage_size(&self, did: Hid) -> Result<u64> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        Ok(st.file(loc.phys)?.dataset(&loc.path)?.storage_size())
    }

    /// Changes the current extent. The whole change is applied or none of
    /// it is.
    pub fn set_extent(&self, did: Hid, dims: &[u64]) -> Result<()> {
        let mut st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        st.ensure_writable(&loc)?;
        st.file_mut(loc.phys)?
            .set_extent(&loc.path, dims)
            .wrap_err_with(|| format!("failed to set extent of '{}'", loc.path))
    }

    /// Writes raw element bytes into the selected region.
    pub fn write_dataset(&self, did: Hid, sel: &Hyperslab, buf: &[u8]) -> Result<()> {
        let mut st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        st.ensure_writable(&loc)?;
        st.file_mut(loc.phys)?
            .write_dataset(&loc.path, sel, buf)
            .wrap_err_with(|| format!("failed to write '{}'", loc.path))
    }

    pub fn read_dataset(&self, did: Hid, sel: &Hyperslab) -> Result<Vec<u8>> {
        let st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        st.file(loc.phys)?
            .read_dataset(&loc.path, sel)
            .wrap_err_with(|| format!("failed to read '{}'", loc.path))
    }

    /// Makes the dataset's data and the file's metadata durable, so an
    /// independent reader that refreshes afterwards sees both.
    pub fn flush_dataset(&self, did: Hid) -> Result<()> {
        let mut st = self.state.lock();
        let loc = dataset_location(&st, did)?;
        st.file_mut(loc.phys)?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AllocTime, DatasetCreateProps, Dataspace};
    use crate::error::{error_kind, ErrorKind};
    use crate::file::{AccessMode, CreateMode, FileAccessProps, FileCreateProps};
    use tempfile::tempdir;

    #[test]
    fn grow_keeps_existing_elements() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = reg
            .create_file(
                dir.path().join("g.h5"),
                CreateMode::Truncate,
                &FileCreateProps::new(),
                &FileAccessProps::new(),
            )
            .unwrap();
        let space = Dataspace::extendable(&[4], &[None]).unwrap();
        let dcpl = DatasetCreateProps::new().chunked(&[2]);
        let did = reg
            .create_dataset(fid, "d", Datatype::i32(), space, &dcpl)
            .unwrap();
        let first: Vec<u8> = (0..4i32).flat_map(|v| v.to_le_bytes()).collect();
        reg.write_dataset(did, &Hyperslab::all(&[4]), &first).unwrap();

        reg.set_extent(did, &[7]).unwrap();
        let tail: Vec<u8> = (4..7i32).flat_map(|v| v.to_le_bytes()).collect();
        reg.write_dataset(did, &Hyperslab::new(&[4], &[3]).unwrap(), &tail)
            .unwrap();
        reg.flush_dataset(did).unwrap();

        let all = reg.read_dataset(did, &Hyperslab::all(&[7])).unwrap();
        let expected: Vec<u8> = (0..7i32).flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(reg.dataset_extent(did).unwrap(), vec![7]);
        assert_eq!(all, expected);
        assert_eq!(reg.dataset_element_size(did).unwrap(), 4);
        assert_eq!(reg.dataset_max_extent(did).unwrap(), vec![None]);
    }

    #[test]
    fn read_only_handle_cannot_extend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.h5");
        let reg = Registry::new();
        let fid = reg
            .create_file(&path, CreateMode::Truncate, &FileCreateProps::new(), &FileAccessProps::new())
            .unwrap();
        let space = Dataspace::extendable(&[2], &[Some(8)]).unwrap();
        let dcpl = DatasetCreateProps::new()
            .chunked(&[2])
            .alloc_time(AllocTime::Early);
        let did = reg
            .create_dataset(fid, "d", Datatype::u32(), space, &dcpl)
            .unwrap();
        reg.close_dataset(did).unwrap();

        let ro = reg
            .open_file(&path, AccessMode::ReadOnly, &FileAccessProps::new())
            .unwrap();
        let did = reg.open_dataset(ro, "d").unwrap();
        let err = reg.set_extent(did, &[4]).unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::ReadOnly);
        assert_eq!(reg.dataset_storage_size(did).unwrap(), 32);
    }
}
