//! Object handles: groups, datasets, named datatypes, attributes and
//! property lists.
//!
//! Every object handle records the physical file it lives in and the file
//! handle it was opened through. Closing the last handle that refers to a
//! physical file whose logical handles are all gone (a deferred WEAK close)
//! tears the file down.

use eyre::Result;
use tracing::debug;

use super::handle::{HandleKind, Hid, PropertyList};
use super::state::{HandleBody, HandleEntry, Location, State};
use super::Registry;
use crate::dataset::{DatasetCreateProps, Dataspace, Datatype};
use crate::error::H5Error;
use crate::file::{is_within, resolve_path, ObjectBody};

fn kind_of(body: &ObjectBody) -> HandleKind {
    match body {
        ObjectBody::Group => HandleKind::Group,
        ObjectBody::Dataset(_) => HandleKind::Dataset,
        ObjectBody::Datatype(_) => HandleKind::Datatype,
    }
}

fn mint_object(st: &mut State, loc: &Location, kind: HandleKind, path: String) -> Hid {
    st.mint(HandleEntry {
        kind,
        refs: 1,
        phys: Some(loc.phys),
        writable: loc.writable,
        origin: Some(loc.origin),
        body: HandleBody::Object { path },
    })
}

/// Opens an existing object of the given kind below `loc`.
fn open_object(st: &mut State, loc: Hid, name: &str, kind: HandleKind) -> Result<Hid> {
    let loc = st.location(loc)?;
    let path = resolve_path(&loc.path, name)?;
    let actual = kind_of(st.file(loc.phys)?.catalog().get(&path)?.body());
    if actual != kind {
        return Err(H5Error::InvalidArgument(format!(
            "'{}' is a {}, not a {}",
            path, actual, kind
        ))
        .into());
    }
    Ok(mint_object(st, &loc, kind, path))
}

/// Drops one reference to an object handle, tearing down its physical file
/// if nothing else refers to it.
fn close_object(st: &mut State, hid: Hid, kind: HandleKind) -> Result<()> {
    let entry = st.expect_kind(hid, kind)?;
    let (refs, phys) = (entry.refs, entry.phys);
    if refs > 1 {
        st.entry_mut(hid)?.refs -= 1;
        return Ok(());
    }
    st.handles.remove(&hid);
    if let Some(phys) = phys {
        if !st.is_referenced(phys) {
            debug!(%hid, "last handle closed, releasing deferred file");
            return st.teardown(phys);
        }
    }
    Ok(())
}

impl Registry {
    pub fn create_group(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut st = self.state.lock();
        let loc = st.location(loc)?;
        st.ensure_writable(&loc)?;
        let path = resolve_path(&loc.path, name)?;
        st.file_mut(loc.phys)?.create_group(&path)?;
        Ok(mint_object(&mut st, &loc, HandleKind::Group, path))
    }

    /// Each call returns a distinct handle, even for a group that is already
    /// open.
    pub fn open_group(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut st = self.state.lock();
        open_object(&mut st, loc, name, HandleKind::Group)
    }

    pub fn create_dataset(
        &self,
        loc: Hid,
        name: &str,
        datatype: Datatype,
        space: Dataspace,
        dcpl: &DatasetCreateProps,
    ) -> Result<Hid> {
        let mut st = self.state.lock();
        let loc = st.location(loc)?;
        st.ensure_writable(&loc)?;
        let path = resolve_path(&loc.path, name)?;
        st.file_mut(loc.phys)?
            .create_dataset(&path, datatype, space, dcpl)?;
        Ok(mint_object(&mut st, &loc, HandleKind::Dataset, path))
    }

    pub fn open_dataset(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut st = self.state.lock();
        open_object(&mut st, loc, name, HandleKind::Dataset)
    }

    pub fn commit_datatype(&self, loc: Hid, name: &str, datatype: Datatype) -> Result<Hid> {
        let mut st = self.state.lock();
        let loc = st.location(loc)?;
        st.ensure_writable(&loc)?;
        let path = resolve_path(&loc.path, name)?;
        st.file_mut(loc.phys)?.commit_datatype(&path, datatype)?;
        Ok(mint_object(&mut st, &loc, HandleKind::Datatype, path))
    }

    pub fn open_datatype(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut st = self.state.lock();
        open_object(&mut st, loc, name, HandleKind::Datatype)
    }

    /// The type stored under a named datatype handle.
    pub fn datatype_of(&self, tid: Hid) -> Result<Datatype> {
        let st = self.state.lock();
        let entry = st.expect_kind(tid, HandleKind::Datatype)?;
        let path = entry.path().unwrap_or_default().to_string();
        Ok(st.file_of(tid)?.catalog().datatype(&path)?.clone())
    }

    /// Attaches an attribute to the object behind `obj` (a file handle
    /// means the root group). The value starts zero-filled.
    pub fn create_attribute(
        &self,
        obj: Hid,
        name: &str,
        datatype: Datatype,
        space: Dataspace,
    ) -> Result<Hid> {
        let mut st = self.state.lock();
        let target = st.attribute_target(obj)?;
        st.ensure_writable(&target)?;
        st.file_mut(target.phys)?
            .create_attribute(&target.path, name, datatype, space)?;
        Ok(st.mint(HandleEntry {
            kind: HandleKind::Attribute,
            refs: 1,
            phys: Some(target.phys),
            writable: target.writable,
            origin: Some(target.origin),
            body: HandleBody::Attribute {
                object: target.path,
                name: name.to_string(),
            },
        }))
    }

    pub fn open_attribute(&self, obj: Hid, name: &str) -> Result<Hid> {
        let mut st = self.state.lock();
        let target = st.attribute_target(obj)?;
        st.file(target.phys)?.attribute(&target.path, name)?;
        Ok(st.mint(HandleEntry {
            kind: HandleKind::Attribute,
            refs: 1,
            phys: Some(target.phys),
            writable: target.writable,
            origin: Some(target.origin),
            body: HandleBody::Attribute {
                object: target.path,
                name: name.to_string(),
            },
        }))
    }

    pub fn write_attribute(&self, aid: Hid, value: &[u8]) -> Result<()> {
        let mut st = self.state.lock();
        let (phys, object, name, writable) = attribute_parts(&st, aid)?;
        if !writable {
            let path = st.file(phys)?.path().display().to_string();
            return Err(H5Error::ReadOnly(path).into());
        }
        st.file_mut(phys)?.write_attribute(&object, &name, value)
    }

    pub fn read_attribute(&self, aid: Hid) -> Result<Vec<u8>> {
        let st = self.state.lock();
        let (phys, object, name, _) = attribute_parts(&st, aid)?;
        Ok(st.file(phys)?.attribute(&object, &name)?.value().to_vec())
    }

    /// Removes `name` and, for a group, everything below it. Fails while any
    /// handle is open on a removed object or one of its attributes.
    pub fn unlink(&self, loc: Hid, name: &str) -> Result<()> {
        let mut st = self.state.lock();
        let loc = st.location(loc)?;
        st.ensure_writable(&loc)?;
        let path = resolve_path(&loc.path, name)?;
        let open = st
            .handles
            .values()
            .filter(|h| h.phys == Some(loc.phys))
            .filter(|h| match &h.body {
                HandleBody::Object { path: p } => is_within(p, &path),
                HandleBody::Attribute { object, .. } => is_within(object, &path),
                _ => false,
            })
            .count();
        if open > 0 {
            return Err(H5Error::ObjectsStillOpen { count: open }.into());
        }
        st.file_mut(loc.phys)?.unlink(&path)?;
        Ok(())
    }

    pub fn close_group(&self, gid: Hid) -> Result<()> {
        close_object(&mut self.state.lock(), gid, HandleKind::Group)
    }

    pub fn close_dataset(&self, did: Hid) -> Result<()> {
        close_object(&mut self.state.lock(), did, HandleKind::Dataset)
    }

    pub fn close_datatype(&self, tid: Hid) -> Result<()> {
        close_object(&mut self.state.lock(), tid, HandleKind::Datatype)
    }

    pub fn close_attribute(&self, aid: Hid) -> Result<()> {
        close_object(&mut self.state.lock(), aid, HandleKind::Attribute)
    }

    pub fn register_property_list(&self, plist: PropertyList) -> Hid {
        self.state.lock().mint(HandleEntry {
            kind: HandleKind::PropertyList,
            refs: 1,
            phys: None,
            writable: false,
            origin: None,
            body: HandleBody::PropertyList(plist),
        })
    }

    pub fn property_list(&self, pid: Hid) -> Result<PropertyList> {
        let st = self.state.lock();
        match &st.expect_kind(pid, HandleKind::PropertyList)?.body {
            HandleBody::PropertyList(p) => Ok(p.clone()),
            _ => Err(H5Error::Corrupt(format!("{} has no property list body", pid)).into()),
        }
    }

    pub fn close_property_list(&self, pid: Hid) -> Result<()> {
        close_object(&mut self.state.lock(), pid, HandleKind::PropertyList)
    }
}

fn attribute_parts(st: &State, aid: Hid) -> Result<(u64, String, String, bool)> {
    let entry = st.expect_kind(aid, HandleKind::Attribute)?;
    match &entry.body {
        HandleBody::Attribute { object, name } => Ok((
            st.phys_of(aid)?,
            object.clone(),
            name.clone(),
            entry.writable,
        )),
        _ => Err(H5Error::Corrupt(format!("{} has no attribute body", aid)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AllocTime;
    use crate::error::{error_kind, ErrorKind};
    use crate::file::{AccessMode, CreateMode, FileAccessProps, FileCreateProps};
    use tempfile::tempdir;

    fn new_file(reg: &Registry, dir: &tempfile::TempDir, name: &str) -> Hid {
        reg.create_file(
            dir.path().join(name),
            CreateMode::Truncate,
            &FileCreateProps::new(),
            &FileAccessProps::new(),
        )
        .unwrap()
    }

    #[test]
    fn relative_names_resolve_under_group() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = new_file(&reg, &dir, "a.h5");
        let g = reg.create_group(fid, "/outer").unwrap();
        let inner = reg.create_group(g, "inner").unwrap();

        let again = reg.open_group(fid, "/outer/inner").unwrap();

        assert_ne!(again, inner);
        let err = reg.create_group(fid, "/missing/child").unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::NotFound);
        let dup = reg.create_group(g, "inner").unwrap_err();
        assert_eq!(error_kind(&dup), ErrorKind::AlreadyExists);
    }

    #[test]
    fn open_with_wrong_object_kind_fails() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = new_file(&reg, &dir, "k.h5");
        let did = reg
            .create_dataset(fid, "d", Datatype::u32(), Dataspace::scalar(), &DatasetCreateProps::new())
            .unwrap();
        reg.close_dataset(did).unwrap();

        let err = reg.open_group(fid, "d").unwrap_err();

        assert_eq!(error_kind(&err), ErrorKind::InvalidArgument);
    }

    #[test]
    fn attribute_values_round_trip_through_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attr.h5");
        let reg = Registry::new();
        let fid = new_file(&reg, &dir, "attr.h5");
        let g = reg.create_group(fid, "g").unwrap();
        let aid = reg
            .create_attribute(g, "units", Datatype::u32(), Dataspace::simple(&[2]).unwrap())
            .unwrap();
        assert_eq!(reg.read_attribute(aid).unwrap(), vec![0u8; 8]);
        reg.write_attribute(aid, &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
        reg.close_attribute(aid).unwrap();
        reg.close_group(g).unwrap();
        reg.close_file(fid).unwrap();

        let fid = reg
            .open_file(&path, AccessMode::ReadOnly, &FileAccessProps::new())
            .unwrap();
        let g = reg.open_group(fid, "/g").unwrap();
        let aid = reg.open_attribute(g, "units").unwrap();

        assert_eq!(reg.read_attribute(aid).unwrap(), vec![1, 0, 0, 0, 2, 0, 0, 0]);
        let err = reg.write_attribute(aid, &[0; 8]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::ReadOnly);
    }

    #[test]
    fn unlink_refuses_open_descendants() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = new_file(&reg, &dir, "u.h5");
        let g = reg.create_group(fid, "g").unwrap();
        let dcpl = DatasetCreateProps::new().alloc_time(AllocTime::Early);
        let did = reg
            .create_dataset(g, "d", Datatype::u32(), Dataspace::scalar(), &dcpl)
            .unwrap();
        reg.close_group(g).unwrap();

        let err = reg.unlink(fid, "g").unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::ObjectsStillOpen);

        reg.close_dataset(did).unwrap();
        reg.unlink(fid, "g").unwrap();

        assert_eq!(reg.free_space(fid).unwrap(), 4);
    }

    #[test]
    fn named_datatype_is_retrievable() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = new_file(&reg, &dir, "t.h5");
        let tid = reg.commit_datatype(fid, "my_type", Datatype::f64()).unwrap();
        reg.close_datatype(tid).unwrap();

        let tid = reg.open_datatype(fid, "my_type").unwrap();

        assert_eq!(reg.datatype_of(tid).unwrap(), Datatype::f64());
    }

    #[test]
    fn property_lists_have_no_file() {
        let reg = Registry::new();
        let pid = reg.register_property_list(PropertyList::FileAccess(FileAccessProps::new()));

        assert_eq!(
            reg.property_list(pid).unwrap(),
            PropertyList::FileAccess(FileAccessProps::new())
        );
        assert_eq!(error_kind(&reg.file_of(pid).unwrap_err()), ErrorKind::NotAssociatedWithFile);
        reg.close_property_list(pid).unwrap();
        assert!(!reg.is_valid(pid));
    }
}
