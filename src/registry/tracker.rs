//! Object reference tracking: counts, listings and identifier introspection.

use eyre::Result;

use super::handle::{FileScope, HandleKind, Hid, ObjectMask};
use super::state::{HandleBody, State};
use super::Registry;
use crate::file::{CloseDegree, FileAccessProps};

fn matching(st: &State, scope: FileScope, mask: ObjectMask) -> Result<Vec<Hid>> {
    let phys = match scope {
        FileScope::All => None,
        FileScope::File(fid) => Some(st.phys_of(fid)?),
    };
    let mut out: Vec<Hid> = st
        .handles
        .iter()
        .filter(|(_, h)| mask.matches(h.kind))
        .filter(|(_, h)| phys.is_none() || h.phys == phys)
        .map(|(&hid, _)| hid)
        .collect();
    out.sort_unstable();
    Ok(out)
}

impl Registry {
    /// Live handles of the kinds in `mask`. Each identifier counts once,
    /// whatever its reference count.
    pub fn count_open_objects(&self, scope: FileScope, mask: ObjectMask) -> Result<usize> {
        let st = self.state.lock();
        Ok(matching(&st, scope, mask)?.len())
    }

    /// Up to `max` matching identifiers in creation order.
    pub fn open_object_ids(&self, scope: FileScope, mask: ObjectMask, max: usize) -> Result<Vec<Hid>> {
        let st = self.state.lock();
        let mut ids = matching(&st, scope, mask)?;
        ids.truncate(max);
        Ok(ids)
    }

    /// Returns a file handle for the file that owns `hid`, with one more
    /// reference the caller must close.
    ///
    /// A file handle returns itself. An object returns the file handle it
    /// was opened through if that is still live; otherwise a new logical
    /// handle is minted and becomes the object's origin.
    pub fn file_of(&self, hid: Hid) -> Result<Hid> {
        let mut st = self.state.lock();
        let entry = st.entry(hid)?;
        let (kind, writable, origin) = (entry.kind, entry.writable, entry.origin);
        if kind == HandleKind::File {
            st.entry_mut(hid)?.refs += 1;
            return Ok(hid);
        }
        let phys = st.phys_of(hid)?;
        let origin = origin.filter(|o| {
            st.handles
                .get(o)
                .is_some_and(|h| h.kind == HandleKind::File && h.phys == Some(phys))
        });

        if let Some(fid) = origin {
            st.entry_mut(fid)?.refs += 1;
            return Ok(fid);
        }
        let degree = CloseDegree::from(st.file(phys)?.degree());
        let access = FileAccessProps::new().close_degree(degree);
        let fid = st.mint_file_handle(phys, writable, access);
        st.entry_mut(hid)?.origin = Some(fid);
        Ok(fid)
    }

    pub fn handle_kind(&self, hid: Hid) -> Result<HandleKind> {
        Ok(self.state.lock().entry(hid)?.kind)
    }

    pub fn is_valid(&self, hid: Hid) -> bool {
        self.state.lock().handles.contains_key(&hid)
    }

    pub fn ref_count(&self, hid: Hid) -> Result<u32> {
        Ok(self.state.lock().entry(hid)?.refs)
    }

    /// Adds a reference; the matching close call drops it again.
    pub fn inc_ref(&self, hid: Hid) -> Result<u32> {
        let mut st = self.state.lock();
        let entry = st.entry_mut(hid)?;
        entry.refs += 1;
        Ok(entry.refs)
    }

    /// Path of the object behind a group, dataset or named datatype handle,
    /// or the object an attribute is attached to.
    pub fn object_path(&self, hid: Hid) -> Result<String> {
        let st = self.state.lock();
        let entry = st.entry(hid)?;
        Ok(match &entry.body {
            HandleBody::Attribute { object, .. } => object.clone(),
            _ => entry.path().unwrap_or(crate::file::ROOT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{CreateMode, FileCreateProps};
    use tempfile::tempdir;

    #[test]
    fn file_of_reuses_live_origin() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = reg
            .create_file(
                dir.path().join("o.h5"),
                CreateMode::Truncate,
                &FileCreateProps::new(),
                &FileAccessProps::new(),
            )
            .unwrap();
        let gid = reg.create_group(fid, "g").unwrap();

        let owner = reg.file_of(gid).unwrap();

        assert_eq!(owner, fid);
        assert_eq!(reg.ref_count(fid).unwrap(), 2);
        reg.close_file(owner).unwrap();
        assert_eq!(reg.ref_count(fid).unwrap(), 1);
    }

    #[test]
    fn file_of_mints_after_weak_close() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = reg
            .create_file(
                dir.path().join("w.h5"),
                CreateMode::Truncate,
                &FileCreateProps::new(),
                &FileAccessProps::new().close_degree(CloseDegree::Weak),
            )
            .unwrap();
        let gid = reg.create_group(fid, "g").unwrap();
        reg.close_file(fid).unwrap();

        let owner = reg.file_of(gid).unwrap();

        assert_ne!(owner, fid);
        assert_eq!(reg.handle_kind(owner).unwrap(), HandleKind::File);
        assert_eq!(reg.file_of(gid).unwrap(), owner);
        reg.close_file(owner).unwrap();
        reg.close_file(owner).unwrap();
        reg.close_group(gid).unwrap();
        assert_eq!(reg.open_file_count(), 0);
    }

    #[test]
    fn listing_truncates_to_capacity() {
        let dir = tempdir().unwrap();
        let reg = Registry::new();
        let fid = reg
            .create_file(
                dir.path().join("l.h5"),
                CreateMode::Truncate,
                &FileCreateProps::new(),
                &FileAccessProps::new(),
            )
            .unwrap();
        let a = reg.create_group(fid, "a").unwrap();
        let b = reg.create_group(fid, "b").unwrap();

        let all = reg.open_object_ids(FileScope::All, ObjectMask::ALL, 10).unwrap();
        let two = reg
            .open_object_ids(FileScope::File(fid), ObjectMask::ALL, 2)
            .unwrap();
        let groups = reg
            .count_open_objects(FileScope::File(fid), ObjectMask::GROUP)
            .unwrap();

        assert_eq!(all, vec![fid, a, b]);
        assert_eq!(two, vec![fid, a]);
        assert_eq!(groups, 2);
        assert_eq!(reg.object_path(b).unwrap(), "/b");
    }
}
