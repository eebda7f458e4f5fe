//! # Object Catalog
//!
//! The catalog is the in-memory form of a file's object hierarchy. Every
//! object is keyed by its absolute path, so the tree is implied by path
//! prefixes:
//!
//! ```text
//! "/"                      Group
//! "/group"                 Group
//! "/group/dataset"         Dataset(DatasetRecord)   + attribute "attr"
//! "/group/type"            Datatype(Datatype)
//! ```
//!
//! A `BTreeMap` keeps siblings adjacent and makes "everything under /group"
//! a single range scan, which is what `unlink` needs to remove a subtree.
//!
//! ## Name Resolution
//!
//! Names are `/`-separated. A name starting with `/` is absolute; anything
//! else is resolved against the location's own path. Empty components are
//! ignored, `.` and `..` are rejected.

use std::collections::BTreeMap;
use std::ops::Bound;

use eyre::Result;

use crate::dataset::dataspace::{checked_byte_len, transfer_len};
use crate::dataset::{DatasetRecord, Dataspace, Datatype};
use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;

pub const ROOT: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    datatype: Datatype,
    space: Dataspace,
    value: Vec<u8>,
}

impl AttributeRecord {
    /// A zero-filled attribute of the given shape.
    pub fn new(datatype: Datatype, space: Dataspace) -> Result<Self> {
        datatype.validate()?;
        let len = transfer_len(space.dims(), datatype.size())?;
        Ok(Self {
            datatype,
            space,
            value: vec![0u8; len],
        })
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn dataspace(&self) -> &Dataspace {
        &self.space
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn set_value(&mut self, value: &[u8]) -> Result<()> {
        if value.len() != self.value.len() {
            return Err(H5Error::BufferSizeMismatch {
                expected: self.value.len(),
                actual: value.len(),
            }
            .into());
        }
        self.value.copy_from_slice(value);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Group,
    Dataset(DatasetRecord),
    Datatype(Datatype),
}

impl ObjectBody {
    fn tag(&self) -> u8 {
        match self {
            ObjectBody::Group => 0,
            ObjectBody::Dataset(_) => 1,
            ObjectBody::Datatype(_) => 2,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectBody::Group => "group",
            ObjectBody::Dataset(_) => "dataset",
            ObjectBody::Datatype(_) => "datatype",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    body: ObjectBody,
    attributes: BTreeMap<String, AttributeRecord>,
}

impl ObjectRecord {
    pub fn new(body: ObjectBody) -> Self {
        Self {
            body,
            attributes: BTreeMap::new(),
        }
    }

    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ObjectBody {
        &mut self.body
    }

    pub fn is_group(&self) -> bool {
        matches!(self.body, ObjectBody::Group)
    }

    pub fn attribute(&self, name: &str) -> Result<&AttributeRecord> {
        self.attributes
            .get(name)
            .ok_or_else(|| H5Error::NotFound(format!("attribute '{}'", name)).into())
    }

    pub fn attribute_mut(&mut self, name: &str) -> Result<&mut AttributeRecord> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| H5Error::NotFound(format!("attribute '{}'", name)).into())
    }

    pub fn add_attribute(&mut self, name: &str, attr: AttributeRecord) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(H5Error::InvalidArgument(format!("bad attribute name '{}'", name)).into());
        }
        if self.attributes.contains_key(name) {
            return Err(H5Error::AlreadyExists(format!("attribute '{}'", name)).into());
        }
        self.attributes.insert(name.to_string(), attr);
        Ok(())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    fn encode(&self, w: &mut MetaWriter) {
        w.put_u8(self.body.tag());
        match &self.body {
            ObjectBody::Group => {}
            ObjectBody::Dataset(rec) => rec.encode(w),
            ObjectBody::Datatype(dt) => dt.encode(w),
        }
        w.put_u32(self.attributes.len() as u32);
        for (name, attr) in &self.attributes {
            w.put_str(name);
            attr.datatype.encode(w);
            attr.space.encode(w);
            w.put_bytes(&attr.value);
        }
    }

    fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        let body = match r.u8("object tag")? {
            0 => ObjectBody::Group,
            1 => ObjectBody::Dataset(DatasetRecord::decode(r)?),
            2 => ObjectBody::Datatype(Datatype::decode(r)?),
            other => return Err(H5Error::Corrupt(format!("unknown object tag {}", other)).into()),
        };
        let mut record = Self::new(body);
        let n = r.count("attribute table", 4)?;
        for _ in 0..n {
            let name = r.str("attribute name")?;
            let datatype = Datatype::decode(r)?;
            let space = Dataspace::decode(r)?;
            let value = r.bytes("attribute value")?.to_vec();
            let expected = checked_byte_len(space.dims(), datatype.size());
            if expected != Some(value.len() as u64) {
                return Err(H5Error::Corrupt(format!(
                    "attribute '{}' holds {} bytes, expected {:?}",
                    name,
                    value.len(),
                    expected
                ))
                .into());
            }
            record.attributes.insert(
                name,
                AttributeRecord {
                    datatype,
                    space,
                    value,
                },
            );
        }
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    objects: BTreeMap<String, ObjectRecord>,
}

impl Default for Catalog {
    fn default() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(ROOT.to_string(), ObjectRecord::new(ObjectBody::Group));
        Self { objects }
    }
}

/// Resolves `name` against the location path `base` into a normalized
/// absolute path.
pub fn resolve_path(base: &str, name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(H5Error::InvalidArgument("empty object name".to_string()).into());
    }
    let start = if name.starts_with('/') { "" } else { base };
    let mut parts: Vec<&str> = Vec::new();
    for part in start.split('/').chain(name.split('/')) {
        match part {
            "" => {}
            "." | ".." => {
                return Err(H5Error::InvalidArgument(format!(
                    "'{}' components are not supported in '{}'",
                    part, name
                ))
                .into());
            }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Ok(ROOT.to_string());
    }
    let mut out = String::new();
    for p in parts {
        out.push('/');
        out.push_str(p);
    }
    Ok(out)
}

pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(i) => &path[..i],
    }
}

/// True when `path` is `root` itself or lies below it.
pub fn is_within(path: &str, root: &str) -> bool {
    if root == ROOT {
        return true;
    }
    path == root
        || (path.len() > root.len() && path.starts_with(root) && path.as_bytes()[root.len()] == b'/')
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Result<&ObjectRecord> {
        self.objects
            .get(path)
            .ok_or_else(|| H5Error::NotFound(path.to_string()).into())
    }

    pub fn get_mut(&mut self, path: &str) -> Result<&mut ObjectRecord> {
        self.objects
            .get_mut(path)
            .ok_or_else(|| H5Error::NotFound(path.to_string()).into())
    }

    pub fn dataset(&self, path: &str) -> Result<&DatasetRecord> {
        match self.get(path)?.body() {
            ObjectBody::Dataset(rec) => Ok(rec),
            other => Err(H5Error::InvalidArgument(format!(
                "'{}' is a {}, not a dataset",
                path,
                other.kind_name()
            ))
            .into()),
        }
    }

    pub fn dataset_mut(&mut self, path: &str) -> Result<&mut DatasetRecord> {
        match self.get_mut(path)?.body_mut() {
            ObjectBody::Dataset(rec) => Ok(rec),
            other => Err(H5Error::InvalidArgument(format!(
                "'{}' is a {}, not a dataset",
                path,
                other.kind_name()
            ))
            .into()),
        }
    }

    pub fn datatype(&self, path: &str) -> Result<&Datatype> {
        match self.get(path)?.body() {
            ObjectBody::Datatype(dt) => Ok(dt),
            other => Err(H5Error::InvalidArgument(format!(
                "'{}' is a {}, not a named datatype",
                path,
                other.kind_name()
            ))
            .into()),
        }
    }

    pub fn require_group(&self, path: &str) -> Result<()> {
        let rec = self.get(path)?;
        if !rec.is_group() {
            return Err(H5Error::InvalidArgument(format!(
                "'{}' is a {}, not a group",
                path,
                rec.body().kind_name()
            ))
            .into());
        }
        Ok(())
    }

    /// Inserts a new object. The parent must be an existing group.
    pub fn insert(&mut self, path: &str, record: ObjectRecord) -> Result<()> {
        if self.objects.contains_key(path) {
            return Err(H5Error::AlreadyExists(path.to_string()).into());
        }
        self.require_group(parent_path(path))?;
        self.objects.insert(path.to_string(), record);
        Ok(())
    }

    /// Removes `path` and everything below it, returning the removed records
    /// so their storage can be released.
    pub fn unlink(&mut self, path: &str) -> Result<Vec<(String, ObjectRecord)>> {
        if path == ROOT {
            return Err(H5Error::InvalidArgument("cannot unlink the root group".to_string()).into());
        }
        if !self.objects.contains_key(path) {
            return Err(H5Error::NotFound(path.to_string()).into());
        }
        let doomed: Vec<String> = self.paths_within(path).map(str::to_string).collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for p in doomed {
            if let Some(rec) = self.objects.remove(&p) {
                removed.push((p, rec));
            }
        }
        Ok(removed)
    }

    /// Paths equal to or below `root`, in key order.
    pub fn paths_within<'a>(&'a self, root: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.objects
            .range::<str, _>((Bound::Included(root), Bound::Unbounded))
            .map(|(p, _)| p.as_str())
            .take_while(move |p| p.starts_with(root))
            .filter(move |p| is_within(p, root))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectRecord)> {
        self.objects.iter().map(|(p, r)| (p.as_str(), r))
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &DatasetRecord)> {
        self.objects.iter().filter_map(|(p, r)| match r.body() {
            ObjectBody::Dataset(rec) => Some((p.as_str(), rec)),
            _ => None,
        })
    }

    pub fn encode(&self, w: &mut MetaWriter) {
        w.put_u32(self.objects.len() as u32);
        for (path, rec) in &self.objects {
            w.put_str(path);
            rec.encode(w);
        }
    }

    pub fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        let n = r.count("object table", 5)?;
        let mut objects = BTreeMap::new();
        for _ in 0..n {
            let path = r.str("object path")?;
            let rec = ObjectRecord::decode(r)?;
            if objects.insert(path.clone(), rec).is_some() {
                return Err(H5Error::Corrupt(format!("duplicate object path '{}'", path)).into());
            }
        }
        if !objects.get(ROOT).is_some_and(ObjectRecord::is_group) {
            return Err(H5Error::Corrupt("catalog has no root group".to_string()).into());
        }
        Ok(Self { objects })
    }
}
