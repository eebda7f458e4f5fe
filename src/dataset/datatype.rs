//! # Datatypes
//!
//! Element types are descriptive only: h5lite stores and returns raw element
//! bytes exactly as laid out by the datatype, with no conversion. A datatype
//! therefore only needs to know its byte size and, for compounds, where each
//! member lives.
//!
//! ```text
//! set_t (40 bytes)
//! ├── field1  @0   u32
//! ├── field2  @4   compound (20 bytes)
//! │   ├── a   @0   u32
//! │   ├── b   @4   compound { a u32, b u32, c u32 }
//! │   └── c   @16  u32
//! ├── field3  @24  f64
//! └── field4  @32  compound { a u32, b u32 }
//! ```

use eyre::Result;

use crate::encoding::{MetaReader, MetaWriter};
use crate::error::H5Error;

const TAG_INTEGER: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_COMPOUND: u8 = 3;

const MAX_NESTING: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Integer { size: usize, signed: bool },
    Float { size: usize },
    Compound { size: usize, fields: Vec<CompoundField> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundField {
    pub name: String,
    pub offset: usize,
    pub datatype: Datatype,
}

impl Datatype {
    pub fn u32() -> Self {
        Datatype::Integer { size: 4, signed: false }
    }

    pub fn i32() -> Self {
        Datatype::Integer { size: 4, signed: true }
    }

    pub fn u64() -> Self {
        Datatype::Integer { size: 8, signed: false }
    }

    pub fn i64() -> Self {
        Datatype::Integer { size: 8, signed: true }
    }

    pub fn f32() -> Self {
        Datatype::Float { size: 4 }
    }

    pub fn f64() -> Self {
        Datatype::Float { size: 8 }
    }

    pub fn compound(size: usize) -> CompoundBuilder {
        CompoundBuilder {
            size,
            fields: Vec::new(),
        }
    }

    /// Element byte size.
    pub fn size(&self) -> usize {
        match self {
            Datatype::Integer { size, .. } => *size,
            Datatype::Float { size } => *size,
            Datatype::Compound { size, .. } => *size,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Datatype::Compound { .. })
    }

    pub fn field(&self, name: &str) -> Option<&CompoundField> {
        match self {
            Datatype::Compound { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_depth(0)
    }

    fn validate_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(H5Error::InvalidArgument("compound nesting too deep".to_string()).into());
        }
        match self {
            Datatype::Integer { size, .. } => {
                if ![1, 2, 4, 8].contains(size) {
                    return Err(H5Error::InvalidArgument(format!("integer size {}", size)).into());
                }
            }
            Datatype::Float { size } => {
                if ![4, 8].contains(size) {
                    return Err(H5Error::InvalidArgument(format!("float size {}", size)).into());
                }
            }
            Datatype::Compound { size, fields } => {
                if *size == 0 {
                    return Err(H5Error::InvalidArgument("empty compound".to_string()).into());
                }
                for (i, f) in fields.iter().enumerate() {
                    f.datatype.validate_depth(depth + 1)?;
                    if f.offset + f.datatype.size() > *size {
                        return Err(H5Error::InvalidArgument(format!(
                            "field '{}' at {} overruns compound of {} bytes",
                            f.name, f.offset, size
                        ))
                        .into());
                    }
                    if fields[..i].iter().any(|g| g.name == f.name) {
                        return Err(H5Error::InvalidArgument(format!(
                            "duplicate field '{}'",
                            f.name
                        ))
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self, w: &mut MetaWriter) {
        match self {
            Datatype::Integer { size, signed } => {
                w.put_u8(TAG_INTEGER);
                w.put_u32(*size as u32);
                w.put_bool(*signed);
            }
            Datatype::Float { size } => {
                w.put_u8(TAG_FLOAT);
                w.put_u32(*size as u32);
            }
            Datatype::Compound { size, fields } => {
                w.put_u8(TAG_COMPOUND);
                w.put_u32(*size as u32);
                w.put_u32(fields.len() as u32);
                for f in fields {
                    w.put_str(&f.name);
                    w.put_u32(f.offset as u32);
                    f.datatype.encode(w);
                }
            }
        }
    }

    pub fn decode(r: &mut MetaReader<'_>) -> Result<Self> {
        let dt = Self::decode_depth(r, 0)?;
        dt.validate()
            .map_err(|e| H5Error::Corrupt(format!("invalid stored datatype: {}", e)))?;
        Ok(dt)
    }

    fn decode_depth(r: &mut MetaReader<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(H5Error::Corrupt("datatype nesting too deep".to_string()).into());
        }
        match r.u8("datatype tag")? {
            TAG_INTEGER => {
                let size = r.u32("integer size")? as usize;
                let signed = r.bool("integer sign")?;
                Ok(Datatype::Integer { size, signed })
            }
            TAG_FLOAT => Ok(Datatype::Float {
                size: r.u32("float size")? as usize,
            }),
            TAG_COMPOUND => {
                let size = r.u32("compound size")? as usize;
                let n = r.count("compound fields", 9)?;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = r.str("field name")?;
                    let offset = r.u32("field offset")? as usize;
                    let datatype = Self::decode_depth(r, depth + 1)?;
                    fields.push(CompoundField {
                        name,
                        offset,
                        datatype,
                    });
                }
                Ok(Datatype::Compound { size, fields })
            }
            other => Err(H5Error::Corrupt(format!("unknown datatype tag {}", other)).into()),
        }
    }
}

#[derive(Debug)]
pub struct CompoundBuilder {
    size: usize,
    fields: Vec<CompoundField>,
}

impl CompoundBuilder {
    pub fn field(mut self, name: &str, offset: usize, datatype: Datatype) -> Self {
        self.fields.push(CompoundField {
            name: name.to_string(),
            offset,
            datatype,
        });
        self
    }

    pub fn build(self) -> Result<Datatype> {
        let dt = Datatype::Compound {
            size: self.size,
            fields: self.fields,
        };
        dt.validate()?;
        Ok(dt)
    }
}
