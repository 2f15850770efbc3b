use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Version written into every trailer.
pub(crate) const FORMAT_VERSION: u32 = 1;

/// A byte range of the object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub values: Arc<Metadata>,
}

/// One node of an object's metadata tree.
///
/// `ty` fields hold canonical type encodings. `len` is the number of rows the node stores.
/// Values are stored only for rows that are not null at any enclosing [`Metadata::Nulls`]
/// level, so a node under a `Nulls` stores fewer rows than its row space has.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Record {
        ty: Vec<u8>,
        fields: Vec<FieldMeta>,
        len: u32,
    },
    Array {
        ty: Vec<u8>,
        lengths: Segment,
        values: Arc<Metadata>,
        len: u32,
    },
    Set {
        ty: Vec<u8>,
        lengths: Segment,
        values: Arc<Metadata>,
        len: u32,
    },
    Map {
        ty: Vec<u8>,
        lengths: Segment,
        keys: Arc<Metadata>,
        values: Arc<Metadata>,
        len: u32,
    },
    /// `members[k]` is the type of child `k`; tags index the children.
    Union {
        ty: Vec<u8>,
        members: Vec<Vec<u8>>,
        tags: Segment,
        values: Vec<Arc<Metadata>>,
        len: u32,
    },
    Dict {
        index: Segment,
        counts: Segment,
        values: Arc<Metadata>,
        len: u32,
    },
    Int {
        ty: Vec<u8>,
        segment: Segment,
        len: u32,
    },
    Uint {
        ty: Vec<u8>,
        segment: Segment,
        len: u32,
    },
    Float {
        ty: Vec<u8>,
        segment: Segment,
        len: u32,
    },
    Primitive {
        ty: Vec<u8>,
        segment: Segment,
        len: u32,
    },
    Const {
        ty: Vec<u8>,
        value: Option<Vec<u8>>,
        len: u32,
    },
    Named {
        ty: Vec<u8>,
        values: Arc<Metadata>,
    },
    Error {
        ty: Vec<u8>,
        values: Arc<Metadata>,
    },
    /// Run lengths alternate between non-null and null rows, starting with non-null.
    Nulls {
        runs: Segment,
        count: u32,
        values: Arc<Metadata>,
    },
    Dynamic {
        tags: Segment,
        values: Vec<Arc<Metadata>>,
        len: u32,
    },
}

impl Metadata {
    /// Rows of the node: for `Nulls`, the rows including the nulls at its level.
    pub fn len(&self) -> u32 {
        match self {
            Metadata::Record { len, .. }
            | Metadata::Array { len, .. }
            | Metadata::Set { len, .. }
            | Metadata::Map { len, .. }
            | Metadata::Union { len, .. }
            | Metadata::Dict { len, .. }
            | Metadata::Int { len, .. }
            | Metadata::Uint { len, .. }
            | Metadata::Float { len, .. }
            | Metadata::Primitive { len, .. }
            | Metadata::Const { len, .. }
            | Metadata::Dynamic { len, .. } => *len,
            Metadata::Named { values, .. } | Metadata::Error { values, .. } => values.len(),
            Metadata::Nulls { count, values, .. } => values.len() + count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Metadata::Record { .. } => "record",
            Metadata::Array { .. } => "array",
            Metadata::Set { .. } => "set",
            Metadata::Map { .. } => "map",
            Metadata::Union { .. } => "union",
            Metadata::Dict { .. } => "dict",
            Metadata::Int { .. } => "int",
            Metadata::Uint { .. } => "uint",
            Metadata::Float { .. } => "float",
            Metadata::Primitive { .. } => "primitive",
            Metadata::Const { .. } => "const",
            Metadata::Named { .. } => "named",
            Metadata::Error { .. } => "error",
            Metadata::Nulls { .. } => "nulls",
            Metadata::Dynamic { .. } => "dynamic",
        }
    }

    /// Every type encoding in the tree, outermost first.
    pub(crate) fn types(&self, out: &mut Vec<Vec<u8>>) {
        match self {
            Metadata::Record { ty, fields, .. } => {
                out.push(ty.clone());
                for f in fields {
                    f.values.types(out);
                }
            }
            Metadata::Array { ty, values, .. } | Metadata::Set { ty, values, .. } => {
                out.push(ty.clone());
                values.types(out);
            }
            Metadata::Map {
                ty, keys, values, ..
            } => {
                out.push(ty.clone());
                keys.types(out);
                values.types(out);
            }
            Metadata::Union {
                ty,
                members,
                values,
                ..
            } => {
                out.push(ty.clone());
                out.extend(members.iter().cloned());
                for v in values {
                    v.types(out);
                }
            }
            Metadata::Int { ty, .. }
            | Metadata::Uint { ty, .. }
            | Metadata::Float { ty, .. }
            | Metadata::Primitive { ty, .. }
            | Metadata::Const { ty, .. } => out.push(ty.clone()),
            Metadata::Named { ty, values } | Metadata::Error { ty, values } => {
                out.push(ty.clone());
                values.types(out);
            }
            Metadata::Dict { values, .. } | Metadata::Nulls { values, .. } => values.types(out),
            Metadata::Dynamic { values, .. } => {
                for v in values {
                    v.types(out);
                }
            }
        }
    }
}

/// The JSON document at the end of an object.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Trailer {
    pub version: u32,
    pub root: Arc<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nodes_serialize_with_a_kind_tag() {
        let leaf = Arc::new(Metadata::Int {
            ty: vec![7],
            segment: Segment {
                offset: 0,
                length: 3,
            },
            len: 3,
        });
        let meta = Metadata::Nulls {
            runs: Segment::default(),
            count: 2,
            values: leaf,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "nulls");
        assert_eq!(json["values"]["kind"], "int");
        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.len(), 5);
    }
}
