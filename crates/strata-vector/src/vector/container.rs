use super::dynamic::DynamicVector;
use super::Vector;
use crate::bitmap::BitVec;
use crate::types::Type;
use std::sync::Arc;

/// Arrays and sets: `offsets` has `len + 1` entries delimiting ranges of `values`.
#[derive(Clone, Debug)]
pub struct ArrayVector {
    pub ty: Type,
    pub offsets: Vec<u32>,
    pub values: Vector,
    pub nulls: BitVec,
}

impl ArrayVector {
    pub fn new(ty: Type, offsets: Vec<u32>, values: Vector, nulls: BitVec) -> Self {
        debug_assert!(!offsets.is_empty(), "offsets must have len+1 entries");
        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "offsets must ascend");
        Self {
            ty,
            offsets,
            values,
            nulls,
        }
    }

    pub fn len(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self, slot: u32) -> (u32, u32) {
        (
            self.offsets[slot as usize],
            self.offsets[slot as usize + 1],
        )
    }
}

#[derive(Clone, Debug)]
pub struct MapVector {
    pub ty: Type,
    pub offsets: Vec<u32>,
    pub keys: Vector,
    pub values: Vector,
    pub nulls: BitVec,
}

impl MapVector {
    pub fn new(ty: Type, offsets: Vec<u32>, keys: Vector, values: Vector, nulls: BitVec) -> Self {
        debug_assert!(!offsets.is_empty(), "offsets must have len+1 entries");
        Self {
            ty,
            offsets,
            keys,
            values,
            nulls,
        }
    }

    pub fn len(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self, slot: u32) -> (u32, u32) {
        (
            self.offsets[slot as usize],
            self.offsets[slot as usize + 1],
        )
    }
}

#[derive(Clone, Debug)]
pub struct RecordVector {
    pub ty: Type,
    pub fields: Vec<Vector>,
    pub len: u32,
    pub nulls: BitVec,
}

impl RecordVector {
    pub fn new(ty: Type, fields: Vec<Vector>, len: u32, nulls: BitVec) -> Self {
        debug_assert!(
            fields.iter().all(|f| f.len() == len),
            "record fields must match the record length"
        );
        Self {
            ty,
            fields,
            len,
            nulls,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Vector> {
        let rec = self.ty.as_record()?;
        rec.index_of(name).map(|k| &self.fields[k])
    }
}

/// A union column. `dynamic.values[k]` holds the members of tag `k`; when the union has null
/// slots an extra trailing child holds a const null of the union type.
#[derive(Clone, Debug)]
pub struct UnionVector {
    pub ty: Type,
    pub dynamic: Arc<DynamicVector>,
    pub nulls: BitVec,
}

impl UnionVector {
    pub fn new(ty: Type, tags: Vec<u32>, values: Vec<Vector>, nulls: BitVec) -> Self {
        Self {
            ty,
            dynamic: Arc::new(DynamicVector::new(tags, values)),
            nulls,
        }
    }

    pub fn tags(&self) -> &[u32] {
        &self.dynamic.tags
    }

    pub fn values(&self) -> &[Vector] {
        &self.dynamic.values
    }

    /// Number of declared member types.
    pub fn member_count(&self) -> usize {
        match self.ty.under() {
            Type::Union(u) => u.types().len(),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NamedVector {
    pub ty: Type,
    pub inner: Vector,
}

#[derive(Clone, Debug)]
pub struct ErrorVector {
    pub ty: Type,
    pub inner: Vector,
    pub nulls: BitVec,
}
