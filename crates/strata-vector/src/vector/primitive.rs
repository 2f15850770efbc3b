use crate::bitmap::BitVec;
use crate::types::Type;
use crate::value::Net;
use std::net::{IpAddr, Ipv4Addr};

fn zero_nulls<T: Default>(values: &mut [T], nulls: &BitVec) {
    for slot in nulls.ones() {
        if let Some(v) = values.get_mut(slot as usize) {
            *v = T::default();
        }
    }
}

/// Signed integers of any width (plus durations and times), widened to `i64`.
#[derive(Clone, Debug)]
pub struct IntVector {
    pub ty: Type,
    pub values: Vec<i64>,
    pub nulls: BitVec,
}

impl IntVector {
    pub fn new(ty: Type, mut values: Vec<i64>, nulls: BitVec) -> Self {
        zero_nulls(&mut values, &nulls);
        Self { ty, values, nulls }
    }

    pub fn value(&self, slot: u32) -> i64 {
        self.values[slot as usize]
    }
}

#[derive(Clone, Debug)]
pub struct UintVector {
    pub ty: Type,
    pub values: Vec<u64>,
    pub nulls: BitVec,
}

impl UintVector {
    pub fn new(ty: Type, mut values: Vec<u64>, nulls: BitVec) -> Self {
        zero_nulls(&mut values, &nulls);
        Self { ty, values, nulls }
    }

    pub fn value(&self, slot: u32) -> u64 {
        self.values[slot as usize]
    }
}

#[derive(Clone, Debug)]
pub struct FloatVector {
    pub ty: Type,
    pub values: Vec<f64>,
    pub nulls: BitVec,
}

impl FloatVector {
    pub fn new(ty: Type, mut values: Vec<f64>, nulls: BitVec) -> Self {
        zero_nulls(&mut values, &nulls);
        Self { ty, values, nulls }
    }

    pub fn value(&self, slot: u32) -> f64 {
        self.values[slot as usize]
    }
}

#[derive(Clone, Debug)]
pub struct BoolVector {
    pub bits: BitVec,
    pub nulls: BitVec,
}

impl BoolVector {
    pub fn new(bits: BitVec, nulls: BitVec) -> Self {
        let bits = if nulls.any() {
            BitVec::and_not(&bits, &nulls)
        } else {
            bits
        };
        Self { bits, nulls }
    }

    pub fn value(&self, slot: u32) -> bool {
        self.bits.get(slot as usize)
    }
}

/// Offsets plus a shared byte buffer; slot `i` spans `offsets[i]..offsets[i+1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesTable {
    pub offsets: Vec<u32>,
    pub bytes: Vec<u8>,
}

impl BytesTable {
    pub fn new(offsets: Vec<u32>, bytes: Vec<u8>) -> Self {
        debug_assert!(!offsets.is_empty(), "offsets must have len+1 entries");
        Self { offsets, bytes }
    }

    pub fn with_capacity(n: usize) -> Self {
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        Self {
            offsets,
            bytes: Vec::new(),
        }
    }

    /// A table of `n` empty entries.
    pub fn empty(n: usize) -> Self {
        Self {
            offsets: vec![0; n + 1],
            bytes: Vec::new(),
        }
    }

    pub fn from_strs<'a>(values: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut table = Self::with_capacity(0);
        for v in values {
            table.push(v);
        }
        table
    }

    pub fn push(&mut self, value: &[u8]) {
        self.bytes.extend_from_slice(value);
        self.offsets.push(self.bytes.len() as u32);
    }

    pub fn len(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, slot: u32) -> &[u8] {
        let slot = slot as usize;
        &self.bytes[self.offsets[slot] as usize..self.offsets[slot + 1] as usize]
    }

    pub fn str(&self, slot: u32) -> &str {
        std::str::from_utf8(self.value(slot)).unwrap_or("")
    }
}

/// Shared layout for string, bytes and type-value columns.
#[derive(Clone, Debug)]
pub struct BytesVector {
    pub table: BytesTable,
    pub nulls: BitVec,
}

impl BytesVector {
    pub fn new(table: BytesTable, nulls: BitVec) -> Self {
        Self { table, nulls }
    }

    pub fn value(&self, slot: u32) -> &[u8] {
        self.table.value(slot)
    }

    pub fn str(&self, slot: u32) -> &str {
        self.table.str(slot)
    }

    pub fn len(&self) -> u32 {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

pub(crate) const UNSPECIFIED_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

pub(crate) fn zero_net() -> Net {
    Net::new(UNSPECIFIED_IP, 0).unwrap_or_else(|| unreachable!("prefix 0 is always valid"))
}

#[derive(Clone, Debug)]
pub struct IpVector {
    pub values: Vec<IpAddr>,
    pub nulls: BitVec,
}

impl IpVector {
    pub fn new(mut values: Vec<IpAddr>, nulls: BitVec) -> Self {
        for slot in nulls.ones() {
            values[slot as usize] = UNSPECIFIED_IP;
        }
        Self { values, nulls }
    }
}

#[derive(Clone, Debug)]
pub struct NetVector {
    pub values: Vec<Net>,
    pub nulls: BitVec,
}

impl NetVector {
    pub fn new(mut values: Vec<Net>, nulls: BitVec) -> Self {
        for slot in nulls.ones() {
            values[slot as usize] = zero_net();
        }
        Self { values, nulls }
    }
}

/// Indexes into the symbol list of an enum type.
#[derive(Clone, Debug)]
pub struct EnumVector {
    pub ty: Type,
    pub values: Vec<u64>,
    pub nulls: BitVec,
}

impl EnumVector {
    pub fn new(ty: Type, mut values: Vec<u64>, nulls: BitVec) -> Self {
        zero_nulls(&mut values, &nulls);
        Self { ty, values, nulls }
    }
}
