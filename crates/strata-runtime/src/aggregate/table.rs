use crate::error::{RuntimeError, RuntimeResult};
use ahash::AHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use strata_expr::agg::{self, AggFunc};
use strata_expr::{Aggregator, ExprError};
use strata_vector::vector::{append_elem, BytesTable};
use strata_vector::{
    pick, BitVec, Builder, DynamicBuilder, RecordBuilder, Type, TypeContext, Value, Vector,
};

type KeyBuf = SmallVec<[u8; 32]>;

/// Group state for one combination of key types.
pub(crate) trait AggTable: Send + fmt::Debug {
    /// Adds one homogeneous batch: every key column and argument column has a single type.
    fn update(&mut self, keys: &[Vector], args: &[Vector]) -> RuntimeResult<()>;

    /// One record per group, or `None` when the table saw no rows.
    fn materialize(&mut self, ctx: &TypeContext, builder: &RecordBuilder) -> RuntimeResult<Option<Vector>>;
}

#[derive(Debug)]
struct Row {
    keys: Vec<Value>,
    funcs: Vec<Box<dyn AggFunc>>,
}

/// General table: groups by the concatenated encoding of the key columns.
#[derive(Debug)]
pub(crate) struct KeyedTable {
    aggs: Arc<[Arc<Aggregator>]>,
    key_types: Vec<Type>,
    partials_in: bool,
    partials_out: bool,
    index: AHashMap<KeyBuf, usize>,
    rows: Vec<Row>,
}

impl KeyedTable {
    pub(crate) fn new(
        aggs: Arc<[Arc<Aggregator>]>,
        key_types: Vec<Type>,
        partials_in: bool,
        partials_out: bool,
    ) -> Self {
        Self {
            aggs,
            key_types,
            partials_in,
            partials_out,
            index: AHashMap::new(),
            rows: Vec::new(),
        }
    }
}

/// Groups the slots of `keys` by key value, in order of first appearance.
fn group_slots(keys: &[Vector], len: u32) -> Vec<(KeyBuf, Vec<u32>)> {
    let mut groups: Vec<(KeyBuf, Vec<u32>)> = Vec::new();
    let mut which: AHashMap<KeyBuf, usize> = AHashMap::new();
    let mut buf = Vec::new();
    for slot in 0..len {
        buf.clear();
        keys.iter().for_each(|k| append_elem(k, slot, &mut buf));
        match which.get(buf.as_slice()) {
            Some(&g) => groups[g].1.push(slot),
            None => {
                let key = KeyBuf::from_slice(&buf);
                which.insert(key.clone(), groups.len());
                groups.push((key, vec![slot]));
            }
        }
    }
    groups
}

impl AggTable for KeyedTable {
    fn update(&mut self, keys: &[Vector], args: &[Vector]) -> RuntimeResult<()> {
        let len = keys.first().or(args.first()).map_or(0, Vector::len);
        let groups = group_slots(keys, len);
        let whole = groups.len() == 1;
        for (key, slots) in groups {
            let id = match self.index.get(&key) {
                Some(&id) => id,
                None => {
                    let id = self.rows.len();
                    self.rows.push(Row {
                        keys: keys.iter().map(|k| k.value_at(slots[0])).collect(),
                        funcs: self.aggs.iter().map(|a| a.new_func()).collect(),
                    });
                    self.index.insert(key, id);
                    id
                }
            };
            let row = &mut self.rows[id];
            for (f, arg) in row.funcs.iter_mut().zip(args) {
                let arg = if whole { arg.clone() } else { pick(arg, &slots) };
                if self.partials_in {
                    agg::consume_partial(f.as_mut(), &arg)?;
                } else {
                    agg::consume(f.as_mut(), &arg);
                }
            }
        }
        Ok(())
    }

    fn materialize(&mut self, ctx: &TypeContext, builder: &RecordBuilder) -> RuntimeResult<Option<Vector>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let mut cols = Vec::with_capacity(self.key_types.len() + self.aggs.len());
        for (i, ty) in self.key_types.iter().enumerate() {
            let mut b = Builder::new(ty);
            self.rows.iter().for_each(|row| b.write(row.keys[i].bytes()));
            cols.push(b.build());
        }
        for i in 0..self.aggs.len() {
            let mut b = DynamicBuilder::new();
            for row in &mut self.rows {
                let f = &mut row.funcs[i];
                let v = if self.partials_out {
                    f.result_as_partial(ctx)
                } else {
                    f.result(ctx)
                };
                b.write(&v);
            }
            cols.push(b.build());
        }
        self.rows.clear();
        self.index.clear();
        Ok(Some(builder.build(ctx, &cols)?))
    }
}

/// `count()` grouped by one string key.
#[derive(Debug, Default)]
pub(crate) struct CountByString {
    partials_in: bool,
    index: AHashMap<Vec<u8>, usize>,
    counts: Vec<(Vec<u8>, u64)>,
    nulls: u64,
}

impl CountByString {
    pub(crate) fn new(partials_in: bool) -> Self {
        Self {
            partials_in,
            ..Self::default()
        }
    }

    fn add(&mut self, key: &[u8], n: u64) {
        match self.index.get(key) {
            Some(&k) => self.counts[k].1 += n,
            None => {
                self.index.insert(key.to_vec(), self.counts.len());
                self.counts.push((key.to_vec(), n));
            }
        }
    }

    fn count(&mut self, keys: &Vector) {
        match keys.under() {
            Vector::String(s) => {
                for slot in 0..s.len() {
                    if s.nulls.value(slot) {
                        self.nulls += 1;
                    } else {
                        self.add(s.value(slot), 1);
                    }
                }
            }
            Vector::Dict(d) => match d.inner.under() {
                Vector::String(s) => {
                    for (k, &n) in d.counts.iter().enumerate() {
                        if n > 0 {
                            self.add(s.value(k as u32), u64::from(n));
                        }
                    }
                    self.nulls += u64::from(d.nulls.true_count());
                }
                _ => self.count_values(keys),
            },
            Vector::View(v) => match v.inner.under() {
                Vector::String(s) => {
                    for &slot in &v.index {
                        if s.nulls.value(slot) {
                            self.nulls += 1;
                        } else {
                            self.add(s.value(slot), 1);
                        }
                    }
                }
                _ => self.count_values(keys),
            },
            Vector::Const(c) => match c.value.bytes() {
                Some(bytes) => {
                    let nulls = c.nulls.true_count();
                    self.nulls += u64::from(nulls);
                    self.add(bytes, u64::from(c.len - nulls));
                }
                None => self.nulls += u64::from(c.len),
            },
            _ => self.count_values(keys),
        }
    }

    fn count_values(&mut self, keys: &Vector) {
        for slot in 0..keys.len() {
            match keys.value_at(slot).bytes() {
                Some(bytes) => self.add(bytes, 1),
                None => self.nulls += 1,
            }
        }
    }

    fn count_partials(&mut self, keys: &Vector, counts: &Vector) -> RuntimeResult<()> {
        let Vector::Uint(counts) = counts.under() else {
            return Err(ExprError::InvalidPartial("count".to_string()).into());
        };
        for slot in 0..keys.len() {
            if counts.nulls.value(slot) {
                continue;
            }
            let n = counts.value(slot);
            match keys.value_at(slot).bytes() {
                Some(bytes) => self.add(bytes, n),
                None => self.nulls += n,
            }
        }
        Ok(())
    }
}

impl AggTable for CountByString {
    fn update(&mut self, keys: &[Vector], args: &[Vector]) -> RuntimeResult<()> {
        let [keys] = keys else {
            return Err(RuntimeError::InvalidOperator(
                "count by string: expected one key".to_string(),
            ));
        };
        if self.partials_in {
            let Some(counts) = args.first() else {
                return Err(ExprError::InvalidPartial("count".to_string()).into());
            };
            return self.count_partials(keys, counts);
        }
        self.count(keys);
        Ok(())
    }

    fn materialize(&mut self, ctx: &TypeContext, builder: &RecordBuilder) -> RuntimeResult<Option<Vector>> {
        if self.counts.is_empty() && self.nulls == 0 {
            return Ok(None);
        }
        let mut table = BytesTable::with_capacity(self.counts.len() + 1);
        let mut counts = Vec::with_capacity(self.counts.len() + 1);
        for (key, n) in self.counts.drain(..) {
            table.push(&key);
            counts.push(n);
        }
        let mut nulls = BitVec::zero();
        if self.nulls > 0 {
            table.push(&[]);
            counts.push(self.nulls);
            nulls = BitVec::from_positions(counts.len(), &[counts.len() as u32 - 1]);
        }
        self.index.clear();
        self.nulls = 0;
        let keys = Vector::string(table, nulls);
        let counts = Vector::uint(Type::Uint64, counts, BitVec::zero());
        Ok(Some(builder.build(ctx, &[keys, counts])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{col, query, show};
    use pretty_assertions::assert_eq;

    fn count_star() -> Arc<[Arc<Aggregator>]> {
        Arc::from(vec![Arc::new(Aggregator::new("count", false, None, None).unwrap())])
    }

    fn builder() -> RecordBuilder {
        RecordBuilder::new(&[vec!["k".to_string()], vec!["count".to_string()]]).unwrap()
    }

    #[test]
    fn string_fast_path_handles_every_encoding() {
        let ctx = query();
        let mut t = CountByString::new(false);
        let flat = col(&ctx, "\"a\" \"b\" null::string \"a\"");
        t.update(&[flat.clone()], &[]).unwrap();
        t.update(&[Vector::view(flat, vec![1, 1])], &[]).unwrap();
        t.update(
            &[Vector::constant(Value::string("c"), 3, BitVec::zero())],
            &[],
        )
        .unwrap();
        let out = t.materialize(&ctx.types, &builder()).unwrap().unwrap();
        assert_eq!(show(&out), [
            "{k:\"a\",count:2::uint64}",
            "{k:\"b\",count:3::uint64}",
            "{k:\"c\",count:3::uint64}",
            "{k:null,count:1::uint64}",
        ]);
        assert!(t.materialize(&ctx.types, &builder()).unwrap().is_none());
    }

    #[test]
    fn string_partials_merge_counts() {
        let ctx = query();
        let mut t = CountByString::new(true);
        let keys = col(&ctx, "\"a\" null::string \"a\"");
        let counts = col(&ctx, "2::uint64 5::uint64 1::uint64");
        t.update(&[keys.clone()], &[counts]).unwrap();
        let out = t.materialize(&ctx.types, &builder()).unwrap().unwrap();
        assert_eq!(show(&out), ["{k:\"a\",count:3::uint64}", "{k:null,count:5::uint64}"]);
        let bad = t.update(&[keys], &[col(&ctx, "1 2 3")]);
        assert!(matches!(bad, Err(RuntimeError::Expr(_))));
    }

    #[test]
    fn keyed_table_groups_in_first_seen_order() {
        let ctx = query();
        let mut t = KeyedTable::new(count_star(), vec![Type::Int64], false, false);
        let keys = col(&ctx, "3 1 3 3");
        let args = Vector::constant(Value::bool(true), 4, BitVec::zero());
        t.update(&[keys], &[args]).unwrap();
        let out = t.materialize(&ctx.types, &builder()).unwrap().unwrap();
        assert_eq!(show(&out), ["{k:3,count:3::uint64}", "{k:1,count:1::uint64}"]);
    }
}
