use super::{invalid_partial, list_value, AggFunc};
use crate::order::compare_values;
use crate::ExprResult;
use ahash::AHashSet;
use strata_vector::{nulls_of, Type, TypeContext, Value, Vector};

/// `collect` gathers non-null values into an array in arrival order; `union` gathers the
/// distinct ones into a set. Error values are skipped.
#[derive(Debug)]
pub(crate) struct Collect {
    set: bool,
    seen: AHashSet<Vec<u8>>,
    values: Vec<Value>,
}

impl Collect {
    pub(crate) fn new(set: bool) -> Self {
        Self {
            set,
            seen: AHashSet::new(),
            values: Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        if self.set {
            "union"
        } else {
            "collect"
        }
    }

    fn push(&mut self, v: Value) {
        if v.is_null() || v.is_error() {
            return;
        }
        if self.set {
            let mut key = v.ty().id().to_le_bytes().to_vec();
            key.extend_from_slice(v.bytes().unwrap_or_default());
            if !self.seen.insert(key) {
                return;
            }
        }
        self.values.push(v);
    }
}

impl AggFunc for Collect {
    fn consume(&mut self, v: &Vector) {
        if v.ty().is_error() {
            return;
        }
        let nulls = nulls_of(v);
        for i in (0..v.len()).filter(|&i| !nulls.value(i)) {
            self.push(v.value_at(i));
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        for row in partial.values() {
            if row.is_null() {
                continue;
            }
            if !matches!(row.ty().under(), Type::Array(_) | Type::Set(_)) {
                return Err(invalid_partial(self.name()));
            }
            for elem in row.elements() {
                self.push(elem);
            }
        }
        Ok(())
    }

    fn result(&mut self, ctx: &TypeContext) -> Value {
        if self.set {
            self.values.sort_by(compare_values);
        }
        list_value(ctx, &self.values, self.set)
    }

    fn result_as_partial(&mut self, ctx: &TypeContext) -> Value {
        self.result(ctx)
    }
}

#[cfg(test)]
mod tests {
    use crate::agg::test_support::{aggregate, aggregate_split};
    use pretty_assertions::assert_eq;
    use strata_vector::TypeContext;

    #[test]
    fn collect_keeps_order_and_duplicates() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "collect", &["3 null 1", "3"]), "[3,1,3]");
        assert_eq!(aggregate(&ctx, "collect", &["null"]), "null");
        assert_eq!(aggregate_split(&ctx, "collect", &["1", "2", "3"]), "[1,3,2]");
    }

    #[test]
    fn union_dedups_into_a_sorted_set() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "union", &["3 1", "3 2"]), "|[1,2,3]|");
        let batches = ["\"b\"", "\"a\"", "\"b\""];
        assert_eq!(aggregate_split(&ctx, "union", &batches), "|[\"a\",\"b\"]|");
    }
}
