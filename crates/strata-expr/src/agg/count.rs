use super::{invalid_partial, AggFunc};
use crate::access::uints;
use crate::ExprResult;
use strata_vector::{nulls_of, Type, TypeContext, Value, Vector};

/// Counts non-null values.
#[derive(Debug, Default)]
pub(crate) struct Count {
    count: u64,
}

impl AggFunc for Count {
    fn consume(&mut self, v: &Vector) {
        if let Vector::Const(c) = v.under() {
            if c.value.is_null() {
                return;
            }
        }
        let nulls = nulls_of(v);
        self.count += u64::from(v.len() - nulls.true_count());
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        if !matches!(partial.ty().under(), Type::Uint64) {
            return Err(invalid_partial("count"));
        }
        let slots = uints(partial).ok_or_else(|| invalid_partial("count"))?;
        let nulls = nulls_of(partial);
        for i in (0..partial.len()).filter(|&i| !nulls.value(i)) {
            self.count += slots.get(i as usize);
        }
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        Value::uint64(self.count)
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
    fn counts_non_null_values() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "count", &["1 null \"a\"", "{x:1}"]), "3::uint64");
        assert_eq!(aggregate(&ctx, "count", &["null null"]), "0::uint64");
        assert_eq!(aggregate_split(&ctx, "count", &["1 2", "3", "4 5 6"]), "6::uint64");
    }
}
