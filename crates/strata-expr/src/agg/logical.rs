use super::{invalid_partial, AggFunc};
use crate::access::flatten_bool;
use crate::ExprResult;
use strata_vector::{nulls_of, Type, TypeContext, Value, Vector};

/// `and` / `or` over bools; other types are skipped and all-null input gives a null bool.
#[derive(Debug)]
pub(crate) struct Logical {
    is_and: bool,
    val: Option<bool>,
}

impl Logical {
    pub(crate) fn and() -> Self {
        Self { is_and: true, val: None }
    }

    pub(crate) fn or() -> Self {
        Self { is_and: false, val: None }
    }

    fn name(&self) -> &'static str {
        if self.is_and {
            "and"
        } else {
            "or"
        }
    }
}

impl AggFunc for Logical {
    fn consume(&mut self, v: &Vector) {
        if !matches!(v.ty().under(), Type::Bool) {
            return;
        }
        let Some((bits, nulls)) = flatten_bool(v) else {
            return;
        };
        for i in (0..v.len()).filter(|&i| !nulls.value(i)) {
            let b = bits.value(i);
            let acc = self.val.unwrap_or(self.is_and);
            self.val = Some(if self.is_and { acc && b } else { acc || b });
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        if !matches!(partial.ty().under(), Type::Bool) {
            return Err(invalid_partial(self.name()));
        }
        self.consume(partial);
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        self.val.map_or_else(|| Value::null(Type::Bool), Value::bool)
    }

    fn result_as_partial(&mut self, ctx: &TypeContext) -> Value {
        self.result(ctx)
    }
}

/// The first non-null value seen.
#[derive(Debug, Default)]
pub(crate) struct AnyValue {
    val: Option<Value>,
}

impl AggFunc for AnyValue {
    fn consume(&mut self, v: &Vector) {
        if matches!(&self.val, Some(val) if !val.is_null()) {
            return;
        }
        let nulls = nulls_of(v);
        match (0..v.len()).find(|&i| !nulls.value(i)) {
            Some(i) => self.val = Some(v.value_at(i)),
            None if self.val.is_none() && v.len() > 0 => self.val = Some(Value::null(v.ty())),
            None => {}
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        self.consume(partial);
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        self.val.clone().unwrap_or_else(Value::null_value)
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
    fn and_or_skip_nulls() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "and", &["true null", "true"]), "true");
        assert_eq!(aggregate(&ctx, "and", &["true", "false"]), "false");
        assert_eq!(aggregate(&ctx, "or", &["false 1", "null"]), "false");
        assert_eq!(aggregate(&ctx, "or", &["null"]), "null");
        assert_eq!(aggregate_split(&ctx, "or", &["false", "true", "false"]), "true");
    }

    #[test]
    fn any_keeps_first_non_null() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "any", &["null", "\"a\" 2"]), "\"a\"");
        assert_eq!(aggregate(&ctx, "any", &["3", "4"]), "3");
    }
}
