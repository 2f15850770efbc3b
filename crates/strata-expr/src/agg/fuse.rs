use super::{invalid_partial, AggFunc};
use crate::ExprResult;
use strata_vector::{nulls_of, Field, Type, TypeContext, Value, Vector};

/// Merges two types into one that can hold values of either. Records merge field by field
/// (fields keep first-seen order); anything else that differs becomes a union.
pub(crate) fn fuse_types(ctx: &TypeContext, a: &Type, b: &Type) -> Type {
    if a == b || b.is_null() {
        return a.clone();
    }
    if a.is_null() {
        return b.clone();
    }
    if let (Type::Record(ra), Type::Record(rb)) = (a, b) {
        let mut fields: Vec<Field> = ra.fields().to_vec();
        for f in rb.fields() {
            match fields.iter_mut().find(|g| g.name == f.name) {
                Some(g) => g.ty = fuse_types(ctx, &g.ty, &f.ty),
                None => fields.push(f.clone()),
            }
        }
        if let Ok(ty) = ctx.lookup_record(fields) {
            return ty;
        }
    }
    let mut members = Vec::new();
    for t in [a, b] {
        match t {
            Type::Union(u) => members.extend(u.types().iter().cloned()),
            t => members.push(t.clone()),
        }
    }
    ctx.lookup_union(&members)
}

/// `fuse`: the type value of the fusion of every input type.
#[derive(Debug, Default)]
pub(crate) struct Fuse {
    shapes: Vec<Type>,
    /// Encoded type values from partials; decoded against the result's context.
    partials: Vec<Vec<u8>>,
}

impl AggFunc for Fuse {
    fn consume(&mut self, v: &Vector) {
        let ty = v.ty();
        if !self.shapes.contains(&ty) {
            self.shapes.push(ty);
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        if !matches!(partial.ty().under(), Type::TypeValue) {
            return Err(invalid_partial("fuse"));
        }
        let nulls = nulls_of(partial);
        for i in (0..partial.len()).filter(|&i| !nulls.value(i)) {
            if let Some(bytes) = partial.value_at(i).bytes() {
                self.partials.push(bytes.to_vec());
            }
        }
        Ok(())
    }

    fn result(&mut self, ctx: &TypeContext) -> Value {
        let mut types = Vec::new();
        for bytes in &self.partials {
            match ctx.lookup_by_value(bytes) {
                Ok(ty) => types.push(ty),
                Err(err) => log::warn!("fuse: dropping undecodable partial: {err}"),
            }
        }
        types.extend(self.shapes.iter().cloned());
        let Some(first) = types.first() else {
            return Value::null(Type::TypeValue);
        };
        let fused = types[1..]
            .iter()
            .fold(first.clone(), |acc, t| fuse_types(ctx, &acc, t));
        Value::type_value(&fused)
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
    fn records_fuse_field_by_field() {
        let ctx = TypeContext::new();
        let out = aggregate(&ctx, "fuse", &["{a:1}", "{b:\"x\"} {a:\"y\"}"]);
        assert_eq!(out, "<{a:(int64,string),b:string}>");
        assert_eq!(aggregate(&ctx, "fuse", &["{a:1}", "{a:null}"]), "<{a:int64}>");
    }

    #[test]
    fn fuse_merges_partials() {
        let ctx = TypeContext::new();
        let out = aggregate_split(&ctx, "fuse", &["{a:1}", "{b:2}", "{a:3}"]);
        assert_eq!(out, "<{a:int64,b:int64}>");
    }
}
