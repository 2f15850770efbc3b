//! Built-in scalar functions.
//!
//! Every built-in is a [`FunctionSpec`] registered with [`inventory::submit!`] from one of the
//! `builtins_*` modules and looked up by name through [`lookup_function`]. A [`Call`] evaluates
//! its arguments and hands homogeneous slices of them to the implementation via
//! [`strata_vector::apply`], so implementations only ever see one type per argument.
//!
//! Argument-count checks happen when a call is built; type errors are per-row error values.

use crate::access::ByteSlots;
use crate::udf::Udf;
use crate::{Evaluator, Expr, ExprError, ExprResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use strata_vector::{apply, combine, BitVec, DynamicBuilder, Type, TypeContext, Value, Vector};

mod builtins_bytes;
mod builtins_errors;
mod builtins_math;
mod builtins_net;
mod builtins_regexp;
mod builtins_text;
mod builtins_time;
mod builtins_types;

/// Arity marker for functions taking any number of arguments.
pub const VAR_ARGS: usize = usize::MAX;

/// Implementation of a built-in. `len` is the row count, which matters for zero-argument
/// functions; otherwise it equals the length of every argument.
pub type FunctionImpl = fn(&CallContext<'_>, &[Vector]) -> Vector;

pub struct CallContext<'a> {
    pub types: &'a TypeContext,
    pub len: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// Whether union arguments are split into their members before the call.
    pub rip_unions: bool,
    pub implementation: FunctionImpl,
}

inventory::collect!(FunctionSpec);

/// Iterate all registered built-ins.
pub fn iter_function_specs() -> impl Iterator<Item = &'static FunctionSpec> {
    inventory::iter::<FunctionSpec>.into_iter()
}

fn registry() -> &'static HashMap<&'static str, &'static FunctionSpec> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static FunctionSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in inventory::iter::<FunctionSpec> {
            map.insert(spec.name, spec);
        }
        map
    })
}

pub fn lookup_function(name: &str) -> Option<&'static FunctionSpec> {
    registry().get(name).copied()
}

#[derive(Debug)]
enum Callee {
    Builtin(&'static FunctionSpec),
    Udf(Arc<Udf>),
}

/// A function applied to argument expressions.
#[derive(Debug)]
pub struct Call {
    ctx: Arc<TypeContext>,
    callee: Callee,
    args: Vec<Expr>,
}

impl Call {
    /// A call of a user-defined function. Missing trailing arguments are not allowed, so the
    /// caller is expected to have matched `args` to the parameter list.
    pub fn udf(ctx: Arc<TypeContext>, udf: Arc<Udf>, args: Vec<Expr>) -> Self {
        Self {
            ctx,
            callee: Callee::Udf(udf),
            args,
        }
    }

    pub fn name(&self) -> &str {
        match &self.callee {
            Callee::Builtin(spec) => spec.name,
            Callee::Udf(udf) => udf.name(),
        }
    }

    fn invoke(&self, len: u32, args: &[Vector]) -> Vector {
        match &self.callee {
            Callee::Builtin(spec) => {
                let cx = CallContext {
                    types: &self.ctx,
                    len,
                };
                (spec.implementation)(&cx, args)
            }
            Callee::Udf(udf) => udf.call(args, len),
        }
    }
}

/// Builds a call of the built-in `name`, checking the argument count.
pub fn call(ctx: Arc<TypeContext>, name: &str, args: Vec<Expr>) -> ExprResult<Call> {
    let spec = lookup_function(name).ok_or_else(|| ExprError::UnknownFunction(name.into()))?;
    if args.len() < spec.min_args || args.len() > spec.max_args {
        let expected = match (spec.min_args, spec.max_args) {
            (min, VAR_ARGS) => format!("at least {min}"),
            (min, max) if min == max => min.to_string(),
            (min, max) => format!("{min} to {max}"),
        };
        return Err(ExprError::ArgCount {
            name: name.into(),
            expected,
            got: args.len(),
        });
    }
    Ok(Call {
        ctx,
        callee: Callee::Builtin(spec),
        args,
    })
}

impl Evaluator for Call {
    fn eval(&self, this: &Vector) -> Vector {
        if self.args.is_empty() {
            return self.invoke(this.len(), &[]);
        }
        let args: Vec<Vector> = self.args.iter().map(|e| e.eval(this)).collect();
        let rip = match &self.callee {
            Callee::Builtin(spec) => spec.rip_unions,
            Callee::Udf(_) => true,
        };
        apply(rip, &mut |vecs: &[Vector]| self.invoke(vecs[0].len(), vecs), &args)
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), self.args.len())
    }
}

// Shared helpers for the builtins.

/// Bytes of a string argument, or `None` when `v` is not a string column.
pub(crate) fn strings(v: &Vector) -> Option<ByteSlots<'_>> {
    if !matches!(v.ty().under(), Type::String) {
        return None;
    }
    crate::access::byte_slots(v)
}

/// Evaluates `f` per row and assembles the results, for functions whose output type varies.
pub(crate) fn per_row(len: u32, mut f: impl FnMut(u32) -> Value) -> Vector {
    let mut b = DynamicBuilder::new();
    for i in 0..len {
        b.write(&f(i));
    }
    b.build()
}

/// Replaces the `errs` slots of an `out` column built without them.
pub(crate) fn with_errors(out: Vector, errs: &[u32], err: impl FnOnce(u32) -> Vector) -> Vector {
    if errs.is_empty() {
        return out;
    }
    combine(&out, errs, &err(errs.len() as u32))
}

/// Accumulates a string (or bytes) output column.
pub(crate) struct BytesOut {
    table: strata_vector::vector::BytesTable,
    nulls: Vec<bool>,
}

impl BytesOut {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            table: strata_vector::vector::BytesTable::with_capacity(n),
            nulls: Vec::with_capacity(n),
        }
    }

    pub(crate) fn push(&mut self, v: &[u8]) {
        self.table.push(v);
        self.nulls.push(false);
    }

    pub(crate) fn push_null(&mut self) {
        self.table.push(&[]);
        self.nulls.push(true);
    }

    pub(crate) fn strings(self) -> Vector {
        Vector::string(self.table, BitVec::from_bools(self.nulls).compact())
    }

    pub(crate) fn bytes(self) -> Vector {
        Vector::bytes(self.table, BitVec::from_bools(self.nulls).compact())
    }

    pub(crate) fn type_values(self) -> Vector {
        Vector::type_values(self.table, BitVec::from_bools(self.nulls).compact())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::This;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_has_every_builtin_once() {
        let mut names: Vec<&str> = iter_function_specs().map(|s| s.name).collect();
        names.sort_unstable();
        let total = names.len();
        names.dedup();
        assert_eq!(names.len(), total);
        for name in ["abs", "len", "lower", "coalesce", "regexp", "cidr_match", "strftime"] {
            assert!(lookup_function(name).is_some(), "{name} not registered");
        }
    }

    #[test]
    fn arity_and_names_are_checked() {
        let ctx = Arc::new(TypeContext::new());
        let err = call(ctx.clone(), "nope", vec![]).unwrap_err();
        assert_eq!(err, ExprError::UnknownFunction("nope".into()));
        let err = call(ctx.clone(), "pow", vec![Arc::new(This)]).unwrap_err();
        assert_eq!(err.to_string(), "pow: expected 2 arguments, got 1");
        assert!(call(ctx, "coalesce", vec![Arc::new(This); 5]).is_ok());
    }
}
