use crate::{Expr, MAX_STACK_DEPTH};
use std::cell::Cell;
use std::sync::{Arc, OnceLock};
use strata_vector::{BitVec, Field, TypeContext, Vector};

/// A user-defined function.
///
/// The body sees its arguments as a record whose fields are the parameter names, or a const
/// null when there are no parameters. The body is installed after construction so that
/// recursive functions can refer to themselves.
#[derive(Debug)]
pub struct Udf {
    ctx: Arc<TypeContext>,
    name: String,
    params: Vec<String>,
    body: OnceLock<Expr>,
    max_depth: usize,
}

impl Udf {
    pub fn new(ctx: Arc<TypeContext>, name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            ctx,
            name: name.into(),
            params,
            body: OnceLock::new(),
            max_depth: MAX_STACK_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Installs the body. Returns false if one was already set.
    pub fn set_body(&self, body: Expr) -> bool {
        self.body.set(body).is_ok()
    }

    /// Calls the function on homogeneous argument columns of `len` rows.
    pub fn call(&self, args: &[Vector], len: u32) -> Vector {
        let frame = Frame::enter();
        if frame.depth > self.max_depth {
            let msg = format!("stack overflow in function \"{}\"", self.name);
            return Vector::string_error(&self.ctx, &msg, len);
        }
        let Some(body) = self.body.get() else {
            log::warn!("function {:?} called before its body was set", self.name);
            return Vector::missing(&self.ctx, len);
        };
        if self.params.is_empty() {
            return body.eval(&Vector::const_null(len));
        }
        let fields = self
            .params
            .iter()
            .zip(args)
            .map(|(name, arg)| Field::new(name.clone(), arg.ty()))
            .collect();
        match self.ctx.lookup_record(fields) {
            Ok(ty) => body.eval(&Vector::record(ty, args.to_vec(), len, BitVec::zero())),
            Err(err) => {
                let msg = format!("{}: {err}", self.name);
                Vector::string_error(&self.ctx, &msg, len)
            }
        }
    }
}

thread_local! {
    // Nested function calls on this thread's evaluation chain.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct Frame {
    depth: usize,
}

impl Frame {
    fn enter() -> Self {
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        Frame { depth }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dotted_path, ArithExpr, ArithOp, Call, Evaluator, Literal};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use strata_vector::Value;

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn body_sees_parameters_as_fields() {
        let ctx = Arc::new(TypeContext::new());
        let udf = Arc::new(Udf::new(ctx.clone(), "double", vec!["x".into()]));
        let x = dotted_path(&ctx, &["x"]);
        udf.set_body(Arc::new(ArithExpr::new(ctx.clone(), ArithOp::Add, x.clone(), x)));
        let call = Call::udf(ctx.clone(), udf, vec![Arc::new(crate::This)]);
        assert_eq!(show(&call.eval(&Vector::int64s(vec![1, 4]))), ["2", "8"]);
    }

    #[test]
    fn no_parameters_evaluate_on_null() {
        let ctx = Arc::new(TypeContext::new());
        let udf = Udf::new(ctx.clone(), "one", Vec::new());
        udf.set_body(Arc::new(Literal::new(Value::int64(1))));
        assert_eq!(show(&udf.call(&[], 2)), ["1", "1"]);
    }

    #[test]
    fn recursion_is_bounded() {
        let ctx = Arc::new(TypeContext::new());
        let udf = Arc::new(Udf::new(ctx.clone(), "forever", vec!["x".into()]).with_max_depth(50));
        let body = Call::udf(ctx.clone(), udf.clone(), vec![dotted_path(&ctx, &["x"])]);
        udf.set_body(Arc::new(body));
        let out = udf.call(&[Vector::int64s(vec![1])], 1);
        assert_eq!(show(&out), ["error(\"stack overflow in function \\\"forever\\\"\")"]);
        // The chain unwound completely, so a fresh call starts from the bottom again.
        assert_eq!(DEPTH.with(Cell::get), 0);
    }

    /// Returns its input once `n` callers are inside it at the same time, or after a timeout.
    #[derive(Debug)]
    struct Meet {
        n: usize,
        inside: AtomicUsize,
    }

    impl Evaluator for Meet {
        fn eval(&self, this: &Vector) -> Vector {
            self.inside.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.inside.load(Ordering::SeqCst) < self.n && Instant::now() < deadline {
                std::thread::yield_now();
            }
            this.clone()
        }
    }

    #[test]
    fn concurrent_callers_do_not_share_depth() {
        let ctx = Arc::new(TypeContext::new());
        let udf = Udf::new(ctx.clone(), "shallow", vec!["x".into()]).with_max_depth(1);
        udf.set_body(Arc::new(Meet { n: 2, inside: AtomicUsize::new(0) }));
        let outs: Vec<Vec<String>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let udf = &udf;
                    s.spawn(move || show(&udf.call(&[Vector::int64s(vec![i])], 1)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for out in outs {
            assert!(out[0].starts_with("{x:"), "{out:?}");
        }
    }
}
