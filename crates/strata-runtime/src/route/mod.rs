//! Operators that split one input into several or merge several into one.
//!
//! A router owns the shared parent on a dedicated thread and hands batches to its routes over
//! rendezvous channels, so back-pressure comes from the slowest route. End of stream and
//! upstream errors reach every route. A route that pulls with `done` stops receiving until
//! the current stream ends or every route is done, at which point the parent is told `done`.

mod merge;
mod router;
mod switch;

pub use merge::Merge;
pub use router::{branch, Forward, Msg, Outlets, Route};
pub use switch::{ExprSwitch, Fork, Switch};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::error::RuntimeError;
    use crate::test_support::{field, query, rows, source};
    use crate::Puller;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_expr::{CompareExpr, CompareOp, Literal};
    use strata_vector::Value;

    /// Drains every route on its own thread.
    fn drain(routes: Vec<Route>) -> Vec<Vec<String>> {
        std::thread::scope(|s| {
            let handles: Vec<_> = routes
                .into_iter()
                .map(|mut r| s.spawn(move || rows(&mut r)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn greater_than(ctx: &QueryContext, name: &str, n: i64) -> strata_expr::Expr {
        Arc::new(CompareExpr::new(
            ctx.types.clone(),
            CompareOp::Gt,
            field(ctx, name),
            Arc::new(Literal::new(Value::int64(n))),
        ))
    }

    #[test]
    fn fork_copies_every_batch() {
        let ctx = query();
        let routes = branch(&ctx, source(&ctx, &["1 2", "3"]), Fork::new(3));
        let got = drain(routes);
        assert_eq!(got, vec![vec!["1", "2", "3"]; 3]);
    }

    #[test]
    fn switch_takes_the_first_true_case() {
        let ctx = query();
        let cases = vec![greater_than(&ctx, "x", 2), greater_than(&ctx, "x", 0)];
        let input = source(&ctx, &["{x:1} {x:3} {x:0}", "{y:1}"]);
        let got = drain(branch(&ctx, input, Switch::new(cases, true)));
        assert_eq!(got, [vec!["{x:3}"], vec!["{x:1}"], vec!["{x:0}", "{y:1}"]]);
    }

    #[test]
    fn switch_errors_stay_with_their_case() {
        let ctx = query();
        let input = source(&ctx, &["{p:true,x:2} {p:error(\"bad\"),x:3} {x:4}"]);
        let got = drain(branch(&ctx, input, Switch::new(vec![field(&ctx, "p")], true)));
        assert_eq!(got, [
            vec!["{p:true,x:2}", "error(\"bad\")"],
            vec!["{p:error(\"bad\"),x:3}", "{x:4}"],
        ]);
    }

    #[test]
    fn expr_switch_matches_typed_values() {
        let ctx = query();
        let cases = [Value::int64(1), Value::string("a")];
        let fwd = ExprSwitch::new(field(&ctx, "k"), &cases, true).unwrap();
        let input = source(&ctx, &["{k:1} {k:\"a\"} {k:\"1\"} {k:1}"]);
        let got = drain(branch(&ctx, input, fwd));
        assert_eq!(got, [
            vec!["{k:1}", "{k:1}"],
            vec!["{k:\"a\"}"],
            vec!["{k:\"1\"}"],
        ]);
        let dup = ExprSwitch::new(field(&ctx, "k"), &[Value::int64(1), Value::int64(1)], false);
        assert!(matches!(dup, Err(RuntimeError::InvalidOperator(_))));
    }

    #[test]
    fn upstream_errors_reach_every_route() {
        #[derive(Debug)]
        struct Failing;
        impl Puller for Failing {
            fn pull(&mut self, _done: bool) -> crate::RuntimeResult<Option<strata_vector::Vector>> {
                Err(RuntimeError::InvalidOperator("boom".to_string()))
            }
        }
        let ctx = query();
        let routes = branch(&ctx, Box::new(Failing), Fork::new(2));
        let errs: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = routes
                .into_iter()
                .map(|mut r| s.spawn(move || r.pull(false).unwrap_err().to_string()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(errs, ["boom", "boom"]);
    }

    #[test]
    fn done_routes_stop_receiving() {
        let ctx = query();
        let mut routes = branch(&ctx, source(&ctx, &["1", "2", "3"]), Fork::new(2));
        let mut second = routes.pop().unwrap();
        let mut first = routes.pop().unwrap();
        let got = std::thread::scope(|s| {
            let h = s.spawn(move || rows(&mut first));
            assert!(second.pull(true).unwrap().is_none());
            h.join().unwrap()
        });
        assert_eq!(got, ["1", "2", "3"]);
    }

    #[test]
    fn cancel_unblocks_waiting_routes() {
        let ctx = query();
        let mut routes = branch(&ctx, source(&ctx, &["1"]), Fork::new(2));
        let mut first = routes.remove(0);
        let canceler = ctx.cancel.clone();
        let err = std::thread::scope(|s| {
            let h = s.spawn(move || first.pull(false).and_then(|_| first.pull(false)));
            std::thread::sleep(std::time::Duration::from_millis(20));
            canceler.cancel();
            h.join().unwrap()
        });
        assert!(err.unwrap_err().is_canceled());
        drop(routes);
    }
}
