use crate::error::RuntimeResult;
use crate::Puller;
use strata_expr::{quiet_mask, Expr};
use strata_vector::{apply, stitch, BitVec, Value, Vector};

/// Emits the results of several expressions per input row, dropping `error("quiet")` slots.
///
/// One surviving expression passes its column through. Several are interleaved row by row:
/// input slot 0 of every expression, then slot 1, and so on.
#[derive(Debug)]
pub struct Values<P> {
    parent: P,
    exprs: Vec<Expr>,
}

/// `yield` is `values` under another name.
pub type Yield<P> = Values<P>;

impl<P: Puller> Values<P> {
    pub fn new(parent: P, exprs: Vec<Expr>) -> Self {
        Self { parent, exprs }
    }
}

impl<P: Puller> Puller for Values<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        loop {
            let Some(vec) = self.parent.pull(done)? else {
                return Ok(None);
            };
            let outs: Vec<(Vector, Option<BitVec>)> = self
                .exprs
                .iter()
                .filter_map(|e| filter_quiet(&e.eval(&vec)))
                .collect();
            match outs.len() {
                0 => continue,
                1 => return Ok(outs.into_iter().next().map(|(v, _)| v)),
                _ => return Ok(Some(interleave(vec.len(), outs))),
            }
        }
    }
}

/// Drops quiet slots. Returns the kept rows and, when some were dropped, which input slots
/// survived; `None` when nothing survived.
fn filter_quiet(vec: &Vector) -> Option<(Vector, Option<BitVec>)> {
    let mut filtered = false;
    let mask = apply(
        true,
        &mut |vecs: &[Vector]| {
            let n = vecs[0].len();
            match quiet_mask(&vecs[0]) {
                Some(keep) => {
                    filtered = true;
                    Vector::bool(keep, BitVec::zero())
                }
                None => Vector::constant(Value::bool(true), n, BitVec::zero()),
            }
        },
        std::slice::from_ref(vec),
    );
    if !filtered {
        return (!vec.is_empty()).then(|| (vec.clone(), None));
    }
    let keep = strata_expr::bool_mask(&mask).trues;
    if !keep.any() {
        return None;
    }
    if keep.true_count() == vec.len() {
        return Some((vec.clone(), None));
    }
    Some((Vector::view(vec.clone(), keep.positions()), Some(keep)))
}

fn interleave(n: u32, outs: Vec<(Vector, Option<BitVec>)>) -> Vector {
    let mut tags = Vec::new();
    for slot in 0..n {
        for (k, (_, keep)) in outs.iter().enumerate() {
            if keep.as_ref().map_or(true, |keep| keep.value(slot)) {
                tags.push(k as u32);
            }
        }
    }
    stitch(&tags, outs.into_iter().map(|(v, _)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_expr::Literal;

    #[test]
    fn single_expression_passes_through() {
        let ctx = query();
        let mut values = Values::new(source(&ctx, &["{a:1} {a:2}"]), vec![field(&ctx, "a")]);
        assert_eq!(rows(&mut values), ["1", "2"]);
    }

    #[test]
    fn several_expressions_interleave_per_row() {
        let ctx = query();
        let exprs = vec![field(&ctx, "a"), field(&ctx, "b")];
        let mut values = Values::new(source(&ctx, &["{a:1,b:\"x\"} {a:2,b:\"y\"}"]), exprs);
        assert_eq!(rows(&mut values), ["1", "\"x\"", "2", "\"y\""]);
    }

    #[test]
    fn quiet_slots_vanish() {
        let ctx = query();
        let quiet: Expr = Arc::new(Literal::new(ctx.types.quiet()));
        let exprs = vec![quiet.clone(), field(&ctx, "a")];
        let mut values = Values::new(source(&ctx, &["{a:1} {a:2}"]), exprs);
        assert_eq!(rows(&mut values), ["1", "2"]);
        let mut nothing = Yield::new(source(&ctx, &["{a:1}"]), vec![quiet]);
        assert!(nothing.pull(false).unwrap().is_none());
    }
}
