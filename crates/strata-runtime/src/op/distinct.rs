use crate::error::RuntimeResult;
use crate::Puller;
use ahash::AHashSet;
use strata_expr::Expr;
use strata_vector::Vector;

/// Passes only the rows whose key has not been seen earlier in the stream.
#[derive(Debug)]
pub struct Distinct<P> {
    parent: P,
    expr: Expr,
    seen: AHashSet<Vec<u8>>,
}

impl<P: Puller> Distinct<P> {
    pub fn new(parent: P, expr: Expr) -> Self {
        Self {
            parent,
            expr,
            seen: AHashSet::new(),
        }
    }
}

impl<P: Puller> Puller for Distinct<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        let mut key = Vec::new();
        loop {
            let Some(vec) = self.parent.pull(done)? else {
                self.seen.clear();
                return Ok(None);
            };
            let keys = self.expr.eval(&vec);
            let mut index = Vec::new();
            for slot in 0..keys.len() {
                key.clear();
                keys.append_key(slot, &mut key);
                if !self.seen.contains(&key) {
                    self.seen.insert(key.clone());
                    index.push(slot);
                }
            }
            match index.len() {
                0 => continue,
                n if n == vec.len() as usize => return Ok(Some(vec)),
                _ => return Ok(Some(Vector::view(vec, index))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_are_typed() {
        let ctx = query();
        let batches = ["{k:1,v:1} {k:\"1\",v:2} {k:1,v:3}", "{k:1,v:4} {k:null,v:5}", "{k:null,v:6}"];
        let mut distinct = Distinct::new(source(&ctx, &batches), field(&ctx, "k"));
        assert_eq!(rows(&mut distinct), ["{k:1,v:1}", "{k:\"1\",v:2}", "{k:null,v:5}"]);
    }

    #[test]
    fn missing_keys_collapse_to_one() {
        let ctx = query();
        let mut distinct = Distinct::new(source(&ctx, &["1 1 2"]), field(&ctx, "x"));
        // Every row is missing `x`, so all share one error key.
        assert_eq!(rows(&mut distinct), ["1"]);
    }
}
