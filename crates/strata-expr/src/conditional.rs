use crate::logic::bool_mask;
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::{apply, pick, TypeContext, Vector};

/// `predicate ? then : else`.
///
/// Rows where the predicate is true evaluate `then`, false or null rows evaluate `else`, and
/// rows whose predicate is not a bool become an error.
#[derive(Debug)]
pub struct Conditional {
    ctx: Arc<TypeContext>,
    predicate: Expr,
    then: Expr,
    otherwise: Expr,
}

impl Conditional {
    pub fn new(ctx: Arc<TypeContext>, predicate: Expr, then: Expr, otherwise: Expr) -> Self {
        Self {
            ctx,
            predicate,
            then,
            otherwise,
        }
    }

    fn predicate_error(&self, pred: &Vector) -> Vector {
        apply(
            false,
            &mut |vecs: &[Vector]| {
                Vector::wrapped_error(&self.ctx, "?-operator: bool predicate required", &vecs[0])
            },
            std::slice::from_ref(pred),
        )
    }
}

impl Evaluator for Conditional {
    fn eval(&self, this: &Vector) -> Vector {
        let n = this.len();
        let pred = self.predicate.eval(this);
        let mask = bool_mask(&pred);
        let (trues, others) = (mask.trues.true_count(), mask.others.true_count());
        if others == n {
            return self.predicate_error(&pred);
        }
        if trues == n {
            return self.then.eval(this);
        }
        if trues == 0 && others == 0 {
            return self.otherwise.eval(this);
        }
        let then_index = mask.trues.positions();
        let else_index = mask.falses();
        let then_vec = self.then.eval(&pick(this, &then_index));
        let else_vec = self.otherwise.eval(&pick(this, &else_index));
        let mut tags = vec![0u32; n as usize];
        for &i in &else_index {
            tags[i as usize] = 1;
        }
        let mut values = vec![then_vec, else_vec];
        if others > 0 {
            let other_index = mask.others.positions();
            for &i in &other_index {
                tags[i as usize] = 2;
            }
            values.push(self.predicate_error(&pick(&pred, &other_index)));
        }
        log::trace!("conditional: {trues} then, {} else, {others} error rows", else_index.len());
        Vector::dynamic(tags, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dotted_path, Literal};
    use pretty_assertions::assert_eq;
    use strata_vector::sup::parse_values;
    use strata_vector::Value;

    fn col(ctx: &TypeContext, text: &str) -> Vector {
        Vector::from_values(&parse_values(ctx, text).unwrap())
    }

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    fn cond(ctx: &Arc<TypeContext>) -> Conditional {
        Conditional::new(
            ctx.clone(),
            dotted_path(ctx, &["p"]),
            Arc::new(Literal::new(Value::string("yes"))),
            dotted_path(ctx, &["x"]),
        )
    }

    #[test]
    fn mixed_predicates_route_per_row() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{p:true,x:1} {p:false,x:2} {p:1,x:3} {p:true,x:4}");
        let out = cond(&ctx).eval(&input);
        let got = show(&out);
        assert_eq!(got[0], "\"yes\"");
        assert_eq!(got[1], "2");
        assert!(got[2].contains("?-operator: bool predicate required"));
        assert_eq!(got[3], "\"yes\"");
    }

    #[test]
    fn uniform_predicates_take_one_branch() {
        let ctx = Arc::new(TypeContext::new());
        let out = cond(&ctx).eval(&col(&ctx, "{p:true,x:1} {p:true,x:2}"));
        assert_eq!(show(&out), ["\"yes\"", "\"yes\""]);
        let out = cond(&ctx).eval(&col(&ctx, "{p:false,x:1} {p:false,x:2}"));
        assert_eq!(show(&out), ["1", "2"]);
        let out = cond(&ctx).eval(&col(&ctx, "{p:\"a\",x:1}"));
        assert!(out.value_at(0).is_error());
    }
}
