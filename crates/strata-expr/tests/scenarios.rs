use std::sync::Arc;
use strata_expr::{
    dotted_path, ArithExpr, ArithOp, Conditional, Evaluator, Expr, Literal, Search, SearchPattern,
};
use strata_vector::sup::parse_values;
use strata_vector::{TypeContext, Value, Vector};

fn input(ctx: &TypeContext, text: &str) -> Vector {
    Vector::from_values(&parse_values(ctx, text).unwrap())
}

fn rows(v: &Vector) -> Vec<String> {
    v.values().iter().map(ToString::to_string).collect()
}

fn field(ctx: &Arc<TypeContext>, name: &str) -> Expr {
    dotted_path(ctx, &[name])
}

#[test]
fn heterogeneous_sum() {
    let ctx = Arc::new(TypeContext::new());
    let batch = input(&ctx, "{a:1} {a:2.5} {a:\"hi\"}");
    let one: Expr = Arc::new(Literal::new(Value::int64(1)));
    let sum = ArithExpr::new(ctx.clone(), ArithOp::Add, field(&ctx, "a"), one);
    assert_eq!(rows(&sum.eval(&batch)), ["2", "3.5", "error(\"incompatible types\")"]);
}

#[test]
fn divide_by_zero_mix() {
    let ctx = Arc::new(TypeContext::new());
    let batch = input(&ctx, "{x:10,y:2} {x:10,y:0} {x:5,y:5}");
    let div = ArithExpr::new(ctx.clone(), ArithOp::Div, field(&ctx, "x"), field(&ctx, "y"));
    assert_eq!(rows(&div.eval(&batch)), ["5", "error(\"divide by zero\")", "1"]);
}

#[test]
fn conditional_with_error_predicate() {
    let ctx = Arc::new(TypeContext::new());
    let batch = input(&ctx, "{p:true,x:1,y:2} {p:\"huh\",x:3,y:4} {p:false,x:5,y:6}");
    let cond = Conditional::new(ctx.clone(), field(&ctx, "p"), field(&ctx, "x"), field(&ctx, "y"));
    assert_eq!(
        rows(&cond.eval(&batch)),
        [
            "1",
            "error({message:\"?-operator: bool predicate required\",on:\"huh\"})",
            "6",
        ]
    );
}

#[test]
fn search_then_arith_on_the_same_batch() {
    let ctx = Arc::new(TypeContext::new());
    let batch = input(&ctx, "{s:\"Alpha\",n:1} {s:\"beta\",n:2}");
    let search = Search::new(ctx.clone(), SearchPattern::text("ALPHA"), field(&ctx, "s"));
    assert_eq!(rows(&search.eval(&batch)), ["true", "false"]);
    let double = ArithExpr::new(ctx.clone(), ArithOp::Mul, field(&ctx, "n"), field(&ctx, "n"));
    assert_eq!(rows(&double.eval(&batch)), ["1", "4"]);
}
