//! Record field assignment and renaming.

use crate::access::record_parts;
use crate::{Evaluator, Expr, ExprError, ExprResult};
use std::sync::Arc;
use strata_vector::{apply, pick, BitVec, Field, TypeContext, Vector};

/// The fields of a record column (seen through a view) with its null mask.
fn columns(v: &Vector) -> Option<(Vec<(String, Vector)>, BitVec)> {
    let (rec, index) = record_parts(v)?;
    let rt = rec.ty.as_record()?;
    let cols = rt
        .fields()
        .iter()
        .zip(&rec.fields)
        .map(|(f, col)| {
            let col = index.map_or_else(|| col.clone(), |ix| pick(col, ix));
            (f.name.clone(), col)
        })
        .collect();
    let nulls = index.map_or_else(|| rec.nulls.clone(), |ix| rec.nulls.pick(ix));
    Some((cols, nulls))
}

fn assemble(
    ctx: &TypeContext,
    cols: Vec<(String, Vector)>,
    len: u32,
    nulls: BitVec,
) -> Result<Vector, String> {
    let fields = cols.iter().map(|(name, v)| Field::new(name.clone(), v.ty())).collect();
    let ty = ctx.lookup_record(fields).map_err(|err| err.to_string())?;
    let values = cols.into_iter().map(|(_, v)| v).collect();
    Ok(Vector::record(ty, values, len, nulls.compact()))
}

/// Sets `path` in `cols`, creating intermediate records as needed.
fn set_path(
    ctx: &TypeContext,
    cols: &mut Vec<(String, Vector)>,
    path: &[String],
    value: Vector,
    len: u32,
) -> Result<(), String> {
    let Some((name, rest)) = path.split_first() else {
        return Ok(());
    };
    let pos = cols.iter().position(|(n, _)| n == name);
    let value = if rest.is_empty() {
        value
    } else {
        let (mut inner, nulls) = pos
            .and_then(|k| columns(&cols[k].1))
            .unwrap_or_else(|| (Vec::new(), BitVec::zero()));
        set_path(ctx, &mut inner, rest, value, len)?;
        assemble(ctx, inner, len, nulls)?
    };
    match pos {
        Some(k) => cols[k].1 = value,
        None => cols.push((name.clone(), value)),
    }
    Ok(())
}

/// One `path := expr` of a [`Put`].
#[derive(Debug)]
pub struct Assignment {
    pub path: Vec<String>,
    pub expr: Expr,
}

/// Assigns fields of the input record; existing fields keep their position.
#[derive(Debug)]
pub struct Put {
    ctx: Arc<TypeContext>,
    assignments: Vec<Assignment>,
}

impl Put {
    pub fn new(ctx: Arc<TypeContext>, assignments: Vec<Assignment>) -> Self {
        Self { ctx, assignments }
    }

    fn put(&self, vecs: &[Vector]) -> Vector {
        let this = &vecs[0];
        let Some((mut cols, nulls)) = columns(this) else {
            return Vector::wrapped_error(&self.ctx, "put: not a record", this);
        };
        let len = this.len();
        for (a, v) in self.assignments.iter().zip(&vecs[1..]) {
            if let Err(msg) = set_path(&self.ctx, &mut cols, &a.path, v.clone(), len) {
                return Vector::string_error(&self.ctx, &format!("put: {msg}"), len);
            }
        }
        match assemble(&self.ctx, cols, len, nulls) {
            Ok(v) => v,
            Err(msg) => Vector::string_error(&self.ctx, &format!("put: {msg}"), len),
        }
    }
}

impl Evaluator for Put {
    fn eval(&self, this: &Vector) -> Vector {
        let mut vecs = vec![this.clone()];
        vecs.extend(self.assignments.iter().map(|a| a.expr.eval(this)));
        apply(false, &mut |vecs: &[Vector]| self.put(vecs), &vecs)
    }
}

/// Renames fields in place. Each source and destination share a parent record.
#[derive(Debug)]
pub struct Rename {
    ctx: Arc<TypeContext>,
    renames: Vec<(Vec<String>, Vec<String>)>,
}

impl Rename {
    pub fn new(ctx: Arc<TypeContext>, renames: Vec<(Vec<String>, Vec<String>)>) -> ExprResult<Self> {
        for (src, dst) in &renames {
            let same_parent = src.len() == dst.len()
                && !src.is_empty()
                && src[..src.len() - 1] == dst[..dst.len() - 1];
            if !same_parent {
                return Err(ExprError::Rename(format!(
                    "left-hand side and right-hand side must have the same depth ({} vs {})",
                    src.join("."),
                    dst.join(".")
                )));
            }
        }
        Ok(Self { ctx, renames })
    }

    fn rename_in(
        &self,
        cols: &mut [(String, Vector)],
        src: &[String],
        dst: &str,
        len: u32,
    ) -> Result<(), String> {
        let Some((name, rest)) = src.split_first() else {
            return Ok(());
        };
        let Some(k) = cols.iter().position(|(n, _)| n == name) else {
            return Ok(());
        };
        if rest.is_empty() {
            if cols.iter().any(|(n, _)| n == dst) && name != dst {
                return Err(format!("duplicate field: \"{dst}\""));
            }
            cols[k].0 = dst.to_string();
            return Ok(());
        }
        let Some((mut inner, nulls)) = columns(&cols[k].1) else {
            return Ok(());
        };
        self.rename_in(&mut inner, rest, dst, len)?;
        cols[k].1 = assemble(&self.ctx, inner, len, nulls)?;
        Ok(())
    }

    fn rename(&self, this: &Vector) -> Vector {
        let Some((mut cols, nulls)) = columns(this) else {
            return Vector::wrapped_error(&self.ctx, "rename: not a record", this);
        };
        let len = this.len();
        for (src, dst) in &self.renames {
            let Some(dst) = dst.last() else {
                continue;
            };
            if let Err(msg) = self.rename_in(&mut cols, src, dst, len) {
                return Vector::wrapped_error(&self.ctx, &format!("rename: {msg}"), this);
            }
        }
        match assemble(&self.ctx, cols, len, nulls) {
            Ok(v) => v,
            Err(msg) => Vector::wrapped_error(&self.ctx, &format!("rename: {msg}"), this),
        }
    }
}

impl Evaluator for Rename {
    fn eval(&self, this: &Vector) -> Vector {
        apply(false, &mut |vecs: &[Vector]| self.rename(&vecs[0]), &[this.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::test_support::{col, show};
    use crate::{dotted_path, Literal};
    use pretty_assertions::assert_eq;
    use strata_vector::Value;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn put_replaces_and_adds_nested_fields() {
        let ctx = Arc::new(TypeContext::new());
        let put = Put::new(
            ctx.clone(),
            vec![
                Assignment { path: path("a"), expr: Arc::new(Literal::new(Value::string("x"))) },
                Assignment { path: path("c.d"), expr: dotted_path(&ctx, &["b"]) },
            ],
        );
        let out = show(&put.eval(&col(&ctx, "{a:1,b:2} {b:3,a:4}")));
        assert_eq!(out, ["{a:\"x\",b:2,c:{d:2}}", "{b:3,a:\"x\",c:{d:3}}"]);
        let out = show(&put.eval(&col(&ctx, "1")));
        assert!(out[0].contains("put: not a record"));
    }

    #[test]
    fn rename_keeps_values_and_position() {
        let ctx = Arc::new(TypeContext::new());
        let r = Rename::new(ctx.clone(), vec![(path("a"), path("z")), (path("r.x"), path("r.y"))]).unwrap();
        let out = show(&r.eval(&col(&ctx, "{a:1,r:{x:2},b:3}")));
        assert_eq!(out, ["{z:1,r:{y:2},b:3}"]);
        let dup = Rename::new(ctx.clone(), vec![(path("a"), path("b"))]).unwrap();
        let out = show(&dup.eval(&col(&ctx, "{a:1,b:2}")));
        assert!(out[0].contains("duplicate field"));
        assert!(Rename::new(ctx, vec![(path("a"), path("b.c"))]).is_err());
    }
}
