use crate::apply::apply;
use crate::bitmap::BitVec;
use crate::context::TypeContext;
use crate::error::{TypeError, TypeResult};
use crate::types::Field;
use crate::vector::Vector;

#[derive(Clone, Debug)]
enum Node {
    Leaf(usize),
    Record(Vec<(String, Node)>),
}

/// Assembles record columns from field paths and one column per path.
///
/// Paths sharing a prefix nest under a common record, so `[["a","b"],["a","c"],["d"]]` builds
/// `{a:{b,c},d}`. Dynamic columns are split with [`apply`] so every output record is typed.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    root: Node,
}

impl RecordBuilder {
    pub fn new(paths: &[Vec<String>]) -> TypeResult<Self> {
        let mut root = Vec::new();
        for (k, path) in paths.iter().enumerate() {
            insert(&mut root, path, k)?;
        }
        Ok(Self {
            root: Node::Record(root),
        })
    }

    /// Builds a column of records; `columns[k]` supplies `paths[k]`.
    pub fn build(&self, ctx: &TypeContext, columns: &[Vector]) -> TypeResult<Vector> {
        let len = columns.first().map_or(0, Vector::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != len) {
            return Err(TypeError::LengthMismatch {
                expected: len,
                got: bad.len(),
            });
        }
        if columns.is_empty() {
            return Ok(Vector::record(ctx.lookup_record(Vec::new())?, Vec::new(), 0, BitVec::zero()));
        }
        let mut failed = None;
        let out = apply(
            true,
            &mut |vecs: &[Vector]| match assemble(ctx, &self.root, vecs) {
                Ok(v) => v,
                Err(err) => {
                    failed.get_or_insert(err);
                    Vector::const_null(vecs[0].len())
                }
            },
            columns,
        );
        match failed {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

fn insert(nodes: &mut Vec<(String, Node)>, path: &[String], leaf: usize) -> TypeResult<()> {
    let Some((head, tail)) = path.split_first() else {
        return Err(TypeError::BadName(String::new()));
    };
    let pos = nodes.iter().position(|(name, _)| name == head);
    if tail.is_empty() {
        if pos.is_some() {
            return Err(TypeError::DuplicateField(path.join(".")));
        }
        nodes.push((head.clone(), Node::Leaf(leaf)));
        return Ok(());
    }
    let k = match pos {
        Some(k) => k,
        None => {
            nodes.push((head.clone(), Node::Record(Vec::new())));
            nodes.len() - 1
        }
    };
    match &mut nodes[k].1 {
        Node::Record(children) => insert(children, tail, leaf),
        Node::Leaf(_) => Err(TypeError::DuplicateField(head.clone())),
    }
}

fn assemble(ctx: &TypeContext, node: &Node, vecs: &[Vector]) -> TypeResult<Vector> {
    match node {
        Node::Leaf(k) => Ok(vecs[*k].clone()),
        Node::Record(children) => {
            let len = vecs.first().map_or(0, Vector::len);
            let mut fields = Vec::with_capacity(children.len());
            let mut typed = Vec::with_capacity(children.len());
            for (name, child) in children {
                let v = assemble(ctx, child, vecs)?;
                typed.push(Field::new(name.clone(), v.ty()));
                fields.push(v);
            }
            let ty = ctx.lookup_record(typed)?;
            Ok(Vector::record(ty, fields, len, BitVec::zero()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn nests_shared_prefixes() {
        let ctx = TypeContext::new();
        let b = RecordBuilder::new(&[path("a.b"), path("a.c"), path("d")]).unwrap();
        let out = b
            .build(
                &ctx,
                &[
                    Vector::int64s(vec![1]),
                    Vector::strings(["x"]),
                    Vector::int64s(vec![2]),
                ],
            )
            .unwrap();
        assert_eq!(out.value_at(0).to_string(), "{a:{b:1,c:\"x\"},d:2}");
    }

    #[test]
    fn dynamic_columns_split_into_typed_records() {
        let ctx = TypeContext::new();
        let b = RecordBuilder::new(&[path("k"), path("n")]).unwrap();
        let keys = Vector::dynamic(
            vec![0, 1],
            vec![Vector::strings(["a"]), Vector::int64s(vec![1])],
        );
        let out = b.build(&ctx, &[keys, Vector::int64s(vec![3, 7])]).unwrap();
        let got: Vec<String> = out.values().iter().map(Value::to_string).collect();
        assert_eq!(got, vec!["{k:\"a\",n:3}", "{k:1,n:7}"]);
    }

    #[test]
    fn rejects_conflicting_paths() {
        assert!(RecordBuilder::new(&[path("a"), path("a.b")]).is_err());
        assert!(RecordBuilder::new(&[path("a"), path("a")]).is_err());
    }
}
