//! Projection-driven materialization.

use crate::encode::{
    decode_floats, decode_ints, decode_primitives, decode_u32s, decode_uints, extend_for_nulls,
};
use crate::error::{corrupt, CacheResult};
use crate::meta::Metadata;
use crate::nulls::flat_nulls;
use crate::object::Loader;
use crate::parallel::map_ordered;
use crate::shadow::{Loaded, Shadow};
use std::sync::Arc;
use strata_vector::{
    add_nulls, flatten_union_nulls, union_with_nulls, BitVec, Builder, Field, RecordBuilder, Type,
    TypeContext, Value, Vector,
};

/// Which parts of an object to load.
///
/// A projection is a path of nodes; a [`ProjectionNode::Fork`] splits it into alternative
/// paths below a shared prefix. The empty projection loads everything below where it applies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection(Vec<ProjectionNode>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectionNode {
    Field(String),
    Fork(Vec<Projection>),
}

impl Projection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![ProjectionNode::Field(name.into())])
    }

    pub fn path<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|f| ProjectionNode::Field(f.into()))
                .collect(),
        )
    }

    pub fn fork(paths: Vec<Projection>) -> Self {
        Self(vec![ProjectionNode::Fork(paths)])
    }

    /// A fork of dotted paths, e.g. `[["a","b"], ["c"]]`.
    pub fn from_paths(paths: &[&[&str]]) -> Self {
        match paths {
            [] => Self::all(),
            [one] => Self::path(one.iter().copied()),
            many => Self::fork(many.iter().map(|p| Self::path(p.iter().copied())).collect()),
        }
    }

    pub fn nodes(&self) -> &[ProjectionNode] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when nothing below this point is filtered out.
    pub fn selects_all(&self) -> bool {
        self.split().is_none()
    }

    fn heads(&self, out: &mut Vec<(String, Vec<Projection>)>) -> bool {
        match self.0.split_first() {
            None => false,
            Some((ProjectionNode::Field(name), rest)) => {
                let rest = Projection(rest.to_vec());
                match out.iter_mut().find(|(n, _)| n == name) {
                    Some((_, subs)) => subs.push(rest),
                    None => out.push((name.clone(), vec![rest])),
                }
                true
            }
            Some((ProjectionNode::Fork(paths), rest)) => paths.iter().all(|p| {
                let mut nodes = p.0.clone();
                nodes.extend_from_slice(rest);
                Projection(nodes).heads(out)
            }),
        }
    }

    /// The fields this projection selects at a record, in first-seen order, each with the
    /// projection to apply below it. `None` selects every field.
    fn split(&self) -> Option<Vec<(String, Projection)>> {
        let mut heads = Vec::new();
        if !self.heads(&mut heads) {
            return None;
        }
        Some(
            heads
                .into_iter()
                .map(|(name, subs)| {
                    let sub = if subs.iter().any(Projection::selects_all) {
                        Projection::all()
                    } else if subs.len() == 1 {
                        subs.into_iter().next().unwrap_or_default()
                    } else {
                        Projection::fork(subs)
                    };
                    (name, sub)
                })
                .collect(),
        )
    }
}

struct Env<'a> {
    loader: &'a Loader<'a>,
    local: &'a TypeContext,
    sctx: &'a TypeContext,
}

pub(crate) fn project(
    root: &Arc<Shadow>,
    loader: &Loader<'_>,
    local: &TypeContext,
    sctx: &TypeContext,
    projection: &Projection,
) -> CacheResult<Vector> {
    let env = Env { loader, local, sctx };
    env.project(root, projection)
}

impl Env<'_> {
    fn translate(&self, s: &Shadow) -> CacheResult<Type> {
        Ok(self.sctx.translate(s.local_type()?)?)
    }

    fn nulls(&self, s: &Shadow) -> CacheResult<BitVec> {
        flat_nulls(&s.nulls, self.loader)
    }

    /// Rows of `s` that hold stored values.
    fn dense_len(&self, s: &Shadow, flat: &BitVec) -> usize {
        s.len as usize - flat.count_ones()
    }

    fn project(&self, s: &Arc<Shadow>, p: &Projection) -> CacheResult<Vector> {
        match &*s.meta {
            Metadata::Record { .. } => self.record(s, p),
            Metadata::Nulls { .. } => self.project(&s.child(self.local, 0)?, p),
            Metadata::Named { .. } => {
                let inner = self.project(&s.child(self.local, 0)?, p)?;
                if p.selects_all() {
                    Ok(Vector::named(self.translate(s)?, inner))
                } else {
                    Ok(inner)
                }
            }
            Metadata::Error { .. } => {
                let inner = self.project(&s.child(self.local, 0)?, p)?;
                let ty = if p.selects_all() {
                    self.translate(s)?
                } else {
                    self.sctx.lookup_error(&inner.ty())
                };
                Ok(Vector::error(ty, inner, BitVec::zero()))
            }
            Metadata::Union { .. } => self.union(s, p),
            Metadata::Dynamic { .. } => self.dynamic(s, p),
            _ if !p.selects_all() => Ok(Vector::missing(self.sctx, s.len)),
            Metadata::Array { .. } | Metadata::Set { .. } => self.list(s),
            Metadata::Map { .. } => self.map(s),
            Metadata::Dict { .. } => self.dict(s),
            Metadata::Const { value, .. } => {
                let flat = self.nulls(s)?;
                let value = Value::new(self.translate(s)?, value.clone());
                Ok(Vector::constant(value, s.len, flat.compact()))
            }
            Metadata::Int { .. }
            | Metadata::Uint { .. }
            | Metadata::Float { .. }
            | Metadata::Primitive { .. } => self.leaf(s),
        }
    }

    fn leaf(&self, s: &Shadow) -> CacheResult<Vector> {
        let loaded = s.load(|| {
            let flat = self.nulls(s)?;
            let dense = self.dense_len(s, &flat);
            let n = s.len as usize;
            let ty = s.local_type()?.clone();
            let v = match &*s.meta {
                Metadata::Int { segment, .. } => {
                    let values = decode_ints(&self.loader.read(segment)?, dense)?;
                    Vector::int(ty, extend_for_nulls(values, &flat, n)?, flat.compact())
                }
                Metadata::Uint { segment, .. } => {
                    let values = decode_uints(&self.loader.read(segment)?, dense)?;
                    let values = extend_for_nulls(values, &flat, n)?;
                    if matches!(ty, Type::Enum(_)) {
                        Vector::enumeration(ty, values, flat.compact())
                    } else {
                        Vector::uint(ty, values, flat.compact())
                    }
                }
                Metadata::Float { segment, .. } => {
                    let values = decode_floats(&self.loader.read(segment)?, dense)?;
                    Vector::float(ty, extend_for_nulls(values, &flat, n)?, flat.compact())
                }
                Metadata::Primitive { segment, .. } => {
                    let bytes = self.loader.read(segment)?;
                    let mut bodies = decode_primitives(&bytes, dense)?.into_iter();
                    let mut b = Builder::new(&ty);
                    for slot in 0..s.len {
                        if flat.value(slot) {
                            b.write(None);
                        } else {
                            b.write(bodies.next());
                        }
                    }
                    b.build()
                }
                other => return Err(corrupt(format!("{} is not a leaf", other.kind()))),
            };
            Ok(Loaded::Vector(v))
        })?;
        let Loaded::Vector(v) = &*loaded else {
            return Err(corrupt("leaf loaded as non-vector"));
        };
        // Only enums carry a context-bound type.
        match v {
            Vector::Enum(e) => Ok(Vector::enumeration(
                self.sctx.translate(&e.ty)?,
                e.values.clone(),
                e.nulls.clone(),
            )),
            v => Ok(v.clone()),
        }
    }

    fn offsets(&self, s: &Shadow) -> CacheResult<Arc<Loaded>> {
        s.load(|| {
            let lengths = match &*s.meta {
                Metadata::Array { lengths, .. }
                | Metadata::Set { lengths, .. }
                | Metadata::Map { lengths, .. } => lengths,
                other => return Err(corrupt(format!("{} has no lengths", other.kind()))),
            };
            let flat = self.nulls(s)?;
            let dense = decode_u32s(&self.loader.read(lengths)?)?;
            let lengths = extend_for_nulls(dense, &flat, s.len as usize)?;
            let mut offsets = Vec::with_capacity(lengths.len() + 1);
            let mut end = 0u32;
            offsets.push(end);
            for n in lengths {
                end = end
                    .checked_add(n)
                    .ok_or_else(|| corrupt("container lengths overflow"))?;
                offsets.push(end);
            }
            Ok(Loaded::Offsets(offsets))
        })
    }

    fn list(&self, s: &Arc<Shadow>) -> CacheResult<Vector> {
        let loaded = self.offsets(s)?;
        let Loaded::Offsets(offsets) = &*loaded else {
            return Err(corrupt("lengths loaded as non-offsets"));
        };
        let values = self.project(&s.child(self.local, 0)?, &Projection::all())?;
        check_elements(offsets, &values)?;
        let flat = self.nulls(s)?;
        Ok(Vector::list(
            self.translate(s)?,
            offsets.clone(),
            values,
            flat.compact(),
        ))
    }

    fn map(&self, s: &Arc<Shadow>) -> CacheResult<Vector> {
        let loaded = self.offsets(s)?;
        let Loaded::Offsets(offsets) = &*loaded else {
            return Err(corrupt("lengths loaded as non-offsets"));
        };
        let keys = self.project(&s.child(self.local, 0)?, &Projection::all())?;
        let values = self.project(&s.child(self.local, 1)?, &Projection::all())?;
        check_elements(offsets, &keys)?;
        check_elements(offsets, &values)?;
        let flat = self.nulls(s)?;
        Ok(Vector::map(
            self.translate(s)?,
            offsets.clone(),
            keys,
            values,
            flat.compact(),
        ))
    }

    fn dict(&self, s: &Arc<Shadow>) -> CacheResult<Vector> {
        let inner = self.project(&s.child(self.local, 0)?, &Projection::all())?;
        let loaded = s.load(|| {
            let Metadata::Dict { index, counts, .. } = &*s.meta else {
                return Err(corrupt("not a dict"));
            };
            let flat = self.nulls(s)?;
            let dense = self.loader.read(index)?;
            if dense.len() != self.dense_len(s, &flat) {
                return Err(corrupt("dict index does not match its row count"));
            }
            if dense.iter().any(|&k| u32::from(k) >= inner.len()) {
                return Err(corrupt("dict index out of range"));
            }
            let index = extend_for_nulls(dense, &flat, s.len as usize)?;
            let counts = decode_u32s(&self.loader.read(counts)?)?;
            Ok(Loaded::Dict { index, counts })
        })?;
        let Loaded::Dict { index, counts } = &*loaded else {
            return Err(corrupt("dict loaded as non-dict"));
        };
        let flat = self.nulls(s)?;
        Ok(Vector::dict(inner, index.clone(), counts.clone(), flat.compact()))
    }

    /// Dense tags of a union or dynamic, checked against the child count.
    fn tags(&self, s: &Shadow, nchildren: usize) -> CacheResult<Arc<Loaded>> {
        s.load(|| {
            let tags = match &*s.meta {
                Metadata::Union { tags, .. } | Metadata::Dynamic { tags, .. } => tags,
                other => return Err(corrupt(format!("{} has no tags", other.kind()))),
            };
            let flat = self.nulls(s)?;
            let tags = decode_u32s(&self.loader.read(tags)?)?;
            if tags.len() != self.dense_len(s, &flat) {
                return Err(corrupt("tag count does not match its row count"));
            }
            if tags.iter().any(|&t| t as usize >= nchildren) {
                return Err(corrupt("tag out of range"));
            }
            Ok(Loaded::Tags(tags))
        })
    }

    fn children(&self, s: &Arc<Shadow>, p: &Projection) -> CacheResult<Vec<Vector>> {
        (0..s.child_count())
            .map(|k| self.project(&s.child(self.local, k)?, p))
            .collect()
    }

    fn dynamic(&self, s: &Arc<Shadow>, p: &Projection) -> CacheResult<Vector> {
        let loaded = self.tags(s, s.child_count())?;
        let Loaded::Tags(tags) = &*loaded else {
            return Err(corrupt("tags loaded as non-tags"));
        };
        let values = self.children(s, p)?;
        let flat = self.nulls(s)?;
        let (tags, values) = flatten_union_nulls(&Type::Null, tags, values, &flat);
        Ok(Vector::dynamic(tags, values))
    }

    fn union(&self, s: &Arc<Shadow>, p: &Projection) -> CacheResult<Vector> {
        let Metadata::Union { members, .. } = &*s.meta else {
            return Err(corrupt("not a union"));
        };
        let loaded = self.tags(s, s.child_count())?;
        let Loaded::Tags(tags) = &*loaded else {
            return Err(corrupt("tags loaded as non-tags"));
        };
        let values = self.children(s, p)?;
        let flat = self.nulls(s)?;
        let (ty, types) = if p.selects_all() {
            let types = members
                .iter()
                .map(|m| Ok(self.sctx.translate(&self.local.lookup_by_value(m)?)?))
                .collect::<CacheResult<Vec<Type>>>()?;
            (self.translate(s)?, types)
        } else {
            let types: Vec<Type> = values.iter().map(Vector::ty).collect();
            (self.sctx.lookup_union(&types), types)
        };
        // Children are stored in the writer's member order, which need not be ours.
        let remap = match &ty {
            Type::Union(u)
                if u.types().len() == values.len() && !values.iter().any(Vector::is_dynamic) =>
            {
                types.iter().map(|t| u.tag_of(t)).collect::<Option<Vec<usize>>>()
            }
            _ => None,
        };
        let Some(remap) = remap else {
            // Projected members collapsed onto one type; fall back to a dynamic.
            let (tags, values) = flatten_union_nulls(&Type::Null, tags, values, &flat);
            return Ok(Vector::dynamic(tags, values));
        };
        let mut ordered = vec![None; values.len()];
        for (k, v) in values.into_iter().enumerate() {
            ordered[remap[k]] = Some(v);
        }
        let ordered = ordered
            .into_iter()
            .collect::<Option<Vec<Vector>>>()
            .ok_or_else(|| corrupt("union members are not distinct"))?;
        let tags: Vec<u32> = tags.iter().map(|&t| remap[t as usize] as u32).collect();
        Ok(union_with_nulls(ty, &tags, ordered, flat))
    }

    fn record(&self, s: &Arc<Shadow>, p: &Projection) -> CacheResult<Vector> {
        let Metadata::Record { fields, .. } = &*s.meta else {
            return Err(corrupt("not a record"));
        };
        let flat = self.nulls(s)?;
        let wanted: Vec<(String, Option<usize>, Projection)> = match p.split() {
            None => fields
                .iter()
                .enumerate()
                .map(|(k, f)| (f.name.clone(), Some(k), Projection::all()))
                .collect(),
            Some(heads) => heads
                .into_iter()
                .map(|(name, sub)| {
                    let k = fields.iter().position(|f| f.name == name);
                    (name, k, sub)
                })
                .collect(),
        };
        let columns = map_ordered(&wanted, |(_, k, sub)| match k {
            Some(k) => self.project(&s.child(self.local, *k)?, sub),
            None => Ok(Vector::missing(self.sctx, s.len)),
        })
        .into_iter()
        .collect::<CacheResult<Vec<Vector>>>()?;
        if p.selects_all() {
            return Ok(Vector::record(self.translate(s)?, columns, s.len, flat.compact()));
        }
        if columns.iter().any(Vector::is_dynamic) {
            let paths: Vec<Vec<String>> = wanted.iter().map(|(n, _, _)| vec![n.clone()]).collect();
            let rec = RecordBuilder::new(&paths)?.build(self.sctx, &columns)?;
            return Ok(if flat.any() { add_nulls(&rec, &flat) } else { rec });
        }
        let typed = wanted
            .iter()
            .zip(&columns)
            .map(|((name, _, _), v)| Field::new(name.clone(), v.ty()))
            .collect();
        let ty = self.sctx.lookup_record(typed)?;
        Ok(Vector::record(ty, columns, s.len, flat.compact()))
    }
}

fn check_elements(offsets: &[u32], values: &Vector) -> CacheResult<()> {
    match offsets.last() {
        Some(&end) if end == values.len() => Ok(()),
        _ => Err(corrupt("container lengths do not match element count")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(p: &Projection) -> Vec<(String, Projection)> {
        p.split().unwrap()
    }

    #[test]
    fn forks_group_by_leading_field() {
        let p = Projection::from_paths(&[&["a", "b"], &["c"], &["a", "d"]]);
        let split = names(&p);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].0, "a");
        assert_eq!(
            split[0].1,
            Projection::fork(vec![Projection::field("b"), Projection::field("d")])
        );
        assert_eq!(split[1], ("c".to_string(), Projection::all()));
    }

    #[test]
    fn an_empty_branch_selects_the_whole_field() {
        let p = Projection::fork(vec![Projection::path(["a", "b"]), Projection::field("a")]);
        assert_eq!(names(&p), vec![("a".to_string(), Projection::all())]);
        assert!(Projection::fork(vec![Projection::all()]).split().is_none());
        assert!(Projection::all().split().is_none());
    }
}
