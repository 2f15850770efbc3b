use crate::encode::{
    append_primitive, encode_floats, encode_ints, encode_u32s, encode_uints, null_runs,
};
use crate::error::CacheResult;
use crate::meta::{FieldMeta, Metadata, Segment, Trailer, FORMAT_VERSION};
use crate::object::MAGIC;
use std::path::Path;
use std::sync::Arc;
use strata_vector::{nulls_of, Vector};

/// Encodes a vector into a columnar object.
///
/// Null rows are factored out into `Nulls` nodes at the level where they occur, so every
/// value segment holds only non-null rows.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    buf: Vec<u8>,
}

impl ObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `v` and returns the finished object bytes.
    pub fn write(mut self, v: &Vector) -> CacheResult<Vec<u8>> {
        let rows: Vec<u32> = (0..v.len()).collect();
        let root = Arc::new(self.node(v, &rows));
        let trailer = serde_json::to_vec(&Trailer {
            version: FORMAT_VERSION,
            root,
        })?;
        self.buf.extend_from_slice(&trailer);
        self.buf
            .extend_from_slice(&(trailer.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(MAGIC);
        Ok(self.buf)
    }

    pub fn write_to_path(v: &Vector, path: impl AsRef<Path>) -> CacheResult<()> {
        let bytes = ObjectWriter::new().write(v)?;
        std::fs::write(path.as_ref(), bytes)?;
        log::debug!(
            "wrote columnar object {} ({} rows)",
            path.as_ref().display(),
            v.len()
        );
        Ok(())
    }

    fn segment(&mut self, bytes: Vec<u8>) -> Segment {
        let seg = Segment {
            offset: self.buf.len() as u64,
            length: bytes.len() as u64,
        };
        self.buf.extend_from_slice(&bytes);
        seg
    }

    fn node(&mut self, v: &Vector, rows: &[u32]) -> Metadata {
        match v {
            Vector::View(view) => {
                let rows: Vec<u32> = rows.iter().map(|&r| view.index[r as usize]).collect();
                return self.node(&view.inner, &rows);
            }
            // Nulls of a dynamic live in its children.
            Vector::Dynamic(_) => return self.body(v, rows),
            _ => {}
        }
        let nulls = nulls_of(v);
        if !rows.iter().any(|&r| nulls.value(r)) {
            return self.body(v, rows);
        }
        let runs = null_runs(rows.iter().map(|&r| nulls.value(r)));
        let dense: Vec<u32> = rows.iter().copied().filter(|&r| !nulls.value(r)).collect();
        let count = (rows.len() - dense.len()) as u32;
        Metadata::Nulls {
            runs: self.segment(encode_u32s(&runs)),
            count,
            values: Arc::new(self.body(v, &dense)),
        }
    }

    fn nodes_by_tag(
        &mut self,
        tags: &[u32],
        forward: &[u32],
        children: &[Vector],
        rows: &[u32],
    ) -> Vec<Arc<Metadata>> {
        let mut child_rows = vec![Vec::new(); children.len()];
        for &r in rows {
            if let Some(list) = child_rows.get_mut(tags[r as usize] as usize) {
                list.push(forward[r as usize]);
            }
        }
        children
            .iter()
            .zip(&child_rows)
            .map(|(child, rows)| Arc::new(self.node(child, rows)))
            .collect()
    }

    fn body(&mut self, v: &Vector, rows: &[u32]) -> Metadata {
        let len = rows.len() as u32;
        let at = |r: &u32| *r as usize;
        match v {
            Vector::Int(iv) => Metadata::Int {
                ty: iv.ty.encoded(),
                segment: self.segment(encode_ints(rows.iter().map(|r| iv.values[at(r)]))),
                len,
            },
            Vector::Uint(uv) => Metadata::Uint {
                ty: uv.ty.encoded(),
                segment: self.segment(encode_uints(rows.iter().map(|r| uv.values[at(r)]))),
                len,
            },
            Vector::Enum(ev) => Metadata::Uint {
                ty: ev.ty.encoded(),
                segment: self.segment(encode_uints(rows.iter().map(|r| ev.values[at(r)]))),
                len,
            },
            Vector::Float(fv) => Metadata::Float {
                ty: fv.ty.encoded(),
                segment: self.segment(encode_floats(rows.iter().map(|r| fv.values[at(r)]))),
                len,
            },
            Vector::Bool(_)
            | Vector::String(_)
            | Vector::Bytes(_)
            | Vector::TypeValue(_)
            | Vector::Ip(_)
            | Vector::Net(_) => {
                let mut out = Vec::new();
                let mut body = Vec::new();
                for &r in rows {
                    body.clear();
                    v.append_slot(r, &mut body);
                    append_primitive(&mut out, &body);
                }
                Metadata::Primitive {
                    ty: v.ty().encoded(),
                    segment: self.segment(out),
                    len,
                }
            }
            Vector::Array(a) | Vector::Set(a) => {
                let mut lengths = Vec::with_capacity(rows.len());
                let mut elems = Vec::new();
                for &r in rows {
                    let (start, end) = a.range(r);
                    lengths.push(end - start);
                    elems.extend(start..end);
                }
                let lengths = self.segment(encode_u32s(&lengths));
                let values = Arc::new(self.node(&a.values, &elems));
                let ty = a.ty.encoded();
                if matches!(v, Vector::Set(_)) {
                    Metadata::Set {
                        ty,
                        lengths,
                        values,
                        len,
                    }
                } else {
                    Metadata::Array {
                        ty,
                        lengths,
                        values,
                        len,
                    }
                }
            }
            Vector::Map(m) => {
                let mut lengths = Vec::with_capacity(rows.len());
                let mut elems = Vec::new();
                for &r in rows {
                    let (start, end) = m.range(r);
                    lengths.push(end - start);
                    elems.extend(start..end);
                }
                Metadata::Map {
                    ty: m.ty.encoded(),
                    lengths: self.segment(encode_u32s(&lengths)),
                    keys: Arc::new(self.node(&m.keys, &elems)),
                    values: Arc::new(self.node(&m.values, &elems)),
                    len,
                }
            }
            Vector::Record(rec) => {
                let names: Vec<String> = rec
                    .ty
                    .as_record()
                    .map(|r| r.fields().iter().map(|f| f.name.clone()).collect())
                    .unwrap_or_default();
                let fields = names
                    .into_iter()
                    .zip(&rec.fields)
                    .map(|(name, field)| FieldMeta {
                        name,
                        values: Arc::new(self.node(field, rows)),
                    })
                    .collect();
                Metadata::Record {
                    ty: rec.ty.encoded(),
                    fields,
                    len,
                }
            }
            Vector::Union(u) => {
                let members: Vec<Vec<u8>> = match u.ty.under() {
                    strata_vector::Type::Union(ut) => ut.types().iter().map(|t| t.encoded()).collect(),
                    _ => Vec::new(),
                };
                let children = &u.values()[..members.len().min(u.values().len())];
                let tags = u.tags();
                let forward = &u.dynamic.tag_map().forward;
                let dense: Vec<u32> = rows.iter().map(|&r| tags[r as usize]).collect();
                let values = self.nodes_by_tag(tags, forward, children, rows);
                Metadata::Union {
                    ty: u.ty.encoded(),
                    members,
                    tags: self.segment(encode_u32s(&dense)),
                    values,
                    len,
                }
            }
            Vector::Named(n) => Metadata::Named {
                ty: n.ty.encoded(),
                values: Arc::new(self.node(&n.inner, rows)),
            },
            Vector::Error(e) => Metadata::Error {
                ty: e.ty.encoded(),
                values: Arc::new(self.node(&e.inner, rows)),
            },
            Vector::Const(c) => Metadata::Const {
                ty: c.value.ty().encoded(),
                value: c.value.bytes().map(<[u8]>::to_vec),
                len,
            },
            Vector::Dict(d) => {
                let index: Vec<u8> = rows.iter().map(|&r| d.index[r as usize]).collect();
                let mut counts = vec![0u32; d.inner.len() as usize];
                for &k in &index {
                    if let Some(c) = counts.get_mut(k as usize) {
                        *c += 1;
                    }
                }
                let all: Vec<u32> = (0..d.inner.len()).collect();
                Metadata::Dict {
                    index: self.segment(index),
                    counts: self.segment(encode_u32s(&counts)),
                    values: Arc::new(self.node(&d.inner, &all)),
                    len,
                }
            }
            Vector::View(view) => {
                let rows: Vec<u32> = rows.iter().map(|&r| view.index[r as usize]).collect();
                self.body(&view.inner, &rows)
            }
            Vector::Dynamic(d) => {
                let dense: Vec<u32> = rows.iter().map(|&r| d.tags[r as usize]).collect();
                let forward = &d.tag_map().forward;
                let values = self.nodes_by_tag(&d.tags, forward, &d.values, rows);
                Metadata::Dynamic {
                    tags: self.segment(encode_u32s(&dense)),
                    values,
                    len,
                }
            }
        }
    }
}
