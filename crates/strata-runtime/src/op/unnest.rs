use crate::error::RuntimeResult;
use crate::Puller;
use std::sync::Arc;
use strata_expr::Expr;
use strata_vector::{apply, deunion, pick, stitch, TypeContext, Vector};

const NON_ARRAY: &str = "unnest: encountered non-array value";
const NOT_TWO_COLUMNS: &str = "unnest: encountered record without two columns";
const NO_ARRAY_COLUMN: &str = "unnest: encountered record without an array/set column";

/// Flattens the array or set each row evaluates to.
///
/// A two-field record whose second field is an array or set flattens that field and repeats
/// the first alongside every element. Null rows and empty containers produce nothing; any
/// other value produces one error row.
#[derive(Debug)]
pub struct Unnest<P> {
    ctx: Arc<TypeContext>,
    parent: P,
    expr: Expr,
}

impl<P: Puller> Unnest<P> {
    pub fn new(ctx: Arc<TypeContext>, parent: P, expr: Expr) -> Self {
        Self { ctx, parent, expr }
    }
}

impl<P: Puller> Puller for Unnest<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        loop {
            let Some(vec) = self.parent.pull(done)? else {
                return Ok(None);
            };
            let vals = self.expr.eval(&vec);
            let slots: Vec<u32> = (0..vals.len()).collect();
            let (out, _) = flatten(&self.ctx, &vals, &slots);
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }
}

/// Flattens the rows of `vec` at `slots`, in order. Also returns how many output rows each
/// slot produced.
fn flatten(ctx: &TypeContext, vec: &Vector, slots: &[u32]) -> (Vector, Vec<u32>) {
    match vec.under() {
        Vector::View(view) => {
            let slots: Vec<u32> = slots.iter().map(|&s| view.index[s as usize]).collect();
            flatten(ctx, &view.inner, &slots)
        }
        Vector::Union(_) => flatten(ctx, &deunion(vec), slots),
        Vector::Dynamic(d) => {
            let map = d.tag_map();
            let mut child_slots = vec![Vec::new(); d.values.len()];
            for &s in slots {
                child_slots[d.tags[s as usize] as usize].push(map.forward[s as usize]);
            }
            let (results, child_counts): (Vec<Vector>, Vec<Vec<u32>>) = d
                .values
                .iter()
                .zip(&child_slots)
                .map(|(child, slots)| flatten(ctx, child, slots))
                .unzip();
            let mut next = vec![0usize; d.values.len()];
            let mut tags = Vec::new();
            let mut counts = Vec::with_capacity(slots.len());
            for &s in slots {
                let tag = d.tags[s as usize];
                let n = child_counts[tag as usize][next[tag as usize]];
                next[tag as usize] += 1;
                tags.extend(std::iter::repeat(tag).take(n as usize));
                counts.push(n);
            }
            (stitch(&tags, results), counts)
        }
        Vector::Array(a) | Vector::Set(a) => {
            let mut index = Vec::new();
            let mut counts = Vec::with_capacity(slots.len());
            for &s in slots {
                if a.nulls.value(s) {
                    counts.push(0);
                    continue;
                }
                let (start, end) = a.range(s);
                index.extend(start..end);
                counts.push(end - start);
            }
            (pick(&deunion(&a.values), &index), counts)
        }
        Vector::Record(rec) => {
            let live: Vec<u32> = slots.iter().copied().filter(|&s| !rec.nulls.value(s)).collect();
            let per_slot = |n: &dyn Fn(usize) -> u32| {
                let mut k = 0;
                slots
                    .iter()
                    .map(|&s| {
                        if rec.nulls.value(s) {
                            0
                        } else {
                            k += 1;
                            n(k - 1)
                        }
                    })
                    .collect::<Vec<u32>>()
            };
            let msg = if rec.fields.len() != 2 {
                Some(NOT_TWO_COLUMNS)
            } else if rec.fields[1].ty().inner_elem().is_none() {
                Some(NO_ARRAY_COLUMN)
            } else {
                None
            };
            if let Some(msg) = msg {
                let on = pick(vec, &live);
                return (Vector::wrapped_error(ctx, msg, &on), per_slot(&|_| 1));
            }
            let (right, right_counts) = flatten(ctx, &rec.fields[1], &live);
            let mut left_index = Vec::with_capacity(right.len() as usize);
            for (&s, &n) in live.iter().zip(&right_counts) {
                left_index.extend(std::iter::repeat(s).take(n as usize));
            }
            let counts = per_slot(&|k| right_counts[k]);
            if right.is_empty() {
                return (Vector::const_null(0), counts);
            }
            let left = pick(&rec.fields[0], &left_index);
            let names: Vec<&str> = match rec.ty.as_record() {
                Some(rt) => rt.fields().iter().map(|f| f.name.as_str()).collect(),
                None => vec!["left", "right"],
            };
            let out = apply(
                true,
                &mut |vecs: &[Vector]| {
                    Vector::record_of(ctx, &names, vecs.to_vec(), vecs[0].len())
                        .unwrap_or_else(|err| Vector::string_error(ctx, &err.to_string(), vecs[0].len()))
                },
                &[left, right],
            );
            (out, counts)
        }
        Vector::Const(_) | Vector::Dict(_) => {
            // Null rows produce nothing; the rest are rebuilt as flat vectors, which are
            // never Const or Dict once nulls are gone.
            let values: Vec<_> = slots.iter().map(|&s| vec.value_at(s)).collect();
            let live: Vec<_> = values.iter().filter(|v| !v.is_null()).cloned().collect();
            if live.is_empty() {
                return (Vector::const_null(0), vec![0; slots.len()]);
            }
            let flat = Vector::from_values(&live);
            let all: Vec<u32> = (0..flat.len()).collect();
            let (out, live_counts) = flatten(ctx, &flat, &all);
            let mut live_counts = live_counts.into_iter();
            let counts = values
                .iter()
                .map(|v| if v.is_null() { 0 } else { live_counts.next().unwrap_or(0) })
                .collect();
            (out, counts)
        }
        _ => {
            let on = pick(vec, slots);
            (Vector::wrapped_error(ctx, NON_ARRAY, &on), vec![1; slots.len()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;
    use strata_expr::This;

    #[test]
    fn arrays_flatten_and_skip_empties() {
        let ctx = query();
        let input = source(&ctx, &["{a:[1,2]} {a:[]} {a:[\"x\"]}"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, field(&ctx, "a"));
        assert_eq!(rows(&mut unnest), ["1", "2", "\"x\""]);
    }

    #[test]
    fn mixed_element_types_stay_in_row_order() {
        let ctx = query();
        let input = source(&ctx, &["[1,\"a\"] [2] |[\"b\"]|"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
        assert_eq!(rows(&mut unnest), ["1", "\"a\"", "2", "\"b\""]);
    }

    #[test]
    fn two_field_records_repeat_the_left_side() {
        let ctx = query();
        let input = source(&ctx, &["{g:\"x\",xs:[1,2,3]} {g:\"y\",xs:[]}"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
        assert_eq!(rows(&mut unnest), ["{g:\"x\",xs:1}", "{g:\"x\",xs:2}", "{g:\"x\",xs:3}"]);
    }

    #[test]
    fn null_rows_produce_nothing() {
        let ctx = query();
        let input = source(&ctx, &["null", "null null"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
        assert!(unnest.pull(false).unwrap().is_none());
    }

    #[test]
    fn nulls_mixed_with_arrays_are_skipped() {
        let ctx = query();
        let input = source(&ctx, &["[1,2] null [3]", "null [4]"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
        assert_eq!(rows(&mut unnest), ["1", "2", "3", "4"]);
    }

    #[test]
    fn constant_arrays_flatten_per_row() {
        let ctx = query();
        let input = source(&ctx, &["1 2"]);
        let xs: Expr = Arc::new(strata_expr::Literal::new(
            strata_vector::sup::parse_value(&ctx.types, "[7,8]").unwrap(),
        ));
        let mut unnest = Unnest::new(ctx.types.clone(), input, xs);
        assert_eq!(rows(&mut unnest), ["7", "8", "7", "8"]);
    }

    #[test]
    fn non_arrays_become_errors() {
        let ctx = query();
        let input = source(&ctx, &["1 {a:1,b:2} {a:1,b:[2]} {a:1,b:2,c:[3]}"]);
        let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
        let got = rows(&mut unnest);
        assert_eq!(got.len(), 4);
        assert!(got[0].contains("non-array value"));
        assert!(got[1].contains("without an array/set column"));
        assert_eq!(got[2], "{a:1,b:2}");
        assert!(got[3].contains("without two columns"));
    }
}
