//! Full-value search and regular-expression matching.

use crate::access::{byte_slots, expand_const, flatten_bool};
use crate::compare::{compare, CompareOp};
use crate::{Evaluator, Expr};
use regex::Regex;
use std::sync::Arc;
use strata_vector::{apply, deunion, nulls_of, BitVec, Type, TypeContext, Value, Vector};

/// What a [`Search`] looks for.
#[derive(Clone, Debug)]
pub enum SearchPattern {
    /// Case-insensitive substring of any string, or of any field name.
    Text(String),
    /// Regular expression over strings and field names.
    Regex(Regex),
    /// Equality with a value (containment for a net against IPs), plus a case-insensitive
    /// substring match of its text form against strings.
    Value { text: String, value: Value },
}

impl SearchPattern {
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_lowercase())
    }

    pub fn value(text: &str, value: Value) -> Self {
        Self::Value {
            text: text.to_lowercase(),
            value,
        }
    }

    fn string_matches(&self, s: &str) -> bool {
        match self {
            Self::Text(needle) | Self::Value { text: needle, .. } => {
                s.to_lowercase().contains(needle.as_str())
            }
            Self::Regex(re) => re.is_match(s),
        }
    }

    fn matches_field_names(&self) -> bool {
        !matches!(self, Self::Value { .. })
    }
}

/// Searches every value reachable from an expression, descending into records, lists, maps,
/// unions and errors. A row matches when any nested value matches.
#[derive(Debug)]
pub struct Search {
    ctx: Arc<TypeContext>,
    pattern: SearchPattern,
    expr: Expr,
}

impl Search {
    pub fn new(ctx: Arc<TypeContext>, pattern: SearchPattern, expr: Expr) -> Self {
        Self { ctx, pattern, expr }
    }

    /// True when a field name anywhere in `ty` satisfies the pattern.
    fn field_name_match(&self, ty: &Type, prefix: &str) -> bool {
        match ty.under() {
            Type::Record(r) => r.fields().iter().any(|f| {
                let path = if prefix.is_empty() {
                    f.name.clone()
                } else {
                    format!("{prefix}.{}", f.name)
                };
                self.pattern.string_matches(&path) || self.field_name_match(&f.ty, &path)
            }),
            Type::Array(a) | Type::Set(a) => self.field_name_match(a.elem(), ""),
            Type::Map(m) => self.field_name_match(m.key(), "") || self.field_name_match(m.val(), ""),
            Type::Union(u) => u.types().iter().any(|t| self.field_name_match(t, "")),
            Type::Error(e) => self.field_name_match(e.inner(), ""),
            _ => false,
        }
    }

    /// Match bits for every slot of `v`.
    fn hits(&self, v: &Vector) -> BitVec {
        let n = v.len() as usize;
        if self.pattern.matches_field_names() && self.field_name_match(&v.ty(), "") {
            return BitVec::with_len_all_true(n);
        }
        let (inner, index) = match v.under() {
            Vector::View(view) => (view.inner.under(), Some(view.index.as_slice())),
            v => (v, None),
        };
        let inner_bits = match inner {
            Vector::Dynamic(d) => {
                let map = d.tag_map();
                let mut out = BitVec::with_len_all_false(d.len() as usize);
                for (tag, child) in d.values.iter().enumerate() {
                    let bits = self.hits(child);
                    for (j, &slot) in map.reverse[tag].iter().enumerate() {
                        if bits.value(j as u32) {
                            out.set(slot as usize, true);
                        }
                    }
                }
                out
            }
            Vector::Union(_) => self.hits(&deunion(inner)),
            Vector::Named(named) => self.hits(&named.inner),
            Vector::Error(err) => self.hits(&err.inner),
            Vector::Const(_) if !inner.ty().is_primitive() => self.hits(&expand_const(inner)),
            Vector::Record(rec) => {
                let mut out = BitVec::with_len_all_false(inner.len() as usize);
                for field in &rec.fields {
                    out.or_inplace(&self.hits(field));
                }
                out
            }
            Vector::Array(list) | Vector::Set(list) => {
                let elems = self.hits(&list.values);
                BitVec::from_bools((0..list.len()).map(|row| {
                    let (start, end) = list.range(row);
                    (start..end).any(|e| elems.value(e))
                }))
            }
            Vector::Map(map) => {
                let keys = self.hits(&map.keys);
                let vals = self.hits(&map.values);
                BitVec::from_bools((0..map.len()).map(|row| {
                    let (start, end) = map.range(row);
                    (start..end).any(|e| keys.value(e) || vals.value(e))
                }))
            }
            _ => self.match_primitive(inner),
        };
        match index {
            Some(index) => inner_bits.pick(index).expand(n),
            None => inner_bits.expand(n),
        }
    }

    fn match_primitive(&self, v: &Vector) -> BitVec {
        let n = v.len() as usize;
        let nulls = nulls_of(v);
        let ty = v.ty();
        if matches!(ty.under(), Type::String) {
            let Some(slots) = byte_slots(v) else {
                return BitVec::with_len_all_false(n);
            };
            return BitVec::from_bools(
                (0..n).map(|i| !nulls.value(i as u32) && self.pattern.string_matches(slots.str(i))),
            );
        }
        let SearchPattern::Value { value, .. } = &self.pattern else {
            return BitVec::with_len_all_false(n);
        };
        if let (Some(net), Type::Ip) = (value.as_net(), ty.under()) {
            return BitVec::from_bools((0..v.len()).map(|i| {
                !nulls.value(i) && v.value_at(i).as_ip().is_some_and(|ip| net.contains(ip))
            }));
        }
        let rhs = Vector::constant(value.clone(), v.len(), BitVec::zero());
        let eq = compare(&self.ctx, CompareOp::Eq, v, &rhs);
        match flatten_bool(&eq) {
            Some((bits, nulls)) => BitVec::and_not(&bits, &nulls).expand(n),
            None => BitVec::with_len_all_false(n),
        }
    }
}

impl Evaluator for Search {
    fn eval(&self, this: &Vector) -> Vector {
        let v = self.expr.eval(this);
        Vector::bool(self.hits(&v), BitVec::zero())
    }
}

/// `s ~ /re/`: true where a string matches, false for non-strings, null for null strings.
#[derive(Debug)]
pub struct RegexpMatch {
    re: Regex,
    expr: Expr,
}

impl RegexpMatch {
    pub fn new(re: Regex, expr: Expr) -> Self {
        Self { re, expr }
    }

    fn eval_one(&self, v: &Vector) -> Vector {
        let n = v.len();
        if let Vector::Const(c) = v.under() {
            if c.value.ty().is_null() {
                return Vector::constant(Value::null(Type::Bool), n, BitVec::zero());
            }
        }
        if !matches!(v.ty().under(), Type::String) {
            return Vector::constant(Value::bool(false), n, BitVec::zero());
        }
        let nulls = nulls_of(v);
        let Some(slots) = byte_slots(v) else {
            return Vector::constant(Value::bool(false), n, BitVec::zero());
        };
        let bits = BitVec::from_bools(
            (0..n).map(|i| !nulls.value(i) && self.re.is_match(slots.str(i as usize))),
        );
        Vector::bool(bits, nulls)
    }
}

impl Evaluator for RegexpMatch {
    fn eval(&self, this: &Vector) -> Vector {
        let v = self.expr.eval(this);
        apply(true, &mut |vecs: &[Vector]| self.eval_one(&vecs[0]), &[v])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::test_support::{col, show};
    use crate::This;
    use pretty_assertions::assert_eq;

    fn search(ctx: &Arc<TypeContext>, pattern: SearchPattern, input: &str) -> Vec<String> {
        let s = Search::new(ctx.clone(), pattern, Arc::new(This));
        show(&s.eval(&col(ctx, input)))
    }

    #[test]
    fn substring_search_is_case_insensitive_and_nested() {
        let ctx = Arc::new(TypeContext::new());
        let input = "{a:\"Hello\"} {a:[\"x\",\"xhellox\"]} {a:1} {a:|{\"k\":\"HELLO\"}|}";
        assert_eq!(
            search(&ctx, SearchPattern::text("hello"), input),
            ["true", "true", "false", "true"]
        );
    }

    #[test]
    fn field_names_match_text_and_regex() {
        let ctx = Arc::new(TypeContext::new());
        let input = "{hello:1} {b:{c:2}} {x:3}";
        assert_eq!(search(&ctx, SearchPattern::text("hello"), input), ["true", "false", "false"]);
        let re = Regex::new(r"^b\.c$").unwrap();
        assert_eq!(search(&ctx, SearchPattern::Regex(re), input), ["false", "true", "false"]);
    }

    #[test]
    fn value_search_compares_and_contains() {
        let ctx = Arc::new(TypeContext::new());
        let net = Value::net("10.0.0.0/8".parse().unwrap());
        let input = "{ip:10.1.2.3} {ip:192.168.0.1} {s:\"10.0.0.0/8\"}";
        let out = search(&ctx, SearchPattern::value("10.0.0.0/8", net), input);
        assert_eq!(out, ["true", "false", "true"]);
        let input = "{n:[1,2]} {n:[3]} {e:error(2)}";
        let out = search(&ctx, SearchPattern::value("2", Value::int64(2)), input);
        assert_eq!(out, ["true", "false", "true"]);
    }

    #[test]
    fn regexp_match_nulls_and_non_strings() {
        let ctx = Arc::new(TypeContext::new());
        let m = RegexpMatch::new(Regex::new("^a").unwrap(), Arc::new(This));
        let out = show(&m.eval(&col(&ctx, "\"abc\" \"xa\" 1 null")));
        assert_eq!(out, ["true", "false", "false", "null"]);
    }
}
