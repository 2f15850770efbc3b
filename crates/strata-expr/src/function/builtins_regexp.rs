use super::{strings, with_errors, BytesOut, CallContext, FunctionSpec};
use crate::access::{is_error, ByteSlots};
use ahash::AHashMap;
use regex::Regex;
use strata_vector::{nulls_of, pick, BitVec, Type, Vector};

inventory::submit! {
    FunctionSpec { name: "regexp", min_args: 2, max_args: 2, rip_unions: true, implementation: regexp_fn }
}

inventory::submit! {
    FunctionSpec { name: "regexp_replace", min_args: 3, max_args: 3, rip_unions: true, implementation: regexp_replace_fn }
}

/// Compiles each distinct pattern once per batch.
#[derive(Default)]
struct Patterns<'a> {
    compiled: AHashMap<&'a str, Option<Regex>>,
}

impl<'a> Patterns<'a> {
    fn get(&mut self, pattern: &'a str) -> Option<&Regex> {
        self.compiled
            .entry(pattern)
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::debug!("invalid regular expression {pattern:?}: {err}");
                    None
                }
            })
            .as_ref()
    }
}

fn invalid(cx: &CallContext<'_>, name: &str, patterns: &Vector, rows: &[u32]) -> Vector {
    let msg = format!("{name}: invalid regular expression");
    Vector::wrapped_error(cx.types, &msg, &pick(patterns, rows))
}

/// The whole match and its capture groups as an array of strings, null when nothing matches.
fn regexp_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let (re, s) = (&args[0], &args[1]);
    for v in [re, s] {
        if is_error(v) {
            return v.clone();
        }
    }
    let Some(res) = strings(re) else {
        return Vector::wrapped_error(cx.types, "regexp: string required for first arg", re);
    };
    let Some(ss) = strings(s) else {
        return Vector::wrapped_error(cx.types, "regexp: string required for second arg", s);
    };
    let in_nulls = BitVec::or(&nulls_of(re), &nulls_of(s));
    let mut patterns = Patterns::default();
    let mut offsets = vec![0u32];
    let mut groups = BytesOut::with_capacity(re.len() as usize);
    let mut nulls = Vec::with_capacity(re.len() as usize);
    let mut errs = Vec::new();
    let mut count = 0u32;
    for i in 0..re.len() {
        let k = i as usize;
        if in_nulls.value(i) {
            nulls.push(true);
            offsets.push(count);
            continue;
        }
        let Some(pattern) = patterns.get(res.str(k)) else {
            errs.push(i);
            continue;
        };
        match pattern.captures(ss.str(k)) {
            Some(caps) => {
                for group in caps.iter() {
                    groups.push(group.map_or(&b""[..], |m| m.as_str().as_bytes()));
                    count += 1;
                }
                nulls.push(false);
            }
            None => nulls.push(true),
        }
        offsets.push(count);
    }
    let ty = cx.types.lookup_array(&Type::String);
    let out = Vector::array(ty, offsets, groups.strings(), BitVec::from_bools(nulls).compact());
    with_errors(out, &errs, |_| invalid(cx, "regexp", re, &errs))
}

fn regexp_replace_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let mut slots: Vec<ByteSlots<'_>> = Vec::with_capacity(3);
    for v in args {
        if is_error(v) {
            return v.clone();
        }
        match strings(v) {
            Some(s) => slots.push(s),
            None => {
                return Vector::wrapped_error(cx.types, "regexp_replace: string arg required", v)
            }
        }
    }
    let nulls = args.iter().fold(BitVec::zero(), |acc, v| BitVec::or(&acc, &nulls_of(v)));
    let mut patterns = Patterns::default();
    let mut out = BytesOut::with_capacity(args[0].len() as usize);
    let mut errs = Vec::new();
    for i in 0..args[0].len() {
        let k = i as usize;
        if nulls.value(i) {
            out.push_null();
            continue;
        }
        match patterns.get(slots[1].str(k)) {
            Some(re) => out.push(re.replace_all(slots[0].str(k), slots[2].str(k)).as_bytes()),
            None => errs.push(i),
        }
    }
    with_errors(out.strings(), &errs, |_| invalid(cx, "regexp_replace", &args[1], &errs))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run, show};
    use crate::{dotted_path, Evaluator, Literal};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::{TypeContext, Value};

    #[test]
    fn regexp_returns_groups_or_null() {
        let ctx = Arc::new(TypeContext::new());
        let args = vec![
            Arc::new(Literal::new(Value::string("(a+)(b)?"))) as crate::Expr,
            dotted_path(&ctx, &["s"]),
        ];
        let call = super::super::call(ctx.clone(), "regexp", args).unwrap();
        let out = show(&call.eval(&col(&ctx, "{s:\"xaab\"} {s:\"xa\"} {s:\"z\"}")));
        assert_eq!(out, ["[\"aab\",\"aa\",\"b\"]", "[\"a\",\"a\",\"\"]", "null"]);
    }

    #[test]
    fn bad_patterns_are_per_row_errors() {
        let ctx = Arc::new(TypeContext::new());
        let out = run(&ctx, "regexp", &col(&ctx, "\"(\" \"a\""), &[Value::string("a")]);
        assert!(out[0].contains("regexp: invalid regular expression"));
        assert_eq!(out[1], "[\"a\"]");
    }

    #[test]
    fn replace_expands_groups() {
        let ctx = Arc::new(TypeContext::new());
        let lits = [Value::string("(o+)"), Value::string("<$1>")];
        assert_eq!(run(&ctx, "regexp_replace", &col(&ctx, "\"foo\""), &lits), ["\"f<oo>\""]);
        let out = run(&ctx, "regexp_replace", &col(&ctx, "1"), &lits);
        assert!(out[0].contains("regexp_replace: string arg required"));
    }
}
