//! A total order over values, used by sort, merge, set normalization and min/max.
//!
//! Nulls sort after everything else. Numbers compare by value across all numeric types (floats
//! through [`OrderedFloat`], so NaN sorts above +Inf); values of otherwise different types
//! order by type ID. Containers compare element by element.

use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use strata_vector::encoding::{self, decode_float, decode_int, decode_uint};
use strata_vector::types::{is_float, is_numeric, is_signed, is_unsigned};
use strata_vector::value::resolve_union_elem;
use strata_vector::{Type, Value};

/// Direction and null placement for one sort key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortKey {
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn asc() -> Self {
        Self::default()
    }

    pub fn desc() -> Self {
        Self {
            descending: true,
            nulls_first: false,
        }
    }

    /// Compares two key values; null placement is not affected by the direction.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (is_nullish(a), is_nullish(b)) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if self.descending => compare_values(b, a),
            (false, false) => compare_values(a, b),
        }
    }
}

/// Lexicographic comparison of key tuples.
pub fn compare_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    a.iter()
        .zip(b)
        .zip(keys.iter().chain(std::iter::repeat(&SortKey::default())))
        .map(|((x, y), key)| key.compare(x, y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn is_nullish(v: &Value) -> bool {
    v.is_null() || v.ty().is_null()
}

/// Total order over two values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    compare_encoded(a.ty(), a.bytes(), b.ty(), b.bytes())
}

fn number(id: u32, bytes: &[u8]) -> OrderedFloat<f64> {
    OrderedFloat(if is_float(id) {
        decode_float(bytes)
    } else if is_signed(id) {
        decode_int(bytes) as f64
    } else {
        decode_uint(bytes) as f64
    })
}

fn compare_encoded(ta: &Type, a: Option<&[u8]>, tb: &Type, b: Option<&[u8]>) -> Ordering {
    if let (Type::Union(_), Some(_)) = (ta.under(), a) {
        let v = resolve_union_elem(ta, a);
        return compare_encoded(v.ty(), v.bytes(), tb, b);
    }
    if let (Type::Union(_), Some(_)) = (tb.under(), b) {
        let v = resolve_union_elem(tb, b);
        return compare_encoded(ta, a, v.ty(), v.bytes());
    }
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };
    let (ua, ub) = (ta.under(), tb.under());
    let (ia, ib) = (ua.id(), ub.id());
    if ia != ib {
        if is_numeric(ia) && is_numeric(ib) {
            let o = number(ia, a).cmp(&number(ib, b));
            // Equal magnitudes of different types still need a stable order.
            return o.then(ia.cmp(&ib));
        }
        return ia.cmp(&ib);
    }
    match ua {
        _ if is_signed(ia) => decode_int(a).cmp(&decode_int(b)),
        _ if is_unsigned(ia) => decode_uint(a).cmp(&decode_uint(b)),
        _ if is_float(ia) => number(ia, a).cmp(&number(ib, b)),
        Type::Bool => encoding::decode_bool(a).cmp(&encoding::decode_bool(b)),
        Type::Enum(_) => decode_uint(a).cmp(&decode_uint(b)),
        Type::Ip => encoding::decode_ip(a).cmp(&encoding::decode_ip(b)),
        Type::Net => encoding::decode_net(a).cmp(&encoding::decode_net(b)),
        Type::Record(r) => {
            let mut ea = encoding::iter(a);
            let mut eb = encoding::iter(b);
            for f in r.fields() {
                let o = compare_encoded(&f.ty, ea.next().flatten(), &f.ty, eb.next().flatten());
                if o.is_ne() {
                    return o;
                }
            }
            Ordering::Equal
        }
        Type::Array(t) | Type::Set(t) => compare_lists(t.elem(), t.elem(), a, b),
        Type::Map(m) => {
            let mut ea = encoding::iter(a);
            let mut eb = encoding::iter(b);
            let mut k = 0usize;
            loop {
                let ty = if k % 2 == 0 { m.key() } else { m.val() };
                k += 1;
                match (ea.next(), eb.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let o = compare_encoded(ty, x, ty, y);
                        if o.is_ne() {
                            return o;
                        }
                    }
                }
            }
        }
        Type::Named(n) => compare_encoded(n.inner(), Some(a), n.inner(), Some(b)),
        Type::Error(e) => compare_encoded(e.inner(), Some(a), e.inner(), Some(b)),
        // Strings, bytes and type values order by their bytes.
        _ => a.cmp(b),
    }
}

fn compare_lists(ta: &Type, tb: &Type, a: &[u8], b: &[u8]) -> Ordering {
    let mut ea = encoding::iter(a);
    let mut eb = encoding::iter(b);
    loop {
        match (ea.next(), eb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let o = compare_encoded(ta, x, tb, y);
                if o.is_ne() {
                    return o;
                }
            }
        }
    }
}

/// A value ordered by [`compare_values`], for use in ordered collections.
#[derive(Clone, Debug)]
pub struct OrderedValue(pub Value);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use strata_vector::sup::parse_values;
    use strata_vector::TypeContext;

    fn sorted(text: &str) -> Vec<String> {
        let ctx = TypeContext::new();
        let mut values = parse_values(&ctx, text).unwrap();
        values.sort_by(compare_values);
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn numbers_compare_across_types() {
        assert_eq!(sorted("3 1.5 -2 null 2.0"), ["-2", "1.5", "2.0", "3", "null"]);
    }

    #[test]
    fn nan_sorts_above_infinity() {
        assert_eq!(sorted("NaN +Inf 0.0"), ["0.0", "+Inf", "NaN"]);
    }

    #[test]
    fn containers_compare_elementwise() {
        assert_eq!(sorted("[2] [1,5] [1]"), ["[1]", "[1,5]", "[2]"]);
        assert_eq!(sorted("{a:2} {a:1}"), ["{a:1}", "{a:2}"]);
        assert_eq!(sorted("\"b\" \"a\""), ["\"a\"", "\"b\""]);
    }

    #[test]
    fn key_direction_keeps_nulls_last() {
        let (one, two, null) = (Value::int64(1), Value::int64(2), Value::null_value());
        let desc = SortKey::desc();
        assert_eq!(desc.compare(&one, &two), Ordering::Greater);
        assert_eq!(desc.compare(&null, &two), Ordering::Greater);
        let first = SortKey { descending: false, nulls_first: true };
        assert_eq!(first.compare(&null, &one), Ordering::Less);
        let keys = [SortKey::asc(), SortKey::desc()];
        let a = [one.clone(), one.clone()];
        let b = [one.clone(), two.clone()];
        assert_eq!(compare_keys(&a, &b, &keys), Ordering::Greater);
    }

    proptest! {
        #[test]
        fn int_order_matches_native(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(compare_values(&Value::int64(a), &Value::int64(b)), a.cmp(&b));
        }

        #[test]
        fn float_order_is_total(a in any::<f64>(), b in any::<f64>()) {
            let (x, y) = (Value::float64(a), Value::float64(b));
            prop_assert_eq!(compare_values(&x, &y), compare_values(&y, &x).reverse());
        }
    }
}
