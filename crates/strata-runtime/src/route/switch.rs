use super::router::{Forward, Outlets};
use crate::error::{RuntimeError, RuntimeResult};
use ahash::AHashMap;
use strata_expr::{bool_mask, Expr};
use strata_vector::{pick, stitch, BitVec, Value, Vector};

/// Sends every batch to every route.
#[derive(Debug)]
pub struct Fork {
    n: usize,
}

impl Fork {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Forward for Fork {
    fn routes(&self) -> usize {
        self.n
    }

    fn forward(&mut self, vec: &Vector, out: &mut Outlets) -> bool {
        (0..out.len()).all(|i| out.send(i, vec.clone()))
    }
}

/// Routes each row to the first case whose predicate is true.
///
/// A predicate that fails on a row sends the error to that case, except for `missing`, which
/// only means "not this case". Rows claimed by no case go to the default route, the last one,
/// when there is one.
#[derive(Debug)]
pub struct Switch {
    cases: Vec<Expr>,
    default: bool,
}

impl Switch {
    pub fn new(cases: Vec<Expr>, default: bool) -> Self {
        Self { cases, default }
    }
}

/// Merges sorted row positions of values and errors into one dynamic.
fn with_errors(vals: Vector, val_slots: &[u32], errs: Vector, err_slots: &[u32]) -> Vector {
    let mut tags = Vec::with_capacity(val_slots.len() + err_slots.len());
    let (mut i, mut j) = (0, 0);
    while i < val_slots.len() || j < err_slots.len() {
        if j == err_slots.len() || (i < val_slots.len() && val_slots[i] < err_slots[j]) {
            tags.push(0);
            i += 1;
        } else {
            tags.push(1);
            j += 1;
        }
    }
    stitch(&tags, vec![vals, errs])
}

impl Forward for Switch {
    fn routes(&self) -> usize {
        self.cases.len() + usize::from(self.default)
    }

    fn forward(&mut self, vec: &Vector, out: &mut Outlets) -> bool {
        let mut claimed = BitVec::with_len_all_false(vec.len() as usize);
        for (i, case) in self.cases.iter().enumerate() {
            let mask = case.eval(vec);
            let m = bool_mask(&mask);
            let trues: Vec<u32> = m.trues.ones().filter(|&s| !claimed.value(s)).collect();
            let errs: Vec<u32> = m
                .others
                .ones()
                .filter(|&s| !claimed.value(s))
                .filter(|&s| {
                    let v = mask.value_at(s);
                    v.is_error() && !v.is_missing()
                })
                .collect();
            trues.iter().for_each(|&s| claimed.set(s as usize, true));
            let routed = match (trues.is_empty(), errs.is_empty()) {
                (true, true) => continue,
                (false, true) => pick(vec, &trues),
                (true, false) => pick(&mask, &errs),
                (false, false) => with_errors(pick(vec, &trues), &trues, pick(&mask, &errs), &errs),
            };
            log::trace!("switch: {} rows to case {i}", routed.len());
            if !out.send(i, routed) {
                return false;
            }
        }
        if self.default {
            let rest: Vec<u32> = (0..vec.len()).filter(|&s| !claimed.value(s)).collect();
            if !rest.is_empty() && !out.send(self.cases.len(), pick(vec, &rest)) {
                return false;
            }
        }
        true
    }
}

/// Routes each row by the value of `selector`: to the case with an equal value (same type
/// and bytes), else to the default route, the last one, when there is one.
#[derive(Debug)]
pub struct ExprSwitch {
    selector: Expr,
    cases: AHashMap<Vec<u8>, usize>,
    ncases: usize,
    default: bool,
}

impl ExprSwitch {
    pub fn new(selector: Expr, cases: &[Value], default: bool) -> RuntimeResult<Self> {
        let mut index = AHashMap::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            let mut key = Vec::new();
            Vector::from_values(std::slice::from_ref(case)).append_key(0, &mut key);
            if index.insert(key, i).is_some() {
                return Err(RuntimeError::InvalidOperator(format!(
                    "switch: duplicate case value {case}"
                )));
            }
        }
        Ok(Self {
            selector,
            cases: index,
            ncases: cases.len(),
            default,
        })
    }
}

impl Forward for ExprSwitch {
    fn routes(&self) -> usize {
        self.ncases + usize::from(self.default)
    }

    fn forward(&mut self, vec: &Vector, out: &mut Outlets) -> bool {
        let sel = self.selector.eval(vec);
        let default = self.default.then_some(self.ncases);
        let mut slots: Vec<Vec<u32>> = vec![Vec::new(); self.routes()];
        let mut key = Vec::new();
        for s in 0..vec.len() {
            key.clear();
            sel.append_key(s, &mut key);
            if let Some(route) = self.cases.get(&key).copied().or(default) {
                slots[route].push(s);
            }
        }
        for (route, index) in slots.iter().enumerate() {
            let routed = match index.len() {
                0 => continue,
                n if n == vec.len() as usize => vec.clone(),
                _ => pick(vec, index),
            };
            if !out.send(route, routed) {
                return false;
            }
        }
        true
    }
}
