use super::{race, Aliases, Buffered, JoinStyle};
use crate::context::{CancelToken, QueryContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use ahash::AHashMap;
use std::sync::Arc;
use strata_expr::Expr;
use strata_vector::encoding::append_container;
use strata_vector::types::Field;
use strata_vector::{DynamicBuilder, TypeContext, Value, Vector};

#[derive(Debug)]
struct Entry {
    rows: Vec<Value>,
    hit: bool,
}

/// Build-side rows grouped by key, in insertion order.
#[derive(Debug, Default)]
struct Table {
    index: AHashMap<Vec<u8>, usize>,
    entries: Vec<Entry>,
}

impl Table {
    fn build(
        buf: &mut Buffered,
        parent: &mut dyn Puller,
        key: &Expr,
        cancel: &CancelToken,
    ) -> RuntimeResult<Self> {
        let mut table = Table::default();
        let mut k = Vec::new();
        while let Some(vec) = buf.pull_from(parent)? {
            cancel.check()?;
            let keys = key.eval(&vec);
            for slot in 0..vec.len() {
                if keys.value_at(slot).is_missing() {
                    continue;
                }
                k.clear();
                keys.append_key(slot, &mut k);
                let id = match table.index.get(&k) {
                    Some(&id) => id,
                    None => {
                        table.index.insert(k.clone(), table.entries.len());
                        table.entries.push(Entry {
                            rows: Vec::new(),
                            hit: false,
                        });
                        table.entries.len() - 1
                    }
                };
                table.entries[id].rows.push(vec.value_at(slot));
            }
        }
        Ok(table)
    }

    fn lookup(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let id = *self.index.get(key)?;
        self.entries.get_mut(id)
    }
}

#[derive(Debug)]
struct Probe {
    table: Table,
    // Whether the table holds the left input (and the right one is probed).
    table_is_left: bool,
    probe: Buffered,
    drained: bool,
}

/// Builds output rows from values.
#[derive(Debug)]
struct Wrapper {
    types: Arc<TypeContext>,
    style: JoinStyle,
    aliases: Aliases,
}

impl Wrapper {
    /// One output row. `left` and `right` are in input order after the right-join exchange.
    fn row(&self, left: Option<&Value>, right: Option<&Value>) -> Value {
        let (l, r) = match self.style {
            JoinStyle::Right => (right, left),
            _ => (left, right),
        };
        let null = Value::null_value();
        let (l, r) = (l.unwrap_or(&null), r.unwrap_or(&null));
        let fields = vec![
            Field::new(self.aliases.left.as_str(), l.ty().clone()),
            Field::new(self.aliases.right.as_str(), r.ty().clone()),
        ];
        match self.types.lookup_record(fields) {
            Ok(ty) => {
                let mut body = Vec::new();
                append_container(&mut body, l.bytes());
                append_container(&mut body, r.bytes());
                Value::new(ty, Some(body))
            }
            Err(err) => Value::error(&self.types, &err.to_string()),
        }
    }
}

/// Equi-join on one key expression per side.
#[derive(Debug)]
pub struct HashJoin {
    cancel: CancelToken,
    style: JoinStyle,
    left: Box<dyn Puller>,
    right: Box<dyn Puller>,
    left_key: Expr,
    right_key: Expr,
    wrapper: Wrapper,
    state: Option<Probe>,
}

impl HashJoin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &QueryContext,
        style: JoinStyle,
        left: Box<dyn Puller>,
        right: Box<dyn Puller>,
        left_key: Expr,
        right_key: Expr,
        left_alias: &str,
        right_alias: &str,
    ) -> RuntimeResult<Self> {
        if style == JoinStyle::Cross {
            return Err(RuntimeError::InvalidOperator(
                "hash join: a cross join has no keys".to_string(),
            ));
        }
        let aliases = Aliases::new(left_alias, right_alias)?;
        // A right join is a left join with the inputs exchanged; `Wrapper::row` swaps them back.
        let (left, right, left_key, right_key) = if style == JoinStyle::Right {
            (right, left, right_key, left_key)
        } else {
            (left, right, left_key, right_key)
        };
        Ok(Self {
            cancel: ctx.cancel.clone(),
            style,
            left,
            right,
            left_key,
            right_key,
            wrapper: Wrapper {
                types: ctx.types.clone(),
                style,
                aliases,
            },
            state: None,
        })
    }

    fn init(&mut self) -> RuntimeResult<Probe> {
        let (mut lbuf, mut rbuf) = race(&self.cancel, self.left.as_mut(), self.right.as_mut())?;
        if rbuf.eos {
            let table = Table::build(&mut rbuf, self.right.as_mut(), &self.right_key, &self.cancel)?;
            log::debug!("hash join: built table of {} keys from the right", table.entries.len());
            return Ok(Probe {
                table,
                table_is_left: false,
                probe: lbuf,
                drained: false,
            });
        }
        let table = Table::build(&mut lbuf, self.left.as_mut(), &self.left_key, &self.cancel)?;
        log::debug!("hash join: built table of {} keys from the left", table.entries.len());
        Ok(Probe {
            table,
            table_is_left: true,
            probe: rbuf,
            drained: false,
        })
    }

    fn step(&mut self, probe: &mut Probe) -> RuntimeResult<Option<Vector>> {
        let (parent, key) = if probe.table_is_left {
            (self.right.as_mut(), &self.right_key)
        } else {
            (self.left.as_mut(), &self.left_key)
        };
        let mut k = Vec::new();
        loop {
            self.cancel.check()?;
            let Some(vec) = probe.probe.pull_from(parent)? else {
                break;
            };
            let keys = key.eval(&vec);
            let mut out = DynamicBuilder::new();
            for slot in 0..vec.len() {
                if keys.value_at(slot).is_missing() {
                    continue;
                }
                k.clear();
                keys.append_key(slot, &mut k);
                let row = vec.value_at(slot);
                let Some(entry) = probe.table.lookup(&k) else {
                    if !probe.table_is_left && self.style != JoinStyle::Inner {
                        out.write(&self.wrapper.row(Some(&row), None));
                    }
                    continue;
                };
                entry.hit = true;
                if self.style == JoinStyle::Anti {
                    continue;
                }
                for other in &entry.rows {
                    let v = if probe.table_is_left {
                        self.wrapper.row(Some(other), Some(&row))
                    } else {
                        self.wrapper.row(Some(&row), Some(other))
                    };
                    out.write(&v);
                }
            }
            if !out.is_empty() {
                return Ok(Some(out.build()));
            }
        }
        if probe.table_is_left && self.style != JoinStyle::Inner && !probe.drained {
            probe.drained = true;
            let mut out = DynamicBuilder::new();
            for entry in probe.table.entries.iter().filter(|e| !e.hit) {
                entry.rows.iter().for_each(|row| out.write(&self.wrapper.row(Some(row), None)));
            }
            if !out.is_empty() {
                return Ok(Some(out.build()));
            }
        }
        Ok(None)
    }
}

impl Puller for HashJoin {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.state = None;
            self.left.pull(true)?;
            self.right.pull(true)?;
            return Ok(None);
        }
        let mut probe = match self.state.take() {
            Some(probe) => probe,
            None => self.init()?,
        };
        let out = self.step(&mut probe)?;
        if out.is_some() {
            self.state = Some(probe);
        }
        Ok(out)
    }
}
