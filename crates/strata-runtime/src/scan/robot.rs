use super::{FileOpener, Solo};
use crate::context::QueryContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::source::VectorSource;
use crate::Puller;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_expr::Expr;
use strata_vector::{Type, Vector};

const NON_STRING: &str = "from encountered non-string input";

/// Reads the files named by the rows of its input.
///
/// `expr` yields a path per input row; each path is opened, drained and followed by the
/// next. Null paths are skipped and rows that are not strings come out as errors.
#[derive(Debug)]
pub struct Robot<P> {
    parent: P,
    ctx: QueryContext,
    expr: Expr,
    opener: Arc<dyn FileOpener>,
    // Homogeneous pieces of evaluated input still to visit.
    vecs: VecDeque<Vector>,
    vec: Option<Vector>,
    off: u32,
    src: Option<Box<dyn Puller>>,
}

impl<P: Puller> Robot<P> {
    pub fn new(ctx: &QueryContext, parent: P, expr: Expr, opener: Arc<dyn FileOpener>) -> Self {
        Self {
            parent,
            ctx: ctx.clone(),
            expr,
            opener,
            vecs: VecDeque::new(),
            vec: None,
            off: 0,
            src: None,
        }
    }

    fn next_vec(&mut self) -> RuntimeResult<Option<Vector>> {
        if self.vecs.is_empty() {
            let Some(input) = self.parent.pull(false)? else {
                return Ok(None);
            };
            match self.expr.eval(&input) {
                Vector::Dynamic(d) => self.vecs.extend(d.values.iter().cloned()),
                paths => self.vecs.push_back(paths),
            }
        }
        Ok(self.vecs.pop_front())
    }

    /// The puller for the next path, or `None` once the input ends.
    fn next_puller(&mut self) -> RuntimeResult<Option<Box<dyn Puller>>> {
        loop {
            let vec = match self.vec.take().filter(|v| self.off < v.len()) {
                Some(vec) => vec,
                None => {
                    self.off = 0;
                    match self.next_vec()? {
                        Some(vec) => vec,
                        None => return Ok(None),
                    }
                }
            };
            if !matches!(vec.ty().under(), Type::String) {
                let err = Vector::wrapped_error(&self.ctx.types, NON_STRING, &vec);
                return Ok(Some(Box::new(VectorSource::one(err))));
            }
            let path = vec.value_at(self.off);
            self.off += 1;
            self.vec = Some(vec);
            let Some(path) = path.as_str() else {
                continue;
            };
            log::trace!("robot: opening {path}");
            let file = self
                .opener
                .open(&self.ctx, path, 1)
                .map_err(|err| RuntimeError::open(path, err))?;
            return Ok(Some(Box::new(Solo(file))));
        }
    }
}

impl<P: Puller> Puller for Robot<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.vecs.clear();
            self.vec = None;
            self.off = 0;
            let src = self.src.take().map(|mut src| src.pull(true));
            let parent = self.parent.pull(true);
            src.transpose()?;
            return parent;
        }
        loop {
            self.ctx.check()?;
            let mut src = match self.src.take() {
                Some(src) => src,
                None => match self.next_puller()? {
                    Some(src) => src,
                    None => return Ok(None),
                },
            };
            if let Some(vec) = src.pull(false)? {
                self.src = Some(src);
                return Ok(Some(vec));
            }
            src.pull(true)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::testing::MemFiles;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;

    fn files() -> Arc<MemFiles> {
        Arc::new(MemFiles::default().with("a", &["1 2"]).with("b", &["3", "4"]))
    }

    #[test]
    fn opens_each_path_in_turn() {
        let ctx = query();
        let input = source(&ctx, &["{p:\"a\"} {p:null::string}", "{p:\"b\"}"]);
        let mut robot = Robot::new(&ctx, input, field(&ctx, "p"), files());
        assert_eq!(rows(&mut robot), ["1", "2", "3", "4"]);
    }

    #[test]
    fn non_string_paths_become_errors() {
        let ctx = query();
        let input = source(&ctx, &["{p:\"a\"} {p:7}"]);
        let mut robot = Robot::new(&ctx, input, field(&ctx, "p"), files());
        let got = rows(&mut robot);
        assert_eq!(got[..2], ["1", "2"]);
        assert_eq!(got[2], "error({message:\"from encountered non-string input\",on:7})");
    }

    #[test]
    fn open_failures_end_the_stream() {
        let ctx = query();
        let input = source(&ctx, &["\"zzz\""]);
        let mut robot = Robot::new(&ctx, input, Arc::new(strata_expr::This), files());
        let err = robot.pull(false).unwrap_err();
        assert!(err.to_string().starts_with("zzz: "), "{err}");
    }
}
