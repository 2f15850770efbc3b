use crate::error::CacheResult;
use crate::meta::Metadata;
use crate::nulls::NullsNode;
use std::sync::{Arc, Mutex};
use strata_vector::{Type, TypeContext, Vector};

/// Data a node has loaded, kept until the object is closed.
#[derive(Debug)]
pub(crate) enum Loaded {
    Vector(Vector),
    /// Offsets spread over the whole row space (`len + 1` entries).
    Offsets(Vec<u32>),
    /// Tags of the non-null rows.
    Tags(Vec<u32>),
    Dict { index: Vec<u8>, counts: Vec<u32> },
}

#[derive(Debug)]
struct ChildSlot {
    meta: Arc<Metadata>,
    len: u32,
    nulls: Option<Arc<NullsNode>>,
    node: Mutex<Option<Arc<Shadow>>>,
}

/// A node of the tree that mirrors an object's metadata.
///
/// Children are created the first time a projection reaches them. Each node guards its
/// children and its loaded data with its own lock, so queries over disjoint parts of an object
/// do not contend.
#[derive(Debug)]
pub(crate) struct Shadow {
    pub(crate) meta: Arc<Metadata>,
    /// Type in the object's context, for nodes that carry one.
    pub(crate) ty: Option<Type>,
    /// Rows of the row space this node lives in.
    pub(crate) len: u32,
    pub(crate) nulls: Option<Arc<NullsNode>>,
    children: Vec<ChildSlot>,
    data: Mutex<Option<Arc<Loaded>>>,
}

impl Shadow {
    pub(crate) fn new(
        local: &TypeContext,
        meta: Arc<Metadata>,
        len: u32,
        nulls: Option<Arc<NullsNode>>,
    ) -> CacheResult<Self> {
        let ty = match &*meta {
            Metadata::Record { ty, .. }
            | Metadata::Array { ty, .. }
            | Metadata::Set { ty, .. }
            | Metadata::Map { ty, .. }
            | Metadata::Union { ty, .. }
            | Metadata::Int { ty, .. }
            | Metadata::Uint { ty, .. }
            | Metadata::Float { ty, .. }
            | Metadata::Primitive { ty, .. }
            | Metadata::Const { ty, .. }
            | Metadata::Named { ty, .. }
            | Metadata::Error { ty, .. } => Some(local.lookup_by_value(ty)?),
            Metadata::Dict { .. } | Metadata::Nulls { .. } | Metadata::Dynamic { .. } => None,
        };
        let same = |m: &Arc<Metadata>, nulls: Option<Arc<NullsNode>>| ChildSlot {
            meta: Arc::clone(m),
            len,
            nulls,
            node: Mutex::new(None),
        };
        let fresh = |m: &Arc<Metadata>| ChildSlot {
            meta: Arc::clone(m),
            len: m.len(),
            nulls: None,
            node: Mutex::new(None),
        };
        let children = match &*meta {
            Metadata::Record { fields, .. } => fields
                .iter()
                .map(|f| same(&f.values, nulls.clone()))
                .collect(),
            Metadata::Named { values, .. } | Metadata::Error { values, .. } => {
                vec![same(values, nulls.clone())]
            }
            Metadata::Nulls { runs, values, .. } => {
                let level = NullsNode::new(*runs, nulls.clone(), len);
                vec![same(values, Some(Arc::new(level)))]
            }
            Metadata::Array { values, .. }
            | Metadata::Set { values, .. }
            | Metadata::Dict { values, .. } => vec![fresh(values)],
            Metadata::Map { keys, values, .. } => vec![fresh(keys), fresh(values)],
            Metadata::Union { values, .. } | Metadata::Dynamic { values, .. } => {
                values.iter().map(fresh).collect()
            }
            Metadata::Int { .. }
            | Metadata::Uint { .. }
            | Metadata::Float { .. }
            | Metadata::Primitive { .. }
            | Metadata::Const { .. } => Vec::new(),
        };
        Ok(Self {
            meta,
            ty,
            len,
            nulls,
            children,
            data: Mutex::new(None),
        })
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Child `k`, created on first use.
    pub(crate) fn child(&self, local: &TypeContext, k: usize) -> CacheResult<Arc<Shadow>> {
        let slot = &self.children[k];
        let mut node = slot.node.lock().expect("shadow node poisoned");
        if let Some(child) = node.as_ref() {
            return Ok(Arc::clone(child));
        }
        let child = Arc::new(Shadow::new(
            local,
            Arc::clone(&slot.meta),
            slot.len,
            slot.nulls.clone(),
        )?);
        *node = Some(Arc::clone(&child));
        Ok(child)
    }

    /// Runs `load` the first time it is called and returns its result thereafter.
    pub(crate) fn load(
        &self,
        load: impl FnOnce() -> CacheResult<Loaded>,
    ) -> CacheResult<Arc<Loaded>> {
        let mut data = self.data.lock().expect("shadow node poisoned");
        if let Some(loaded) = data.as_ref() {
            return Ok(Arc::clone(loaded));
        }
        log::debug!("loading {} node ({} rows)", self.meta.kind(), self.len);
        let loaded = Arc::new(load()?);
        *data = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    #[cfg(test)]
    pub(crate) fn is_loaded(&self) -> bool {
        self.data.lock().expect("shadow node poisoned").is_some()
    }

    pub(crate) fn local_type(&self) -> CacheResult<&Type> {
        self.ty.as_ref().ok_or_else(|| {
            crate::error::corrupt(format!("{} node has no type", self.meta.kind()))
        })
    }
}
