use super::Vector;
use std::sync::OnceLock;

/// Parent/child slot maps of a tag array.
///
/// `forward[slot]` is the slot within `values[tags[slot]]`; `reverse[tag]` lists the parent
/// slots carrying `tag`, in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagMap {
    pub forward: Vec<u32>,
    pub reverse: Vec<Vec<u32>>,
}

impl TagMap {
    pub fn new(tags: &[u32], ntags: usize) -> Self {
        let mut forward = Vec::with_capacity(tags.len());
        let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); ntags];
        for (slot, &tag) in tags.iter().enumerate() {
            let child = &mut reverse[tag as usize];
            forward.push(child.len() as u32);
            child.push(slot as u32);
        }
        Self { forward, reverse }
    }
}

/// A heterogeneous column: slot `i` lives in `values[tags[i]]`.
#[derive(Clone, Debug)]
pub struct DynamicVector {
    pub tags: Vec<u32>,
    pub values: Vec<Vector>,
    tag_map: OnceLock<TagMap>,
}

impl DynamicVector {
    pub fn new(tags: Vec<u32>, values: Vec<Vector>) -> Self {
        debug_assert!(
            tags.iter().all(|&t| (t as usize) < values.len()),
            "dynamic tag out of range"
        );
        Self {
            tags,
            values,
            tag_map: OnceLock::new(),
        }
    }

    pub fn len(&self) -> u32 {
        self.tags.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tag_map(&self) -> &TagMap {
        self.tag_map
            .get_or_init(|| TagMap::new(&self.tags, self.values.len()))
    }

    /// The child vector and child slot holding `slot`.
    pub fn locate(&self, slot: u32) -> (&Vector, u32) {
        let tag = self.tags[slot as usize] as usize;
        (&self.values[tag], self.tag_map().forward[slot as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_map_forward_and_reverse_agree() {
        let m = TagMap::new(&[1, 0, 1, 2, 1], 3);
        assert_eq!(m.forward, vec![0, 0, 1, 0, 2]);
        assert_eq!(m.reverse, vec![vec![1], vec![0, 2, 4], vec![3]]);
    }
}
