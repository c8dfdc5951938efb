use crate::hierarchy::ReadHierarchyError;
use crate::octree::key::VoxelKey;
use crate::octree::node::Node;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug)]
struct Registered {
    node: Node,
    page: VoxelKey,
}

/// Every leaf entry loaded so far, with the page it came from.
///
/// Grows monotonically: entries are only ever added, a whole page at a time.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<VoxelKey, Registered>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &VoxelKey) -> Option<Node> {
        self.nodes.read().get(key).map(|entry| entry.node)
    }

    pub fn contains(&self, key: &VoxelKey) -> bool {
        self.nodes.read().contains_key(key)
    }

    /// Root of the page holding the entry for `key`.
    pub fn page_of(&self, key: &VoxelKey) -> Option<VoxelKey> {
        self.nodes.read().get(key).map(|entry| entry.page)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Inserts all entries of one page, or none of them if any key is already known.
    pub fn insert_page(&self, page: VoxelKey, nodes: &[Node]) -> Result<(), ReadHierarchyError> {
        let mut registered = self.nodes.write();

        if let Some(duplicate) = nodes.iter().find(|node| registered.contains_key(&node.key)) {
            return Err(ReadHierarchyError::DuplicateNode(duplicate.key));
        }

        for node in nodes {
            registered.insert(node.key, Registered { node: *node, page });
        }

        Ok(())
    }

    /// All entries in key order.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().values().map(|entry| entry.node).collect()
    }

    pub fn nodes_where(&self, predicate: impl Fn(&Node) -> bool) -> Vec<Node> {
        self.nodes
            .read()
            .values()
            .map(|entry| entry.node)
            .filter(|node| predicate(node))
            .collect()
    }

    pub fn max_depth(&self) -> Option<i32> {
        // key order sorts by depth first
        self.nodes.read().keys().next_back().map(|key| key.depth)
    }
}
