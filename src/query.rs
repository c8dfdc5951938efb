use crate::hierarchy::{Hierarchy, ReadHierarchyError};
use crate::octree::aabb::Aabb;
use crate::octree::node::Node;
use crate::resource::ResourceClient;
use tracing::{span, Level};

/// Spatial and level-of-detail queries over a lazily loaded hierarchy.
///
/// Only pages whose cube touches the query box are read. A page's entries
/// all lie inside its root cell, so any other page cannot contribute.
pub struct Query<'a, C> {
    hierarchy: &'a Hierarchy,
    resource: &'a C,
    root_bounds: Aabb,
    spacing: f64,
}

impl<'a, C: ResourceClient> Query<'a, C> {
    pub fn new(hierarchy: &'a Hierarchy, resource: &'a C, root_bounds: Aabb, spacing: f64) -> Self {
        Self {
            hierarchy,
            resource,
            root_bounds,
            spacing,
        }
    }

    fn load_pages_touching(&self, query: &Aabb) -> Result<(), ReadHierarchyError> {
        self.hierarchy.load_pages_where(self.resource, |page| {
            page.bounds(&self.root_bounds).intersects(query)
        })
    }

    /// Nodes whose cell lies entirely inside `query`, in key order.
    pub fn nodes_within_box(&self, query: &Aabb) -> Result<Vec<Node>, ReadHierarchyError> {
        let _span = span!(Level::DEBUG, "nodes_within_box", query = %query).entered();

        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.load_pages_touching(query)?;
        Ok(self
            .hierarchy
            .registry()
            .nodes_where(|node| node.bounds(&self.root_bounds).within(query)))
    }

    /// Nodes whose cell overlaps `query`, in key order.
    pub fn nodes_intersect_box(&self, query: &Aabb) -> Result<Vec<Node>, ReadHierarchyError> {
        let _span = span!(Level::DEBUG, "nodes_intersect_box", query = %query).entered();

        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.load_pages_touching(query)?;
        Ok(self
            .hierarchy
            .registry()
            .nodes_where(|node| node.bounds(&self.root_bounds).intersects(query)))
    }

    /// Deepest depth of any node, or -1 when no page holds a leaf entry.
    /// Loads the whole hierarchy.
    pub fn max_depth(&self) -> Result<i32, ReadHierarchyError> {
        self.hierarchy.load_all(self.resource)?;
        Ok(self.hierarchy.registry().max_depth().unwrap_or(-1))
    }

    /// Shallowest depth whose spacing is at most `resolution`.
    ///
    /// Falls back to the maximum depth when `resolution` is not positive or
    /// finer than the deepest level.
    pub fn depth_at_resolution(&self, resolution: f64) -> Result<i32, ReadHierarchyError> {
        let max_depth = self.max_depth()?;
        Ok(depth_for_spacing(self.spacing, max_depth, resolution))
    }

    pub fn nodes_at_resolution(&self, resolution: f64) -> Result<Vec<Node>, ReadHierarchyError> {
        let depth = self.depth_at_resolution(resolution)?;
        Ok(self
            .hierarchy
            .registry()
            .nodes_where(|node| node.key.depth == depth))
    }

    pub fn nodes_within_resolution(&self, resolution: f64) -> Result<Vec<Node>, ReadHierarchyError> {
        let depth = self.depth_at_resolution(resolution)?;
        Ok(self
            .hierarchy
            .registry()
            .nodes_where(|node| node.key.depth <= depth))
    }
}

/// Spacing halves with every level below the root.
pub fn depth_for_spacing(root_spacing: f64, max_depth: i32, resolution: f64) -> i32 {
    // also catches NaN
    if !(resolution > 0.0) {
        return max_depth;
    }

    let mut spacing = root_spacing;
    for depth in 0..=max_depth {
        if spacing <= resolution {
            return depth;
        }
        spacing /= 2.0;
    }
    max_depth
}
