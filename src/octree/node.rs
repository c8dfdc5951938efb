use crate::octree::aabb::Aabb;
use crate::octree::key::VoxelKey;
use serde::{Deserialize, Serialize};

/// Hierarchy entry of a leaf node: where its compressed point chunk lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub key: VoxelKey,
    pub offset: u64,
    pub byte_size: i32,
    pub point_count: i32,
}

impl Default for Node {
    /// The "not found" entry: never valid, zero points.
    fn default() -> Self {
        Self {
            key: VoxelKey::INVALID,
            offset: 0,
            byte_size: -1,
            point_count: 0,
        }
    }
}

impl Node {
    pub fn new(key: VoxelKey, offset: u64, byte_size: i32, point_count: i32) -> Self {
        Self {
            key,
            offset,
            byte_size,
            point_count,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.key.is_valid() && self.byte_size >= 0 && self.point_count >= 0
    }

    pub fn bounds(&self, root: &Aabb) -> Aabb {
        self.key.bounds(root)
    }
}
