use crate::octree::aabb::Aabb;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("A voxel key needs exactly 4 components, got {0}")]
    WrongArity(usize),

    #[error("Voxel key {0} is out of range for its depth")]
    OutOfRange(VoxelKey),

    #[error("Unable to parse voxel key from {0:?}")]
    Parse(String),
}

/// Address of one octree cell.
///
/// At depth `d` the valid coordinate range is `[0, 2^d)` on every axis. Keys
/// are plain values: equality is structural and any key can be used as a
/// lookup token, whether a node exists for it or not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelKey {
    pub depth: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelKey {
    pub const ROOT: VoxelKey = VoxelKey::new(0, 0, 0, 0);
    pub const INVALID: VoxelKey = VoxelKey::new(-1, -1, -1, -1);

    /// Unchecked constructor, use `TryFrom` for untrusted input.
    pub const fn new(depth: i32, x: i32, y: i32, z: i32) -> Self {
        Self { depth, x, y, z }
    }

    pub const fn root() -> Self {
        Self::ROOT
    }

    pub const fn invalid() -> Self {
        Self::INVALID
    }

    pub fn is_valid(&self) -> bool {
        if self.depth < 0 {
            return false;
        }
        // beyond depth 31 every non-negative i32 is in range
        let cells = 1_i64 << self.depth.min(32);
        [self.x, self.y, self.z]
            .iter()
            .all(|&c| c >= 0 && i64::from(c) < cells)
    }

    pub fn parent(&self) -> Option<VoxelKey> {
        if self.depth <= 0 || !self.is_valid() {
            return None;
        }
        Some(VoxelKey::new(self.depth - 1, self.x >> 1, self.y >> 1, self.z >> 1))
    }

    /// Child in octant `index`: bit 0 selects x, bit 1 y, bit 2 z.
    pub fn child(&self, index: usize) -> VoxelKey {
        VoxelKey::new(
            self.depth + 1,
            (self.x << 1) | (index & 0b001) as i32,
            (self.y << 1) | ((index & 0b010) >> 1) as i32,
            (self.z << 1) | ((index & 0b100) >> 2) as i32,
        )
    }

    pub fn children(&self) -> [VoxelKey; 8] {
        std::array::from_fn(|index| self.child(index))
    }

    /// The ancestor of this key at `depth`, `self` included.
    pub fn ancestor_at(&self, depth: i32) -> Option<VoxelKey> {
        if !self.is_valid() || depth < 0 || depth > self.depth {
            return None;
        }
        // shifts of 32 or more clear every bit of a non-negative coordinate
        let shift = (self.depth - depth) as u32;
        let up = |c: i32| c.checked_shr(shift).unwrap_or(0);
        Some(VoxelKey::new(depth, up(self.x), up(self.y), up(self.z)))
    }

    /// The keys from the root down to this one, computed lazily.
    pub fn lineage(&self) -> impl Iterator<Item = VoxelKey> + '_ {
        let last = if self.is_valid() { self.depth } else { -1 };
        (0..=last).filter_map(move |depth| self.ancestor_at(depth))
    }

    /// True when `self` lies in the subtree rooted at `other`, `other` included.
    pub fn is_descendant_or_self(&self, other: &VoxelKey) -> bool {
        other.is_valid() && self.ancestor_at(other.depth) == Some(*other)
    }

    pub fn is_ancestor_of(&self, other: &VoxelKey) -> bool {
        self != other && other.is_descendant_or_self(self)
    }

    /// True when `self` is a direct child of `parent`.
    pub fn child_of(&self, parent: &VoxelKey) -> bool {
        self.parent().as_ref() == Some(parent)
    }

    /// Bounds of this cell inside the octree cube `root`.
    pub fn bounds(&self, root: &Aabb) -> Aabb {
        let cells = f64::from(self.depth.max(0)).exp2();
        let size = (root.max - root.min) / cells;
        let min = root.min + size * DVec3::new(f64::from(self.x), f64::from(self.y), f64::from(self.z));
        Aabb::new(min, min + size)
    }
}

impl Default for VoxelKey {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for VoxelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.depth, self.x, self.y, self.z)
    }
}

impl TryFrom<[i32; 4]> for VoxelKey {
    type Error = KeyError;

    fn try_from([depth, x, y, z]: [i32; 4]) -> Result<Self, Self::Error> {
        let key = VoxelKey::new(depth, x, y, z);
        if key.is_valid() {
            Ok(key)
        } else {
            Err(KeyError::OutOfRange(key))
        }
    }
}

impl TryFrom<(i32, i32, i32, i32)> for VoxelKey {
    type Error = KeyError;

    fn try_from((depth, x, y, z): (i32, i32, i32, i32)) -> Result<Self, Self::Error> {
        VoxelKey::try_from([depth, x, y, z])
    }
}

impl TryFrom<&[i32]> for VoxelKey {
    type Error = KeyError;

    fn try_from(values: &[i32]) -> Result<Self, Self::Error> {
        let values: [i32; 4] = values
            .try_into()
            .map_err(|_| KeyError::WrongArity(values.len()))?;
        VoxelKey::try_from(values)
    }
}

impl FromStr for VoxelKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split('-')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| KeyError::Parse(s.to_string()))?;
        VoxelKey::try_from(values.as_slice())
    }
}
