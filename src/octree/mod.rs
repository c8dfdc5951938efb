pub mod aabb;
pub mod key;
pub mod node;

pub use aabb::{Aabb, BoundsError};
pub use key::{KeyError, VoxelKey};
pub use node::Node;
