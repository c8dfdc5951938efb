pub use crate::resource::{FileClient, MemoryClient, ResourceClient};
pub use crate::reader::CopcReader;
pub use crate::octree::{Aabb, Node, VoxelKey};
pub use crate::metadata::{CopcConfig, CopcInfo, LasHeader};
pub use crate::point::Point;
pub use crate::decompress::{PointDecompressor, RawDecompressor};

// Error types
pub use crate::reader::OpenCopcError;
pub use crate::reader::LoadPointsError;
pub use crate::hierarchy::ReadHierarchyError;
pub use crate::metadata::ReadMetadataError;
pub use crate::resource::ResourceError;
pub use crate::decompress::DecompressError;
pub use crate::octree::{BoundsError, KeyError};
