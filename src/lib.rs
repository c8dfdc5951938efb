//! Reader for Cloud-Optimized Point Cloud (COPC) files.
//!
//! The octree hierarchy is loaded page by page as lookups and queries reach
//! it, so opening a file and reading a region touches only the bytes needed.
//!
//! ```no_run
//! use copc::prelude::*;
//!
//! let reader = CopcReader::open("autzen-classified.copc.laz")?;
//! let region = Aabb::new_2d(637_000.0, 851_000.0, 637_400.0, 851_400.0);
//! for node in reader.nodes_intersect_box(&region)? {
//!     println!("{} holds {} points", node.key, node.point_count);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod decompress;
pub mod hierarchy;
pub mod metadata;
pub mod octree;
pub mod point;
pub mod point_attributes;
pub mod prelude;
pub mod query;
pub mod reader;
pub mod registry;
pub mod resource;
