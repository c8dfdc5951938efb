use crate::decompress::{default_decompressor, DecompressError, PointDecompressor};
use crate::hierarchy::{Hierarchy, ReadHierarchyError};
use crate::metadata::{read_copc_config, CopcConfig, CopcInfo, ExtraBytesVlr, LasHeader, ReadMetadataError};
use crate::octree::aabb::Aabb;
use crate::octree::key::VoxelKey;
use crate::octree::node::Node;
use crate::point::{Point, PointDecoder};
use crate::query::Query;
use crate::resource::{FileClient, ResourceClient, ResourceError};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, span, trace, Level};

#[derive(Error, Debug)]
pub enum OpenCopcError {
    #[error("Error opening resource: {0}")]
    Resource(#[from] ResourceError),

    #[error("Error reading metadata: {0}")]
    Metadata(#[from] ReadMetadataError),

    #[error("Error loading hierarchy: {0}")]
    Hierarchy(#[from] ReadHierarchyError),

    #[error("Error creating decompressor: {0}")]
    Decompress(#[from] DecompressError),
}

#[derive(Error, Debug)]
pub enum LoadPointsError {
    #[error("Node does not exist")]
    NodeNotFound,

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Error loading hierarchy: {0}")]
    Hierarchy(#[from] ReadHierarchyError),

    #[error("Decompression error: {0}")]
    Decompress(#[from] DecompressError),

    #[error("Node {key} decompressed to {actual} bytes, expected {expected}")]
    InvalidPointData {
        key: VoxelKey,
        expected: usize,
        actual: usize,
    },
}

/// Reader over one COPC file.
///
/// Opening reads the header, the VLRs and the root hierarchy page. Every
/// other page is read the first time a lookup or query needs it. The reader
/// can be shared between threads; concurrent requests for the same page
/// read it once.
#[derive(Debug)]
pub struct CopcReader<C: ResourceClient = FileClient> {
    resource: C,
    config: CopcConfig,
    root_bounds: Aabb,
    decoder: PointDecoder,
    hierarchy: Hierarchy,
    decompressor: Box<dyn PointDecompressor>,
}

impl CopcReader<FileClient> {
    /// Opens a COPC file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenCopcError> {
        let resource = FileClient::open(path)?;
        Self::from_resource(resource)
    }
}

impl<C: ResourceClient> CopcReader<C> {
    pub fn from_resource(resource: C) -> Result<Self, OpenCopcError> {
        let _span = span!(Level::DEBUG, "open_copc", len = resource.len()).entered();

        let config = read_copc_config(&resource)?;
        let decoder = PointDecoder::new(&config.header).ok_or(
            ReadMetadataError::UnsupportedPointFormat(config.header.point_format_id()),
        )?;
        let decompressor = default_decompressor(&config)?;

        let root_bounds = config.copc_info.root_bounds();
        let hierarchy = Hierarchy::new(
            config.copc_info.root_hier_offset,
            config.copc_info.root_hier_size,
        );
        hierarchy.load_page(&resource, VoxelKey::ROOT)?;

        debug!(
            nodes = hierarchy.registry().len(),
            pages = hierarchy.known_pages().len(),
            "opened COPC file"
        );

        Ok(Self {
            resource,
            config,
            root_bounds,
            decoder,
            hierarchy,
            decompressor,
        })
    }

    /// Replaces the codec used to decompress point chunks.
    pub fn with_decompressor(mut self, decompressor: impl PointDecompressor + 'static) -> Self {
        self.decompressor = Box::new(decompressor);
        self
    }

    pub fn header(&self) -> &LasHeader {
        &self.config.header
    }

    pub fn copc_info(&self) -> &CopcInfo {
        &self.config.copc_info
    }

    pub fn wkt(&self) -> &str {
        &self.config.wkt
    }

    pub fn extra_bytes(&self) -> &ExtraBytesVlr {
        &self.config.extra_bytes
    }

    pub fn config(&self) -> &CopcConfig {
        &self.config
    }

    /// The octree cube from the COPC info.
    pub fn root_bounds(&self) -> Aabb {
        self.root_bounds
    }

    pub fn resource(&self) -> &C {
        &self.resource
    }

    // Hierarchy

    /// The entry for `key`. An absent key gives the invalid default node.
    pub fn find_node(&self, key: VoxelKey) -> Result<Node, ReadHierarchyError> {
        self.hierarchy.find_node(&self.resource, key)
    }

    /// Every node of the file, in key order. Loads the whole hierarchy.
    pub fn all_nodes(&self) -> Result<Vec<Node>, ReadHierarchyError> {
        self.hierarchy.all_nodes(&self.resource)
    }

    /// Nodes one level below `key` stored in the same page as `key`.
    /// Use `all_nodes_of_page` to get the page's whole content, or `key`
    /// itself when it is a leaf.
    pub fn all_children_of_page(&self, key: VoxelKey) -> Result<Vec<Node>, ReadHierarchyError> {
        self.hierarchy.children_of_page(&self.resource, key)
    }

    /// Every node of the page rooted at `key`, sub-pages included.
    pub fn all_nodes_of_page(&self, key: VoxelKey) -> Result<Vec<Node>, ReadHierarchyError> {
        self.hierarchy.nodes_of_page(&self.resource, key)
    }

    /// Roots of every hierarchy page. Loads the whole hierarchy.
    pub fn page_list(&self) -> Result<Vec<VoxelKey>, ReadHierarchyError> {
        self.hierarchy.page_list(&self.resource)
    }

    pub fn loaded_page_list(&self) -> Vec<VoxelKey> {
        self.hierarchy.loaded_pages()
    }

    // Spatial and resolution queries

    fn query(&self) -> Query<'_, C> {
        Query::new(
            &self.hierarchy,
            &self.resource,
            self.root_bounds,
            self.config.copc_info.spacing,
        )
    }

    pub fn nodes_within_box(&self, query: &Aabb) -> Result<Vec<Node>, ReadHierarchyError> {
        self.query().nodes_within_box(query)
    }

    pub fn nodes_intersect_box(&self, query: &Aabb) -> Result<Vec<Node>, ReadHierarchyError> {
        self.query().nodes_intersect_box(query)
    }

    /// Points inside `query`, grouped by node in key order.
    pub fn points_within_box(&self, query: &Aabb) -> Result<Vec<Point>, LoadPointsError> {
        let _span = span!(Level::DEBUG, "points_within_box", query = %query).entered();

        let mut points = Vec::new();
        for node in self.nodes_intersect_box(query)? {
            points.extend(
                self.points(&node)?
                    .into_iter()
                    .filter(|point| query.contains_point(point.position)),
            );
        }
        Ok(points)
    }

    pub fn depth_at_resolution(&self, resolution: f64) -> Result<i32, ReadHierarchyError> {
        self.query().depth_at_resolution(resolution)
    }

    pub fn max_depth(&self) -> Result<i32, ReadHierarchyError> {
        self.query().max_depth()
    }

    pub fn nodes_at_resolution(&self, resolution: f64) -> Result<Vec<Node>, ReadHierarchyError> {
        self.query().nodes_at_resolution(resolution)
    }

    pub fn nodes_within_resolution(&self, resolution: f64) -> Result<Vec<Node>, ReadHierarchyError> {
        self.query().nodes_within_resolution(resolution)
    }

    // Point access. The node forms reject invalid nodes, the key forms
    // return nothing for absent keys.

    fn resolve(&self, key: VoxelKey) -> Result<Option<Node>, LoadPointsError> {
        let node = self.find_node(key)?;
        Ok(node.is_valid().then_some(node))
    }

    /// The compressed chunk of `node`, as stored in the file.
    pub fn point_data_compressed(&self, node: &Node) -> Result<Vec<u8>, LoadPointsError> {
        if !node.is_valid() {
            return Err(LoadPointsError::NodeNotFound);
        }
        if node.point_count == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .resource
            .get_range(node.offset, node.byte_size as usize)?)
    }

    pub fn point_data_compressed_by_key(&self, key: VoxelKey) -> Result<Vec<u8>, LoadPointsError> {
        match self.resolve(key)? {
            Some(node) => self.point_data_compressed(&node),
            None => Ok(Vec::new()),
        }
    }

    /// The raw point records of `node`.
    pub fn point_data(&self, node: &Node) -> Result<Vec<u8>, LoadPointsError> {
        let compressed = self.point_data_compressed(node)?;
        if node.point_count == 0 {
            return Ok(Vec::new());
        }

        let point_count = node.point_count as usize;
        let record_length = self.decoder.record_length();
        let data = self
            .decompressor
            .decompress(&compressed, point_count, record_length)?;

        let expected = point_count * record_length;
        if data.len() != expected {
            return Err(LoadPointsError::InvalidPointData {
                key: node.key,
                expected,
                actual: data.len(),
            });
        }

        Ok(data)
    }

    pub fn point_data_by_key(&self, key: VoxelKey) -> Result<Vec<u8>, LoadPointsError> {
        match self.resolve(key)? {
            Some(node) => self.point_data(&node),
            None => Ok(Vec::new()),
        }
    }

    /// The decoded points of `node`, in record order.
    pub fn points(&self, node: &Node) -> Result<Vec<Point>, LoadPointsError> {
        let data = self.point_data(node)?;
        trace!(key = %node.key, count = node.point_count, "decoding points");
        Ok(self.decoder.decode(&data))
    }

    pub fn points_by_key(&self, key: VoxelKey) -> Result<Vec<Point>, LoadPointsError> {
        match self.resolve(key)? {
            Some(node) => self.points(&node),
            None => Ok(Vec::new()),
        }
    }

    /// Every point of the file, grouped by node in key order.
    pub fn all_points(&self) -> Result<Vec<Point>, LoadPointsError> {
        let mut points = Vec::new();
        for node in self.all_nodes()? {
            points.extend(self.points(&node)?);
        }
        Ok(points)
    }
}
