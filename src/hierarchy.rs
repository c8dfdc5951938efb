use crate::octree::key::VoxelKey;
use crate::octree::node::Node;
use crate::registry::NodeRegistry;
use crate::resource::{ResourceClient, ResourceError};
use binrw::{binrw, BinReaderExt};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, span, Level};

pub const BYTES_PER_ENTRY: usize = 32;

#[derive(Error, Debug)]
pub enum ReadHierarchyError {
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Invalid binary data: {0}")]
    InvalidBinaryData(#[from] binrw::Error),

    #[error("Hierarchy page {key} has size {size}, not a positive multiple of 32")]
    InvalidPageSize { key: VoxelKey, size: u64 },

    #[error("Entry {key} references bytes {offset}..+{byte_size} outside the file")]
    EntryOutOfBounds {
        key: VoxelKey,
        offset: u64,
        byte_size: i32,
    },

    #[error("Entry {key} does not belong to the subtree of page {page}")]
    EntryOutsidePage { key: VoxelKey, page: VoxelKey },

    #[error("Invalid entry {key}: {reason}")]
    InvalidEntry { key: VoxelKey, reason: String },

    #[error("Node {0} appears more than once in the hierarchy")]
    DuplicateNode(VoxelKey),

    #[error("Loading hierarchy page {key} failed: {reason}")]
    PageLoadFailed { key: VoxelKey, reason: String },
}

/// One on-disk hierarchy record.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct HierarchyEntry {
    pub depth: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub offset: u64,
    pub byte_size: i32,
    /// -1 marks a pointer to a child page.
    pub point_count: i32,
}

impl HierarchyEntry {
    pub fn new(key: VoxelKey, offset: u64, byte_size: i32, point_count: i32) -> Self {
        Self {
            depth: key.depth,
            x: key.x,
            y: key.y,
            z: key.z,
            offset,
            byte_size,
            point_count,
        }
    }

    pub fn key(&self) -> VoxelKey {
        VoxelKey::new(self.depth, self.x, self.y, self.z)
    }

    pub fn is_page_pointer(&self) -> bool {
        self.point_count == -1
    }
}

/// Location of a hierarchy page rooted at `key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRef {
    pub key: VoxelKey,
    pub offset: u64,
    pub byte_size: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ParsedPage {
    pub nodes: Vec<Node>,
    pub sub_pages: Vec<PageRef>,
}

/// Parses and validates the records of one page.
pub fn parse_page(page: &PageRef, buf: &[u8], file_len: u64) -> Result<ParsedPage, ReadHierarchyError> {
    if buf.is_empty() || buf.len() % BYTES_PER_ENTRY != 0 {
        return Err(ReadHierarchyError::InvalidPageSize {
            key: page.key,
            size: buf.len() as u64,
        });
    }

    let num_entries = buf.len() / BYTES_PER_ENTRY;
    let mut cursor = Cursor::new(buf);
    let mut parsed = ParsedPage::default();
    let mut seen = HashSet::with_capacity(num_entries);

    for _ in 0..num_entries {
        let entry: HierarchyEntry = cursor.read_le()?;
        let key = entry.key();

        if !key.is_valid() || !key.is_descendant_or_self(&page.key) {
            return Err(ReadHierarchyError::EntryOutsidePage { key, page: page.key });
        }
        if !seen.insert(key) {
            return Err(ReadHierarchyError::DuplicateNode(key));
        }
        if entry.point_count < -1 {
            return Err(ReadHierarchyError::InvalidEntry {
                key,
                reason: format!("point count {}", entry.point_count),
            });
        }
        if entry.byte_size < 0 {
            return Err(ReadHierarchyError::InvalidEntry {
                key,
                reason: format!("byte size {}", entry.byte_size),
            });
        }
        let in_file = entry
            .offset
            .checked_add(entry.byte_size as u64)
            .is_some_and(|end| end <= file_len);
        if !in_file {
            return Err(ReadHierarchyError::EntryOutOfBounds {
                key,
                offset: entry.offset,
                byte_size: entry.byte_size,
            });
        }

        if entry.is_page_pointer() {
            if key == page.key {
                return Err(ReadHierarchyError::InvalidEntry {
                    key,
                    reason: "page points at itself".to_string(),
                });
            }
            parsed.sub_pages.push(PageRef {
                key,
                offset: entry.offset,
                byte_size: entry.byte_size as u64,
            });
            continue;
        }

        if entry.byte_size == 0 && entry.point_count > 0 {
            return Err(ReadHierarchyError::InvalidEntry {
                key,
                reason: "points without data".to_string(),
            });
        }

        parsed.nodes.push(Node::new(
            key,
            entry.offset,
            entry.byte_size,
            entry.point_count,
        ));
    }

    Ok(parsed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageState {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug)]
struct PageSlot {
    page: PageRef,
    state: PageState,
    /// Bumped every time a thread claims the page.
    attempt: u64,
    /// Why the latest attempt failed, if it did.
    failure: Option<String>,
}

impl PageSlot {
    fn new(page: PageRef) -> Self {
        Self {
            page,
            state: PageState::Unloaded,
            attempt: 0,
            failure: None,
        }
    }
}

/// Lazily loaded octree hierarchy.
///
/// Pages are discovered top-down: the root page is known from the COPC info,
/// every other page from a pointer entry in its parent page. Each page moves
/// `Unloaded -> Loading -> Loaded` exactly once. The thread that claims a
/// page parses it outside the lock, other threads asking for it wait until
/// the result is published. When the attempt fails, the threads that waited
/// for it get the failure instead of reading the page again. Later calls
/// start a new attempt.
#[derive(Debug)]
pub struct Hierarchy {
    registry: NodeRegistry,
    pages: Mutex<BTreeMap<VoxelKey, PageSlot>>,
    page_published: Condvar,
}

impl Hierarchy {
    pub fn new(root_offset: u64, root_size: u64) -> Self {
        let root = PageRef {
            key: VoxelKey::ROOT,
            offset: root_offset,
            byte_size: root_size,
        };
        let mut pages = BTreeMap::new();
        pages.insert(VoxelKey::ROOT, PageSlot::new(root));

        Self {
            registry: NodeRegistry::new(),
            pages: Mutex::new(pages),
            page_published: Condvar::new(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// True when a page is rooted at `key`, loaded or not.
    pub fn is_page(&self, key: &VoxelKey) -> bool {
        self.pages.lock().contains_key(key)
    }

    pub fn is_page_loaded(&self, key: &VoxelKey) -> bool {
        self.pages
            .lock()
            .get(key)
            .is_some_and(|slot| slot.state == PageState::Loaded)
    }

    pub fn loaded_pages(&self) -> Vec<VoxelKey> {
        self.pages
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state == PageState::Loaded)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn known_pages(&self) -> Vec<VoxelKey> {
        self.pages.lock().keys().copied().collect()
    }

    /// Loads the page rooted at `key`.
    ///
    /// Returns `Ok(true)` when this call loaded it, `Ok(false)` when it was
    /// already loaded or no page is rooted at `key`. A call that waited on
    /// another thread's failed attempt returns `PageLoadFailed`.
    pub fn load_page<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<bool, ReadHierarchyError> {
        let page = {
            let mut pages = self.pages.lock();
            let mut waited_on = None;
            loop {
                let Some(slot) = pages.get_mut(&key) else {
                    return Ok(false);
                };
                let state = slot.state;
                match state {
                    PageState::Loaded => return Ok(false),
                    PageState::Unloaded => {
                        if let (Some(attempt), Some(reason)) = (waited_on, &slot.failure) {
                            if attempt == slot.attempt {
                                return Err(ReadHierarchyError::PageLoadFailed {
                                    key,
                                    reason: reason.clone(),
                                });
                            }
                        }
                        slot.state = PageState::Loading;
                        slot.attempt += 1;
                        slot.failure = None;
                        break slot.page;
                    }
                    PageState::Loading => {
                        waited_on = Some(slot.attempt);
                        self.page_published.wait(&mut pages);
                    }
                }
            }
        };

        let _span = span!(Level::DEBUG, "load_page", key = %key).entered();

        let parsed = read_page(resource, &page);

        let mut pages = self.pages.lock();
        let published = parsed.and_then(|parsed| self.publish(&mut pages, &page, parsed));
        if let Some(slot) = pages.get_mut(&key) {
            match &published {
                Ok(()) => slot.state = PageState::Loaded,
                Err(err) => {
                    slot.state = PageState::Unloaded;
                    slot.failure = Some(err.to_string());
                }
            }
        }
        drop(pages);
        self.page_published.notify_all();

        published.map(|()| true)
    }

    fn publish(
        &self,
        pages: &mut BTreeMap<VoxelKey, PageSlot>,
        page: &PageRef,
        parsed: ParsedPage,
    ) -> Result<(), ReadHierarchyError> {
        if let Some(duplicate) = parsed
            .sub_pages
            .iter()
            .find(|sub_page| pages.contains_key(&sub_page.key))
        {
            return Err(ReadHierarchyError::DuplicateNode(duplicate.key));
        }

        self.registry.insert_page(page.key, &parsed.nodes)?;

        for sub_page in &parsed.sub_pages {
            pages.insert(sub_page.key, PageSlot::new(*sub_page));
        }

        debug!(
            key = %page.key,
            nodes = parsed.nodes.len(),
            sub_pages = parsed.sub_pages.len(),
            "published hierarchy page"
        );

        Ok(())
    }

    /// Loads, top-down from the root, every page on the way to `key`.
    ///
    /// Stops as soon as the chain leaves the known hierarchy, in which case
    /// `key` is absent. The walk never goes deeper than the loaded tree.
    pub fn ensure_loaded<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<(), ReadHierarchyError> {
        if !key.is_valid() {
            return Ok(());
        }

        self.load_page(resource, VoxelKey::ROOT)?;

        for ancestor in key.lineage().skip(1) {
            if self.is_page(&ancestor) {
                self.load_page(resource, ancestor)?;
            } else if !self.registry.contains(&ancestor) {
                break;
            }
        }

        Ok(())
    }

    /// Loads pages until every known page accepted by `wanted` is loaded.
    ///
    /// Pages are discovered as their parents load, so `wanted` must accept
    /// the parent of any page it accepts, as spatial and subtree predicates do.
    pub fn load_pages_where<C: ResourceClient>(
        &self,
        resource: &C,
        wanted: impl Fn(&VoxelKey) -> bool,
    ) -> Result<(), ReadHierarchyError> {
        loop {
            let pending: Vec<VoxelKey> = self
                .pages
                .lock()
                .iter()
                .filter(|(page, slot)| slot.state != PageState::Loaded && wanted(page))
                .map(|(page, _)| *page)
                .collect();

            if pending.is_empty() {
                return Ok(());
            }

            for page in pending {
                self.load_page(resource, page)?;
            }
        }
    }

    /// Loads every page in the subtree rooted at `key`.
    pub fn load_subtree<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<(), ReadHierarchyError> {
        let _span = span!(Level::DEBUG, "load_subtree", key = %key).entered();

        self.ensure_loaded(resource, key)?;
        self.load_pages_where(resource, |page| page.is_descendant_or_self(&key))
    }

    pub fn load_all<C: ResourceClient>(&self, resource: &C) -> Result<(), ReadHierarchyError> {
        self.load_subtree(resource, VoxelKey::ROOT)
    }

    /// The leaf entry for `key`, or the invalid default entry when the
    /// hierarchy has none.
    pub fn find_node<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<Node, ReadHierarchyError> {
        if !key.is_valid() {
            return Ok(Node::default());
        }
        self.ensure_loaded(resource, key)?;
        Ok(self.registry.get(&key).unwrap_or_default())
    }

    pub fn all_nodes<C: ResourceClient>(&self, resource: &C) -> Result<Vec<Node>, ReadHierarchyError> {
        self.load_all(resource)?;
        Ok(self.registry.nodes())
    }

    /// Leaf entries one level below `key` that live in the same page as
    /// `key`: the page rooted at `key` if there is one, otherwise the page
    /// holding `key`'s entry.
    pub fn children_of_page<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<Vec<Node>, ReadHierarchyError> {
        if !key.is_valid() {
            return Ok(Vec::new());
        }
        self.ensure_loaded(resource, key)?;

        let page = if self.is_page(&key) {
            key
        } else {
            match self.registry.page_of(&key) {
                Some(page) => page,
                None => return Ok(Vec::new()),
            }
        };

        Ok(key
            .children()
            .iter()
            .filter(|child| self.registry.page_of(child) == Some(page))
            .filter_map(|child| self.registry.get(child))
            .collect())
    }

    /// Every leaf entry of the page rooted at `key` and of all pages below it.
    /// A key that is a leaf but not a page yields just that leaf.
    pub fn nodes_of_page<C: ResourceClient>(
        &self,
        resource: &C,
        key: VoxelKey,
    ) -> Result<Vec<Node>, ReadHierarchyError> {
        if !key.is_valid() {
            return Ok(Vec::new());
        }
        self.ensure_loaded(resource, key)?;

        if !self.is_page(&key) {
            return Ok(self.registry.get(&key).into_iter().collect());
        }

        self.load_subtree(resource, key)?;
        Ok(self
            .registry
            .nodes_where(|node| node.key.is_descendant_or_self(&key)))
    }

    pub fn page_list<C: ResourceClient>(&self, resource: &C) -> Result<Vec<VoxelKey>, ReadHierarchyError> {
        self.load_all(resource)?;
        Ok(self.loaded_pages())
    }
}

fn read_page<C: ResourceClient>(resource: &C, page: &PageRef) -> Result<ParsedPage, ReadHierarchyError> {
    let invalid_size = || ReadHierarchyError::InvalidPageSize {
        key: page.key,
        size: page.byte_size,
    };
    if page.byte_size == 0 || page.byte_size % BYTES_PER_ENTRY as u64 != 0 {
        return Err(invalid_size());
    }
    let length = usize::try_from(page.byte_size).map_err(|_| invalid_size())?;

    let data = resource.get_range(page.offset, length)?;
    parse_page(page, &data, resource.len())
}
