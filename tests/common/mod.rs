#![allow(dead_code)]

//! A small synthetic COPC file with uncompressed chunks.
//!
//! The octree cube is `[0, 100]^3` with a root spacing of 10. It holds the
//! root, all eight depth 1 nodes, the eight children of 1-0-0-0 and the eight
//! children of 2-0-0-0, spread over three pages:
//!
//! * `0-0-0-0`: the root and seven depth 1 nodes, pointer to 1-0-0-0
//! * `1-0-0-0`: 1-0-0-0 and seven depth 2 nodes, pointer to 2-0-0-0
//! * `2-0-0-0`: 2-0-0-0 and its eight children, 3-1-1-1 has no points

use binrw::BinWrite;
use byteorder::{LittleEndian, WriteBytesExt};
use copc::hierarchy::HierarchyEntry;
use copc::metadata::{
    CopcInfo, EvlrHeader, ExtraBytesField, LasHeader, VlrHeader, COPC_HIERARCHY_RECORD_ID,
    COPC_INFO_RECORD_ID, COPC_INFO_SIZE, COPC_USER_ID, EXTRA_BYTES_FIELD_SIZE,
    EXTRA_BYTES_RECORD_ID, LAS_HEADER_SIZE, PROJECTION_USER_ID, SPEC_USER_ID, VLR_HEADER_SIZE,
    EVLR_HEADER_SIZE, WKT_RECORD_ID,
};
use copc::prelude::*;
use glam::DVec3;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Range;

pub const RECORD_LENGTH: u16 = 38;
pub const SCALE: f64 = 0.01;
pub const SPACING: f64 = 10.0;
pub const WKT: &str = "LOCAL_CS[\"synthetic\"]";
pub const EXTRA_FIELD: &str = "Amplitude";

/// Where the COPC info stores `root_hier_size`.
pub const ROOT_HIER_SIZE_RANGE: Range<usize> =
    LAS_HEADER_SIZE + VLR_HEADER_SIZE + 48..LAS_HEADER_SIZE + VLR_HEADER_SIZE + 56;

pub const P1: VoxelKey = VoxelKey::new(1, 0, 0, 0);
pub const P2: VoxelKey = VoxelKey::new(2, 0, 0, 0);
pub const EMPTY_NODE: VoxelKey = VoxelKey::new(3, 1, 1, 1);

pub fn root_bounds() -> Aabb {
    Aabb::new(DVec3::ZERO, DVec3::splat(100.0))
}

/// Every node of the fixture, in key order.
pub fn node_keys() -> Vec<VoxelKey> {
    let mut keys = vec![VoxelKey::ROOT];
    keys.extend(VoxelKey::ROOT.children());
    keys.extend(P1.children());
    keys.extend(P2.children());
    keys.sort();
    keys
}

/// Root of the page that stores the entry for `key`.
pub fn page_of(key: &VoxelKey) -> VoxelKey {
    match key.depth {
        0 => VoxelKey::ROOT,
        1 if *key != P1 => VoxelKey::ROOT,
        1 => P1,
        2 if *key != P2 => P1,
        _ => P2,
    }
}

pub fn point_count(key: &VoxelKey) -> usize {
    match key.depth {
        _ if *key == EMPTY_NODE => 0,
        0 => 20,
        1 => 10,
        2 => 6,
        _ => 4,
    }
}

pub struct Fixture {
    pub bytes: Vec<u8>,
    /// Decoded positions of every node's points, in record order.
    pub points: BTreeMap<VoxelKey, Vec<DVec3>>,
    /// File offset of the pointer entry for each sub-page.
    pub pointer_entries: BTreeMap<VoxelKey, usize>,
    /// File offset of every hierarchy page.
    pub page_offsets: BTreeMap<VoxelKey, u64>,
}

impl Fixture {
    pub fn reader(&self) -> CopcReader<MemoryClient> {
        CopcReader::from_resource(MemoryClient::new(self.bytes.clone())).unwrap()
    }

    pub fn all_positions(&self) -> Vec<DVec3> {
        self.points.values().flatten().copied().collect()
    }

    /// Overwrites the byte size stored in the pointer entry for `page`.
    pub fn set_pointer_size(&mut self, page: VoxelKey, byte_size: i32) {
        let at = self.pointer_entries[&page] + 24;
        self.bytes[at..at + 4].copy_from_slice(&byte_size.to_le_bytes());
    }
}

macro_rules! put {
    ($bytes:expr, $value:expr $(,)?) => {{
        let mut cursor = Cursor::new(Vec::new());
        $value.write_le(&mut cursor).unwrap();
        $bytes.extend(cursor.into_inner());
    }};
}

fn next_fraction(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 33) % 1000) as f64 / 1000.0
}

/// Integer coordinates of the points of `key`, all inside its cell.
fn raw_positions(key: &VoxelKey) -> Vec<[i32; 3]> {
    let cell = key.bounds(&root_bounds());
    let mut state = (key.depth * 1000 + key.x * 100 + key.y * 10 + key.z) as u64;
    (0..point_count(key))
        .map(|_| {
            let fraction = DVec3::new(
                next_fraction(&mut state),
                next_fraction(&mut state),
                next_fraction(&mut state),
            );
            let position = cell.min + (cell.max - cell.min) * fraction;
            [
                (position.x / SCALE).round() as i32,
                (position.y / SCALE).round() as i32,
                (position.z / SCALE).round() as i32,
            ]
        })
        .collect()
}

fn record(raw: [i32; 3], index: usize, key: &VoxelKey) -> Vec<u8> {
    let mut record = Vec::with_capacity(RECORD_LENGTH as usize);
    for value in raw {
        record.write_i32::<LittleEndian>(value).unwrap();
    }
    record.write_u16::<LittleEndian>(index as u16).unwrap();
    record.write_u8(0x11).unwrap();
    record.write_u8(0).unwrap();
    record.write_u8(key.depth as u8).unwrap();
    record.write_u8(0).unwrap();
    record.write_i16::<LittleEndian>(0).unwrap();
    record.write_u16::<LittleEndian>(1).unwrap();
    record.write_f64::<LittleEndian>(index as f64).unwrap();
    for channel in [index, 2 * index, 3 * index] {
        record.write_u16::<LittleEndian>(channel as u16).unwrap();
    }
    record.write_u16::<LittleEndian>((index * 7) as u16).unwrap();
    record
}

pub fn build() -> Fixture {
    let keys = node_keys();
    let pages = [VoxelKey::ROOT, P1, P2];

    let wkt_length = WKT.len() + 1;
    let vlrs_length = (VLR_HEADER_SIZE + COPC_INFO_SIZE)
        + (VLR_HEADER_SIZE + wkt_length)
        + (VLR_HEADER_SIZE + EXTRA_BYTES_FIELD_SIZE);
    let point_data_offset = LAS_HEADER_SIZE + vlrs_length;

    // point chunks, one per node, in key order
    let mut chunks = Vec::new();
    let mut locations = BTreeMap::new();
    let mut points = BTreeMap::new();
    for key in &keys {
        let offset = point_data_offset + chunks.len();
        let raw = raw_positions(key);
        for (index, position) in raw.iter().enumerate() {
            chunks.extend(record(*position, index, key));
        }
        locations.insert(*key, (offset as u64, (raw.len() * RECORD_LENGTH as usize) as i32));
        points.insert(
            *key,
            raw.iter()
                .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64) * DVec3::splat(SCALE) + DVec3::ZERO)
                .collect::<Vec<_>>(),
        );
    }

    // hierarchy pages, each the page's own node, its other entries, then pointers
    let evlr_offset = point_data_offset + chunks.len();
    let mut page_entries: Vec<Vec<HierarchyEntry>> = Vec::new();
    let mut page_offsets = BTreeMap::new();
    let mut cursor = evlr_offset + EVLR_HEADER_SIZE;
    let mut entries_by_page = BTreeMap::new();
    for page in pages {
        let nodes: Vec<VoxelKey> = keys.iter().copied().filter(|key| page_of(key) == page).collect();
        let pointers: Vec<VoxelKey> = pages
            .iter()
            .copied()
            .filter(|sub_page| sub_page.parent().is_some_and(|parent| page_of(&parent) == page))
            .collect();
        page_offsets.insert(page, (cursor as u64, ((nodes.len() + pointers.len()) * 32) as u64));
        cursor += (nodes.len() + pointers.len()) * 32;
        entries_by_page.insert(page, (nodes, pointers));
    }

    let mut pointer_entries = BTreeMap::new();
    let mut entry_cursor = evlr_offset + EVLR_HEADER_SIZE;
    for page in pages {
        let (nodes, pointers) = &entries_by_page[&page];
        let mut entries = Vec::new();
        for key in nodes {
            let (offset, byte_size) = locations[key];
            entries.push(HierarchyEntry::new(*key, offset, byte_size, point_count(key) as i32));
        }
        entry_cursor += nodes.len() * 32;
        for sub_page in pointers {
            let (offset, size) = page_offsets[sub_page];
            entries.push(HierarchyEntry::new(*sub_page, offset, size as i32, -1));
            pointer_entries.insert(*sub_page, entry_cursor);
            entry_cursor += 32;
        }
        page_entries.push(entries);
    }
    let hierarchy_length = (cursor - evlr_offset - EVLR_HEADER_SIZE) as u64;

    let (root_offset, root_size) = page_offsets[&VoxelKey::ROOT];
    let header = LasHeader {
        version_major: 1,
        version_minor: 4,
        header_size: LAS_HEADER_SIZE as u16,
        point_data_offset: point_data_offset as u32,
        number_of_vlrs: 3,
        point_data_format: 7,
        point_record_length: RECORD_LENGTH,
        scale: [SCALE; 3],
        offset: [0.0; 3],
        max_x: 100.0,
        max_y: 100.0,
        max_z: 100.0,
        evlr_offset: evlr_offset as u64,
        number_of_evlrs: 1,
        point_count_64: keys.iter().map(point_count).sum::<usize>() as u64,
        ..Default::default()
    };
    let info = CopcInfo {
        center_x: 50.0,
        center_y: 50.0,
        center_z: 50.0,
        halfsize: 50.0,
        spacing: SPACING,
        root_hier_offset: root_offset,
        root_hier_size: root_size,
        gpstime_minimum: 0.0,
        gpstime_maximum: 19.0,
    };

    let mut bytes = Vec::new();
    put!(bytes, header);
    put!(
        bytes,
        VlrHeader::new(COPC_USER_ID, COPC_INFO_RECORD_ID, COPC_INFO_SIZE as u16, "copc info")
    );
    put!(bytes, info);
    put!(
        bytes,
        VlrHeader::new(PROJECTION_USER_ID, WKT_RECORD_ID, wkt_length as u16, "WKT")
    );
    bytes.extend(WKT.as_bytes());
    bytes.push(0);
    put!(
        bytes,
        VlrHeader::new(
            SPEC_USER_ID,
            EXTRA_BYTES_RECORD_ID,
            EXTRA_BYTES_FIELD_SIZE as u16,
            "extra bytes",
        )
    );
    put!(bytes, ExtraBytesField::new(EXTRA_FIELD, 3, 0));
    assert_eq!(bytes.len(), point_data_offset);

    bytes.extend(chunks);
    put!(
        bytes,
        EvlrHeader::new(COPC_USER_ID, COPC_HIERARCHY_RECORD_ID, hierarchy_length, "hierarchy")
    );
    for entries in &page_entries {
        for entry in entries {
            put!(bytes, entry);
        }
    }
    assert_eq!(bytes.len(), cursor);

    Fixture {
        bytes,
        points,
        pointer_entries,
        page_offsets: page_offsets
            .into_iter()
            .map(|(page, (offset, _))| (page, offset))
            .collect(),
    }
}
