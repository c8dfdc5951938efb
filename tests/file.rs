mod common;

use copc::prelude::*;
use std::io::Write;

#[test]
fn open_from_disk() {
    let fixture = common::build();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&fixture.bytes).unwrap();
    file.flush().unwrap();

    let reader = CopcReader::open(file.path()).unwrap();
    assert_eq!(reader.resource().len(), fixture.bytes.len() as u64);
    assert_eq!(reader.all_nodes().unwrap().len(), 25);

    let root = reader.find_node(VoxelKey::ROOT).unwrap();
    let positions: Vec<_> = reader
        .points(&root)
        .unwrap()
        .iter()
        .map(|point| point.position)
        .collect();
    assert_eq!(positions, fixture.points[&VoxelKey::ROOT]);
}

#[test]
fn config_serializes_to_json() {
    let fixture = common::build();
    let reader = fixture.reader();

    let json = serde_json::to_value(reader.config()).unwrap();
    assert_eq!(json["copc_info"]["spacing"], common::SPACING);
    assert_eq!(json["wkt"], common::WKT);
    assert!(json.get("laz_vlr").is_none());

    let info: CopcInfo = serde_json::from_value(json["copc_info"].clone()).unwrap();
    assert_eq!(&info, reader.copc_info());
}
