use crate::octree::aabb::Aabb;
use crate::point_attributes::{extra_bytes_type, point_format, PointFormat};
use crate::resource::{ResourceClient, ResourceError};
use binrw::{binrw, BinRead, BinReaderExt};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, span, warn, Level};

pub const LAS_HEADER_SIZE: usize = 375;
pub const VLR_HEADER_SIZE: usize = 54;
pub const EVLR_HEADER_SIZE: usize = 60;
pub const COPC_INFO_SIZE: usize = 160;
pub const EXTRA_BYTES_FIELD_SIZE: usize = 192;

pub const COPC_USER_ID: &str = "copc";
pub const COPC_INFO_RECORD_ID: u16 = 1;
pub const COPC_HIERARCHY_RECORD_ID: u16 = 1000;
pub const LAZ_USER_ID: &str = "laszip encoded";
pub const LAZ_RECORD_ID: u16 = 22204;
pub const PROJECTION_USER_ID: &str = "LASF_Projection";
pub const WKT_RECORD_ID: u16 = 2112;
pub const SPEC_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;

#[derive(Error, Debug)]
pub enum ReadMetadataError {
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Invalid binary data: {0}")]
    InvalidBinaryData(#[from] binrw::Error),

    #[error("Unsupported LAS version {0}.{1}, COPC requires 1.4")]
    UnsupportedVersion(u8, u8),

    #[error("Invalid LAS header size {0}")]
    InvalidHeaderSize(u16),

    #[error("Unsupported point format {0}, COPC requires 6, 7 or 8")]
    UnsupportedPointFormat(u8),

    #[error("Point record length {length} is too short for point format {format}")]
    InvalidRecordLength { format: u8, length: u16 },

    #[error("The file has no COPC info VLR")]
    MissingCopcInfo,

    #[error("Invalid COPC info: {0}")]
    InvalidCopcInfo(String),

    #[error("Invalid extra bytes VLR: {0}")]
    InvalidExtraBytes(String),
}

/// Text stored in a fixed-size, NUL-padded field.
fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// NUL-padded copy of `value`, truncated to `N` bytes.
pub fn to_fixed<const N: usize>(value: &str) -> [u8; N] {
    let mut bytes = [0; N];
    let len = value.len().min(N);
    bytes[..len].copy_from_slice(&value.as_bytes()[..len]);
    bytes
}

/// LAS 1.4 public header block.
#[binrw]
#[brw(little, magic = b"LASF")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LasHeader {
    pub file_source_id: u16,
    pub global_encoding: u16,
    pub project_id: [u8; 16],
    pub version_major: u8,
    pub version_minor: u8,
    pub system_identifier: [u8; 32],
    pub generating_software: [u8; 32],
    pub creation_day: u16,
    pub creation_year: u16,
    pub header_size: u16,
    pub point_data_offset: u32,
    pub number_of_vlrs: u32,
    /// Format id, with bit 7 set when the points are LAZ compressed.
    pub point_data_format: u8,
    pub point_record_length: u16,
    pub legacy_point_count: u32,
    pub legacy_points_by_return: [u32; 5],
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub max_x: f64,
    pub min_x: f64,
    pub max_y: f64,
    pub min_y: f64,
    pub max_z: f64,
    pub min_z: f64,
    pub waveform_offset: u64,
    pub evlr_offset: u64,
    pub number_of_evlrs: u32,
    pub point_count_64: u64,
    pub points_by_return: [u64; 15],
}

impl LasHeader {
    pub fn point_format_id(&self) -> u8 {
        self.point_data_format & 0x3F
    }

    pub fn is_compressed(&self) -> bool {
        self.point_data_format & 0x80 != 0
    }

    pub fn point_count(&self) -> u64 {
        if self.point_count_64 > 0 {
            self.point_count_64
        } else {
            u64::from(self.legacy_point_count)
        }
    }

    pub fn scale(&self) -> DVec3 {
        DVec3::from_array(self.scale)
    }

    pub fn offset(&self) -> DVec3 {
        DVec3::from_array(self.offset)
    }

    pub fn min(&self) -> DVec3 {
        DVec3::new(self.min_x, self.min_y, self.min_z)
    }

    pub fn max(&self) -> DVec3 {
        DVec3::new(self.max_x, self.max_y, self.max_z)
    }

    /// Extent of the points as recorded in the header.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.min(), self.max())
    }

    pub fn point_format(&self) -> Option<&'static PointFormat> {
        point_format(self.point_format_id())
    }

    /// Bytes of each record that belong to extra-bytes fields.
    pub fn eb_byte_size(&self) -> u16 {
        self.point_format()
            .map(|format| self.point_record_length.saturating_sub(format.base_length))
            .unwrap_or(0)
    }

    pub fn system_identifier(&self) -> String {
        fixed_str(&self.system_identifier)
    }

    pub fn generating_software(&self) -> String {
        fixed_str(&self.generating_software)
    }

    fn validate(&self) -> Result<&'static PointFormat, ReadMetadataError> {
        if (self.version_major, self.version_minor) != (1, 4) {
            return Err(ReadMetadataError::UnsupportedVersion(
                self.version_major,
                self.version_minor,
            ));
        }
        if (self.header_size as usize) < LAS_HEADER_SIZE {
            return Err(ReadMetadataError::InvalidHeaderSize(self.header_size));
        }
        let format = self
            .point_format()
            .ok_or(ReadMetadataError::UnsupportedPointFormat(self.point_format_id()))?;
        if self.point_record_length < format.base_length {
            return Err(ReadMetadataError::InvalidRecordLength {
                format: format.id,
                length: self.point_record_length,
            });
        }
        Ok(format)
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlrHeader {
    pub reserved: u16,
    pub user_id: [u8; 16],
    pub record_id: u16,
    pub record_length: u16,
    pub description: [u8; 32],
}

impl VlrHeader {
    pub fn new(user_id: &str, record_id: u16, record_length: u16, description: &str) -> Self {
        Self {
            reserved: 0,
            user_id: to_fixed(user_id),
            record_id,
            record_length,
            description: to_fixed(description),
        }
    }

    pub fn user_id(&self) -> String {
        fixed_str(&self.user_id)
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvlrHeader {
    pub reserved: u16,
    pub user_id: [u8; 16],
    pub record_id: u16,
    pub record_length: u64,
    pub description: [u8; 32],
}

impl EvlrHeader {
    pub fn new(user_id: &str, record_id: u16, record_length: u64, description: &str) -> Self {
        Self {
            reserved: 0,
            user_id: to_fixed(user_id),
            record_id,
            record_length,
            description: to_fixed(description),
        }
    }

    pub fn user_id(&self) -> String {
        fixed_str(&self.user_id)
    }
}

/// Payload of the `copc`/1 VLR: the octree cube and where its hierarchy starts.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CopcInfo {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub halfsize: f64,
    /// Point spacing at depth 0.
    pub spacing: f64,
    pub root_hier_offset: u64,
    pub root_hier_size: u64,
    pub gpstime_minimum: f64,
    #[brw(pad_after = 88)]
    pub gpstime_maximum: f64,
}

impl CopcInfo {
    pub fn center(&self) -> DVec3 {
        DVec3::new(self.center_x, self.center_y, self.center_z)
    }

    /// The cube every voxel key subdivides.
    pub fn root_bounds(&self) -> Aabb {
        Aabb::from_cube(self.center(), self.halfsize)
    }

    pub fn validate(&self) -> Result<(), ReadMetadataError> {
        if !(self.halfsize.is_finite() && self.halfsize > 0.0) {
            return Err(ReadMetadataError::InvalidCopcInfo(format!(
                "halfsize must be positive, got {}",
                self.halfsize
            )));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(ReadMetadataError::InvalidCopcInfo(format!(
                "spacing must be positive, got {}",
                self.spacing
            )));
        }
        if !self.center().is_finite() {
            return Err(ReadMetadataError::InvalidCopcInfo(
                "center must be finite".to_string(),
            ));
        }
        if self.root_hier_size == 0 || self.root_hier_size % 32 != 0 {
            return Err(ReadMetadataError::InvalidCopcInfo(format!(
                "root hierarchy size {} is not a positive multiple of 32",
                self.root_hier_size
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CopcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CopcInfo:")?;
        writeln!(f, "\tcenter_x: {}", self.center_x)?;
        writeln!(f, "\tcenter_y: {}", self.center_y)?;
        writeln!(f, "\tcenter_z: {}", self.center_z)?;
        writeln!(f, "\thalfsize: {}", self.halfsize)?;
        writeln!(f, "\tspacing: {}", self.spacing)?;
        writeln!(f, "\troot_hier_offset: {}", self.root_hier_offset)?;
        writeln!(f, "\troot_hier_size: {}", self.root_hier_size)?;
        writeln!(f, "\tgpstime_minimum: {}", self.gpstime_minimum)?;
        writeln!(f, "\tgpstime_maximum: {}", self.gpstime_maximum)
    }
}

/// One descriptor of the `LASF_Spec`/4 extra-bytes VLR.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraBytesField {
    pub reserved: [u8; 2],
    pub data_type: u8,
    pub options: u8,
    pub name: [u8; 32],
    pub unused: [u8; 4],
    pub no_data: [u8; 24],
    pub min: [u8; 24],
    pub max: [u8; 24],
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub description: [u8; 32],
}

impl ExtraBytesField {
    /// For the undocumented type 0, `options` holds the byte length.
    pub fn new(name: &str, data_type: u8, options: u8) -> Self {
        Self {
            reserved: [0; 2],
            data_type,
            options,
            name: to_fixed(name),
            unused: [0; 4],
            no_data: [0; 24],
            min: [0; 24],
            max: [0; 24],
            scale: [0.0; 3],
            offset: [0.0; 3],
            description: [0; 32],
        }
    }

    pub fn name(&self) -> String {
        fixed_str(&self.name)
    }

    pub fn byte_length(&self) -> usize {
        match self.data_type {
            0 => self.options as usize,
            data_type => extra_bytes_type(data_type)
                .map(|t| t.size as usize)
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraBytesVlr {
    pub fields: Vec<ExtraBytesField>,
}

impl ExtraBytesVlr {
    pub fn parse(data: &[u8]) -> Result<Self, ReadMetadataError> {
        if data.len() % EXTRA_BYTES_FIELD_SIZE != 0 {
            return Err(ReadMetadataError::InvalidExtraBytes(format!(
                "record length {} is not a multiple of {}",
                data.len(),
                EXTRA_BYTES_FIELD_SIZE
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut fields = Vec::with_capacity(data.len() / EXTRA_BYTES_FIELD_SIZE);
        for _ in 0..data.len() / EXTRA_BYTES_FIELD_SIZE {
            let field: ExtraBytesField = cursor.read_le()?;
            if extra_bytes_type(field.data_type).is_none() {
                return Err(ReadMetadataError::InvalidExtraBytes(format!(
                    "field {:?} has unknown data type {}",
                    field.name(),
                    field.data_type
                )));
            }
            fields.push(field);
        }

        Ok(Self { fields })
    }

    /// Sum of the field lengths, the extra-bytes part of every point record.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(ExtraBytesField::byte_length).sum()
    }

    /// Byte offset of the named field inside the extra-bytes part of a record.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        let mut position = 0;
        for field in &self.fields {
            if field.name() == name {
                return Some(position);
            }
            position += field.byte_length();
        }
        None
    }
}

/// Everything parsed from the header and (E)VLRs when a file is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopcConfig {
    pub header: LasHeader,
    pub copc_info: CopcInfo,
    pub wkt: String,
    pub extra_bytes: ExtraBytesVlr,
    /// Raw `laszip encoded` VLR payload, handed to the LAZ codec.
    #[serde(skip)]
    pub laz_vlr: Option<Vec<u8>>,
}

impl CopcConfig {
    pub fn point_format(&self) -> Option<&'static PointFormat> {
        self.header.point_format()
    }
}

/// Collects the records a reader cares about while walking the VLR directories.
#[derive(Default)]
struct RecordScan {
    copc_info: Option<CopcInfo>,
    laz_vlr: Option<Vec<u8>>,
    wkt: Option<String>,
    extra_bytes: Option<ExtraBytesVlr>,
}

impl RecordScan {
    fn visit<C: ResourceClient>(
        &mut self,
        resource: &C,
        position: usize,
        user_id: &str,
        record_id: u16,
        data_offset: u64,
        data_length: u64,
    ) -> Result<(), ReadMetadataError> {
        let read = || -> Result<Vec<u8>, ReadMetadataError> {
            let length = usize::try_from(data_length).map_err(|_| ResourceError::OutOfBounds {
                offset: data_offset,
                length: usize::MAX,
                len: resource.len(),
            })?;
            Ok(resource.get_range(data_offset, length)?)
        };

        match (user_id, record_id) {
            (COPC_USER_ID, COPC_INFO_RECORD_ID) => {
                if position != 0 {
                    warn!(position, "COPC info is not the first VLR");
                }
                if data_length as usize != COPC_INFO_SIZE {
                    return Err(ReadMetadataError::InvalidCopcInfo(format!(
                        "record length {} is not {}",
                        data_length, COPC_INFO_SIZE
                    )));
                }
                let data = read()?;
                self.copc_info = Some(CopcInfo::read_le(&mut Cursor::new(data.as_slice()))?);
            }
            (COPC_USER_ID, COPC_HIERARCHY_RECORD_ID) => {
                debug!(offset = data_offset, length = data_length, "found hierarchy EVLR");
            }
            (LAZ_USER_ID, LAZ_RECORD_ID) => {
                self.laz_vlr = Some(read()?);
            }
            (PROJECTION_USER_ID, WKT_RECORD_ID) => {
                let data = read()?;
                self.wkt = Some(fixed_str(&data));
            }
            (SPEC_USER_ID, EXTRA_BYTES_RECORD_ID) => {
                self.extra_bytes = Some(ExtraBytesVlr::parse(&read()?)?);
            }
            _ => {
                debug!(user_id, record_id, "skipping record");
            }
        }

        Ok(())
    }
}

/// Reads the header, walks the VLRs and EVLRs and validates the COPC info.
pub fn read_copc_config<C: ResourceClient>(resource: &C) -> Result<CopcConfig, ReadMetadataError> {
    let _span = span!(Level::DEBUG, "read_copc_config").entered();

    let bytes = resource.get_range(0, LAS_HEADER_SIZE)?;
    let header: LasHeader = Cursor::new(bytes.as_slice()).read_le()?;
    let format = header.validate()?;

    let mut scan = RecordScan::default();

    let mut offset = u64::from(header.header_size);
    for position in 0..header.number_of_vlrs as usize {
        let bytes = resource.get_range(offset, VLR_HEADER_SIZE)?;
        let vlr: VlrHeader = Cursor::new(bytes.as_slice()).read_le()?;
        let data_offset = offset + VLR_HEADER_SIZE as u64;
        let data_length = u64::from(vlr.record_length);
        scan.visit(resource, position, &vlr.user_id(), vlr.record_id, data_offset, data_length)?;
        offset = data_offset + data_length;
    }

    if header.number_of_evlrs > 0 && header.evlr_offset > 0 {
        let mut offset = header.evlr_offset;
        for position in 0..header.number_of_evlrs as usize {
            let bytes = resource.get_range(offset, EVLR_HEADER_SIZE)?;
            let evlr: EvlrHeader = Cursor::new(bytes.as_slice()).read_le()?;
            let data_offset = offset + EVLR_HEADER_SIZE as u64;
            // EVLR positions never count as "first VLR"
            scan.visit(
                resource,
                position + header.number_of_vlrs as usize + 1,
                &evlr.user_id(),
                evlr.record_id,
                data_offset,
                evlr.record_length,
            )?;
            offset = data_offset.saturating_add(evlr.record_length);
        }
    }

    let copc_info = scan.copc_info.ok_or(ReadMetadataError::MissingCopcInfo)?;
    copc_info.validate()?;

    let extra_bytes = scan.extra_bytes.unwrap_or_default();
    let eb_byte_size = header.eb_byte_size() as usize;
    if extra_bytes.byte_size() != eb_byte_size {
        warn!(
            declared = extra_bytes.byte_size(),
            record = eb_byte_size,
            "extra bytes VLR does not match the point record length"
        );
    }

    if header.is_compressed() && scan.laz_vlr.is_none() {
        warn!("compressed point format without a laszip VLR");
    }

    debug!(
        point_format = format.id,
        point_count = header.point_count(),
        root_hier_offset = copc_info.root_hier_offset,
        root_hier_size = copc_info.root_hier_size,
        "read COPC metadata"
    );

    Ok(CopcConfig {
        header,
        copc_info,
        wkt: scan.wkt.unwrap_or_default(),
        extra_bytes,
        laz_vlr: scan.laz_vlr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinWrite;

    macro_rules! to_bytes {
        ($value:expr) => {{
            let mut cursor = Cursor::new(Vec::new());
            $value.write_le(&mut cursor).unwrap();
            cursor.into_inner()
        }};
    }

    fn sample_header() -> LasHeader {
        LasHeader {
            version_major: 1,
            version_minor: 4,
            header_size: LAS_HEADER_SIZE as u16,
            point_data_format: 7 | 0x80,
            point_record_length: 40,
            point_count_64: 42,
            scale: [0.01; 3],
            ..Default::default()
        }
    }

    #[test]
    fn record_sizes_match_the_format() {
        assert_eq!(to_bytes!(sample_header()).len(), LAS_HEADER_SIZE);
        assert_eq!(to_bytes!(VlrHeader::default()).len(), VLR_HEADER_SIZE);
        assert_eq!(to_bytes!(EvlrHeader::default()).len(), EVLR_HEADER_SIZE);
        assert_eq!(to_bytes!(CopcInfo::default()).len(), COPC_INFO_SIZE);
        assert_eq!(
            to_bytes!(ExtraBytesField::new("a", 1, 0)).len(),
            EXTRA_BYTES_FIELD_SIZE
        );
    }

    #[test]
    fn header_accessors() {
        let bytes = to_bytes!(sample_header());
        assert_eq!(&bytes[..4], b"LASF");
        let header: LasHeader = Cursor::new(bytes.as_slice()).read_le().unwrap();
        assert_eq!(header.point_format_id(), 7);
        assert!(header.is_compressed());
        assert_eq!(header.point_count(), 42);
        assert_eq!(header.eb_byte_size(), 4);
        assert_eq!(header.scale(), DVec3::splat(0.01));
        assert!(header.validate().is_ok());
    }

    #[test]
    fn legacy_point_count_fallback() {
        let header = LasHeader {
            legacy_point_count: 7,
            point_count_64: 0,
            ..sample_header()
        };
        assert_eq!(header.point_count(), 7);
    }

    #[test]
    fn header_validation() {
        let header = LasHeader {
            version_minor: 2,
            ..sample_header()
        };
        assert!(matches!(
            header.validate(),
            Err(ReadMetadataError::UnsupportedVersion(1, 2))
        ));

        let header = LasHeader {
            point_data_format: 3,
            ..sample_header()
        };
        assert!(matches!(
            header.validate(),
            Err(ReadMetadataError::UnsupportedPointFormat(3))
        ));

        let header = LasHeader {
            point_record_length: 20,
            ..sample_header()
        };
        assert!(matches!(
            header.validate(),
            Err(ReadMetadataError::InvalidRecordLength { format: 7, length: 20 })
        ));
    }

    #[test]
    fn missing_magic_is_rejected() {
        let mut bytes = to_bytes!(sample_header());
        bytes[0] = b'X';
        let result: binrw::BinResult<LasHeader> = Cursor::new(bytes.as_slice()).read_le();
        assert!(result.is_err());
    }

    #[test]
    fn copc_info_validation() {
        let info = CopcInfo {
            halfsize: 10.0,
            spacing: 1.0,
            root_hier_offset: 1000,
            root_hier_size: 64,
            ..Default::default()
        };
        assert!(info.validate().is_ok());
        assert_eq!(info.root_bounds(), Aabb::from_cube(DVec3::ZERO, 10.0));

        for broken in [
            CopcInfo { halfsize: 0.0, ..info },
            CopcInfo { spacing: f64::NAN, ..info },
            CopcInfo { root_hier_size: 0, ..info },
            CopcInfo { root_hier_size: 33, ..info },
        ] {
            assert!(matches!(
                broken.validate(),
                Err(ReadMetadataError::InvalidCopcInfo(_))
            ));
        }
    }

    #[test]
    fn copc_info_display() {
        let text = CopcInfo {
            spacing: 36.5,
            ..Default::default()
        }
        .to_string();
        assert!(text.starts_with("CopcInfo:"));
        assert!(text.contains("\tspacing: 36.5"));
    }

    #[test]
    fn extra_bytes_layout() {
        let mut data = to_bytes!(ExtraBytesField::new("first", 0, 3));
        data.extend(to_bytes!(ExtraBytesField::new("second", 10, 0)));
        data.extend(to_bytes!(ExtraBytesField::new("third", 23, 0)));

        let vlr = ExtraBytesVlr::parse(&data).unwrap();
        assert_eq!(vlr.fields.len(), 3);
        assert_eq!(vlr.fields[1].name(), "second");
        assert_eq!(vlr.byte_size(), 3 + 8 + 6);
        assert_eq!(vlr.position_of("first"), Some(0));
        assert_eq!(vlr.position_of("third"), Some(11));
        assert_eq!(vlr.position_of("missing"), None);
    }

    #[test]
    fn extra_bytes_errors() {
        assert!(matches!(
            ExtraBytesVlr::parse(&[0; 100]),
            Err(ReadMetadataError::InvalidExtraBytes(_))
        ));
        let data = to_bytes!(ExtraBytesField::new("bad", 31, 0));
        assert!(matches!(
            ExtraBytesVlr::parse(&data),
            Err(ReadMetadataError::InvalidExtraBytes(_))
        ));
    }

    #[test]
    fn fixed_strings() {
        assert_eq!(fixed_str(b"copc\0\0\0"), "copc");
        assert_eq!(fixed_str(b"full"), "full");
        let bytes: [u8; 4] = to_fixed("toolong");
        assert_eq!(&bytes, b"tool");
        let vlr = VlrHeader::new(LAZ_USER_ID, LAZ_RECORD_ID, 10, "");
        assert_eq!(vlr.user_id(), LAZ_USER_ID);
    }
}
