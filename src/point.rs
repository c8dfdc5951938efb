use crate::metadata::LasHeader;
use crate::point_attributes::PointFormat;
use byteorder::{ByteOrder, LittleEndian};
use glam::{DVec3, U16Vec3};
use serde::{Deserialize, Serialize};

/// One decoded LAS 1.4 point (formats 6, 7 and 8).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Scaled and offset coordinates.
    pub position: DVec3,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub classification_flags: u8,
    pub scanner_channel: u8,
    pub scan_direction_flag: bool,
    pub edge_of_flight_line: bool,
    pub classification: u8,
    pub user_data: u8,
    /// In 0.006 degree increments.
    pub scan_angle: i16,
    pub point_source_id: u16,
    pub gps_time: f64,
    pub rgb: Option<U16Vec3>,
    pub nir: Option<u16>,
    pub extra_bytes: Vec<u8>,
}

/// Decodes raw point records for one point format.
#[derive(Clone, Debug)]
pub struct PointDecoder {
    format: &'static PointFormat,
    record_length: usize,
    scale: DVec3,
    offset: DVec3,
}

impl PointDecoder {
    /// `None` when the header's format is not a COPC format or its records
    /// are too short for it.
    pub fn new(header: &LasHeader) -> Option<Self> {
        let format = header.point_format()?;
        let record_length = header.point_record_length as usize;
        if record_length < format.base_length as usize {
            return None;
        }
        Some(Self {
            format,
            record_length,
            scale: header.scale(),
            offset: header.offset(),
        })
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn format(&self) -> &'static PointFormat {
        self.format
    }

    /// Decodes every complete record in `data`, in order.
    pub fn decode(&self, data: &[u8]) -> Vec<Point> {
        data.chunks_exact(self.record_length)
            .map(|record| self.decode_record(record))
            .collect()
    }

    pub fn decode_record(&self, record: &[u8]) -> Point {
        let raw = DVec3::new(
            LittleEndian::read_i32(&record[0..4]) as f64,
            LittleEndian::read_i32(&record[4..8]) as f64,
            LittleEndian::read_i32(&record[8..12]) as f64,
        );
        let returns = record[14];
        let flags = record[15];

        let mut point = Point {
            position: raw * self.scale + self.offset,
            intensity: LittleEndian::read_u16(&record[12..14]),
            return_number: returns & 0x0F,
            number_of_returns: returns >> 4,
            classification_flags: flags & 0x0F,
            scanner_channel: (flags >> 4) & 0x03,
            scan_direction_flag: flags & 0x40 != 0,
            edge_of_flight_line: flags & 0x80 != 0,
            classification: record[16],
            user_data: record[17],
            scan_angle: LittleEndian::read_i16(&record[18..20]),
            point_source_id: LittleEndian::read_u16(&record[20..22]),
            gps_time: LittleEndian::read_f64(&record[22..30]),
            ..Default::default()
        };

        if self.format.has_rgb {
            point.rgb = Some(U16Vec3::new(
                LittleEndian::read_u16(&record[30..32]),
                LittleEndian::read_u16(&record[32..34]),
                LittleEndian::read_u16(&record[34..36]),
            ));
        }
        if self.format.has_nir {
            point.nir = Some(LittleEndian::read_u16(&record[36..38]));
        }

        point.extra_bytes = record[self.format.base_length as usize..].to_vec();
        point
    }
}
