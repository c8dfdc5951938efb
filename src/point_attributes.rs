/// Fixed layout of one LAS point data record format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointFormat {
    pub id: u8,
    pub base_length: u16,
    pub has_rgb: bool,
    pub has_nir: bool,
}

macro_rules! create_point_format {
    ($const_name:ident, $id:expr, $length:expr, $rgb:expr, $nir:expr) => {
        pub static $const_name: PointFormat = PointFormat {
            id: $id,
            base_length: $length,
            has_rgb: $rgb,
            has_nir: $nir,
        };
    };
}

// COPC only allows the LAS 1.4 formats 6, 7 and 8.
create_point_format!(POINT_FORMAT_6, 6, 30, false, false);
create_point_format!(POINT_FORMAT_7, 7, 36, true, false);
create_point_format!(POINT_FORMAT_8, 8, 38, true, true);

pub const POINT_FORMATS: &[&PointFormat] = &[&POINT_FORMAT_6, &POINT_FORMAT_7, &POINT_FORMAT_8];

pub fn point_format(id: u8) -> Option<&'static PointFormat> {
    POINT_FORMATS.iter().copied().find(|format| format.id == id)
}

/// One entry of the extra-bytes data type table.
#[derive(Debug, Clone)]
pub struct ExtraBytesType {
    pub ordinal: u8,
    pub name: &'static str,
    pub size: u8,
}

macro_rules! create_data_type {
    ($const_name:ident, $ord:expr, $name:expr, $size:expr) => {
        pub static $const_name: ExtraBytesType = ExtraBytesType {
            ordinal: $ord,
            name: $name,
            size: $size,
        };
    };
}

create_data_type!(DATA_TYPE_UNDOCUMENTED, 0, "undocumented", 0);
create_data_type!(DATA_TYPE_UINT8, 1, "uint8", 1);
create_data_type!(DATA_TYPE_INT8, 2, "int8", 1);
create_data_type!(DATA_TYPE_UINT16, 3, "uint16", 2);
create_data_type!(DATA_TYPE_INT16, 4, "int16", 2);
create_data_type!(DATA_TYPE_UINT32, 5, "uint32", 4);
create_data_type!(DATA_TYPE_INT32, 6, "int32", 4);
create_data_type!(DATA_TYPE_UINT64, 7, "uint64", 8);
create_data_type!(DATA_TYPE_INT64, 8, "int64", 8);
create_data_type!(DATA_TYPE_FLOAT, 9, "float", 4);
create_data_type!(DATA_TYPE_DOUBLE, 10, "double", 8);
create_data_type!(DATA_TYPE_UINT8_2, 11, "uint8[2]", 2);
create_data_type!(DATA_TYPE_INT8_2, 12, "int8[2]", 2);
create_data_type!(DATA_TYPE_UINT16_2, 13, "uint16[2]", 4);
create_data_type!(DATA_TYPE_INT16_2, 14, "int16[2]", 4);
create_data_type!(DATA_TYPE_UINT32_2, 15, "uint32[2]", 8);
create_data_type!(DATA_TYPE_INT32_2, 16, "int32[2]", 8);
create_data_type!(DATA_TYPE_UINT64_2, 17, "uint64[2]", 16);
create_data_type!(DATA_TYPE_INT64_2, 18, "int64[2]", 16);
create_data_type!(DATA_TYPE_FLOAT_2, 19, "float[2]", 8);
create_data_type!(DATA_TYPE_DOUBLE_2, 20, "double[2]", 16);
create_data_type!(DATA_TYPE_UINT8_3, 21, "uint8[3]", 3);
create_data_type!(DATA_TYPE_INT8_3, 22, "int8[3]", 3);
create_data_type!(DATA_TYPE_UINT16_3, 23, "uint16[3]", 6);
create_data_type!(DATA_TYPE_INT16_3, 24, "int16[3]", 6);
create_data_type!(DATA_TYPE_UINT32_3, 25, "uint32[3]", 12);
create_data_type!(DATA_TYPE_INT32_3, 26, "int32[3]", 12);
create_data_type!(DATA_TYPE_UINT64_3, 27, "uint64[3]", 24);
create_data_type!(DATA_TYPE_INT64_3, 28, "int64[3]", 24);
create_data_type!(DATA_TYPE_FLOAT_3, 29, "float[3]", 12);
create_data_type!(DATA_TYPE_DOUBLE_3, 30, "double[3]", 24);

pub const EXTRA_BYTES_TYPES: &[&ExtraBytesType] = &[
    &DATA_TYPE_UNDOCUMENTED,
    &DATA_TYPE_UINT8,
    &DATA_TYPE_INT8,
    &DATA_TYPE_UINT16,
    &DATA_TYPE_INT16,
    &DATA_TYPE_UINT32,
    &DATA_TYPE_INT32,
    &DATA_TYPE_UINT64,
    &DATA_TYPE_INT64,
    &DATA_TYPE_FLOAT,
    &DATA_TYPE_DOUBLE,
    &DATA_TYPE_UINT8_2,
    &DATA_TYPE_INT8_2,
    &DATA_TYPE_UINT16_2,
    &DATA_TYPE_INT16_2,
    &DATA_TYPE_UINT32_2,
    &DATA_TYPE_INT32_2,
    &DATA_TYPE_UINT64_2,
    &DATA_TYPE_INT64_2,
    &DATA_TYPE_FLOAT_2,
    &DATA_TYPE_DOUBLE_2,
    &DATA_TYPE_UINT8_3,
    &DATA_TYPE_INT8_3,
    &DATA_TYPE_UINT16_3,
    &DATA_TYPE_INT16_3,
    &DATA_TYPE_UINT32_3,
    &DATA_TYPE_INT32_3,
    &DATA_TYPE_UINT64_3,
    &DATA_TYPE_INT64_3,
    &DATA_TYPE_FLOAT_3,
    &DATA_TYPE_DOUBLE_3,
];

pub fn extra_bytes_type(ordinal: u8) -> Option<&'static ExtraBytesType> {
    EXTRA_BYTES_TYPES.get(ordinal as usize).copied()
}
