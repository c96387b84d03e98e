//! Static byte layouts of the KLM and POD header/data records.
//!
//! Everything here is plain data: offsets, widths, scale factors and code
//! tables. Record sizes depend on the product dimension and on the packing
//! width of the video block, so layouts are assembled per combination and
//! then shared read-only through an `Arc`.

use crate::io::codes::{self, CodeTable};
use crate::types::{AvhrrError, AvhrrResult, FormatFamily, PixelPacking, ProductDimension};
use serde::Serialize;

/// Length of the ARS order header that may precede KLM files
pub const KLM_ARCHIVE_HEADER_LENGTH: usize = 512;

/// Length of the TBM header that may precede POD files
pub const POD_ARCHIVE_HEADER_LENGTH: usize = 122;

/// Interleaved channels per pixel in the video block
pub const CHANNELS_PER_PIXEL: usize = 5;

/// Tie points (angles and Earth locations) stored per scan line
pub const TIE_POINTS_PER_LINE: usize = 51;

const KLM_VIDEO_OFFSET: usize = 1264;
const POD_VIDEO_OFFSET: usize = 448;

// CLAVR fields follow the video block at fixed distances
const KLM_CLAVR_STATUS_GAP: usize = 56;
const KLM_CLOUD_MASK_GAP: usize = 64;

/// Field names shared by the detector, store and decoders
pub mod field {
    // KLM header
    pub const CREATION_SITE: &str = "data_set_creation_site";
    pub const FORMAT_VERSION: &str = "format_version";
    pub const FORMAT_VERSION_YEAR: &str = "format_version_year";
    pub const FORMAT_VERSION_DAY: &str = "format_version_day";
    pub const LOGICAL_RECORD_LENGTH: &str = "logical_record_length";
    pub const BLOCK_SIZE: &str = "block_size";
    pub const HEADER_RECORD_COUNT: &str = "header_record_count";
    pub const DATA_SET_NAME: &str = "data_set_name";
    pub const PROCESSING_BLOCK_ID: &str = "processing_block_id";
    pub const SPACECRAFT_ID: &str = "spacecraft_id";
    pub const INSTRUMENT_ID: &str = "instrument_id";
    pub const DATA_TYPE: &str = "data_type";
    pub const START_YEAR: &str = "start_year";
    pub const START_DAY_OF_YEAR: &str = "start_day_of_year";
    pub const START_TIME_MS: &str = "start_time_ms";
    pub const END_YEAR: &str = "end_year";
    pub const END_DAY_OF_YEAR: &str = "end_day_of_year";
    pub const END_TIME_MS: &str = "end_time_ms";
    pub const DATA_RECORD_COUNT: &str = "data_record_count";
    pub const CALIBRATED_LINE_COUNT: &str = "calibrated_scan_line_count";
    pub const MISSING_LINE_COUNT: &str = "missing_scan_line_count";
    pub const DATA_GAP_COUNT: &str = "data_gap_count";
    pub const CLAVR_STATUS: &str = "clavr_status";
    pub const PRIMARY_CALIBRATION_ALGORITHM: &str = "primary_calibration_algorithm";
    pub const EARTH_SUN_DISTANCE_RATIO: &str = "earth_sun_distance_ratio";
    pub const REFERENCE_ELLIPSOID: &str = "reference_ellipsoid";
    pub const SOLAR_IRRADIANCE: [&str; 3] = [
        "ch1_solar_irradiance",
        "ch2_solar_irradiance",
        "ch3a_solar_irradiance",
    ];
    pub const EQUIVALENT_WIDTH: [&str; 3] = [
        "ch1_equivalent_width",
        "ch2_equivalent_width",
        "ch3a_equivalent_width",
    ];
    pub const PRELAUNCH_GAIN: [&str; 3] = [
        "ch1_prelaunch_gain",
        "ch2_prelaunch_gain",
        "ch3a_prelaunch_gain",
    ];
    pub const CENTRAL_WAVENUMBER: [&str; 3] = [
        "ch3b_central_wavenumber",
        "ch4_central_wavenumber",
        "ch5_central_wavenumber",
    ];
    pub const CONSTANT_1: [&str; 3] = ["ch3b_constant_1", "ch4_constant_1", "ch5_constant_1"];
    pub const CONSTANT_2: [&str; 3] = ["ch3b_constant_2", "ch4_constant_2", "ch5_constant_2"];

    // POD header
    pub const START_TIME_CODE: &str = "start_time_code";
    pub const END_TIME_CODE: &str = "end_time_code";
    pub const SCAN_COUNT: &str = "scan_count";
    pub const RAMP_CALIBRATION: &str = "ramp_calibration_indicator";
    pub const CALIBRATION_PARAMETER_ID: &str = "calibration_parameter_id";

    // KLM and POD data records
    pub const SCAN_LINE_NUMBER: &str = "scan_line_number";
    pub const SCAN_LINE_YEAR: &str = "scan_line_year";
    pub const SCAN_LINE_DAY_OF_YEAR: &str = "scan_line_day_of_year";
    pub const CLOCK_DRIFT_DELTA: &str = "clock_drift_delta";
    pub const SCAN_LINE_TIME_MS: &str = "scan_line_time_ms";
    pub const SCAN_LINE_BIT_FIELD: &str = "scan_line_bit_field";
    pub const QUALITY_INDICATOR: &str = "quality_indicator";
    pub const SCAN_LINE_QUALITY: &str = "scan_line_quality_flags";
    pub const IR_OPERATIONAL_CAL: [&str; 3] = [
        "ch3b_ir_operational_cal",
        "ch4_ir_operational_cal",
        "ch5_ir_operational_cal",
    ];
    pub const NAVIGATION_STATUS: &str = "navigation_status";
    pub const SPACECRAFT_ALTITUDE: &str = "spacecraft_altitude";
    pub const ANGULAR_RELATIONSHIPS: &str = "angular_relationships";
    pub const EARTH_LOCATION: &str = "earth_location";
    pub const VIDEO_DATA: &str = "video_data";
    pub const CLAVR_LINE_STATUS: &str = "clavr_line_status";
    pub const CLOUD_MASK: &str = "cloud_mask";
    pub const TIME_CODE: &str = "time_code";
    pub const CALIBRATION_COEFFICIENTS: &str = "calibration_coefficients";
    pub const EARTH_LOCATED_POINTS: &str = "earth_located_point_count";
    pub const SOLAR_ZENITH_ANGLES: &str = "solar_zenith_angles";

    // TBM archive header
    pub const TBM_DATA_SET_NAME: &str = "tbm_data_set_name";
    pub const TBM_COPY_FLAG: &str = "tbm_copy_flag";
    pub const TBM_START_HOUR: &str = "tbm_start_hour";
    pub const TBM_START_MINUTE: &str = "tbm_start_minute";
    pub const TBM_WORD_SIZE: &str = "tbm_word_size";
}

/// Semantic type of a field; all multi-byte values are big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    U8,
    U16,
    I16,
    U32,
    I32,
    Ascii(usize),
    Bytes(usize),
    U8Array(usize),
    I16Array(usize),
    I32Array(usize),
}

impl FieldType {
    pub fn byte_width(&self) -> usize {
        match *self {
            FieldType::U8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 => 4,
            FieldType::Ascii(n) | FieldType::Bytes(n) | FieldType::U8Array(n) => n,
            FieldType::I16Array(n) => n * 2,
            FieldType::I32Array(n) => n * 4,
        }
    }
}

/// One named field of a record
#[derive(Debug, Clone, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldType,
    /// Multiply the stored integer by this to get the physical value
    pub scale: Option<f64>,
    #[serde(skip)]
    pub codes: Option<CodeTable>,
}

impl FieldDef {
    fn new(name: &'static str, offset: usize, kind: FieldType) -> Self {
        Self { name, offset, kind, scale: None, codes: None }
    }

    fn scaled(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    fn coded(mut self, codes: CodeTable) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn byte_width(&self) -> usize {
        self.kind.byte_width()
    }

    pub fn end(&self) -> usize {
        self.offset + self.byte_width()
    }

    /// The field's bytes inside an in-memory record, if the record is long enough
    pub fn slice<'a>(&self, record: &'a [u8]) -> Option<&'a [u8]> {
        record.get(self.offset..self.end())
    }
}

/// Name-indexed set of fields for one record type
#[derive(Debug, Clone, Serialize)]
pub struct FieldTable {
    fields: Vec<FieldDef>,
}

impl FieldTable {
    fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> AvhrrResult<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| AvhrrError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    /// Smallest record length that holds every field
    pub fn extent(&self) -> usize {
        self.fields.iter().map(FieldDef::end).max().unwrap_or(0)
    }
}

/// Geometry of one product dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DimensionInfo {
    pub dimension: ProductDimension,
    /// Pixels per scan line, identical for raw and product rasters
    pub pixels: usize,
    pub cloud_mask_bytes: usize,
    /// Pixel index of the first tie point
    pub tie_point_offset_x: usize,
    pub tie_point_step_x: usize,
    pub tie_point_grid_width: usize,
    /// Scan lines between tie-point rows
    pub tie_point_step_y: usize,
}

impl DimensionInfo {
    pub fn of(dimension: ProductDimension) -> Self {
        match dimension {
            ProductDimension::Hrpt => Self {
                dimension,
                pixels: 2048,
                cloud_mask_bytes: 512,
                tie_point_offset_x: 24,
                tie_point_step_x: 40,
                tie_point_grid_width: TIE_POINTS_PER_LINE,
                tie_point_step_y: 40,
            },
            ProductDimension::Gac => Self {
                dimension,
                pixels: 409,
                cloud_mask_bytes: 104,
                tie_point_offset_x: 4,
                tie_point_step_x: 8,
                tie_point_grid_width: TIE_POINTS_PER_LINE,
                tie_point_step_y: 8,
            },
        }
    }

    /// Number of interleaved counts in one video block
    pub fn video_samples(&self) -> usize {
        self.pixels * CHANNELS_PER_PIXEL
    }
}

/// Immutable description of one binary layout
#[derive(Debug, Clone, Serialize)]
pub struct FileLayout {
    pub family: FormatFamily,
    pub packing: PixelPacking,
    pub dimension: DimensionInfo,
    /// Length of one data record
    pub record_length: usize,
    /// Length of one header record (several may make up the header)
    pub header_record_length: usize,
    pub header: FieldTable,
    pub record: FieldTable,
}

impl FileLayout {
    pub fn new(family: FormatFamily, dimension: ProductDimension, packing: PixelPacking) -> Self {
        match family {
            FormatFamily::Klm => klm_layout(dimension, packing),
            FormatFamily::Pod => pod_layout(dimension, packing),
        }
    }

    pub fn has_cloud_mask(&self) -> bool {
        self.record.contains(field::CLOUD_MASK)
    }
}

/// KLM block size for every known (dimension, packing) combination
pub fn klm_block_size(dimension: ProductDimension, packing: PixelPacking) -> usize {
    match (dimension, packing) {
        (ProductDimension::Hrpt, PixelPacking::Bits8) => 12288,
        (ProductDimension::Hrpt, PixelPacking::Bits10) => 15872,
        (ProductDimension::Hrpt, PixelPacking::Bits16) => 22528,
        (ProductDimension::Gac, PixelPacking::Bits8) => 3584,
        (ProductDimension::Gac, PixelPacking::Bits10) => 4608,
        (ProductDimension::Gac, PixelPacking::Bits16) => 5632,
    }
}

/// Reverse lookup of a probed KLM block size
pub fn klm_variant_for_block_size(block_size: usize) -> Option<(ProductDimension, PixelPacking)> {
    ProductDimension::ALL
        .iter()
        .flat_map(|&d| PixelPacking::ALL.iter().map(move |&p| (d, p)))
        .find(|&(d, p)| klm_block_size(d, p) == block_size)
}

/// POD data record length for every known (dimension, packing) combination
pub fn pod_record_length(dimension: ProductDimension, packing: PixelPacking) -> usize {
    match (dimension, packing) {
        (ProductDimension::Hrpt, PixelPacking::Bits8) => 10688,
        (ProductDimension::Hrpt, PixelPacking::Bits10) => 14800,
        (ProductDimension::Hrpt, PixelPacking::Bits16) => 20928,
        (ProductDimension::Gac, PixelPacking::Bits8) => 2496,
        (ProductDimension::Gac, PixelPacking::Bits10) => 3220,
        (ProductDimension::Gac, PixelPacking::Bits16) => 4540,
    }
}

fn klm_layout(dimension: ProductDimension, packing: PixelPacking) -> FileLayout {
    use FieldType::*;

    let dim = DimensionInfo::of(dimension);
    let block_size = klm_block_size(dimension, packing);
    let video_len = packing.video_bytes(dim.video_samples());
    let video_end = KLM_VIDEO_OFFSET + video_len;

    let mut header = vec![
        FieldDef::new(field::CREATION_SITE, 0, Ascii(3)).coded(codes::CREATION_SITES),
        FieldDef::new(field::FORMAT_VERSION, 4, U16),
        FieldDef::new(field::FORMAT_VERSION_YEAR, 6, U16),
        FieldDef::new(field::FORMAT_VERSION_DAY, 8, U16),
        FieldDef::new(field::LOGICAL_RECORD_LENGTH, 10, U16),
        FieldDef::new(field::BLOCK_SIZE, 12, U16),
        FieldDef::new(field::HEADER_RECORD_COUNT, 14, U16),
        FieldDef::new(field::DATA_SET_NAME, 22, Ascii(42)),
        FieldDef::new(field::PROCESSING_BLOCK_ID, 64, Ascii(8)),
        FieldDef::new(field::SPACECRAFT_ID, 72, U16).coded(codes::KLM_SPACECRAFT),
        FieldDef::new(field::INSTRUMENT_ID, 74, U16),
        FieldDef::new(field::DATA_TYPE, 76, U16).coded(codes::KLM_DATA_TYPES),
        FieldDef::new(field::START_YEAR, 84, U16),
        FieldDef::new(field::START_DAY_OF_YEAR, 86, U16),
        FieldDef::new(field::START_TIME_MS, 88, U32),
        FieldDef::new(field::END_YEAR, 96, U16),
        FieldDef::new(field::END_DAY_OF_YEAR, 98, U16),
        FieldDef::new(field::END_TIME_MS, 100, U32),
        FieldDef::new(field::DATA_RECORD_COUNT, 128, U16),
        FieldDef::new(field::CALIBRATED_LINE_COUNT, 130, U16),
        FieldDef::new(field::MISSING_LINE_COUNT, 132, U16),
        FieldDef::new(field::DATA_GAP_COUNT, 134, U16),
        FieldDef::new(field::CLAVR_STATUS, 140, U16),
        FieldDef::new(field::RAMP_CALIBRATION, 200, U16),
        FieldDef::new(field::PRIMARY_CALIBRATION_ALGORITHM, 206, U16),
        FieldDef::new(field::EARTH_SUN_DISTANCE_RATIO, 384, U32).scaled(1e-6),
        FieldDef::new(field::REFERENCE_ELLIPSOID, 400, Ascii(8)),
    ];
    for i in 0..3 {
        header.push(FieldDef::new(field::SOLAR_IRRADIANCE[i], 264 + 8 * i, I32).scaled(1e-1));
        header.push(FieldDef::new(field::EQUIVALENT_WIDTH[i], 268 + 8 * i, I32).scaled(1e-3));
        // slope1, intercept1, slope2, intercept2, intersection
        header.push(FieldDef::new(field::PRELAUNCH_GAIN[i], 324 + 20 * i, I32Array(5)));
    }
    // channel 3b carries one decimal less on its wavenumber
    let wavenumber_scales = [1e-2, 1e-3, 1e-3];
    for i in 0..3 {
        let base = 288 + 12 * i;
        header.push(FieldDef::new(field::CENTRAL_WAVENUMBER[i], base, I32).scaled(wavenumber_scales[i]));
        header.push(FieldDef::new(field::CONSTANT_1[i], base + 4, I32).scaled(1e-5));
        header.push(FieldDef::new(field::CONSTANT_2[i], base + 8, I32).scaled(1e-6));
    }

    let mut record = vec![
        FieldDef::new(field::SCAN_LINE_NUMBER, 0, U16),
        FieldDef::new(field::SCAN_LINE_YEAR, 2, U16),
        FieldDef::new(field::SCAN_LINE_DAY_OF_YEAR, 4, U16),
        FieldDef::new(field::CLOCK_DRIFT_DELTA, 6, I16),
        FieldDef::new(field::SCAN_LINE_TIME_MS, 8, U32),
        FieldDef::new(field::SCAN_LINE_BIT_FIELD, 12, U16),
        FieldDef::new(field::QUALITY_INDICATOR, 24, U32),
        FieldDef::new(field::SCAN_LINE_QUALITY, 28, U32),
        FieldDef::new(field::NAVIGATION_STATUS, 312, U32),
        FieldDef::new(field::SPACECRAFT_ALTITUDE, 326, U16).scaled(1e-1),
        FieldDef::new(field::ANGULAR_RELATIONSHIPS, 328, I16Array(3 * TIE_POINTS_PER_LINE)).scaled(1e-2),
        FieldDef::new(field::EARTH_LOCATION, 640, I32Array(2 * TIE_POINTS_PER_LINE)).scaled(1e-4),
        FieldDef::new(field::VIDEO_DATA, KLM_VIDEO_OFFSET, Bytes(video_len)),
        FieldDef::new(field::CLAVR_LINE_STATUS, video_end + KLM_CLAVR_STATUS_GAP, U32),
        FieldDef::new(field::CLOUD_MASK, video_end + KLM_CLOUD_MASK_GAP, Bytes(dim.cloud_mask_bytes)),
    ];
    for i in 0..3 {
        // a0, a1, a2 (version >= 2) or intercept, slope (older versions)
        record.push(FieldDef::new(field::IR_OPERATIONAL_CAL[i], 228 + 12 * i, I32Array(3)));
    }

    FileLayout {
        family: FormatFamily::Klm,
        packing,
        dimension: dim,
        record_length: block_size,
        header_record_length: block_size,
        header: FieldTable::new(header),
        record: FieldTable::new(record),
    }
}

fn pod_layout(dimension: ProductDimension, packing: PixelPacking) -> FileLayout {
    use FieldType::*;

    let dim = DimensionInfo::of(dimension);
    let record_length = pod_record_length(dimension, packing);
    let video_len = packing.video_bytes(dim.video_samples());

    let header = vec![
        FieldDef::new(field::SPACECRAFT_ID, 0, U8).coded(codes::POD_SPACECRAFT),
        FieldDef::new(field::DATA_TYPE, 1, U8),
        FieldDef::new(field::START_TIME_CODE, 2, Bytes(6)),
        FieldDef::new(field::SCAN_COUNT, 8, U16),
        FieldDef::new(field::END_TIME_CODE, 10, Bytes(6)),
        FieldDef::new(field::PROCESSING_BLOCK_ID, 16, Ascii(7)),
        FieldDef::new(field::RAMP_CALIBRATION, 23, U8),
        FieldDef::new(field::DATA_GAP_COUNT, 24, U16),
        FieldDef::new(field::CALIBRATION_PARAMETER_ID, 32, U16),
        FieldDef::new(field::DATA_SET_NAME, 40, Ascii(44)),
    ];

    let record = vec![
        FieldDef::new(field::SCAN_LINE_NUMBER, 0, U16),
        FieldDef::new(field::TIME_CODE, 2, Bytes(6)),
        FieldDef::new(field::QUALITY_INDICATOR, 8, U32),
        // slope and intercept for channels 1..5
        FieldDef::new(field::CALIBRATION_COEFFICIENTS, 12, I32Array(10)),
        FieldDef::new(field::EARTH_LOCATED_POINTS, 52, U8),
        FieldDef::new(field::SOLAR_ZENITH_ANGLES, 53, U8Array(TIE_POINTS_PER_LINE)).scaled(0.5),
        FieldDef::new(field::EARTH_LOCATION, 104, I16Array(2 * TIE_POINTS_PER_LINE)).scaled(1.0 / 128.0),
        FieldDef::new(field::VIDEO_DATA, POD_VIDEO_OFFSET, Bytes(video_len)),
    ];

    FileLayout {
        family: FormatFamily::Pod,
        packing,
        dimension: dim,
        record_length,
        header_record_length: record_length,
        header: FieldTable::new(header),
        record: FieldTable::new(record),
    }
}

/// Fields of the TBM header preceding archived POD files
pub fn tbm_fields() -> FieldTable {
    use FieldType::*;
    FieldTable::new(vec![
        FieldDef::new(field::TBM_DATA_SET_NAME, 30, Ascii(44)),
        FieldDef::new(field::TBM_COPY_FLAG, 74, Ascii(1)),
        FieldDef::new(field::TBM_START_HOUR, 89, Ascii(2)),
        FieldDef::new(field::TBM_START_MINUTE, 91, Ascii(2)),
        FieldDef::new(field::TBM_WORD_SIZE, 117, Ascii(2)),
    ])
}

/// Big-endian u16 at `offset`, `None` past the end of `buf`
pub fn be_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Big-endian u32 at `offset`, `None` past the end of `buf`
pub fn be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// ASCII field with blank and NUL padding removed
pub fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

/// Year and day-of-year range accepted when probing for data records
pub fn is_plausible_date(year: i32, day_of_year: u32) -> bool {
    year > 1970 && year < 2050 && day_of_year > 0 && day_of_year < 367
}

/// Decode a 6-byte POD time code into (year, day of year, millisecond of day).
///
/// The first word packs a 7-bit two-digit year above a 9-bit day of year;
/// the low 27 bits of the following long word hold the milliseconds.
pub fn pod_time_code(code: &[u8]) -> Option<(i32, u32, u32)> {
    let word = be_u16(code, 0)?;
    let millis = be_u32(code, 2)? & 0x07FF_FFFF;
    let two_digit = i32::from(word >> 9);
    let year = if two_digit < 70 { 2000 + two_digit } else { 1900 + two_digit };
    Some((year, u32::from(word & 0x01FF), millis))
}
