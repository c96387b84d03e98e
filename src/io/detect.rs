//! Format auto-detection.
//!
//! Each detector inspects a handful of fixed offsets and answers with a
//! `DetectedFormat` or a detection failure. Detection failures are ordinary
//! negative answers: the dispatcher moves on to the next detector. Any
//! other error means the file was recognised but cannot be decoded, and is
//! returned as-is.

use crate::io::codes;
use crate::io::layout::{
    self, be_u16, field, klm_variant_for_block_size, pod_record_length, FileLayout,
    KLM_ARCHIVE_HEADER_LENGTH, POD_ARCHIVE_HEADER_LENGTH,
};
use crate::io::source::ByteSource;
use crate::types::{AvhrrError, AvhrrResult, FormatFamily, PixelPacking, ProductDimension};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dataset names of POD products, e.g. `NSS.HRPT.NJ.D95123.S1200.E1212...`
const DATASET_NAME_PATTERN: &str = r"^[A-Z]{3}\.(HRPT|LHRR|GHRR)\.";

static DATASET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(DATASET_NAME_PATTERN).expect("dataset name pattern is a valid regex"));

/// Largest KLM block size; bounds the probe window
const MAX_KLM_BLOCK_SIZE: usize = 22528;

/// KLM format versions this decoder understands
pub const SUPPORTED_KLM_VERSIONS: std::ops::RangeInclusive<u16> = 1..=5;

/// Reader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// First byte (relative to the header) probed for the KLM block size
    pub probe_start_offset: usize,
    /// Header record counts tried when locating the first POD data record
    pub pod_header_record_counts: Vec<usize>,
    /// Accept files whose length is not a whole number of records
    pub allow_trailing_bytes: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            probe_start_offset: 500,
            pod_header_record_counts: vec![1, 2],
            allow_trailing_bytes: true,
        }
    }
}

/// Result of format detection, fixed for the lifetime of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedFormat {
    pub family: FormatFamily,
    pub has_archive_prefix: bool,
    pub prefix_length: usize,
    pub packing: PixelPacking,
    pub dimension: ProductDimension,
    pub header_length: usize,
    pub record_length: usize,
    pub record_count: usize,
}

impl DetectedFormat {
    /// Byte offset of the header record
    pub fn header_offset(&self) -> u64 {
        self.prefix_length as u64
    }

    /// Byte offset of data record `index`
    pub fn line_offset(&self, index: usize) -> u64 {
        (self.prefix_length + self.header_length) as u64 + (index as u64) * self.record_length as u64
    }

    /// Bytes covered by prefix, header and all data records
    pub fn covered_length(&self) -> u64 {
        self.line_offset(self.record_count)
    }

    pub fn layout(&self) -> FileLayout {
        FileLayout::new(self.family, self.dimension, self.packing)
    }
}

type Detector = fn(&dyn ByteSource, &ReaderConfig) -> AvhrrResult<DetectedFormat>;

/// Detect the layout of `source` with the default configuration
pub fn detect(source: &dyn ByteSource) -> AvhrrResult<DetectedFormat> {
    detect_with_config(source, &ReaderConfig::default())
}

/// Try every known layout in order and return the first match
pub fn detect_with_config(source: &dyn ByteSource, config: &ReaderConfig) -> AvhrrResult<DetectedFormat> {
    let detectors: [(FormatFamily, Detector); 2] =
        [(FormatFamily::Klm, detect_klm), (FormatFamily::Pod, detect_pod)];

    let mut reasons = Vec::new();
    for (family, detector) in detectors {
        match detector(source, config) {
            Ok(format) => {
                log::info!(
                    "Detected {} {:?} {}-bit file: {} scan lines of {} bytes (prefix {}, header {})",
                    family,
                    format.dimension,
                    format.packing.bits(),
                    format.record_count,
                    format.record_length,
                    format.prefix_length,
                    format.header_length
                );
                return Ok(format);
            }
            Err(e) if e.is_detection_failure() => {
                log::debug!("{} detector declined: {}", family, e);
                reasons.push(format!("{}: {}", family, e));
            }
            Err(e) => return Err(e),
        }
    }

    Err(AvhrrError::Detection(reasons.join("; ")))
}

/// KLM detector: creation site code, probed block size, version checks
pub fn detect_klm(source: &dyn ByteSource, config: &ReaderConfig) -> AvhrrResult<DetectedFormat> {
    let window = KLM_ARCHIVE_HEADER_LENGTH + MAX_KLM_BLOCK_SIZE + 8;
    let buf = source.read_prefix(0, window)?;

    let prefix_length = if has_site_code(&buf, 0) {
        0
    } else if has_site_code(&buf, KLM_ARCHIVE_HEADER_LENGTH) {
        KLM_ARCHIVE_HEADER_LENGTH
    } else {
        return Err(AvhrrError::Detection(format!(
            "no dataset creation site code at offset 0 or {}",
            KLM_ARCHIVE_HEADER_LENGTH
        )));
    };
    let header = &buf[prefix_length..];

    let block_size = probe_block_size(header, config.probe_start_offset).ok_or_else(|| {
        AvhrrError::Detection("no plausible first data record in the probe window".to_string())
    })?;
    let (dimension, packing) = klm_variant_for_block_size(block_size).ok_or_else(|| {
        AvhrrError::Detection(format!("probed block size {} is not a known KLM block size", block_size))
    })?;
    log::debug!("KLM block size {} -> {:?} {}-bit", block_size, dimension, packing.bits());

    let layout = FileLayout::new(FormatFamily::Klm, dimension, packing);
    let version_offset = layout.header.get(field::FORMAT_VERSION)?.offset;
    let version = be_u16(header, version_offset).unwrap_or(0);
    if !SUPPORTED_KLM_VERSIONS.contains(&version) {
        return Err(AvhrrError::UnsupportedVariant { field: "format version", value: i64::from(version) });
    }

    let data_type_offset = layout.header.get(field::DATA_TYPE)?.offset;
    let data_type = be_u16(header, data_type_offset).unwrap_or(0);
    let declared = match data_type {
        1 | 3 => ProductDimension::Hrpt,
        2 => ProductDimension::Gac,
        other => {
            return Err(AvhrrError::UnsupportedVariant { field: "data type code", value: i64::from(other) })
        }
    };
    if declared != dimension {
        return Err(AvhrrError::CorruptRecord {
            offset: (prefix_length + data_type_offset) as u64,
            reason: format!(
                "data type {} does not match the {:?} block size {}",
                codes::lookup(codes::KLM_DATA_TYPES, i64::from(data_type)),
                dimension,
                block_size
            ),
        });
    }

    let record_count = count_records(source.len(), prefix_length, block_size, block_size, config)?;

    Ok(DetectedFormat {
        family: FormatFamily::Klm,
        has_archive_prefix: prefix_length > 0,
        prefix_length,
        packing,
        dimension,
        header_length: block_size,
        record_length: block_size,
        record_count,
    })
}

/// POD detector: dataset name in the header or a complete TBM header
pub fn detect_pod(source: &dyn ByteSource, config: &ReaderConfig) -> AvhrrResult<DetectedFormat> {
    let window = POD_ARCHIVE_HEADER_LENGTH + 128;
    let buf = source.read_prefix(0, window)?;

    // header name field is identical across POD layouts
    let name_field = FileLayout::new(FormatFamily::Pod, ProductDimension::Hrpt, PixelPacking::Bits10)
        .header
        .get(field::DATA_SET_NAME)?
        .clone();

    let (prefix_length, dimension, packing) =
        match name_field.slice(&buf).and_then(|b| dataset_dimension(&layout::ascii(b))) {
            Some(dimension) => (0, dimension, PixelPacking::Bits10),
            None => match validate_tbm(&buf) {
                Ok((dimension, packing)) => (POD_ARCHIVE_HEADER_LENGTH, dimension, packing),
                Err(reason) => return Err(AvhrrError::Detection(reason)),
            },
        };

    let record_length = pod_record_length(dimension, packing);
    let header_length = probe_pod_header_length(source, prefix_length, record_length, config)?;
    let record_count = count_records(source.len(), prefix_length, header_length, record_length, config)?;

    Ok(DetectedFormat {
        family: FormatFamily::Pod,
        has_archive_prefix: prefix_length > 0,
        prefix_length,
        packing,
        dimension,
        header_length,
        record_length,
        record_count,
    })
}

fn has_site_code(buf: &[u8], offset: usize) -> bool {
    buf.get(offset..offset + 3)
        .and_then(codes::creation_site_index)
        .is_some()
}

/// Offset of the first non-zero 16-bit cell followed by a plausible date
fn probe_block_size(header: &[u8], start: usize) -> Option<usize> {
    let mut offset = start + (start & 1);
    while offset + 6 <= header.len() {
        if be_u16(header, offset)? != 0 {
            let year = i32::from(be_u16(header, offset + 2)?);
            let day = u32::from(be_u16(header, offset + 4)?);
            if layout::is_plausible_date(year, day) {
                return Some(offset);
            }
        }
        offset += 2;
    }
    None
}

/// Product dimension encoded in a POD dataset name
fn dataset_dimension(name: &str) -> Option<ProductDimension> {
    let caps = DATASET_NAME.captures(name)?;
    match &caps[1] {
        "HRPT" | "LHRR" => Some(ProductDimension::Hrpt),
        "GHRR" => Some(ProductDimension::Gac),
        _ => None,
    }
}

/// Every TBM sub-field must be valid on its own, not just the dataset name
fn validate_tbm(buf: &[u8]) -> Result<(ProductDimension, PixelPacking), String> {
    let tbm = layout::tbm_fields();
    let text = |name: &str| -> Result<String, String> {
        let def = tbm.get(name).map_err(|e| e.to_string())?;
        def.slice(buf)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| format!("TBM header truncated before {}", name))
    };

    let name = text(field::TBM_DATA_SET_NAME)?;
    let dimension = dataset_dimension(name.trim())
        .ok_or_else(|| format!("no POD dataset name in header or TBM header (found {:?})", name.trim()))?;

    let copy = text(field::TBM_COPY_FLAG)?;
    if copy != "T" && copy != "S" {
        return Err(format!("TBM total/selective copy flag {:?} is neither T nor S", copy));
    }

    let hour = text(field::TBM_START_HOUR)?;
    if !blank_or_number_below(&hour, 24) {
        return Err(format!("TBM start hour {:?} is invalid", hour));
    }
    let minute = text(field::TBM_START_MINUTE)?;
    if !blank_or_number_below(&minute, 60) {
        return Err(format!("TBM start minute {:?} is invalid", minute));
    }

    let word_size = text(field::TBM_WORD_SIZE)?;
    let packing = match word_size.trim_matches(|c: char| c == ' ' || c == '\0') {
        "" | "10" => PixelPacking::Bits10,
        "8" | "08" => PixelPacking::Bits8,
        "16" => PixelPacking::Bits16,
        other => return Err(format!("TBM sensor word size {:?} is invalid", other)),
    };

    Ok((dimension, packing))
}

fn blank_or_number_below(value: &str, limit: u32) -> bool {
    let trimmed = value.trim_matches(|c: char| c == ' ' || c == '\0');
    trimmed.is_empty() || trimmed.parse::<u32>().map(|v| v < limit).unwrap_or(false)
}

/// Try each candidate header length until a plausible data record follows it
fn probe_pod_header_length(
    source: &dyn ByteSource,
    prefix_length: usize,
    record_length: usize,
    config: &ReaderConfig,
) -> AvhrrResult<usize> {
    for &records in &config.pod_header_record_counts {
        let header_length = records * record_length;
        let first = source.read_prefix((prefix_length + header_length) as u64, 8)?;
        if first.len() < 8 {
            continue;
        }
        let line_number = be_u16(&first, 0).unwrap_or(0);
        let plausible = layout::pod_time_code(&first[2..8])
            .map(|(year, day, _)| layout::is_plausible_date(year, day))
            .unwrap_or(false);
        log::debug!(
            "POD header candidate {} x {} bytes: line number {}, plausible time code {}",
            records,
            record_length,
            line_number,
            plausible
        );
        if line_number != 0 && plausible {
            return Ok(header_length);
        }
    }

    Err(AvhrrError::CorruptRecord {
        offset: prefix_length as u64,
        reason: format!(
            "no plausible first data record after any candidate header length ({:?} x {} bytes)",
            config.pod_header_record_counts, record_length
        ),
    })
}

fn count_records(
    file_length: u64,
    prefix_length: usize,
    header_length: usize,
    record_length: usize,
    config: &ReaderConfig,
) -> AvhrrResult<usize> {
    let data_start = (prefix_length + header_length) as u64;
    if file_length < data_start + record_length as u64 {
        return Err(AvhrrError::Detection(format!(
            "file of {} bytes holds no complete data record after {} header bytes",
            file_length, data_start
        )));
    }

    let data_length = file_length - data_start;
    let count = (data_length / record_length as u64) as usize;
    let trailing = data_length % record_length as u64;
    if trailing != 0 {
        if config.allow_trailing_bytes {
            log::warn!("Ignoring {} trailing bytes after {} records", trailing, count);
        } else {
            return Err(AvhrrError::CorruptRecord {
                offset: file_length - trailing,
                reason: format!("{} trailing bytes after {} records", trailing, count),
            });
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::MemorySource;

    #[test]
    fn test_probe_block_size() {
        let mut header = vec![0u8; 5000];
        header[4608..4610].copy_from_slice(&1u16.to_be_bytes());
        header[4610..4612].copy_from_slice(&2003u16.to_be_bytes());
        header[4612..4614].copy_from_slice(&45u16.to_be_bytes());
        assert_eq!(probe_block_size(&header, 500), Some(4608));
        // implausible day of year
        header[4612..4614].copy_from_slice(&400u16.to_be_bytes());
        assert_eq!(probe_block_size(&header, 500), None);
    }

    #[test]
    fn test_probe_ignores_cells_before_start() {
        let mut header = vec![0u8; 1200];
        header[100..102].copy_from_slice(&7u16.to_be_bytes());
        header[102..104].copy_from_slice(&2001u16.to_be_bytes());
        header[104..106].copy_from_slice(&12u16.to_be_bytes());
        assert_eq!(probe_block_size(&header, 500), None);
        assert_eq!(probe_block_size(&header, 0), Some(100));
    }

    #[test]
    fn test_dataset_dimension() {
        assert_eq!(dataset_dimension("NSS.HRPT.NJ.D95123.S1200"), Some(ProductDimension::Hrpt));
        assert_eq!(dataset_dimension("NSS.GHRR.NH.D95123.S1200"), Some(ProductDimension::Gac));
        assert_eq!(dataset_dimension("nss.HRPT.NJ"), None);
        assert_eq!(dataset_dimension("NSS.AMAX.NJ"), None);
    }

    #[test]
    fn test_dataset_name_pattern_is_compiled_once() {
        let first: &Regex = Lazy::force(&DATASET_NAME);
        let second: &Regex = &DATASET_NAME;
        assert!(std::ptr::eq(first, second));
        assert!(first.is_match("NSS.LHRR.NJ.D95123"));
        assert_eq!(dataset_dimension("NSS.LHRR.NJ.D95123"), Some(ProductDimension::Hrpt));
    }

    #[test]
    fn test_tbm_requires_every_subfield() {
        let mut tbm = vec![b' '; POD_ARCHIVE_HEADER_LENGTH];
        tbm[30..30 + 24].copy_from_slice(b"NSS.HRPT.NJ.D95123.S1200");
        tbm[74] = b'T';
        tbm[89..91].copy_from_slice(b"12");
        tbm[91..93].copy_from_slice(b"00");
        tbm[117..119].copy_from_slice(b"16");
        assert_eq!(validate_tbm(&tbm), Ok((ProductDimension::Hrpt, PixelPacking::Bits16)));

        let mut bad_copy = tbm.clone();
        bad_copy[74] = b'X';
        assert!(validate_tbm(&bad_copy).is_err());

        let mut bad_hour = tbm.clone();
        bad_hour[89..91].copy_from_slice(b"31");
        assert!(validate_tbm(&bad_hour).is_err());

        let mut bad_word = tbm;
        bad_word[117..119].copy_from_slice(b"12");
        assert!(validate_tbm(&bad_word).is_err());
    }

    #[test]
    fn test_garbage_is_a_detection_failure() {
        let source = MemorySource::new(vec![0xA5; 40_000]);
        let err = detect(&source).unwrap_err();
        assert!(err.is_detection_failure(), "unexpected error {:?}", err);

        let empty = MemorySource::new(Vec::new());
        assert!(detect(&empty).unwrap_err().is_detection_failure());
    }

    #[test]
    fn test_count_records_trailing_bytes() {
        let config = ReaderConfig::default();
        assert_eq!(count_records(100 + 3 * 50 + 7, 0, 100, 50, &config).unwrap(), 3);

        let strict = ReaderConfig { allow_trailing_bytes: false, ..ReaderConfig::default() };
        match count_records(100 + 3 * 50 + 7, 0, 100, 50, &strict) {
            Err(AvhrrError::CorruptRecord { offset, .. }) => assert_eq!(offset, 250),
            other => panic!("expected CorruptRecord, got {:?}", other),
        }
        assert!(count_records(120, 0, 100, 50, &config).unwrap_err().is_detection_failure());
    }
}
