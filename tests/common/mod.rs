//! Synthetic Level-1B files for integration tests.
//!
//! Builders write every field the decoder touches at its documented byte
//! offset, fill the video block with a known count pattern and leave the
//! rest zeroed.

#![allow(dead_code)]

use avhrr::{AvhrrFile, ByteSource, FormatFamily, MemorySource, PixelPacking, ProductDimension, ReaderConfig};
use std::sync::Arc;

pub const KLM_VIDEO_OFFSET: usize = 1264;
pub const POD_VIDEO_OFFSET: usize = 448;
pub const TBM_LENGTH: usize = 122;
pub const ARS_LENGTH: usize = 512;

pub const START_MS: u32 = 3_723_500;
pub const LINE_MS: u32 = 167;

pub const KLM_NAME: &[u8] = b"NSS.HRPT.NN.D03045.S0102.E0114.B1234567.GC";
pub const POD_HRPT_NAME: &[u8] = b"NSS.HRPT.NJ.D95123.S1200.E1212.B0123456.WI";
pub const POD_GAC_NAME: &[u8] = b"NSS.GHRR.NJ.D95123.S1200.E1340.B0123456.GC";

/// Quadratic KLM coefficients (a0, a1, a2) of channels 3b, 4, 5 as stored
pub const KLM_IR_QUADRATIC: [[i32; 3]; 3] = [[1_500_000, -1_000, 0], [150_000_000, -100_000, 0], [140_000_000, -90_000, 0]];
/// The same relations for version 1 files, stored as (intercept, slope)
pub const KLM_IR_LINEAR: [[i32; 3]; 3] = [[1_500_000, -1_000, 0], [15_000_000, -100_000, 0], [14_000_000, -90_000, 0]];
/// Radiance (a0, a1) of channels 3b, 4, 5 in physical units
pub const KLM_IR_RADIANCE: [(f64, f64); 3] = [(1.5, -0.001), (150.0, -0.1), (140.0, -0.09)];
pub const KLM_WAVENUMBERS: [f64; 3] = [2669.1, 927.0, 837.0];

/// POD slope/intercept of the visible and thermal slots, 2^-30 / 2^-22 scaled
pub const POD_VISIBLE_COEFFS: [i32; 2] = [107_374_182, -8_388_608];
pub const POD_THERMAL_COEFFS: [i32; 2] = [-182_536_110, 713_031_680];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pixels(dimension: ProductDimension) -> usize {
    match dimension {
        ProductDimension::Hrpt => 2048,
        ProductDimension::Gac => 409,
    }
}

pub fn cloud_mask_bytes(dimension: ProductDimension) -> usize {
    match dimension {
        ProductDimension::Hrpt => 512,
        ProductDimension::Gac => 104,
    }
}

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

/// Count pattern used when a test does not care: always in 1..=200
pub fn default_count(line: usize, pixel: usize, slot: usize) -> u16 {
    1 + ((line * 3 + pixel * 7 + slot * 31) % 200) as u16
}

/// Interleaved samples packed the way the instrument stores them
pub fn pack_video(packing: PixelPacking, samples: &[u16]) -> Vec<u8> {
    match packing {
        PixelPacking::Bits8 => samples.iter().map(|&s| s as u8).collect(),
        PixelPacking::Bits16 => samples.iter().flat_map(|&s| s.to_be_bytes()).collect(),
        PixelPacking::Bits10 => samples
            .chunks(3)
            .flat_map(|group| {
                let mut word = 0u32;
                for (i, &s) in group.iter().enumerate() {
                    word |= (u32::from(s) & 0x3FF) << (20 - 10 * i as u32);
                }
                word.to_be_bytes()
            })
            .collect(),
    }
}

/// Packed POD time code
pub fn pod_time_code(two_digit_year: u16, day_of_year: u16, millis: u32) -> [u8; 6] {
    let word = (two_digit_year << 9) | day_of_year;
    let mut out = [0u8; 6];
    out[..2].copy_from_slice(&word.to_be_bytes());
    out[2..].copy_from_slice(&millis.to_be_bytes());
    out
}

/// A synthetic file and the geometry it was built with
#[derive(Clone)]
pub struct Synthetic {
    pub family: FormatFamily,
    pub dimension: ProductDimension,
    pub packing: PixelPacking,
    pub bytes: Vec<u8>,
    pub prefix: usize,
    pub header_length: usize,
    pub record_length: usize,
    pub records: usize,
}

impl Synthetic {
    pub fn header_offset(&self) -> usize {
        self.prefix
    }

    pub fn line_offset(&self, line: usize) -> usize {
        self.prefix + self.header_length + line * self.record_length
    }

    pub fn pixels(&self) -> usize {
        pixels(self.dimension)
    }

    pub fn put(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) {
        self.put(offset, &value.to_be_bytes());
    }

    pub fn put_i16(&mut self, offset: usize, value: i16) {
        self.put(offset, &value.to_be_bytes());
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) {
        self.put(offset, &value.to_be_bytes());
    }

    pub fn put_i32(&mut self, offset: usize, value: i32) {
        self.put(offset, &value.to_be_bytes());
    }

    pub fn set_header_u16(&mut self, rel: usize, value: u16) {
        self.put_u16(self.header_offset() + rel, value);
    }

    pub fn set_line_u16(&mut self, line: usize, rel: usize, value: u16) {
        self.put_u16(self.line_offset(line) + rel, value);
    }

    pub fn set_line_u32(&mut self, line: usize, rel: usize, value: u32) {
        self.put_u32(self.line_offset(line) + rel, value);
    }

    pub fn set_line_i32(&mut self, line: usize, rel: usize, value: i32) {
        self.put_i32(self.line_offset(line) + rel, value);
    }

    fn video_offset(&self) -> usize {
        match self.family {
            FormatFamily::Klm => KLM_VIDEO_OFFSET,
            FormatFamily::Pod => POD_VIDEO_OFFSET,
        }
    }

    /// End of the video block relative to the record start
    pub fn video_end(&self) -> usize {
        self.video_offset() + self.packing.video_bytes(self.pixels() * 5)
    }

    /// Rewrite the video block of one line from `count(pixel, slot)`
    pub fn write_line_counts(&mut self, line: usize, count: impl Fn(usize, usize) -> u16) {
        let samples: Vec<u16> = (0..self.pixels() * 5).map(|k| count(k / 5, k % 5)).collect();
        let video = pack_video(self.packing, &samples);
        let offset = self.line_offset(line) + self.video_offset();
        self.put(offset, &video);
    }

    /// Rewrite every video block from `count(line, pixel, slot)`
    pub fn write_counts(&mut self, count: impl Fn(usize, usize, usize) -> u16) {
        for line in 0..self.records {
            self.write_line_counts(line, |p, s| count(line, p, s));
        }
    }

    /// KLM Earth location of every tie point from `location(line, k) -> (lat, lon)`
    pub fn write_klm_locations(&mut self, location: impl Fn(usize, usize) -> (f64, f64)) {
        for line in 0..self.records {
            for k in 0..51 {
                let (lat, lon) = location(line, k);
                let base = self.line_offset(line) + 640 + 8 * k;
                self.put_i32(base, (lat * 1e4).round() as i32);
                self.put_i32(base + 4, (lon * 1e4).round() as i32);
            }
        }
    }

    pub fn source(&self) -> Arc<dyn ByteSource> {
        Arc::new(MemorySource::new(self.bytes.clone()))
    }

    pub fn open(&self) -> AvhrrFile {
        AvhrrFile::from_source(self.source(), &ReaderConfig::default()).expect("synthetic file opens")
    }
}

#[derive(Debug, Clone)]
pub struct KlmSpec {
    pub dimension: ProductDimension,
    pub packing: PixelPacking,
    pub version: u16,
    /// Defaults to HRPT (3) or GAC (2) after the dimension
    pub data_type: Option<u16>,
    pub clavr_status: u16,
    pub records: usize,
    pub archive_prefix: bool,
    pub southbound: bool,
    pub spacecraft: u16,
}

impl Default for KlmSpec {
    fn default() -> Self {
        Self {
            dimension: ProductDimension::Hrpt,
            packing: PixelPacking::Bits10,
            version: 4,
            data_type: None,
            clavr_status: 1,
            records: 10,
            archive_prefix: false,
            southbound: false,
            spacecraft: 4,
        }
    }
}

pub fn klm(spec: &KlmSpec) -> Synthetic {
    let block = klm_block_size(spec.dimension, spec.packing);
    let prefix = if spec.archive_prefix { ARS_LENGTH } else { 0 };
    let mut s = Synthetic {
        family: FormatFamily::Klm,
        dimension: spec.dimension,
        packing: spec.packing,
        bytes: vec![0u8; prefix + block * (spec.records + 1)],
        prefix,
        header_length: block,
        record_length: block,
        records: spec.records,
    };
    if prefix > 0 {
        s.bytes[..prefix].fill(b' ');
        s.put(0, b"ARS");
    }

    let h = prefix;
    let data_type = spec.data_type.unwrap_or(match spec.dimension {
        ProductDimension::Hrpt => 3,
        ProductDimension::Gac => 2,
    });
    s.put(h, b"NSS");
    s.put_u16(h + 4, spec.version);
    s.put_u16(h + 12, block as u16);
    s.put(h + 22, KLM_NAME);
    s.put_u16(h + 72, spec.spacecraft);
    s.put_u16(h + 76, data_type);
    s.put_u16(h + 84, 2003);
    s.put_u16(h + 86, 45);
    s.put_u32(h + 88, START_MS);
    s.put_u16(h + 96, 2003);
    s.put_u16(h + 98, 45);
    s.put_u32(h + 100, START_MS + LINE_MS * spec.records as u32);
    s.put_u16(h + 128, spec.records as u16);
    s.put_u16(h + 140, spec.clavr_status);

    let irradiance = [1390, 2330, 1000];
    let width = [117, 228, 61];
    for i in 0..3 {
        s.put_i32(h + 264 + 8 * i, irradiance[i]);
        s.put_i32(h + 268 + 8 * i, width[i]);
        // albedo 0.1 * C up to count 500, 0.2 * C - 50 above
        for (j, v) in [1_000_000, 0, 2_000_000, -50_000_000, 500].into_iter().enumerate() {
            s.put_i32(h + 324 + 20 * i + 4 * j, v);
        }
    }
    let wavenumbers = [266_910, 927_000, 837_000];
    for i in 0..3 {
        s.put_i32(h + 288 + 12 * i, wavenumbers[i]);
        s.put_i32(h + 292 + 12 * i, 0);
        s.put_i32(h + 296 + 12 * i, 1_000_000);
    }
    s.put_u32(h + 384, 1_000_000);

    let ir = if spec.version >= 2 { KLM_IR_QUADRATIC } else { KLM_IR_LINEAR };
    let video_end = s.video_end();
    let mask_bytes = cloud_mask_bytes(spec.dimension);
    for line in 0..spec.records {
        let o = s.line_offset(line);
        s.put_u16(o, line as u16 + 1);
        s.put_u16(o + 2, 2003);
        s.put_u16(o + 4, 45);
        s.put_u32(o + 8, START_MS + LINE_MS * line as u32);
        s.put_u16(o + 12, if spec.southbound { 0x8000 } else { 0 });
        for (t, coeffs) in ir.iter().enumerate() {
            for (j, &v) in coeffs.iter().enumerate() {
                s.put_i32(o + 228 + 12 * t + 4 * j, v);
            }
        }
        for k in 0..51 {
            let base = o + 328 + 6 * k;
            s.put_i16(base, (3000 + 10 * k + line) as i16);
            s.put_i16(base + 2, (100 * k) as i16);
            s.put_i16(base + 4, 9000);
        }
        s.put_u32(o + video_end + 56, 1);
        // classes 0, 1, 2, 3 repeating along the scan
        let mask = vec![0b00_01_10_11u8; mask_bytes];
        s.put(o + video_end + 64, &mask);
    }
    s.write_klm_locations(|line, k| (50.0 - 0.01 * line as f64, 10.0 + 0.1 * k as f64));
    s.write_counts(default_count);
    s
}

#[derive(Debug, Clone)]
pub struct PodSpec {
    pub dimension: ProductDimension,
    pub packing: PixelPacking,
    pub records: usize,
    pub tbm_prefix: bool,
    pub header_records: usize,
    pub spacecraft: u8,
    pub southbound: bool,
}

impl Default for PodSpec {
    fn default() -> Self {
        Self {
            dimension: ProductDimension::Hrpt,
            packing: PixelPacking::Bits10,
            records: 10,
            tbm_prefix: false,
            header_records: 1,
            spacecraft: 3,
            southbound: false,
        }
    }
}

pub fn pod(spec: &PodSpec) -> Synthetic {
    let record_length = pod_record_length(spec.dimension, spec.packing);
    let prefix = if spec.tbm_prefix { TBM_LENGTH } else { 0 };
    let header_length = spec.header_records * record_length;
    let mut s = Synthetic {
        family: FormatFamily::Pod,
        dimension: spec.dimension,
        packing: spec.packing,
        bytes: vec![0u8; prefix + header_length + spec.records * record_length],
        prefix,
        header_length,
        record_length,
        records: spec.records,
    };
    let name = match spec.dimension {
        ProductDimension::Hrpt => POD_HRPT_NAME,
        ProductDimension::Gac => POD_GAC_NAME,
    };

    if spec.tbm_prefix {
        s.bytes[..prefix].fill(b' ');
        s.put(30, name);
        s.put(74, b"T");
        s.put(89, b"12");
        s.put(91, b"00");
        let word_size: &[u8] = match spec.packing {
            PixelPacking::Bits8 => b"8 ",
            PixelPacking::Bits10 => b"10",
            PixelPacking::Bits16 => b"16",
        };
        s.put(117, word_size);
    }

    let h = prefix;
    s.bytes[h] = spec.spacecraft;
    s.bytes[h + 1] = match spec.dimension {
        ProductDimension::Hrpt => 0x30,
        ProductDimension::Gac => 0x20,
    };
    s.put(h + 2, &pod_time_code(95, 123, START_MS));
    s.put_u16(h + 8, spec.records as u16);
    s.put(h + 10, &pod_time_code(95, 123, START_MS + LINE_MS * spec.records as u32));
    s.put(h + 40, name);

    for line in 0..spec.records {
        let o = s.line_offset(line);
        s.put_u16(o, line as u16 + 1);
        s.put(o + 2, &pod_time_code(95, 123, START_MS + LINE_MS * line as u32));
        for slot in 0..5 {
            let pair = if slot < 2 { POD_VISIBLE_COEFFS } else { POD_THERMAL_COEFFS };
            s.put_i32(o + 12 + 8 * slot, pair[0]);
            s.put_i32(o + 16 + 8 * slot, pair[1]);
        }
        s.bytes[o + 52] = 51;
        let step = if spec.southbound { -0.05 } else { 0.05 };
        for k in 0..51 {
            s.bytes[o + 53 + k] = (60 + k) as u8;
            let lat = 40.0 + step * line as f64;
            let lon = 10.0 + 0.1 * k as f64;
            s.put_i16(o + 104 + 4 * k, (lat * 128.0).round() as i16);
            s.put_i16(o + 106 + 4 * k, (lon * 128.0).round() as i16);
        }
    }
    s.write_counts(default_count);
    s
}
