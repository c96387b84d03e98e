//! Band readers.
//!
//! A reader decodes one band (a calibrated channel, the quality flags or
//! the CLAVR cloud mask) into a caller-supplied buffer, one raw scan line
//! at a time. Lines that cannot be decoded are left at the no-data value;
//! only I/O failures and cancellation abort a read.

use crate::core::calibrate::{CalibrationCoefficients, Calibrator};
use crate::core::unpack::{counts_valid, unpack_channel};
use crate::core::window::{RawCoordinates, Window};
use crate::io::layout::field;
use crate::io::store::{Record, ScanLineStore};
use crate::types::{
    AvhrrError, AvhrrResult, BandKind, Channel, Orientation, SampleType, NO_DATA_BYTE, NO_DATA_VALUE,
};
use ndarray::Array2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bits of the flags band
pub mod flags {
    pub const DO_NOT_USE: u8 = 0x01;
    pub const TIME_ERROR: u8 = 0x02;
    pub const DATA_GAP: u8 = 0x04;
    pub const NO_CALIBRATION: u8 = 0x08;
    pub const NO_EARTH_LOCATION: u8 = 0x10;
    pub const CHANNEL_3A: u8 = 0x20;

    /// (name, mask, description) of every flag
    pub const CODING: [(&str, u8, &str); 6] = [
        ("DO_NOT_USE", DO_NOT_USE, "Scan line should not be used"),
        ("TIME_ERROR", TIME_ERROR, "Time sequence error detected"),
        ("DATA_GAP", DATA_GAP, "Data gap precedes this scan line"),
        ("NO_CALIBRATION", NO_CALIBRATION, "Insufficient data for calibration"),
        ("NO_EARTH_LOCATION", NO_EARTH_LOCATION, "Earth location data not available"),
        ("CHANNEL_3A", CHANNEL_3A, "Channel 3a is active on this scan line"),
    ];

    /// Quality indicator bit feeding each of the first five flags
    pub(crate) const QUALITY_BITS: [(u32, u8); 5] = [
        (31, DO_NOT_USE),
        (30, TIME_ERROR),
        (29, DATA_GAP),
        (28, NO_CALIBRATION),
        (27, NO_EARTH_LOCATION),
    ];
}

/// Progress reporting and cancellation, checked between scan lines
pub trait ProgressMonitor: Sync {
    fn begin(&self, _task: &str, _total_lines: usize) {}
    fn worked(&self, _lines: usize) {}
    fn is_canceled(&self) -> bool {
        false
    }
    fn done(&self) {}
}

/// Monitor that reports nothing and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressMonitor for NullProgress {}

/// Shared flag that cancels every read it is passed to
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ProgressMonitor for CancellationFlag {
    fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Destination of a read, sized to the window's destination raster
pub enum RasterBuffer<'a> {
    U8(&'a mut [u8]),
    F32(&'a mut [f32]),
}

impl RasterBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            RasterBuffer::U8(b) => b.len(),
            RasterBuffer::F32(b) => b.len(),
        }
    }

    fn sample_type(&self) -> SampleType {
        match self {
            RasterBuffer::U8(_) => SampleType::UInt8,
            RasterBuffer::F32(_) => SampleType::Float32,
        }
    }
}

/// Owned result of `BandReader::read_array`
#[derive(Debug, Clone, PartialEq)]
pub enum BandArray {
    U8(Array2<u8>),
    F32(Array2<f32>),
}

impl BandArray {
    pub fn as_f32(&self) -> Option<&Array2<f32>> {
        match self {
            BandArray::F32(a) => Some(a),
            BandArray::U8(_) => None,
        }
    }

    pub fn as_u8(&self) -> Option<&Array2<u8>> {
        match self {
            BandArray::U8(a) => Some(a),
            BandArray::F32(_) => None,
        }
    }
}

/// Channel 3 mode signalled in bits 0-1 of the KLM scan-line bit field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel3Mode {
    Ch3b,
    Ch3a,
    Transition,
    Unknown,
}

impl Channel3Mode {
    pub fn from_bit_field(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Channel3Mode::Ch3b,
            1 => Channel3Mode::Ch3a,
            2 => Channel3Mode::Transition,
            _ => Channel3Mode::Unknown,
        }
    }

    fn carries(self, channel: Channel) -> bool {
        matches!(
            (self, channel),
            (Channel3Mode::Ch3a, Channel::Ch3a) | (Channel3Mode::Ch3b, Channel::Ch3b)
        )
    }
}

/// Where a channel's per-line calibration integers live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientSource {
    /// KLM `[a0, a1, a2]` of thermal channel index 0..3
    KlmQuadratic(usize),
    /// KLM `[intercept, slope, -]` of thermal channel index 0..3
    KlmLinear(usize),
    /// POD `[slope, intercept]` pair of video slot 0..5
    Pod(usize),
}

impl CoefficientSource {
    /// Canonical coefficients of raw line `line`
    pub fn read(&self, store: &ScanLineStore, line: usize) -> AvhrrResult<CalibrationCoefficients> {
        let record = Record::Line(line);
        Ok(match *self {
            CoefficientSource::KlmQuadratic(i) => {
                CalibrationCoefficients::new(&store.read_i32_array(record, field::IR_OPERATIONAL_CAL[i])?)
            }
            CoefficientSource::KlmLinear(i) => {
                let raw = store.read_i32_array(record, field::IR_OPERATIONAL_CAL[i])?;
                CalibrationCoefficients::new(&[raw[1], raw[0]])
            }
            CoefficientSource::Pod(slot) => {
                let raw = store.read_i32_array(record, field::CALIBRATION_COEFFICIENTS)?;
                CalibrationCoefficients::new(&raw[2 * slot..2 * slot + 2])
            }
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BandSource {
    Calibrated {
        channel: Channel,
        calibrator: Calibrator,
        coefficients: Option<CoefficientSource>,
        /// Set when the line's channel 3 mode must be checked
        check_channel3: bool,
    },
    Flags {
        has_channel3_select: bool,
    },
    CloudMask,
}

impl BandSource {
    /// Calibrated source; a coefficient source is given iff the calibrator needs per-line data
    pub(crate) fn calibrated(
        channel: Channel,
        calibrator: Calibrator,
        coefficients: Option<CoefficientSource>,
        check_channel3: bool,
    ) -> AvhrrResult<Self> {
        if calibrator.requires_calibration_data() != coefficients.is_some() {
            return Err(AvhrrError::InvalidRequest(format!(
                "channel {} calibration expects per-line coefficients: {}, coefficient source: {:?}",
                channel,
                calibrator.requires_calibration_data(),
                coefficients
            )));
        }
        Ok(BandSource::Calibrated { channel, calibrator, coefficients, check_channel3 })
    }
}

/// Decoder for one band of an open file
#[derive(Clone)]
pub struct BandReader {
    store: ScanLineStore,
    orientation: Orientation,
    kind: BandKind,
    name: String,
    unit: &'static str,
    description: String,
    source: BandSource,
}

impl BandReader {
    pub(crate) fn new(
        store: ScanLineStore,
        orientation: Orientation,
        kind: BandKind,
        source: BandSource,
    ) -> Self {
        let (name, unit, description) = match &source {
            BandSource::Calibrated { channel, calibrator, .. } => (
                calibrator.band_name(*channel),
                calibrator.unit(),
                calibrator.description(*channel),
            ),
            BandSource::Flags { .. } => ("flags".to_string(), "", "Scan line quality flags".to_string()),
            BandSource::CloudMask => (
                "cloud_flags".to_string(),
                "",
                "CLAVR cloud mask (0 unknown, 1 clear, 2 probably cloudy, 3 cloudy)".to_string(),
            ),
        };
        Self { store, orientation, kind, name, unit, description, source }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        self.unit
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> BandKind {
        self.kind
    }

    pub fn channel(&self) -> Option<Channel> {
        match self.source {
            BandSource::Calibrated { channel, .. } => Some(channel),
            _ => None,
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self.source {
            BandSource::Calibrated { .. } => SampleType::Float32,
            BandSource::Flags { .. } | BandSource::CloudMask => SampleType::UInt8,
        }
    }

    pub fn no_data_value(&self) -> f64 {
        match self.sample_type() {
            SampleType::Float32 => f64::from(NO_DATA_VALUE),
            SampleType::UInt8 => f64::from(NO_DATA_BYTE),
        }
    }

    fn product_size(&self) -> (usize, usize) {
        (self.store.layout().dimension.pixels, self.store.record_count())
    }

    /// Decode `window` into `dest`.
    ///
    /// `dest` must hold exactly `window.dest_len()` samples of the band's
    /// sample type. It is filled with the no-data value first, so on
    /// cancellation every line not yet read stays no-data.
    pub fn read(&self, window: &Window, mut dest: RasterBuffer<'_>, pm: &dyn ProgressMonitor) -> AvhrrResult<()> {
        let (width, height) = self.product_size();
        window.validate(width, height)?;
        if dest.sample_type() != self.sample_type() {
            return Err(AvhrrError::InvalidRequest(format!(
                "band '{}' holds {:?} samples, buffer is {:?}",
                self.name,
                self.sample_type(),
                dest.sample_type()
            )));
        }
        if dest.len() != window.dest_len() {
            return Err(AvhrrError::InvalidRequest(format!(
                "buffer of {} samples does not match the {}x{} destination",
                dest.len(),
                window.dest_width(),
                window.dest_height()
            )));
        }

        match &mut dest {
            RasterBuffer::U8(b) => b.fill(NO_DATA_BYTE),
            RasterBuffer::F32(b) => b.fill(NO_DATA_VALUE),
        }

        let raw = RawCoordinates::compute(window, width, height, self.orientation);
        log::debug!(
            "Reading band '{}': raw lines {}..={} step {}, pixels {}..={} step {}",
            self.name,
            raw.min_y,
            raw.max_y,
            raw.step_y,
            raw.min_x,
            raw.max_x,
            raw.step_x
        );

        pm.begin(&self.name, raw.dest_height);
        let mut state = self.source.clone();
        let mut skipped = 0;
        for (row, line) in raw.lines().enumerate() {
            if pm.is_canceled() {
                pm.done();
                log::info!("Read of band '{}' cancelled after {} lines", self.name, row);
                return Err(AvhrrError::Cancelled { lines_read: row });
            }
            let written = match &mut dest {
                RasterBuffer::F32(b) => self.read_calibrated_line(&mut state, line, &raw, row, b)?,
                RasterBuffer::U8(b) => self.read_byte_line(&state, line, &raw, row, b)?,
            };
            if !written {
                skipped += 1;
            }
            pm.worked(1);
        }
        pm.done();

        if skipped > 0 {
            log::debug!("Band '{}': {} of {} lines left as no-data", self.name, skipped, raw.dest_height);
        }
        Ok(())
    }

    /// Convenience read into a freshly allocated array
    pub fn read_array(&self, window: &Window) -> AvhrrResult<BandArray> {
        let shape = (window.dest_height(), window.dest_width());
        match self.sample_type() {
            SampleType::Float32 => {
                let mut data = vec![NO_DATA_VALUE; window.dest_len()];
                self.read(window, RasterBuffer::F32(&mut data), &NullProgress)?;
                Array2::from_shape_vec(shape, data)
                    .map(BandArray::F32)
                    .map_err(|e| AvhrrError::InvalidRequest(e.to_string()))
            }
            SampleType::UInt8 => {
                let mut data = vec![NO_DATA_BYTE; window.dest_len()];
                self.read(window, RasterBuffer::U8(&mut data), &NullProgress)?;
                Array2::from_shape_vec(shape, data)
                    .map(BandArray::U8)
                    .map_err(|e| AvhrrError::InvalidRequest(e.to_string()))
            }
        }
    }

    /// Channel 3 check, coefficients, unpack, validity filter, calibration
    fn read_calibrated_line(
        &self,
        state: &mut BandSource,
        line: usize,
        raw: &RawCoordinates,
        row: usize,
        dest: &mut [f32],
    ) -> AvhrrResult<bool> {
        let BandSource::Calibrated { channel, calibrator, coefficients, check_channel3 } = state else {
            return Ok(false);
        };
        let record = Record::Line(line);

        if *check_channel3 {
            let mode = Channel3Mode::from_bit_field(self.store.read_u16(record, field::SCAN_LINE_BIT_FIELD)?);
            if !mode.carries(*channel) {
                return Ok(false);
            }
        }

        if calibrator.requires_calibration_data() {
            let source = (*coefficients).ok_or_else(|| {
                AvhrrError::InvalidRequest(format!("band '{}' has no per-line coefficient source", self.name))
            })?;
            let coeffs = source.read(&self.store, line)?;
            if !calibrator.process_calibration_data(&coeffs) {
                log::warn!("Line {}: no usable calibration for channel {}", line, channel);
                return Ok(false);
            }
        }

        let layout = self.store.layout();
        let video = self.store.field(record, field::VIDEO_DATA)?;
        let counts = unpack_channel(layout.packing, &video, channel.slot(), layout.dimension.pixels)?;
        if !counts_valid(&counts) {
            return Ok(false);
        }

        for (col, x) in raw.columns().enumerate() {
            let value = calibrator.calibrate(counts[x]);
            dest[raw.target_index(row, col)] = to_sample(value, NO_DATA_VALUE);
        }
        Ok(true)
    }

    fn read_byte_line(
        &self,
        state: &BandSource,
        line: usize,
        raw: &RawCoordinates,
        row: usize,
        dest: &mut [u8],
    ) -> AvhrrResult<bool> {
        let record = Record::Line(line);
        match state {
            BandSource::Flags { has_channel3_select } => {
                let quality = self.store.read_u32(record, field::QUALITY_INDICATOR)?;
                let bit_field = if *has_channel3_select {
                    Some(self.store.read_u16(record, field::SCAN_LINE_BIT_FIELD)?)
                } else {
                    None
                };
                let value = line_flags(quality, bit_field);
                for col in 0..raw.dest_width {
                    dest[raw.target_index(row, col)] = value;
                }
                Ok(true)
            }
            BandSource::CloudMask => {
                if self.store.read_u32(record, field::CLAVR_LINE_STATUS)? == 0 {
                    return Ok(false);
                }
                let mask = self.store.field(record, field::CLOUD_MASK)?;
                for (col, x) in raw.columns().enumerate() {
                    dest[raw.target_index(row, col)] = cloud_class(&mask, x);
                }
                Ok(true)
            }
            BandSource::Calibrated { .. } => Ok(false),
        }
    }
}

/// Flags byte of one scan line
pub fn line_flags(quality: u32, bit_field: Option<u16>) -> u8 {
    let mut value = flags::QUALITY_BITS
        .iter()
        .filter(|(bit, _)| quality & (1 << bit) != 0)
        .fold(0u8, |acc, (_, flag)| acc | flag);
    if bit_field.map(Channel3Mode::from_bit_field) == Some(Channel3Mode::Ch3a) {
        value |= flags::CHANNEL_3A;
    }
    value
}

/// CLAVR class of `pixel`, four 2-bit classes per byte, first pixel highest
pub fn cloud_class(mask: &[u8], pixel: usize) -> u8 {
    mask.get(pixel / 4)
        .map(|byte| (byte >> (6 - 2 * (pixel % 4))) & 0x3)
        .unwrap_or(NO_DATA_BYTE)
}

/// Convert a physical value to a sample, non-finite or unrepresentable values become `no_data`
fn to_sample<T: num_traits::NumCast + Copy>(value: f64, no_data: T) -> T {
    if !value.is_finite() {
        return no_data;
    }
    <T as num_traits::NumCast>::from(value).unwrap_or(no_data)
}
