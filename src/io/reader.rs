//! Open Level-1B file: header-level facts, band readers, tie points and metadata.

use crate::core::band::{BandArray, BandReader, BandSource, CoefficientSource};
use crate::core::calibrate::{
    earth_sun_distance_ratio, pod_planck_constants, pod_visible_constants, Calibrator, DualGain,
    IrRadianceCalibrator, IrScheme, IrTemperatureCalibrator, PlanckConstants, ReflectanceCalibrator,
    VisibleConstants, POD_INTERCEPT_SCALE, POD_SLOPE_SCALE,
};
use crate::core::metadata::{self, MetadataElement, ProductSummary};
use crate::core::tie_points::{self, TiePointGrids};
use crate::core::window::Window;
use crate::io::codes;
use crate::io::detect::{detect_with_config, DetectedFormat, ReaderConfig};
use crate::io::layout::{self, field};
use crate::io::source::{ByteSource, FileSource};
use crate::io::store::{Record, ScanLineStore};
use crate::types::{
    utc_from_day_of_year, AvhrrError, AvhrrResult, BandKind, Channel, FormatFamily, Orientation,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// KLM bit field bit set while the spacecraft is southbound
const KLM_SOUTHBOUND_BIT: u16 = 1 << 15;

/// Plausible range of a header Earth-Sun distance ratio
const EARTH_SUN_RATIO_RANGE: std::ops::RangeInclusive<f64> = 0.95..=1.05;

/// POD files carry no format version
const POD_FORMAT_VERSION: u16 = 0;

/// Tie point whose latitude decides the POD pass direction
const CENTRE_TIE_POINT: usize = 25;

/// An open AVHRR Level-1B file
pub struct AvhrrFile {
    path: Option<PathBuf>,
    store: ScanLineStore,
    orientation: Orientation,
    format_version: u16,
    product_name: String,
    spacecraft_code: i64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    earth_sun_ratio: f64,
    has_cloud_band: bool,
}

impl AvhrrFile {
    /// Open a file on disk with the default configuration
    pub fn open_path<P: AsRef<Path>>(path: P) -> AvhrrResult<Self> {
        Self::open_with_config(path, &ReaderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> AvhrrResult<Self> {
        let path = path.as_ref();
        log::info!("Opening AVHRR Level-1B file {}", path.display());
        let source: Arc<dyn ByteSource> = Arc::new(FileSource::open(path)?);
        let mut file = Self::from_source(source, config)?;
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Detect and open any byte source
    pub fn from_source(source: Arc<dyn ByteSource>, config: &ReaderConfig) -> AvhrrResult<Self> {
        let format = detect_with_config(source.as_ref(), config)?;
        Self::open(source, format)
    }

    /// Open a source whose layout has already been detected
    pub fn open(source: Arc<dyn ByteSource>, format: DetectedFormat) -> AvhrrResult<Self> {
        let layout = Arc::new(format.layout());
        let store = ScanLineStore::new(source, layout, format);

        let file = match format.family {
            FormatFamily::Klm => Self::open_klm(store)?,
            FormatFamily::Pod => Self::open_pod(store)?,
        };
        log::info!(
            "Opened {} v{} '{}' ({}): {} x {} pixels, {:?}, cloud band {}",
            format.family,
            file.format_version,
            file.product_name,
            file.spacecraft(),
            file.product_width(),
            file.product_height(),
            file.orientation,
            file.has_cloud_band
        );
        Ok(file)
    }

    fn open_klm(store: ScanLineStore) -> AvhrrResult<Self> {
        let h = Record::Header;
        let format_version = store.read_u16(h, field::FORMAT_VERSION)?;
        let product_name = store.read_ascii(h, field::DATA_SET_NAME)?;
        let spacecraft_code = i64::from(store.read_u16(h, field::SPACECRAFT_ID)?);

        let start_day = u32::from(store.read_u16(h, field::START_DAY_OF_YEAR)?);
        let start_time = utc_from_day_of_year(
            i32::from(store.read_u16(h, field::START_YEAR)?),
            start_day,
            store.read_u32(h, field::START_TIME_MS)?,
        );
        let end_time = utc_from_day_of_year(
            i32::from(store.read_u16(h, field::END_YEAR)?),
            u32::from(store.read_u16(h, field::END_DAY_OF_YEAR)?),
            store.read_u32(h, field::END_TIME_MS)?,
        );

        let header_ratio = store.read_scaled(h, field::EARTH_SUN_DISTANCE_RATIO)?;
        let earth_sun_ratio = if EARTH_SUN_RATIO_RANGE.contains(&header_ratio) {
            header_ratio
        } else {
            log::debug!("Header Earth-Sun ratio {} unusable, using day {}", header_ratio, start_day);
            earth_sun_distance_ratio(start_day)
        };

        let clavr_status = store.read_u16(h, field::CLAVR_STATUS)?;
        let has_cloud_band = format_version >= 4 && clavr_status == 1 && store.layout().has_cloud_mask();

        let first = store.read_u16(Record::Line(0), field::SCAN_LINE_BIT_FIELD)?;
        let last = store.read_u16(Record::Line(store.record_count() - 1), field::SCAN_LINE_BIT_FIELD)?;
        let orientation = if first & KLM_SOUTHBOUND_BIT != 0 && last & KLM_SOUTHBOUND_BIT != 0 {
            Orientation::Southbound
        } else {
            Orientation::Northbound
        };

        Ok(Self {
            path: None,
            store,
            orientation,
            format_version,
            product_name,
            spacecraft_code,
            start_time,
            end_time,
            earth_sun_ratio,
            has_cloud_band,
        })
    }

    fn open_pod(store: ScanLineStore) -> AvhrrResult<Self> {
        let h = Record::Header;
        let product_name = store.read_ascii(h, field::DATA_SET_NAME)?;
        let spacecraft_code = i64::from(store.read_u8(h, field::SPACECRAFT_ID)?);

        let decode = |name: &str| -> AvhrrResult<Option<(i32, u32, u32)>> {
            Ok(layout::pod_time_code(&store.field(h, name)?))
        };
        let start = decode(field::START_TIME_CODE)?;
        let end = decode(field::END_TIME_CODE)?;
        let to_utc = |t: Option<(i32, u32, u32)>| t.and_then(|(y, d, ms)| utc_from_day_of_year(y, d, ms));
        let earth_sun_ratio = earth_sun_distance_ratio(start.map(|(_, d, _)| d).unwrap_or(1));

        // POD records carry no direction bit; follow the centre latitude
        let centre_latitude = |line: usize| -> AvhrrResult<f64> {
            let location = store.read_scaled_array(Record::Line(line), field::EARTH_LOCATION)?;
            Ok(location.get(2 * CENTRE_TIE_POINT).copied().unwrap_or(0.0))
        };
        let first = centre_latitude(0)?;
        let last = centre_latitude(store.record_count() - 1)?;
        let orientation = if last < first { Orientation::Southbound } else { Orientation::Northbound };

        Ok(Self {
            path: None,
            orientation,
            format_version: POD_FORMAT_VERSION,
            product_name,
            spacecraft_code,
            start_time: to_utc(start),
            end_time: to_utc(end),
            earth_sun_ratio,
            has_cloud_band: false,
            store,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> &DetectedFormat {
        self.store.format()
    }

    pub fn family(&self) -> FormatFamily {
        self.store.format().family
    }

    pub fn product_width(&self) -> usize {
        self.store.layout().dimension.pixels
    }

    pub fn product_height(&self) -> usize {
        self.store.record_count()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// POD instruments have no channel 3a
    pub fn is_channel_available(&self, channel: Channel) -> bool {
        !(self.family() == FormatFamily::Pod && channel == Channel::Ch3a)
    }

    pub fn has_cloud_band(&self) -> bool {
        self.has_cloud_band
    }

    pub fn format_version(&self) -> u16 {
        self.format_version
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn spacecraft(&self) -> String {
        let table = match self.family() {
            FormatFamily::Klm => codes::KLM_SPACECRAFT,
            FormatFamily::Pod => codes::POD_SPACECRAFT,
        };
        codes::lookup(table, self.spacecraft_code)
    }

    pub fn spacecraft_code(&self) -> i64 {
        self.spacecraft_code
    }

    pub fn earth_sun_ratio(&self) -> f64 {
        self.earth_sun_ratio
    }

    /// Raw scan line shown at product line `line`
    pub fn raw_line(&self, line: usize) -> AvhrrResult<usize> {
        let count = self.product_height();
        if line >= count {
            return Err(AvhrrError::OutOfRange { index: line, count });
        }
        Ok(match self.orientation {
            Orientation::Northbound => line,
            Orientation::Southbound => count - 1 - line,
        })
    }

    /// Acquisition time of product line `line`
    pub fn line_time(&self, line: usize) -> AvhrrResult<Option<DateTime<Utc>>> {
        let record = Record::Line(self.raw_line(line)?);
        Ok(match self.family() {
            FormatFamily::Klm => utc_from_day_of_year(
                i32::from(self.store.read_u16(record, field::SCAN_LINE_YEAR)?),
                u32::from(self.store.read_u16(record, field::SCAN_LINE_DAY_OF_YEAR)?),
                self.store.read_u32(record, field::SCAN_LINE_TIME_MS)?,
            ),
            FormatFamily::Pod => layout::pod_time_code(&self.store.field(record, field::TIME_CODE)?)
                .and_then(|(y, d, ms)| utc_from_day_of_year(y, d, ms)),
        })
    }

    /// Reader for a band.
    ///
    /// `channel` selects the channel of calibrated bands and is ignored
    /// for `Flags` and `CloudMask`.
    pub fn create_band_reader(&self, channel: Option<Channel>, kind: BandKind) -> AvhrrResult<BandReader> {
        let source = match kind {
            BandKind::Flags => BandSource::Flags { has_channel3_select: self.family() == FormatFamily::Klm },
            BandKind::CloudMask => {
                if !self.has_cloud_band {
                    return Err(AvhrrError::InvalidRequest(
                        "file carries no CLAVR cloud mask".to_string(),
                    ));
                }
                BandSource::CloudMask
            }
            BandKind::Reflectance | BandKind::IrRadiance | BandKind::IrTemperature => {
                let channel = channel.ok_or_else(|| {
                    AvhrrError::InvalidRequest(format!("{:?} band needs a channel", kind))
                })?;
                if !self.is_channel_available(channel) {
                    return Err(AvhrrError::InvalidRequest(format!(
                        "channel {} is not available in {} files",
                        channel,
                        self.family()
                    )));
                }
                let (calibrator, coefficients) = self.calibrator(channel, kind)?;
                let check_channel3 =
                    self.family() == FormatFamily::Klm && matches!(channel, Channel::Ch3a | Channel::Ch3b);
                BandSource::calibrated(channel, calibrator, coefficients, check_channel3)?
            }
        };
        Ok(BandReader::new(self.store.clone(), self.orientation, kind, source))
    }

    fn calibrator(
        &self,
        channel: Channel,
        kind: BandKind,
    ) -> AvhrrResult<(Calibrator, Option<CoefficientSource>)> {
        let h = Record::Header;
        let mismatch = || AvhrrError::InvalidRequest(format!("channel {} has no {:?} band", channel, kind));

        if kind == BandKind::Reflectance {
            let index = channel.visible_index().ok_or_else(mismatch)?;
            return match self.family() {
                FormatFamily::Klm => {
                    let constants = VisibleConstants {
                        irradiance: self.store.read_scaled(h, field::SOLAR_IRRADIANCE[index])?,
                        equivalent_width: self.store.read_scaled(h, field::EQUIVALENT_WIDTH[index])?,
                        earth_sun_ratio: self.earth_sun_ratio,
                    };
                    if constants.irradiance <= 0.0 || constants.equivalent_width <= 0.0 {
                        return Err(self.corrupt_header(
                            field::SOLAR_IRRADIANCE[index],
                            "non-positive irradiance or equivalent width",
                        ));
                    }
                    let raw_gain = self.store.read_i32_array(h, field::PRELAUNCH_GAIN[index])?;
                    let gain = DualGain::from_raw(&raw_gain).ok_or_else(|| {
                        self.corrupt_header(field::PRELAUNCH_GAIN[index], "all-zero gain coefficients")
                    })?;
                    let calibrator = ReflectanceCalibrator::with_header_gain(constants, gain);
                    Ok((Calibrator::Reflectance(calibrator), None))
                }
                FormatFamily::Pod => {
                    let constants =
                        pod_visible_constants(self.spacecraft_code as u8, index, self.earth_sun_ratio)
                            .ok_or(self.unsupported_spacecraft())?;
                    let calibrator =
                        ReflectanceCalibrator::with_line_gain(constants, POD_SLOPE_SCALE, POD_INTERCEPT_SCALE);
                    Ok((Calibrator::Reflectance(calibrator), Some(CoefficientSource::Pod(channel.slot()))))
                }
            };
        }

        let index = channel.thermal_index().ok_or_else(mismatch)?;
        let scheme = IrScheme::for_format(self.family(), self.format_version, index);
        let coefficients = match (self.family(), scheme) {
            (FormatFamily::Pod, _) => CoefficientSource::Pod(channel.slot()),
            (FormatFamily::Klm, IrScheme::Quadratic { .. }) => CoefficientSource::KlmQuadratic(index),
            (FormatFamily::Klm, IrScheme::Linear { .. }) => CoefficientSource::KlmLinear(index),
        };
        let radiance = IrRadianceCalibrator::new(scheme);

        let calibrator = match kind {
            BandKind::IrRadiance => Calibrator::IrRadiance(radiance),
            _ => Calibrator::IrTemperature(IrTemperatureCalibrator { radiance, planck: self.planck(index)? }),
        };
        Ok((calibrator, Some(coefficients)))
    }

    fn planck(&self, index: usize) -> AvhrrResult<PlanckConstants> {
        match self.family() {
            FormatFamily::Klm => {
                let h = Record::Header;
                let planck = PlanckConstants {
                    wavenumber: self.store.read_scaled(h, field::CENTRAL_WAVENUMBER[index])?,
                    a: self.store.read_scaled(h, field::CONSTANT_1[index])?,
                    b: self.store.read_scaled(h, field::CONSTANT_2[index])?,
                };
                if planck.wavenumber <= 0.0 || planck.b == 0.0 {
                    return Err(
                        self.corrupt_header(field::CENTRAL_WAVENUMBER[index], "invalid Planck constants")
                    );
                }
                Ok(planck)
            }
            FormatFamily::Pod => {
                pod_planck_constants(self.spacecraft_code as u8, index).ok_or(self.unsupported_spacecraft())
            }
        }
    }

    fn unsupported_spacecraft(&self) -> AvhrrError {
        AvhrrError::UnsupportedVariant { field: "spacecraft id", value: self.spacecraft_code }
    }

    fn corrupt_header(&self, name: &str, reason: &str) -> AvhrrError {
        let offset = self
            .store
            .locate(Record::Header, name)
            .map(|(offset, _)| offset)
            .unwrap_or_else(|_| self.store.format().header_offset());
        AvhrrError::CorruptRecord { offset, reason: format!("{}: {}", name, reason) }
    }

    /// Geometry and Earth-location tie-point grids in product orientation
    pub fn tie_points(&self) -> AvhrrResult<TiePointGrids> {
        tie_points::extract(&self.store, self.orientation)
    }

    pub fn metadata(&self) -> AvhrrResult<MetadataElement> {
        let summary = ProductSummary {
            product_name: self.product_name.clone(),
            family: self.family(),
            format_version: self.format_version,
            spacecraft: self.spacecraft(),
            start_time: self.start_time,
            end_time: self.end_time,
            width: self.product_width(),
            height: self.product_height(),
            orientation: self.orientation,
            has_cloud_band: self.has_cloud_band,
        };
        metadata::assemble(&self.store, &summary)
    }

    /// Read several bands over the same window, one after another
    pub fn read_bands(
        &self,
        bands: &[(Option<Channel>, BandKind)],
        window: &Window,
    ) -> AvhrrResult<Vec<BandArray>> {
        bands
            .iter()
            .map(|&(channel, kind)| self.create_band_reader(channel, kind)?.read_array(window))
            .collect()
    }

    /// Read several bands over the same window concurrently
    #[cfg(feature = "parallel")]
    pub fn read_bands_parallel(
        &self,
        bands: &[(Option<Channel>, BandKind)],
        window: &Window,
    ) -> AvhrrResult<Vec<BandArray>> {
        use rayon::prelude::*;

        let readers = bands
            .iter()
            .map(|&(channel, kind)| self.create_band_reader(channel, kind))
            .collect::<AvhrrResult<Vec<_>>>()?;
        log::debug!("Reading {} bands in parallel", readers.len());
        readers.par_iter().map(|reader| reader.read_array(window)).collect()
    }
}
