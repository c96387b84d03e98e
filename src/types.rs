use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fill value written into float bands for pixels without a valid sample
pub const NO_DATA_VALUE: f32 = -1.0;

/// Fill value written into byte bands (flags, cloud mask)
pub const NO_DATA_BYTE: u8 = 0;

/// AVHRR channel as exposed to band consumers.
///
/// Channels 3a and 3b share one physical slot in the video data; which of
/// the two is active is decided per scan line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Ch1,
    Ch2,
    Ch3a,
    Ch3b,
    Ch4,
    Ch5,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Ch1,
        Channel::Ch2,
        Channel::Ch3a,
        Channel::Ch3b,
        Channel::Ch4,
        Channel::Ch5,
    ];

    /// Position of the channel inside the five-sample pixel interleave
    pub fn slot(self) -> usize {
        match self {
            Channel::Ch1 => 0,
            Channel::Ch2 => 1,
            Channel::Ch3a | Channel::Ch3b => 2,
            Channel::Ch4 => 3,
            Channel::Ch5 => 4,
        }
    }

    /// Index among the visible channels (1, 2, 3a)
    pub fn visible_index(self) -> Option<usize> {
        match self {
            Channel::Ch1 => Some(0),
            Channel::Ch2 => Some(1),
            Channel::Ch3a => Some(2),
            _ => None,
        }
    }

    /// Index among the thermal channels (3b, 4, 5)
    pub fn thermal_index(self) -> Option<usize> {
        match self {
            Channel::Ch3b => Some(0),
            Channel::Ch4 => Some(1),
            Channel::Ch5 => Some(2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Ch1 => write!(f, "1"),
            Channel::Ch2 => write!(f, "2"),
            Channel::Ch3a => write!(f, "3a"),
            Channel::Ch3b => write!(f, "3b"),
            Channel::Ch4 => write!(f, "4"),
            Channel::Ch5 => write!(f, "5"),
        }
    }
}

/// What a band reader produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandKind {
    /// Reflectance in percent (channels 1, 2, 3a)
    Reflectance,
    /// Radiance in mW/(m^2 sr cm^-1) (channels 3b, 4, 5)
    IrRadiance,
    /// Brightness temperature in K (channels 3b, 4, 5)
    IrTemperature,
    /// Per scan line quality flags, replicated over the line
    Flags,
    /// CLAVR cloud mask class per pixel
    CloudMask,
}

/// Sample type of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    UInt8,
    Float32,
}

/// Ground-format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatFamily {
    /// Legacy format (TIROS-N to NOAA-14)
    Pod,
    /// NOAA-15 onwards and MetOp
    Klm,
}

impl std::fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatFamily::Pod => write!(f, "POD"),
            FormatFamily::Klm => write!(f, "KLM"),
        }
    }
}

/// Bits per sensor count in the video block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelPacking {
    Bits8,
    Bits10,
    Bits16,
}

impl PixelPacking {
    pub const ALL: [PixelPacking; 3] = [PixelPacking::Bits8, PixelPacking::Bits10, PixelPacking::Bits16];

    pub fn bits(self) -> u32 {
        match self {
            PixelPacking::Bits8 => 8,
            PixelPacking::Bits10 => 10,
            PixelPacking::Bits16 => 16,
        }
    }

    /// Byte length of a video block holding `samples` counts
    pub fn video_bytes(self, samples: usize) -> usize {
        match self {
            PixelPacking::Bits8 => samples,
            PixelPacking::Bits16 => samples * 2,
            // three samples per 32-bit word
            PixelPacking::Bits10 => samples.div_ceil(3) * 4,
        }
    }
}

/// Full resolution (HRPT/LAC) vs. global area coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductDimension {
    Hrpt,
    Gac,
}

impl ProductDimension {
    pub const ALL: [ProductDimension; 2] = [ProductDimension::Hrpt, ProductDimension::Gac];
}

/// Direction of the satellite during the pass, fixed at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Northbound,
    Southbound,
}

/// Error types for AVHRR decoding
#[derive(Debug, thiserror::Error)]
pub enum AvhrrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a recognised AVHRR Level-1B layout: {0}")]
    Detection(String),

    #[error("Unsupported {field}: {value}")]
    UnsupportedVariant { field: &'static str, value: i64 },

    #[error("Corrupt record at byte offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Scan line {index} out of range (file has {count} scan lines)")]
    OutOfRange { index: usize, count: usize },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Read cancelled after {lines_read} scan lines")]
    Cancelled { lines_read: usize },
}

impl AvhrrError {
    /// True when another decoder may still accept the file
    pub fn is_detection_failure(&self) -> bool {
        matches!(self, AvhrrError::Detection(_))
    }
}

/// Result type for AVHRR operations
pub type AvhrrResult<T> = Result<T, AvhrrError>;

/// UTC instant from a year, 1-based day of year and millisecond of day
pub fn utc_from_day_of_year(year: i32, day_of_year: u32, millis: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_yo_opt(year, day_of_year)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc) + Duration::milliseconds(i64::from(millis)))
}
