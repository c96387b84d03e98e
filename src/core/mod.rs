//! Core decoding modules

pub mod band;
pub mod calibrate;
pub mod metadata;
pub mod tie_points;
pub mod unpack;
pub mod window;

// Re-export main types
pub use band::{BandArray, BandReader, CancellationFlag, NullProgress, ProgressMonitor, RasterBuffer};
pub use calibrate::{CalibrationCoefficients, Calibrator};
pub use metadata::{AttributeValue, MetadataAttribute, MetadataElement};
pub use tie_points::{TiePointGrid, TiePointGrids};
pub use window::{RawCoordinates, Window};
