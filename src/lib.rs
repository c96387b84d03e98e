//! avhrr-l1b: A Fast, Modular NOAA/MetOp AVHRR Level-1B Decoder
//!
//! Reads the fixed-format binary Level-1B products of the AVHRR
//! instrument in both ground-format generations (POD and KLM), with or
//! without an archive header, in 8-, 10- and 16-bit packing and at full
//! (HRPT/LAC) or global (GAC) resolution. Bands are decoded on demand,
//! one scan line at a time, into calibrated reflectance, radiance or
//! brightness temperature.
//!
//! ```no_run
//! use avhrr::{AvhrrFile, BandKind, Channel, Window};
//!
//! let file = AvhrrFile::open_path("NSS.HRPT.NN.D03045.S0102.E0114.B1234567.GC")?;
//! let reader = file.create_band_reader(Some(Channel::Ch4), BandKind::IrTemperature)?;
//! let window = Window::full(file.product_width(), file.product_height()).with_steps(4, 4);
//! let temperatures = reader.read_array(&window)?;
//! # Ok::<(), avhrr::AvhrrError>(())
//! ```

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AvhrrError, AvhrrResult, BandKind, Channel, FormatFamily, Orientation, PixelPacking, ProductDimension,
    SampleType, NO_DATA_BYTE, NO_DATA_VALUE,
};

pub use crate::core::{
    BandArray, BandReader, CancellationFlag, MetadataElement, NullProgress, ProgressMonitor, RasterBuffer,
    TiePointGrids, Window,
};
pub use io::{detect, detect_with_config, AvhrrFile, ByteSource, DetectedFormat, FileSource, MemorySource, ReaderConfig};
