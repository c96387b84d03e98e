//! Byte-level access: layouts, format detection, record store and the file facade

pub mod codes;
pub mod detect;
pub mod layout;
pub mod reader;
pub mod source;
pub mod store;

// Re-export main types
pub use detect::{detect, detect_with_config, DetectedFormat, ReaderConfig};
pub use layout::FileLayout;
pub use reader::AvhrrFile;
pub use source::{ByteSource, FileSource, MemorySource};
pub use store::{Record, ScanLine, ScanLineStore};
