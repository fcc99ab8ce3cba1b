//! Library error types.

use thiserror::Error;

use crate::report::Report;

#[derive(Error, Debug)]
pub enum NvmError {
    /// The image failed the fixed-marker validity check of the flat codec.
    #[error("NVM image is not valid")]
    InvalidImage,

    /// The image is larger than the 64 KiB flat working buffer.
    #[error("NVM image exceeds buffer size")]
    ImageTooLarge,

    /// The object-store version object names a file-system revision this
    /// converter has no table for.
    #[error("Conversion of protocol file system v:{0} is not supported")]
    UnsupportedFileSystem(u8),

    /// A required object could not be read from the store.
    #[error("nvm3 object 0x{key:x} unreadable")]
    ObjectUnreadable { key: u32 },

    /// The conversion ran to the end but the accumulated report carries
    /// errors; no image or JSON is produced.
    #[error("conversion failed: {} parse error(s), {} nvm3 error(s)",
            report.parse_errors(), report.store_errors())]
    ConversionFailed { report: Report },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
