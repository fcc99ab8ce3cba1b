//! # zwnvm
//!
//! Z-Wave controller NVM codec library - binary image export/import and
//! cross-generation migration.
//!
//! This library provides functionality to:
//! - Validate raw controller NVM images (500-series flat layouts and
//!   700/800-series NVM3 object stores, file-system revisions v0..v4)
//! - Export an NVM image to a stable JSON snapshot
//! - Import such a JSON snapshot back into a binary image, possibly
//!   targeting a newer firmware generation than the one it came from
//!
//! ## Example
//!
//! ```no_run
//! use std::fs;
//! use zwnvm::{Format, Report};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = fs::read("controller.nvm")?;
//! let format: Format = "bridge7.15".parse()?;
//!
//! let mut report = Report::new();
//! if format.validate(&image, &mut report) {
//!     let json = format.export(&image, &mut report)?;
//!     fs::write("backup.json", serde_json::to_string_pretty(&json)?)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod json;
pub mod mask;
pub mod nvm500;
pub mod nvm700;
pub mod report;

// Re-export commonly used items
#[doc(inline)]
pub use error::NvmError;
#[doc(inline)]
pub use format::{Format, UnknownFormat, FORMATS};
#[doc(inline)]
pub use mask::{ClassicNodeMask, LongRangeNodeMask, NodeMask};
#[doc(inline)]
pub use report::{Report, Severity};
