//! Object-store codec for 700/800-series controller NVM images.
//!
//! Newer controllers persist their state as keyed files in an NVM3 object
//! store. The store region holds two instances, application first and
//! protocol behind it; [`store`] emulates the on-chip store over a plain
//! byte region. The protocol file set changed five times (file-system
//! revisions v0..v4, [`layout`]); the packed per-file record layouts live
//! in [`records`].

pub mod export;
pub mod import;
pub mod layout;
pub mod records;
pub mod store;

pub use export::export;
pub use import::import;
pub use layout::FsVersion;
pub use store::{Geometry, Instance, ObjectStore};

use crate::error::NvmError;
use crate::report::Report;

/// Open the store and check the file inventory of the revision named by
/// the image's protocol version object.
pub fn validate(geometry: Geometry, image: &[u8], report: &mut Report) -> bool {
    let store = match ObjectStore::open(geometry, image) {
        Ok(store) => store,
        Err(err) => {
            report.store_error(err.to_string());
            return false;
        }
    };
    match export::image_version(&store, report) {
        Ok((version, triple)) => store.check_files(version, triple, report),
        Err(err @ NvmError::UnsupportedFileSystem(_)) => {
            report.store_error(format!("ERROR: {err}"));
            false
        }
        // A missing or unreadable version object is recorded by
        // image_version itself.
        Err(_) => false,
    }
}
