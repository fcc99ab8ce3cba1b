//! Flat descriptor codec for 500-series controller EEPROM images.
//!
//! The 500-series protocol keeps every variable at a fixed offset; the
//! offsets differ per controller role and firmware line, so each of the
//! six supported targets carries its own field table (see [`layout`]).
//! Scalars are big-endian. Validity hangs on four marker bytes that the
//! firmware writes once the EEPROM area has been initialised.

pub mod export;
pub mod import;
pub mod layout;

use crate::error::NvmError;
use crate::report::Report;

pub use export::export;
pub use import::import;
pub use layout::Layout;

/// Copy the image into a zeroed 64 KiB working buffer.
fn load_image(image: &[u8], report: &mut Report) -> Result<Vec<u8>, NvmError> {
    if image.len() > layout::IMAGE_CEILING {
        report.store_error("NVM image exceeds buffer size");
        return Err(NvmError::ImageTooLarge);
    }
    let mut buf = vec![0u8; layout::IMAGE_CEILING];
    buf[..image.len()].copy_from_slice(image);
    Ok(buf)
}

/// Check the four fixed marker bytes of a flat image.
pub fn validate(layout: &Layout, image: &[u8], report: &mut Report) -> bool {
    let Ok(buf) = load_image(image, report) else {
        return false;
    };
    let marker = |name: &str| buf[layout.field(name).offset];
    let valid = marker("app_magic") == layout::MAGIC_VALUE
        && marker("config_valid") == layout::CONFIGURATION_VALID_0
        && marker("config_really_valid") == layout::CONFIGURATION_VALID_1
        && marker("route_cache_magic") == layout::ROUTECACHE_VALID;
    if !valid {
        report.store_error("NVM image is not valid");
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;

    #[test]
    fn test_validate_rejects_oversized_image() {
        let mut report = Report::new();
        let image = vec![0u8; layout::IMAGE_CEILING + 1];
        assert!(!validate(&layout::BRIDGE_6_8, &image, &mut report));
        assert!(report.contains("NVM image exceeds buffer size"));
    }

    #[test]
    fn test_validate_requires_all_four_markers() {
        let layout = &*layout::BRIDGE_6_8;
        let mut buf = vec![0u8; layout.image_size()];
        buf[layout.field("app_magic").offset] = layout::MAGIC_VALUE;
        buf[layout.field("config_valid").offset] = layout::CONFIGURATION_VALID_0;
        buf[layout.field("config_really_valid").offset] = layout::CONFIGURATION_VALID_1;

        let mut report = Report::new();
        assert!(!validate(layout, &buf, &mut report));
        assert!(report.contains("NVM image is not valid"));

        buf[layout.field("route_cache_magic").offset] = layout::ROUTECACHE_VALID;
        let mut report = Report::new();
        assert!(validate(layout, &buf, &mut report));
        assert!(!report.has_errors());
    }
}
