//! Supported controller formats and codec dispatch.
//!
//! A format name picks everything a conversion needs: which codec reads
//! the image (flat descriptor layout or NVM3 object store), the store
//! geometry, and the file-system revision plus firmware triple an import
//! stamps into the output. The set is closed; an unknown name is a
//! caller error surfaced before any file is touched.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::NvmError;
use crate::nvm500::{self, layout as flat, Layout};
use crate::nvm700::{self, import::Target, store, FsVersion, Geometry};
use crate::report::Report;

/// One supported controller format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Bridge800s718,
    Bridge800s717,
    Bridge700s718,
    Bridge700s717,
    Bridge716,
    Bridge715,
    Bridge712,
    Bridge711,
    Bridge68,
    Bridge67,
    Bridge66,
    Static68,
    Static67,
    Static66,
}

/// Every format, in catalog order.
pub const FORMATS: [Format; 14] = [
    Format::Bridge800s718,
    Format::Bridge800s717,
    Format::Bridge700s718,
    Format::Bridge700s717,
    Format::Bridge716,
    Format::Bridge715,
    Format::Bridge712,
    Format::Bridge711,
    Format::Bridge68,
    Format::Bridge67,
    Format::Bridge66,
    Format::Static68,
    Format::Static67,
    Format::Static66,
];

/// Which codec a format dispatches to.
enum Codec {
    Flat(&'static once_cell::sync::Lazy<Layout>),
    Store(Target),
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Bridge800s718 => "bridge_800s_7.18",
            Format::Bridge800s717 => "bridge_800s_7.17",
            Format::Bridge700s718 => "bridge_700s_7.18",
            Format::Bridge700s717 => "bridge_700s_7.17",
            Format::Bridge716 => "bridge7.16",
            Format::Bridge715 => "bridge7.15",
            Format::Bridge712 => "bridge7.12",
            Format::Bridge711 => "bridge7.11",
            Format::Bridge68 => "bridge6.8",
            Format::Bridge67 => "bridge6.7",
            Format::Bridge66 => "bridge6.6",
            Format::Static68 => "static6.8",
            Format::Static67 => "static6.7",
            Format::Static66 => "static6.6",
        }
    }

    /// The human-readable converter identification printed by the CLI.
    pub fn converter_id(self) -> &'static str {
        match self {
            Format::Bridge800s718 | Format::Bridge700s718 => {
                "NVM Converter for Z-Wave Bridge 7.18"
            }
            Format::Bridge800s717 | Format::Bridge700s717 => {
                "NVM Converter for Z-Wave Bridge 7.17"
            }
            Format::Bridge716 => "NVM Converter for Z-Wave Bridge 7.16",
            Format::Bridge715 => "NVM Converter for Z-Wave Bridge 7.15",
            Format::Bridge712 => "NVM Converter for Z-Wave Bridge 7.12",
            Format::Bridge711 => "NVM Converter for Z-Wave Bridge 7.11",
            Format::Bridge68 => "NVM Converter for Z-Wave Bridge 6.80",
            Format::Bridge67 => "NVM Converter for Z-Wave Bridge 6.70",
            Format::Bridge66 => "NVM Converter for Z-Wave Bridge 6.60",
            Format::Static68 => "NVM Converter for Z-Wave Static 6.80",
            Format::Static67 => "NVM Converter for Z-Wave Static 6.70",
            Format::Static66 => "NVM Converter for Z-Wave Static 6.60",
        }
    }

    fn codec(self) -> Codec {
        let store = |version, triple, geometry| {
            Codec::Store(Target {
                version,
                triple,
                geometry,
            })
        };
        match self {
            Format::Bridge800s718 => store(FsVersion::V4, (7, 18, 1), store::GEOMETRY_800),
            Format::Bridge800s717 => store(FsVersion::V4, (7, 17, 1), store::GEOMETRY_800),
            Format::Bridge700s718 => store(FsVersion::V4, (7, 18, 1), store::GEOMETRY_700),
            Format::Bridge700s717 => store(FsVersion::V4, (7, 17, 1), store::GEOMETRY_700),
            Format::Bridge716 => store(FsVersion::V3, (7, 16, 1), store::GEOMETRY_700),
            Format::Bridge715 => store(FsVersion::V2, (7, 15, 2), store::GEOMETRY_700),
            Format::Bridge712 => store(FsVersion::V1, (7, 12, 0), store::GEOMETRY_700),
            Format::Bridge711 => store(FsVersion::V0, (7, 11, 0), store::GEOMETRY_700),
            Format::Bridge68 => Codec::Flat(&flat::BRIDGE_6_8),
            Format::Bridge67 => Codec::Flat(&flat::BRIDGE_6_7),
            Format::Bridge66 => Codec::Flat(&flat::BRIDGE_6_6),
            Format::Static68 => Codec::Flat(&flat::STATIC_6_8),
            Format::Static67 => Codec::Flat(&flat::STATIC_6_7),
            Format::Static66 => Codec::Flat(&flat::STATIC_6_6),
        }
    }

    /// The object-store geometry, for store-backed formats.
    pub fn geometry(self) -> Option<Geometry> {
        match self.codec() {
            Codec::Store(target) => Some(target.geometry),
            Codec::Flat(_) => None,
        }
    }

    /// Check an image against this format without converting it.
    pub fn validate(self, image: &[u8], report: &mut Report) -> bool {
        match self.codec() {
            Codec::Flat(layout) => nvm500::validate(layout, image, report),
            Codec::Store(target) => nvm700::validate(target.geometry, image, report),
        }
    }

    /// Convert an image of this format to its JSON snapshot.
    pub fn export(self, image: &[u8], report: &mut Report) -> Result<Value, NvmError> {
        match self.codec() {
            Codec::Flat(layout) => nvm500::export(layout, image, report),
            Codec::Store(target) => nvm700::export(target.geometry, image, report),
        }
    }

    /// Build an image of this format from a JSON snapshot.
    pub fn import(self, doc: &Value, report: &mut Report) -> Result<Vec<u8>, NvmError> {
        match self.codec() {
            Codec::Flat(layout) => nvm500::import(layout, doc, report),
            Codec::Store(target) => nvm700::import(target, doc, report),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A format name outside the supported catalog.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FORMATS
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}
