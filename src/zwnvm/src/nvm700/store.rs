//! Emulated NVM3 object store over a contiguous byte region.
//!
//! The region holds the application instance at offset 0 and the protocol
//! instance behind it. A serialized object record is
//! `key u32 LE | length u32 LE | type u8 | payload`; records pack from the
//! instance base in ascending key order, unused space stays `0xFF`
//! (erased-flash convention) and a key reading `0xFFFFFFFF` terminates the
//! scan. A payload must fit in one page.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::NvmError;
use crate::report::Report;

use super::layout::{key_is_noderoutecache_v1, lookup_filename, ConfigShape, FileDescriptor, FsVersion};

pub const OBJECT_TYPE_DATA: u8 = 0;
pub const OBJECT_TYPE_COUNTER: u8 = 1;

/// Per-record overhead: key, length, type byte.
const RECORD_HEADER: usize = 9;

/// Store region sizes per hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub page_size: usize,
    pub application_size: usize,
    pub protocol_size: usize,
}

pub const GEOMETRY_700: Geometry = Geometry {
    page_size: 2 * 1024,
    application_size: 12 * 1024,
    protocol_size: 36 * 1024,
};

pub const GEOMETRY_800: Geometry = Geometry {
    page_size: 8 * 1024,
    application_size: 24 * 1024,
    protocol_size: 40 * 1024,
};

impl Geometry {
    pub fn total_size(&self) -> usize {
        self.application_size + self.protocol_size
    }

    /// Largest storable payload: one page minus the record header.
    pub fn max_object_size(&self) -> usize {
        self.page_size - RECORD_HEADER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instance {
    Application,
    Protocol,
}

#[derive(Debug, Clone)]
struct Object {
    object_type: u8,
    payload: Vec<u8>,
}

/// Two-instance object store for one conversion.
#[derive(Debug)]
pub struct ObjectStore {
    geometry: Geometry,
    application: BTreeMap<u32, Object>,
    protocol: BTreeMap<u32, Object>,
}

impl ObjectStore {
    /// Fresh store for writing; serializing an empty store yields an
    /// all-`0xFF` region.
    pub fn create(geometry: Geometry) -> Self {
        Self {
            geometry,
            application: BTreeMap::new(),
            protocol: BTreeMap::new(),
        }
    }

    /// Parse both instances out of an image. A short image reads as
    /// erased beyond its end.
    pub fn open(geometry: Geometry, image: &[u8]) -> Result<Self, NvmError> {
        if image.len() > geometry.total_size() {
            return Err(NvmError::ImageTooLarge);
        }
        let mut region = vec![0xFFu8; geometry.total_size()];
        region[..image.len()].copy_from_slice(image);

        let application =
            Self::parse_instance(&region[..geometry.application_size], &geometry)?;
        let protocol = Self::parse_instance(&region[geometry.application_size..], &geometry)?;
        Ok(Self {
            geometry,
            application,
            protocol,
        })
    }

    fn parse_instance(
        region: &[u8],
        geometry: &Geometry,
    ) -> Result<BTreeMap<u32, Object>, NvmError> {
        let mut objects = BTreeMap::new();
        let mut at = 0usize;
        while at + RECORD_HEADER <= region.len() {
            let key = LittleEndian::read_u32(&region[at..at + 4]);
            if key == 0xFFFF_FFFF {
                break;
            }
            let len = LittleEndian::read_u32(&region[at + 4..at + 8]) as usize;
            if len > geometry.max_object_size() || at + RECORD_HEADER + len > region.len() {
                return Err(NvmError::InvalidImage);
            }
            let object_type = region[at + 8];
            let payload = region[at + RECORD_HEADER..at + RECORD_HEADER + len].to_vec();
            objects.insert(
                key,
                Object {
                    object_type,
                    payload,
                },
            );
            at += RECORD_HEADER + len;
        }
        Ok(objects)
    }

    /// Serialize both instances back into one region.
    pub fn to_image(&self) -> Vec<u8> {
        let mut region = vec![0xFFu8; self.geometry.total_size()];
        Self::pack_instance(&mut region[..self.geometry.application_size], &self.application);
        Self::pack_instance(&mut region[self.geometry.application_size..], &self.protocol);
        region
    }

    fn pack_instance(region: &mut [u8], objects: &BTreeMap<u32, Object>) {
        let mut at = 0usize;
        for (&key, object) in objects {
            let end = at + RECORD_HEADER + object.payload.len();
            assert!(end <= region.len(), "object store instance overflow");
            LittleEndian::write_u32(&mut region[at..at + 4], key);
            LittleEndian::write_u32(
                &mut region[at + 4..at + 8],
                object.payload.len() as u32,
            );
            region[at + 8] = object.object_type;
            region[at + RECORD_HEADER..end].copy_from_slice(&object.payload);
            at = end;
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn instance(&self, instance: Instance) -> &BTreeMap<u32, Object> {
        match instance {
            Instance::Application => &self.application,
            Instance::Protocol => &self.protocol,
        }
    }

    pub fn contains(&self, instance: Instance, key: u32) -> bool {
        self.instance(instance).contains_key(&key)
    }

    /// Raw payload access without diagnostics; data objects only.
    pub fn read(&self, instance: Instance, key: u32) -> Option<&[u8]> {
        self.instance(instance)
            .get(&key)
            .filter(|o| o.object_type == OBJECT_TYPE_DATA)
            .map(|o| o.payload.as_slice())
    }

    /// Logged read of `len` bytes; short payloads zero-extend, long ones
    /// truncate. A miss in the v1 route-cache key range is a warning
    /// only; any other miss marks the report.
    pub fn read_logged(
        &self,
        instance: Instance,
        key: u32,
        len: usize,
        files: &[FileDescriptor],
        report: &mut Report,
    ) -> Option<Vec<u8>> {
        let filename = lookup_filename(key, files);
        match self.read(instance, key) {
            Some(payload) => {
                report.diag(format!(
                    "SUCCESS: nvm3_readData(key=0x{key:x}/{key}, len={len}) - filename: {filename}"
                ));
                let mut out = payload.to_vec();
                out.resize(len, 0);
                Some(out)
            }
            None if key_is_noderoutecache_v1(key) => {
                report.warning(format!(
                    "WARNING: nvm3_readData(key=0x{key:x}/{key}, len={len}) failed - filename: {filename}"
                ));
                None
            }
            None => {
                report.store_error(format!(
                    "ERROR: nvm3_readData(key=0x{key:x}/{key}, len={len}) failed - filename: {filename}"
                ));
                None
            }
        }
    }

    /// Logged write of a data object.
    pub fn write_logged(
        &mut self,
        instance: Instance,
        key: u32,
        payload: &[u8],
        files: &[FileDescriptor],
        report: &mut Report,
    ) {
        let len = payload.len();
        let filename = lookup_filename(key, files);
        if len > self.geometry.max_object_size() {
            report.store_error(format!(
                "ERROR: nvm3_writeData(key=0x{key:x}/{key}, len={len}) failed - filename: {filename}"
            ));
            return;
        }
        report.diag(format!(
            "SUCCESS: nvm3_writeData(key=0x{key:x}/{key}, len={len}) - filename: {filename}"
        ));
        let objects = match instance {
            Instance::Application => &mut self.application,
            Instance::Protocol => &mut self.protocol,
        };
        objects.insert(
            key,
            Object {
                object_type: OBJECT_TYPE_DATA,
                payload: payload.to_vec(),
            },
        );
    }

    /// Validity check: every non-optional file of the protocol table for
    /// `version`, and of the application table for the config shape the
    /// firmware triple selects, must exist as a data object of exactly
    /// the declared size. All files are checked; optional files are
    /// skipped entirely.
    pub fn check_files(
        &self,
        version: FsVersion,
        triple: (u8, u8, u8),
        report: &mut Report,
    ) -> bool {
        let shape = ConfigShape::select(triple.1, triple.2);
        let mut ok = self.check_file_list(Instance::Protocol, version.protocol_files(), report);
        ok &= self.check_file_list(
            Instance::Application,
            &super::layout::application_files(shape),
            report,
        );
        ok
    }

    fn check_file_list(
        &self,
        instance: Instance,
        files: &[FileDescriptor],
        report: &mut Report,
    ) -> bool {
        let mut ok = true;
        for f in files {
            if f.optional {
                continue;
            }
            match self.instance(instance).get(&f.key) {
                None => {
                    report.store_error(format!(
                        "ERROR nvm3 file {} (0x{:x}) not found",
                        f.name, f.key
                    ));
                    ok = false;
                }
                Some(o) if o.object_type != OBJECT_TYPE_DATA => {
                    report.store_error(format!(
                        "ERROR nvm3 file {} (0x{:x}) not of type DATA",
                        f.name, f.key
                    ));
                    ok = false;
                }
                Some(o) if o.payload.len() != f.size => {
                    report.store_error(format!(
                        "ERROR nvm3 file {} (0x{:x}) size is {}. The expected size is {}",
                        f.name,
                        f.key,
                        o.payload.len(),
                        f.size
                    ));
                    ok = false;
                }
                Some(_) => {}
            }
        }
        ok
    }

    /// Debug dump of one instance's keys with resolved names and a short
    /// payload preview.
    pub fn dump_keys(&self, instance: Instance, files: &[FileDescriptor], report: &mut Report) {
        for (&key, object) in self.instance(instance) {
            let preview = hex::encode(&object.payload[..object.payload.len().min(8)]);
            report.diag(format!(
                "0x{key:06x} ({key}) {} [{} bytes: {preview}]",
                lookup_filename(key, files),
                object.payload.len()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm700::layout::{FILE_ID_CONTROLLERINFO, FILE_ID_NODEROUTECAHE_V1};

    fn files() -> &'static [FileDescriptor] {
        FsVersion::V1.protocol_files()
    }

    #[test]
    fn test_empty_store_serializes_to_erased_region() {
        let store = ObjectStore::create(GEOMETRY_700);
        let image = store.to_image();
        assert_eq!(image.len(), GEOMETRY_700.total_size());
        assert!(image.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_read_round_trip_through_image() {
        let mut report = Report::new();
        let mut store = ObjectStore::create(GEOMETRY_700);
        store.write_logged(
            Instance::Protocol,
            FILE_ID_CONTROLLERINFO,
            &[1, 2, 3, 4, 5],
            files(),
            &mut report,
        );
        store.write_logged(Instance::Application, 200, &[0xAA; 512], files(), &mut report);
        assert!(!report.has_errors());

        let reopened = ObjectStore::open(GEOMETRY_700, &store.to_image()).unwrap();
        assert_eq!(
            reopened.read(Instance::Protocol, FILE_ID_CONTROLLERINFO),
            Some(&[1u8, 2, 3, 4, 5][..])
        );
        assert_eq!(reopened.read(Instance::Application, 200).unwrap().len(), 512);
        assert_eq!(reopened.read(Instance::Application, FILE_ID_CONTROLLERINFO), None);
    }

    #[test]
    fn test_oversized_object_is_rejected() {
        let mut report = Report::new();
        let mut store = ObjectStore::create(GEOMETRY_700);
        let too_big = vec![0u8; GEOMETRY_700.max_object_size() + 1];
        store.write_logged(Instance::Protocol, 0x50000, &too_big, files(), &mut report);
        assert_eq!(report.store_errors(), 1);
        assert!(!store.contains(Instance::Protocol, 0x50000));
    }

    #[test]
    fn test_missing_key_read_is_a_store_error() {
        let mut report = Report::new();
        let store = ObjectStore::create(GEOMETRY_700);
        assert!(store
            .read_logged(Instance::Protocol, FILE_ID_CONTROLLERINFO, 13, files(), &mut report)
            .is_none());
        assert_eq!(report.store_errors(), 1);
        assert!(report.contains("FILE_ID_CONTROLLERINFO"));
    }

    #[test]
    fn test_missing_v1_route_cache_is_only_a_warning() {
        let mut report = Report::new();
        let store = ObjectStore::create(GEOMETRY_700);
        assert!(store
            .read_logged(
                Instance::Protocol,
                FILE_ID_NODEROUTECAHE_V1 + 3,
                80,
                files(),
                &mut report
            )
            .is_none());
        assert!(!report.has_errors());
        assert!(report.contains("WARNING:"));
        assert!(report.contains("FILE_ID_NODEROUTECAHE_V1 (node_id: 4)"));
    }

    #[test]
    fn test_check_files_reports_missing_type_and_size() {
        let mut report = Report::new();
        let mut store = ObjectStore::create(GEOMETRY_700);
        // Wrong size for the controller info record.
        store.write_logged(
            Instance::Protocol,
            FILE_ID_CONTROLLERINFO,
            &[0; 12],
            files(),
            &mut report,
        );
        let mut report = Report::new();
        assert!(!store.check_files(FsVersion::V1, (7, 12, 0), &mut report));
        assert!(report.contains("ERROR nvm3 file FILE_ID_ZW_VERSION (0x50000) not found"));
        assert!(report.contains(
            "ERROR nvm3 file FILE_ID_CONTROLLERINFO (0x50004) size is 12. The expected size is 13"
        ));
    }

    #[test]
    fn test_truncated_record_fails_open() {
        let mut region = vec![0xFFu8; GEOMETRY_700.total_size()];
        // Record header claiming more payload than a page can hold.
        LittleEndian::write_u32(&mut region[0..4], 42);
        LittleEndian::write_u32(&mut region[4..8], 3000);
        assert!(matches!(
            ObjectStore::open(GEOMETRY_700, &region),
            Err(NvmError::InvalidImage)
        ));
    }
}
