//! File tables for the five object-store revisions plus the application
//! file set.
//!
//! A file descriptor covers either a single key or a contiguous key range
//! (one file per node group). Optional files are skipped by the validity
//! check entirely; everything else must exist with exactly the declared
//! size. The misspelled `NODEROUTECAHE` names are the wire-level names
//! reported by every shipped converter and stay as-is.

use once_cell::sync::Lazy;

/// Protocol-instance keys.
pub const FILE_ID_ZW_VERSION: u32 = 0x50000;
pub const FILE_ID_PREFERREDREPEATERS: u32 = 0x50002;
pub const FILE_ID_SUCNODELIST: u32 = 0x50003;
pub const FILE_ID_CONTROLLERINFO: u32 = 0x50004;
pub const FILE_ID_NODE_STORAGE_EXIST: u32 = 0x50005;
pub const FILE_ID_APP_ROUTE_LOCK_FLAG: u32 = 0x50006;
pub const FILE_ID_ROUTE_SLAVE_SUC_FLAG: u32 = 0x50007;
pub const FILE_ID_SUC_PENDING_UPDATE_FLAG: u32 = 0x50008;
pub const FILE_ID_BRIDGE_NODE_FLAG: u32 = 0x50009;
pub const FILE_ID_PENDING_DISCOVERY_FLAG: u32 = 0x5000A;
pub const FILE_ID_NODE_ROUTECACHE_EXIST: u32 = 0x5000B;
pub const FILE_ID_LRANGE_NODE_EXIST: u32 = 0x5000C;
pub const FILE_ID_S2_KEYS: u32 = 0x50010;
pub const FILE_ID_S2_KEYCLASSES_ASSIGNED: u32 = 0x50011;
pub const FILE_ID_S2_MPAN: u32 = 0x50012;
pub const FILE_ID_S2_SPAN: u32 = 0x50013;
pub const FILE_ID_NODEINFO: u32 = 0x50100;
pub const FILE_ID_NODEINFO_V1: u32 = 0x50200;
pub const FILE_ID_NODEROUTECAHE: u32 = 0x50400;
pub const FILE_ID_NODEROUTECAHE_V1: u32 = 0x51400;
pub const FILE_ID_NODEINFO_LR: u32 = 0x50800;
pub const FILE_ID_LR_TX_POWER_V2: u32 = 0x50014;
pub const FILE_ID_LR_TX_POWER_V3: u32 = 0x52000;

/// Application-instance keys.
pub const ZAF_FILE_ID_APP_VERSION: u32 = 0x51000;
pub const FILE_ID_APPLICATIONSETTINGS: u32 = 102;
pub const FILE_ID_APPLICATIONCMDINFO: u32 = 103;
pub const FILE_ID_APPLICATIONCONFIGURATION: u32 = 104;
pub const FILE_ID_APPLICATIONDATA: u32 = 200;

pub const NUMBER_OF_NODEINFO_FILES: u32 = 232;
pub const NUMBER_OF_NODEINFO_V1_FILES: u32 = 58;
pub const NUMBER_OF_NODEROUTECACHE_FILES: u32 = 232;
pub const NUMBER_OF_NODEROUTECACHE_V1_FILES: u32 = 29;
pub const NUMBER_OF_NODEINFO_LR_FILES: u32 = 20;
pub const NUMBER_OF_LR_TX_POWER_V2_FILES: u32 = 16;
pub const NUMBER_OF_LR_TX_POWER_V3_FILES: u32 = 32;

/// Nodes packed per key in the ranged files.
pub const NODEINFO_V1_PER_FILE: u32 = 4;
pub const NODEROUTECACHE_V1_PER_FILE: u32 = 8;
pub const NODEINFO_LR_PER_FILE: u32 = 50;

#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    pub key: u32,
    pub name: &'static str,
    pub size: usize,
    pub optional: bool,
    /// 0 for a single key; otherwise the number of keys in the range.
    pub num_keys: u32,
}

const fn file(key: u32, name: &'static str, size: usize) -> FileDescriptor {
    FileDescriptor {
        key,
        name,
        size,
        optional: false,
        num_keys: 0,
    }
}

const fn optional(key: u32, name: &'static str, size: usize) -> FileDescriptor {
    FileDescriptor {
        key,
        name,
        size,
        optional: true,
        num_keys: 0,
    }
}

const fn ranged(key: u32, name: &'static str, size: usize, num_keys: u32) -> FileDescriptor {
    FileDescriptor {
        key,
        name,
        size,
        optional: true,
        num_keys,
    }
}

/// Object-store file-system revision, from the top byte of the protocol
/// version file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FsVersion {
    V0,
    V1,
    V2,
    V3,
    V4,
}

impl FsVersion {
    pub fn from_format_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FsVersion::V0),
            1 => Some(FsVersion::V1),
            2 => Some(FsVersion::V2),
            3 => Some(FsVersion::V3),
            4 => Some(FsVersion::V4),
            _ => None,
        }
    }

    pub fn format_byte(self) -> u8 {
        match self {
            FsVersion::V0 => 0,
            FsVersion::V1 => 1,
            FsVersion::V2 => 2,
            FsVersion::V3 => 3,
            FsVersion::V4 => 4,
        }
    }

    /// Long-range node support arrived with v2.
    pub fn has_long_range(self) -> bool {
        self >= FsVersion::V2
    }

    /// v0 keeps one node-info record per key; v1 onward packs four.
    pub fn packed_nodeinfo(self) -> bool {
        self >= FsVersion::V1
    }

    pub fn controllerinfo_size(self) -> usize {
        if self >= FsVersion::V2 {
            22
        } else {
            13
        }
    }

    pub fn protocol_files(self) -> &'static [FileDescriptor] {
        match self {
            FsVersion::V0 => &PROTOCOL_FILES_V0,
            FsVersion::V1 => &PROTOCOL_FILES_V1,
            FsVersion::V2 => &PROTOCOL_FILES_V2,
            FsVersion::V3 => &PROTOCOL_FILES_V3,
            FsVersion::V4 => &PROTOCOL_FILES_V4,
        }
    }
}

fn protocol_files(version: FsVersion) -> Vec<FileDescriptor> {
    let mut files = vec![
        file(FILE_ID_ZW_VERSION, "FILE_ID_ZW_VERSION", 4),
        optional(FILE_ID_PREFERREDREPEATERS, "FILE_ID_PREFERREDREPEATERS", 29),
        file(FILE_ID_SUCNODELIST, "FILE_ID_SUCNODELIST", 1408),
        file(
            FILE_ID_CONTROLLERINFO,
            "FILE_ID_CONTROLLERINFO",
            version.controllerinfo_size(),
        ),
        file(FILE_ID_NODE_STORAGE_EXIST, "FILE_ID_NODE_STORAGE_EXIST", 29),
        file(FILE_ID_APP_ROUTE_LOCK_FLAG, "FILE_ID_APP_ROUTE_LOCK_FLAG", 29),
        file(FILE_ID_ROUTE_SLAVE_SUC_FLAG, "FILE_ID_ROUTE_SLAVE_SUC_FLAG", 29),
        file(
            FILE_ID_SUC_PENDING_UPDATE_FLAG,
            "FILE_ID_SUC_PENDING_UPDATE_FLAG",
            29,
        ),
        file(FILE_ID_BRIDGE_NODE_FLAG, "FILE_ID_BRIDGE_NODE_FLAG", 29),
        file(
            FILE_ID_PENDING_DISCOVERY_FLAG,
            "FILE_ID_PENDING_DISCOVERY_FLAG",
            29,
        ),
        file(
            FILE_ID_NODE_ROUTECACHE_EXIST,
            "FILE_ID_NODE_ROUTECACHE_EXIST",
            29,
        ),
    ];

    if version.has_long_range() {
        files.push(file(FILE_ID_LRANGE_NODE_EXIST, "FILE_ID_LRANGE_NODE_EXIST", 128));
    }
    if version < FsVersion::V2 {
        files.push(optional(FILE_ID_S2_KEYS, "FILE_ID_S2_KEYS", 0));
        files.push(optional(
            FILE_ID_S2_KEYCLASSES_ASSIGNED,
            "FILE_ID_S2_KEYCLASSES_ASSIGNED",
            0,
        ));
        files.push(optional(FILE_ID_S2_MPAN, "FILE_ID_S2_MPAN", 0));
        files.push(optional(FILE_ID_S2_SPAN, "FILE_ID_S2_SPAN", 0));
    }

    if version.packed_nodeinfo() {
        files.push(ranged(
            FILE_ID_NODEINFO_V1,
            "FILE_ID_NODEINFO_V1",
            140,
            NUMBER_OF_NODEINFO_V1_FILES,
        ));
        files.push(ranged(
            FILE_ID_NODEROUTECAHE_V1,
            "FILE_ID_NODEROUTECAHE_V1",
            80,
            NUMBER_OF_NODEROUTECACHE_V1_FILES,
        ));
    } else {
        files.push(ranged(
            FILE_ID_NODEINFO,
            "FILE_ID_NODEINFO",
            35,
            NUMBER_OF_NODEINFO_FILES,
        ));
        files.push(ranged(
            FILE_ID_NODEROUTECAHE,
            "FILE_ID_NODEROUTECAHE",
            10,
            NUMBER_OF_NODEROUTECACHE_FILES,
        ));
    }
    if version.has_long_range() {
        files.push(ranged(
            FILE_ID_NODEINFO_LR,
            "FILE_ID_NODEINFO_LR",
            150,
            NUMBER_OF_NODEINFO_LR_FILES,
        ));
    }
    if version == FsVersion::V2 {
        files.push(ranged(
            FILE_ID_LR_TX_POWER_V2,
            "FILE_ID_LR_TX_POWER_V2",
            32,
            NUMBER_OF_LR_TX_POWER_V2_FILES,
        ));
    }
    if version == FsVersion::V3 {
        files.push(ranged(
            FILE_ID_LR_TX_POWER_V3,
            "FILE_ID_LR_TX_POWER_V3",
            32,
            NUMBER_OF_LR_TX_POWER_V3_FILES,
        ));
    }
    files
}

static PROTOCOL_FILES_V0: Lazy<Vec<FileDescriptor>> = Lazy::new(|| protocol_files(FsVersion::V0));
static PROTOCOL_FILES_V1: Lazy<Vec<FileDescriptor>> = Lazy::new(|| protocol_files(FsVersion::V1));
static PROTOCOL_FILES_V2: Lazy<Vec<FileDescriptor>> = Lazy::new(|| protocol_files(FsVersion::V2));
static PROTOCOL_FILES_V3: Lazy<Vec<FileDescriptor>> = Lazy::new(|| protocol_files(FsVersion::V3));
static PROTOCOL_FILES_V4: Lazy<Vec<FileDescriptor>> = Lazy::new(|| protocol_files(FsVersion::V4));

/// `FILE_ID_APPLICATIONCONFIGURATION` record shape, selected by the
/// application firmware version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigShape {
    /// 3 bytes: rfRegion, txPower i8, power0dbmMeasured i8.
    Pre7_15_3,
    /// 6 bytes: adds enablePTI and maxTxPower i16 LE.
    Pre7_18_1,
    /// 8 bytes: txPower and power0dbmMeasured widen to i16 LE.
    Current,
}

impl ConfigShape {
    pub fn select(minor: u8, patch: u8) -> Self {
        let past_7_15_3 = minor >= 16 || (minor == 15 && patch >= 3);
        let past_7_18_1 = minor >= 19 || (minor == 18 && patch >= 1);
        if !past_7_15_3 {
            ConfigShape::Pre7_15_3
        } else if !past_7_18_1 {
            ConfigShape::Pre7_18_1
        } else {
            ConfigShape::Current
        }
    }

    pub fn size(self) -> usize {
        match self {
            ConfigShape::Pre7_15_3 => 3,
            ConfigShape::Pre7_18_1 => 6,
            ConfigShape::Current => 8,
        }
    }
}

/// Application file table for a given configuration shape.
pub fn application_files(shape: ConfigShape) -> Vec<FileDescriptor> {
    vec![
        file(ZAF_FILE_ID_APP_VERSION, "ZAF_FILE_ID_APP_VERSION", 4),
        file(FILE_ID_APPLICATIONSETTINGS, "FILE_ID_APPLICATIONSETTINGS", 3),
        file(FILE_ID_APPLICATIONCMDINFO, "FILE_ID_APPLICATIONCMDINFO", 108),
        file(
            FILE_ID_APPLICATIONCONFIGURATION,
            "FILE_ID_APPLICATIONCONFIGURATION",
            shape.size(),
        ),
        file(FILE_ID_APPLICATIONDATA, "FILE_ID_APPLICATIONDATA", 512),
    ]
}

/// Human name for a key: ranged files append ` (node_id: N)` with `N`
/// relative to the range base.
pub fn lookup_filename(key: u32, files: &[FileDescriptor]) -> String {
    for f in files {
        if f.key == key && f.num_keys == 0 {
            return f.name.to_string();
        }
        if f.num_keys > 0 && f.key <= key && key < f.key + f.num_keys {
            return format!("{} (node_id: {})", f.name, key - f.key + 1);
        }
    }
    String::new()
}

/// Key and record byte offset holding classic node index `index`
/// (node id − 1) in the node-info file set of `version`.
pub fn nodeinfo_location(version: FsVersion, index: u32) -> (u32, usize) {
    if version.packed_nodeinfo() {
        (
            FILE_ID_NODEINFO_V1 + index / NODEINFO_V1_PER_FILE,
            (index % NODEINFO_V1_PER_FILE) as usize * 35,
        )
    } else {
        (FILE_ID_NODEINFO + index, 0)
    }
}

/// Key and record byte offset of classic node index `index` in the
/// route-cache file set. The v1 write-side key uses the same
/// 8-records-per-key packing the read side scans.
pub fn routecache_location(version: FsVersion, index: u32) -> (u32, usize) {
    if version.packed_nodeinfo() {
        (
            FILE_ID_NODEROUTECAHE_V1 + index / NODEROUTECACHE_V1_PER_FILE,
            (index % NODEROUTECACHE_V1_PER_FILE) as usize * 10,
        )
    } else {
        (FILE_ID_NODEROUTECAHE + index, 0)
    }
}

/// Key and record byte offset of long-range node index `index`
/// (node id − 256) in the packed LR node-info files.
pub fn lr_nodeinfo_location(index: u32) -> (u32, usize) {
    (
        FILE_ID_NODEINFO_LR + index / NODEINFO_LR_PER_FILE,
        (index % NODEINFO_LR_PER_FILE) as usize * 3,
    )
}

/// The v1 packed route-cache files are not always written by the
/// application firmware; a missing one is tolerated.
pub fn key_is_noderoutecache_v1(key: u32) -> bool {
    (FILE_ID_NODEROUTECAHE_V1..FILE_ID_NODEROUTECAHE_V1 + NUMBER_OF_NODEROUTECACHE_V1_FILES)
        .contains(&key)
}
