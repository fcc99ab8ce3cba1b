//! Packed record layouts stored inside the object-store files.
//!
//! Multi-byte scalars are little-endian. Encode and decode are exact
//! inverses for every record; the byte sizes here must match the file
//! table in [`super::layout`].

use byteorder::{ByteOrder, LittleEndian};

use crate::mask::{ClassicNodeMask, CLASSIC_NODEMASK_LENGTH};

pub const NODEINFO_SIZE: usize = 35;
pub const ROUTECACHE_SIZE: usize = 10;
pub const LR_NODEINFO_SIZE: usize = 3;
pub const SUC_ENTRY_SIZE: usize = 22;
pub const SUC_ENTRIES: usize = 64;
pub const SUC_NODELIST_SIZE: usize = SUC_ENTRIES * SUC_ENTRY_SIZE;
pub const SUC_NODEPARM_MAX: usize = 20;
pub const CMD_CLASS_MAX: usize = 35;
pub const CMD_CLASS_INFO_SIZE: usize = 108;
pub const CONTROLLERINFO_SHORT_SIZE: usize = 13;
pub const CONTROLLERINFO_LONG_SIZE: usize = 22;
pub const APP_SETTINGS_SIZE: usize = 3;
pub const APP_DATA_SIZE: usize = 512;

/// `controllerConfiguration` flag: the controller joined another network.
pub const CONTROLLER_ON_OTHER_NETWORK: u8 = 0x02;

/// 35-byte node-info file record: the five device-class bytes, the
/// neighbour mask, the controller SUC-update index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfoRecord {
    pub capability: u8,
    pub security: u8,
    pub reserved: u8,
    pub generic: u8,
    pub specific: u8,
    pub neighbours: ClassicNodeMask,
    pub suc_update_index: u8,
}

impl NodeInfoRecord {
    pub fn decode(b: &[u8]) -> Self {
        Self {
            capability: b[0],
            security: b[1],
            reserved: b[2],
            generic: b[3],
            specific: b[4],
            neighbours: ClassicNodeMask::from_slice(&b[5..5 + CLASSIC_NODEMASK_LENGTH]),
            suc_update_index: b[34],
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0] = self.capability;
        out[1] = self.security;
        out[2] = self.reserved;
        out[3] = self.generic;
        out[4] = self.specific;
        out[5..5 + CLASSIC_NODEMASK_LENGTH].copy_from_slice(self.neighbours.as_bytes());
        out[34] = self.suc_update_index;
    }
}

/// One route-cache line: four repeater ids plus the packed
/// configuration-size byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteCacheLine {
    pub repeaters: [u8; 4],
    pub conf: u8,
}

impl RouteCacheLine {
    pub fn decode(b: &[u8]) -> Self {
        Self {
            repeaters: [b[0], b[1], b[2], b[3]],
            conf: b[4],
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.repeaters);
        out[4] = self.conf;
    }
}

/// 10-byte route-cache file record: LWR line then NLWR line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeRouteCache {
    pub lwr: RouteCacheLine,
    pub nlwr: RouteCacheLine,
}

impl NodeRouteCache {
    pub fn decode(b: &[u8]) -> Self {
        Self {
            lwr: RouteCacheLine::decode(&b[0..5]),
            nlwr: RouteCacheLine::decode(&b[5..10]),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        self.lwr.encode(&mut out[0..5]);
        self.nlwr.encode(&mut out[5..10]);
    }
}

/// 3-byte long-range node record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LrNodeInfo {
    pub packed_info: u8,
    pub generic: u8,
    pub specific: u8,
}

impl LrNodeInfo {
    pub fn decode(b: &[u8]) -> Self {
        Self {
            packed_info: b[0],
            generic: b[1],
            specific: b[2],
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0] = self.packed_info;
        out[1] = self.generic;
        out[2] = self.specific;
    }
}

/// One 22-byte SUC update entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SucUpdateEntry {
    pub node_id: u8,
    pub change_type: u8,
    pub node_info: [u8; SUC_NODEPARM_MAX],
}

impl Default for SucUpdateEntry {
    fn default() -> Self {
        Self {
            node_id: 0,
            change_type: 0,
            node_info: [0; SUC_NODEPARM_MAX],
        }
    }
}

impl SucUpdateEntry {
    pub fn decode(b: &[u8]) -> Self {
        let mut node_info = [0u8; SUC_NODEPARM_MAX];
        node_info.copy_from_slice(&b[2..2 + SUC_NODEPARM_MAX]);
        Self {
            node_id: b[0],
            change_type: b[1],
            node_info,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0] = self.node_id;
        out[1] = self.change_type;
        out[2..2 + SUC_NODEPARM_MAX].copy_from_slice(&self.node_info);
    }
}

/// Controller identity and network bookkeeping. The long-range fields
/// only exist on the wire in the long (v2+) shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerInfo {
    pub home_id: u32,
    pub node_id: u16,
    pub last_used_node_id: u8,
    pub static_controller_node_id: u16,
    pub suc_last_index: u8,
    pub controller_configuration: u8,
    pub suc_awareness_push_needed: u8,
    pub max_node_id: u8,
    pub reserved_id: u8,
    pub system_state: u8,
    pub last_used_node_id_lr: u16,
    pub max_node_id_lr: u16,
    pub reserved_id_lr: u16,
    pub primary_long_range_channel_id: u8,
    pub dcdc_config: u8,
}

impl ControllerInfo {
    /// 13-byte v0/v1 shape, single-byte fields throughout.
    pub fn decode_short(b: &[u8]) -> Self {
        Self {
            home_id: byteorder::BigEndian::read_u32(&b[0..4]),
            node_id: b[4] as u16,
            last_used_node_id: b[5],
            static_controller_node_id: b[6] as u16,
            suc_last_index: b[7],
            controller_configuration: b[8],
            suc_awareness_push_needed: b[9],
            max_node_id: b[10],
            reserved_id: b[11],
            system_state: b[12],
            ..Self::default()
        }
    }

    pub fn encode_short(&self) -> [u8; CONTROLLERINFO_SHORT_SIZE] {
        let mut b = [0u8; CONTROLLERINFO_SHORT_SIZE];
        byteorder::BigEndian::write_u32(&mut b[0..4], self.home_id);
        b[4] = self.node_id as u8;
        b[5] = self.last_used_node_id;
        b[6] = self.static_controller_node_id as u8;
        b[7] = self.suc_last_index;
        b[8] = self.controller_configuration;
        b[9] = self.suc_awareness_push_needed;
        b[10] = self.max_node_id;
        b[11] = self.reserved_id;
        b[12] = self.system_state;
        b
    }

    /// 22-byte v2+ shape with u16 node ids.
    pub fn decode_long(b: &[u8]) -> Self {
        Self {
            home_id: byteorder::BigEndian::read_u32(&b[0..4]),
            node_id: LittleEndian::read_u16(&b[4..6]),
            static_controller_node_id: LittleEndian::read_u16(&b[6..8]),
            last_used_node_id_lr: LittleEndian::read_u16(&b[8..10]),
            last_used_node_id: b[10],
            suc_last_index: b[11],
            max_node_id_lr: LittleEndian::read_u16(&b[12..14]),
            max_node_id: b[14],
            controller_configuration: b[15],
            reserved_id_lr: LittleEndian::read_u16(&b[16..18]),
            reserved_id: b[18],
            system_state: b[19],
            primary_long_range_channel_id: b[20],
            dcdc_config: b[21],
            suc_awareness_push_needed: 0,
        }
    }

    pub fn encode_long(&self) -> [u8; CONTROLLERINFO_LONG_SIZE] {
        let mut b = [0u8; CONTROLLERINFO_LONG_SIZE];
        byteorder::BigEndian::write_u32(&mut b[0..4], self.home_id);
        LittleEndian::write_u16(&mut b[4..6], self.node_id);
        LittleEndian::write_u16(&mut b[6..8], self.static_controller_node_id);
        LittleEndian::write_u16(&mut b[8..10], self.last_used_node_id_lr);
        b[10] = self.last_used_node_id;
        b[11] = self.suc_last_index;
        LittleEndian::write_u16(&mut b[12..14], self.max_node_id_lr);
        b[14] = self.max_node_id;
        b[15] = self.controller_configuration;
        LittleEndian::write_u16(&mut b[16..18], self.reserved_id_lr);
        b[18] = self.reserved_id;
        b[19] = self.system_state;
        b[20] = self.primary_long_range_channel_id;
        b[21] = self.dcdc_config;
        b
    }
}

/// 108-byte application command-class file: three lists of
/// `length byte + 35 entries` (unsecure included, secure included,
/// secure supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdClassInfo {
    pub lists: [([u8; CMD_CLASS_MAX], u8); 3],
}

impl Default for CmdClassInfo {
    fn default() -> Self {
        Self {
            lists: [([0; CMD_CLASS_MAX], 0); 3],
        }
    }
}

impl CmdClassInfo {
    pub fn decode(b: &[u8]) -> Self {
        let mut info = Self::default();
        for (i, (entries, len)) in info.lists.iter_mut().enumerate() {
            let base = i * (1 + CMD_CLASS_MAX);
            *len = b[base].min(CMD_CLASS_MAX as u8);
            entries.copy_from_slice(&b[base + 1..base + 1 + CMD_CLASS_MAX]);
        }
        info
    }

    pub fn encode(&self) -> [u8; CMD_CLASS_INFO_SIZE] {
        let mut b = [0u8; CMD_CLASS_INFO_SIZE];
        for (i, (entries, len)) in self.lists.iter().enumerate() {
            let base = i * (1 + CMD_CLASS_MAX);
            b[base] = *len;
            b[base + 1..base + 1 + CMD_CLASS_MAX].copy_from_slice(entries);
        }
        b
    }

    /// The unsecure included list, clamped to its length byte.
    pub fn unsecure_included(&self) -> &[u8] {
        let (entries, len) = &self.lists[0];
        &entries[..(*len as usize).min(CMD_CLASS_MAX)]
    }

    pub fn set_unsecure_included(&mut self, classes: &[u8]) {
        let n = classes.len().min(CMD_CLASS_MAX);
        self.lists[0].0[..n].copy_from_slice(&classes[..n]);
        self.lists[0].1 = n as u8;
    }
}

/// 3-byte application-settings record, derived on import from the
/// controller's own node entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplicationSettings {
    pub listening: u8,
    pub generic: u8,
    pub specific: u8,
}

impl ApplicationSettings {
    pub fn decode(b: &[u8]) -> Self {
        Self {
            listening: b[0],
            generic: b[1],
            specific: b[2],
        }
    }

    pub fn encode(&self) -> [u8; APP_SETTINGS_SIZE] {
        [self.listening, self.generic, self.specific]
    }
}

/// Radio configuration; serialized in one of three shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    pub rf_region: u8,
    pub tx_power: i16,
    pub power_0dbm_measured: i16,
    pub enable_pti: u8,
    pub max_tx_power: i16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rf_region: 0,
            tx_power: 0,
            power_0dbm_measured: 0,
            enable_pti: 0,
            max_tx_power: 140,
        }
    }
}

impl AppConfig {
    pub fn decode(shape: super::layout::ConfigShape, b: &[u8]) -> Self {
        use super::layout::ConfigShape::*;
        let mut config = Self::default();
        config.rf_region = b[0];
        match shape {
            Pre7_15_3 => {
                config.tx_power = b[1] as i8 as i16;
                config.power_0dbm_measured = b[2] as i8 as i16;
            }
            Pre7_18_1 => {
                config.tx_power = b[1] as i8 as i16;
                config.power_0dbm_measured = b[2] as i8 as i16;
                config.enable_pti = b[3];
                config.max_tx_power = LittleEndian::read_i16(&b[4..6]);
            }
            Current => {
                config.tx_power = LittleEndian::read_i16(&b[1..3]);
                config.power_0dbm_measured = LittleEndian::read_i16(&b[3..5]);
                config.enable_pti = b[5];
                config.max_tx_power = LittleEndian::read_i16(&b[6..8]);
            }
        }
        config
    }

    pub fn encode(&self, shape: super::layout::ConfigShape) -> Vec<u8> {
        use super::layout::ConfigShape::*;
        let mut b = vec![0u8; shape.size()];
        b[0] = self.rf_region;
        match shape {
            Pre7_15_3 => {
                b[1] = self.tx_power as i8 as u8;
                b[2] = self.power_0dbm_measured as i8 as u8;
            }
            Pre7_18_1 => {
                b[1] = self.tx_power as i8 as u8;
                b[2] = self.power_0dbm_measured as i8 as u8;
                b[3] = self.enable_pti;
                LittleEndian::write_i16(&mut b[4..6], self.max_tx_power);
            }
            Current => {
                LittleEndian::write_i16(&mut b[1..3], self.tx_power);
                LittleEndian::write_i16(&mut b[3..5], self.power_0dbm_measured);
                b[5] = self.enable_pti;
                LittleEndian::write_i16(&mut b[6..8], self.max_tx_power);
            }
        }
        b
    }
}
