//! Flat-layout field tables for the six supported 500-series targets.
//!
//! Each (role, firmware line) pair fixes a table mapping field names to
//! byte offsets inside the 64 KiB EEPROM image. Tables are built once by a
//! region cursor that assigns sequential offsets; module sizes and the
//! final image size are then read back as offset distances, which is also
//! how the import synthesizes the module-size header words.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Ceiling on a flat image; also the working-buffer size.
pub const IMAGE_CEILING: usize = 0x10000;

pub const MAX_REPEATERS: usize = 4;
pub const SUC_MAX_UPDATES: usize = 64;
pub const SUC_UPDATE_NODEPARM_MAX: usize = 20;
pub const SUC_CONTROLLER_LIST_SIZE: usize = 232;
pub const HOST_DATA_SIZE: usize = 2048;
pub const CMD_CLASS_MAX: usize = 35;
pub const RTC_TIMER_AREA: usize = 160;
pub const SECURITY0_KEY_SIZE: usize = 16;

pub const CONFIGURATION_VALID_0: u8 = 0x54;
pub const CONFIGURATION_VALID_1: u8 = 0xA5;
pub const ROUTECACHE_VALID: u8 = 0x4A;
pub const MAGIC_VALUE: u8 = 0x42;

/// Module type codes carried in module descriptors.
pub const MODULE_TYPE_ZW_LIBRARY: u8 = 1;
pub const MODULE_TYPE_APPLICATION: u8 = 2;
pub const MODULE_TYPE_HOST_APPLICATION: u8 = 3;
pub const MODULE_TYPE_NVM_DESCRIPTOR: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    Word,
    Dword,
    NodeMask,
    NodeInfo,
    RouteCacheLine,
    SucUpdateEntry,
    ModuleDescriptor,
}

impl FieldKind {
    pub fn elem_size(self) -> usize {
        match self {
            FieldKind::Byte => 1,
            FieldKind::Word => 2,
            FieldKind::Dword => 4,
            FieldKind::NodeMask => 29,
            FieldKind::NodeInfo => 5,
            FieldKind::RouteCacheLine => 5,
            FieldKind::SucUpdateEntry => 22,
            FieldKind::ModuleDescriptor => 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
    pub count: usize,
}

impl Field {
    pub fn byte_len(&self) -> usize {
        self.kind.elem_size() * self.count
    }

    /// Byte range of element `i` inside the image buffer.
    pub fn elem_range(&self, i: usize) -> std::ops::Range<usize> {
        let start = self.offset + i * self.kind.elem_size();
        start..start + self.kind.elem_size()
    }
}

/// The controller library role the layout was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Bridge,
    Static,
}

/// The 500-series firmware line, which fixes version words and the small
/// per-line layout differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    V6_6,
    V6_7,
    V6_8,
}

impl Line {
    /// Protocol and application version word, `(major << 8) | minor`.
    pub fn version_word(self) -> u16 {
        match self {
            Line::V6_6 => 0x0606,
            Line::V6_7 => 0x0607,
            Line::V6_8 => 0x0608,
        }
    }

    /// Power-level calibration slots. The 6.8 line calibrates per channel.
    fn powerlevel_channels(self) -> usize {
        match self {
            Line::V6_8 => 3,
            _ => 1,
        }
    }

    /// Size of the line-specific reserved area, so absolute offsets differ
    /// across all six tables.
    fn reserved_area(self) -> usize {
        match self {
            Line::V6_6 => 8,
            Line::V6_7 => 16,
            Line::V6_8 => 32,
        }
    }
}

/// NVM regions in their mandatory image order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Region {
    ZwLibrary,
    Application,
    HostApplication,
    Descriptor,
    EndMarker,
}

/// One complete field table plus the facts the codecs need about it.
#[derive(Debug)]
pub struct Layout {
    pub role: Role,
    pub line: Line,
    fields: Vec<Field>,
    index: HashMap<&'static str, usize>,
}

impl Layout {
    /// Look up a field that every table carries. Static tables only; a
    /// miss is a programmer error.
    pub fn field(&self, name: &str) -> &Field {
        self.try_field(name)
            .unwrap_or_else(|| panic!("unknown layout field {name}"))
    }

    /// Look up a field that only some tables carry (virtual-node pool).
    pub fn try_field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Final image size: everything up to but excluding the end marker.
    pub fn image_size(&self) -> usize {
        self.field("end_marker").offset
    }

    /// Module size of the region starting at `start`: the distance to the
    /// next region's size word.
    pub fn module_size(&self, start: &str, next: &str) -> u16 {
        (self.field(next).offset - self.field(start).offset) as u16
    }

    pub fn has_virtual_nodes(&self) -> bool {
        self.try_field("virtual_node_pool").is_some()
    }
}

struct Cursor {
    fields: Vec<Field>,
    offset: usize,
    region: Region,
}

impl Cursor {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            offset: 0,
            region: Region::ZwLibrary,
        }
    }

    fn region(&mut self, region: Region) -> &mut Self {
        assert!(
            region >= self.region,
            "region {region:?} out of order after {:?}",
            self.region
        );
        self.region = region;
        self
    }

    fn push(&mut self, name: &'static str, kind: FieldKind, count: usize) -> &mut Self {
        self.fields.push(Field {
            name,
            kind,
            offset: self.offset,
            count,
        });
        self.offset += kind.elem_size() * count;
        self
    }

    fn one(&mut self, name: &'static str, kind: FieldKind) -> &mut Self {
        self.push(name, kind, 1)
    }

    fn finish(self, role: Role, line: Line) -> Layout {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        let layout = Layout {
            role,
            line,
            fields: self.fields,
            index,
        };
        assert!(layout.image_size() < IMAGE_CEILING);
        layout
    }
}

fn build(role: Role, line: Line) -> Layout {
    use FieldKind::*;

    let mut c = Cursor::new();

    c.region(Region::ZwLibrary)
        .one("total_end", Word)
        .one("zw_library_size", Word)
        .one("zw_library_descriptor", ModuleDescriptor)
        .one("internal_reserved_1", Dword)
        .one("home_id_learned", Dword)
        .one("node_id", Byte)
        .one("config_valid", Byte)
        .one("config_really_valid", Byte)
        .push("internal_reserved_2", Byte, 3)
        .one("preferred_repeaters", NodeMask)
        .one("pending_discovery", NodeMask)
        .push("rtc_timers", Byte, RTC_TIMER_AREA)
        .push("internal_reserved_3", Byte, line.reserved_area())
        .push("security0_key", Byte, SECURITY0_KEY_SIZE)
        .one("system_state", Byte)
        .one("home_id_own", Dword)
        .push("node_table", NodeInfo, 232)
        .push("routing_table", NodeMask, 232)
        .one("last_used_node_id", Byte)
        .one("static_controller_node_id", Byte)
        .one("pending_update", NodeMask)
        .one("suc_active", Byte)
        .push("suc_node_list", SucUpdateEntry, SUC_MAX_UPDATES)
        .push("suc_controller_list", Byte, SUC_CONTROLLER_LIST_SIZE)
        .one("suc_last_index", Byte)
        .one("route_slave_suc", NodeMask)
        .one("sensor_table", NodeMask)
        .one("controller_configuration", Byte)
        .one("max_node_id", Byte)
        .push("route_cache", RouteCacheLine, 232)
        .push("route_cache_nlwr", RouteCacheLine, 232)
        .one("route_cache_magic", Byte)
        .one("app_route_lock", NodeMask);
    if role == Role::Bridge {
        c.one("virtual_node_pool", NodeMask);
    }

    c.region(Region::Application)
        .one("application_size", Word)
        .one("application_descriptor", ModuleDescriptor)
        .one("app_magic", Byte)
        .one("watchdog_started", Byte)
        .push("power_level_normal", Byte, line.powerlevel_channels())
        .push("power_level_low", Byte, line.powerlevel_channels())
        .one("power_mode", Byte)
        .one("power_mode_extint_enable", Byte)
        .one("power_mode_wut_timeout", Dword)
        .one("cmd_class_len", Byte)
        .push("cmd_class", Byte, CMD_CLASS_MAX);

    c.region(Region::HostApplication)
        .one("host_application_size", Word)
        .one("host_application_descriptor", ModuleDescriptor)
        .push("host_data", Byte, HOST_DATA_SIZE);

    c.region(Region::Descriptor)
        .one("descriptor_size", Word)
        .one("descriptor_descriptor", ModuleDescriptor)
        .push("nvm_descriptor", Byte, 12);

    c.region(Region::EndMarker).one("end_marker", Word);

    c.finish(role, line)
}

pub static BRIDGE_6_6: Lazy<Layout> = Lazy::new(|| build(Role::Bridge, Line::V6_6));
pub static BRIDGE_6_7: Lazy<Layout> = Lazy::new(|| build(Role::Bridge, Line::V6_7));
pub static BRIDGE_6_8: Lazy<Layout> = Lazy::new(|| build(Role::Bridge, Line::V6_8));
pub static STATIC_6_6: Lazy<Layout> = Lazy::new(|| build(Role::Static, Line::V6_6));
pub static STATIC_6_7: Lazy<Layout> = Lazy::new(|| build(Role::Static, Line::V6_7));
pub static STATIC_6_8: Lazy<Layout> = Lazy::new(|| build(Role::Static, Line::V6_8));
