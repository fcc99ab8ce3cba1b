//! JSON snapshot → flat image.
//!
//! The module-size header, module descriptors, NVM descriptor and marker
//! bytes are synthesized from the field table, never read from the JSON.
//! Everything else is driven by the document; errors accumulate in the
//! report and the image is only produced when the report ends clean.

use byteorder::{BigEndian, ByteOrder};
use serde_json::Value;

use crate::error::NvmError;
use crate::json::{base64_decode, JsonNode, JsonPath, JsonType, Presence};
use crate::mask::ClassicNodeMask;
use crate::report::Report;

use super::layout::{
    Field, FieldKind, Layout, CONFIGURATION_VALID_0, CONFIGURATION_VALID_1, IMAGE_CEILING,
    MAGIC_VALUE, MAX_REPEATERS, MODULE_TYPE_APPLICATION, MODULE_TYPE_HOST_APPLICATION,
    MODULE_TYPE_NVM_DESCRIPTOR, MODULE_TYPE_ZW_LIBRARY, ROUTECACHE_VALID, SUC_MAX_UPDATES,
    SUC_UPDATE_NODEPARM_MAX,
};

/// Default product identity written into the NVM descriptor; matches the
/// serial-API controller application shipped with the embedded SDK.
const APP_MANUFACTURER_ID: u16 = 0x0000;
const APP_PRODUCT_TYPE_ID: u16 = 0x0008;
const APP_PRODUCT_ID: u16 = 0x0003;
const APP_FIRMWARE_ID: u16 = (APP_PRODUCT_ID << 8) | APP_PRODUCT_TYPE_ID;

struct ImageWriter<'a> {
    layout: &'a Layout,
    buf: Vec<u8>,
}

impl<'a> ImageWriter<'a> {
    fn new(layout: &'a Layout) -> Self {
        Self {
            layout,
            buf: vec![0u8; IMAGE_CEILING],
        }
    }

    fn elem_mut(&mut self, field: Field, i: usize) -> &mut [u8] {
        &mut self.buf[field.elem_range(i)]
    }

    fn write_byte(&mut self, name: &str, v: u8) {
        let field = *self.layout.field(name);
        self.buf[field.offset] = v;
    }

    fn write_word(&mut self, name: &str, v: u16) {
        let field = *self.layout.field(name);
        BigEndian::write_u16(&mut self.buf[field.offset..field.offset + 2], v);
    }

    fn write_dword(&mut self, name: &str, v: u32) {
        let field = *self.layout.field(name);
        BigEndian::write_u32(&mut self.buf[field.offset..field.offset + 4], v);
    }

    fn fill(&mut self, name: &str, v: u8) {
        let field = *self.layout.field(name);
        self.buf[field.offset..field.offset + field.byte_len()].fill(v);
    }

    /// Write a classic mask; a no-op when the table lacks the field
    /// (virtual-node pool on static layouts).
    fn write_mask(&mut self, name: &str, mask: &ClassicNodeMask) {
        if let Some(field) = self.layout.try_field(name).copied() {
            self.buf[field.offset..field.offset + field.byte_len()]
                .copy_from_slice(mask.as_bytes());
        }
    }

    fn write_bytes(&mut self, name: &str, data: &[u8]) {
        let field = *self.layout.field(name);
        let n = data.len().min(field.byte_len());
        self.buf[field.offset..field.offset + n].copy_from_slice(&data[..n]);
    }

    /// Module descriptor: size big-endian, type byte, then the version
    /// word low byte before high byte. The byte-swapped version is the
    /// wire layout every firmware wrote; keep it.
    fn write_module_descriptor(&mut self, name: &str, size: u16, module_type: u8, version: u16) {
        let field = *self.layout.field(name);
        let out = &mut self.buf[field.elem_range(0)];
        BigEndian::write_u16(&mut out[0..2], size);
        out[2] = module_type;
        out[3] = (version & 0xff) as u8;
        out[4] = (version >> 8) as u8;
    }

    /// Scalar write steered by the field kind; array-valued JSON spreads
    /// over the field's elements.
    fn write_scalar_json(&mut self, name: &str, value: &Value) {
        let field = *self.layout.field(name);
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().take(field.count).enumerate() {
                    self.write_scalar_elem(field, i, item.as_i64().unwrap_or(0));
                }
            }
            _ => self.write_scalar_elem(field, 0, value.as_i64().unwrap_or(0)),
        }
    }

    fn write_scalar_elem(&mut self, field: Field, i: usize, v: i64) {
        let out = self.elem_mut(field, i);
        match field.kind {
            FieldKind::Byte => out[0] = v as u8,
            FieldKind::Word => BigEndian::write_u16(out, v as u16),
            FieldKind::Dword => BigEndian::write_u32(out, v as u32),
            _ => {}
        }
    }
}

/// Structured records deserialize field-by-field in declaration order and
/// stop silently at the first missing inner key; bytes already written
/// stay written.
fn write_node_info(out: &mut [u8], value: &Value) {
    for (i, key) in ["capability", "security", "reserved", "generic", "specific"]
        .iter()
        .enumerate()
    {
        let Some(v) = value.get(*key).and_then(Value::as_i64) else {
            return;
        };
        out[i] = v as u8;
    }
}

fn write_route_cache_line(out: &mut [u8], value: &Value) {
    let Some(conf) = value.get("routecacheLineConf").and_then(Value::as_i64) else {
        return;
    };
    out[MAX_REPEATERS] = conf as u8;
    let Some(repeaters) = value.get("repeaters").and_then(Value::as_array) else {
        return;
    };
    for (slot, r) in out[..MAX_REPEATERS].iter_mut().zip(repeaters) {
        *slot = r.as_i64().unwrap_or(0) as u8;
    }
}

fn write_suc_entry(out: &mut [u8], value: &Value) {
    let Some(node_id) = value.get("nodeId").and_then(Value::as_i64) else {
        return;
    };
    out[0] = node_id as u8;
    let Some(change_type) = value.get("changeType").and_then(Value::as_i64) else {
        return;
    };
    out[1] = change_type as u8;
    let Some(params) = value.get("nodeInfo").and_then(Value::as_array) else {
        return;
    };
    for (slot, p) in out[2..2 + SUC_UPDATE_NODEPARM_MAX].iter_mut().zip(params) {
        *slot = p.as_i64().unwrap_or(0) as u8;
    }
}

fn synthesize_header(w: &mut ImageWriter<'_>) {
    let layout = w.layout;
    let zw_version = layout.line.version_word();
    let app_version = zw_version;

    w.write_word("total_end", (layout.image_size() + 1) as u16);
    w.write_dword("internal_reserved_1", 0x4652_4545); // ASCII "FREE"
    w.write_byte("config_valid", CONFIGURATION_VALID_0);
    w.write_byte("config_really_valid", CONFIGURATION_VALID_1);
    w.write_byte("route_cache_magic", ROUTECACHE_VALID);
    w.write_byte("app_magic", MAGIC_VALUE);

    let lib_size = layout.module_size("zw_library_size", "application_size");
    w.write_word("zw_library_size", lib_size);
    w.write_module_descriptor(
        "zw_library_descriptor",
        lib_size,
        MODULE_TYPE_ZW_LIBRARY,
        zw_version,
    );

    let app_size = layout.module_size("application_size", "host_application_size");
    w.write_word("application_size", app_size);
    w.write_module_descriptor(
        "application_descriptor",
        app_size,
        MODULE_TYPE_APPLICATION,
        app_version,
    );

    let host_size = layout.module_size("host_application_size", "descriptor_size");
    w.write_word("host_application_size", host_size);
    w.write_module_descriptor(
        "host_application_descriptor",
        host_size,
        MODULE_TYPE_HOST_APPLICATION,
        app_version,
    );

    let desc_size = layout.module_size("descriptor_size", "end_marker");
    w.write_word("descriptor_size", desc_size);
    w.write_module_descriptor(
        "descriptor_descriptor",
        desc_size,
        MODULE_TYPE_NVM_DESCRIPTOR,
        app_version,
    );

    let descriptor = *layout.field("nvm_descriptor");
    let out = &mut w.buf[descriptor.offset..descriptor.offset + 12];
    for (i, word) in [
        APP_MANUFACTURER_ID,
        APP_FIRMWARE_ID,
        APP_PRODUCT_TYPE_ID,
        APP_PRODUCT_ID,
        app_version,
        zw_version,
    ]
    .into_iter()
    .enumerate()
    {
        BigEndian::write_u16(&mut out[i * 2..i * 2 + 2], word);
    }
}

pub fn import(layout: &Layout, doc: &Value, report: &mut Report) -> Result<Vec<u8>, NvmError> {
    let mut w = ImageWriter::new(layout);
    synthesize_header(&mut w);

    let root_path = JsonPath::root();
    let root = JsonNode::new(doc, &root_path);
    let Some((ctrl_value, ctrl_path)) =
        root.get(report, "zwController", JsonType::Object, Presence::Required)
    else {
        return Err(NvmError::ConversionFailed {
            report: report.clone(),
        });
    };
    let ctrl = JsonNode::new(ctrl_value, &ctrl_path);

    w.write_byte(
        "node_id",
        ctrl.get_int(report, "nodeId", 0, Presence::Optional) as u8,
    );
    w.write_dword(
        "home_id_own",
        ctrl.get_home_id(report, "ownHomeId", 0, Presence::Required),
    );
    w.write_dword(
        "home_id_learned",
        ctrl.get_home_id(report, "learnedHomeId", 0, Presence::Optional),
    );
    w.write_byte(
        "last_used_node_id",
        ctrl.get_int(report, "lastUsedNodeId", 0, Presence::Optional) as u8,
    );
    w.write_byte(
        "controller_configuration",
        ctrl.get_int(report, "controllerConfiguration", 0, Presence::Optional) as u8,
    );
    w.write_byte(
        "system_state",
        ctrl.get_int(report, "systemState", 0, Presence::Optional) as u8,
    );
    w.write_byte(
        "static_controller_node_id",
        ctrl.get_int(report, "staticControllerNodeId", 0, Presence::Optional) as u8,
    );

    import_node_table(&mut w, &ctrl, report);
    import_suc_state(&mut w, &ctrl, report);

    let cmd_class = *layout.field("cmd_class");
    let mut classes = vec![0u8; cmd_class.count];
    let class_count = ctrl.get_bytearray(report, "cmdClassList", &mut classes, Presence::Optional);
    w.write_bytes("cmd_class", &classes);
    w.write_byte("cmd_class_len", class_count as u8);

    if let Some((value, _)) =
        ctrl.get(report, "applicationData", JsonType::String, Presence::Optional)
    {
        if let Some(data) = value.as_str().and_then(base64_decode) {
            w.write_bytes("host_data", &data);
        }
    }

    import_app_config(&mut w, &root, report);

    if report.has_errors() {
        Err(NvmError::ConversionFailed {
            report: report.clone(),
        })
    } else {
        Ok(w.buf[..layout.image_size()].to_vec())
    }
}

fn import_node_table(w: &mut ImageWriter<'_>, ctrl: &JsonNode<'_>, report: &mut Report) {
    let routing_table = *w.layout.field("routing_table");
    let node_table = *w.layout.field("node_table");
    let lwr = *w.layout.field("route_cache");
    let nlwr = *w.layout.field("route_cache_nlwr");
    let suc_index = *w.layout.field("suc_controller_list");

    let mut virtual_nodes = ClassicNodeMask::new();
    let mut sensor_nodes = ClassicNodeMask::new();
    let mut pending_update = ClassicNodeMask::new();
    let mut pending_discovery = ClassicNodeMask::new();
    let mut route_slave_suc = ClassicNodeMask::new();
    let mut app_lock = ClassicNodeMask::new();

    // Unlisted nodes keep the idle controller SUC-update index.
    w.fill("suc_controller_list", 254);

    let mut max_node_id = 0u16;
    if let Some((table_value, table_path)) =
        ctrl.get(report, "nodeTable", JsonType::Array, Presence::Optional)
    {
        let entries = table_value.as_array().map(Vec::as_slice).unwrap_or(&[]);
        for (i, entry_value) in entries.iter().enumerate() {
            let entry_path = table_path.item(i);
            let entry = JsonNode::new(entry_value, &entry_path);

            let id = entry.get_int(report, "nodeId", 0, Presence::Required);
            if id <= 0 {
                if entry_value.get("nodeId").is_some() {
                    report.parse_error(format!(
                        "ERROR: Invalid value ({id}) for key \"{}/nodeId\". Must be a node id.",
                        entry_path.as_str()
                    ));
                }
                continue;
            }
            if id > 232 {
                // Long-range ids have no slot in the flat tables.
                continue;
            }
            let id = id as u16;
            let index = (id - 1) as usize;
            max_node_id = max_node_id.max(id);

            let neighbours = entry.get_nodemask(report, "neighbours", Presence::Required);
            w.elem_mut(routing_table, index)
                .copy_from_slice(neighbours.as_bytes());

            let node_info =
                entry.get(report, "nodeInfo", JsonType::Object, Presence::Required);
            let mut capability = 0i64;
            if let Some((info_value, info_path)) = &node_info {
                write_node_info(w.elem_mut(node_table, index), info_value);
                let info = JsonNode::new(info_value, info_path);
                capability = info.get_int(report, "capability", 0, Presence::Optional);
            }
            if capability & 0x80 == 0 {
                sensor_nodes.set(id);
            }

            w.buf[suc_index.offset + index] =
                entry.get_int(report, "controllerSucUpdateIndex", 254, Presence::Optional) as u8;

            if entry.get_bool(report, "virtualNode", false, Presence::Optional) {
                virtual_nodes.set(id);
            }
            if entry.get_bool(report, "pendingUpdate", false, Presence::Optional) {
                pending_update.set(id);
            }
            if entry.get_bool(report, "pendingDiscovery", false, Presence::Optional) {
                pending_discovery.set(id);
            }
            if entry.get_bool(report, "routeSlaveSuc", false, Presence::Optional) {
                route_slave_suc.set(id);
            }

            if let Some((rc_value, rc_path)) =
                entry.get(report, "routeCache", JsonType::Object, Presence::Optional)
            {
                let rc = JsonNode::new(rc_value, &rc_path);
                if rc.get_bool(report, "applock", false, Presence::Optional) {
                    app_lock.set(id);
                }
                if let Some((line, _)) = rc.get(report, "LWR", JsonType::Object, Presence::Optional)
                {
                    write_route_cache_line(w.elem_mut(lwr, index), line);
                }
                if let Some((line, _)) =
                    rc.get(report, "NLWR", JsonType::Object, Presence::Optional)
                {
                    write_route_cache_line(w.elem_mut(nlwr, index), line);
                }
            }
        }
    }

    w.write_mask("virtual_node_pool", &virtual_nodes);
    w.write_mask("sensor_table", &sensor_nodes);
    w.write_mask("pending_update", &pending_update);
    w.write_mask("pending_discovery", &pending_discovery);
    w.write_mask("route_slave_suc", &route_slave_suc);
    w.write_mask("app_route_lock", &app_lock);
    w.write_byte("max_node_id", max_node_id as u8);
}

fn import_suc_state(w: &mut ImageWriter<'_>, ctrl: &JsonNode<'_>, report: &mut Report) {
    let Some((suc_value, suc_path)) =
        ctrl.get(report, "sucState", JsonType::Object, Presence::Optional)
    else {
        return;
    };
    let suc = JsonNode::new(suc_value, &suc_path);
    if let Some((last_index, _)) =
        suc.get(report, "lastIndex", JsonType::Int, Presence::Optional)
    {
        w.write_byte("suc_last_index", last_index.as_i64().unwrap_or(0) as u8);
    }
    if let Some((list, _)) =
        suc.get(report, "updateNodeList", JsonType::Array, Presence::Optional)
    {
        let suc_node_list = *w.layout.field("suc_node_list");
        let entries = list.as_array().map(Vec::as_slice).unwrap_or(&[]);
        for (i, entry) in entries.iter().take(SUC_MAX_UPDATES).enumerate() {
            write_suc_entry(w.elem_mut(suc_node_list, i), entry);
        }
    }
}

/// `appConfig` lives at the document top level, next to `zwController`,
/// matching what the export writes.
fn import_app_config(w: &mut ImageWriter<'_>, root: &JsonNode<'_>, report: &mut Report) {
    let Some((app_value, app_path)) =
        root.get(report, "appConfig", JsonType::Object, Presence::Optional)
    else {
        return;
    };
    let app = JsonNode::new(app_value, &app_path);

    let scalar_keys: [(&str, &str, JsonType); 6] = [
        ("watchdogStarted", "watchdog_started", JsonType::Int),
        ("powerLevelNormal", "power_level_normal", JsonType::Any),
        ("powerLevelLow", "power_level_low", JsonType::Any),
        ("powerMode", "power_mode", JsonType::Any),
        ("powerModeExtintEnable", "power_mode_extint_enable", JsonType::Int),
        ("powerModeWutTimeout", "power_mode_wut_timeout", JsonType::Any),
    ];
    for (json_key, field_name, ty) in scalar_keys {
        if let Some((value, _)) = app.get(report, json_key, ty, Presence::Optional) {
            w.write_scalar_json(field_name, value);
        }
    }
}
