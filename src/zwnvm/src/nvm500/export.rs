//! Flat image → JSON snapshot.

use byteorder::{BigEndian, ByteOrder};
use serde_json::{json, Map, Value};

use crate::error::NvmError;
use crate::json::{base64_encode, bytes_to_json, home_id_to_string};
use crate::mask::ClassicNodeMask;
use crate::report::Report;

use super::layout::{
    Field, FieldKind, Layout, CMD_CLASS_MAX, MAX_REPEATERS, SUC_UPDATE_NODEPARM_MAX,
};

/// Read-side view over the 64 KiB working buffer.
struct Image<'a> {
    layout: &'a Layout,
    buf: &'a [u8],
}

impl<'a> Image<'a> {
    fn bytes(&self, field: &Field, elem: usize) -> &'a [u8] {
        &self.buf[field.elem_range(elem)]
    }

    fn byte(&self, name: &str) -> u8 {
        self.buf[self.layout.field(name).offset]
    }

    fn elem_json(&self, field: &Field, elem: usize) -> Value {
        let b = self.bytes(field, elem);
        match field.kind {
            FieldKind::Byte => json!(b[0]),
            FieldKind::Word => json!(BigEndian::read_u16(b)),
            FieldKind::Dword => json!(BigEndian::read_u32(b)),
            FieldKind::NodeMask => {
                let mask = ClassicNodeMask::from_slice(b);
                Value::Array(mask.iter().map(Value::from).collect())
            }
            FieldKind::NodeInfo => json!({
                "capability": b[0],
                "security": b[1],
                "reserved": b[2],
                "generic": b[3],
                "specific": b[4],
            }),
            FieldKind::RouteCacheLine => json!({
                "routecacheLineConf": b[MAX_REPEATERS],
                "repeaters": &b[..MAX_REPEATERS],
            }),
            FieldKind::SucUpdateEntry => {
                let params: Vec<u8> = b[2..2 + SUC_UPDATE_NODEPARM_MAX]
                    .iter()
                    .copied()
                    .filter(|&p| p != 0)
                    .collect();
                json!({
                    "nodeId": b[0],
                    "changeType": b[1],
                    "nodeInfo": params,
                })
            }
            FieldKind::ModuleDescriptor => json!({
                "wNvmModuleSize": BigEndian::read_u16(&b[0..2]),
                "bNvmModuleType": b[2],
                "wNvmModuleVersion": BigEndian::read_u16(&b[3..5]),
            }),
        }
    }

    fn field_json(&self, name: &str) -> Value {
        let field = self.layout.field(name);
        if field.count > 1 {
            Value::Array((0..field.count).map(|i| self.elem_json(field, i)).collect())
        } else {
            self.elem_json(field, 0)
        }
    }

    fn home_id(&self, name: &str) -> Value {
        let field = self.layout.field(name);
        Value::String(home_id_to_string(BigEndian::read_u32(self.bytes(field, 0))))
    }

    fn mask(&self, name: &str) -> ClassicNodeMask {
        ClassicNodeMask::from_slice(self.bytes(self.layout.field(name), 0))
    }
}

fn version_string(word: u16) -> String {
    format!("{:02}.{:02}.00", (word >> 8) & 0xff, word & 0xff)
}

pub fn export(layout: &Layout, image: &[u8], report: &mut Report) -> Result<Value, NvmError> {
    let buf = super::load_image(image, report)?;
    let img = Image { layout, buf: &buf };

    let version = version_string(layout.line.version_word());
    let mut root = Map::new();
    root.insert(
        "backupInfo".into(),
        json!({
            "backupFormatVersion": 1,
            "sourceProtocolVersion": version,
            "sourceAppVersion": version,
            "date": chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string(),
        }),
    );

    let mut ctrl = Map::new();
    ctrl.insert("nodeId".into(), img.field_json("node_id"));
    ctrl.insert("ownHomeId".into(), img.home_id("home_id_own"));
    ctrl.insert("learnedHomeId".into(), img.home_id("home_id_learned"));
    ctrl.insert("lastUsedNodeId".into(), img.field_json("last_used_node_id"));
    ctrl.insert(
        "staticControllerNodeId".into(),
        img.field_json("static_controller_node_id"),
    );
    ctrl.insert(
        "controllerConfiguration".into(),
        img.field_json("controller_configuration"),
    );
    ctrl.insert("systemState".into(), img.field_json("system_state"));
    ctrl.insert("cmdClassList".into(), cmd_class_list(&img));
    ctrl.insert("nodeTable".into(), node_table(&img));
    ctrl.insert("sucState".into(), suc_state(&img));
    if let Some(data) = application_data(&img) {
        ctrl.insert("applicationData".into(), data);
    }
    root.insert("zwController".into(), Value::Object(ctrl));

    let mut app = Map::new();
    app.insert("watchdogStarted".into(), img.field_json("watchdog_started"));
    app.insert("powerLevelNormal".into(), img.field_json("power_level_normal"));
    app.insert("powerLevelLow".into(), img.field_json("power_level_low"));
    app.insert("powerMode".into(), img.field_json("power_mode"));
    app.insert(
        "powerModeExtintEnable".into(),
        img.field_json("power_mode_extint_enable"),
    );
    app.insert(
        "powerModeWutTimeout".into(),
        img.field_json("power_mode_wut_timeout"),
    );
    root.insert("appConfig".into(), Value::Object(app));

    if report.has_errors() {
        return Err(NvmError::ConversionFailed {
            report: report.clone(),
        });
    }
    Ok(Value::Object(root))
}

/// The stored command classes, clamped to the stored length byte.
fn cmd_class_list(img: &Image<'_>) -> Value {
    let len = (img.byte("cmd_class_len") as usize).min(CMD_CLASS_MAX);
    let field = img.layout.field("cmd_class");
    bytes_to_json(&img.buf[field.offset..field.offset + len])
}

/// Node ids 1..=231 are scanned; a node exists iff its generic device
/// class byte is non-zero. Id 232 is never scanned; this bound is part of
/// the image contract.
fn node_table(img: &Image<'_>) -> Value {
    let node_table = img.layout.field("node_table");
    let routing_table = img.layout.field("routing_table");
    let lwr = img.layout.field("route_cache");
    let nlwr = img.layout.field("route_cache_nlwr");
    let suc_index = img.layout.field("suc_controller_list");

    let virtual_nodes = img
        .layout
        .try_field("virtual_node_pool")
        .map(|f| ClassicNodeMask::from_slice(img.bytes(f, 0)));
    let pending_update = img.mask("pending_update");
    let pending_discovery = img.mask("pending_discovery");
    let route_slave_suc = img.mask("route_slave_suc");
    let app_lock = img.mask("app_route_lock");

    let mut nodes = Vec::new();
    for index in 0..231usize {
        let info = img.bytes(node_table, index);
        if info[3] == 0 {
            continue;
        }
        let id = (index + 1) as u16;
        let mut entry = Map::new();
        entry.insert("nodeId".into(), json!(id));
        if let Some(virtual_nodes) = &virtual_nodes {
            entry.insert("virtualNode".into(), json!(virtual_nodes.contains(id)));
        }
        entry.insert("pendingUpdate".into(), json!(pending_update.contains(id)));
        entry.insert(
            "pendingDiscovery".into(),
            json!(pending_discovery.contains(id)),
        );
        entry.insert("routeSlaveSuc".into(), json!(route_slave_suc.contains(id)));
        entry.insert(
            "controllerSucUpdateIndex".into(),
            json!(img.buf[suc_index.offset + index]),
        );
        entry.insert("neighbours".into(), img.elem_json(routing_table, index));
        entry.insert("nodeInfo".into(), img.elem_json(node_table, index));
        entry.insert(
            "routeCache".into(),
            json!({
                "applock": app_lock.contains(id),
                "LWR": img.elem_json(lwr, index),
                "NLWR": img.elem_json(nlwr, index),
            }),
        );
        nodes.push(Value::Object(entry));
    }
    Value::Array(nodes)
}

/// All 64 stored SUC update entries, no existence filtering.
fn suc_state(img: &Image<'_>) -> Value {
    json!({
        "lastIndex": img.field_json("suc_last_index"),
        "updateNodeList": img.field_json("suc_node_list"),
    })
}

/// Host application area with trailing zeros trimmed; `None` when the
/// whole area is zero.
fn application_data(img: &Image<'_>) -> Option<Value> {
    let field = img.layout.field("host_data");
    let data = &img.buf[field.offset..field.offset + field.count];
    let len = data.iter().rposition(|&b| b != 0).map(|p| p + 1)?;
    Some(Value::String(base64_encode(&data[..len])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm500::layout::{
        BRIDGE_6_8, CONFIGURATION_VALID_0, CONFIGURATION_VALID_1, MAGIC_VALUE, ROUTECACHE_VALID,
        STATIC_6_7,
    };

    fn blank_image(layout: &Layout) -> Vec<u8> {
        let mut buf = vec![0u8; layout.image_size()];
        buf[layout.field("app_magic").offset] = MAGIC_VALUE;
        buf[layout.field("config_valid").offset] = CONFIGURATION_VALID_0;
        buf[layout.field("config_really_valid").offset] = CONFIGURATION_VALID_1;
        buf[layout.field("route_cache_magic").offset] = ROUTECACHE_VALID;
        buf
    }

    #[test]
    fn test_zero_generic_byte_means_no_node() {
        let layout = &*BRIDGE_6_8;
        let mut buf = blank_image(layout);

        // Node 5 gets a generic class; node 6 capability only.
        let node_table = layout.field("node_table");
        buf[node_table.elem_range(4).start + 3] = 0x10;
        buf[node_table.elem_range(5).start] = 0x80;

        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        let table = &doc["zwController"]["nodeTable"];
        assert_eq!(table.as_array().unwrap().len(), 1);
        assert_eq!(table[0]["nodeId"], 5);
    }

    #[test]
    fn test_last_classic_id_is_never_scanned() {
        let layout = &*BRIDGE_6_8;
        let mut buf = blank_image(layout);
        let node_table = layout.field("node_table");
        buf[node_table.elem_range(231).start + 3] = 0x10;

        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        assert!(doc["zwController"]["nodeTable"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_static_layout_exports_no_virtual_node_flag() {
        let layout = &*STATIC_6_7;
        let mut buf = blank_image(layout);
        let node_table = layout.field("node_table");
        buf[node_table.elem_range(0).start + 3] = 0x20;

        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        let entry = &doc["zwController"]["nodeTable"][0];
        assert!(entry.get("virtualNode").is_none());
        assert!(entry.get("pendingUpdate").is_some());
    }

    #[test]
    fn test_application_data_omitted_when_all_zero() {
        let layout = &*BRIDGE_6_8;
        let buf = blank_image(layout);
        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        assert!(doc["zwController"].get("applicationData").is_none());
    }

    #[test]
    fn test_application_data_trims_trailing_zeros() {
        let layout = &*BRIDGE_6_8;
        let mut buf = blank_image(layout);
        let host = layout.field("host_data");
        buf[host.offset] = 0xAB;
        buf[host.offset + 1] = 0xCD;

        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        let encoded = doc["zwController"]["applicationData"].as_str().unwrap();
        assert_eq!(
            crate::json::base64_decode(encoded).unwrap(),
            vec![0xAB, 0xCD]
        );
    }

    #[test]
    fn test_suc_state_keeps_all_64_entries() {
        let layout = &*STATIC_6_7;
        let buf = blank_image(layout);
        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        let list = doc["zwController"]["sucState"]["updateNodeList"].as_array().unwrap();
        assert_eq!(list.len(), 64);
        assert!(list[0]["nodeInfo"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_version_strings_come_from_the_line() {
        let layout = &*STATIC_6_7;
        let buf = blank_image(layout);
        let mut report = Report::new();
        let doc = export(layout, &buf, &mut report).unwrap();
        assert_eq!(doc["backupInfo"]["sourceProtocolVersion"], "06.07.00");
        assert_eq!(doc["backupInfo"]["backupFormatVersion"], 1);
    }
}
