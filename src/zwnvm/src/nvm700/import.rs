//! JSON snapshot → object store.
//!
//! The CLI format fixes the target file-system revision and firmware
//! triple; the JSON's own `sourceProtocolVersion` only matters for
//! selecting the application-configuration record shape. Required keys
//! that are missing keep the conversion going so one pass reports every
//! problem, but a handful of structural failures stop it immediately.

use byteorder::{ByteOrder, LittleEndian};
use serde_json::Value;

use crate::error::NvmError;
use crate::json::{base64_decode, JsonNode, JsonPath, JsonType, Presence};
use crate::mask::{ClassicNodeMask, LongRangeNodeMask};
use crate::report::Report;

use super::layout::{
    self, application_files, ConfigShape, FileDescriptor, FsVersion, FILE_ID_APPLICATIONCMDINFO,
    FILE_ID_APPLICATIONCONFIGURATION, FILE_ID_APPLICATIONDATA, FILE_ID_APPLICATIONSETTINGS,
    FILE_ID_APP_ROUTE_LOCK_FLAG, FILE_ID_BRIDGE_NODE_FLAG, FILE_ID_CONTROLLERINFO,
    FILE_ID_LRANGE_NODE_EXIST, FILE_ID_LR_TX_POWER_V2, FILE_ID_LR_TX_POWER_V3,
    FILE_ID_NODE_ROUTECACHE_EXIST, FILE_ID_NODE_STORAGE_EXIST, FILE_ID_PENDING_DISCOVERY_FLAG,
    FILE_ID_ROUTE_SLAVE_SUC_FLAG, FILE_ID_SUCNODELIST, FILE_ID_SUC_PENDING_UPDATE_FLAG,
    FILE_ID_ZW_VERSION, ZAF_FILE_ID_APP_VERSION,
};
use super::records::{
    AppConfig, ApplicationSettings, CmdClassInfo, ControllerInfo, LrNodeInfo, NodeInfoRecord,
    NodeRouteCache, RouteCacheLine, SucUpdateEntry, APP_DATA_SIZE, CMD_CLASS_MAX,
    CONTROLLER_ON_OTHER_NETWORK, LR_NODEINFO_SIZE, NODEINFO_SIZE, ROUTECACHE_SIZE, SUC_ENTRIES,
    SUC_ENTRY_SIZE, SUC_NODELIST_SIZE, SUC_NODEPARM_MAX,
};
use super::store::{Geometry, Instance, ObjectStore};

use Presence::{Optional, Required};

/// What the selected CLI format commits the output image to.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub version: FsVersion,
    pub triple: (u8, u8, u8),
    pub geometry: Geometry,
}

fn fail(report: &Report) -> NvmError {
    NvmError::ConversionFailed {
        report: report.clone(),
    }
}

/// Parse a `backupInfo` version string, stopping the conversion when it
/// is not three dot-separated decimal fields.
fn source_version(
    info: &JsonNode<'_>,
    key: &str,
    report: &mut Report,
) -> Result<(u8, u8, u8), NvmError> {
    let s = info.get_string(report, key, "00.00.00", Required);
    match crate::json::parse_version(s) {
        Some(triple) => Ok(triple),
        None => {
            report.parse_error(format!(
                "ERROR: Incorrectly formatted {key}: \"{s}\". Must be like \"dd.dd.dd\" (d:0-9)."
            ));
            Err(fail(report))
        }
    }
}

pub fn import(target: Target, doc: &Value, report: &mut Report) -> Result<Vec<u8>, NvmError> {
    let mut store = ObjectStore::create(target.geometry);
    let files = target.version.protocol_files();
    let root_path = JsonPath::root();
    let root = JsonNode::new(doc, &root_path);

    let Some((info, info_path)) = root.get(report, "backupInfo", JsonType::Object, Required)
    else {
        return Err(fail(report));
    };
    let info = JsonNode::new(info, &info_path);
    let format_version = info.get_int(report, "backupFormatVersion", 0, Required);
    if format_version != 1 {
        report.parse_error(format!(
            "ERROR: Unsupported backupFormatVersion: {format_version}. Must be 1."
        ));
        return Err(fail(report));
    }
    source_version(&info, "sourceProtocolVersion", report)?;
    let app_triple = source_version(&info, "sourceAppVersion", report)?;
    let shape = ConfigShape::select(app_triple.1, app_triple.2);
    let app_files = application_files(shape);

    // The output's own version objects come from the target format, not
    // from the backup those objects describe.
    let protocol_word = (u32::from(target.version.format_byte()) << 24)
        | (u32::from(target.triple.0) << 16)
        | (u32::from(target.triple.1) << 8)
        | u32::from(target.triple.2);
    let mut word = [0u8; 4];
    LittleEndian::write_u32(&mut word, protocol_word);
    store.write_logged(Instance::Protocol, FILE_ID_ZW_VERSION, &word, files, report);
    LittleEndian::write_u32(&mut word, 7 << 16);
    store.write_logged(
        Instance::Application,
        ZAF_FILE_ID_APP_VERSION,
        &word,
        &app_files,
        report,
    );

    let Some((ctrl, ctrl_path)) = root.get(report, "zwController", JsonType::Object, Required)
    else {
        return Err(fail(report));
    };
    let ctrl = JsonNode::new(ctrl, &ctrl_path);

    let mut controller = ControllerInfo::default();
    controller.node_id = ctrl.get_int(report, "nodeId", 0, Required) as u16;
    controller.controller_configuration =
        ctrl.get_int(report, "controllerConfiguration", 0, Required) as u8;
    controller.static_controller_node_id =
        ctrl.get_int(report, "staticControllerNodeId", 0, Optional) as u16;
    controller.system_state = ctrl.get_int(report, "systemState", 0, Optional) as u8;

    if controller.controller_configuration & CONTROLLER_ON_OTHER_NETWORK != 0 {
        controller.home_id = ctrl.get_home_id(report, "learnedHomeId", 0, Required);
        if controller.node_id == 0 {
            report.parse_error(
                "ERROR: nodeId of controller is zero while controllerConfiguration has \
                 flag CONTROLLER_ON_OTHER_NETWORK (0x02) set.",
            );
            return Err(fail(report));
        }
    } else {
        controller.home_id = ctrl.get_home_id(report, "ownHomeId", 0, Required);
        // On its own network the controller is always node 1.
        controller.node_id = 1;
    }

    let mut cmd_classes = [0u8; CMD_CLASS_MAX];
    let n = ctrl.get_bytearray(report, "cmdClassList", &mut cmd_classes, Required);
    let mut cmd_info = CmdClassInfo::default();
    cmd_info.set_unsecure_included(&cmd_classes[..n]);

    let tables = import_node_table(target, &ctrl, &controller, &mut store, files, report);
    if !tables.controller_found && controller.node_id != 0 {
        report.parse_error(format!(
            "ERROR: No entry for controller node (nodeId: {}) found at {}/nodeTable.",
            controller.node_id,
            ctrl.path().as_str()
        ));
    }

    controller.last_used_node_id =
        ctrl.get_int(report, "lastUsedNodeId", i64::from(tables.classic_max), Optional) as u8;
    controller.max_node_id = tables.classic_max;
    if target.version.has_long_range() {
        controller.last_used_node_id_lr =
            ctrl.get_int(report, "lastUsedNodeIdLR", i64::from(tables.lr_max), Optional) as u16;
        controller.max_node_id_lr = tables.lr_max;
        controller.primary_long_range_channel_id =
            ctrl.get_int(report, "primaryLongRangeChannelId", 0, Optional) as u8;
        controller.dcdc_config = ctrl.get_int(report, "dcdcConfig", 0, Optional) as u8;
    }

    controller.suc_last_index = import_suc_state(&ctrl, &mut store, files, report);

    if target.version.has_long_range() {
        store.write_logged(
            Instance::Protocol,
            FILE_ID_CONTROLLERINFO,
            &controller.encode_long(),
            files,
            report,
        );
    } else {
        store.write_logged(
            Instance::Protocol,
            FILE_ID_CONTROLLERINFO,
            &controller.encode_short(),
            files,
            report,
        );
    }

    write_mask(&mut store, FILE_ID_NODE_STORAGE_EXIST, &tables.exists, files, report);
    write_mask(&mut store, FILE_ID_APP_ROUTE_LOCK_FLAG, &tables.app_lock, files, report);
    write_mask(
        &mut store,
        FILE_ID_ROUTE_SLAVE_SUC_FLAG,
        &tables.route_slave_suc,
        files,
        report,
    );
    write_mask(
        &mut store,
        FILE_ID_SUC_PENDING_UPDATE_FLAG,
        &tables.pending_update,
        files,
        report,
    );
    write_mask(&mut store, FILE_ID_BRIDGE_NODE_FLAG, &tables.virtual_nodes, files, report);
    write_mask(
        &mut store,
        FILE_ID_PENDING_DISCOVERY_FLAG,
        &tables.pending_discovery,
        files,
        report,
    );
    write_mask(
        &mut store,
        FILE_ID_NODE_ROUTECACHE_EXIST,
        &tables.route_cache_exists,
        files,
        report,
    );
    if target.version.has_long_range() {
        store.write_logged(
            Instance::Protocol,
            FILE_ID_LRANGE_NODE_EXIST,
            tables.lr_exists.as_bytes(),
            files,
            report,
        );
    }

    store.write_logged(
        Instance::Application,
        FILE_ID_APPLICATIONCMDINFO,
        &cmd_info.encode(),
        &app_files,
        report,
    );
    store.write_logged(
        Instance::Application,
        FILE_ID_APPLICATIONSETTINGS,
        &tables.settings.encode(),
        &app_files,
        report,
    );

    import_application_data(&ctrl, &mut store, &app_files, report)?;

    // appConfig sits beside zwController at the document root.
    let mut config = AppConfig::default();
    if let Some((app, app_path)) = root.get(report, "appConfig", JsonType::Object, Optional) {
        let app = JsonNode::new(app, &app_path);
        config.rf_region = app.get_int_any(report, "rfRegion", 0, Optional) as u8;
        config.tx_power = app.get_int_any(report, "txPower", 0, Optional) as i16;
        config.power_0dbm_measured =
            app.get_int_any(report, "power0dbmMeasured", 0, Optional) as i16;
        config.enable_pti = app.get_int(report, "enablePTI", 0, Optional) as u8;
        config.max_tx_power = app.get_int_any(report, "maxTxPower", 140, Optional) as i16;
    }
    store.write_logged(
        Instance::Application,
        FILE_ID_APPLICATIONCONFIGURATION,
        &config.encode(shape),
        &app_files,
        report,
    );

    if report.has_errors() {
        Err(fail(report))
    } else {
        Ok(store.to_image())
    }
}

fn write_mask(
    store: &mut ObjectStore,
    key: u32,
    mask: &ClassicNodeMask,
    files: &[FileDescriptor],
    report: &mut Report,
) {
    store.write_logged(Instance::Protocol, key, mask.as_bytes(), files, report);
}

/// Read-modify-write staging block for one ranged file key.
fn read_or_zeroed(store: &ObjectStore, key: u32, len: usize) -> Vec<u8> {
    match store.read(Instance::Protocol, key) {
        Some(payload) => {
            let mut block = payload.to_vec();
            block.resize(len, 0);
            block
        }
        None => vec![0; len],
    }
}

/// Per-node flags accumulated during the node-table walk; each mask
/// becomes its own protocol file afterwards.
#[derive(Default)]
struct NodeTables {
    exists: ClassicNodeMask,
    app_lock: ClassicNodeMask,
    route_slave_suc: ClassicNodeMask,
    pending_update: ClassicNodeMask,
    virtual_nodes: ClassicNodeMask,
    pending_discovery: ClassicNodeMask,
    route_cache_exists: ClassicNodeMask,
    lr_exists: LongRangeNodeMask,
    classic_max: u8,
    lr_max: u16,
    settings: ApplicationSettings,
    controller_found: bool,
}

fn import_node_table(
    target: Target,
    ctrl: &JsonNode<'_>,
    controller: &ControllerInfo,
    store: &mut ObjectStore,
    files: &'static [FileDescriptor],
    report: &mut Report,
) -> NodeTables {
    let mut tables = NodeTables::default();
    let Some((table, table_path)) = ctrl.get(report, "nodeTable", JsonType::Array, Required)
    else {
        return tables;
    };
    let Value::Array(entries) = table else {
        return tables;
    };

    for (i, entry) in entries.iter().enumerate().take(1279) {
        let entry_path = table_path.item(i);
        let node = JsonNode::new(entry, &entry_path);
        let id = node.get_int(report, "nodeId", 0, Required);
        match id {
            1..=232 => import_classic_node(
                target, &node, id as u16, controller, store, files, report, &mut tables,
            ),
            256..=1279 => import_lr_node(target, &node, id as u16, store, files, report, &mut tables),
            // Anything else is not a storable node id and is skipped.
            _ => {}
        }
    }
    tables
}

#[allow(clippy::too_many_arguments)]
fn import_classic_node(
    target: Target,
    node: &JsonNode<'_>,
    id: u16,
    controller: &ControllerInfo,
    store: &mut ObjectStore,
    files: &'static [FileDescriptor],
    report: &mut Report,
    tables: &mut NodeTables,
) {
    let index = u32::from(id) - 1;
    let mut record = NodeInfoRecord::default();
    record.suc_update_index = node.get_int(report, "controllerSucUpdateIndex", 0, Optional) as u8;
    record.neighbours = node.get_nodemask(report, "neighbours", Optional);
    if let Some((info, info_path)) = node.get(report, "nodeInfo", JsonType::Object, Optional) {
        let info = JsonNode::new(info, &info_path);
        record.capability = info.get_int(report, "capability", 0, Required) as u8;
        record.security = info.get_int(report, "security", 0, Required) as u8;
        record.reserved = info.get_int(report, "reserved", 0, Optional) as u8;
        record.generic = info.get_int(report, "generic", 0, Required) as u8;
        record.specific = info.get_int(report, "specific", 0, Required) as u8;
    }

    let (key, offset) = layout::nodeinfo_location(target.version, index);
    let block_len = if target.version.packed_nodeinfo() {
        NODEINFO_SIZE * layout::NODEINFO_V1_PER_FILE as usize
    } else {
        NODEINFO_SIZE
    };
    let mut block = read_or_zeroed(store, key, block_len);
    record.encode(&mut block[offset..offset + NODEINFO_SIZE]);
    store.write_logged(Instance::Protocol, key, &block, files, report);

    tables.exists.set(id);
    if node.get_bool(report, "virtualNode", false, Optional) {
        tables.virtual_nodes.set(id);
    }
    if node.get_bool(report, "pendingUpdate", false, Optional) {
        tables.pending_update.set(id);
    }
    if node.get_bool(report, "pendingDiscovery", false, Optional) {
        tables.pending_discovery.set(id);
    }
    if node.get_bool(report, "routeSlaveSuc", false, Optional) {
        tables.route_slave_suc.set(id);
    }
    tables.classic_max = tables.classic_max.max(id as u8);

    if id == controller.node_id {
        tables.controller_found = true;
        // The application-settings file restates the controller's own
        // listening/security bits and device classes.
        let mut listening = 0u8;
        if record.capability & 0x80 != 0 {
            listening |= 0x01;
        }
        if record.security & 0x80 != 0 {
            listening |= 0x02;
        }
        tables.settings = ApplicationSettings {
            listening,
            generic: record.generic,
            specific: record.specific,
        };
    }

    if let Some((cache, cache_path)) = node.get(report, "routeCache", JsonType::Object, Optional) {
        let cache = JsonNode::new(cache, &cache_path);
        if cache.get_bool(report, "applock", false, Optional) {
            tables.app_lock.set(id);
        }
        let route_cache = NodeRouteCache {
            lwr: import_route_line(&cache, "LWR", report),
            nlwr: import_route_line(&cache, "NLWR", report),
        };
        tables.route_cache_exists.set(id);

        let (key, offset) = layout::routecache_location(target.version, index);
        let block_len = if target.version.packed_nodeinfo() {
            ROUTECACHE_SIZE * layout::NODEROUTECACHE_V1_PER_FILE as usize
        } else {
            ROUTECACHE_SIZE
        };
        let mut block = read_or_zeroed(store, key, block_len);
        route_cache.encode(&mut block[offset..offset + ROUTECACHE_SIZE]);
        store.write_logged(Instance::Protocol, key, &block, files, report);
    }
}

fn import_route_line(cache: &JsonNode<'_>, key: &str, report: &mut Report) -> RouteCacheLine {
    let mut line = RouteCacheLine::default();
    if let Some((value, path)) = cache.get(report, key, JsonType::Object, Optional) {
        let value = JsonNode::new(value, &path);
        line.conf = value.get_int(report, "routecacheLineConf", 0, Required) as u8;
        value.get_bytearray(report, "repeaters", &mut line.repeaters, Required);
    }
    line
}

fn import_lr_node(
    target: Target,
    node: &JsonNode<'_>,
    id: u16,
    store: &mut ObjectStore,
    files: &'static [FileDescriptor],
    report: &mut Report,
    tables: &mut NodeTables,
) {
    tables.lr_max = tables.lr_max.max(id);
    if !target.version.has_long_range() {
        // Pre-v2 file systems have nowhere to put a long-range node.
        return;
    }
    let position = id - 255;
    let index = u32::from(id) - 256;

    let record = LrNodeInfo {
        packed_info: node.get_int(report, "packedInfo", 0, Required) as u8,
        generic: node.get_int(report, "generic", 0, Required) as u8,
        specific: node.get_int(report, "specific", 0, Required) as u8,
    };
    let (key, offset) = layout::lr_nodeinfo_location(index);
    let block_len = LR_NODEINFO_SIZE * layout::NODEINFO_LR_PER_FILE as usize;
    let mut block = read_or_zeroed(store, key, block_len);
    record.encode(&mut block[offset..offset + LR_NODEINFO_SIZE]);
    store.write_logged(Instance::Protocol, key, &block, files, report);
    tables.lr_exists.set(position);

    match target.version {
        FsVersion::V2 => {
            let tx = node.get_int(report, "txPower", 0, Required) as u8;
            let key = FILE_ID_LR_TX_POWER_V2 + index / 64;
            let mut block = read_or_zeroed(store, key, 32);
            let slot = ((index % 64) / 2) as usize;
            if index % 2 == 0 {
                block[slot] = (block[slot] & 0xF0) | (tx & 0x0F);
            } else {
                block[slot] = (block[slot] & 0x0F) | (tx & 0xF0);
            }
            store.write_logged(Instance::Protocol, key, &block, files, report);
        }
        FsVersion::V3 => {
            let tx = node.get_int(report, "txPower", 0, Required) as u8;
            let key = FILE_ID_LR_TX_POWER_V3 + index / 32;
            let mut block = read_or_zeroed(store, key, 32);
            block[(index % 32) as usize] = tx;
            store.write_logged(Instance::Protocol, key, &block, files, report);
        }
        // v4 dropped the per-node tx-power files.
        _ => {}
    }
}

/// The SUC node list always serializes all 64 entry slots.
fn import_suc_state(
    ctrl: &JsonNode<'_>,
    store: &mut ObjectStore,
    files: &'static [FileDescriptor],
    report: &mut Report,
) -> u8 {
    let Some((suc, suc_path)) = ctrl.get(report, "sucState", JsonType::Object, Required) else {
        return 0;
    };
    let suc = JsonNode::new(suc, &suc_path);
    let last_index = suc.get_int(report, "lastIndex", 0, Required) as u8;

    let mut list = vec![0u8; SUC_NODELIST_SIZE];
    if let Some((Value::Array(items), items_path)) =
        suc.get(report, "updateNodeList", JsonType::Array, Required)
    {
        for (i, item) in items.iter().enumerate().take(SUC_ENTRIES) {
            let item_path = items_path.item(i);
            let item = JsonNode::new(item, &item_path);
            let mut entry = SucUpdateEntry {
                node_id: item.get_int(report, "nodeId", 0, Required) as u8,
                change_type: item.get_int(report, "changeType", 0, Required) as u8,
                ..Default::default()
            };
            let mut params = [0u8; SUC_NODEPARM_MAX];
            item.get_bytearray(report, "nodeInfo", &mut params, Required);
            entry.node_info = params;
            entry.encode(&mut list[i * SUC_ENTRY_SIZE..(i + 1) * SUC_ENTRY_SIZE]);
        }
    }
    store.write_logged(Instance::Protocol, FILE_ID_SUCNODELIST, &list, files, report);
    last_index
}

fn import_application_data(
    ctrl: &JsonNode<'_>,
    store: &mut ObjectStore,
    app_files: &[FileDescriptor],
    report: &mut Report,
) -> Result<(), NvmError> {
    let mut data = vec![0u8; APP_DATA_SIZE];
    if let Some((value, _)) = ctrl.get(report, "applicationData", JsonType::String, Optional) {
        let Some(decoded) = value.as_str().and_then(base64_decode) else {
            report.parse_error("ERROR: Could not base64 decode \"applicationData\".");
            return Err(fail(report));
        };
        if decoded.len() > APP_DATA_SIZE {
            let lost = decoded[APP_DATA_SIZE..].iter().filter(|&&b| b != 0).count();
            if lost > 0 {
                report.warning(format!(
                    "WARNING: \"applicationData\" will be truncated. Bytes with non-zero \
                     values: {lost}. Max application data size in generated NVM image: \
                     {APP_DATA_SIZE}."
                ));
            }
        }
        let n = decoded.len().min(APP_DATA_SIZE);
        data[..n].copy_from_slice(&decoded[..n]);
    }
    store.write_logged(
        Instance::Application,
        FILE_ID_APPLICATIONDATA,
        &data,
        app_files,
        report,
    );
    Ok(())
}
