//! Object store → JSON snapshot.
//!
//! The image's own protocol version object selects the file table; the
//! CLI format only chose the geometry. v0/v1 images export the short
//! controller-info shape, v2 and later the long one.

use byteorder::{ByteOrder, LittleEndian};
use serde_json::{json, Map, Value};

use crate::error::NvmError;
use crate::json::{base64_encode, nodemask_to_json, version_to_string};
use crate::mask::{ClassicNodeMask, LongRangeNodeMask};
use crate::report::Report;

use super::layout::{
    self, application_files, ConfigShape, FileDescriptor, FsVersion, FILE_ID_APPLICATIONCMDINFO,
    FILE_ID_APPLICATIONCONFIGURATION, FILE_ID_APPLICATIONDATA, FILE_ID_APP_ROUTE_LOCK_FLAG,
    FILE_ID_BRIDGE_NODE_FLAG, FILE_ID_CONTROLLERINFO, FILE_ID_LRANGE_NODE_EXIST,
    FILE_ID_LR_TX_POWER_V2, FILE_ID_LR_TX_POWER_V3, FILE_ID_NODE_ROUTECACHE_EXIST,
    FILE_ID_NODE_STORAGE_EXIST, FILE_ID_PENDING_DISCOVERY_FLAG, FILE_ID_ROUTE_SLAVE_SUC_FLAG,
    FILE_ID_SUCNODELIST, FILE_ID_SUC_PENDING_UPDATE_FLAG, FILE_ID_ZW_VERSION,
    ZAF_FILE_ID_APP_VERSION,
};
use super::records::{
    AppConfig, CmdClassInfo, ControllerInfo, LrNodeInfo, NodeInfoRecord, NodeRouteCache,
    SucUpdateEntry, APP_DATA_SIZE, CMD_CLASS_INFO_SIZE, SUC_ENTRIES, SUC_ENTRY_SIZE,
    SUC_NODELIST_SIZE,
};
use super::store::{Instance, ObjectStore};

/// Read the protocol version object and split it into the file-system
/// revision and the firmware triple.
pub fn image_version(
    store: &ObjectStore,
    report: &mut Report,
) -> Result<(FsVersion, (u8, u8, u8)), NvmError> {
    let Some(payload) = store.read(Instance::Protocol, FILE_ID_ZW_VERSION) else {
        report.store_error(format!(
            "ERROR nvm3 file FILE_ID_ZW_VERSION (0x{FILE_ID_ZW_VERSION:x}) not found"
        ));
        return Err(NvmError::ObjectUnreadable {
            key: FILE_ID_ZW_VERSION,
        });
    };
    let mut word = [0u8; 4];
    let n = payload.len().min(4);
    word[..n].copy_from_slice(&payload[..n]);
    let value = LittleEndian::read_u32(&word);
    let format_byte = (value >> 24) as u8;
    let version = FsVersion::from_format_byte(format_byte)
        .ok_or(NvmError::UnsupportedFileSystem(format_byte))?;
    let triple = (
        ((value >> 16) & 0xff) as u8,
        ((value >> 8) & 0xff) as u8,
        (value & 0xff) as u8,
    );
    Ok((version, triple))
}

pub fn export(
    geometry: super::Geometry,
    image: &[u8],
    report: &mut Report,
) -> Result<Value, NvmError> {
    let store = ObjectStore::open(geometry, image)?;
    let (version, triple) = image_version(&store, report)?;
    let files = version.protocol_files();
    let shape = ConfigShape::select(triple.1, triple.2);
    let app_files = application_files(shape);

    store.dump_keys(Instance::Application, &app_files, report);
    store.dump_keys(Instance::Protocol, files, report);

    let protocol_word = read_u32(&store, Instance::Protocol, FILE_ID_ZW_VERSION);
    let app_word = read_u32(&store, Instance::Application, ZAF_FILE_ID_APP_VERSION);

    let info_bytes = store
        .read_logged(
            Instance::Protocol,
            FILE_ID_CONTROLLERINFO,
            version.controllerinfo_size(),
            files,
            report,
        )
        .unwrap_or_else(|| vec![0; version.controllerinfo_size()]);
    let info = if version.has_long_range() {
        ControllerInfo::decode_long(&info_bytes)
    } else {
        ControllerInfo::decode_short(&info_bytes)
    };

    let mut root = Map::new();
    root.insert(
        "backupInfo".into(),
        json!({
            "backupFormatVersion": 1,
            "sourceProtocolVersion": version_to_string(protocol_word),
            "sourceAppVersion": version_to_string(app_word),
            "date": chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string(),
        }),
    );

    let home_id = crate::json::home_id_to_string(info.home_id);
    let mut ctrl = Map::new();
    ctrl.insert("nodeId".into(), json!(info.node_id));
    ctrl.insert("ownHomeId".into(), json!(home_id));
    ctrl.insert("learnedHomeId".into(), json!(home_id));
    ctrl.insert("lastUsedNodeId".into(), json!(info.last_used_node_id));
    if version.has_long_range() {
        ctrl.insert("lastUsedNodeIdLR".into(), json!(info.last_used_node_id_lr));
        ctrl.insert(
            "primaryLongRangeChannelId".into(),
            json!(info.primary_long_range_channel_id),
        );
        ctrl.insert("dcdcConfig".into(), json!(info.dcdc_config));
    }
    ctrl.insert(
        "staticControllerNodeId".into(),
        json!(info.static_controller_node_id),
    );
    ctrl.insert(
        "controllerConfiguration".into(),
        json!(info.controller_configuration),
    );
    ctrl.insert("systemState".into(), json!(info.system_state));

    let cmd_info = store
        .read_logged(
            Instance::Application,
            FILE_ID_APPLICATIONCMDINFO,
            CMD_CLASS_INFO_SIZE,
            &app_files,
            report,
        )
        .map(|b| CmdClassInfo::decode(&b))
        .unwrap_or_default();
    ctrl.insert(
        "cmdClassList".into(),
        json!(cmd_info.unsecure_included()),
    );

    ctrl.insert(
        "nodeTable".into(),
        node_table(&store, version, files, report),
    );
    ctrl.insert(
        "sucState".into(),
        suc_state(&store, &info, files, report),
    );
    if let Some(data) = application_data(&store, &app_files, report) {
        ctrl.insert("applicationData".into(), data);
    }
    root.insert("zwController".into(), Value::Object(ctrl));

    root.insert(
        "appConfig".into(),
        app_config(&store, shape, &app_files, report),
    );

    if report.has_errors() {
        return Err(NvmError::ConversionFailed {
            report: report.clone(),
        });
    }
    Ok(Value::Object(root))
}

fn read_u32(store: &ObjectStore, instance: Instance, key: u32) -> u32 {
    store
        .read(instance, key)
        .filter(|b| b.len() >= 4)
        .map(|b| LittleEndian::read_u32(&b[..4]))
        .unwrap_or(0)
}

fn read_classic_mask(
    store: &ObjectStore,
    key: u32,
    files: &[FileDescriptor],
    report: &mut Report,
) -> ClassicNodeMask {
    store
        .read_logged(Instance::Protocol, key, 29, files, report)
        .map(|b| ClassicNodeMask::from_slice(&b))
        .unwrap_or_default()
}

fn node_table(
    store: &ObjectStore,
    version: FsVersion,
    files: &[FileDescriptor],
    report: &mut Report,
) -> Value {
    let exists = read_classic_mask(store, FILE_ID_NODE_STORAGE_EXIST, files, report);
    let app_lock = read_classic_mask(store, FILE_ID_APP_ROUTE_LOCK_FLAG, files, report);
    let route_slave_suc = read_classic_mask(store, FILE_ID_ROUTE_SLAVE_SUC_FLAG, files, report);
    let pending_update = read_classic_mask(store, FILE_ID_SUC_PENDING_UPDATE_FLAG, files, report);
    let virtual_nodes = read_classic_mask(store, FILE_ID_BRIDGE_NODE_FLAG, files, report);
    let pending_discovery =
        read_classic_mask(store, FILE_ID_PENDING_DISCOVERY_FLAG, files, report);
    let route_cache_exists =
        read_classic_mask(store, FILE_ID_NODE_ROUTECACHE_EXIST, files, report);

    let mut nodes = Vec::new();
    for id in 1..=232u16 {
        if !exists.contains(id) {
            continue;
        }
        let index = (id - 1) as u32;
        let (key, offset) = layout::nodeinfo_location(version, index);
        let record_len = if version.packed_nodeinfo() { 140 } else { 35 };
        let Some(block) = store.read_logged(Instance::Protocol, key, record_len, files, report)
        else {
            continue;
        };
        let record = NodeInfoRecord::decode(&block[offset..offset + 35]);

        let mut entry = Map::new();
        entry.insert("nodeId".into(), json!(id));
        entry.insert("virtualNode".into(), json!(virtual_nodes.contains(id)));
        entry.insert("pendingUpdate".into(), json!(pending_update.contains(id)));
        entry.insert(
            "pendingDiscovery".into(),
            json!(pending_discovery.contains(id)),
        );
        entry.insert("routeSlaveSuc".into(), json!(route_slave_suc.contains(id)));
        entry.insert(
            "controllerSucUpdateIndex".into(),
            json!(record.suc_update_index),
        );
        entry.insert("neighbours".into(), nodemask_to_json(&record.neighbours));
        entry.insert(
            "nodeInfo".into(),
            json!({
                "capability": record.capability,
                "security": record.security,
                "reserved": record.reserved,
                "generic": record.generic,
                "specific": record.specific,
            }),
        );

        if route_cache_exists.contains(id) {
            let (key, offset) = layout::routecache_location(version, index);
            let record_len = if version.packed_nodeinfo() { 80 } else { 10 };
            if let Some(block) =
                store.read_logged(Instance::Protocol, key, record_len, files, report)
            {
                let cache = NodeRouteCache::decode(&block[offset..offset + 10]);
                entry.insert(
                    "routeCache".into(),
                    json!({
                        "applock": app_lock.contains(id),
                        "LWR": route_cache_line_json(&cache.lwr),
                        "NLWR": route_cache_line_json(&cache.nlwr),
                    }),
                );
            }
        }
        nodes.push(Value::Object(entry));
    }

    if version.has_long_range() {
        long_range_nodes(store, version, files, report, &mut nodes);
    }
    Value::Array(nodes)
}

fn route_cache_line_json(line: &super::records::RouteCacheLine) -> Value {
    json!({
        "routecacheLineConf": line.conf,
        "repeaters": line.repeaters,
    })
}

/// Long-range mask position N maps to JSON node id N + 255.
fn long_range_nodes(
    store: &ObjectStore,
    version: FsVersion,
    files: &[FileDescriptor],
    report: &mut Report,
    nodes: &mut Vec<Value>,
) {
    let exists = store
        .read_logged(Instance::Protocol, FILE_ID_LRANGE_NODE_EXIST, 128, files, report)
        .map(|b| LongRangeNodeMask::from_slice(&b))
        .unwrap_or_default();

    for position in 1..=1024u16 {
        if !exists.contains(position) {
            continue;
        }
        let node_id = position + 255;
        let index = (position - 1) as u32;
        let (key, offset) = layout::lr_nodeinfo_location(index);
        let Some(block) = store.read_logged(Instance::Protocol, key, 150, files, report) else {
            continue;
        };
        let record = LrNodeInfo::decode(&block[offset..offset + 3]);

        let mut entry = Map::new();
        entry.insert("nodeId".into(), json!(node_id));
        entry.insert("packedInfo".into(), json!(record.packed_info));
        entry.insert("generic".into(), json!(record.generic));
        entry.insert("specific".into(), json!(record.specific));
        if let Some(tx_power) = lr_tx_power(store, version, index, files, report) {
            entry.insert("txPower".into(), json!(tx_power));
        }
        nodes.push(Value::Object(entry));
    }
}

/// v2 packs two nodes per tx-power byte; the odd node keeps the high
/// nibble unshifted. v3 stores one byte per node. v4 carries no tx-power
/// file at all.
fn lr_tx_power(
    store: &ObjectStore,
    version: FsVersion,
    index: u32,
    files: &[FileDescriptor],
    report: &mut Report,
) -> Option<u8> {
    match version {
        FsVersion::V2 => {
            let key = FILE_ID_LR_TX_POWER_V2 + index / 64;
            let block = store.read_logged(Instance::Protocol, key, 32, files, report)?;
            let byte = block[((index % 64) / 2) as usize];
            Some(if index % 2 == 0 { byte & 0x0F } else { byte & 0xF0 })
        }
        FsVersion::V3 => {
            let key = FILE_ID_LR_TX_POWER_V3 + index / 32;
            let block = store.read_logged(Instance::Protocol, key, 32, files, report)?;
            Some(block[(index % 32) as usize])
        }
        _ => None,
    }
}

/// All 64 SUC update entries; the zero parameters are filtered from each
/// entry's list, never the entries themselves.
fn suc_state(
    store: &ObjectStore,
    info: &ControllerInfo,
    files: &[FileDescriptor],
    report: &mut Report,
) -> Value {
    let list = store
        .read_logged(
            Instance::Protocol,
            FILE_ID_SUCNODELIST,
            SUC_NODELIST_SIZE,
            files,
            report,
        )
        .unwrap_or_else(|| vec![0; SUC_NODELIST_SIZE]);
    let entries: Vec<Value> = (0..SUC_ENTRIES)
        .map(|i| {
            let entry = SucUpdateEntry::decode(&list[i * SUC_ENTRY_SIZE..(i + 1) * SUC_ENTRY_SIZE]);
            let params: Vec<u8> = entry.node_info.iter().copied().filter(|&p| p != 0).collect();
            json!({
                "nodeId": entry.node_id,
                "changeType": entry.change_type,
                "nodeInfo": params,
            })
        })
        .collect();
    json!({
        "lastIndex": info.suc_last_index,
        "updateNodeList": entries,
    })
}

fn application_data(
    store: &ObjectStore,
    app_files: &[FileDescriptor],
    report: &mut Report,
) -> Option<Value> {
    let data = store.read_logged(
        Instance::Application,
        FILE_ID_APPLICATIONDATA,
        APP_DATA_SIZE,
        app_files,
        report,
    )?;
    let len = data.iter().rposition(|&b| b != 0).map(|p| p + 1)?;
    Some(Value::String(base64_encode(&data[..len])))
}

fn app_config(
    store: &ObjectStore,
    shape: ConfigShape,
    app_files: &[FileDescriptor],
    report: &mut Report,
) -> Value {
    let config = store
        .read_logged(
            Instance::Application,
            FILE_ID_APPLICATIONCONFIGURATION,
            shape.size(),
            app_files,
            report,
        )
        .map(|b| AppConfig::decode(shape, &b))
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("rfRegion".into(), json!(config.rf_region));
    out.insert("txPower".into(), json!(config.tx_power));
    out.insert("power0dbmMeasured".into(), json!(config.power_0dbm_measured));
    if shape != ConfigShape::Pre7_15_3 {
        out.insert("enablePTI".into(), json!(config.enable_pti));
        out.insert("maxTxPower".into(), json!(config.max_tx_power));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm700::store::GEOMETRY_700;

    fn store_with_version(word: u32) -> ObjectStore {
        let mut report = Report::new();
        let mut store = ObjectStore::create(GEOMETRY_700);
        let mut payload = [0u8; 4];
        LittleEndian::write_u32(&mut payload, word);
        store.write_logged(
            Instance::Protocol,
            FILE_ID_ZW_VERSION,
            &payload,
            FsVersion::V1.protocol_files(),
            &mut report,
        );
        store
    }

    #[test]
    fn test_image_version_splits_format_and_triple() {
        let mut report = Report::new();
        let store = store_with_version(0x0207_0F02);
        let (version, triple) = image_version(&store, &mut report).unwrap();
        assert_eq!(version, FsVersion::V2);
        assert_eq!(triple, (7, 15, 2));
    }

    #[test]
    fn test_image_version_rejects_unknown_revision() {
        let mut report = Report::new();
        let store = store_with_version(0x0507_1200);
        assert!(matches!(
            image_version(&store, &mut report),
            Err(NvmError::UnsupportedFileSystem(5))
        ));
    }

    #[test]
    fn test_missing_version_object_is_a_store_error() {
        let mut report = Report::new();
        let store = ObjectStore::create(GEOMETRY_700);
        assert!(image_version(&store, &mut report).is_err());
        assert!(report.contains("FILE_ID_ZW_VERSION (0x50000) not found"));
    }

    #[test]
    fn test_lr_tx_power_nibble_packing() {
        let mut report = Report::new();
        let mut store = ObjectStore::create(GEOMETRY_700);
        let files = FsVersion::V2.protocol_files();
        let mut block = [0u8; 32];
        // Indices 0 and 1 share byte 0: low nibble even, high nibble odd.
        block[0] = 0xA3;
        store.write_logged(
            Instance::Protocol,
            FILE_ID_LR_TX_POWER_V2,
            &block,
            files,
            &mut report,
        );
        assert_eq!(
            lr_tx_power(&store, FsVersion::V2, 0, files, &mut report),
            Some(0x03)
        );
        assert_eq!(
            lr_tx_power(&store, FsVersion::V2, 1, files, &mut report),
            Some(0xA0)
        );
        // v4 carries no tx-power files.
        assert_eq!(
            lr_tx_power(&store, FsVersion::V4, 0, files, &mut report),
            None
        );
    }
}
