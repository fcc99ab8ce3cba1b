//! End-to-end conversions through the public format API.

use serde_json::{json, Value};
use zwnvm::error::NvmError;
use zwnvm::{Format, Report};

fn store_doc(protocol: &str, app: &str) -> Value {
    json!({
        "backupInfo": {
            "backupFormatVersion": 1,
            "sourceProtocolVersion": protocol,
            "sourceAppVersion": app,
        },
        "zwController": {
            "nodeId": 1,
            "ownHomeId": "0xDEADBEEF",
            "controllerConfiguration": 0x28,
            "cmdClassList": [0x5E, 0x86, 0x72],
            "nodeTable": [
                {
                    "nodeId": 1,
                    "nodeInfo": {
                        "capability": 0x93,
                        "security": 0x80,
                        "generic": 0x02,
                        "specific": 0x07,
                    },
                    "neighbours": [5],
                },
                {
                    "nodeId": 5,
                    "nodeInfo": {
                        "capability": 0x80,
                        "security": 0,
                        "generic": 0x10,
                        "specific": 0x01,
                    },
                    "neighbours": [1],
                },
            ],
            "sucState": {
                "lastIndex": 0,
                "updateNodeList": [],
            },
        },
    })
}

#[test]
fn test_store_node_survives_export_and_reimport() {
    let format = Format::Bridge712;
    let doc = store_doc("07.12.00", "07.12.00");

    let mut report = Report::new();
    let image = format.import(&doc, &mut report).unwrap();
    assert!(!report.has_errors());

    let mut report = Report::new();
    assert!(format.validate(&image, &mut report));

    let mut report = Report::new();
    let exported = format.export(&image, &mut report).unwrap();
    assert!(!report.has_errors());

    let table = exported["zwController"]["nodeTable"].as_array().unwrap();
    let node5 = table.iter().find(|n| n["nodeId"] == json!(5)).unwrap();
    assert_eq!(node5["nodeInfo"]["generic"], json!(0x10));
    assert_eq!(node5["nodeInfo"]["specific"], json!(0x01));

    let mut report = Report::new();
    let image2 = format.import(&exported, &mut report).unwrap();
    assert!(!report.has_errors());

    // Node 5 occupies bit index 4 of the node-storage-exist mask, which
    // sits behind the store's 9-byte record header.
    let protocol_base = format.geometry().unwrap().application_size;
    let exist_record = image2[protocol_base..]
        .windows(4)
        .position(|w| w == [0x05, 0x00, 0x05, 0x00])
        .map(|at| protocol_base + at)
        .unwrap();
    assert_eq!(image2[exist_record + 9] & 0x10, 0x10);

    assert_eq!(image, image2);
}

#[test]
fn test_export_fails_when_a_marked_node_has_no_info_file() {
    let format = Format::Bridge712;
    let doc = store_doc("07.12.00", "07.12.00");

    let mut report = Report::new();
    let mut image = format.import(&doc, &mut report).unwrap();

    // Mark node 100 in the node-storage-exist mask without giving it a
    // node-info file. The mask file itself stays well-formed, so the
    // image still passes the file inventory check.
    let protocol_base = format.geometry().unwrap().application_size;
    let exist_record = image[protocol_base..]
        .windows(4)
        .position(|w| w == [0x05, 0x00, 0x05, 0x00])
        .map(|at| protocol_base + at)
        .unwrap();
    image[exist_record + 9 + 12] |= 0x08;

    assert!(format.validate(&image, &mut Report::new()));

    let mut report = Report::new();
    let Err(NvmError::ConversionFailed { report }) = format.export(&image, &mut report) else {
        panic!("export must not produce a snapshot when a node cannot be read");
    };
    assert!(report.store_errors() > 0);
    assert!(report.contains("FILE_ID_NODEINFO_V1"));
}

#[test]
fn test_earliest_store_format_round_trips() {
    let format = Format::Bridge711;
    let doc = store_doc("07.11.00", "07.11.00");

    let mut report = Report::new();
    let image = format.import(&doc, &mut report).unwrap();
    assert!(!report.has_errors());
    assert!(format.validate(&image, &mut Report::new()));

    let mut report = Report::new();
    let exported = format.export(&image, &mut report).unwrap();
    assert!(!report.has_errors());
    let table = exported["zwController"]["nodeTable"].as_array().unwrap();
    let node5 = table.iter().find(|n| n["nodeId"] == json!(5)).unwrap();
    assert_eq!(node5["nodeInfo"]["generic"], json!(0x10));
    // v0 has no long-range fields on the controller.
    assert!(exported["zwController"].get("lastUsedNodeIdLR").is_none());

    let mut report = Report::new();
    let image2 = format.import(&exported, &mut report).unwrap();
    assert_eq!(image, image2);
}

#[test]
fn test_v3_tx_power_is_stored_one_byte_per_node() {
    let format = Format::Bridge716;
    let mut doc = store_doc("07.16.01", "07.16.01");
    doc["zwController"]["nodeTable"].as_array_mut().unwrap().push(json!({
        "nodeId": 300,
        "packedInfo": 0x41,
        "generic": 0x07,
        "specific": 0x01,
        "txPower": 0x55,
    }));

    let mut report = Report::new();
    let image = format.import(&doc, &mut report).unwrap();
    assert!(!report.has_errors());
    assert!(format.validate(&image, &mut Report::new()));

    // Node 300 is long-range index 44, so its tx power lands in the
    // second tx-power file (key 0x52001) at byte 44 % 32 = 12.
    let protocol_base = format.geometry().unwrap().application_size;
    let header = [0x01, 0x20, 0x05, 0x00, 0x20, 0x00, 0x00, 0x00];
    let tx_record = image[protocol_base..]
        .windows(8)
        .position(|w| w == header)
        .map(|at| protocol_base + at)
        .unwrap();
    assert_eq!(image[tx_record + 9 + 12], 0x55);

    let mut report = Report::new();
    let exported = format.export(&image, &mut report).unwrap();
    assert!(!report.has_errors());
    let table = exported["zwController"]["nodeTable"].as_array().unwrap();
    let lr = table.iter().find(|n| n["nodeId"] == json!(300)).unwrap();
    assert_eq!(lr["txPower"], json!(0x55));

    let mut report = Report::new();
    let image2 = format.import(&exported, &mut report).unwrap();
    assert!(!report.has_errors());
    // Re-import selects the pre-7.15.3 configuration shape from the
    // stamped 7.0.0 application version, so compare the protocol
    // instance, where the tx-power file lives.
    assert_eq!(image[protocol_base..], image2[protocol_base..]);
}

#[test]
fn test_missing_source_version_still_reports_other_errors() {
    let format = Format::Bridge712;
    let mut doc = store_doc("07.12.00", "07.12.00");
    doc["backupInfo"]
        .as_object_mut()
        .unwrap()
        .remove("sourceProtocolVersion");
    doc["zwController"].as_object_mut().unwrap().remove("nodeId");

    let mut report = Report::new();
    let result = format.import(&doc, &mut report);
    let Err(NvmError::ConversionFailed { report }) = result else {
        panic!("conversion must fail without producing an image");
    };
    assert!(report.contains(
        "ERROR: Required key not found: \"/backupInfo/sourceProtocolVersion\"."
    ));
    assert!(report.contains("ERROR: Required key not found: \"/zwController/nodeId\"."));
}

#[test]
fn test_latest_store_format_round_trips_on_800_geometry() {
    let format = Format::Bridge800s718;
    let mut doc = store_doc("07.18.01", "07.18.01");
    doc["zwController"]["nodeTable"].as_array_mut().unwrap().push(json!({
        "nodeId": 300,
        "packedInfo": 0x41,
        "generic": 0x07,
        "specific": 0x01,
    }));

    let mut report = Report::new();
    let image = format.import(&doc, &mut report).unwrap();
    assert!(!report.has_errors());
    assert!(format.validate(&image, &mut Report::new()));

    let mut report = Report::new();
    let exported = format.export(&image, &mut report).unwrap();
    assert!(!report.has_errors());
    let table = exported["zwController"]["nodeTable"].as_array().unwrap();
    let lr = table.iter().find(|n| n["nodeId"] == json!(300)).unwrap();
    assert_eq!(lr["packedInfo"], json!(0x41));
    // v4 file systems carry no per-node tx power.
    assert!(lr.get("txPower").is_none());

    let mut report = Report::new();
    let image2 = format.import(&exported, &mut report).unwrap();
    assert!(!report.has_errors());
    // The rebuilt image stamps application version 7.0.0, so the second
    // import writes the pre-7.15.3 configuration shape and only the
    // protocol instance is reproduced byte for byte.
    let protocol_base = format.geometry().unwrap().application_size;
    assert_eq!(image[protocol_base..], image2[protocol_base..]);
}

#[test]
fn test_flat_format_round_trips() {
    let format = Format::Bridge67;
    let doc = json!({
        "backupInfo": {
            "backupFormatVersion": 1,
            "sourceProtocolVersion": "06.07.00",
            "sourceAppVersion": "06.07.00",
        },
        "zwController": {
            "nodeId": 1,
            "ownHomeId": "0xC0FFEE01",
            "learnedHomeId": "0xC0FFEE01",
            "lastUsedNodeId": 5,
            "staticControllerNodeId": 0,
            "controllerConfiguration": 0x28,
            "systemState": 0,
            "cmdClassList": [0x5E, 0x86],
            "nodeTable": [
                {
                    "nodeId": 5,
                    "neighbours": [],
                    "nodeInfo": {
                        "capability": 0x80,
                        "security": 0,
                        "reserved": 0,
                        "generic": 0x10,
                        "specific": 0x01,
                    },
                },
            ],
            "sucState": {
                "lastIndex": 0,
                "updateNodeList": [],
            },
        },
        "appConfig": {},
    });

    let mut report = Report::new();
    let image = format.import(&doc, &mut report).unwrap();
    assert!(!report.has_errors());
    assert!(format.validate(&image, &mut Report::new()));

    let mut report = Report::new();
    let exported = format.export(&image, &mut report).unwrap();
    assert!(!report.has_errors());
    let table = exported["zwController"]["nodeTable"].as_array().unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0]["nodeId"], json!(5));

    let mut report = Report::new();
    let image2 = format.import(&exported, &mut report).unwrap();
    assert!(!report.has_errors());
    assert_eq!(image, image2);
}

#[test]
fn test_flat_image_fails_store_validation_and_vice_versa() {
    let flat = Format::Static66;
    let store = Format::Bridge715;

    let doc = json!({
        "zwController": {
            "nodeId": 1,
            "ownHomeId": "0x00000001",
            "nodeTable": [],
        },
    });
    let mut report = Report::new();
    let image = flat.import(&doc, &mut report).unwrap();

    assert!(!store.validate(&image, &mut Report::new()));
    assert!(!flat.validate(&vec![0xFF; 48 * 1024], &mut Report::new()));
}
