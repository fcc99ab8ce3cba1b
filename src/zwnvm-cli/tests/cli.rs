//! End-to-end runs of the zwnvm binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn zwnvm(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_zwnvm"))
        .args(args)
        .output()
        .expect("failed to run zwnvm")
}

fn write_backup(path: &Path) {
    let doc = serde_json::json!({
        "backupInfo": {
            "backupFormatVersion": 1,
            "sourceProtocolVersion": "07.12.00",
            "sourceAppVersion": "07.12.00",
        },
        "zwController": {
            "nodeId": 1,
            "ownHomeId": "0xDEADBEEF",
            "controllerConfiguration": 0x28,
            "cmdClassList": [0x5E, 0x86],
            "nodeTable": [
                {
                    "nodeId": 1,
                    "nodeInfo": {"capability": 0x93, "security": 0x80, "generic": 2, "specific": 7},
                    "neighbours": [],
                },
            ],
            "sucState": {"lastIndex": 0, "updateNodeList": []},
        },
    });
    fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn test_no_arguments_prints_usage_and_fails() {
    let out = zwnvm(&[]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage: zwnvm [-i <format_name>|-e <format_name> ] <src> <dst>"));
    assert!(stderr.contains("supported formats are:"));
    assert!(stderr.contains("\tbridge7.12 : NVM Converter for Z-Wave Bridge 7.12"));
}

#[test]
fn test_unknown_format_prints_usage_and_fails() {
    let out = zwnvm(&["-e", "bridge9.9", "a.nvm", "b.json"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("supported formats are:"));
}

#[test]
fn test_import_then_export_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("backup.json");
    let image = dir.path().join("image.nvm");
    let exported = dir.path().join("exported.json");
    write_backup(&backup);

    let out = zwnvm(&[
        "-i",
        "bridge7.12",
        backup.to_str().unwrap(),
        image.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("got nvm buffer size = 49152"));
    assert!(stdout.contains("Saving NVM image to"));
    assert_eq!(fs::metadata(&image).unwrap().len(), 48 * 1024);

    let out = zwnvm(&[
        "-e",
        "bridge7.12",
        image.to_str().unwrap(),
        exported.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Bin image identified as: bridge7.12"));
    assert!(stdout.contains("Using converter: NVM Converter for Z-Wave Bridge 7.12"));
    assert!(stdout.contains("Saving JSON to"));

    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&exported).unwrap()).unwrap();
    assert_eq!(doc["zwController"]["ownHomeId"], "0xDEADBEEF");
    assert_eq!(doc["zwController"]["nodeTable"][0]["nodeId"], 1);
}

#[test]
fn test_failed_import_leaves_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("broken.json");
    let image = dir.path().join("image.nvm");
    fs::write(&backup, "{\"backupInfo\": {\"backupFormatVersion\": 2}}").unwrap();

    let out = zwnvm(&[
        "-i",
        "bridge7.12",
        backup.to_str().unwrap(),
        image.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(!image.exists());
}

#[test]
fn test_wrong_codec_image_fails_export() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("erased.nvm");
    let exported = dir.path().join("out.json");
    fs::write(&image, vec![0xFFu8; 48 * 1024]).unwrap();

    let out = zwnvm(&[
        "-e",
        "static6.6",
        image.to_str().unwrap(),
        exported.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(!exported.exists());
}
