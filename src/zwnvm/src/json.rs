//! Path-tracked JSON access.
//!
//! Getters over `serde_json::Value` that know where they are in the
//! document, so a missing or mistyped key is reported with its full path
//! (`/zwController/nodeTable/3/nodeId`). Required keys flag the report and
//! parsing continues with the default, so one pass reports every problem
//! in a file. Optional keys log at info level only.

use serde_json::Value;

use crate::mask::{ClassicNodeMask, CLASSIC_MAX_NODES};
use crate::report::Report;

/// Whether a key must be present. Missing required keys are parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Expected JSON value types, named the way the diagnostics print them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    /// No type check; any value is accepted silently.
    Any,
    Boolean,
    Int,
    String,
    Object,
    Array,
}

impl JsonType {
    fn name(self) -> &'static str {
        match self {
            JsonType::Any => "null",
            JsonType::Boolean => "boolean",
            JsonType::Int => "int",
            JsonType::String => "string",
            JsonType::Object => "object",
            JsonType::Array => "array",
        }
    }
}

/// The printed name of a value's actual type.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_f64() {
                "double"
            } else {
                "int"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A position in the JSON document: the value plus the path that led here.
#[derive(Debug, Clone, Copy)]
pub struct JsonNode<'a> {
    value: &'a Value,
    path: &'a JsonPath,
}

/// Owned path string, extended as the document is descended.
#[derive(Debug, Clone, Default)]
pub struct JsonPath(String);

impl JsonPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }

    /// Path of element `i` of an array at this path.
    pub fn item(&self, i: usize) -> Self {
        Self(format!("{}/{}", self.0, i))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'a> JsonNode<'a> {
    pub fn new(value: &'a Value, path: &'a JsonPath) -> Self {
        Self { value, path }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn path(&self) -> &JsonPath {
        self.path
    }

    /// Look up `key`, checking presence and type. A present-but-mistyped
    /// value is flagged and still returned; the scalar getters then fall
    /// back to their defaults. Returns the child value and its path.
    pub fn get(
        &self,
        report: &mut Report,
        key: &str,
        expected: JsonType,
        presence: Presence,
    ) -> Option<(&'a Value, JsonPath)> {
        match self.value.get(key) {
            Some(child) => {
                if expected != JsonType::Any && type_name(child) != expected.name() {
                    report.parse_error(format!(
                        "ERROR: Invalid value type ({}) for key \"{}/{}\". Must be {}.",
                        type_name(child),
                        self.path.as_str(),
                        key,
                        expected.name()
                    ));
                }
                Some((child, self.path.child(key)))
            }
            None => {
                match presence {
                    Presence::Required => report.parse_error(format!(
                        "ERROR: Required key not found: \"{}/{}\".",
                        self.path.as_str(),
                        key
                    )),
                    Presence::Optional => report.info(format!(
                        "INFO: Optional key not found: \"{}/{}\".",
                        self.path.as_str(),
                        key
                    )),
                }
                None
            }
        }
    }

    pub fn get_int(
        &self,
        report: &mut Report,
        key: &str,
        default: i64,
        presence: Presence,
    ) -> i64 {
        match self.get(report, key, JsonType::Int, presence) {
            Some((value, _)) => value.as_i64().unwrap_or(default),
            None => default,
        }
    }

    /// Integer extraction without a type check; non-numeric values read as
    /// `default` and are not flagged.
    pub fn get_int_any(
        &self,
        report: &mut Report,
        key: &str,
        default: i64,
        presence: Presence,
    ) -> i64 {
        match self.get(report, key, JsonType::Any, presence) {
            Some((value, _)) => value.as_i64().unwrap_or(default),
            None => default,
        }
    }

    pub fn get_bool(
        &self,
        report: &mut Report,
        key: &str,
        default: bool,
        presence: Presence,
    ) -> bool {
        match self.get(report, key, JsonType::Boolean, presence) {
            Some((value, _)) => value.as_bool().unwrap_or(default),
            None => default,
        }
    }

    pub fn get_string(
        &self,
        report: &mut Report,
        key: &str,
        default: &'a str,
        presence: Presence,
    ) -> &'a str {
        match self.get(report, key, JsonType::String, presence) {
            Some((value, _)) => value.as_str().unwrap_or(default),
            None => default,
        }
    }

    /// Fill `out` from an array of byte values, zeroing it first. Returns
    /// the number of elements taken (bounded by `out.len()`).
    pub fn get_bytearray(
        &self,
        report: &mut Report,
        key: &str,
        out: &mut [u8],
        presence: Presence,
    ) -> usize {
        match self.get(report, key, JsonType::Array, presence) {
            Some((Value::Array(items), _)) => {
                out.fill(0);
                let n = items.len().min(out.len());
                for (slot, item) in out.iter_mut().zip(items.iter().take(n)) {
                    *slot = item.as_i64().unwrap_or(0) as u8;
                }
                n
            }
            _ => 0,
        }
    }

    /// Read an array of node ids into a classic node mask. The mask starts
    /// cleared; at most 232 entries are taken.
    pub fn get_nodemask(
        &self,
        report: &mut Report,
        key: &str,
        presence: Presence,
    ) -> ClassicNodeMask {
        let mut mask = ClassicNodeMask::new();
        if let Some((Value::Array(items), _)) = self.get(report, key, JsonType::Array, presence) {
            for item in items.iter().take(CLASSIC_MAX_NODES as usize) {
                if let Some(id) = item.as_i64() {
                    if (1..=u16::MAX as i64).contains(&id) {
                        mask.set(id as u16);
                    }
                }
            }
        }
        mask
    }

    /// Read a `"0xHHHHHHHH"` home-id string. A string that does not parse
    /// to a value in 1..=0xFFFFFFFE keeps the default.
    pub fn get_home_id(
        &self,
        report: &mut Report,
        key: &str,
        default: u32,
        presence: Presence,
    ) -> u32 {
        match self.get(report, key, JsonType::String, presence) {
            Some((value, _)) => value
                .as_str()
                .and_then(parse_home_id)
                .unwrap_or(default),
            None => default,
        }
    }
}

/// Parse a home id from its string form; hex with `0x` prefix or plain
/// decimal. Partial parses and out-of-range values are rejected.
pub fn parse_home_id(s: &str) -> Option<u32> {
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        s.parse::<i64>().ok()?
    };
    if value > 0 && value < 0xFFFF_FFFF {
        Some(value as u32)
    } else {
        None
    }
}

/// Render a home id the way the JSON schema carries it: `0xHHHHHHHH`.
pub fn home_id_to_string(home_id: u32) -> String {
    format!("0x{home_id:08X}")
}

/// Render the low three bytes of a packed version word as `MM.mm.pp`.
pub fn version_to_string(version: u32) -> String {
    format!(
        "{:02}.{:02}.{:02}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

/// Parse a `major.minor.patch` decimal version string.
pub fn parse_version(s: &str) -> Option<(u8, u8, u8)> {
    let mut parts = s.split('.');
    let major = parts.next()?.parse::<u8>().ok()?;
    let minor = parts.next()?.parse::<u8>().ok()?;
    let patch = parts.next()?.parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// JSON form of a classic node mask: ascending array of included node ids.
pub fn nodemask_to_json(mask: &ClassicNodeMask) -> Value {
    Value::Array(mask.iter().map(|id| Value::from(id)).collect())
}

/// JSON form of a byte array.
pub fn bytes_to_json(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|&b| Value::from(b)).collect())
}

/// Base64-encode opaque binary data for embedding as a JSON string.
pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Base64-decode an embedded blob. Interior whitespace is ignored; after
/// filtering, the character count must be a multiple of 4 and padding may
/// only appear at the end of the final block.
pub fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;

    let filtered: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if filtered.len() % 4 != 0 {
        return None;
    }
    if let Some(first_pad) = filtered.find('=') {
        // Padding is only legal as the tail of the last 4-character block.
        if first_pad + 2 < filtered.len() || !filtered[first_pad..].bytes().all(|b| b == b'=') {
            return None;
        }
    }
    base64::engine::general_purpose::STANDARD
        .decode(filtered.as_bytes())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::Presence::{Optional, Required};
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "zwController": {
                "nodeId": 1,
                "ownHomeId": "0xDEADBEEF",
                "virtual": true,
                "nodeTable": [ {"nodeId": 5} ],
                "neighbours": [1, 5, 9],
                "cmdClassList": [94, 134]
            }
        })
    }

    #[test]
    fn test_required_key_missing_flags_report_with_path() {
        let value = doc();
        let root_path = JsonPath::root();
        let root = JsonNode::new(&value, &root_path);
        let mut report = Report::new();
        let (ctrl, ctrl_path) = root
            .get(&mut report, "zwController", JsonType::Object, Required)
            .unwrap();
        let ctrl = JsonNode::new(ctrl, &ctrl_path);
        let got = ctrl.get_int(&mut report, "lastUsedNodeId", 42, Required);
        assert_eq!(got, 42);
        assert!(report.contains(
            "ERROR: Required key not found: \"/zwController/lastUsedNodeId\"."
        ));
        assert_eq!(report.parse_errors(), 1);
    }

    #[test]
    fn test_optional_key_missing_is_info_only() {
        let value = doc();
        let root_path = JsonPath::root();
        let root = JsonNode::new(&value, &root_path);
        let mut report = Report::new();
        let got = root.get_int(&mut report, "absent", 7, Optional);
        assert_eq!(got, 7);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_wrong_type_is_flagged_with_json_c_type_names() {
        let value = doc();
        let root_path = JsonPath::root();
        let root = JsonNode::new(&value, &root_path);
        let mut report = Report::new();
        let (ctrl, ctrl_path) = root
            .get(&mut report, "zwController", JsonType::Object, Required)
            .unwrap();
        let ctrl = JsonNode::new(ctrl, &ctrl_path);
        ctrl.get_int(&mut report, "ownHomeId", 0, Required);
        assert!(report.contains(
            "ERROR: Invalid value type (string) for key \"/zwController/ownHomeId\". Must be int."
        ));
    }

    #[test]
    fn test_get_nodemask_sets_listed_ids() {
        let value = doc();
        let root_path = JsonPath::root();
        let root = JsonNode::new(&value, &root_path);
        let mut report = Report::new();
        let (ctrl, ctrl_path) = root
            .get(&mut report, "zwController", JsonType::Object, Required)
            .unwrap();
        let ctrl = JsonNode::new(ctrl, &ctrl_path);
        let mask = ctrl.get_nodemask(&mut report, "neighbours", Required);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![1, 5, 9]);
    }

    #[test]
    fn test_get_bytearray_bounded_and_zeroed() {
        let value = doc();
        let root_path = JsonPath::root();
        let root = JsonNode::new(&value, &root_path);
        let mut report = Report::new();
        let (ctrl, ctrl_path) = root
            .get(&mut report, "zwController", JsonType::Object, Required)
            .unwrap();
        let ctrl = JsonNode::new(ctrl, &ctrl_path);
        let mut out = [0xffu8; 4];
        let n = ctrl.get_bytearray(&mut report, "cmdClassList", &mut out, Required);
        assert_eq!(n, 2);
        assert_eq!(out, [94, 134, 0, 0]);
    }

    #[test]
    fn test_home_id_round_trip() {
        for id in [1u32, 0xDEADBEEF, 0xC0FFEE42, 0xFFFF_FFFE] {
            let s = home_id_to_string(id);
            assert_eq!(parse_home_id(&s), Some(id), "home id {s}");
        }
    }

    #[test]
    fn test_home_id_rejects_partial_and_out_of_range() {
        assert_eq!(parse_home_id("0x12 garbage"), None);
        assert_eq!(parse_home_id("0"), None);
        assert_eq!(parse_home_id("0xFFFFFFFF"), None);
        assert_eq!(parse_home_id(""), None);
    }

    #[test]
    fn test_version_round_trip() {
        let s = version_to_string(0x04_07_12_01);
        assert_eq!(s, "07.18.01");
        assert_eq!(parse_version(&s), Some((7, 18, 1)));
        assert_eq!(version_to_string(0), "00.00.00");
        assert_eq!(parse_version("00.00.00"), Some((0, 0, 0)));
    }

    #[test]
    fn test_version_rejects_malformed() {
        assert_eq!(parse_version("7.18"), None);
        assert_eq!(parse_version("7.18.1.2"), None);
        assert_eq!(parse_version("7.x.1"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_base64_round_trip_including_empty() {
        for data in [&b""[..], &b"\x00"[..], &b"hello world"[..], &[0u8, 255, 128, 1][..]] {
            let encoded = base64_encode(data);
            assert_eq!(base64_decode(&encoded).as_deref(), Some(data));
        }
    }

    #[test]
    fn test_base64_decode_ignores_interior_whitespace() {
        let encoded = base64_encode(b"some longer payload for wrapping");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(
            base64_decode(&wrapped).as_deref(),
            Some(&b"some longer payload for wrapping"[..])
        );
    }

    #[test]
    fn test_base64_decode_rejects_bad_length() {
        assert_eq!(base64_decode("QUJ"), None);
        assert_eq!(base64_decode("QQ"), None);
    }

    #[test]
    fn test_base64_decode_rejects_interior_padding() {
        assert_eq!(base64_decode("QQ==QQ=="), None);
        assert_eq!(base64_decode("Q=QQ"), None);
    }
}
