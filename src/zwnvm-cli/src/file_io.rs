//! Whole-file I/O helpers.
//!
//! Both directions read the entire source up front and write the
//! destination in one shot, so a failed conversion never leaves a
//! partial output file behind.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read NVM image {}", path.display()))
}

pub fn read_json(path: &Path) -> Result<Value> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read JSON file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON file {}", path.display()))
}

/// Pretty two-space-indented JSON with a trailing newline.
pub fn write_json(path: &Path, doc: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(doc).context("Failed to serialize JSON")?;
    text.push('\n');
    fs::write(path, text)
        .with_context(|| format!("Failed to write JSON file {}", path.display()))
}

pub fn write_image(path: &Path, image: &[u8]) -> Result<()> {
    fs::write(path, image)
        .with_context(|| format!("Failed to write NVM image {}", path.display()))
}
