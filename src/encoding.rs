//! Script file encodings.
//!
//! Backup files are UTF-16LE and start with a byte-order mark. Restore input
//! may be anything a person saved from an editor, so the BOM decides.

use anyhow::{Context, anyhow};
use std::path::Path;

pub const BOM_UTF16LE: [u8; 2] = [0xFF, 0xFE];
pub const BOM_UTF16BE: [u8; 2] = [0xFE, 0xFF];
pub const BOM_UTF8: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Encodes `text` as UTF-16LE without a byte-order mark.
pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn decode_script(bytes: &[u8]) -> anyhow::Result<String> {
    if let Some(rest) = bytes.strip_prefix(&BOM_UTF16LE) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&BOM_UTF16BE) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    let rest = bytes.strip_prefix(&BOM_UTF8).unwrap_or(bytes);
    String::from_utf8(rest.to_vec()).context("script is not valid UTF-8")
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> anyhow::Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(anyhow!("UTF-16 script has an odd number of bytes"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| unit([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).context("script is not valid UTF-16")
}

pub fn read_script(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    decode_script(&bytes).with_context(|| format!("decode {}", path.display()))
}
