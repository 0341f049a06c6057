//! Human-readable byte sizes.
//!
//! Limits may be configured either as raw numbers (bytes) or as
//! strings like `"10MB"` / `"512 KiB"`. Parsing is binary: every unit
//! is a power of 1024, and the IEC spellings are aliases of the short
//! ones.

use serde::Deserialize;

use crate::error::ConfigError;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// A size value as it appears in configuration input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeInput {
    Number(f64),
    Text(String),
}

impl From<u64> for SizeInput {
    fn from(n: u64) -> Self {
        SizeInput::Number(n as f64)
    }
}

impl From<&str> for SizeInput {
    fn from(s: &str) -> Self {
        SizeInput::Text(s.to_string())
    }
}

/// Resolve a configured size to a byte count.
///
/// Numbers are taken as bytes. Strings are `<number><unit>` with
/// optional whitespace between the two and around the whole value.
pub fn parse_size(input: &SizeInput) -> Result<u64, ConfigError> {
    match input {
        SizeInput::Number(n) => checked_bytes(*n, 1, "bytes"),
        SizeInput::Text(s) => parse_size_str(s),
    }
}

fn parse_size_str(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::new("Size string is empty"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (num_part, unit_part) = trimmed.split_at(split);
    let unit_part = unit_part.trim();

    let value: f64 = num_part.parse().map_err(|_| {
        ConfigError::new(format!("Invalid size number in '{raw}'"))
    })?;

    let multiplier = match unit_part.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "KIB" => KIB,
        "MB" | "MIB" => MIB,
        "GB" | "GIB" => GIB,
        "TB" | "TIB" => TIB,
        other => {
            return Err(ConfigError::with_help(
                format!("Unknown size unit '{other}' in '{raw}'"),
                "Supported units: B, KB, MB, GB, TB (and KiB, MiB, GiB, TiB)",
            ))
        }
    };

    checked_bytes(value, multiplier, raw)
}

fn checked_bytes(value: f64, multiplier: u64, context: &str) -> Result<u64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::new(format!(
            "Size must be a finite number, got '{context}'"
        )));
    }
    if value < 0.0 {
        return Err(ConfigError::new(format!(
            "Size must not be negative, got '{context}'"
        )));
    }

    let bytes = value * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(ConfigError::new(format!(
            "Size overflows the byte range: '{context}'"
        )));
    }

    Ok(bytes.round() as u64)
}

/// Render a byte count with the largest unit that divides it exactly.
///
/// Exact division keeps `parse_size(format_bytes(n)) == n`, which the
/// round-trip of configured limits relies on.
pub fn format_bytes(bytes: u64) -> String {
    for (factor, unit) in [(TIB, "TB"), (GIB, "GB"), (MIB, "MB"), (KIB, "KB")] {
        if bytes >= factor && bytes % factor == 0 {
            return format!("{} {}", bytes / factor, unit);
        }
    }
    format!("{bytes} B")
}
