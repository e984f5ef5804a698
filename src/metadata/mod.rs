/// Capture metadata extraction
///
/// This module handles:
/// - Running exiftool over a batch of files (exiftool.rs)
/// - Turning its raw date fields into display/original dates (timestamp.rs)
///
/// The builder only sees the `MetadataExtractor` trait, so tests can swap in
/// canned data without spawning a process.

pub mod exiftool;
pub mod timestamp;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

pub use exiftool::ExifTool;
pub use timestamp::{parse_timestamp, resolve, ResolvedDates};

/// Batch metadata extraction capability.
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata for every path in one go.
    ///
    /// An empty `paths` slice returns an empty result without doing any work.
    fn extract(&self, paths: &[PathBuf]) -> Result<Vec<RawMetadata>, ExtractError>;
}

/// Failure modes of an extraction run
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{tool} is not installed or not on PATH")]
    ToolUnavailable { tool: String },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit code {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed { code: Option<i32>, stderr: String },

    #[error("no response within {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("unparseable output: {0}")]
    InvalidOutput(String),
}

/// One per-file record as reported by exiftool (`-json -n`)
///
/// Date fields are kept as strings; anything that is not a string is treated
/// as absent. Coordinates accept both JSON numbers and numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMetadata {
    #[serde(rename = "SourceFile", default)]
    pub source_file: Option<String>,

    #[serde(rename = "DateTimeOriginal", default, deserialize_with = "lenient_string")]
    pub date_time_original: Option<String>,

    #[serde(rename = "CreateDate", default, deserialize_with = "lenient_string")]
    pub create_date: Option<String>,

    #[serde(rename = "FileModifyDate", default, deserialize_with = "lenient_string")]
    pub file_modify_date: Option<String>,

    #[serde(rename = "GPSLatitude", default, deserialize_with = "lenient_f64")]
    pub gps_latitude: Option<f64>,

    #[serde(rename = "GPSLongitude", default, deserialize_with = "lenient_f64")]
    pub gps_longitude: Option<f64>,
}

impl RawMetadata {
    /// A record with only the source path filled in.
    pub fn for_file(source: impl Into<String>) -> Self {
        Self {
            source_file: Some(source.into()),
            ..Self::default()
        }
    }

    /// Both coordinates, or nothing.
    ///
    /// A lone latitude or longitude is useless on a map, and so is a pair
    /// outside the valid degree ranges.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = (self.gps_latitude?, self.gps_longitude?);
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return None;
        }
        Some((lat, lon))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
