//! Source video metadata as seen by the estimator.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Frame rate assumed when the container does not report one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
/// Target size offered when the source size is unknown.
pub const DEFAULT_TARGET_MB: f64 = 10.0;
const DEFAULT_TARGET_RATIO: f64 = 0.7;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+-]\d+\.\d+)([+-]\d+\.\d+)").expect("invalid location regex")
});

const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year][month][day]T[hour][minute][second].[subsecond digits:3]Z"),
    format_description!("[year][month][day]T[hour][minute][second]Z"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
];

/// Immutable description of the selected file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMedia {
    pub size_bytes: u64,
    /// Display width, after rotation.
    pub width: u32,
    /// Display height, after rotation.
    pub height: u32,
    /// Container bitrate; 0 when unknown.
    pub bitrate_bps: u64,
    /// First audio track bitrate; 0 when unknown or absent.
    pub audio_bitrate_bps: u32,
    pub frame_rate: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp_ms: Option<i64>,
    /// Raw ISO-6709 string, e.g. `+37.4219-122.0840/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<String>,
}

impl Default for SourceMedia {
    fn default() -> Self {
        Self {
            size_bytes: 0,
            width: 0,
            height: 0,
            bitrate_bps: 0,
            audio_bitrate_bps: 0,
            frame_rate: DEFAULT_FRAME_RATE,
            duration_ms: 0,
            creation_timestamp_ms: None,
            gps: None,
        }
    }
}

/// Fields as a metadata reader extracts them, before normalisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: i32,
    pub bitrate_bps: u64,
    pub audio_bitrate_bps: u32,
    pub frame_rate: Option<String>,
    pub duration_ms: u64,
    pub date: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl SourceMedia {
    pub fn from_raw(raw: RawMetadata) -> Self {
        let (width, height) = match raw.rotation_degrees.rem_euclid(360) {
            90 | 270 => (raw.height, raw.width),
            _ => (raw.width, raw.height),
        };
        let frame_rate = raw
            .frame_rate
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(DEFAULT_FRAME_RATE);
        let creation_timestamp_ms = raw.date.as_deref().and_then(parse_creation_date);

        Self {
            size_bytes: raw.size_bytes,
            width,
            height,
            bitrate_bps: raw.bitrate_bps,
            audio_bitrate_bps: raw.audio_bitrate_bps,
            frame_rate,
            duration_ms: raw.duration_ms,
            creation_timestamp_ms,
            gps: raw.location.filter(|l| !l.trim().is_empty()),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    /// Target size offered right after selection: 70% of the source.
    pub fn default_target_mb(&self) -> f64 {
        if self.size_bytes > 0 {
            self.size_mb() * DEFAULT_TARGET_RATIO
        } else {
            DEFAULT_TARGET_MB
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.height > self.width
    }

    pub fn location(&self) -> Option<GeoLocation> {
        let caps = LOCATION_RE.captures(self.gps.as_deref()?)?;
        let latitude = caps[1].parse().ok()?;
        let longitude = caps[2].parse().ok()?;
        Some(GeoLocation {
            latitude,
            longitude,
        })
    }
}

/// Parse a container creation date (UTC) into epoch milliseconds.
pub fn parse_creation_date(value: &str) -> Option<i64> {
    let value = value.trim();
    DATE_FORMATS.iter().find_map(|format| {
        PrimitiveDateTime::parse(value, *format)
            .ok()
            .map(|dt| (dt.assume_utc().unix_timestamp_nanos() / 1_000_000) as i64)
    })
}

/// Reads metadata from a selected file. Never fails: unreadable fields come
/// back as zero/default values.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> SourceMedia;
}
