//! FFprobe-based metadata reader.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::discovery::get_ffprobe_path;
use crate::error::AppError;
use crate::media::{MetadataReader, RawMetadata, SourceMedia};

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    creation_time: Option<String>,
    location: Option<String>,
    #[serde(rename = "com.apple.quicktime.location.ISO6709")]
    quicktime_location: Option<String>,
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_number<T: std::str::FromStr>(s: Option<&String>) -> Option<T> {
    s.and_then(|s| s.trim().parse().ok())
}

/// Parse ffprobe JSON output into reader fields.
pub fn parse_ffprobe_json(json: &str) -> Result<RawMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::invalid_request(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let format = output.format.as_ref();

    let duration_ms = parse_number::<f64>(format.and_then(|f| f.duration.as_ref()))
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| (d * 1000.0).round() as u64)
        .unwrap_or(0);

    let rotation_degrees = video
        .and_then(|v| {
            v.side_data_list
                .iter()
                .find_map(|sd| sd.rotation)
                .or_else(|| parse_number::<f64>(v.tags.rotate.as_ref()))
        })
        .map(|r| r.round() as i32)
        .unwrap_or(0);

    let frame_rate = video
        .and_then(|v| {
            v.avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| v.r_frame_rate.as_deref().and_then(parse_frame_rate))
        })
        .map(|fps| fps.to_string());

    let date = format
        .and_then(|f| f.tags.creation_time.clone())
        .or_else(|| video.and_then(|v| v.tags.creation_time.clone()));
    let location = format.and_then(|f| {
        f.tags
            .location
            .clone()
            .or_else(|| f.tags.quicktime_location.clone())
    });

    Ok(RawMetadata {
        size_bytes: parse_number(format.and_then(|f| f.size.as_ref())).unwrap_or(0),
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        rotation_degrees,
        bitrate_bps: parse_number(format.and_then(|f| f.bit_rate.as_ref())).unwrap_or(0),
        audio_bitrate_bps: parse_number(audio.and_then(|a| a.bit_rate.as_ref())).unwrap_or(0),
        frame_rate,
        duration_ms,
        date,
        location,
    })
}

/// Run ffprobe on a video file.
pub fn probe_file(path: &Path) -> Result<RawMetadata, AppError> {
    let ffprobe = get_ffprobe_path()?;
    log::debug!(
        target: "squish_vid::ffmpeg::probe",
        "ffprobe: path={}",
        path.display()
    );

    let output = Command::new(&ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(AppError::ffmpeg_failed(
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
}

/// Metadata reader backed by ffprobe. Failures yield all-zero metadata, with
/// the file size taken from the filesystem when available.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeReader;

impl MetadataReader for FfprobeReader {
    fn read(&self, path: &Path) -> SourceMedia {
        let mut raw = probe_file(path).unwrap_or_else(|err| {
            log::warn!(
                target: "squish_vid::ffmpeg::probe",
                "Metadata unavailable for {}: {}",
                path.display(),
                err
            );
            RawMetadata::default()
        });
        if raw.size_bytes == 0
            && let Ok(meta) = std::fs::metadata(path)
        {
            raw.size_bytes = meta.len();
        }
        SourceMedia::from_raw(raw)
    }
}
