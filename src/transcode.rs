//! Contract with the component that actually re-encodes video.
//!
//! The session hands a [`TranscodeRequest`] to a [`Transcoder`] and then
//! polls the returned [`TranscodeJob`] until it reaches a terminal
//! [`JobState`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::codec::VideoCodec;
use crate::encode::EncodeConfig;
use crate::error::AppError;
use crate::estimate::{FALLBACK_AUDIO_BITRATE_BPS, target_bitrate};
use crate::media::SourceMedia;
use crate::preset::QualityPreset;

/// Aspect ratio assumed when the source dimensions are unknown.
const FALLBACK_ASPECT: (u32, u32) = (16, 9);

static OUTPUT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRateChange {
    pub from: f64,
    pub to: u32,
}

/// Everything a transcoder needs for one encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub video_codec: VideoCodec,
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u32,
    /// Output `(width, height)`, both even. `None` keeps the source size.
    pub resolution: Option<(u32, u32)>,
    pub frame_rate: Option<FrameRateChange>,
    pub remove_audio: bool,
    pub volume: f32,
    /// Source duration, for progress reporting.
    pub duration_ms: u64,
}

fn round_down_even(value: u32) -> u32 {
    value - value % 2
}

fn scaled_resolution(config: &EncodeConfig, source: &SourceMedia) -> Option<(u32, u32)> {
    let height = config.target_height().filter(|&h| h > 0 && h != source.height)?;
    let width = if source.width > 0 && source.height > 0 {
        (f64::from(height) * f64::from(source.width) / f64::from(source.height)) as u32
    } else {
        let (num, den) = FALLBACK_ASPECT;
        (f64::from(height) * f64::from(num) / f64::from(den)) as u32
    };
    let (width, height) = (round_down_even(width), round_down_even(height));
    (width > 0 && height > 0).then_some((width, height))
}

fn frame_rate_change(config: &EncodeConfig, source: &SourceMedia) -> Option<FrameRateChange> {
    if config.active_preset() == QualityPreset::High {
        return None;
    }
    let to = config.target_frame_rate().filter(|&fps| fps > 0)?;
    Some(FrameRateChange {
        from: source.frame_rate,
        to,
    })
}

/// Audio bitrate handed to the encoder: the configured rate, else the source
/// rate, else the fallback.
pub fn request_audio_bitrate(config: &EncodeConfig, source: &SourceMedia) -> u32 {
    [config.audio_bitrate_bps(), source.audio_bitrate_bps]
        .into_iter()
        .find(|&bps| bps > 0)
        .unwrap_or(FALLBACK_AUDIO_BITRATE_BPS)
}

pub fn build_request(
    config: &EncodeConfig,
    source: &SourceMedia,
    source_path: &Path,
    output: PathBuf,
) -> TranscodeRequest {
    TranscodeRequest {
        source: source_path.to_path_buf(),
        output,
        video_codec: config.video_codec(),
        video_bitrate_bps: target_bitrate(config, source),
        audio_bitrate_bps: request_audio_bitrate(config, source),
        resolution: scaled_resolution(config, source),
        frame_rate: frame_rate_change(config, source),
        remove_audio: config.remove_audio(),
        volume: config.audio_volume(),
        duration_ms: source.duration_ms,
    }
}

/// Fresh output path under `dir`, unique within this process.
pub fn output_path(dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let n = OUTPUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("compress_{}_{}.mp4", millis, n))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TranscodeErrorKind {
    DecoderInit,
    EncoderInit,
    Muxing,
    Io,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeFailure {
    pub kind: TranscodeErrorKind,
    pub details: String,
}

impl TranscodeFailure {
    pub fn new(kind: TranscodeErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }

    /// Short message for the user; `details` carries the full log.
    pub fn summary(&self) -> String {
        match self.kind {
            TranscodeErrorKind::DecoderInit | TranscodeErrorKind::EncoderInit => {
                "This codec is not supported on this device. Try H.264.".to_string()
            }
            TranscodeErrorKind::Muxing => "Failed to write the output file.".to_string(),
            TranscodeErrorKind::Io => "Could not read or write the video file.".to_string(),
            TranscodeErrorKind::Other => {
                let first = self.details.lines().find(|l| !l.trim().is_empty());
                match first {
                    Some(line) => line.trim().to_string(),
                    None => "Unknown error".to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobState {
    NotStarted,
    /// `progress` is in `[0, 1]`.
    Running { progress: f64 },
    Completed { output: PathBuf, size_bytes: u64 },
    Failed(TranscodeFailure),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed(_) | JobState::Cancelled
        )
    }
}

/// A running encode.
pub trait TranscodeJob: Send + Sync {
    fn poll(&self) -> JobState;
    /// Bytes written to the output so far.
    fn bytes_written(&self) -> u64;
    /// Stop the encode. Calling it more than once has no further effect.
    fn cancel(&self);
}

pub trait Transcoder: Send + Sync {
    fn start(&self, request: TranscodeRequest) -> Result<Box<dyn TranscodeJob>, AppError>;
}
