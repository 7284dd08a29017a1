//! Quality presets: named bundles of encode settings applied atomically.

use serde::{Deserialize, Serialize};

use crate::adjust::auto_adjust;
use crate::encode::EncodeConfig;
use crate::media::SourceMedia;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    Medium,
    Low,
    Custom,
}

struct PresetRow {
    preset: QualityPreset,
    /// Short side to scale to; `None` keeps the source resolution.
    short_side: Option<u32>,
    /// Cap frame rate at 30 for sources at or above it.
    cap_frame_rate: bool,
    size_ratio: f64,
    audio_bitrate_bps: u32,
}

const PRESET_TABLE: &[PresetRow] = &[
    PresetRow {
        preset: QualityPreset::High,
        short_side: None,
        cap_frame_rate: false,
        size_ratio: 0.7,
        audio_bitrate_bps: 320_000,
    },
    PresetRow {
        preset: QualityPreset::Medium,
        short_side: Some(1080),
        cap_frame_rate: true,
        size_ratio: 0.4,
        audio_bitrate_bps: 192_000,
    },
    PresetRow {
        preset: QualityPreset::Low,
        short_side: Some(720),
        cap_frame_rate: true,
        size_ratio: 0.2,
        audio_bitrate_bps: 128_000,
    },
];

const MIN_PRESET_TARGET_MB: f64 = 0.1;
const CAPPED_FRAME_RATE: u32 = 30;

/// Output height that puts the short side at `short_side`, never upscaling.
pub fn height_for_short_side(source: &SourceMedia, short_side: u32) -> u32 {
    if source.width == 0 || source.height == 0 {
        return source.height;
    }
    if source.is_vertical() {
        let width = short_side.min(source.width);
        (f64::from(width) * f64::from(source.height) / f64::from(source.width)) as u32
    } else {
        short_side.min(source.height)
    }
}

/// Apply `preset` to `config`, then auto-adjust towards the preset's target.
/// `Custom` only marks the configuration.
pub fn apply_preset(config: &EncodeConfig, source: &SourceMedia, preset: QualityPreset) -> EncodeConfig {
    let Some(row) = PRESET_TABLE.iter().find(|row| row.preset == preset) else {
        return config.clone().with_active_preset(QualityPreset::Custom);
    };

    let target_mb = (source.size_mb() * row.size_ratio).max(MIN_PRESET_TARGET_MB);
    let height = row
        .short_side
        .map(|short_side| height_for_short_side(source, short_side));
    let frame_rate = (row.cap_frame_rate && source.frame_rate >= f64::from(CAPPED_FRAME_RATE))
        .then_some(CAPPED_FRAME_RATE);

    log::debug!(
        target: "squish_vid::preset",
        "applying {:?}: target={:.2} MB, height={:?}, fps={:?}",
        preset,
        target_mb,
        height,
        frame_rate
    );

    let preset_config = config
        .clone()
        .with_active_preset(preset)
        .with_target_height(height)
        .with_target_frame_rate(frame_rate)
        .with_target_size_mb(target_mb)
        .with_audio_bitrate_bps(row.audio_bitrate_bps)
        .with_remove_audio(false);
    auto_adjust(&preset_config, source, target_mb)
}
