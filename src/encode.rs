//! User-driven encode configuration.
//!
//! Fields are read through getters. Edits made on behalf of the user go
//! through the `set_*` methods, which mark the configuration as
//! [`QualityPreset::Custom`]; presets and the auto-adjuster use the
//! crate-internal overrides and keep the active preset untouched.

use serde::Serialize;

use crate::codec::VideoCodec;
use crate::media::SourceMedia;
use crate::preset::QualityPreset;

/// Audio bitrate a fresh configuration starts with.
pub const DEFAULT_AUDIO_BITRATE_BPS: u32 = 128_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeConfig {
    video_codec: VideoCodec,
    target_size_mb: f64,
    /// `None` keeps the source height.
    target_height: Option<u32>,
    /// `None` keeps the source frame rate.
    target_frame_rate: Option<u32>,
    remove_audio: bool,
    /// 0 defers to the source audio bitrate at encode time.
    audio_bitrate_bps: u32,
    audio_volume: f32,
    active_preset: QualityPreset,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H265,
            target_size_mb: crate::media::DEFAULT_TARGET_MB,
            target_height: None,
            target_frame_rate: None,
            remove_audio: false,
            audio_bitrate_bps: DEFAULT_AUDIO_BITRATE_BPS,
            audio_volume: 1.0,
            active_preset: QualityPreset::High,
        }
    }
}

impl EncodeConfig {
    /// Configuration offered right after a file is selected.
    pub fn for_source(source: &SourceMedia, codec: VideoCodec) -> Self {
        Self {
            video_codec: codec,
            target_size_mb: source.default_target_mb(),
            ..Self::default()
        }
    }

    pub fn video_codec(&self) -> VideoCodec {
        self.video_codec
    }

    pub fn target_size_mb(&self) -> f64 {
        self.target_size_mb
    }

    pub fn target_height(&self) -> Option<u32> {
        self.target_height
    }

    pub fn target_frame_rate(&self) -> Option<u32> {
        self.target_frame_rate
    }

    pub fn remove_audio(&self) -> bool {
        self.remove_audio
    }

    pub fn audio_bitrate_bps(&self) -> u32 {
        self.audio_bitrate_bps
    }

    pub fn audio_volume(&self) -> f32 {
        self.audio_volume
    }

    pub fn active_preset(&self) -> QualityPreset {
        self.active_preset
    }

    pub fn set_video_codec(&mut self, codec: VideoCodec) {
        self.video_codec = codec;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_target_size_mb(&mut self, mb: f64) {
        self.target_size_mb = mb;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_target_height(&mut self, height: Option<u32>) {
        self.target_height = height;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_target_frame_rate(&mut self, fps: Option<u32>) {
        self.target_frame_rate = fps;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_remove_audio(&mut self, remove: bool) {
        self.remove_audio = remove;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_audio_bitrate_bps(&mut self, bps: u32) {
        self.audio_bitrate_bps = bps;
        self.active_preset = QualityPreset::Custom;
    }

    pub fn set_audio_volume(&mut self, volume: f32) {
        self.audio_volume = volume.max(0.0);
        self.active_preset = QualityPreset::Custom;
    }

    pub fn mark_custom(&mut self) {
        self.active_preset = QualityPreset::Custom;
    }

    pub(crate) fn with_video_codec(mut self, codec: VideoCodec) -> Self {
        self.video_codec = codec;
        self
    }

    pub(crate) fn with_target_size_mb(mut self, mb: f64) -> Self {
        self.target_size_mb = mb;
        self
    }

    pub(crate) fn with_target_height(mut self, height: Option<u32>) -> Self {
        self.target_height = height;
        self
    }

    pub(crate) fn with_target_frame_rate(mut self, fps: Option<u32>) -> Self {
        self.target_frame_rate = fps;
        self
    }

    pub(crate) fn with_remove_audio(mut self, remove: bool) -> Self {
        self.remove_audio = remove;
        self
    }

    pub(crate) fn with_audio_bitrate_bps(mut self, bps: u32) -> Self {
        self.audio_bitrate_bps = bps;
        self
    }

    pub(crate) fn with_active_preset(mut self, preset: QualityPreset) -> Self {
        self.active_preset = preset;
        self
    }
}
