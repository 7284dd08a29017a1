//! Bitrate and output-size estimation.
//!
//! Translates between a size budget (binary megabytes) and encoder bitrate
//! (decimal bits per second). Every function here is total: missing
//! metadata falls back to fixed constants instead of failing.

use crate::encode::EncodeConfig;
use crate::media::SourceMedia;

/// Audio bitrate assumed when the configuration leaves it at 0.
pub const FALLBACK_AUDIO_BITRATE_BPS: u32 = 256_000;
/// Minimum size reported when the duration is unknown.
pub const UNKNOWN_DURATION_MIN_SIZE_MB: f64 = 0.1;
/// Bitrate requested when the duration is unknown.
pub const UNKNOWN_DURATION_BITRATE_BPS: u64 = 2_000_000;

/// Stability floor per effective height, highest threshold first.
const BITRATE_FLOORS: &[(u32, u64)] = &[
    (2160, 4_000_000),
    (1440, 2_500_000),
    (1080, 1_500_000),
    (720, 1_000_000),
    (480, 500_000),
    (360, 350_000),
];
const LOWEST_BITRATE_FLOOR: u64 = 200_000;

const HIGH_FRAME_RATE_THRESHOLD: f64 = 45.0;
const HIGH_FRAME_RATE_MULTIPLIER: (u64, u64) = (3, 2);

/// Container headers and index, on top of a 2% proportional reserve.
const MUXER_OVERHEAD_BITS: f64 = 50.0 * 1024.0 * 8.0;
const MUXER_OVERHEAD_RATIO: f64 = 0.02;
/// Share of the budget the video stream keeps however tight the target is.
const MIN_VIDEO_SHARE: f64 = 0.1;

const BITS_PER_MB: f64 = 8.0 * 1024.0 * 1024.0;

pub fn effective_height(config: &EncodeConfig, source: &SourceMedia) -> u32 {
    config.target_height().unwrap_or(source.height)
}

pub fn effective_frame_rate(config: &EncodeConfig, source: &SourceMedia) -> f64 {
    config
        .target_frame_rate()
        .map(f64::from)
        .unwrap_or(source.frame_rate)
}

/// Audio bitrate counted against the size budget.
pub fn effective_audio_bitrate(config: &EncodeConfig) -> u32 {
    match config.audio_bitrate_bps() {
        0 => FALLBACK_AUDIO_BITRATE_BPS,
        bps => bps,
    }
}

fn duration_secs(source: &SourceMedia) -> Option<f64> {
    (source.duration_ms > 0).then(|| source.duration_ms as f64 / 1000.0)
}

fn audio_bits(config: &EncodeConfig, seconds: f64) -> f64 {
    if config.remove_audio() {
        0.0
    } else {
        f64::from(effective_audio_bitrate(config)) * seconds
    }
}

/// Lowest bitrate the encoder stays stable at for the effective
/// resolution, codec and frame rate.
pub fn min_bitrate(config: &EncodeConfig, source: &SourceMedia) -> u64 {
    let height = effective_height(config, source);
    let base = BITRATE_FLOORS
        .iter()
        .find(|(threshold, _)| height >= *threshold)
        .map(|(_, floor)| *floor)
        .unwrap_or(LOWEST_BITRATE_FLOOR);

    let (num, den) = config.video_codec().efficiency();
    let discounted = base * num / den;

    if effective_frame_rate(config, source) > HIGH_FRAME_RATE_THRESHOLD {
        let (num, den) = HIGH_FRAME_RATE_MULTIPLIER;
        discounted * num / den
    } else {
        discounted
    }
}

/// Smallest output reachable without going under [`min_bitrate`], audio included.
pub fn minimum_size_mb(config: &EncodeConfig, source: &SourceMedia) -> f64 {
    let Some(seconds) = duration_secs(source) else {
        return UNKNOWN_DURATION_MIN_SIZE_MB;
    };
    let video_bits = min_bitrate(config, source) as f64 * seconds;
    (video_bits + audio_bits(config, seconds)) / BITS_PER_MB
}

/// Video bitrate requested from the transcoder for the configured target size.
///
/// Bounded below by [`min_bitrate`] and above by the source bitrate when
/// known. The upper bound is applied last, so a source encoded under the
/// stability floor is never inflated.
pub fn target_bitrate(config: &EncodeConfig, source: &SourceMedia) -> u64 {
    let Some(seconds) = duration_secs(source) else {
        return UNKNOWN_DURATION_BITRATE_BPS;
    };

    let target_bits = config.target_size_mb() * BITS_PER_MB;
    let overhead_bits = target_bits * MUXER_OVERHEAD_RATIO + MUXER_OVERHEAD_BITS;
    let available_video_bits = (target_bits - audio_bits(config, seconds) - overhead_bits)
        .max(target_bits * MIN_VIDEO_SHARE);

    let calculated = (available_video_bits / seconds) as u64;
    let floored = calculated.max(min_bitrate(config, source));
    if source.bitrate_bps > 0 {
        floored.min(source.bitrate_bps)
    } else {
        floored
    }
}

/// Size shown to the user: the target, unless it is below the feasibility floor.
pub fn estimated_size_mb(config: &EncodeConfig, source: &SourceMedia) -> f64 {
    config.target_size_mb().max(minimum_size_mb(config, source))
}
