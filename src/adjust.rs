//! Auto-adjustment of an encode configuration towards a target size.
//!
//! Two bounded passes over ordered rule tables. The degrade pass applies the
//! first rule that fires while the feasibility floor is above the target,
//! restarting from the top after every change. The restore pass then commits
//! the first quality increase that still fits, again restarting from the top,
//! and stops when no rule can be committed.

use crate::encode::EncodeConfig;
use crate::estimate::{effective_audio_bitrate, effective_height, minimum_size_mb};
use crate::media::SourceMedia;

/// Iteration cap per pass.
pub const MAX_PASS_STEPS: usize = 20;

const DEGRADE_HEIGHTS: &[u32] = &[2160, 1440, 1080, 720, 480, 360];
const LOWEST_HEIGHT: u32 = 240;
const RESTORE_HEIGHTS: &[u32] = &[360, 480, 720, 1080, 1440, 2160];
const RESTORE_AUDIO_BITRATES: &[u32] = &[64_000, 128_000, 192_000, 320_000];
const MAX_AUDIO_BITRATE: u32 = 320_000;

const STANDARD_FRAME_RATE: u32 = 30;
const CINEMA_FRAME_RATE: u32 = 24;
const REDUCED_AUDIO_BITRATE: u32 = 128_000;
const LOW_AUDIO_BITRATE: u32 = 64_000;
/// The 64 kbps audio cut is only taken when the floor exceeds the target by this factor.
const LOW_AUDIO_GAP_FACTOR: f64 = 1.5;

/// One change made by the adjuster. `None` means "back to the source value".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustStep {
    FrameRateDown(u32),
    AudioBitrateDown(u32),
    ResolutionDown(u32),
    ResolutionUp(Option<u32>),
    FrameRateUp(Option<u32>),
    AudioBitrateUp(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub config: EncodeConfig,
    pub steps: Vec<AdjustStep>,
    /// Whether the resulting floor fits the target.
    pub feasible: bool,
}

/// Frame rate as the adjuster compares it: whole frames, source rate truncated.
fn whole_frame_rate(config: &EncodeConfig, source: &SourceMedia) -> u32 {
    config
        .target_frame_rate()
        .unwrap_or(source.frame_rate as u32)
}

struct AdjustContext<'a> {
    source: &'a SourceMedia,
    target_mb: f64,
}

impl AdjustContext<'_> {
    fn floor(&self, config: &EncodeConfig) -> f64 {
        minimum_size_mb(config, self.source)
    }
}

type Change = (EncodeConfig, AdjustStep);
type Rule = fn(&EncodeConfig, &AdjustContext<'_>) -> Option<Change>;

struct NamedRule {
    name: &'static str,
    apply: Rule,
}

fn frame_rate_to_30(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    (whole_frame_rate(config, ctx.source) > STANDARD_FRAME_RATE).then(|| {
        (
            config.clone().with_target_frame_rate(Some(STANDARD_FRAME_RATE)),
            AdjustStep::FrameRateDown(STANDARD_FRAME_RATE),
        )
    })
}

// Audio rules compare the bitrate the estimator charges: 0 ("use source")
// counts as the fallback rate.
fn audio_to_128k(config: &EncodeConfig, _ctx: &AdjustContext<'_>) -> Option<Change> {
    (effective_audio_bitrate(config) > REDUCED_AUDIO_BITRATE).then(|| {
        (
            config.clone().with_audio_bitrate_bps(REDUCED_AUDIO_BITRATE),
            AdjustStep::AudioBitrateDown(REDUCED_AUDIO_BITRATE),
        )
    })
}

fn audio_to_64k(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    let wide_gap = ctx.floor(config) > ctx.target_mb * LOW_AUDIO_GAP_FACTOR;
    (effective_audio_bitrate(config) > LOW_AUDIO_BITRATE && wide_gap).then(|| {
        (
            config.clone().with_audio_bitrate_bps(LOW_AUDIO_BITRATE),
            AdjustStep::AudioBitrateDown(LOW_AUDIO_BITRATE),
        )
    })
}

fn resolution_down(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    let current = effective_height(config, ctx.source);
    let next = DEGRADE_HEIGHTS
        .iter()
        .copied()
        .find(|rung| current > *rung)
        .unwrap_or(LOWEST_HEIGHT);
    (next < current).then(|| {
        (
            config.clone().with_target_height(Some(next)),
            AdjustStep::ResolutionDown(next),
        )
    })
}

fn frame_rate_to_24(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    (whole_frame_rate(config, ctx.source) > CINEMA_FRAME_RATE).then(|| {
        (
            config.clone().with_target_frame_rate(Some(CINEMA_FRAME_RATE)),
            AdjustStep::FrameRateDown(CINEMA_FRAME_RATE),
        )
    })
}

fn resolution_up(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    let source_height = ctx.source.height;
    let current = effective_height(config, ctx.source);
    if current >= source_height {
        return None;
    }
    let next = RESTORE_HEIGHTS
        .iter()
        .copied()
        .find(|rung| current < *rung)
        .unwrap_or(source_height)
        .min(source_height);
    let height = (next < source_height).then_some(next);
    Some((
        config.clone().with_target_height(height),
        AdjustStep::ResolutionUp(height),
    ))
}

fn frame_rate_up(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    let source_fps = ctx.source.frame_rate as u32;
    let current = whole_frame_rate(config, ctx.source);
    if current >= source_fps {
        return None;
    }
    let next = if current < STANDARD_FRAME_RATE {
        STANDARD_FRAME_RATE
    } else {
        source_fps
    };
    let fps = (next < source_fps).then_some(next);
    Some((
        config.clone().with_target_frame_rate(fps),
        AdjustStep::FrameRateUp(fps),
    ))
}

fn audio_up(config: &EncodeConfig, ctx: &AdjustContext<'_>) -> Option<Change> {
    let max_audio = match ctx.source.audio_bitrate_bps {
        0 => MAX_AUDIO_BITRATE,
        bps => bps,
    };
    let current = effective_audio_bitrate(config);
    if current >= max_audio {
        return None;
    }
    let next = RESTORE_AUDIO_BITRATES
        .iter()
        .copied()
        .find(|rung| current < *rung)
        .unwrap_or(max_audio)
        .min(max_audio);
    Some((
        config.clone().with_audio_bitrate_bps(next),
        AdjustStep::AudioBitrateUp(next),
    ))
}

/// Degrade rules, highest priority first.
const DEGRADE_RULES: &[NamedRule] = &[
    NamedRule { name: "frame_rate_to_30", apply: frame_rate_to_30 },
    NamedRule { name: "audio_to_128k", apply: audio_to_128k },
    NamedRule { name: "audio_to_64k", apply: audio_to_64k },
    NamedRule { name: "resolution_down", apply: resolution_down },
    NamedRule { name: "frame_rate_to_24", apply: frame_rate_to_24 },
];

/// Restore rules in perceptual priority: resolution, then frame rate, then audio.
const RESTORE_RULES: &[NamedRule] = &[
    NamedRule { name: "resolution_up", apply: resolution_up },
    NamedRule { name: "frame_rate_up", apply: frame_rate_up },
    NamedRule { name: "audio_up", apply: audio_up },
];

fn degrade(config: EncodeConfig, ctx: &AdjustContext<'_>, steps: &mut Vec<AdjustStep>) -> EncodeConfig {
    let mut config = config;
    let mut attempts = 0;
    while ctx.floor(&config) > ctx.target_mb && attempts < MAX_PASS_STEPS {
        attempts += 1;
        let Some((rule, (next, step))) = DEGRADE_RULES
            .iter()
            .find_map(|rule| (rule.apply)(&config, ctx).map(|change| (rule, change)))
        else {
            log::trace!(
                target: "squish_vid::adjust",
                "degrade exhausted at {:.2} MB (target {:.2} MB)",
                ctx.floor(&config),
                ctx.target_mb
            );
            break;
        };
        log::trace!(target: "squish_vid::adjust", "degrade: {} -> {:?}", rule.name, step);
        steps.push(step);
        config = next;
    }
    config
}

fn restore(config: EncodeConfig, ctx: &AdjustContext<'_>, steps: &mut Vec<AdjustStep>) -> EncodeConfig {
    let mut config = config;
    for _ in 0..MAX_PASS_STEPS {
        let committed = RESTORE_RULES.iter().find_map(|rule| {
            (rule.apply)(&config, ctx)
                .filter(|(candidate, _)| ctx.floor(candidate) <= ctx.target_mb)
                .map(|change| (rule, change))
        });
        let Some((rule, (next, step))) = committed else {
            break;
        };
        log::trace!(target: "squish_vid::adjust", "restore: {} -> {:?}", rule.name, step);
        steps.push(step);
        config = next;
    }
    config
}

/// Adjust `config` towards `target_mb`, recording every step taken.
pub fn plan_adjustment(config: &EncodeConfig, source: &SourceMedia, target_mb: f64) -> Adjustment {
    let ctx = AdjustContext { source, target_mb };
    let mut steps = Vec::new();
    let degraded = degrade(config.clone(), &ctx, &mut steps);
    let restored = restore(degraded, &ctx, &mut steps);
    let feasible = ctx.floor(&restored) <= target_mb;
    log::debug!(
        target: "squish_vid::adjust",
        "adjusted to {:?} in {} steps (floor {:.2} MB, target {:.2} MB, feasible={})",
        restored.target_height(),
        steps.len(),
        ctx.floor(&restored),
        target_mb,
        feasible
    );
    Adjustment {
        config: restored,
        steps,
        feasible,
    }
}

/// Configuration whose feasibility floor is as close to `target_mb` as the
/// rule tables allow, keeping quality as high as fits.
pub fn auto_adjust(config: &EncodeConfig, source: &SourceMedia, target_mb: f64) -> EncodeConfig {
    plan_adjustment(config, source, target_mb).config
}
