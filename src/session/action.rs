//! Session transitions as a pure function of the current state.

use std::path::PathBuf;

use crate::adjust::auto_adjust;
use crate::codec::{SupportedCodecs, VideoCodec};
use crate::encode::EncodeConfig;
use crate::error::AppError;
use crate::media::SourceMedia;
use crate::preset::{QualityPreset, apply_preset};
use crate::transcode::TranscodeFailure;

use super::state::{CompressionStatus, SelectedSource, SessionState};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SelectSource { path: PathBuf, media: SourceMedia },
    ApplyPreset(QualityPreset),
    SetTargetSize(f64),
    SetCodec(VideoCodec),
    ToggleRemoveAudio,
    SetAudioBitrate(u32),
    SetAudioVolume(f32),
    /// `None` keeps the source height.
    SetResolution(Option<u32>),
    /// `None` keeps the source frame rate.
    SetFrameRate(Option<u32>),
    ToggleShowBitrate,
    ToggleBitrateUnit,
    MarkShared,
    CapabilitiesResolved(SupportedCodecs),
    Reset,
    CompressionStarted { job_id: u64 },
    CompressionProgress { job_id: u64, progress: f64, bytes_written: u64 },
    CompressionCompleted { job_id: u64, output: PathBuf, size_bytes: u64 },
    CompressionFailed { job_id: u64, failure: TranscodeFailure },
    CompressionCancelled { job_id: u64 },
}

fn require_source(state: &SessionState) -> Result<&SelectedSource, AppError> {
    state.source.as_ref().ok_or(AppError::NoSourceSelected)
}

/// Apply a user edit, then optionally re-solve against the configured target.
fn edit(
    state: &SessionState,
    readjust: bool,
    change: impl FnOnce(&mut EncodeConfig),
) -> Result<SessionState, AppError> {
    let source = require_source(state)?;
    let mut config = state.config.clone();
    change(&mut config);
    if readjust {
        config = auto_adjust(&config, &source.media, config.target_size_mb());
    }
    Ok(SessionState {
        config,
        ..state.clone()
    })
}

/// Lifecycle events for any job but the running one are dropped.
fn for_running_job(
    state: &SessionState,
    job_id: u64,
    event: &str,
    update: impl FnOnce(&SessionState) -> SessionState,
) -> SessionState {
    if state.compression.running_job() == Some(job_id) {
        update(state)
    } else {
        log::warn!(
            target: "squish_vid::session",
            "Ignoring stale {} for job {} (running: {:?})",
            event,
            job_id,
            state.compression.running_job()
        );
        state.clone()
    }
}

pub fn reduce(state: &SessionState, action: Action) -> Result<SessionState, AppError> {
    match action {
        Action::SelectSource { path, media } => {
            let codec = state.supported_codecs.gate(state.config.video_codec());
            let fresh = EncodeConfig::for_source(&media, codec);
            let config = auto_adjust(&fresh, &media, fresh.target_size_mb());
            log::info!(
                target: "squish_vid::session",
                "Selected {} ({} bytes, {}x{}, {} ms)",
                path.display(),
                media.size_bytes,
                media.width,
                media.height,
                media.duration_ms
            );
            Ok(SessionState {
                source: Some(SelectedSource { path, media }),
                config,
                compression: CompressionStatus::Idle,
                has_shared: false,
                ..state.clone()
            })
        }
        Action::ApplyPreset(preset) => {
            let source = require_source(state)?;
            Ok(SessionState {
                config: apply_preset(&state.config, &source.media, preset),
                ..state.clone()
            })
        }
        Action::SetTargetSize(mb) => {
            if !mb.is_finite() || mb <= 0.0 {
                return Err(AppError::invalid_request(format!(
                    "target size must be positive, got {}",
                    mb
                )));
            }
            edit(state, true, |c| c.set_target_size_mb(mb))
        }
        Action::SetCodec(codec) => {
            if !state.supported_codecs.contains(codec) {
                return Err(AppError::UnsupportedCodec(codec));
            }
            edit(state, true, |c| c.set_video_codec(codec))
        }
        Action::ToggleRemoveAudio => {
            // Dropping audio only lowers the floor; re-adding it may need a re-solve.
            let remove = !state.config.remove_audio();
            edit(state, !remove, |c| c.set_remove_audio(remove))
        }
        Action::SetAudioBitrate(bps) => edit(state, true, |c| c.set_audio_bitrate_bps(bps)),
        Action::SetAudioVolume(volume) => {
            if !volume.is_finite() {
                return Err(AppError::invalid_request("volume must be finite"));
            }
            edit(state, false, |c| c.set_audio_volume(volume))
        }
        Action::SetResolution(height) => edit(state, false, |c| {
            c.set_target_height(height.filter(|&h| h > 0))
        }),
        Action::SetFrameRate(fps) => edit(state, false, |c| {
            c.set_target_frame_rate(fps.filter(|&f| f > 0))
        }),
        Action::ToggleShowBitrate => {
            let mut next = state.clone();
            next.prefs.display.show_bitrate = !state.prefs.display.show_bitrate;
            Ok(next)
        }
        Action::ToggleBitrateUnit => {
            let mut next = state.clone();
            next.prefs.display.use_mbps = !state.prefs.display.use_mbps;
            Ok(next)
        }
        Action::MarkShared => Ok(SessionState {
            has_shared: true,
            ..state.clone()
        }),
        Action::CapabilitiesResolved(supported) => {
            let codec = supported.gate(state.config.video_codec());
            let mut config = state.config.clone();
            if codec != config.video_codec() {
                log::info!(
                    target: "squish_vid::session",
                    "{} unsupported, falling back to {}",
                    config.video_codec().display_name(),
                    codec.display_name()
                );
                config = config.with_video_codec(codec);
                if let Some(source) = &state.source {
                    config = auto_adjust(&config, &source.media, config.target_size_mb());
                }
            }
            Ok(SessionState {
                config,
                supported_codecs: supported,
                ..state.clone()
            })
        }
        Action::Reset => {
            log::info!(target: "squish_vid::session", "Session reset");
            Ok(SessionState::new(state.supported_codecs.clone(), state.prefs))
        }
        Action::CompressionStarted { job_id } => {
            require_source(state)?;
            if state.compression.is_compressing() {
                return Err(AppError::AlreadyCompressing);
            }
            Ok(SessionState {
                compression: CompressionStatus::Compressing {
                    job_id,
                    progress: 0.0,
                    bytes_written: 0,
                },
                has_shared: false,
                ..state.clone()
            })
        }
        Action::CompressionProgress {
            job_id,
            progress,
            bytes_written,
        } => Ok(for_running_job(state, job_id, "progress", |s| SessionState {
            compression: CompressionStatus::Compressing {
                job_id,
                progress: progress.clamp(0.0, 1.0),
                bytes_written,
            },
            ..s.clone()
        })),
        Action::CompressionCompleted {
            job_id,
            output,
            size_bytes,
        } => Ok(for_running_job(state, job_id, "completion", |s| {
            let saved_bytes = s.media().size_bytes.saturating_sub(size_bytes);
            let mut next = s.clone();
            next.prefs.total_saved_bytes = s.prefs.total_saved_bytes.saturating_add(saved_bytes);
            next.compression = CompressionStatus::Completed {
                job_id,
                output,
                size_bytes,
                saved_bytes,
            };
            next
        })),
        Action::CompressionFailed { job_id, failure } => {
            Ok(for_running_job(state, job_id, "failure", |s| SessionState {
                compression: CompressionStatus::Failed { job_id, failure },
                ..s.clone()
            }))
        }
        Action::CompressionCancelled { job_id } => {
            Ok(for_running_job(state, job_id, "cancellation", |s| SessionState {
                compression: CompressionStatus::Idle,
                ..s.clone()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::Preferences;
    use crate::transcode::TranscodeErrorKind;

    fn media() -> SourceMedia {
        SourceMedia {
            size_bytes: 50 * 1024 * 1024,
            width: 1920,
            height: 1080,
            bitrate_bps: 3_500_000,
            audio_bitrate_bps: 128_000,
            frame_rate: 30.0,
            duration_ms: 120_000,
            ..Default::default()
        }
    }

    fn selected() -> SessionState {
        let state = SessionState::new(
            SupportedCodecs::new([VideoCodec::H265]),
            Preferences::default(),
        );
        reduce(
            &state,
            Action::SelectSource {
                path: PathBuf::from("/videos/clip.mp4"),
                media: media(),
            },
        )
        .unwrap()
    }

    fn compressing(job_id: u64) -> SessionState {
        reduce(&selected(), Action::CompressionStarted { job_id }).unwrap()
    }

    #[test]
    fn select_uses_default_target_and_fits() {
        let state = selected();
        assert!((state.config.target_size_mb() - 35.0).abs() < 1e-9);
        assert_eq!(state.config.active_preset(), QualityPreset::High);
        assert_eq!(state.config.video_codec(), VideoCodec::H265);
        assert_eq!(state.config.target_height(), None);
    }

    #[test]
    fn edits_require_a_source() {
        let empty = SessionState::default();
        let err = reduce(&empty, Action::SetTargetSize(5.0)).unwrap_err();
        assert!(matches!(err, AppError::NoSourceSelected));
    }

    #[test]
    fn set_target_size_readjusts_and_marks_custom() {
        let state = reduce(&selected(), Action::SetTargetSize(10.0)).unwrap();
        assert_eq!(state.config.active_preset(), QualityPreset::Custom);
        assert_eq!(state.config.target_size_mb(), 10.0);
        assert_eq!(state.config.target_height(), Some(480));
    }

    #[test]
    fn invalid_target_size_is_rejected() {
        for mb in [0.0, -1.0, f64::NAN] {
            assert!(reduce(&selected(), Action::SetTargetSize(mb)).is_err());
        }
    }

    #[test]
    fn unsupported_codec_is_rejected() {
        let err = reduce(&selected(), Action::SetCodec(VideoCodec::Av1)).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedCodec(VideoCodec::Av1)));
    }

    #[test]
    fn remove_audio_toggle_only_readjusts_when_restoring() {
        let tight = reduce(&selected(), Action::SetTargetSize(10.0)).unwrap();
        let removed = reduce(&tight, Action::ToggleRemoveAudio).unwrap();
        assert!(removed.config.remove_audio());
        assert_eq!(removed.config.target_height(), tight.config.target_height());

        let restored = reduce(&removed, Action::ToggleRemoveAudio).unwrap();
        assert!(!restored.config.remove_audio());
        assert_eq!(restored.config.active_preset(), QualityPreset::Custom);
    }

    #[test]
    fn manual_resolution_and_fps_do_not_readjust() {
        let state = reduce(&selected(), Action::SetResolution(Some(2160))).unwrap();
        assert_eq!(state.config.target_height(), Some(2160));
        let state = reduce(&state, Action::SetFrameRate(Some(0))).unwrap();
        assert_eq!(state.config.target_frame_rate(), None);
        assert_eq!(state.config.active_preset(), QualityPreset::Custom);
    }

    #[test]
    fn display_toggles_flip_prefs() {
        let state = reduce(&SessionState::default(), Action::ToggleShowBitrate).unwrap();
        assert!(state.prefs.display.show_bitrate);
        let state = reduce(&state, Action::ToggleBitrateUnit).unwrap();
        assert!(state.prefs.display.use_mbps);
    }

    #[test]
    fn capabilities_gate_falls_back_to_h264() {
        let state = reduce(
            &selected(),
            Action::CapabilitiesResolved(SupportedCodecs::h264_only()),
        )
        .unwrap();
        assert_eq!(state.config.video_codec(), VideoCodec::H264);
        assert!(!state.supported_codecs.contains(VideoCodec::H265));
    }

    #[test]
    fn reset_keeps_totals_and_display() {
        let mut state = selected();
        state.prefs.total_saved_bytes = 99;
        state.prefs.display.use_mbps = true;
        let state = reduce(&state, Action::Reset).unwrap();
        assert!(state.source.is_none());
        assert_eq!(state.prefs.total_saved_bytes, 99);
        assert!(state.prefs.display.use_mbps);
        assert_eq!(state.config.video_codec(), VideoCodec::H265);
    }

    #[test]
    fn second_start_is_rejected() {
        let err = reduce(&compressing(1), Action::CompressionStarted { job_id: 2 }).unwrap_err();
        assert!(matches!(err, AppError::AlreadyCompressing));
    }

    #[test]
    fn completion_adds_saved_bytes() {
        let state = reduce(
            &compressing(1),
            Action::CompressionCompleted {
                job_id: 1,
                output: PathBuf::from("/out/a.mp4"),
                size_bytes: 20 * 1024 * 1024,
            },
        )
        .unwrap();
        assert_eq!(state.prefs.total_saved_bytes, 30 * 1024 * 1024);
        assert!(matches!(
            state.compression,
            CompressionStatus::Completed { saved_bytes, .. } if saved_bytes == 30 * 1024 * 1024
        ));
    }

    #[test]
    fn larger_output_saves_nothing() {
        let state = reduce(
            &compressing(1),
            Action::CompressionCompleted {
                job_id: 1,
                output: PathBuf::from("/out/a.mp4"),
                size_bytes: 80 * 1024 * 1024,
            },
        )
        .unwrap();
        assert_eq!(state.prefs.total_saved_bytes, 0);
    }

    #[test]
    fn stale_events_after_cancel_are_ignored() {
        let cancelled = reduce(&compressing(1), Action::CompressionCancelled { job_id: 1 }).unwrap();
        assert_eq!(cancelled.compression, CompressionStatus::Idle);

        let events = [
            Action::CompressionProgress {
                job_id: 1,
                progress: 0.9,
                bytes_written: 1,
            },
            Action::CompressionFailed {
                job_id: 1,
                failure: TranscodeFailure::new(TranscodeErrorKind::Other, "late"),
            },
            Action::CompressionCancelled { job_id: 1 },
        ];
        for event in events {
            let next = reduce(&cancelled, event).unwrap();
            assert_eq!(next, cancelled);
        }
    }

    #[test]
    fn progress_is_clamped() {
        let state = reduce(
            &compressing(4),
            Action::CompressionProgress {
                job_id: 4,
                progress: 1.7,
                bytes_written: 100,
            },
        )
        .unwrap();
        assert_eq!(
            state.compression,
            CompressionStatus::Compressing {
                job_id: 4,
                progress: 1.0,
                bytes_written: 100
            }
        );
    }
}
