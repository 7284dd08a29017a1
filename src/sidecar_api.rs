use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::{CapabilityProvider, SupportedCodecs, VideoCodec};
use crate::error::AppError;
use crate::estimate::{estimated_size_mb, min_bitrate, minimum_size_mb, target_bitrate};
use crate::ffmpeg::{FfmpegCapabilities, FfmpegTranscoder, FfprobeReader};
use crate::format::{DisplayPrefs, format_file_size, format_size_mb};
use crate::media::MetadataReader;
use crate::prefs::JsonFilePreferences;
use crate::preset::QualityPreset;
use crate::session::{
    Action, CompressionEvent, CompressionStatus, Compressor, Session, SessionState,
};
use crate::settings::SidecarSettings;

const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecInfo {
    pub codec: VideoCodec,
    pub name: &'static str,
    pub mime_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCapabilitiesResult {
    pub protocol_version: u8,
    pub codecs: Vec<CodecInfo>,
    pub default_codec: VideoCodec,
}

/// Figures derived from the configuration, present once a file is selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateView {
    pub minimum_size_mb: f64,
    pub min_bitrate_bps: u64,
    pub target_bitrate_bps: u64,
    pub estimated_size: String,
    pub original_size: String,
    pub original_bitrate: String,
    pub target_bitrate: String,
    /// The minimum size fits within the target.
    pub feasible: bool,
    pub larger_than_original: bool,
}

impl EstimateView {
    fn from_state(state: &SessionState) -> Option<Self> {
        let source = state.source.as_ref()?;
        let media = &source.media;
        let config = &state.config;
        let display = state.prefs.display;
        let minimum = minimum_size_mb(config, media);
        let estimated = estimated_size_mb(config, media);
        let target_bps = target_bitrate(config, media);
        Some(Self {
            minimum_size_mb: minimum,
            min_bitrate_bps: min_bitrate(config, media),
            target_bitrate_bps: target_bps,
            estimated_size: format_size_mb(estimated),
            original_size: format_file_size(media.size_bytes),
            original_bitrate: display.original_bitrate(media.bitrate_bps),
            target_bitrate: display.bitrate(target_bps),
            feasible: minimum <= config.target_size_mb(),
            larger_than_original: media.size_bytes > 0 && estimated > media.size_mb(),
        })
    }
}

/// Session state plus everything a client renders from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub state: SessionState,
    pub display: DisplayPrefs,
    pub total_saved_bytes: u64,
    pub total_saved: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimateView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<String>,
}

impl From<SessionState> for SessionView {
    fn from(state: SessionState) -> Self {
        let estimate = EstimateView::from_state(&state);
        let compressed_size = match &state.compression {
            CompressionStatus::Completed { size_bytes, .. } => Some(format_file_size(*size_bytes)),
            _ => None,
        };
        Self {
            display: state.prefs.display,
            total_saved_bytes: state.prefs.total_saved_bytes,
            total_saved: format_file_size(state.prefs.total_saved_bytes),
            estimate,
            compressed_size,
            state,
        }
    }
}

/// User edits accepted by `session.update`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionUpdate {
    Preset { preset: QualityPreset },
    TargetSize { mb: f64 },
    Codec { codec: VideoCodec },
    ToggleRemoveAudio,
    AudioBitrate { bps: u32 },
    AudioVolume { volume: f32 },
    Resolution { height: Option<u32> },
    FrameRate { fps: Option<u32> },
    ToggleShowBitrate,
    ToggleBitrateUnit,
    MarkShared,
}

impl From<SessionUpdate> for Action {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::Preset { preset } => Action::ApplyPreset(preset),
            SessionUpdate::TargetSize { mb } => Action::SetTargetSize(mb),
            SessionUpdate::Codec { codec } => Action::SetCodec(codec),
            SessionUpdate::ToggleRemoveAudio => Action::ToggleRemoveAudio,
            SessionUpdate::AudioBitrate { bps } => Action::SetAudioBitrate(bps),
            SessionUpdate::AudioVolume { volume } => Action::SetAudioVolume(volume),
            SessionUpdate::Resolution { height } => Action::SetResolution(height),
            SessionUpdate::FrameRate { fps } => Action::SetFrameRate(fps),
            SessionUpdate::ToggleShowBitrate => Action::ToggleShowBitrate,
            SessionUpdate::ToggleBitrateUnit => Action::ToggleBitrateUnit,
            SessionUpdate::MarkShared => Action::MarkShared,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResult {
    pub cancelled: bool,
    pub job_id: Option<u64>,
}

fn block_on_async<T>(future: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::from(format!("Failed to initialize async runtime: {}", e)))?;
    runtime.block_on(future)
}

/// Everything the sidecar serves requests from.
pub struct SidecarContext {
    compressor: Arc<Compressor>,
    reader: Arc<dyn MetadataReader>,
}

impl SidecarContext {
    pub fn new(compressor: Arc<Compressor>, reader: Arc<dyn MetadataReader>) -> Self {
        Self { compressor, reader }
    }

    /// Wire the FFmpeg-backed collaborators described by `settings`.
    pub fn from_settings(settings: &SidecarSettings) -> Self {
        let capabilities = FfmpegCapabilities::detect(settings.hardware_only);
        let store = Arc::new(JsonFilePreferences::open(&settings.prefs_path));
        // H.265 until the encoder listing says otherwise.
        let session = Arc::new(Session::new(store, SupportedCodecs::new([VideoCodec::H265])));
        let context = Self::new(
            Arc::new(Compressor::new(
                session,
                Arc::new(FfmpegTranscoder::from_capabilities(&capabilities)),
                &settings.output_dir,
                settings.poll_interval,
            )),
            Arc::new(FfprobeReader),
        );
        context.resolve_capabilities(&capabilities);
        context
    }

    pub fn session(&self) -> &Arc<Session> {
        self.compressor.session()
    }

    pub fn compressor(&self) -> &Arc<Compressor> {
        &self.compressor
    }

    /// Apply the encoder set reported by `provider`.
    pub fn resolve_capabilities(&self, provider: &dyn CapabilityProvider) {
        let supported = provider.supported_codecs();
        log::info!(
            target: "squish_vid::sidecar",
            "Supported codecs: {:?}",
            supported
        );
        if let Err(err) = self
            .session()
            .dispatch(Action::CapabilitiesResolved(supported))
        {
            log::warn!(
                target: "squish_vid::sidecar",
                "Failed to apply capabilities: {}",
                err
            );
        }
    }

    pub fn app_capabilities(&self) -> AppCapabilitiesResult {
        let supported = self.session().state().supported_codecs;
        AppCapabilitiesResult {
            protocol_version: PROTOCOL_VERSION,
            codecs: supported
                .iter()
                .map(|codec| CodecInfo {
                    codec,
                    name: codec.display_name(),
                    mime_type: codec.mime_type(),
                })
                .collect(),
            default_codec: supported.default_codec(),
        }
    }

    pub fn state(&self) -> SessionView {
        self.session().state().into()
    }

    pub fn select(&self, path: PathBuf) -> Result<SessionView, AppError> {
        let media = self.reader.read(&path);
        let state = self.session().dispatch(Action::SelectSource { path, media })?;
        Ok(state.into())
    }

    pub fn update(&self, update: SessionUpdate) -> Result<SessionView, AppError> {
        let state = self.session().dispatch(update.into())?;
        Ok(state.into())
    }

    pub fn reset(&self) -> Result<SessionView, AppError> {
        self.compressor.reset()?;
        Ok(self.state())
    }

    /// Start a compression and drive it to its terminal event, reporting
    /// progress along the way. Blocks the calling thread.
    pub fn compress_with_events(
        &self,
        on_event: impl FnMut(&CompressionEvent),
    ) -> Result<CompressionEvent, AppError> {
        let started = self.compressor.start()?;
        let compressor = Arc::clone(&self.compressor);
        block_on_async(async move { Ok(compressor.run(started, on_event).await) })
    }

    /// Cancel the running job; `job_id`, when given, must name it.
    pub fn cancel(&self, job_id: Option<u64>) -> Result<CancelResult, AppError> {
        match (self.compressor.current_job(), job_id) {
            (None, Some(job_id)) => Err(AppError::from(format!("Unknown jobId: {}", job_id))),
            (None, None) => Ok(CancelResult {
                cancelled: false,
                job_id: None,
            }),
            (Some(active), Some(job_id)) if active != job_id => {
                Err(AppError::from(format!("Unknown jobId: {}", job_id)))
            }
            (Some(_), _) => {
                let cancelled = self.compressor.cancel();
                Ok(CancelResult {
                    cancelled: cancelled.is_some(),
                    job_id: cancelled,
                })
            }
        }
    }
}
