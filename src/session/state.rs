use std::path::PathBuf;

use serde::Serialize;

use crate::codec::SupportedCodecs;
use crate::encode::EncodeConfig;
use crate::media::SourceMedia;
use crate::prefs::Preferences;
use crate::transcode::TranscodeFailure;

/// The selected file and what the metadata reader reported for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSource {
    pub path: PathBuf,
    pub media: SourceMedia,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CompressionStatus {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Compressing {
        job_id: u64,
        progress: f64,
        bytes_written: u64,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: u64,
        output: PathBuf,
        size_bytes: u64,
        saved_bytes: u64,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: u64,
        failure: TranscodeFailure,
    },
}

impl CompressionStatus {
    /// Job id while a compression is running.
    pub fn running_job(&self) -> Option<u64> {
        match self {
            CompressionStatus::Compressing { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    pub fn is_compressing(&self) -> bool {
        self.running_job().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub source: Option<SelectedSource>,
    pub config: EncodeConfig,
    pub supported_codecs: SupportedCodecs,
    #[serde(skip)]
    pub prefs: Preferences,
    pub compression: CompressionStatus,
    pub has_shared: bool,
}

impl SessionState {
    pub fn new(supported_codecs: SupportedCodecs, prefs: Preferences) -> Self {
        let config = EncodeConfig::default().with_video_codec(supported_codecs.default_codec());
        Self {
            source: None,
            config,
            supported_codecs,
            prefs,
            compression: CompressionStatus::Idle,
            has_shared: false,
        }
    }

    /// Source metadata, or all-zero metadata before a file is selected.
    pub fn media(&self) -> SourceMedia {
        self.source
            .as_ref()
            .map(|s| s.media.clone())
            .unwrap_or_default()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SupportedCodecs::default(), Preferences::default())
    }
}
