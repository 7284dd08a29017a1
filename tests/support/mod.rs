#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use squish_vid_core::codec::{SupportedCodecs, VideoCodec};
use squish_vid_core::error::AppError;
use squish_vid_core::media::{MetadataReader, SourceMedia};
use squish_vid_core::prefs::MemoryPreferences;
use squish_vid_core::session::{Action, Compressor, Session};
use squish_vid_core::transcode::{
    JobState, TranscodeFailure, TranscodeJob, TranscodeRequest, Transcoder,
};

pub const POLL: Duration = Duration::from_millis(5);

/// 1080p30, two minutes, 50 MiB, 128 kbps audio.
pub fn phone_clip() -> SourceMedia {
    SourceMedia {
        size_bytes: 50 * 1024 * 1024,
        width: 1920,
        height: 1080,
        bitrate_bps: 3_500_000,
        audio_bitrate_bps: 128_000,
        frame_rate: 30.0,
        duration_ms: 120_000,
        ..SourceMedia::default()
    }
}

pub fn source(height: u32, frame_rate: f64, duration_ms: u64, audio_bitrate_bps: u32) -> SourceMedia {
    SourceMedia {
        size_bytes: 100 * 1024 * 1024,
        width: height * 16 / 9,
        height,
        bitrate_bps: 0,
        audio_bitrate_bps,
        frame_rate,
        duration_ms,
        ..SourceMedia::default()
    }
}

/// What a scripted job reports on successive polls.
#[derive(Debug, Clone)]
pub enum Step {
    Progress(f64, u64),
    Complete(u64),
    Fail(TranscodeFailure),
    Cancelled,
}

pub struct ScriptedJob {
    output: PathBuf,
    steps: Mutex<VecDeque<Step>>,
    current: Mutex<(JobState, u64)>,
    cancels: AtomicUsize,
}

impl ScriptedJob {
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl TranscodeJob for ScriptedJob {
    fn poll(&self) -> JobState {
        let mut current = self.current.lock();
        if let Some(step) = self.steps.lock().pop_front() {
            *current = match step {
                Step::Progress(progress, bytes) => (JobState::Running { progress }, bytes),
                Step::Complete(size_bytes) => (
                    JobState::Completed {
                        output: self.output.clone(),
                        size_bytes,
                    },
                    size_bytes,
                ),
                Step::Fail(failure) => (JobState::Failed(failure), current.1),
                Step::Cancelled => (JobState::Cancelled, current.1),
            };
        }
        current.0.clone()
    }

    fn bytes_written(&self) -> u64 {
        self.current.lock().1
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

struct JobHandle(Arc<ScriptedJob>);

impl TranscodeJob for JobHandle {
    fn poll(&self) -> JobState {
        self.0.poll()
    }

    fn bytes_written(&self) -> u64 {
        self.0.bytes_written()
    }

    fn cancel(&self) {
        self.0.cancel()
    }
}

type StartHook = Box<dyn Fn() + Send + Sync>;

/// Transcoder whose jobs replay `script`, then hold their last state.
#[derive(Default)]
pub struct FakeTranscoder {
    script: Vec<Step>,
    refuse: bool,
    requests: Mutex<Vec<TranscodeRequest>>,
    jobs: Mutex<Vec<Arc<ScriptedJob>>>,
    on_start: Mutex<Option<StartHook>>,
}

impl FakeTranscoder {
    pub fn scripted(script: Vec<Step>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().clone()
    }

    pub fn last_job(&self) -> Option<Arc<ScriptedJob>> {
        self.jobs.lock().last().cloned()
    }

    /// Run `hook` inside `start`, before the job is handed back.
    pub fn on_start(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_start.lock() = Some(Box::new(hook));
    }
}

impl Transcoder for FakeTranscoder {
    fn start(&self, request: TranscodeRequest) -> Result<Box<dyn TranscodeJob>, AppError> {
        if self.refuse {
            return Err(AppError::FfmpegNotFound("no encoder".to_string()));
        }
        let job = Arc::new(ScriptedJob {
            output: request.output.clone(),
            steps: Mutex::new(self.script.iter().cloned().collect()),
            current: Mutex::new((JobState::NotStarted, 0)),
            cancels: AtomicUsize::new(0),
        });
        self.requests.lock().push(request);
        self.jobs.lock().push(Arc::clone(&job));
        if let Some(hook) = self.on_start.lock().as_ref() {
            hook();
        }
        Ok(Box::new(JobHandle(job)))
    }
}

pub struct FixedReader(pub SourceMedia);

impl MetadataReader for FixedReader {
    fn read(&self, _path: &Path) -> SourceMedia {
        self.0.clone()
    }
}

pub struct Harness {
    pub compressor: Compressor,
    pub transcoder: Arc<FakeTranscoder>,
    pub prefs: Arc<MemoryPreferences>,
    pub output_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(transcoder: FakeTranscoder) -> Self {
        let prefs = Arc::new(MemoryPreferences::default());
        let session = Arc::new(Session::new(
            prefs.clone(),
            SupportedCodecs::new([VideoCodec::H265]),
        ));
        let transcoder = Arc::new(transcoder);
        let output_dir = tempfile::tempdir().expect("tempdir");
        let compressor = Compressor::new(session, transcoder.clone(), output_dir.path(), POLL);
        Self {
            compressor,
            transcoder,
            prefs,
            output_dir,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        self.compressor.session()
    }

    pub fn select(&self, media: SourceMedia) {
        self.session()
            .dispatch(Action::SelectSource {
                path: PathBuf::from("/videos/clip.mp4"),
                media,
            })
            .expect("select source");
    }
}
