//! Compression driver: starts a transcode for the current session, polls
//! it on a fixed interval and folds its progress into the session.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::transcode::{
    JobState, TranscodeErrorKind, TranscodeFailure, TranscodeJob, Transcoder, build_request,
    output_path,
};

use super::action::Action;
use super::state::CompressionStatus;
use super::store::Session;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Emitted while a job is driven. Only the last one is terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CompressionEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
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
        summary: String,
        failure: TranscodeFailure,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled { job_id: u64 },
}

impl CompressionEvent {
    pub fn job_id(&self) -> u64 {
        match self {
            CompressionEvent::Progress { job_id, .. }
            | CompressionEvent::Completed { job_id, .. }
            | CompressionEvent::Failed { job_id, .. }
            | CompressionEvent::Cancelled { job_id } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompressionEvent::Progress { .. })
    }
}

#[derive(Clone)]
struct ActiveJob {
    job_id: u64,
    job: Arc<dyn TranscodeJob>,
}

/// A started job, to be handed to [`Compressor::run`].
pub struct StartedJob {
    job_id: u64,
    job: Arc<dyn TranscodeJob>,
}

impl StartedJob {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }
}

pub struct Compressor {
    session: Arc<Session>,
    transcoder: Arc<dyn Transcoder>,
    output_dir: PathBuf,
    poll_interval: Duration,
    next_job_id: AtomicU64,
    active: Mutex<Option<ActiveJob>>,
}

impl Compressor {
    pub fn new(
        session: Arc<Session>,
        transcoder: Arc<dyn Transcoder>,
        output_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session,
            transcoder,
            output_dir: output_dir.into(),
            poll_interval,
            next_job_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Hand the current configuration to the transcoder.
    pub fn start(&self) -> Result<StartedJob, AppError> {
        let state = self.session.state();
        let source = state.source.as_ref().ok_or(AppError::NoSourceSelected)?;
        if state.compression.is_compressing() {
            return Err(AppError::AlreadyCompressing);
        }
        fs::create_dir_all(&self.output_dir)?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let request = build_request(
            &state.config,
            &source.media,
            &source.path,
            output_path(&self.output_dir),
        );
        log::debug!(
            target: "squish_vid::session::job",
            "Starting job {}: codec={}, video={} bps, audio={} bps, resolution={:?}, fps={:?}",
            job_id,
            request.video_codec.display_name(),
            request.video_bitrate_bps,
            request.audio_bitrate_bps,
            request.resolution,
            request.frame_rate.map(|f| f.to)
        );

        self.session.dispatch(Action::CompressionStarted { job_id })?;
        let job: Arc<dyn TranscodeJob> = match self.transcoder.start(request) {
            Ok(job) => Arc::from(job),
            Err(err) => {
                log::error!(
                    target: "squish_vid::session::job",
                    "Transcoder failed to start job {}: {}",
                    job_id,
                    err
                );
                self.session.dispatch(Action::CompressionFailed {
                    job_id,
                    failure: TranscodeFailure::new(TranscodeErrorKind::Other, err.to_string()),
                })?;
                return Err(err);
            }
        };

        // A cancel that landed while the transcoder was starting has already
        // moved the session on; the registry lock orders us against later ones.
        let mut active = self.active.lock();
        if self.session.state().compression.running_job() != Some(job_id) {
            drop(active);
            log::info!(
                target: "squish_vid::session::job",
                "Job {} was cancelled while starting",
                job_id
            );
            job.cancel();
            return Err(AppError::Aborted);
        }
        *active = Some(ActiveJob {
            job_id,
            job: Arc::clone(&job),
        });
        drop(active);
        Ok(StartedJob { job_id, job })
    }

    /// Poll `started` until it reaches a terminal state or stops being the
    /// running job, reporting each observation to `on_event`.
    pub async fn run(
        &self,
        started: StartedJob,
        mut on_event: impl FnMut(&CompressionEvent),
    ) -> CompressionEvent {
        let StartedJob { job_id, job } = started;
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let terminal = loop {
            interval.tick().await;

            if self.session.state().compression.running_job() != Some(job_id) {
                // Still registered means the session moved on without going
                // through `cancel`, so the transcoder is still running.
                if self.clear_active(job_id) {
                    log::info!(
                        target: "squish_vid::session::job",
                        "Job {} superseded, stopping transcoder",
                        job_id
                    );
                    job.cancel();
                }
                break CompressionEvent::Cancelled { job_id };
            }

            let polled = job.poll();
            log::trace!(
                target: "squish_vid::session::job",
                "Job {} poll: {:?}",
                job_id,
                polled
            );
            match self.observe(job_id, job.as_ref(), polled) {
                Some(event) if event.is_terminal() => break event,
                Some(event) => on_event(&event),
                None => {}
            }
        };

        self.clear_active(job_id);
        on_event(&terminal);
        terminal
    }

    /// Fold one poll result into the session.
    fn observe(&self, job_id: u64, job: &dyn TranscodeJob, polled: JobState) -> Option<CompressionEvent> {
        match polled {
            JobState::NotStarted => None,
            JobState::Running { progress } => {
                let bytes_written = job.bytes_written();
                self.dispatch_quietly(Action::CompressionProgress {
                    job_id,
                    progress,
                    bytes_written,
                });
                Some(CompressionEvent::Progress {
                    job_id,
                    progress: progress.clamp(0.0, 1.0),
                    bytes_written,
                })
            }
            JobState::Completed { output, size_bytes } => {
                self.dispatch_quietly(Action::CompressionCompleted {
                    job_id,
                    output: output.clone(),
                    size_bytes,
                });
                let saved_bytes = match self.session.state().compression {
                    CompressionStatus::Completed {
                        job_id: done,
                        saved_bytes,
                        ..
                    } if done == job_id => saved_bytes,
                    _ => 0,
                };
                log::info!(
                    target: "squish_vid::session::job",
                    "Job {} completed: {} ({} bytes, saved {})",
                    job_id,
                    output.display(),
                    size_bytes,
                    saved_bytes
                );
                Some(CompressionEvent::Completed {
                    job_id,
                    output,
                    size_bytes,
                    saved_bytes,
                })
            }
            JobState::Failed(failure) => {
                log::error!(
                    target: "squish_vid::session::job",
                    "Job {} failed ({:?}): {}",
                    job_id,
                    failure.kind,
                    failure.summary()
                );
                self.dispatch_quietly(Action::CompressionFailed {
                    job_id,
                    failure: failure.clone(),
                });
                Some(CompressionEvent::Failed {
                    job_id,
                    summary: failure.summary(),
                    failure,
                })
            }
            JobState::Cancelled => {
                self.dispatch_quietly(Action::CompressionCancelled { job_id });
                Some(CompressionEvent::Cancelled { job_id })
            }
        }
    }

    fn dispatch_quietly(&self, action: Action) {
        if let Err(err) = self.session.dispatch(action) {
            log::warn!(
                target: "squish_vid::session::job",
                "Dropped job event: {}",
                err
            );
        }
    }

    /// Forget `job_id` if it is the registered job. Returns whether it was.
    fn clear_active(&self, job_id: u64) -> bool {
        let mut guard = self.active.lock();
        if let Some(active) = guard.as_ref()
            && active.job_id == job_id
        {
            *guard = None;
            return true;
        }
        false
    }

    /// The running job, including one whose transcoder is still starting.
    pub fn current_job(&self) -> Option<u64> {
        let registered = self.active.lock().as_ref().map(|a| a.job_id);
        registered.or_else(|| self.session.state().compression.running_job())
    }

    /// Cancel the running job. Returns its id, or `None` when nothing was
    /// running; repeated calls are no-ops.
    pub fn cancel(&self) -> Option<u64> {
        let active = self.active.lock().take();
        let job_id = match &active {
            Some(active) => active.job_id,
            None => self.session.state().compression.running_job()?,
        };
        log::info!(
            target: "squish_vid::session::job",
            "Cancelling job {}",
            job_id
        );
        self.dispatch_quietly(Action::CompressionCancelled { job_id });
        if let Some(active) = active {
            active.job.cancel();
        }
        Some(job_id)
    }

    /// Cancel any running job, delete previous outputs and reset the session.
    pub fn reset(&self) -> Result<(), AppError> {
        self.cancel();
        clear_output_dir(&self.output_dir);
        self.session.dispatch(Action::Reset)?;
        Ok(())
    }
}

/// Remove files left by earlier compressions. Errors are logged, not returned.
pub fn clear_output_dir(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file()
            && let Err(err) = fs::remove_file(&path)
        {
            log::warn!(
                target: "squish_vid::session::job",
                "Failed to remove {}: {}",
                path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_output_dir_removes_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("compress_1_0.mp4"), b"x").unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();
        clear_output_dir(dir.path());
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("keep")]);
    }

    #[test]
    fn clear_missing_dir_is_noop() {
        clear_output_dir(Path::new("/nonexistent/squish-vid-test"));
    }

    #[test]
    fn event_terminality() {
        assert!(!CompressionEvent::Progress {
            job_id: 1,
            progress: 0.1,
            bytes_written: 0
        }
        .is_terminal());
        assert!(CompressionEvent::Cancelled { job_id: 1 }.is_terminal());
        assert_eq!(CompressionEvent::Cancelled { job_id: 7 }.job_id(), 7);
    }
}
