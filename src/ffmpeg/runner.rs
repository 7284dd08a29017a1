//! FFmpeg process spawning and supervision.
//!
//! Each job spawns FFmpeg as a child process with `-progress pipe:1`. A
//! supervisor thread reads the progress stream and records it in shared
//! state that `poll` reads; a second thread keeps the tail of stderr for
//! failure reports.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;

use super::args::{build_transcode_args, format_args_for_display_multiline};
use super::discovery::get_ffmpeg_path;
use super::encoders::FfmpegCapabilities;
use super::error::failure_from_exit;
use super::progress::{ProgressLine, parse_progress_line, progress_fraction};
use crate::codec::{ALL_CODECS, VideoCodec};
use crate::error::AppError;
use crate::transcode::{
    JobState, TranscodeErrorKind, TranscodeFailure, TranscodeJob, TranscodeRequest, Transcoder,
};

/// Sentinel for "duration not yet known". AtomicU64 cannot hold Option<f64>,
/// so we encode duration as f64 bits; u64::MAX means "not yet known".
const NONE_DURATION_BITS: u64 = u64::MAX;
/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

struct JobShared {
    state: Mutex<JobState>,
    bytes_written: AtomicU64,
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
    duration: AtomicU64,
}

impl JobShared {
    fn duration_secs(&self) -> Option<f64> {
        match self.duration.load(Ordering::Relaxed) {
            NONE_DURATION_BITS => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    fn set_progress(&self, progress: f64) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = JobState::Running { progress };
        }
    }

    fn finish(&self, terminal: JobState) {
        *self.state.lock() = terminal;
    }
}

/// Handle to one FFmpeg run.
pub struct FfmpegJob {
    shared: Arc<JobShared>,
}

impl TranscodeJob for FfmpegJob {
    fn poll(&self) -> JobState {
        self.shared.state.lock().clone()
    }

    fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(child) = self.shared.child.lock().as_mut() {
            log::info!(
                target: "squish_vid::ffmpeg::runner",
                "Terminating FFmpeg process"
            );
            let _ = child.kill();
        }
    }
}

fn collect_stderr(stderr: ChildStderr, shared: Arc<JobShared>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut tail: Vec<u8> = Vec::new();
        let mut reader = BufReader::new(stderr);
        let mut line_buf = Vec::with_capacity(256);
        while reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let line = String::from_utf8_lossy(&line_buf);
            if shared.duration_secs().is_none()
                && let Some(ProgressLine::Duration(secs)) = parse_progress_line(&line)
                && secs > 0.0
            {
                shared.duration.store(secs.to_bits(), Ordering::Relaxed);
            }
            tail.extend_from_slice(&line_buf);
            if tail.len() > MAX_STDERR_BYTES {
                let excess = tail.len() - MAX_STDERR_BYTES;
                tail.drain(..excess);
            }
            line_buf.clear();
        }
        String::from_utf8_lossy(&tail).to_string()
    })
}

fn read_progress(stdout: impl Read, shared: &JobShared) {
    let mut reader = BufReader::new(stdout);
    let mut line_buf = Vec::with_capacity(256);
    while reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
        match parse_progress_line(&String::from_utf8_lossy(&line_buf)) {
            Some(ProgressLine::OutTime(secs)) => {
                if let Some(p) = shared
                    .duration_secs()
                    .and_then(|duration| progress_fraction(secs, duration))
                {
                    shared.set_progress(p);
                }
            }
            Some(ProgressLine::TotalSize(bytes)) => {
                shared.bytes_written.store(bytes, Ordering::Relaxed);
            }
            Some(ProgressLine::End) => shared.set_progress(1.0),
            Some(ProgressLine::Duration(_)) | None => {}
        }
        line_buf.clear();
    }
}

fn supervise(shared: Arc<JobShared>, stdout: ChildStdout, stderr: ChildStderr, output: PathBuf) {
    let stderr_handle = collect_stderr(stderr, Arc::clone(&shared));
    read_progress(stdout, &shared);
    let stderr_tail = stderr_handle.join().unwrap_or_default();

    let child = shared.child.lock().take();
    let status = match child {
        Some(mut c) => c.wait(),
        None => {
            shared.finish(JobState::Cancelled);
            return;
        }
    };

    if shared.cancelled.load(Ordering::SeqCst) {
        log::warn!(
            target: "squish_vid::ffmpeg::runner",
            "FFmpeg process was cancelled"
        );
        let _ = fs::remove_file(&output);
        shared.finish(JobState::Cancelled);
        return;
    }

    let terminal = match status {
        Ok(status) if status.success() => match fs::metadata(&output) {
            Ok(meta) => {
                log::info!(
                    target: "squish_vid::ffmpeg::runner",
                    "FFmpeg completed successfully"
                );
                shared.bytes_written.store(meta.len(), Ordering::Relaxed);
                JobState::Completed {
                    output,
                    size_bytes: meta.len(),
                }
            }
            Err(err) => JobState::Failed(TranscodeFailure::new(
                TranscodeErrorKind::Io,
                format!("Output missing after FFmpeg exited: {}", err),
            )),
        },
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            let err_preview = stderr_tail
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .join("; ");
            log::error!(
                target: "squish_vid::ffmpeg::runner",
                "FFmpeg failed (code={}): {}",
                code,
                err_preview
            );
            JobState::Failed(failure_from_exit(&stderr_tail, Some(code)))
        }
        Err(err) => JobState::Failed(TranscodeFailure::new(
            TranscodeErrorKind::Io,
            format!("Failed to wait for FFmpeg: {}", err),
        )),
    };
    shared.finish(terminal);
}

/// Transcoder that shells out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    encoders: HashMap<VideoCodec, String>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    /// Software encoders from the codec table.
    pub fn new() -> Self {
        let encoders = ALL_CODECS
            .iter()
            .map(|codec| (*codec, codec.ffmpeg_encoder().to_string()))
            .collect();
        Self { encoders }
    }

    /// Prefer the encoders the capability probe found.
    pub fn from_capabilities(caps: &FfmpegCapabilities) -> Self {
        let mut transcoder = Self::new();
        for codec in ALL_CODECS {
            if let Some(name) = caps.listing().encoder_for(*codec, caps.hardware_only()) {
                transcoder.encoders.insert(*codec, name.to_string());
            }
        }
        transcoder
    }

    pub fn encoder(&self, codec: VideoCodec) -> &str {
        self.encoders
            .get(&codec)
            .map(String::as_str)
            .unwrap_or_else(|| codec.ffmpeg_encoder())
    }
}

impl Transcoder for FfmpegTranscoder {
    fn start(&self, request: TranscodeRequest) -> Result<Box<dyn TranscodeJob>, AppError> {
        let ffmpeg_path = get_ffmpeg_path()?;
        let args = build_transcode_args(&request, self.encoder(request.video_codec));
        log::debug!(
            target: "squish_vid::ffmpeg::runner",
            "Spawning FFmpeg: path={}\n{}",
            ffmpeg_path.display(),
            format_args_for_display_multiline(&args)
        );

        let mut cmd = Command::new(ffmpeg_path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::ffmpeg_failed(-1, format!("Failed to spawn FFmpeg: {}", e)))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::ffmpeg_failed(-1, "Failed to capture FFmpeg output"));
            }
        };

        let duration_bits = Some(request.duration_ms)
            .filter(|&ms| ms > 0)
            .map(|ms| (ms as f64 / 1000.0).to_bits())
            .unwrap_or(NONE_DURATION_BITS);
        let shared = Arc::new(JobShared {
            state: Mutex::new(JobState::Running { progress: 0.0 }),
            bytes_written: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            child: Mutex::new(Some(child)),
            duration: AtomicU64::new(duration_bits),
        });

        let supervisor_shared = Arc::clone(&shared);
        let output = request.output.clone();
        thread::spawn(move || supervise(supervisor_shared, stdout, stderr, output));

        Ok(Box::new(FfmpegJob { shared }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::encoders::EncoderListing;

    fn shared() -> JobShared {
        JobShared {
            state: Mutex::new(JobState::Running { progress: 0.0 }),
            bytes_written: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            child: Mutex::new(None),
            duration: AtomicU64::new(10.0f64.to_bits()),
        }
    }

    #[test]
    fn progress_stream_updates_state() {
        let shared = shared();
        let stream = "frame=10\nout_time_ms=2500000\ntotal_size=4096\nprogress=continue\n";
        read_progress(stream.as_bytes(), &shared);
        assert_eq!(*shared.state.lock(), JobState::Running { progress: 0.25 });
        assert_eq!(shared.bytes_written.load(Ordering::Relaxed), 4096);
    }

    #[test]
    fn progress_end_reports_full() {
        let shared = shared();
        read_progress("out_time_ms=1000000\nprogress=end\n".as_bytes(), &shared);
        assert_eq!(*shared.state.lock(), JobState::Running { progress: 1.0 });
    }

    #[test]
    fn unknown_duration_keeps_progress() {
        let shared = shared();
        shared.duration.store(NONE_DURATION_BITS, Ordering::Relaxed);
        read_progress("out_time_ms=1000000\n".as_bytes(), &shared);
        assert_eq!(*shared.state.lock(), JobState::Running { progress: 0.0 });
    }

    #[test]
    fn terminal_state_is_not_overwritten() {
        let shared = shared();
        shared.finish(JobState::Cancelled);
        shared.set_progress(0.5);
        assert_eq!(*shared.state.lock(), JobState::Cancelled);
    }

    #[test]
    fn cancel_is_idempotent_without_child() {
        let job = FfmpegJob {
            shared: Arc::new(shared()),
        };
        job.cancel();
        job.cancel();
        assert!(job.shared.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn encoders_follow_capabilities() {
        let listing = EncoderListing::parse(
            " V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)\n",
        );
        let transcoder = FfmpegTranscoder::from_capabilities(&FfmpegCapabilities::new(listing, true));
        assert_eq!(transcoder.encoder(VideoCodec::H265), "hevc_nvenc");
        assert_eq!(transcoder.encoder(VideoCodec::H264), "libx264");
    }
}
