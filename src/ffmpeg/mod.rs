//! FFmpeg-backed implementations of the metadata, capability and
//! transcoding seams.

mod args;
pub mod discovery;
mod encoders;
mod error;
pub mod probe;
mod progress;
mod runner;

pub use args::{build_transcode_args, format_args_for_display_multiline};
pub use encoders::{EncoderListing, FfmpegCapabilities, is_hardware_encoder};
pub use error::{FfmpegErrorPayload, classify_stderr, failure_from_exit, parse_ffmpeg_error};
pub use probe::{FfprobeReader, parse_ffprobe_json};
pub use progress::{ProgressLine, parse_progress_line, progress_fraction};
pub use runner::{FfmpegJob, FfmpegTranscoder};

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::path_to_string;
    use std::path::PathBuf;

    #[test]
    fn path_to_string_is_lossless_for_utf8() {
        assert_eq!(path_to_string(&PathBuf::from("/tmp/clip 1.mp4")), "/tmp/clip 1.mp4");
        assert_eq!(path_to_string("relative.mp4"), "relative.mp4");
    }
}
