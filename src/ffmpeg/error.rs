//! Turning a failed FFmpeg run into a user-facing summary and a
//! [`TranscodeErrorKind`]. The raw stderr always travels along as detail.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::transcode::{TranscodeErrorKind, TranscodeFailure};

/// What the sidecar reports for a failed FFmpeg run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// -1 is our own code for a process that never started.
const EXIT_SUMMARIES: &[(i32, &str)] = &[
    (-1, "FFmpeg could not be started."),
    (1, "Compression failed."),
    (69, "Encoding rate limit exceeded."),
    (123, "Compression was stopped."),
    (255, "Compression was stopped."),
];

const HEADLINE_MAX_BYTES: usize = 120;

pub fn parse_ffmpeg_error(stderr: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = match exit_code {
        Some(code) => EXIT_SUMMARIES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, text)| text.to_string())
            .unwrap_or_else(|| format!("Compression failed (exit code {}).", code)),
        None => headline(stderr),
    };
    FfmpegErrorPayload {
        summary,
        detail: stderr.trim().to_string(),
    }
}

/// First non-blank stderr line, cut on a char boundary with a trailing ellipsis.
fn headline(stderr: &str) -> String {
    let line = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.len() <= HEADLINE_MAX_BYTES {
        return line.to_string();
    }
    let ellipsis = '…';
    let mut cut = HEADLINE_MAX_BYTES - ellipsis.len_utf8();
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &line[..cut], ellipsis)
}

/// Stderr patterns, checked in order; first match decides the kind.
static FAILURE_PATTERNS: LazyLock<Vec<(Regex, TranscodeErrorKind)>> = LazyLock::new(|| {
    [
        (
            r"(?i)unknown encoder|encoder not found|error while opening encoder|error initializing output stream|could not open encoder",
            TranscodeErrorKind::EncoderInit,
        ),
        (
            r"(?i)decoder \(codec .*\) not found|error while opening decoder|could not find codec parameters|error initializing input stream",
            TranscodeErrorKind::DecoderInit,
        ),
        (
            r"(?i)could not write header|error writing trailer|error muxing|muxer|av_interleaved_write_frame",
            TranscodeErrorKind::Muxing,
        ),
        (
            r"(?i)no such file or directory|permission denied|no space left on device|input/output error",
            TranscodeErrorKind::Io,
        ),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("invalid failure pattern"), kind))
    .collect()
});

pub fn classify_stderr(stderr: &str) -> TranscodeErrorKind {
    FAILURE_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(stderr))
        .map(|(_, kind)| *kind)
        .unwrap_or(TranscodeErrorKind::Other)
}

/// Terminal failure for a run that exited with `exit_code`.
pub fn failure_from_exit(stderr: &str, exit_code: Option<i32>) -> TranscodeFailure {
    let payload = parse_ffmpeg_error(stderr, exit_code);
    let details = if payload.detail.is_empty() {
        payload.summary
    } else {
        format!("{}\n{}", payload.summary, payload.detail)
    };
    TranscodeFailure::new(classify_stderr(stderr), details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_exit_codes() {
        assert_eq!(parse_ffmpeg_error("", Some(1)).summary, "Compression failed.");
        assert_eq!(
            parse_ffmpeg_error("", Some(69)).summary,
            "Encoding rate limit exceeded."
        );
        assert_eq!(parse_ffmpeg_error("", Some(255)).summary, "Compression was stopped.");
        assert_eq!(
            parse_ffmpeg_error("", Some(-1)).summary,
            "FFmpeg could not be started."
        );
    }

    #[test]
    fn unknown_code_keeps_stderr_as_detail() {
        let p = parse_ffmpeg_error("  Invalid data found when processing input\n", Some(42));
        assert_eq!(p.summary, "Compression failed (exit code 42).");
        assert_eq!(p.detail, "Invalid data found when processing input");
    }

    #[test]
    fn without_code_the_first_stderr_line_is_the_summary() {
        let p = parse_ffmpeg_error("\nSome random error\nSecond line", None);
        assert_eq!(p.summary, "Some random error");
    }

    #[test]
    fn long_headline_is_cut_on_a_char_boundary() {
        let p = parse_ffmpeg_error(&"é".repeat(100), None);
        assert!(p.summary.len() <= HEADLINE_MAX_BYTES);
        assert!(p.summary.ends_with('…'));
    }

    #[test]
    fn classifies_codec_failures() {
        assert_eq!(
            classify_stderr("Unknown encoder 'libsvtav1'"),
            TranscodeErrorKind::EncoderInit
        );
        assert_eq!(
            classify_stderr("[hevc_nvenc @ 0x1] Error while opening encoder for output stream #0:0"),
            TranscodeErrorKind::EncoderInit
        );
        assert_eq!(
            classify_stderr("Decoder (codec prores) not found for input stream #0:0"),
            TranscodeErrorKind::DecoderInit
        );
    }

    #[test]
    fn classifies_muxing_and_io() {
        assert_eq!(
            classify_stderr("Could not write header for output file #0"),
            TranscodeErrorKind::Muxing
        );
        assert_eq!(
            classify_stderr("/in.mp4: No such file or directory"),
            TranscodeErrorKind::Io
        );
        assert_eq!(classify_stderr("something odd"), TranscodeErrorKind::Other);
    }

    #[test]
    fn failure_details_lead_with_summary() {
        let failure = failure_from_exit("Conversion failed!", Some(1));
        assert_eq!(failure.kind, TranscodeErrorKind::Other);
        assert_eq!(failure.summary(), "Compression failed.");
        assert!(failure.details.ends_with("Conversion failed!"));
    }
}
