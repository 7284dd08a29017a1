use regex::Regex;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration: (\d+):(\d+):([\d.]+)").expect("invalid duration regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^out_time_ms=(\d+)").expect("invalid time regex"));
static TOTAL_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^total_size=(\d+)").expect("invalid size regex"));

/// One interesting line of FFmpeg output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Input duration in seconds, from the stderr banner.
    Duration(f64),
    /// Output timestamp in seconds, from `-progress`.
    OutTime(f64),
    /// Bytes written so far, from `-progress`.
    TotalSize(u64),
    /// `progress=end`.
    End,
}

pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let line = line.trim();
    if line == "progress=end" {
        return Some(ProgressLine::End);
    }
    if let Some(caps) = DURATION_RE.captures(line) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        let minutes: f64 = caps[2].parse().unwrap_or(0.0);
        let seconds: f64 = caps[3].parse().unwrap_or(0.0);
        return Some(ProgressLine::Duration(hours * 3600.0 + minutes * 60.0 + seconds));
    }
    // out_time_ms is in microseconds despite the name.
    if let Some(caps) = TIME_RE.captures(line) {
        let micros: u64 = caps[1].parse().unwrap_or(0);
        return Some(ProgressLine::OutTime(micros as f64 / 1_000_000.0));
    }
    if let Some(caps) = TOTAL_SIZE_RE.captures(line) {
        return caps[1].parse().ok().map(ProgressLine::TotalSize);
    }
    None
}

/// Fraction of `duration_secs` covered by `out_time_secs`, capped at 1.
pub fn progress_fraction(out_time_secs: f64, duration_secs: f64) -> Option<f64> {
    (duration_secs > 0.0).then(|| (out_time_secs / duration_secs).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsed() {
        assert_eq!(
            parse_progress_line("  Duration: 0:1:30.5, start: 0.000000"),
            Some(ProgressLine::Duration(90.5))
        );
        assert_eq!(
            parse_progress_line("Duration: 1:2:3.0"),
            Some(ProgressLine::Duration(3723.0))
        );
    }

    #[test]
    fn out_time_ms_is_microseconds() {
        assert_eq!(
            parse_progress_line("out_time_ms=5000000"),
            Some(ProgressLine::OutTime(5.0))
        );
    }

    #[test]
    fn total_size_and_end() {
        assert_eq!(
            parse_progress_line("total_size=1048576"),
            Some(ProgressLine::TotalSize(1_048_576))
        );
        assert_eq!(parse_progress_line("progress=end\r"), Some(ProgressLine::End));
        assert_eq!(parse_progress_line("progress=continue"), None);
    }

    #[test]
    fn unrelated_lines_ignored() {
        assert_eq!(parse_progress_line("random garbage"), None);
        assert_eq!(parse_progress_line("bitrate=1200.0kbits/s"), None);
    }

    #[test]
    fn fraction_is_capped() {
        assert_eq!(progress_fraction(5.0, 10.0), Some(0.5));
        assert_eq!(progress_fraction(12.0, 10.0), Some(1.0));
        assert_eq!(progress_fraction(1.0, 0.0), None);
    }
}
