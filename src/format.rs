//! Human-readable sizes and bitrates.

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
/// Sizes at or above this many MB are shown in GB.
const GB_DISPLAY_THRESHOLD_MB: f64 = 1000.0;

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 MB".to_string();
    }
    let mb = bytes as f64 / BYTES_PER_MB;
    if mb >= GB_DISPLAY_THRESHOLD_MB {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{:.1} MB", mb)
    }
}

pub fn format_size_mb(mb: f64) -> String {
    format!("{:.1} MB", mb)
}

pub fn format_bitrate(bps: u64, use_mbps: bool) -> String {
    if use_mbps {
        format!("{:.1} Mbps", bps as f64 / 1_000_000.0)
    } else {
        format!("{} kbps", bps / 1000)
    }
}

/// Display toggles persisted across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPrefs {
    pub show_bitrate: bool,
    pub use_mbps: bool,
}

impl DisplayPrefs {
    /// Empty when bitrates are hidden.
    pub fn bitrate(&self, bps: u64) -> String {
        if !self.show_bitrate {
            return String::new();
        }
        format_bitrate(bps, self.use_mbps)
    }

    /// Empty when bitrates are hidden or the source bitrate is unknown.
    pub fn original_bitrate(&self, bps: u64) -> String {
        if bps == 0 {
            return String::new();
        }
        self.bitrate(bps)
    }
}
