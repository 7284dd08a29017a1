//! Video codec table, device capability gate and encoder filtering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

struct CodecRow {
    codec: VideoCodec,
    mime: &'static str,
    name: &'static str,
    ffmpeg_encoder: &'static str,
    /// Bitrate floor discount as a ratio (numerator, denominator).
    efficiency: (u64, u64),
}

macro_rules! codec_table {
    (
        $( [$codec:expr, $mime:expr, $name:expr, $encoder:expr, $efficiency:expr] ),* $(,)?
    ) => {
        const CODEC_TABLE: &[CodecRow] = &[
            $( CodecRow {
                codec: $codec,
                mime: $mime,
                name: $name,
                ffmpeg_encoder: $encoder,
                efficiency: $efficiency,
            } ),*
        ];

        /// Every codec from CODEC_TABLE, in table order.
        pub const ALL_CODECS: &[VideoCodec] = &[ $($codec),* ];
    };
}

codec_table!(
    [VideoCodec::H264, "video/avc", "H.264", "libx264", (100, 100)],
    [VideoCodec::H265, "video/hevc", "H.265", "libx265", (70, 100)],
    [VideoCodec::Av1, "video/av01", "AV1", "libsvtav1", (60, 100)],
);

impl VideoCodec {
    fn row(self) -> &'static CodecRow {
        CODEC_TABLE
            .iter()
            .find(|r| r.codec == self)
            .unwrap_or(&CODEC_TABLE[0])
    }

    pub fn mime_type(self) -> &'static str {
        self.row().mime
    }

    pub fn display_name(self) -> &'static str {
        self.row().name
    }

    /// Software FFmpeg encoder used when no hardware encoder is preferred.
    pub fn ffmpeg_encoder(self) -> &'static str {
        self.row().ffmpeg_encoder
    }

    pub fn efficiency(self) -> (u64, u64) {
        self.row().efficiency
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        CODEC_TABLE
            .iter()
            .find(|r| r.mime.eq_ignore_ascii_case(mime))
            .map(|r| r.codec)
    }
}

/// Codecs the device can hardware-encode. H.264 is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SupportedCodecs(Vec<VideoCodec>);

impl SupportedCodecs {
    pub fn new(codecs: impl IntoIterator<Item = VideoCodec>) -> Self {
        let mut list: Vec<VideoCodec> = codecs.into_iter().collect();
        list.push(VideoCodec::H264);
        list.sort();
        list.dedup();
        Self(list)
    }

    pub fn h264_only() -> Self {
        Self::new([])
    }

    pub fn contains(&self, codec: VideoCodec) -> bool {
        self.0.contains(&codec)
    }

    pub fn iter(&self) -> impl Iterator<Item = VideoCodec> + '_ {
        self.0.iter().copied()
    }

    /// Codec a fresh session starts with.
    pub fn default_codec(&self) -> VideoCodec {
        if self.contains(VideoCodec::H265) {
            VideoCodec::H265
        } else {
            VideoCodec::H264
        }
    }

    /// Falls back to H.264 when H.265 is configured but cannot be encoded.
    pub fn gate(&self, codec: VideoCodec) -> VideoCodec {
        if codec == VideoCodec::H265 && !self.contains(VideoCodec::H265) {
            VideoCodec::H264
        } else {
            codec
        }
    }
}

impl Default for SupportedCodecs {
    fn default() -> Self {
        Self::h264_only()
    }
}

/// Source of the device's encoder set. Queried once at startup.
pub trait CapabilityProvider: Send + Sync {
    fn supported_codecs(&self) -> SupportedCodecs;
}

/// Fixed capability set, for injection and tests.
#[derive(Debug, Clone)]
pub struct StaticCapabilities(pub SupportedCodecs);

impl CapabilityProvider for StaticCapabilities {
    fn supported_codecs(&self) -> SupportedCodecs {
        self.0.clone()
    }
}

/// One entry of a platform encoder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    pub name: String,
    pub is_encoder: bool,
    /// Reported by platforms that flag software-only encoders; `None` on older ones.
    pub software_only: Option<bool>,
    pub supported_types: Vec<String>,
}

/// Prefix of the platform's software compatibility encoders on platforms
/// that do not report `software_only`.
const SOFTWARE_SHIM_PREFIX: &str = "c2.android";

fn is_software_encoder(info: &EncoderInfo) -> bool {
    match info.software_only {
        Some(flag) => flag,
        None => info.name.to_lowercase().starts_with(SOFTWARE_SHIM_PREFIX),
    }
}

/// Codecs with at least one hardware encoder in `encoders`.
pub fn codecs_from_encoders(encoders: &[EncoderInfo]) -> SupportedCodecs {
    let found = [VideoCodec::H265, VideoCodec::Av1]
        .into_iter()
        .filter(|codec| {
            encoders.iter().any(|info| {
                info.is_encoder
                    && !is_software_encoder(info)
                    && info
                        .supported_types
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(codec.mime_type()))
            })
        });
    SupportedCodecs::new(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(name: &str, software_only: Option<bool>, types: &[&str]) -> EncoderInfo {
        EncoderInfo {
            name: name.to_string(),
            is_encoder: true,
            software_only,
            supported_types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn codec_table_metadata() {
        assert_eq!(VideoCodec::H265.mime_type(), "video/hevc");
        assert_eq!(VideoCodec::Av1.display_name(), "AV1");
        assert_eq!(VideoCodec::H264.ffmpeg_encoder(), "libx264");
        assert_eq!(VideoCodec::H265.efficiency(), (70, 100));
        assert_eq!(ALL_CODECS.len(), 3);
    }

    #[test]
    fn from_mime_type_is_case_insensitive() {
        assert_eq!(VideoCodec::from_mime_type("VIDEO/AV01"), Some(VideoCodec::Av1));
        assert_eq!(VideoCodec::from_mime_type("video/vp9"), None);
    }

    #[test]
    fn supported_codecs_always_include_h264() {
        let supported = SupportedCodecs::new([VideoCodec::Av1]);
        assert!(supported.contains(VideoCodec::H264));
        assert!(supported.contains(VideoCodec::Av1));
        assert!(!supported.contains(VideoCodec::H265));
    }

    #[test]
    fn gate_falls_back_only_for_h265() {
        let supported = SupportedCodecs::h264_only();
        assert_eq!(supported.gate(VideoCodec::H265), VideoCodec::H264);
        assert_eq!(supported.default_codec(), VideoCodec::H264);

        let with_hevc = SupportedCodecs::new([VideoCodec::H265]);
        assert_eq!(with_hevc.gate(VideoCodec::H265), VideoCodec::H265);
        assert_eq!(with_hevc.default_codec(), VideoCodec::H265);
    }

    #[test]
    fn software_only_encoders_are_ignored() {
        let encoders = vec![
            encoder("c2.exynos.hevc.encoder", Some(false), &["video/hevc"]),
            encoder("c2.android.av1.encoder", Some(true), &["video/av01"]),
        ];
        let supported = codecs_from_encoders(&encoders);
        assert!(supported.contains(VideoCodec::H265));
        assert!(!supported.contains(VideoCodec::Av1));
    }

    #[test]
    fn legacy_platforms_filter_by_name_prefix() {
        let encoders = vec![
            encoder("c2.android.hevc.encoder", None, &["video/hevc"]),
            encoder("OMX.qcom.video.encoder.av1", None, &["video/av01"]),
        ];
        let supported = codecs_from_encoders(&encoders);
        assert!(!supported.contains(VideoCodec::H265));
        assert!(supported.contains(VideoCodec::Av1));
    }

    #[test]
    fn decoders_do_not_count() {
        let mut info = encoder("c2.qti.hevc.decoder", Some(false), &["video/hevc"]);
        info.is_encoder = false;
        let supported = codecs_from_encoders(&[info]);
        assert_eq!(supported, SupportedCodecs::h264_only());
    }
}
