//! Encoder listing from `ffmpeg -encoders`, as a capability provider.

use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use super::discovery::get_ffmpeg_path;
use crate::codec::{
    CapabilityProvider, EncoderInfo, SupportedCodecs, VideoCodec, codecs_from_encoders,
};
use crate::error::AppError;

/// Video encoder line: flags, name, description ending in `(codec <name>)`.
static ENCODER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*V[A-Z.]{5}\s+(\S+)\s+.*\(codec (\w+)\)").expect("invalid encoder regex")
});

/// Name suffixes of hardware-backed encoders.
const HARDWARE_SUFFIXES: &[&str] = &[
    "_videotoolbox",
    "_nvenc",
    "_qsv",
    "_vaapi",
    "_amf",
    "_mediacodec",
    "_v4l2m2m",
];

pub fn is_hardware_encoder(name: &str) -> bool {
    HARDWARE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn codec_for_ffmpeg_name(name: &str) -> Option<VideoCodec> {
    match name {
        "h264" => Some(VideoCodec::H264),
        "hevc" => Some(VideoCodec::H265),
        "av1" => Some(VideoCodec::Av1),
        _ => None,
    }
}

/// Parsed `ffmpeg -encoders` output.
#[derive(Debug, Clone, Default)]
pub struct EncoderListing {
    encoders: Vec<(VideoCodec, String)>,
}

impl EncoderListing {
    pub fn parse(output: &str) -> Self {
        let encoders = output
            .lines()
            .filter_map(|line| ENCODER_LINE_RE.captures(line))
            .filter_map(|caps| {
                let codec = codec_for_ffmpeg_name(&caps[2])?;
                Some((codec, caps[1].to_string()))
            })
            .collect();
        Self { encoders }
    }

    /// Run `ffmpeg -hide_banner -encoders`.
    pub fn detect() -> Result<Self, AppError> {
        let ffmpeg = get_ffmpeg_path()?;
        let output = Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()?;
        if !output.status.success() {
            return Err(AppError::ffmpeg_failed(
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Entries in the shape the codec gate filters. With `hardware_only`,
    /// software encoders are flagged so the gate skips them.
    pub fn encoder_infos(&self, hardware_only: bool) -> Vec<EncoderInfo> {
        self.encoders
            .iter()
            .map(|(codec, name)| EncoderInfo {
                name: name.clone(),
                is_encoder: true,
                software_only: Some(hardware_only && !is_hardware_encoder(name)),
                supported_types: vec![codec.mime_type().to_string()],
            })
            .collect()
    }

    pub fn supported_codecs(&self, hardware_only: bool) -> SupportedCodecs {
        codecs_from_encoders(&self.encoder_infos(hardware_only))
    }

    /// Encoder to use for `codec`: a hardware encoder when `hardware_only`
    /// and one is listed, else the codec's software encoder if listed.
    pub fn encoder_for(&self, codec: VideoCodec, hardware_only: bool) -> Option<&str> {
        let mut candidates = self
            .encoders
            .iter()
            .filter(|(c, _)| *c == codec)
            .map(|(_, name)| name.as_str());
        if hardware_only {
            candidates.find(|name| is_hardware_encoder(name))
        } else {
            candidates.find(|name| *name == codec.ffmpeg_encoder())
        }
    }
}

/// Capability provider backed by the local FFmpeg build.
#[derive(Debug, Clone)]
pub struct FfmpegCapabilities {
    listing: EncoderListing,
    hardware_only: bool,
}

impl FfmpegCapabilities {
    pub fn new(listing: EncoderListing, hardware_only: bool) -> Self {
        Self {
            listing,
            hardware_only,
        }
    }

    /// Query FFmpeg; an unusable FFmpeg leaves only H.264.
    pub fn detect(hardware_only: bool) -> Self {
        let listing = EncoderListing::detect().unwrap_or_else(|err| {
            log::warn!(
                target: "squish_vid::ffmpeg::encoders",
                "Encoder listing unavailable: {}",
                err
            );
            EncoderListing::default()
        });
        Self::new(listing, hardware_only)
    }

    pub fn listing(&self) -> &EncoderListing {
        &self.listing
    }

    pub fn hardware_only(&self) -> bool {
        self.hardware_only
    }
}

impl CapabilityProvider for FfmpegCapabilities {
    fn supported_codecs(&self) -> SupportedCodecs {
        let supported = self.listing.supported_codecs(self.hardware_only);
        log::debug!(
            target: "squish_vid::ffmpeg::encoders",
            "Supported codecs (hardware_only={}): {:?}",
            self.hardware_only,
            supported
        );
        supported
    }
}
