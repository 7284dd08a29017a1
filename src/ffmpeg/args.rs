use crate::codec::VideoCodec;
use crate::transcode::TranscodeRequest;

use super::path_to_string;

/// FFmpeg argument list for `request`, encoding video with `encoder`.
pub fn build_transcode_args(request: &TranscodeRequest, encoder: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        path_to_string(&request.source),
        "-c:v".to_string(),
        encoder.to_string(),
        "-b:v".to_string(),
        request.video_bitrate_bps.to_string(),
    ];

    let mut filters = Vec::new();
    if let Some((width, height)) = request.resolution {
        filters.push(format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            width, height
        ));
    }
    if let Some(change) = request.frame_rate {
        filters.push(format!("fps={}", change.to));
    }
    if !filters.is_empty() {
        args.extend(["-vf".to_string(), filters.join(",")]);
    }

    if request.remove_audio {
        args.push("-an".to_string());
    } else {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            request.audio_bitrate_bps.to_string(),
        ]);
        if (request.volume - 1.0).abs() > f32::EPSILON {
            args.extend(["-af".to_string(), format!("volume={:.2}", request.volume)]);
        }
    }

    args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
    match request.video_codec {
        VideoCodec::H265 => args.extend(["-tag:v".to_string(), "hvc1".to_string()]),
        VideoCodec::Av1 => args.extend(["-tag:v".to_string(), "av01".to_string()]),
        VideoCodec::H264 => {}
    }
    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args.push(path_to_string(&request.output));
    args
}

/// Formats args for readable display: option and value on the same line when the next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let line = if arg.starts_with('-') && i + 1 < args.len() && !args[i + 1].starts_with('-') {
            let value = &args[i + 1];
            i += 2;
            format!("  {} {}", arg, value)
        } else {
            i += 1;
            format!("  {}", arg)
        };
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::transcode::FrameRateChange;

    fn request() -> TranscodeRequest {
        TranscodeRequest {
            source: PathBuf::from("/in.mp4"),
            output: PathBuf::from("/out.mp4"),
            video_codec: VideoCodec::H264,
            video_bitrate_bps: 1_500_000,
            audio_bitrate_bps: 128_000,
            resolution: None,
            frame_rate: None,
            remove_audio: false,
            volume: 1.0,
            duration_ms: 10_000,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let idx = args.iter().position(|a| a == flag)?;
        args.get(idx + 1).map(String::as_str)
    }

    #[test]
    fn defaults_copy_nothing_extra() {
        let args = build_transcode_args(&request(), "libx264");
        assert_eq!(value_after(&args, "-i"), Some("/in.mp4"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-b:v"), Some("1500000"));
        assert_eq!(value_after(&args, "-b:a"), Some("128000"));
        assert_eq!(value_after(&args, "-progress"), Some("pipe:1"));
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-af".to_string()));
        assert!(!args.contains(&"-tag:v".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/out.mp4"));
    }

    #[test]
    fn scale_and_fps_share_one_filter_chain() {
        let mut req = request();
        req.resolution = Some((1280, 720));
        req.frame_rate = Some(FrameRateChange { from: 60.0, to: 30 });
        let args = build_transcode_args(&req, "libx264");
        assert_eq!(
            value_after(&args, "-vf"),
            Some("scale=1280:720:force_original_aspect_ratio=decrease,fps=30")
        );
    }

    #[test]
    fn removed_audio_drops_audio_options() {
        let mut req = request();
        req.remove_audio = true;
        req.volume = 2.0;
        let args = build_transcode_args(&req, "libx264");
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-b:a".to_string()));
        assert!(!args.contains(&"-af".to_string()));
    }

    #[test]
    fn volume_filter_when_not_unity() {
        let mut req = request();
        req.volume = 0.5;
        let args = build_transcode_args(&req, "libx264");
        assert_eq!(value_after(&args, "-af"), Some("volume=0.50"));
    }

    #[test]
    fn hevc_and_av1_tags() {
        let mut req = request();
        req.video_codec = VideoCodec::H265;
        assert_eq!(value_after(&build_transcode_args(&req, "libx265"), "-tag:v"), Some("hvc1"));
        req.video_codec = VideoCodec::Av1;
        assert_eq!(value_after(&build_transcode_args(&req, "libsvtav1"), "-tag:v"), Some("av01"));
    }

    #[test]
    fn display_pairs_flags_with_values() {
        let args: Vec<String> = ["-i", "/in.mp4", "-an", "/out.mp4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            format_args_for_display_multiline(&args),
            "  -i /in.mp4\n  -an /out.mp4"
        );
    }
}
