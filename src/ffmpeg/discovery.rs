//! Locating the `ffmpeg` and `ffprobe` binaries.
//!
//! Lookup order: `FFMPEG_PATH`, then well-known install locations, then the
//! system `PATH`. The first hit is cached for the life of the process.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::AppError;

pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";

#[cfg(target_os = "windows")]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(target_os = "windows"))]
const EXE_SUFFIX: &str = "";

const INSTALL_HINT: &str = "FFmpeg is required to compress videos. Install it and make sure `ffmpeg` is on PATH, or point FFMPEG_PATH at the binary.";

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Where a located binary came from; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Env,
    InstallDir,
    SearchPath,
}

fn install_locations() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/opt/local/bin/ffmpeg",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/snap/bin/ffmpeg"]
    }
}

fn search_path() -> Option<PathBuf> {
    let which = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = Command::new(which).arg("ffmpeg").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Applies the lookup order to the given sources. `search` is only consulted
/// when nothing earlier exists on disk.
fn locate(
    env_override: Option<PathBuf>,
    install_dirs: &[PathBuf],
    search: impl FnOnce() -> Option<PathBuf>,
) -> Option<(PathBuf, Origin)> {
    if let Some(path) = env_override.filter(|p| p.exists()) {
        return Some((path, Origin::Env));
    }
    if let Some(path) = install_dirs.iter().find(|p| p.exists()) {
        return Some((path.clone(), Origin::InstallDir));
    }
    search()
        .filter(|p| p.exists())
        .map(|p| (p, Origin::SearchPath))
}

/// Path to `ffmpeg`, resolved once per process.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let env_override = std::env::var_os(ENV_FFMPEG_PATH).map(PathBuf::from);
    let install_dirs: Vec<PathBuf> = install_locations().iter().map(PathBuf::from).collect();

    let Some((path, origin)) = locate(env_override, &install_dirs, search_path) else {
        log::error!(target: "squish_vid::ffmpeg::discovery", "FFmpeg not found");
        return Err(AppError::FfmpegNotFound(INSTALL_HINT.to_string()));
    };
    log::debug!(
        target: "squish_vid::ffmpeg::discovery",
        "Using FFmpeg at {} ({:?})",
        path.display(),
        origin
    );
    Ok(FFMPEG_PATH_CACHE.get_or_init(|| path).as_path())
}

/// `ffprobe` candidates next to `ffmpeg_path`: a version-suffixed sibling
/// (`ffmpeg-7.1` -> `ffprobe-7.1`) first, then the plain name.
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(dir) = ffmpeg_path.parent() else {
        return Vec::new();
    };
    let suffix = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("ffmpeg"))
        .filter(|s| !s.is_empty());

    let mut candidates = Vec::with_capacity(2);
    if let Some(suffix) = suffix {
        candidates.push(dir.join(format!("ffprobe{}{}", suffix, EXE_SUFFIX)));
    }
    candidates.push(dir.join(format!("ffprobe{}", EXE_SUFFIX)));
    candidates
}

pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    ffprobe_candidates(ffmpeg)
        .into_iter()
        .find(|c| c.exists())
        .ok_or_else(|| {
            AppError::FfmpegNotFound(format!("ffprobe not found next to {}", ffmpeg.display()))
        })
}
