//! Sidecar runtime settings, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::DEFAULT_POLL_INTERVAL;

pub const ENV_PREFS_PATH: &str = "SQUISH_VID_PREFS_PATH";
pub const ENV_OUTPUT_DIR: &str = "SQUISH_VID_OUTPUT_DIR";
pub const ENV_POLL_MS: &str = "SQUISH_VID_POLL_MS";
pub const ENV_HARDWARE_ONLY: &str = "SQUISH_VID_HARDWARE_ONLY";

const APP_DIR: &str = "squish-vid";

#[derive(Debug, Clone, PartialEq)]
pub struct SidecarSettings {
    pub prefs_path: PathBuf,
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    /// Gate codecs on hardware encoders only.
    pub hardware_only: bool,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn data_dir() -> PathBuf {
    if let Some(dir) = env_path("XDG_DATA_HOME") {
        return dir.join(APP_DIR);
    }
    if let Some(home) = env_path("HOME") {
        return home.join(".local").join("share").join(APP_DIR);
    }
    std::env::temp_dir().join(APP_DIR)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl SidecarSettings {
    pub fn from_env() -> Self {
        let prefs_path = env_path(ENV_PREFS_PATH).unwrap_or_else(|| data_dir().join("prefs.json"));
        let output_dir = env_path(ENV_OUTPUT_DIR)
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR).join("compressed_videos"));
        let poll_interval = match std::env::var(ENV_POLL_MS) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    log::warn!(
                        target: "squish_vid::settings",
                        "Ignoring invalid {}={:?}",
                        ENV_POLL_MS,
                        raw
                    );
                    DEFAULT_POLL_INTERVAL
                }
            },
            Err(_) => DEFAULT_POLL_INTERVAL,
        };
        let hardware_only = std::env::var(ENV_HARDWARE_ONLY)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Self {
            prefs_path,
            output_dir,
            poll_interval,
            hardware_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct RestoreEnv {
        saved: Vec<(&'static str, Option<std::ffi::OsString>)>,
    }

    impl RestoreEnv {
        fn capture(keys: &[&'static str]) -> Self {
            let saved = keys.iter().map(|k| (*k, env::var_os(k))).collect();
            Self { saved }
        }
    }

    impl Drop for RestoreEnv {
        fn drop(&mut self) {
            for (key, previous) in &self.saved {
                match previous {
                    Some(v) => unsafe { env::set_var(key, v) },
                    None => unsafe { env::remove_var(key) },
                }
            }
        }
    }

    const KEYS: &[&str] = &[
        ENV_PREFS_PATH,
        ENV_OUTPUT_DIR,
        ENV_POLL_MS,
        ENV_HARDWARE_ONLY,
        "XDG_DATA_HOME",
    ];

    #[test]
    #[serial]
    fn explicit_overrides() {
        let _guard = RestoreEnv::capture(KEYS);
        unsafe {
            env::set_var(ENV_PREFS_PATH, "/tmp/sv/prefs.json");
            env::set_var(ENV_OUTPUT_DIR, "/tmp/sv/out");
            env::set_var(ENV_POLL_MS, "50");
            env::set_var(ENV_HARDWARE_ONLY, "true");
        }
        let settings = SidecarSettings::from_env();
        assert_eq!(settings.prefs_path, PathBuf::from("/tmp/sv/prefs.json"));
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/sv/out"));
        assert_eq!(settings.poll_interval, Duration::from_millis(50));
        assert!(settings.hardware_only);
    }

    #[test]
    #[serial]
    fn defaults_follow_xdg_data_home() {
        let _guard = RestoreEnv::capture(KEYS);
        unsafe {
            for key in KEYS {
                env::remove_var(key);
            }
            env::set_var("XDG_DATA_HOME", "/tmp/xdg");
        }
        let settings = SidecarSettings::from_env();
        assert_eq!(
            settings.prefs_path,
            PathBuf::from("/tmp/xdg/squish-vid/prefs.json")
        );
        assert!(settings.output_dir.ends_with("squish-vid/compressed_videos"));
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(!settings.hardware_only);
    }

    #[test]
    #[serial]
    fn invalid_poll_interval_falls_back() {
        let _guard = RestoreEnv::capture(KEYS);
        unsafe { env::set_var(ENV_POLL_MS, "soon") };
        assert_eq!(SidecarSettings::from_env().poll_interval, DEFAULT_POLL_INTERVAL);
        unsafe { env::set_var(ENV_POLL_MS, "0") };
        assert_eq!(SidecarSettings::from_env().poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
