//! Persisted preferences: running total of bytes saved and display toggles.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::AppError;
use crate::format::DisplayPrefs;

pub const KEY_TOTAL_SAVED_BYTES: &str = "total_saved_bytes";
pub const KEY_SHOW_BITRATE: &str = "show_bitrate";
pub const KEY_USE_MBPS: &str = "use_mbps";

/// Key-value store with get/set semantics.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), AppError>;
}

/// Volatile store, for tests and for running without a preferences path.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, Value>>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<serde_json::Map<String, Value>>,
}

impl JsonFilePreferences {
    /// Open `path`, starting empty when it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                _ => {
                    log::warn!(
                        target: "squish_vid::prefs",
                        "Ignoring malformed preferences at {}",
                        path.display()
                    );
                    serde_json::Map::new()
                }
            },
            Err(_) => serde_json::Map::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn persist(&self, values: &serde_json::Map<String, Value>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(values)
            .map_err(|e| AppError::Preferences(format!("serialize: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        let mut guard = self.values.lock();
        guard.insert(key.to_string(), value);
        self.persist(&guard)
    }
}

/// Typed view over the keys the session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    pub total_saved_bytes: u64,
    pub display: DisplayPrefs,
}

impl Preferences {
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let flag = |key| store.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
        Self {
            total_saved_bytes: store
                .get(KEY_TOTAL_SAVED_BYTES)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            display: DisplayPrefs {
                show_bitrate: flag(KEY_SHOW_BITRATE),
                use_mbps: flag(KEY_USE_MBPS),
            },
        }
    }

    /// Write only the keys whose values differ from `previous`.
    pub fn save_changes(&self, previous: &Self, store: &dyn PreferenceStore) -> Result<(), AppError> {
        if self.total_saved_bytes != previous.total_saved_bytes {
            store.set(KEY_TOTAL_SAVED_BYTES, Value::from(self.total_saved_bytes))?;
        }
        if self.display.show_bitrate != previous.display.show_bitrate {
            store.set(KEY_SHOW_BITRATE, Value::from(self.display.show_bitrate))?;
        }
        if self.display.use_mbps != previous.display.use_mbps {
            store.set(KEY_USE_MBPS, Value::from(self.display.use_mbps))?;
        }
        Ok(())
    }
}
