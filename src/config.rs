use std::{fs, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const MIN_STROKE_WIDTH: u32 = 1;
pub const MAX_STROKE_WIDTH: u32 = 15;

const CONFIG_DIR_NAME: &str = "gesture-board";
const CONFIG_FILE_NAME: &str = "config.json";

/// Top-level application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub request_timeout_secs: u64,
    /// Position in the enumerated camera list to start with.
    pub camera_index: Option<usize>,
    /// Show the preview as a mirror image (selfie view).
    pub mirror_camera: bool,
    /// Thumb-to-index distance, in normalized image units, that puts the pen down.
    pub pinch_threshold: f32,
    pub release_threshold: f32,
    pub smoothing: f32,
    pub min_hand_confidence: f32,
    pub default_stroke_width: u32,
    #[serde(skip)]
    file_values: FileValues,
}

/// Values the environment replaced; `save` writes these back instead.
#[derive(Clone, Debug, Default, PartialEq)]
struct FileValues {
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    mirror_camera: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".into(),
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            request_timeout_secs: 60,
            camera_index: None,
            mirror_camera: true,
            pinch_threshold: 0.1,
            release_threshold: 0.12,
            smoothing: 0.5,
            min_hand_confidence: 0.5,
            default_stroke_width: 2,
            file_values: FileValues::default(),
        }
    }
}

impl AppConfig {
    /// Directory: `<config_dir>/gesture-board/`
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push(CONFIG_DIR_NAME);
        p
    }

    pub fn path() -> PathBuf {
        Self::dir().join(CONFIG_FILE_NAME)
    }

    /// Config file, then `.env`, then process environment. Never fails; bad input
    /// falls back to defaults.
    pub fn load() -> Self {
        let path = Self::path();
        let mut config = match fs::read_to_string(&path) {
            Ok(data) => Self::from_json(&data).unwrap_or_else(|err| {
                log::warn!("ignoring invalid config at {}: {err:#}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        match dotenvy::dotenv() {
            Ok(env_path) => log::info!("loaded environment from {}", env_path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("failed to read .env file: {err}"),
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.normalize();
        config
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        let data = self.to_json()?;
        let path = Self::path();
        fs::write(&path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn to_json(&self) -> anyhow::Result<String> {
        let mut stored = self.clone();
        let file_values = std::mem::take(&mut stored.file_values);
        if let Some(key) = file_values.gemini_api_key {
            stored.gemini_api_key = key;
        }
        if let Some(model) = file_values.gemini_model {
            stored.gemini_model = model;
        }
        if let Some(mirror) = file_values.mirror_camera {
            stored.mirror_camera = mirror;
        }
        serde_json::to_string_pretty(&stored).context("failed to serialize config")
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let mut config: Self = serde_json::from_str(data).context("malformed config json")?;
        config.normalize();
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            let key = key.trim().to_string();
            let previous = std::mem::replace(&mut self.gemini_api_key, key);
            self.file_values.gemini_api_key.get_or_insert(previous);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            let model = model.trim();
            if !model.is_empty() {
                let previous = std::mem::replace(&mut self.gemini_model, model.to_string());
                self.file_values.gemini_model.get_or_insert(previous);
            }
        }
        if let Some(raw) = lookup("GESTURE_BOARD_CAMERA") {
            match raw.trim().parse::<usize>() {
                Ok(index) => self.camera_index = Some(index),
                Err(_) => log::warn!("ignoring GESTURE_BOARD_CAMERA={raw:?}: not an index"),
            }
        }
        if let Some(raw) = lookup("GESTURE_BOARD_MIRROR") {
            match parse_flag(&raw) {
                Some(flag) => {
                    let previous = std::mem::replace(&mut self.mirror_camera, flag);
                    self.file_values.mirror_camera.get_or_insert(previous);
                }
                None => log::warn!("ignoring GESTURE_BOARD_MIRROR={raw:?}: expected true/false"),
            }
        }
    }

    fn normalize(&mut self) {
        self.default_stroke_width = self
            .default_stroke_width
            .clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
        self.pinch_threshold = self.pinch_threshold.clamp(0.01, 0.5);
        self.release_threshold = self.release_threshold.max(self.pinch_threshold);
        self.smoothing = self.smoothing.clamp(0.05, 1.0);
        self.min_hand_confidence = self.min_hand_confidence.clamp(0.0, 1.0);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = AppConfig::from_json(r#"{"gemini_model": "gemini-1.5-pro"}"#).unwrap();
        assert_eq!(config.gemini_model, "gemini-1.5-pro");
        assert_eq!(config.pinch_threshold, 0.1);
        assert!(config.mirror_camera);
        assert!(!config.has_api_key());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{not json").is_err());
    }

    #[test]
    fn stroke_width_and_thresholds_are_clamped() {
        let config = AppConfig::from_json(
            r#"{"default_stroke_width": 40, "pinch_threshold": 0.2, "release_threshold": 0.05}"#,
        )
        .unwrap();
        assert_eq!(config.default_stroke_width, MAX_STROKE_WIDTH);
        assert_eq!(config.release_threshold, 0.2);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("GEMINI_API_KEY", "  secret  "),
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("GESTURE_BOARD_CAMERA", "2"),
            ("GESTURE_BOARD_MIRROR", "off"),
        ]));
        assert_eq!(config.gemini_api_key, "secret");
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.camera_index, Some(2));
        assert!(!config.mirror_camera);
        assert!(config.has_api_key());
    }

    #[test]
    fn invalid_environment_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("GEMINI_MODEL", "   "),
            ("GESTURE_BOARD_CAMERA", "front"),
            ("GESTURE_BOARD_MIRROR", "maybe"),
        ]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn environment_key_is_not_saved() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "secret")]));
        let stored = AppConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert!(!stored.has_api_key());
    }

    #[test]
    fn saving_keeps_file_values_the_environment_replaced() {
        let mut config = AppConfig::from_json(
            r#"{"gemini_api_key": "file-key", "gemini_model": "gemini-1.5-pro", "mirror_camera": true}"#,
        )
        .unwrap();
        config.apply_env(env(&[
            ("GEMINI_API_KEY", "env-key"),
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("GESTURE_BOARD_MIRROR", "off"),
        ]));
        assert_eq!(config.gemini_api_key, "env-key");

        config.camera_index = Some(3);
        let stored = AppConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(stored.gemini_api_key, "file-key");
        assert_eq!(stored.gemini_model, "gemini-1.5-pro");
        assert!(stored.mirror_camera);
        assert_eq!(stored.camera_index, Some(3));

        // Saving twice must not leak the environment values either.
        let again = AppConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, stored);
    }

    #[test]
    fn config_survives_json_round_trip() {
        let mut config = AppConfig::default();
        config.camera_index = Some(1);
        config.gemini_api_key = "from-file".into();
        assert_eq!(AppConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }
}
