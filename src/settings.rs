//! Game settings and tuning
//!
//! Persisted as a JSON file next to the binary. Missing or unreadable files
//! fall back to defaults, and missing fields take their default values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::input::KeyBindings;
use crate::net::SyncConfig;
use crate::sim::{AiTuning, GameConfig};

/// Default settings file name
pub const SETTINGS_FILE: &str = "pong_settings.json";

/// Game settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Court and scoring
    pub game: GameConfig,
    /// Snapshot publishing and interpolation
    pub sync: SyncConfig,
    /// AI opponent
    pub ai: AiTuning,
    /// Local keyboard controls
    pub keys: KeyBindings,
    /// Countdown before a match starts (seconds)
    pub countdown_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            sync: SyncConfig::default(),
            ai: AiTuning::default(),
            keys: KeyBindings::default(),
            countdown_secs: 3,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load settings from `path`, or defaults if that fails
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    return settings;
                }
                Err(err) => log::warn!("Ignoring malformed settings {}: {}", path.display(), err),
            },
            Err(err) => log::debug!("No settings at {}: {}", path.display(), err),
        }
        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            Settings::from_json(r#"{"game": {"winningScore": 3}, "sync": {"lerpFactor": 0.5}, "countdown_secs": 0}"#)
                .unwrap();
        assert_eq!(settings.game.winning_score, 3);
        assert_eq!(settings.game.canvas_width, 800.0);
        assert_eq!(settings.sync.lerp_factor, 0.5);
        assert_eq!(settings.sync.publish_interval_ms, 50);
        assert_eq!(settings.ai, AiTuning::default());
        assert_eq!(settings.keys, KeyBindings::default());
        assert_eq!(settings.countdown_secs, 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("pong_settings_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.game.winning_score = 7;
        settings.ai.aim_error = 10.0;
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        assert_eq!(Settings::load("/definitely/not/here.json"), Settings::default());
    }
}
