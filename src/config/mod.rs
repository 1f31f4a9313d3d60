//! Configuration management for eink-lens
//!
//! Settings live in one TOML file. The file is read once at startup and
//! rewritten whenever a persisted value (threshold, ratio, width, mode)
//! changes at runtime.

pub mod settings;

pub use settings::{DisplayMode, KeyBindings, MagnetPreset, MagnetSettings, Settings};

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Where runtime changes get written
pub trait Persistence: Send + Sync {
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// TOML file backing the settings
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `$XDG_CONFIG_HOME/eink-lens/config.toml`, or `./eink-lens/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on any problem.
    /// A missing file is created with the defaults.
    pub fn load(&self) -> Settings {
        let mut settings = match fs::read_to_string(&self.path) {
            Ok(contents) => match toml::from_str::<Settings>(&contents) {
                Ok(settings) => {
                    info!(path = %self.path.display(), "Loaded config");
                    settings
                }
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Failed to parse config file, using defaults");
                    Settings::default()
                }
            },
            Err(_) => {
                info!(path = %self.path.display(), "Config file not found, creating default config");
                let settings = Settings::default();
                if let Err(e) = self.save(&settings) {
                    error!(error = ?e, "Failed to write default config");
                }
                settings
            }
        };
        settings.validate_and_clamp();
        settings
    }
}

impl Persistence for ConfigFile {
    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        let contents = toml::to_string_pretty(settings).context("Failed to serialize config to TOML")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write config to {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::geometry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_config_path(name: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("eink-lens-test-{}-{}-{}", std::process::id(), name, n))
            .join("config.toml")
    }

    #[test]
    fn test_load_missing_file_writes_defaults() {
        let path = temp_config_path("missing");
        let file = ConfigFile::new(path.clone());

        let settings = file.load();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let path = temp_config_path("roundtrip");
        let file = ConfigFile::new(path.clone());

        let mut settings = Settings::default();
        settings.threshold = 140;
        settings.ratio = 1.5;
        settings.half_width = 250;
        settings.mode = DisplayMode::Text;
        settings.keys.press.insert("f10".to_string(), "get_size".to_string());
        file.save(&settings).unwrap();

        assert_eq!(file.load(), settings);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_config_path("partial");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "threshold = 120\n\n[magnet]\nradius = 150\n").unwrap();

        let settings = ConfigFile::new(path.clone()).load();
        assert_eq!(settings.threshold, 120);
        assert_eq!(settings.magnet.radius, 150);
        assert_eq!(settings.magnet.dead_zone, 30);
        assert_eq!(settings.magnet.presets.len(), 3);
        assert_eq!(settings.keys.press.get("5").map(String::as_str), Some("refresh"));
        assert_eq!(settings.ratio, geometry::DEFAULT_RATIO);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let path = temp_config_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "threshold = \"very high\"").unwrap();

        assert_eq!(ConfigFile::new(path.clone()).load(), Settings::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_validate_and_clamp() {
        let mut settings = Settings::default();
        settings.ratio = 9.0;
        settings.half_width = -5;
        settings.magnet.force_strength = 3.0;
        settings.magnet.radius = 0;
        settings.magnet.dead_zone = -1;
        settings.magnet.tick_ms = 0;

        settings.validate_and_clamp();
        assert_eq!(settings.ratio, geometry::MAX_RATIO);
        assert_eq!(settings.half_width, geometry::DEFAULT_HALF_WIDTH);
        assert_eq!(settings.magnet.force_strength, 1.0);
        assert_eq!(settings.magnet.radius, 200);
        assert_eq!(settings.magnet.dead_zone, 0);
        assert_eq!(settings.magnet.tick_ms, 8);
    }

    #[test]
    fn test_preset_defaults() {
        let settings = Settings::default();
        let thomas = &settings.magnet.presets["thomas"];
        assert_eq!(thomas.positions, vec![2106, 2204]);
        assert_eq!(thomas.frame_size, [808, 505]);
    }
}
