use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stems_transport::TransportConfig;

/// User settings, stored as TOML under the platform config directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where relative stem paths are looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stems_root: Option<PathBuf>,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stems").join("config.toml"))
    }

    /// Load the user config. A missing or unreadable file gives the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not save config");
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml"));
        assert_eq!(config, Config::default());
        assert_eq!(config.transport.drift_period_ms, 200);
    }

    #[test]
    fn test_partial_transport_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "stems_root = \"/music/stems\"\n\n[transport]\ndrift_threshold_ms = 80\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.stems_root, Some(PathBuf::from("/music/stems")));
        assert_eq!(config.transport.drift_threshold_ms, 80);
        assert_eq!(config.transport.realign_tolerance_ms, 10);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "transport = 12").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.stems_root = Some(PathBuf::from("/srv/stems"));
        config.transport.finish_settle_ms = 120;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }
}
