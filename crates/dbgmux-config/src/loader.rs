//! Config file loading and saving

use crate::Config;
use dbgmux_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_ENV: &str = "DBGMUX_CONFIG";

/// Resolve the config file path: `DBGMUX_CONFIG` wins, otherwise
/// `~/.config/dbgmux/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("dbgmux").join("config.toml")
}

/// Load the configuration from the default path. A missing file yields
/// defaults; a malformed file is reported, not papered over.
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load the configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
    let config = toml::from_str(&text)
        .map_err(|e| Error::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))?;
    Ok(config)
}

/// Write the configuration to an explicit path, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    let text = toml::to_string_pretty(config)
        .map_err(|e| Error::InvalidConfig(format!("cannot serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), error = %e, "cannot create config directory");
        }
    }
    std::fs::write(path, text)
        .map_err(|e| Error::InvalidConfig(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mi\ncommand=").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = Config::default();
        config.mi.command = "rust-gdb".to_string();
        config.xdebug.port = 9003;

        save_to(&config, &path).unwrap();
        let back = load_from(&path).unwrap();
        assert_eq!(back, config);
    }
}
