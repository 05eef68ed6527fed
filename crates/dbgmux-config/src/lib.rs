//! Configuration for dbgmux
//!
//! TOML configuration with defaults for every field, so an absent or partial
//! config file always yields a usable [`Config`]. The path is resolved from
//! `DBGMUX_CONFIG` or falls back to `~/.config/dbgmux/config.toml`.
//!
//! Breakpoint setup persistence (saving the user's breakpoint list across
//! sessions) lives in [`breakpoints`].

pub mod breakpoints;
mod loader;

pub use breakpoints::{load_breakpoint_setup, save_breakpoint_setup, SavedBreakpoint};
pub use loader::{config_path, load, load_from, save_to};

use serde::{Deserialize, Serialize};

/// Settings for the MI line-protocol backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiConfig {
    /// Debugger executable. The MI interpreter flags are appended by the
    /// adapter.
    pub command: String,
}

impl Default for MiConfig {
    fn default() -> Self {
        Self {
            command: "gdb".to_string(),
        }
    }
}

/// Settings for the binary VM backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JdwpConfig {
    /// Port the VM's debug wire connection arrives on.
    pub port: u16,
    /// Seconds to wait after a VM-death event before declaring the program
    /// finished (the VM may still flush output).
    pub death_grace_secs: u64,
    /// Seconds between thread-group parent-discovery sweeps.
    pub group_cull_secs: u64,
}

impl Default for JdwpConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            death_grace_secs: 1,
            group_cull_secs: 10,
        }
    }
}

/// Settings for the XML scripting-language backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XdebugConfig {
    /// Port the script engine's debug connection arrives on.
    pub port: u16,
}

impl Default for XdebugConfig {
    fn default() -> Self {
        Self { port: 9000 }
    }
}

/// Stack display heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Function-name fragments that mark assert/abort handler frames. When
    /// the innermost frames match, the caller of the deepest match is
    /// auto-selected instead of frame 0.
    pub assert_patterns: Vec<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            assert_patterns: vec![
                "__assert".to_string(),
                "abort".to_string(),
                "JAssert".to_string(),
            ],
        }
    }
}

/// Backend restart policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Respawn the backend connection automatically after a crash.
    pub auto_restart: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self { auto_restart: true }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mi: MiConfig,
    pub jdwp: JdwpConfig,
    pub xdebug: XdebugConfig,
    pub stack: StackConfig,
    pub restart: RestartConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mi.command, "gdb");
        assert_eq!(config.jdwp.port, 8000);
        assert_eq!(config.xdebug.port, 9000);
        assert!(config.restart.auto_restart);
        assert!(!config.stack.assert_patterns.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[mi]\ncommand = \"lldb-mi\"\n").unwrap();
        assert_eq!(config.mi.command, "lldb-mi");
        assert_eq!(config.jdwp.port, 8000);
    }

    #[test]
    fn test_round_trip() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
