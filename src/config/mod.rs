//! Configuration file management
//!
//! Loads TOML configuration files and provides terminal settings.
//! Default config path: ~/.config/vtcon/config.toml

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Terminal settings
    pub terminal: TerminalConfig,
    /// Display settings
    pub display: DisplayConfig,
}

/// Terminal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Initial rows
    pub rows: usize,
    /// Initial columns
    pub cols: usize,
    /// TERM environment variable for the child
    pub term: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Cell width in pixels (used for 80/132 column width reports)
    pub cell_width: u32,
    /// Cell height in pixels
    pub cell_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cell_width: 12,
            cell_height: 24,
        }
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vtcon").join("config.toml"))
}

impl Config {
    /// Load the default config file, falling back to defaults when it is
    /// missing or malformed.
    pub fn load() -> Config {
        let Some(path) = default_config_path() else {
            return Config::default();
        };
        match Self::load_from(&path) {
            Ok(config) => {
                info!("config loaded: {}", path.display());
                config
            }
            Err(e) => {
                debug!("using default config: {:#}", e);
                Config::default()
            }
        }
    }

    /// Load and parse a specific config file
    pub fn load_from(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let config = Config::default();
        assert_eq!(config.terminal.rows, 24);
        assert_eq!(config.terminal.cols, 80);
        assert_eq!(config.terminal.term, "xterm-256color");
        assert_eq!(config.display.cell_width, 12);
    }

    #[test]
    fn parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [terminal]
            rows = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.terminal.rows, 50);
        // unspecified fields keep their defaults
        assert_eq!(config.terminal.cols, 80);
        assert_eq!(config.display.cell_height, 24);
    }

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [terminal]
            rows = 30
            cols = 100
            term = "vt100"

            [display]
            cell_width = 10
            cell_height = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.terminal.cols, 100);
        assert_eq!(config.terminal.term, "vt100");
        assert_eq!(config.display.cell_width, 10);
    }
}
