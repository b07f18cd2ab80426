//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from `~/.config/fleetmon/config.json`
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Flag (or env) wins, then the config file, then the default
    pub fn resolve_api_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Configured default format, table when unset or unrecognised
    pub fn format(&self) -> OutputFormat {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or_default()
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("fleetmon").join("config.json"))
    }
}
