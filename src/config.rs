//! Persistent settings, stored as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyzer::{SecurityRules, Severity, SizeOptions};
use crate::report::AnalyzeOptions;

/// Looked up in the working directory before the per-user file.
pub const LOCAL_CONFIG_FILE: &str = "shuck.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_output_format: OutputFormat,
    pub verbose: bool,
    pub security: SecurityConfig,
    pub size: SizeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,

    /// Findings below this are dropped
    pub min_severity: Severity,

    /// Extra path substrings, reported at MEDIUM
    pub sensitive_patterns: Vec<String>,

    /// Extra case-insensitive line regexes, reported at HIGH
    pub secret_patterns: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: Severity::Low,
            sensitive_patterns: Vec::new(),
            secret_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeConfig {
    pub enabled: bool,

    /// 0 keeps every file
    pub top_files_count: usize,

    /// 0 keeps every directory
    pub top_dirs_count: usize,
}

impl Default for SizeConfig {
    fn default() -> Self {
        let opts = SizeOptions::default();
        Self {
            enabled: true,
            top_files_count: opts.top_files,
            top_dirs_count: opts.top_dirs,
        }
    }
}

/// `~/.config/shuck/config.json`
pub fn user_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/shuck/config.json")
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Defaults, overlaid with the file at `path` when given. Fields the
    /// file omits keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Write pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// `./shuck.json` if present, else the per-user file if present.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        home_dir()
            .map(|home| user_config_path(&home))
            .filter(|p| p.is_file())
    }

    /// Built-in tables, extended with any custom patterns.
    pub fn security_rules(&self) -> Result<Arc<SecurityRules>> {
        let sec = &self.security;
        if sec.sensitive_patterns.is_empty() && sec.secret_patterns.is_empty() {
            return Ok(SecurityRules::builtin());
        }
        let rules = SecurityRules::with_extensions(&sec.sensitive_patterns, &sec.secret_patterns)
            .context("Invalid security pattern in config")?;
        Ok(Arc::new(rules))
    }

    pub fn size_options(&self) -> SizeOptions {
        SizeOptions {
            top_files: self.size.top_files_count,
            top_dirs: self.size.top_dirs_count,
        }
    }

    pub fn analyze_options(&self) -> Result<AnalyzeOptions> {
        Ok(AnalyzeOptions {
            verbose: self.verbose,
            size_enabled: self.size.enabled,
            size: self.size_options(),
            security_enabled: self.security.enabled,
            min_severity: self.security.min_severity,
            rules: self.security_rules()?,
        })
    }
}
