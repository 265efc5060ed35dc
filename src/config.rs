//! Persistent configuration handling for snip-ocr.
//!
//! Persists configuration in a JSON file:
//! `~/.config/snip-ocr/config.json`.
//!
//! Every key is optional; missing keys fall back to defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSettings, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
use crate::paths;
use crate::system::{default_snip_command, LanguagePreferences};

const APP_CONFIG_DIR_NAME: &str = "snip-ocr";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_TESSERACT_CMD: &str = "tesseract";
/// Polling faster than this only burns CPU on clipboard reads.
const MIN_POLL_INTERVAL_MS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Self::Error),
            "WARN" | "WARNING" => Some(Self::Warn),
            "INFO" => Some(Self::Info),
            "DEBUG" => Some(Self::Debug),
            "TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Directive string for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tesseract_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tessdata_dir: Option<PathBuf>,
    /// OCR language models, richest first (e.g. `["eng+pol", "eng"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Snip helper argv, e.g. `["explorer", "ms-screenclip:"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snip_command: Option<Vec<String>>,
}

impl Config {
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(LogLevel::from_str)
            .unwrap_or_default()
    }

    pub fn tesseract_cmd(&self) -> PathBuf {
        self.tesseract_cmd
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TESSERACT_CMD)
            .into()
    }

    pub fn tessdata_dir(&self) -> PathBuf {
        paths::get_tessdata_dir(self.tessdata_dir.as_deref(), &self.tesseract_cmd())
    }

    pub fn languages(&self) -> LanguagePreferences {
        match self.languages.as_ref() {
            Some(langs) => LanguagePreferences::new(langs).unwrap_or_else(|e| {
                warn!(error = %e, "Invalid OCR languages in config, using defaults");
                LanguagePreferences::default()
            }),
            None => LanguagePreferences::default(),
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let poll_interval = self
            .poll_interval_ms
            .map(|ms| Duration::from_millis(ms.max(MIN_POLL_INTERVAL_MS)))
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let timeout = self
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        CaptureSettings {
            poll_interval,
            timeout,
        }
    }

    pub fn snip_command(&self) -> Vec<String> {
        self.snip_command
            .clone()
            .filter(|argv| !argv.is_empty())
            .unwrap_or_else(default_snip_command)
    }

    /// The config with every default filled in, for display.
    pub fn effective(&self) -> Self {
        let languages = self.languages();
        Self {
            log_level: Some(self.log_level().as_str().to_string()),
            tesseract_cmd: Some(self.tesseract_cmd().display().to_string()),
            tessdata_dir: Some(self.tessdata_dir()),
            languages: Some(vec![
                languages.richest().to_string(),
                languages.fallback().to_string(),
            ]),
            poll_interval_ms: Some(
                u64::try_from(self.capture_settings().poll_interval.as_millis())
                    .unwrap_or(u64::MAX),
            ),
            timeout_secs: Some(self.capture_settings().timeout.as_secs()),
            snip_command: Some(self.snip_command()),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    let path = config_dir()?
        .join(APP_CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME);
    Some(path)
}

fn ensure_config_dir_exists(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        debug!(?path, "Config file does not exist, using defaults");
        return Ok(Config::default());
    }
    let data = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&data)?;
    debug!(?path, "Config loaded");
    Ok(cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    ensure_config_dir_exists(path)?;
    let data = serde_json::to_string_pretty(cfg)?;
    fs::write(path, data)?;
    debug!(?path, "Config saved");
    Ok(())
}

/// Loads the config file, or defaults if it is missing or unreadable.
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        debug!("No config_dir available, using defaults only");
        return Config::default();
    };
    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(error = ?err, "Failed to load existing config, using defaults");
            Config::default()
        }
    }
}

/// Writes a fully populated default config at `path` unless one already exists.
/// Returns whether a file was written.
pub fn init_config_at(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        debug!(?path, "Config file already exists, leaving it untouched");
        return Ok(false);
    }
    save_config_to(path, &Config::default().effective())?;
    info!(?path, "Wrote default config");
    Ok(true)
}

pub fn init_config() -> Result<(PathBuf, bool), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    let written = init_config_at(&path)?;
    Ok((path, written))
}
