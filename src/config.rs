//! TOML configuration.
//!
//! Every section and field is optional; an empty file yields the defaults.
//! Unknown keys are rejected so that typos do not silently fall back to a
//! default.
//!
//! ```toml
//! [monitor]
//! emit_initial = true     # report the cursor visible at start
//! queue_capacity = 0      # undelivered events; 0 = unbounded
//!
//! [platform]
//! query_interval_ms = 50
//! x11_display = ":0"      # Linux only; defaults to $DISPLAY
//!
//! [output]
//! format = "json"         # "text" | "json"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::PlatformOptions;

/// Upper bound for `platform.query_interval_ms`.
const MAX_QUERY_INTERVAL_MS: u64 = 10_000;

/// Upper bound for `monitor.queue_capacity`.
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub platform: PlatformOptions,
    pub output: OutputConfig,
}

/// Behaviour of the monitor between the native tap and the host callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Deliver the cursor visible at `start()`. When false, the first
    /// observation only sets the baseline for change detection.
    pub emit_initial: bool,
    /// Maximum number of undelivered events; 0 means unbounded. When the
    /// queue is full, new events are dropped with a warning.
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            emit_initial: true,
            queue_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Line format of the `cursor-monitor` binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `previous -> current`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.platform.query_interval_ms;
        if !(1..=MAX_QUERY_INTERVAL_MS).contains(&interval) {
            return Err(ConfigError::Invalid(format!(
                "platform.query_interval_ms must be between 1 and {MAX_QUERY_INTERVAL_MS}, got {interval}"
            )));
        }
        if self.monitor.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "monitor.queue_capacity must be at most {MAX_QUEUE_CAPACITY}, got {}",
                self.monitor.queue_capacity
            )));
        }
        if let Some(display) = &self.platform.x11_display {
            if display.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "platform.x11_display must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
