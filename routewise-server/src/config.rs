//! Navigator configuration
//!
//! Settings come from an optional JSON file, either given with `--config` or
//! `config.json` in the platform config directory, and are then overridden by
//! command line flags. A missing file means defaults.
//!
//! Config path: `~/.config/routewise/config.json` (Linux)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use log::{debug, info};
use routewise_core::{FilterMode, NavigationConfig, NavigationError, TravelMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Cli, FilterArg, ModeArg};

const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "routewise", "routewise")
}

/// Default location of the config file, if the platform has one
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigatorConfig {
    pub navigation: NavigationConfig,
    /// Time between ticks in milliseconds
    pub tick_period_ms: u64,
    /// How long a single position request may take, in milliseconds
    pub provider_timeout_ms: u64,
    /// Slow the tick rate down when the signal degrades
    pub adaptive_polling: bool,
    /// Buffered events per subscriber
    pub event_capacity: usize,
    /// Travel mode for recalculated routes, the route's own mode when unset
    pub travel_mode: Option<TravelMode>,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        NavigatorConfig {
            navigation: NavigationConfig::default(),
            tick_period_ms: 2000,
            provider_timeout_ms: 10_000,
            adaptive_polling: false,
            event_capacity: 256,
            travel_mode: None,
        }
    }
}

impl NavigatorConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Read a config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path`, or from the default location when `None`
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply command line overrides
    pub fn with_cli(mut self, args: &Cli) -> Self {
        if let Some(tick_ms) = args.tick_ms {
            self.tick_period_ms = tick_ms;
        }
        if args.adaptive_polling {
            self.adaptive_polling = true;
        }
        if let Some(filter) = args.filter {
            self.navigation.filter_mode = match filter {
                FilterArg::Smoothing => FilterMode::Smoothing,
                FilterArg::Predictive => FilterMode::Predictive,
                FilterArg::Kalman => FilterMode::Kalman,
            };
        }
        if let Some(mode) = args.mode {
            self.travel_mode = Some(match mode {
                ModeArg::Driving => TravelMode::Driving,
                ModeArg::Walking => TravelMode::Walking,
                ModeArg::Cycling => TravelMode::Cycling,
            });
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.navigation.validate()?;
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tickPeriodMs"));
        }
        if self.provider_timeout_ms == 0 {
            return Err(ConfigError::Invalid("providerTimeoutMs"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("eventCapacity"));
        }
        Ok(())
    }
}
