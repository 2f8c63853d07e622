//! Configuration file
//!
//! JSON, loaded once per command and validated before anything connects:
//!
//! ```json
//! {
//!   "development": { "data_dir": "./data/dev" },
//!   "production":  { "data_dir": "/srv/docshift/prod" },
//!   "confirmation_phrase": "studycompass",
//!   "log_level": "info",
//!   "app": { "name": "meridian", "version": "0.1.0", "build": "1", "platform": "web" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_validator::{ConfigValidationError, ConfigValidator};
use crate::environment::{Environment, ProductionGate, DEFAULT_CONFIRMATION_PHRASE};
use crate::migrations::qr_backfill::EventStamp;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{}", join_errors(.0))]
    Invalid(Vec<ConfigValidationError>),

    #[error("No {environment} target configured")]
    MissingTarget { environment: Environment },
}

fn join_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One database target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Directory holding the JSON collection files
    pub data_dir: String,
}

impl TargetConfig {
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }
}

/// Application identity stamped on generated events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_app_version")]
    pub version: String,
    #[serde(default = "default_app_build")]
    pub build: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            build: default_app_build(),
            platform: default_platform(),
        }
    }
}

impl AppConfig {
    pub fn event_stamp(&self) -> EventStamp {
        EventStamp {
            platform: self.platform.clone(),
            app: self.name.clone(),
            app_version: self.version.clone(),
            build: self.build.clone(),
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Development target (required)
    pub development: TargetConfig,

    /// Production target (optional; selecting production without it fails)
    #[serde(default)]
    pub production: Option<TargetConfig>,

    /// Phrase an operator must type to run against production
    #[serde(default = "default_confirmation_phrase")]
    pub confirmation_phrase: String,

    /// Default log filter, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub app: AppConfig,
}

fn default_confirmation_phrase() -> String {
    DEFAULT_CONFIRMATION_PHRASE.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_app_name() -> String {
    "meridian".to_string()
}
fn default_app_version() -> String {
    "0.1.0".to_string()
}
fn default_app_build() -> String {
    "1".to_string()
}
fn default_platform() -> String {
    "web".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut validator = ConfigValidator::new();
        validator
            .validate_non_empty("development.data_dir", &self.development.data_dir)
            .validate_non_empty("confirmation_phrase", &self.confirmation_phrase)
            .validate_log_level("log_level", &self.log_level)
            .validate_non_empty("app.name", &self.app.name)
            .validate_non_empty("app.version", &self.app.version)
            .validate_non_empty("app.build", &self.app.build)
            .validate_non_empty("app.platform", &self.app.platform);

        if let Some(production) = &self.production {
            validator
                .validate_non_empty("production.data_dir", &production.data_dir)
                .validate_distinct(
                    "production.data_dir",
                    &self.development.data_dir,
                    &production.data_dir,
                );
        }

        validator.finish().map_err(ConfigError::Invalid)
    }

    pub fn target(&self, environment: Environment) -> Result<&TargetConfig, ConfigError> {
        match environment {
            Environment::Development => Ok(&self.development),
            Environment::Production => self
                .production
                .as_ref()
                .ok_or(ConfigError::MissingTarget { environment }),
        }
    }

    pub fn gate(&self) -> ProductionGate {
        ProductionGate::new(self.confirmation_phrase.clone())
    }
}
