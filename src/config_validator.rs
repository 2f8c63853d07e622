//! Configuration Validation
//!
//! HARDENING: Validates all configuration at load time.
//! Collects every invalid value and reports them together.

use std::fmt;

/// A single invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {:?})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ConfigResult<T> = Result<T, Vec<ConfigValidationError>>;

/// Accepted `log_level` values
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn error(&mut self, field: &str, value: impl fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Value must contain something other than whitespace
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value must not be empty");
        }
        self
    }

    pub fn validate_log_level(&mut self, field: &str, value: &str) -> &mut Self {
        if !LOG_LEVELS.contains(&value.to_lowercase().as_str()) {
            self.error(
                field,
                value,
                &format!("Log level must be one of {}", LOG_LEVELS.join(", ")),
            );
        }
        self
    }

    /// Two targets pointing at the same place defeat the production gate
    pub fn validate_distinct(&mut self, field: &str, a: &str, b: &str) -> &mut Self {
        if a == b {
            self.error(field, b, "Must differ from the development target");
        }
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(self) -> ConfigResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
