//! CLI errors with stable codes

use std::fmt;

use crate::config::ConfigError;
use crate::migrations::MigrationError;

pub type CliResult<T> = Result<T, CliError>;

/// Stable error codes, printed with every CLI failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    Aborted,
    UnknownMigration,
    MigrationFailed,
}

impl CliErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CliErrorCode::ConfigError => "CONFIG_ERROR",
            CliErrorCode::Aborted => "ABORTED",
            CliErrorCode::UnknownMigration => "UNKNOWN_MIGRATION",
            CliErrorCode::MigrationFailed => "MIGRATION_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, message)
    }

    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::new(CliErrorCode::MigrationFailed, message)
    }

    pub fn unknown_migration(key: &str) -> Self {
        Self::new(
            CliErrorCode::UnknownMigration,
            format!("No migration named or versioned '{}'. See `docshift list`.", key),
        )
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self.code {
            CliErrorCode::ConfigError | CliErrorCode::UnknownMigration => 2,
            CliErrorCode::Aborted => 1,
            CliErrorCode::MigrationFailed => 3,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        let code = match &err {
            MigrationError::Aborted { .. } => CliErrorCode::Aborted,
            e if e.is_fatal_configuration() => CliErrorCode::ConfigError,
            _ => CliErrorCode::MigrationFailed,
        };
        Self::new(code, err.to_string())
    }
}
