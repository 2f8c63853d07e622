//! Target Environment Selection
//!
//! HARDENING: Protects production from accidental migrations.
//!
//! - Development runs without confirmation
//! - Production requires typing the configured confirmation phrase
//! - The decision is a pure function of already-resolved inputs, so the CLI,
//!   tests and any other caller share one gate

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::migrations::{MigrationError, MigrationResult};

/// Default production confirmation phrase
pub const DEFAULT_CONFIRMATION_PHRASE: &str = "studycompass";

/// Database a migration runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Value stamped into the `env` field of generated documents
    pub fn label(&self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Production => "prod",
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Warning shown before asking for confirmation
    pub fn warning(&self, phrase: &str) -> String {
        match self {
            Environment::Development => "Running against the development database.".to_string(),
            Environment::Production => format!(
                "WARNING: This will affect a production database, type '{}' to proceed.",
                phrase
            ),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "dev" | "development" => Ok(Environment::Development),
            "p" | "prod" | "production" => Ok(Environment::Production),
            _ => Err(MigrationError::InvalidEnvironment {
                selector: s.to_string(),
            }),
        }
    }
}

/// Result of a confirmation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// Proceed
    Confirmed,
    /// Confirmation required but not provided
    NotProvided { warning: String },
    /// Typed phrase doesn't match
    PhraseNotMatch,
}

/// Confirmation gate in front of production
#[derive(Debug, Clone)]
pub struct ProductionGate {
    phrase: String,
}

impl ProductionGate {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Check a typed token against the gate. Trimmed, case-insensitive.
    pub fn check(&self, environment: Environment, token: Option<&str>) -> ConfirmationResult {
        if !environment.requires_confirmation() {
            return ConfirmationResult::Confirmed;
        }

        match token {
            None => ConfirmationResult::NotProvided {
                warning: environment.warning(&self.phrase),
            },
            Some(typed) if typed.trim().to_lowercase() == self.phrase.to_lowercase() => {
                ConfirmationResult::Confirmed
            }
            Some(_) => ConfirmationResult::PhraseNotMatch,
        }
    }

    /// Select the environment and pass the gate, or abort before any write
    pub fn authorize(&self, selector: &str, token: Option<&str>) -> MigrationResult<Environment> {
        let environment: Environment = selector.parse()?;

        match self.check(environment, token) {
            ConfirmationResult::Confirmed => Ok(environment),
            ConfirmationResult::NotProvided { warning } => {
                warn!(%environment, "Production run attempted without confirmation");
                Err(MigrationError::Aborted {
                    reason: format!("{} (pass --confirm)", warning),
                })
            }
            ConfirmationResult::PhraseNotMatch => {
                warn!(%environment, "Production confirmation phrase did not match");
                Err(MigrationError::Aborted {
                    reason: "confirmation phrase did not match".to_string(),
                })
            }
        }
    }
}

impl Default for ProductionGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRMATION_PHRASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("d".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!(" P ".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);

        let err = "x".parse::<Environment>().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidEnvironment { .. }));
    }

    #[test]
    fn test_development_needs_no_token() {
        let gate = ProductionGate::default();
        assert_eq!(gate.authorize("d", None).unwrap(), Environment::Development);
        assert_eq!(gate.authorize("d", Some("anything")).unwrap(), Environment::Development);
    }

    #[test]
    fn test_production_requires_exact_phrase() {
        let gate = ProductionGate::default();

        assert_eq!(
            gate.authorize("p", Some("  StudyCompass ")).unwrap(),
            Environment::Production
        );

        let wrong = gate.authorize("p", Some("study compass")).unwrap_err();
        assert!(matches!(wrong, MigrationError::Aborted { .. }));
        assert!(!wrong.to_string().contains("studycompass"));

        let missing = gate.authorize("p", None).unwrap_err();
        assert!(matches!(missing, MigrationError::Aborted { .. }));
    }

    #[test]
    fn test_check_results() {
        let gate = ProductionGate::new("ship it");
        assert_eq!(
            gate.check(Environment::Production, Some("SHIP IT")),
            ConfirmationResult::Confirmed
        );
        assert_eq!(
            gate.check(Environment::Production, Some("ship")),
            ConfirmationResult::PhraseNotMatch
        );
        assert!(matches!(
            gate.check(Environment::Production, None),
            ConfirmationResult::NotProvided { .. }
        ));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Environment::Development.label(), "dev");
        assert_eq!(Environment::Production.label(), "prod");
    }
}
