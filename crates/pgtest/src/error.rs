//! Error types for the provisioner.

use std::fmt;

use thiserror::Error;

use crate::migrate::MigrationError;

/// Provisioner operation result type.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Which half of `setup` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    /// Dropping and recreating the template database
    CreateTemplate,
    /// Applying migrations to the template database
    ApplyMigrations,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupPhase::CreateTemplate => write!(f, "create template db"),
            SetupPhase::ApplyMigrations => write!(f, "apply migrations"),
        }
    }
}

/// Provisioner errors.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The master connection could not be established.
    #[error("failed to connect to master database {database}: {source}")]
    Connection {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// A create/drop statement was rejected by the server.
    #[error("failed to execute `{statement}` for database {database}: {source}")]
    AdminStatement {
        statement: String,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// The migration runner failed against the template.
    #[error("failed to migrate template database {database}: {source}")]
    Migration {
        database: String,
        #[source]
        source: MigrationError,
    },

    /// A child database with this name was already registered.
    #[error("child database {0:?} is already registered")]
    DuplicateName(String),

    /// No child database with this name was registered.
    #[error("child database {0:?} not found")]
    NotFound(String),

    /// The name cannot be used as a database identifier.
    #[error("invalid database name {name:?}: {reason}. try something like \"test_user-unique\"")]
    InvalidName { name: String, reason: &'static str },

    /// `setup` failed in the given phase.
    #[error("{phase}: {source}")]
    Setup {
        phase: SetupPhase,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// Create an admin statement error.
    pub fn admin(statement: &str, database: &str, source: sqlx::Error) -> Self {
        Self::AdminStatement {
            statement: statement.to_string(),
            database: database.to_string(),
            source,
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: &str, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason,
        }
    }

    /// Wrap an error with the `setup` phase it came from.
    pub fn in_phase(self, phase: SetupPhase) -> Self {
        Self::Setup {
            phase,
            source: Box::new(self),
        }
    }

    /// The error with any `setup` phase wrapping removed.
    pub fn root(&self) -> &ProvisionError {
        match self {
            ProvisionError::Setup { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required variable is not set
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// Variable is set but unusable
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Database URL could not be parsed
    #[error("invalid database url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ConfigError {
    /// Create an invalid URL error.
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_phase_context() {
        let err = ProvisionError::admin(
            "create database \"tpl\"",
            "tpl",
            sqlx::Error::Protocol("permission denied".to_string()),
        )
        .in_phase(SetupPhase::CreateTemplate);

        let msg = err.to_string();
        assert!(msg.starts_with("create template db: "), "{msg}");
        assert!(msg.contains("create database \"tpl\""), "{msg}");
        assert!(matches!(err.root(), ProvisionError::AdminStatement { .. }));
    }

    #[test]
    fn test_invalid_name_message() {
        let err = ProvisionError::invalid_name("", "name is empty");
        assert_eq!(
            err.to_string(),
            "invalid database name \"\": name is empty. try something like \"test_user-unique\""
        );
    }
}
