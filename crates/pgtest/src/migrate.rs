//! Migration runner seam and the sqlx-backed implementation.
//!
//! The template manager only needs two things from a runner: apply the next
//! pending step, and report when nothing is left to apply. Each call to
//! [`MigrationRunner::up`] applies at most one version, so callers loop until
//! they see [`MigrationStep::NoChange`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::debug;

use crate::config::ConnectionProfile;

/// Migration runner errors.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The migration source could not be read.
    #[error("failed to load migrations from {}: {source}", .location.display())]
    Load {
        location: PathBuf,
        #[source]
        source: MigrateError,
    },

    /// The runner could not reach the target database.
    #[error("failed to connect to {database} for migrations: {source}")]
    Connect {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Reading or locking the migration history failed.
    #[error("migration history unavailable: {0}")]
    History(#[source] MigrateError),

    /// A previous run left a version half-applied.
    #[error("migration {0} is partially applied; recreate the template")]
    Dirty(i64),

    /// An applied migration no longer matches its source file.
    #[error("migration {0} was applied but has since been modified")]
    VersionMismatch(i64),

    /// A pending migration failed to apply.
    #[error("migrate up {version} ({description}): {source}")]
    Apply {
        version: i64,
        description: String,
        #[source]
        source: MigrateError,
    },

    /// Closing the runner's connection failed.
    #[error("failed to close migration connection: {0}")]
    Close(#[source] sqlx::Error),
}

/// Outcome of one [`MigrationRunner::up`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// One pending version was applied.
    Applied { version: i64, description: String },
    /// Nothing left to apply.
    NoChange,
}

/// Applies versioned schema changes to one database.
#[async_trait]
pub trait MigrationRunner: Send {
    /// Apply the next pending migration, if any.
    async fn up(&mut self) -> Result<MigrationStep, MigrationError>;

    /// Release the runner's connection.
    async fn close(self) -> Result<(), MigrationError>
    where
        Self: Sized;
}

/// Opens [`MigrationRunner`]s against a database.
#[async_trait]
pub trait MigrationDriver: Send + Sync {
    type Runner: MigrationRunner;

    /// Open a runner for the migrations at `location` against `profile`.
    async fn open(
        &self,
        location: &Path,
        profile: &ConnectionProfile,
    ) -> Result<Self::Runner, MigrationError>;
}

/// Strip an optional `file://` scheme from a migrations location.
pub fn migrations_dir(location: &Path) -> PathBuf {
    match location.to_str().and_then(|s| s.strip_prefix("file://")) {
        Some(rest) => PathBuf::from(rest),
        None => location.to_path_buf(),
    }
}

/// Runs sqlx-style `<VERSION>_<DESCRIPTION>.sql` migrations from a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxMigrationDriver;

#[async_trait]
impl MigrationDriver for SqlxMigrationDriver {
    type Runner = SqlxMigrationRunner;

    async fn open(
        &self,
        location: &Path,
        profile: &ConnectionProfile,
    ) -> Result<SqlxMigrationRunner, MigrationError> {
        let dir = migrations_dir(location);
        let migrator = Migrator::new(dir.clone())
            .await
            .map_err(|source| MigrationError::Load {
                location: dir,
                source,
            })?;

        let mut conn = PgConnection::connect_with(&profile.connect_options())
            .await
            .map_err(|source| MigrationError::Connect {
                database: profile.database.clone(),
                source,
            })?;

        conn.ensure_migrations_table()
            .await
            .map_err(MigrationError::History)?;
        conn.lock().await.map_err(MigrationError::History)?;

        debug!(
            "Opened migration runner on {} ({} migrations)",
            profile,
            migrator.iter().count()
        );

        Ok(SqlxMigrationRunner { migrator, conn })
    }
}

/// A dedicated connection plus the migrations to apply over it.
///
/// Holds the migration advisory lock until [`MigrationRunner::close`].
pub struct SqlxMigrationRunner {
    migrator: Migrator,
    conn: PgConnection,
}

#[async_trait]
impl MigrationRunner for SqlxMigrationRunner {
    async fn up(&mut self) -> Result<MigrationStep, MigrationError> {
        if let Some(version) = self
            .conn
            .dirty_version()
            .await
            .map_err(MigrationError::History)?
        {
            return Err(MigrationError::Dirty(version));
        }

        let applied: HashMap<i64, _> = self
            .conn
            .list_applied_migrations()
            .await
            .map_err(MigrationError::History)?
            .into_iter()
            .map(|m| (m.version, m.checksum))
            .collect();

        for migration in self.migrator.iter() {
            if migration.migration_type.is_down_migration() {
                continue;
            }

            match applied.get(&migration.version) {
                Some(checksum) if *checksum != migration.checksum => {
                    return Err(MigrationError::VersionMismatch(migration.version));
                }
                Some(_) => continue,
                None => {
                    self.conn
                        .apply(migration)
                        .await
                        .map_err(|source| MigrationError::Apply {
                            version: migration.version,
                            description: migration.description.to_string(),
                            source,
                        })?;

                    return Ok(MigrationStep::Applied {
                        version: migration.version,
                        description: migration.description.to_string(),
                    });
                }
            }
        }

        Ok(MigrationStep::NoChange)
    }

    async fn close(mut self) -> Result<(), MigrationError> {
        self.conn.unlock().await.map_err(MigrationError::History)?;
        self.conn.close().await.map_err(MigrationError::Close)
    }
}
