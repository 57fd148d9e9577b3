//! Template database lifecycle.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::admin::{self, sql, AdminConnection};
use crate::config::ConnectionProfile;
use crate::error::{ProvisionError, Result};
use crate::ident::quote_identifier;
use crate::migrate::{MigrationDriver, MigrationRunner, MigrationStep};

/// Owns creation and migration of the template database.
pub struct TemplateManager<D> {
    name: String,
    quoted: String,
    profile: ConnectionProfile,
    migrations: PathBuf,
    driver: D,
}

impl<D: MigrationDriver> TemplateManager<D> {
    /// `profile` must already point at the template database.
    pub fn new(profile: ConnectionProfile, migrations: PathBuf, driver: D) -> Self {
        Self {
            name: profile.database.clone(),
            quoted: quote_identifier(&profile.database),
            profile,
            migrations,
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted identifier for use in statements.
    pub fn quoted(&self) -> &str {
        &self.quoted
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Drop the template if it exists, then create it empty.
    ///
    /// Always starting from scratch means a run that died mid-migration
    /// cannot leave a half-migrated template behind.
    pub async fn create_template<C>(&self, conn: &C) -> Result<()>
    where
        C: AdminConnection + ?Sized,
    {
        info!("Recreating template database {}", self.name);
        self.drop_template(conn).await?;
        admin::run(conn, sql::create_database(&self.quoted), &self.name).await
    }

    /// Drop the template if it exists.
    pub async fn drop_template<C>(&self, conn: &C) -> Result<()>
    where
        C: AdminConnection + ?Sized,
    {
        admin::run(conn, sql::drop_database_if_exists(&self.quoted), &self.name).await
    }

    /// Apply every pending migration to the template.
    ///
    /// Returns the number of versions applied. The first failure aborts;
    /// recovery is another `create_template` + `migrate_template`.
    pub async fn migrate_template(&self) -> Result<usize> {
        let mut runner = self
            .driver
            .open(&self.migrations, &self.profile)
            .await
            .map_err(|source| self.migration_error(source))?;

        let mut applied = 0;
        loop {
            match runner.up().await.map_err(|source| self.migration_error(source))? {
                MigrationStep::Applied {
                    version,
                    description,
                } => {
                    debug!("Applied migration {} ({}) to {}", version, description, self.name);
                    applied += 1;
                }
                MigrationStep::NoChange => break,
            }
        }

        runner
            .close()
            .await
            .map_err(|source| self.migration_error(source))?;

        info!("Template database {} migrated ({} applied)", self.name, applied);
        Ok(applied)
    }

    fn migration_error(&self, source: crate::migrate::MigrationError) -> ProvisionError {
        ProvisionError::Migration {
            database: self.name.clone(),
            source,
        }
    }
}
