//! Template setup, per-test clones and teardown.

use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::admin::{self, sql, AdminConnection};
use crate::config::{ConnectionProfile, ProvisionerConfig};
use crate::error::{Result, SetupPhase};
use crate::ident::{quote_identifier, validate_name};
use crate::migrate::{MigrationDriver, SqlxMigrationDriver};
use crate::registry::{ChildDatabase, ChildRegistry};
use crate::template::TemplateManager;

/// Hands out isolated databases cloned from one migrated template.
///
/// All statements go through one master connection owned by the provisioner.
/// Share it between tests with `Arc`; every method takes `&self`.
///
/// ```rust,ignore
/// use pgtest::{Provisioner, ProvisionerConfig};
///
/// let provisioner = Provisioner::connect(ProvisionerConfig::from_env()?).await?;
/// provisioner.setup().await?;
///
/// let alice = provisioner.setup_child("alice").await?;
/// let pool = sqlx::PgPool::connect_with(alice.connect_options()).await?;
/// // ...
/// pool.close().await;
/// provisioner.teardown_child("alice").await?;
///
/// provisioner.teardown().await?;
/// provisioner.close().await;
/// ```
pub struct Provisioner<C = PgPool, D = SqlxMigrationDriver> {
    config: ProvisionerConfig,
    master: C,
    template: TemplateManager<D>,
    children: ChildRegistry,
}

impl Provisioner {
    /// Connect the master pool and use the sqlx migration runner.
    pub async fn connect(config: ProvisionerConfig) -> Result<Self> {
        validate_name(&config.template)?;
        let master = admin::connect(&config).await?;
        Self::with_parts(config, master, SqlxMigrationDriver)
    }
}

impl<C, D> Provisioner<C, D>
where
    C: AdminConnection,
    D: MigrationDriver,
{
    /// Build a provisioner around an already-open master connection.
    pub fn with_parts(config: ProvisionerConfig, master: C, driver: D) -> Result<Self> {
        validate_name(&config.template)?;
        let template = TemplateManager::new(
            config.template_profile(),
            config.migrations.clone(),
            driver,
        );
        Ok(Self {
            config,
            master,
            template,
            children: ChildRegistry::new(),
        })
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Profile of the template database.
    pub fn template_profile(&self) -> &ConnectionProfile {
        self.template.profile()
    }

    /// Recreate the template database and migrate it to the latest version.
    ///
    /// Safe to repeat: each call starts from an empty template.
    pub async fn setup(&self) -> Result<()> {
        self.template
            .create_template(&self.master)
            .await
            .map_err(|e| e.in_phase(SetupPhase::CreateTemplate))?;
        self.template
            .migrate_template()
            .await
            .map_err(|e| e.in_phase(SetupPhase::ApplyMigrations))?;
        Ok(())
    }

    /// Clone the template into a fresh database called `name`.
    ///
    /// The name is registered before any SQL runs, so a duplicate fails
    /// without touching the server. Any leftover database with the same name
    /// is dropped first. The template must have no open sessions.
    pub async fn setup_child(&self, name: &str) -> Result<ConnectionProfile> {
        validate_name(name)?;

        let profile = self.config.master.with_database(name);
        self.children.add(name, profile.clone())?;

        let quoted = quote_identifier(name);
        admin::run(&self.master, sql::drop_database_if_exists(&quoted), name).await?;
        admin::run(
            &self.master,
            sql::create_database_from_template(&quoted, self.template.quoted()),
            name,
        )
        .await?;

        debug!("Created child database {} from {}", name, self.template.name());
        Ok(profile)
    }

    /// Drop the child database `name` and mark it shut down.
    ///
    /// Issues a plain `drop database`, so tearing the same child down twice
    /// reports the server's "does not exist" error.
    pub async fn teardown_child(&self, name: &str) -> Result<()> {
        let child = self.children.get(name)?;
        if !child.is_active() {
            warn!("Child database {} is already shut down", name);
        }

        admin::run(&self.master, sql::drop_database(&quote_identifier(name)), name).await?;
        self.children.mark_shutdown(name)?;
        debug!("Dropped child database {}", name);
        Ok(())
    }

    /// Drop the template and every child still marked active.
    ///
    /// Children already torn down are skipped. The first failed drop stops
    /// the sweep.
    pub async fn teardown(&self) -> Result<()> {
        self.template.drop_template(&self.master).await?;

        let active = self.children.active_names();
        info!(
            "Dropped template {}; sweeping {} active child databases",
            self.template.name(),
            active.len()
        );

        for name in active {
            admin::run(
                &self.master,
                sql::drop_database_if_exists(&quote_identifier(&name)),
                &name,
            )
            .await?;
            self.children.mark_shutdown(&name)?;
        }
        Ok(())
    }

    /// Copy of the record for `name`.
    pub fn child(&self, name: &str) -> Result<ChildDatabase> {
        self.children.get(name)
    }

    /// Every child ever registered, sorted by name.
    pub fn children(&self) -> Vec<(String, ChildDatabase)> {
        self.children.snapshot()
    }

    /// Close the master connection.
    pub async fn close(self) {
        self.master.close().await;
    }
}
