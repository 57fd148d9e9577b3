//! Master connection used for every create/drop statement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::ProvisionerConfig;
use crate::error::{ProvisionError, Result};

/// How long to wait for a pooled master connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Administrative connection to the database server.
///
/// Implementations must accept statements from several tasks at once.
#[async_trait]
pub trait AdminConnection: Send + Sync {
    /// Execute a single statement that returns no rows.
    async fn execute(&self, statement: &str) -> std::result::Result<(), sqlx::Error>;

    /// Release the connection.
    async fn close(&self) {}
}

#[async_trait]
impl AdminConnection for PgPool {
    async fn execute(&self, statement: &str) -> std::result::Result<(), sqlx::Error> {
        // CREATE/DROP DATABASE are never worth caching as prepared statements.
        sqlx::query(statement)
            .persistent(false)
            .execute(self)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}

#[async_trait]
impl<T> AdminConnection for Arc<T>
where
    T: AdminConnection + ?Sized,
{
    async fn execute(&self, statement: &str) -> std::result::Result<(), sqlx::Error> {
        (**self).execute(statement).await
    }

    async fn close(&self) {
        (**self).close().await;
    }
}

/// Open the master connection pool.
pub async fn connect(config: &ProvisionerConfig) -> Result<PgPool> {
    info!(
        "Connecting to master database {} (max {} connections)",
        config.master, config.max_admin_connections
    );

    PgPoolOptions::new()
        .max_connections(config.max_admin_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(config.master.connect_options())
        .await
        .map_err(|source| ProvisionError::Connection {
            database: config.master.database.clone(),
            source,
        })
}

/// Run `statement` for `database`, attaching both to any failure.
pub(crate) async fn run<C>(conn: &C, statement: String, database: &str) -> Result<()>
where
    C: AdminConnection + ?Sized,
{
    debug!("{}", statement);
    conn.execute(&statement)
        .await
        .map_err(|source| ProvisionError::admin(&statement, database, source))
}

/// Statements take already-quoted identifiers.
pub mod sql {
    pub fn drop_database_if_exists(quoted: &str) -> String {
        format!("drop database if exists {};", quoted)
    }

    pub fn create_database(quoted: &str) -> String {
        format!("create database {}", quoted)
    }

    pub fn create_database_from_template(quoted: &str, quoted_template: &str) -> String {
        format!("create database {} template {};", quoted, quoted_template)
    }

    /// Without `if exists`: a missing database is an error.
    pub fn drop_database(quoted: &str) -> String {
        format!("drop database {};", quoted)
    }
}
