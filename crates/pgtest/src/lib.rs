//! pgtest
//!
//! Isolated, pre-migrated PostgreSQL databases for test suites.
//!
//! A template database is created and migrated once per [`Provisioner::setup`].
//! Each test then gets its own database through
//! [`Provisioner::setup_child`], cloned server-side with
//! `create database .. template ..` instead of re-running migrations.
//!
//! # Features
//!
//! - `docker-tests`: Enable integration tests that need a running PostgreSQL
//!   (reached through `PGTEST_DATABASE_URL`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pgtest::{Provisioner, ProvisionerConfig};
//!
//! #[tokio::test]
//! async fn test_users() {
//!     let provisioner = Arc::new(
//!         Provisioner::connect(ProvisionerConfig::from_env().unwrap()).await.unwrap(),
//!     );
//!     provisioner.setup().await.unwrap();
//!
//!     let profile = provisioner.setup_child("test_users").await.unwrap();
//!     let pool = sqlx::PgPool::connect_with(profile.connect_options()).await.unwrap();
//!     // Database already has the full schema
//!     pool.close().await;
//!
//!     provisioner.teardown().await.unwrap();
//! }
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod ident;
pub mod migrate;
pub mod provisioner;
pub mod registry;
pub mod template;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use admin::AdminConnection;
pub use config::{ConnectionProfile, ProvisionerConfig};
pub use error::{ConfigError, ProvisionError, Result, SetupPhase};
pub use migrate::{
    MigrationDriver, MigrationError, MigrationRunner, MigrationStep, SqlxMigrationDriver,
};
pub use provisioner::Provisioner;
pub use registry::{ChildDatabase, ChildRegistry, ChildStatus};
