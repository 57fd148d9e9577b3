//! Connection profiles and provisioner configuration.

use std::fmt;
use std::path::PathBuf;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::error::ConfigError;

/// Default PostgreSQL port used when a URL does not carry one.
pub const DEFAULT_PORT: u16 = 5432;

/// Default template database name.
pub const DEFAULT_TEMPLATE: &str = "pgtest_template";

/// Default migrations directory, relative to the working directory.
pub const DEFAULT_MIGRATIONS: &str = "migrations";

/// Default size of the master connection pool.
pub const DEFAULT_MAX_ADMIN_CONNECTIONS: u32 = 5;

/// Environment variable holding the master database URL.
pub const ENV_DATABASE_URL: &str = "PGTEST_DATABASE_URL";
/// Environment variable overriding the template database name.
pub const ENV_TEMPLATE: &str = "PGTEST_TEMPLATE";
/// Environment variable overriding the migrations location.
pub const ENV_MIGRATIONS: &str = "PGTEST_MIGRATIONS";
/// Environment variable overriding the master pool size.
pub const ENV_MAX_CONNECTIONS: &str = "PGTEST_MAX_CONNECTIONS";

/// Everything needed to reach one PostgreSQL database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// `false` forces `sslmode=disable`; `true` leaves the mode to the driver.
    pub ssl: bool,
}

impl ConnectionProfile {
    /// Build a `postgres://` connection string.
    ///
    /// With `ssl == false` the string ends in `?sslmode=disable`. With
    /// `ssl == true` no `sslmode` parameter is emitted and the driver default
    /// applies.
    pub fn connection_string(&self) -> String {
        let mut address = format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        );
        if !self.ssl {
            address.push_str("?sslmode=disable");
        }
        address
    }

    /// Copy of this profile pointing at another database on the same server.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Driver options for this profile.
    ///
    /// Built field by field so credentials never go through URL parsing.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database);

        if self.ssl {
            options
        } else {
            options.ssl_mode(PgSslMode::Disable)
        }
    }

    /// Parse a `postgres://` or `postgresql://` URL.
    ///
    /// Missing port and database fall back to `5432` and `postgres`.
    /// `sslmode=disable` clears the TLS flag, any other mode (or none) sets it.
    pub fn from_url(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::invalid_url(raw, e.to_string()))?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::invalid_url(
                raw,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::invalid_url(raw, "missing host"))?
            .to_string();

        let decode = |part: &str| {
            urlencoding::decode(part)
                .map(|s| s.into_owned())
                .map_err(|e| ConfigError::invalid_url(raw, e.to_string()))
        };

        let user = decode(url.username())?;
        let password = url.password().map(decode).transpose()?.unwrap_or_default();

        let database = match url.path().trim_start_matches('/') {
            "" => "postgres".to_string(),
            db => decode(db)?,
        };

        let ssl = url
            .query_pairs()
            .find(|(key, _)| key == "sslmode")
            .map(|(_, mode)| mode != "disable")
            .unwrap_or(true);

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            database,
            user,
            password,
            ssl,
        })
    }
}

/// Renders the connection string with the password masked.
impl fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgres://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )?;
        if !self.ssl {
            write!(f, "?sslmode=disable")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Provisioner configuration, fixed for the lifetime of a [`Provisioner`].
///
/// [`Provisioner`]: crate::Provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Directory of versioned SQL migrations (a `file://` prefix is accepted)
    pub migrations: PathBuf,
    /// Name of the template database
    pub template: String,
    /// Administrative connection profile
    pub master: ConnectionProfile,
    /// Upper bound on pooled master connections
    pub max_admin_connections: u32,
}

impl ProvisionerConfig {
    pub fn new(
        migrations: impl Into<PathBuf>,
        template: impl Into<String>,
        master: ConnectionProfile,
    ) -> Self {
        Self {
            migrations: migrations.into(),
            template: template.into(),
            master,
            max_admin_connections: DEFAULT_MAX_ADMIN_CONNECTIONS,
        }
    }

    /// Load configuration from `PGTEST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let master = ConnectionProfile::from_url(&url)?;

        let template = lookup(ENV_TEMPLATE).unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let migrations = lookup(ENV_MIGRATIONS).unwrap_or_else(|| DEFAULT_MIGRATIONS.to_string());

        let max_admin_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_MAX_CONNECTIONS,
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    })
                }
            },
            None => DEFAULT_MAX_ADMIN_CONNECTIONS,
        };

        Ok(Self {
            migrations: PathBuf::from(migrations),
            template,
            master,
            max_admin_connections,
        })
    }

    /// Master profile re-pointed at the template database.
    pub fn template_profile(&self) -> ConnectionProfile {
        self.master.with_database(&self.template)
    }
}
