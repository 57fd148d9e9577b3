//! pgtest command line
//!
//! Prepares or removes a template database ahead of a test run and clones
//! one-off child databases for debugging.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgtest::config::{
    DEFAULT_MAX_ADMIN_CONNECTIONS, DEFAULT_MIGRATIONS, DEFAULT_TEMPLATE, ENV_DATABASE_URL,
    ENV_MAX_CONNECTIONS, ENV_MIGRATIONS, ENV_TEMPLATE,
};
use pgtest::{ConnectionProfile, Provisioner, ProvisionerConfig};
use pgtest_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pgtest", about = "Template-cloned PostgreSQL databases for tests")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Append logs to this file as well as stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Master database URL used for create/drop statements
    #[arg(long, global = true, env = ENV_DATABASE_URL, hide_env_values = true)]
    database_url: Option<String>,

    /// Template database name
    #[arg(long, global = true, env = ENV_TEMPLATE, default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Directory of versioned SQL migrations (file:// prefix accepted)
    #[arg(long, global = true, env = ENV_MIGRATIONS, default_value = DEFAULT_MIGRATIONS)]
    migrations: PathBuf,

    /// Maximum pooled master connections
    #[arg(long, global = true, env = ENV_MAX_CONNECTIONS, default_value_t = DEFAULT_MAX_ADMIN_CONNECTIONS)]
    max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Recreate the template database and apply all migrations
    Setup,

    /// Clone the template into a new database and print its URL
    Clone {
        /// Name of the new database
        name: String,
    },

    /// Drop the template database
    Teardown,
}

impl Cli {
    fn provisioner_config(&self) -> Result<ProvisionerConfig> {
        let url = self
            .database_url
            .as_deref()
            .with_context(|| format!("--database-url or {} is required", ENV_DATABASE_URL))?;
        let master = ConnectionProfile::from_url(url).context("Invalid master database URL")?;

        let mut config = ProvisionerConfig::new(&self.migrations, &self.template, master);
        config.max_admin_connections = self.max_connections.max(1);
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.provisioner_config()?;
    let provisioner = Provisioner::connect(config)
        .await
        .context("Failed to connect to master database")?;

    let result = match &cli.command {
        Commands::Setup => provisioner.setup().await.map(|()| {
            info!("Template ready");
            println!("{}", provisioner.template_profile().connection_string());
        }),
        Commands::Clone { name } => provisioner.setup_child(name).await.map(|profile| {
            println!("{}", profile.connection_string());
        }),
        Commands::Teardown => provisioner.teardown().await,
    };

    provisioner.close().await;
    result.with_context(|| format!("pgtest {:?} failed", cli.command))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "pgtest",
        verbose: cli.verbose,
        log_file: cli.log_file.clone(),
    }) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
