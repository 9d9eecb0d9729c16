use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskmon::config::MonitorConfig;
use taskmon::registry::{MigrationOutcome, SourceRegistry};
use taskmon::server;

#[derive(Parser)]
#[command(name = "taskmon")]
#[command(version, about = "Web dashboard for hierarchical task lists stored as JSON sources")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ./taskmon.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Registry data directory (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard server
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind on all interfaces and allow permissive CORS
        #[arg(long)]
        dev: bool,
    },
    /// Import a legacy uploads/tasks.json into the source registry
    Migrate,
    /// List registered sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = MonitorConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Serve { port, dev } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if dev {
                config.server.dev_mode = true;
            }
            server::start_server(config).await
        }
        Commands::Migrate => run_migrate(&config),
        Commands::Sources => run_sources(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "taskmon=debug" } else { "taskmon=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_migrate(config: &MonitorConfig) -> Result<()> {
    let registry = SourceRegistry::new(config.storage.data_dir.clone());
    match registry.migrate_legacy()? {
        MigrationOutcome::NoLegacyFile => {
            println!("No migration needed - no existing tasks.json found");
        }
        MigrationOutcome::SourcesExist => {
            println!("Migration not needed - sources already exist");
        }
        MigrationOutcome::Migrated(source) => {
            println!("Migrated tasks.json into source '{}' ({})", source.name, source.id);
        }
    }
    Ok(())
}

fn run_sources(config: &MonitorConfig) -> Result<()> {
    let registry = SourceRegistry::new(config.storage.data_dir.clone());
    let sources = registry.validate()?;
    if sources.is_empty() {
        println!("No sources registered");
        return Ok(());
    }
    for source in sources {
        let health = match source.has_error {
            Some(true) => source.error_message.as_deref().unwrap_or("error"),
            _ => source
                .error_message
                .as_deref()
                .unwrap_or("ok"),
        };
        let kind = if source.is_uploaded { "uploaded" } else { "linked" };
        println!("{}  {}  [{}]  {}", source.id, source.name, kind, health);
    }
    Ok(())
}
