mod config;
mod service;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use service::NodeService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "agora-node")]
#[clap(author, version, about = "Agora permissioned BA* blockchain node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[clap(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start,

    /// Write a default configuration file
    Init {
        /// Output configuration file path
        #[clap(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Show node version
    Version,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { output }) => init_config(&output),
        Some(Commands::Version) => {
            println!("agora-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Start) | None => start_node(&cli.config).await,
    }
}

fn init_config(output: &str) -> Result<()> {
    if std::path::Path::new(output).exists() {
        anyhow::bail!("refusing to overwrite existing config at {output}");
    }
    Config::default().save(output)?;
    println!("wrote default configuration to {output}");
    Ok(())
}

async fn start_node(path: &str) -> Result<()> {
    let config = Config::load(path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config = %path, node = %config.node.name, "agora node starting");
    NodeService::new(config).start().await
}
