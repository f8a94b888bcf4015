use std::path::PathBuf;

use clap::Parser;
use lifehub::config::{Config, StorageConfig};
use lifehub::daemon;
use lifehub::error::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lifehubd")]
#[command(about = "Lifehub local daemon: history feed, summaries and model proxy")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7878)]
    port: u16,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long, env = "LIFEHUB_TOKEN", default_value = "")]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lifehub=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?.resolve_env();
    if let Some(db) = cli.db {
        config.storage = Some(StorageConfig {
            sqlite_path: Some(db),
        });
    }

    daemon::run(&cli.host, cli.port, config, &cli.token).await
}
