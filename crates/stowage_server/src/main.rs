//! Stowage server binary.
//!
//! Settings come from `STOWAGE_*` environment variables, overridden by
//! command-line flags. Exit codes: 0 after a clean shutdown, 1 when startup
//! fails, 2 when the server fails while running.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use stowage_core::QueueBalancing;
use stowage_server::{Server, ServerConfig, ServerResult};
use tracing_subscriber::EnvFilter;

/// Stowage storage server.
#[derive(Parser)]
#[command(name = "stowage-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "STOWAGE_BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Data directory
    #[arg(short, long, env = "STOWAGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between object compaction passes
    #[arg(long, env = "STOWAGE_COMPACTION_INTERVAL_SECS")]
    compaction_interval: Option<u64>,

    /// Seconds of silence before a connection is closed
    #[arg(long, env = "STOWAGE_INACTIVITY_TIMEOUT_SECS")]
    inactivity_timeout: Option<u64>,

    /// Disable KV expiry sweeps
    #[arg(long)]
    no_ttl: bool,

    /// Queue group balancing: global or per-group
    #[arg(long, env = "STOWAGE_QUEUE_BALANCING")]
    queue_balancing: Option<QueueBalancing>,

    /// JSON file with the user list
    #[arg(long, env = "STOWAGE_USERS_FILE")]
    users_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> ServerResult<ServerConfig> {
        let mut config = ServerConfig::from_env()?;
        if let Some(addr) = self.bind {
            config = config.with_bind_addr(addr);
        }
        if let Some(dir) = self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(secs) = self.compaction_interval {
            config = config.with_compaction_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.inactivity_timeout {
            config = config.with_inactivity_timeout(Duration::from_secs(secs));
        }
        if self.no_ttl {
            config = config.with_ttl(false);
        }
        if let Some(mode) = self.queue_balancing {
            config = config.with_queue_balancing(mode);
        }
        if let Some(path) = self.users_file {
            config = config.with_users_file(path);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = match cli.into_config() {
        Ok(config) => match Server::bind(config).await {
            Ok(server) => server,
            Err(err) => {
                tracing::error!(error = %err, "startup failed");
                return ExitCode::from(1);
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl-C received");
    };
    match server.run_until(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::from(2)
        }
    }
}
