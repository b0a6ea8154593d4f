//! Stowage CLI
//!
//! Command-line client for a running Stowage server.
//!
//! # Commands
//!
//! - `ping` - Check that the server answers
//! - `login` - Check credentials
//! - `kv` - Get, set, delete and list keys
//! - `object` - Put, get, delete and list objects
//! - `broker` - Publish and subscribe
//! - `db` / `collection` - Create and list databases and collections

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use stowage_client::{Client, ClientConfig, Engine};
use tracing_subscriber::EnvFilter;

/// Stowage command-line client.
#[derive(Parser)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(global = true, short, long, env = "STOWAGE_ADDR", default_value = "127.0.0.1:8091")]
    addr: SocketAddr,

    /// Username for password login
    #[arg(global = true, short, long, env = "STOWAGE_USER")]
    user: Option<String>,

    /// Password for password login
    #[arg(global = true, long, env = "STOWAGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// API key login, used instead of a username
    #[arg(global = true, long, env = "STOWAGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server answers
    Ping,

    /// Log in and report the authentication status
    Login,

    /// Key-value commands
    Kv {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        #[command(subcommand)]
        command: KvCommand,
    },

    /// Object commands
    Object {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        #[command(subcommand)]
        command: ObjectCommand,
    },

    /// Broker commands
    Broker {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        #[command(subcommand)]
        command: BrokerCommand,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },

    /// Collection management
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },
}

/// Key-value subcommands.
#[derive(Subcommand)]
pub enum KvCommand {
    /// Print the value under a key
    Get {
        /// Key
        key: String,
    },
    /// Store a value
    Set {
        /// Key
        key: String,
        /// Value text
        value: String,
        /// How to read the value (string, int, number, bool, json)
        #[arg(short = 't', long = "type", default_value = "string")]
        kind: String,
        /// Expire after this many milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Delete a key
    Delete {
        /// Key
        key: String,
    },
    /// List live keys
    Keys,
}

/// Object subcommands.
#[derive(Subcommand)]
pub enum ObjectCommand {
    /// Upload a file
    Put {
        /// Object key
        key: String,
        /// File to upload
        file: PathBuf,
    },
    /// Download an object
    Get {
        /// Object key
        key: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete an object
    Delete {
        /// Object key
        key: String,
    },
    /// List object keys
    List {
        /// Only keys starting with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },
}

/// Broker subcommands.
#[derive(Subcommand)]
pub enum BrokerCommand {
    /// Publish a message
    Publish {
        /// Subject
        subject: String,
        /// Message text
        message: String,
    },
    /// Print messages as they arrive
    Subscribe {
        /// Subject or pattern
        subject: String,
        /// Join this queue group
        #[arg(short, long)]
        queue: Option<String>,
        /// Stop after this many messages
        #[arg(short, long)]
        count: Option<usize>,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub enum DbCommand {
    /// Create a database
    Create {
        /// Database name
        name: String,
    },
    /// List readable databases
    List,
}

/// Collection subcommands.
#[derive(Subcommand)]
pub enum CollectionCommand {
    /// Create a collection
    Create {
        /// Database name
        database: String,
        /// Collection name
        name: String,
        /// Engine (kv, object, broker)
        engine: Engine,
        /// Disable key expiry sweeps
        #[arg(long)]
        no_ttl: bool,
    },
    /// List the collections of a database
    List {
        /// Database name
        database: String,
    },
}

impl Cli {
    async fn connect(&self) -> Result<Client, Box<dyn std::error::Error>> {
        let client = Client::connect(ClientConfig::new(self.addr).without_heartbeat()).await?;
        if let Some(key) = &self.api_key {
            client.login_api_key(key).await?;
        } else if let Some(user) = &self.user {
            let password = self.password.as_deref().unwrap_or_default();
            client.login(user, password).await?;
        }
        Ok(client)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = output::Format::parse(&cli.format)?;
    let client = cli.connect().await?;

    match cli.command {
        Commands::Ping => {
            let started = std::time::Instant::now();
            let reply = client.ping().await?;
            println!("{reply} from {} in {:?}", cli.addr, started.elapsed());
        }
        Commands::Login => {
            let authenticated = client.auth_status().await?;
            output::print_status(format, authenticated);
        }
        Commands::Kv {
            database,
            collection,
            command,
        } => commands::kv::run(&client.kv(&database, &collection), command, format).await?,
        Commands::Object {
            database,
            collection,
            command,
        } => commands::object::run(&client.objects(&database, &collection), command, format).await?,
        Commands::Broker {
            database,
            collection,
            command,
        } => commands::broker::run(&client.broker(&database, &collection), command).await?,
        Commands::Db { command } => commands::registry::run_db(&client.registry(), command, format).await?,
        Commands::Collection { command } => {
            commands::registry::run_collection(&client.registry(), command, format).await?
        }
    }

    client.close().await;
    Ok(())
}
