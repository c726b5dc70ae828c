//! dbsync command line.
//!
//! Runs the replication daemon in front of one or more databases, and sends
//! commands to a set of daemons, failing unless every replica agrees.
//!
//! # Quick Start
//!
//! ```bash
//! # Generate a key pair for signed requests
//! dbsync keygen --out ./keys --name client
//!
//! # Run a daemon in front of a local redis, accepting only signed requests
//! dbsync daemon -b 0.0.0.0 -p 1111 -s ./keys/client.pub.pem -d redis:127.0.0.1:6379
//!
//! # Send a command to every daemon (new terminal)
//! dbsync send -t 10.0.0.1:1111,10.0.0.2:1111 --sign -k ./keys/client.pem "SET key value"
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

/// dbsync - keeps redundant databases in lockstep.
#[derive(Parser)]
#[command(name = "dbsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding dbsync.toml and dbsync.local.toml.
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon.
    Daemon(DaemonArgs),

    /// Send commands to every target and print the agreed reply.
    Send(SendArgs),

    /// Generate an Ed25519 key pair.
    Keygen {
        /// Directory to write the key pair to (default: user config dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// File name stem: writes NAME.pem and NAME.pub.pem.
        #[arg(short, long, default_value = "dbsync")]
        name: String,

        /// Overwrite existing key files.
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration.
    Config {
        /// Output format (toml, text).
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Flags override the `[daemon]` section of the configuration.
#[derive(Args)]
pub struct DaemonArgs {
    /// Address to listen on.
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Public key (PEM); when given, only signed requests are served.
    #[arg(short = 's', long = "public-key")]
    pub public_key: Option<PathBuf>,

    /// Private key (PEM) used to sign responses.
    #[arg(long)]
    pub signing_key: Option<PathBuf>,

    /// Databases as a comma-separated kind:host:port list.
    #[arg(short = 'd', long = "databases")]
    pub databases: Option<String>,

    /// Keep trusted connections open between requests.
    #[arg(long)]
    pub keepalive: bool,

    /// Connections above this count are closed on accept.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

/// Flags override the `[client]` section of the configuration.
#[derive(Args)]
pub struct SendArgs {
    /// Commands to send, in order.
    #[arg(required = true)]
    pub commands: Vec<String>,

    /// Daemons as a comma-separated host:port list.
    #[arg(short, long)]
    pub targets: Option<String>,

    /// Sign commands with the private key.
    #[arg(long)]
    pub sign: bool,

    /// Private key (PEM) for --sign.
    #[arg(short = 'k', long)]
    pub private_key: Option<PathBuf>,

    /// Public key (PEM) that replies must be signed with.
    #[arg(long)]
    pub verify_key: Option<PathBuf>,

    /// Reuse connections across the given commands.
    #[arg(long)]
    pub keepalive: bool,

    /// Per-target timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print the raw reply payload instead of one line per backend.
    #[arg(long)]
    pub raw: bool,
}

fn main() -> Result<()> {
    // Initialize logging; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(args) => commands::daemon::run(&cli.project_dir, args),
        Commands::Send(args) => commands::send::run(&cli.project_dir, args),
        Commands::Keygen { out, name, force } => commands::keygen::run(out, &name, force),
        Commands::Config { format } => commands::config::show(&cli.project_dir, &format),
    }
}
