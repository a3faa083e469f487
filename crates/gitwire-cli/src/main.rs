//! Gitwire CLI - talk to git servers over the smart protocols.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use logging::LogFormat;

/// Gitwire - git transport client
#[derive(Parser, Debug)]
#[command(name = "gitwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,

    /// Transport configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// HTTP user name
    #[arg(long, global = true)]
    user: Option<String>,

    /// HTTP password (used with --user)
    #[arg(long, global = true)]
    password: Option<String>,

    /// HTTP bearer token
    #[arg(long, global = true, conflicts_with = "user")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the references a remote advertises
    LsRemote {
        /// Repository URL
        url: String,
        /// List the receive-pack advertisement instead
        #[arg(long)]
        push: bool,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a pack from a remote
    FetchPack {
        /// Repository URL
        url: String,
        /// Object id or reference name to fetch
        #[arg(long = "want", required = true)]
        wants: Vec<String>,
        /// Object id the local repository already has
        #[arg(long = "have")]
        haves: Vec<String>,
        /// Limit history depth
        #[arg(long)]
        depth: Option<u32>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Update references on a remote
    SendPack {
        /// Repository URL
        url: String,
        /// Update as <old>:<new>:<ref>
        #[arg(long = "update", required = true)]
        updates: Vec<String>,
        /// Pack file with the new objects
        #[arg(long)]
        pack: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.verbose), cli.log_format);

    let result = commands::Context::new(
        cli.config.as_deref(),
        cli.user,
        cli.password,
        cli.token,
    )
    .and_then(|ctx| match cli.command {
        Commands::LsRemote { url, push, json } => ctx.ls_remote(&url, push, json),
        Commands::FetchPack {
            url,
            wants,
            haves,
            depth,
            output,
        } => ctx.fetch_pack(&url, &wants, &haves, depth, output.as_deref()),
        Commands::SendPack { url, updates, pack } => {
            ctx.send_pack(&url, &updates, pack.as_deref())
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
