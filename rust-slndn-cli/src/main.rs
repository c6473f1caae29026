use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;

mod commands;

/// Self-learning NDN forwarder daemon
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forwarder
    Run {
        /// UDP address to bind
        #[clap(short, long, default_value = "0.0.0.0:6363")]
        listen: SocketAddr,

        /// UDP multicast group joined for discovery flooding
        #[clap(short, long)]
        group: Option<SocketAddr>,

        /// Prefixes produced on this node, announced to discovering peers
        #[clap(short, long)]
        announce: Vec<String>,

        /// Content store capacity (Data packets)
        #[clap(long, default_value = "4096")]
        cs_capacity: usize,
    },

    /// List the forwarding strategies this build registers
    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    match cli.command {
        Commands::Run {
            listen,
            group,
            announce,
            cs_capacity,
        } => {
            commands::run::run(commands::run::RunOptions {
                listen,
                group,
                announce,
                cs_capacity,
            })
            .await?;
        }
        Commands::Strategies => {
            for name in rust_slndn_fwd::strategy::default_registry().names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
