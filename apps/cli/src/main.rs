//! Sprout CLI - command-line front end for the tutoring engine.
//!
//! Provides a `sprout` command for chatting with the agents, checking their
//! health and inspecting configuration.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{chat, config, health};

/// Sprout - a patient tutor for young learners
#[derive(Parser, Debug)]
#[command(name = "sprout", author, version, about = "Sprout - agent-orchestrated tutoring")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file (overrides SPROUT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with Sprout
    ///
    /// With --message, runs one interaction per message and exits. Without
    /// it, reads one message per line from stdin until EOF or "quit".
    Chat {
        /// Learner ID
        #[arg(long, default_value = "learner")]
        learner: String,

        /// Learner's name
        #[arg(long, default_value = "Friend")]
        name: String,

        /// Learner's age in years
        #[arg(long, default_value_t = 8)]
        age: u8,

        /// Message to send (repeatable)
        #[arg(short, long)]
        message: Vec<String>,
    },

    /// Start the engine, poll every agent once and print the result
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file
    Check {
        /// Path to the TOML file
        path: PathBuf,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Chat { learner, name, age, message } => {
            let engine_config = config::load(args.config.as_deref())?;
            chat::execute(engine_config, &learner, &name, age, message).await?;
        }
        Command::Health { json } => {
            let engine_config = config::load(args.config.as_deref())?;
            health::execute(engine_config, json).await?;
        }
        Command::Config(ConfigCommand::Check { path }) => config::check(&path)?,
        Command::Config(ConfigCommand::Show) => config::show(args.config.as_deref())?,
    }

    Ok(())
}
