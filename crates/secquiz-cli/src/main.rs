//! secquiz CLI — play the quiz and inspect recorded attempts.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "secquiz", version, about = "Timed security-awareness quiz")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take the quiz in the terminal
    Play {
        /// Who is playing (recorded with the attempt)
        #[arg(long)]
        user: String,

        /// Question bank TOML (default: configured bank, else the built-in one)
        #[arg(long)]
        bank: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for reproducible question order
        #[arg(long)]
        seed: Option<u64>,

        /// Number of questions (overrides the config)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Validate question bank TOML files
    Validate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Show attempt statistics from the configured recorder
    Stats {
        /// Only attempts by this user
        #[arg(long)]
        user: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Also save the report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Create starter config and example question bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("secquiz=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Play {
            user,
            bank,
            config,
            seed,
            count,
        } => commands::play::execute(user, bank, config, seed, count).await,
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Stats {
            user,
            config,
            format,
            output,
        } => commands::stats::execute(user, config, format, output).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
