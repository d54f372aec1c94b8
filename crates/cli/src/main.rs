//! evidex CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default `evidex.toml`
//! - `config`: Show or validate the effective configuration
//! - `doctor`: Check chunk files, Ollama and Chroma
//! - `context`: Render chunk files under a budget
//! - `budget`: Estimate the character budget of a model
//! - `usage`: Analyze a rendered prompt file
//! - `index`: Embed chunk files into vector-store collections
//! - `retrieve`: Query collections and print evidence
//! - `run`: Run a generation pipeline and write its artifacts

use clap::{Parser, Subcommand};
use evidex_config::AppConfig;
use std::path::PathBuf;

mod artifacts;
mod commands;

use commands::{ContextArgs, IndexArgs, RetrieveArgs, RunCommand};

#[derive(Parser)]
#[command(
    name = "evidex",
    about = "evidex: budgeted evidence context for LLM pipelines",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ./evidex.toml)
    #[arg(short, long, global = true, env = "EVIDEX_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default evidex.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Config {
        /// Only validate, print nothing on success
        #[arg(long)]
        check: bool,
    },

    /// Check chunk files and service connectivity
    Doctor,

    /// Render chunk files into a budgeted context block
    Context(ContextArgs),

    /// Estimate the usable context budget for a model
    Budget {
        /// Model name (defaults to the configured LLM model)
        #[arg(short, long)]
        model: Option<String>,

        /// Use this token window instead of the model table
        #[arg(long)]
        max_tokens: Option<usize>,

        /// List every known model window
        #[arg(long)]
        list: bool,
    },

    /// Analyze a rendered prompt or context file
    Usage {
        /// File to analyze
        file: PathBuf,

        /// Model name (defaults to the configured LLM model)
        #[arg(short, long)]
        model: Option<String>,

        /// Use this token window instead of the model table
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Print the stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed chunk files into vector-store collections
    Index(IndexArgs),

    /// Query collections and print the merged evidence
    Retrieve(RetrieveArgs),

    /// Run a generation pipeline
    Run {
        #[command(subcommand)]
        pipeline: RunCommand,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(evidex_config::CONFIG_FILE_NAME));

    // `init` must work even when the existing file is broken
    if let Commands::Init { force } = cli.command {
        init_tracing(cli.verbose, cli.log_json, "info");
        return commands::init::run(&config_path, force).await;
    }

    let config = AppConfig::load_with_env(&config_path)?;
    init_tracing(cli.verbose, cli.log_json || config.logging.json, &config.logging.level);

    match cli.command {
        Commands::Init { force } => commands::init::run(&config_path, force).await?,
        Commands::Config { check } => commands::config_cmd::run(&config, &config_path, check).await?,
        Commands::Doctor => commands::doctor::run(&config).await?,
        Commands::Context(args) => commands::context::run(&config, args).await?,
        Commands::Budget {
            model,
            max_tokens,
            list,
        } => commands::budget::run(&config, model, max_tokens, list).await?,
        Commands::Usage {
            file,
            model,
            max_tokens,
            json,
        } => commands::usage::run(&config, &file, model, max_tokens, json).await?,
        Commands::Index(args) => commands::index::run(&config, args).await?,
        Commands::Retrieve(args) => commands::retrieve::run(&config, args).await?,
        Commands::Run { pipeline } => commands::run::run(&config, pipeline).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool, level: &str) {
    let filter = if verbose { "debug" } else { level };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
