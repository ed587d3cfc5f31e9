//! Raiox CLI - Offline inspection of X-ray implant embeddings.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use raiox_core::{EmbedderConfig, EmbedderFactory, DEFAULT_RESULT_LIMIT};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Invalid arguments
  65  Input is not a decodable image
  66  Input file cannot be read
  70  Embedding model failure";

/// Output format for command results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// Machine-readable JSON on stdout
    Json,
}

/// Embedding backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Grid descriptor computed from decoded pixels
    Raster,
    /// Deterministic hash vectors (testing only)
    Mock,
}

impl From<Backend> for EmbedderConfig {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Raster => EmbedderConfig::Raster,
            Backend::Mock => EmbedderConfig::Mock { seed: 0 },
        }
    }
}

#[derive(Parser)]
#[command(name = "raiox")]
#[command(author, version, about = "X-ray implant embedding inspection", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Embedding backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Raster)]
    backend: Backend,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the embedding of an image
    Embed {
        /// Path to the image
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Compare two images by cosine similarity
    Compare {
        /// First image
        #[arg(value_name = "A")]
        a: PathBuf,

        /// Second image
        #[arg(value_name = "B")]
        b: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Rank reference images by similarity to a query image
    Rank {
        /// Query image
        #[arg(value_name = "QUERY")]
        query: PathBuf,

        /// Reference images; the parent directory name is used as manufacturer
        #[arg(value_name = "REFERENCE", required = true)]
        references: Vec<PathBuf>,

        /// Number of matches to report
        #[arg(short, long, default_value_t = DEFAULT_RESULT_LIMIT)]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "raiox_cli={default_level},raiox_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let embedder = EmbedderFactory::create(cli.backend.into())?;
    let embedder = embedder.as_ref();

    match cli.command {
        Commands::Embed { file, format } => {
            commands::embed::execute(embedder, file, format, cli.quiet)
        }
        Commands::Compare { a, b, format } => {
            commands::compare::execute(embedder, a, b, format, cli.quiet)
        }
        Commands::Rank {
            query,
            references,
            limit,
            format,
        } => commands::rank::execute(embedder, query, references, limit, format, cli.quiet),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
