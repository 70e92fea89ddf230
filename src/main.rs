use anyhow::Result;
use atlas::config::{Backend, ReductionMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Map a folder of labeled images into a browsable 2D/3D embedding plot", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./atlas.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered images and their labels, reporting unreadable files
    Catalog {
        /// Image root directory
        #[arg(long)]
        root: Option<String>,

        /// Stop after this many images
        #[arg(long)]
        max_images: Option<usize>,

        /// Skip decoding every image
        #[arg(long)]
        no_validate: bool,
    },

    /// Run the full pipeline and write the embedding table
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Drive a viewing session over a table from stdin, one event per line
    Browse {
        /// Embedding table to load (defaults to the configured output)
        table: Option<PathBuf>,

        /// Images shown per page
        #[arg(long)]
        page_size: Option<usize>,
    },
}

/// Overrides for the configured pipeline settings
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Image root directory
    #[arg(long)]
    pub root: Option<String>,

    /// Stop discovery after this many images
    #[arg(long)]
    pub max_images: Option<usize>,

    /// Images per embedding batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output dimensions (2 or 3)
    #[arg(long)]
    pub components: Option<usize>,

    /// Reduction strategy
    #[arg(long, value_enum)]
    pub mode: Option<ReductionMode>,

    /// Rows per partial fit in incremental mode
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Embedding backend
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// ONNX model file
    #[arg(long)]
    pub model: Option<String>,

    /// Where to write the table
    #[arg(long, short)]
    pub output: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; browse writes frames to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Catalog {
            root,
            max_images,
            no_validate,
        } => {
            commands::catalog::execute(config, root, max_images, !no_validate)?;
        }
        Commands::Build { args } => {
            commands::build::execute(config, args)?;
        }
        Commands::Browse { table, page_size } => {
            commands::browse::execute(config, table, page_size)?;
        }
    }

    Ok(())
}
