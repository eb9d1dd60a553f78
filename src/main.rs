//! # Resume RAG CLI (`rrag`)
//!
//! ## Usage
//!
//! ```bash
//! rrag --config ./config/rrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rrag serve` | Watch the upload directory and serve HTTP/WebSocket |
//! | `rrag convert <file>` | Extract one resume into a record file |
//! | `rrag ask "<question>"` | Answer one question over stored records |
//! | `rrag chunks` | Chunking dry run over stored records |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use resume_rag::{commands, config, logging};

/// Resume RAG: live resume ingestion and grounded question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rrag",
    about = "Resume RAG: live resume ingestion and grounded question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the upload directory and start the HTTP/WebSocket server.
    ///
    /// Stored records are loaded first, uploads made while the service was
    /// down are ingested, then the first snapshot is built in the background.
    Serve,

    /// Extract a PDF or Word resume into a record file.
    ///
    /// Works without a config file.
    Convert {
        /// Input `.pdf`, `.doc`, or `.docx` file.
        file: PathBuf,

        /// Record output directory. Defaults to `[paths].record_dir`, or
        /// `./csv_files` when no config file is present.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Answer one question over the stored records and exit.
    Ask {
        /// The question.
        question: String,
    },

    /// Chunk stored records and print counts without embedding.
    Chunks {
        /// Override `[chunking].chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Convert { file, out } = &cli.command {
        let out_dir = match out {
            Some(dir) => dir.clone(),
            None => config::load_config(&cli.config)
                .map(|cfg| cfg.paths.record_dir)
                .unwrap_or_else(|_| {
                    config::Config::minimal(std::path::Path::new(".")).paths.record_dir
                }),
        };
        commands::run_convert(file, &out_dir)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            commands::run_serve(cfg).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(cfg, &question).await?;
        }
        Commands::Chunks { chunk_size } => {
            commands::run_chunks(&cfg, chunk_size)?;
        }
        Commands::Convert { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
