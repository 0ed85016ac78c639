//! # kbqa CLI
//!
//! The `kbqa` binary browses a remote knowledge base and asks questions
//! about its files.
//!
//! ## Usage
//!
//! ```bash
//! kbqa --config ./config/kbqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbqa files [--search TERM]` | Ranked file list, bookmarks first |
//! | `kbqa bookmark <name>` | Toggle a bookmark |
//! | `kbqa bookmarks` | List bookmarks |
//! | `kbqa ask <file> "<question>"` | Ask one question about one file |
//! | `kbqa chat [file]` | Interactive session |
//! | `kbqa search "<query>"` | Search content across the knowledge base |
//!
//! ## Examples
//!
//! ```bash
//! # Point at a backend without a config file
//! KBQA_BACKEND_URL=http://localhost:8000 kbqa files
//!
//! # Filter by name
//! kbqa files --search policy
//!
//! # One-shot answer, no streaming
//! kbqa ask handbook.txt "How many leave days?" --no-stream
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use kbqa::progress::ProgressMode;
use kbqa::{ask, bookmark_cmd, chat, config, files, search};

/// kbqa: question answering over a remote knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means defaults; `KBQA_BACKEND_URL` overrides the
/// backend address.
#[derive(Parser)]
#[command(
    name = "kbqa",
    about = "Question answering over a remote knowledge base",
    version,
    long_about = "kbqa lists the files a knowledge-base backend exposes, keeps local bookmarks, \
    opens a backend session for one file at a time, and asks questions about it, printing \
    streamed answers as they arrive."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbqa.toml")]
    config: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace). `KBQA_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List knowledge-base files.
    ///
    /// Bookmarked files come first; at most four files are shown.
    Files {
        /// Case-insensitive substring filter on file names.
        #[arg(long)]
        search: Option<String>,
    },

    /// Toggle a bookmark on a file.
    Bookmark {
        /// File name as listed by `kbqa files` (with extension).
        name: String,
    },

    /// List bookmarked files.
    Bookmarks,

    /// Ask one question about one file.
    ///
    /// Opens a backend session for FILE, prints the answer as it arrives,
    /// and clears the session afterwards. Ctrl-C aborts the answer.
    Ask {
        /// File name (with extension).
        file: String,

        /// The question.
        question: String,

        /// Wait for the complete answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// Phase reporting on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Interactive question session.
    ///
    /// Lines are questions; `/open NAME`, `/stream on|off`, `/clear` and
    /// `/quit` control the session.
    Chat {
        /// File to open first.
        file: Option<String>,

        /// Phase reporting on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search file contents across the knowledge base.
    Search {
        /// The search query string.
        query: String,
    },

    /// Generate shell completions.
    #[command(hide = true)]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("KBQA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "kbqa", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Files { search } => {
            files::run_files(&cfg, search).await?;
        }
        Commands::Bookmark { name } => {
            bookmark_cmd::run_bookmark(&cfg, &name)?;
        }
        Commands::Bookmarks => {
            bookmark_cmd::run_bookmarks(&cfg)?;
        }
        Commands::Ask {
            file,
            question,
            no_stream,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let streaming = cfg.session.streaming && !no_stream;
            ask::run_ask(&cfg, &file, &question, streaming, progress).await?;
        }
        Commands::Chat { file, progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            chat::run_chat(&cfg, file, progress).await?;
        }
        Commands::Search { query } => {
            search::run_search(&cfg, &query).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
