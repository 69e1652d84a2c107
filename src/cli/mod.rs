//! CLI module for folio
//!
//! Command-line parsing for the `folio` binary. Uses clap for argument
//! parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// folio - ask questions about your PDFs
///
/// Ingests PDF and text documents page by page into a vector store and
/// answers questions from them with page-level citations.
#[derive(Parser, Debug)]
#[command(
    name = "folio",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "folio - page-aware document question answering",
    long_about = "Ingests PDF and text documents page by page into a pgvector store and answers\n\
                  questions from them with a chat model, citing document and page for every source.",
    after_help = "EXAMPLES:\n    \
                  folio init                                  # Write a default folio.toml\n    \
                  folio ingest q3.pdf --name q3-report        # Chunk, embed and store a PDF\n    \
                  folio ingest q3.pdf --name q3-report --replace\n    \
                  folio list                                  # Show stored documents\n    \
                  folio ask                                   # Interactive: pick documents, ask away\n    \
                  folio ask \"What drove margin?\" --docs q3-report"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "folio.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default folio.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files without prompting
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a PDF or text file
    Ingest {
        /// File to ingest (.pdf, or text with form-feed page breaks)
        path: PathBuf,

        /// Document name (defaults to the file name without extension)
        #[arg(short, long)]
        name: Option<String>,

        /// Replace the stored chunks of an existing document instead of appending
        #[arg(long)]
        replace: bool,
    },

    /// List stored documents
    List,

    /// Ask a question about stored documents
    ///
    /// Without --docs, shows a numbered document menu. Without a question,
    /// keeps asking until you type 'exit' or 'quit'.
    Ask {
        /// The question (omit for an interactive session)
        question: Option<String>,

        /// Documents to search, comma separated
        #[arg(short, long, value_delimiter = ',')]
        docs: Vec<String>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Delete a document and all its chunks
    Delete {
        /// Document name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show configuration information
    Config {
        /// Show the full configuration
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file and required environment variables
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
