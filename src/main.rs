use anyhow::{Context, Result};
use folio::cli::init::{self, InitConfig, InitResult};
use folio::cli::output::Output;
use folio::cli::{Cli, Commands};
use folio::rag::parse_selection;
use folio::utils::toml_config::{ConfigError, FolioConfig, LoggingConfig, StoreBackend};
use folio::{AppError, Folio};
use owo_colors::OwoColorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Commands::Init { path, force } = &cli.command {
        let init_config = InitConfig {
            path: path.clone(),
            force: *force,
        };
        return match init::run(init_config, &output) {
            InitResult::Success | InitResult::AlreadyExists => Ok(()),
            InitResult::Error(e) => Err(anyhow::anyhow!(e)),
        };
    }

    let config = match FolioConfig::load(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound(path)) => {
            output.error(&format!("Configuration file not found: {}", path.display()));
            output.hint("Create one with:");
            output.command("folio init");
            anyhow::bail!("missing configuration");
        }
        Err(e) => return Err(e).context(format!("loading {}", cli.config.display())),
    };

    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config { full, validate } => {
            show_config(&config, &cli.config, full, validate, &output)
        }
        Commands::Ingest {
            path,
            name,
            replace,
        } => {
            if !path.is_file() {
                anyhow::bail!("{} is not a readable file", path.display());
            }
            let folio = connect(config).await?;
            let name = match name {
                Some(name) => name,
                None => default_document_name(&path)?,
            };

            let report = if replace {
                folio.reingest(&path, &name, true).await?
            } else {
                folio.ingest(&path, &name).await?
            };
            output.ingest_report(&report);
            if report.chunks == 0 {
                output.warning("No text was extracted; the document has no searchable chunks");
            }
            Ok(())
        }
        Commands::List => {
            let folio = connect(config).await?;
            let documents = folio.list_documents().await?;
            if documents.is_empty() {
                output.info("No documents ingested yet");
                output.command("folio ingest <file.pdf> --name <name>");
            } else {
                output.header("Documents");
                output.document_menu(&documents);
            }
            Ok(())
        }
        Commands::Delete { name, yes } => {
            let folio = connect(config).await?;
            if !yes && !output.confirm(&format!("Delete '{}' and all its chunks?", name)) {
                output.info("Cancelled");
                return Ok(());
            }
            let deleted = folio.delete_document(&name).await?;
            if deleted == 0 {
                output.warning(&format!("No chunks stored for '{}'", name));
            } else {
                output.success(&format!("Deleted {} chunks of '{}'", deleted, name));
            }
            Ok(())
        }
        Commands::Ask {
            question,
            docs,
            top_k,
        } => {
            let folio = connect(config).await?;
            let selection = if docs.is_empty() {
                select_documents(&folio, &output).await?
            } else {
                docs
            };

            match question {
                Some(question) => {
                    let answer = folio.ask(&question, &selection, top_k).await?;
                    output.answer(&answer);
                }
                None => ask_loop(&folio, &selection, top_k, &output).await,
            }
            Ok(())
        }
    }
}

/// The CLI runs one command per process, so only a persistent store is usable.
fn require_persistent_store(config: &FolioConfig) -> folio::Result<()> {
    if config.database.backend == StoreBackend::Memory {
        return Err(AppError::Configuration(
            "the memory store does not persist between runs; set [database] backend = \"postgres\""
                .to_string(),
        ));
    }
    Ok(())
}

async fn connect(config: FolioConfig) -> Result<Folio> {
    require_persistent_store(&config)?;
    let folio = Folio::from_config(config).await?;

    let cancel = folio.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    Ok(folio)
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("folio=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("folio={},warn", config.level)))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (e.g. in tests) is harmless
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn default_document_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a document name from {}", path.display()))
}

/// Show the numbered menu and read a comma-separated selection.
async fn select_documents(folio: &Folio, output: &Output) -> Result<Vec<String>> {
    let documents = folio.list_documents().await?;
    if documents.is_empty() {
        anyhow::bail!("no documents ingested yet; run 'folio ingest' first");
    }

    output.header("Available documents");
    output.document_menu(&documents);

    loop {
        let Some(input) = output.prompt("Select documents (e.g. 1,3):") else {
            anyhow::bail!("no documents selected");
        };
        match parse_selection(&input, &documents) {
            Ok(selection) => return Ok(selection),
            Err(e) => output.error(&e.to_string()),
        }
    }
}

/// Ask questions until `exit`, `quit` or end of input.
async fn ask_loop(folio: &Folio, selection: &[String], top_k: Option<usize>, output: &Output) {
    output.info(&format!("Asking about: {}", selection.join(", ")));
    output.hint("Type 'exit' or 'quit' to stop");

    while let Some(question) = output.prompt("Question:") {
        if matches!(question.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match folio.ask(&question, selection, top_k).await {
            Ok(answer) => output.answer(&answer),
            Err(AppError::Cancelled) => {
                output.warning("Cancelled");
                break;
            }
            Err(e) => output.error(&e.to_string()),
        }
    }
}

fn show_config(
    config: &FolioConfig,
    path: &Path,
    full: bool,
    validate: bool,
    output: &Output,
) -> Result<()> {
    if validate {
        config.validate()?;
        require_persistent_store(config)?;
        output.success(&format!("{} is valid", path.display()));
        match config.validate_env() {
            Ok(()) => output.success("Required environment variables are set"),
            Err(e) => {
                output.error(&e.to_string());
                return Err(e.into());
            }
        }
    }

    if full {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv("embedding model", &config.embedding.model);
    output.kv("dimensions", &config.embedding.dimensions.to_string());
    output.kv("metric", &config.embedding.metric);
    output.kv("chat model", &config.chat.model);
    output.kv("store", &format!("{:?}", config.database.backend).to_lowercase());
    output.kv("table", &config.database.table);
    output.kv("chunk size", &config.rag.chunk_size.to_string());
    output.kv("top k", &config.rag.top_k.to_string());
    Ok(())
}
