//! CLI binary for doc2tree.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one document through the pipeline, and prints the
//! resulting summary or full JSON snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use doc2tree::{
    MemoryStore, OpenAiReasoning, PdfExtractor, Pipeline, PipelineConfig, ProcessingStatus,
    ResultStore,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a PDF, print the summary
  doc2tree invoice.pdf

  # Full result snapshot as JSON
  doc2tree --json invoice.pdf > result.json

  # Persist snapshots to a directory
  doc2tree --storage-dir ./results invoice.pdf

  # Offline mode: skip reasoning-service enhancement even with a key set
  doc2tree --no-enhance invoice.pdf

  # Stricter validation threshold
  doc2tree --threshold 0.85 invoice.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY        Enables reasoning-service enhancement when set
  DOC2TREE_BASE_URL     OpenAI-compatible endpoint (proxies, local servers)
  DOC2TREE_MODEL        Override the reasoning model ID

SETUP:
  Extraction, validation and storage are fully local; no key is required.
  Set OPENAI_API_KEY to add structure enhancement and second-opinion
  confidence scoring on top of the local results.
"#;

/// Extract a validated, visually-grounded element tree from a document.
#[derive(Parser, Debug)]
#[command(
    name = "doc2tree",
    version,
    about = "Extract a validated, visually-grounded element tree from a document",
    long_about = "Process a document through the doc2tree pipeline: parse, build the \
page/element tree, validate confidences, attach highlight styling, and store the result. \
An OpenAI-compatible reasoning service, when configured, refines structure and confidence \
scores; without one the pipeline runs fully offline.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the source document (.pdf).
    input: PathBuf,

    /// Mirror result snapshots to this directory as JSON files.
    #[arg(short, long, env = "DOC2TREE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Confidence threshold for the validated flag (0.0–1.0).
    #[arg(long, env = "DOC2TREE_THRESHOLD", default_value_t = 0.7)]
    threshold: f64,

    /// Reasoning model ID.
    #[arg(long, env = "DOC2TREE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// OpenAI-compatible endpoint base URL.
    #[arg(long, env = "DOC2TREE_BASE_URL")]
    base_url: Option<String>,

    /// Skip reasoning-service enhancement even when an API key is set.
    #[arg(long, env = "DOC2TREE_NO_ENHANCE")]
    no_enhance: bool,

    /// Print the full result snapshot as JSON instead of the summary.
    #[arg(long, env = "DOC2TREE_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2TREE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2TREE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and collaborators ───────────────────────────────────
    let config = PipelineConfig::builder()
        .confidence_threshold(cli.threshold)
        .model(&cli.model)
        .build()
        .context("Invalid configuration")?;

    let store: Arc<MemoryStore> = match &cli.storage_dir {
        Some(dir) => Arc::new(
            MemoryStore::with_storage_dir(dir)
                .await
                .with_context(|| format!("Failed to open storage directory {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let enhancer = if cli.no_enhance {
        None
    } else {
        build_service(&cli, &config)?.map(|service| doc2tree::Enhancer::new(service, config.clone()))
    };
    if enhancer.is_none() && !cli.quiet {
        eprintln!("{}", dim("Running offline: no reasoning-service enhancement"));
    }

    let pipeline = Pipeline::new(Arc::new(PdfExtractor::new()), store.clone(), enhancer, config);

    // ── Process ──────────────────────────────────────────────────────────
    let filename = cli
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .context("Input path has no usable filename")?
        .to_string();

    let transaction_id = pipeline
        .process(&cli.input, &filename)
        .await
        .context("Processing failed before a transaction was created")?;

    let result = store
        .get(&transaction_id)
        .await
        .context("Failed to read back the result")?
        .context("Result vanished from the store")?;

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(json.as_bytes())?;
        handle.write_all(b"\n").ok();
    } else if !cli.quiet {
        let summary = result
            .structured_data
            .as_ref()
            .and_then(|d| d.get("summary"));
        let validated = summary
            .and_then(|s| s.get("validated_elements"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        match result.status {
            ProcessingStatus::Completed => {
                eprintln!(
                    "{} {}  {} elements on {} page(s), {} validated",
                    green("✔"),
                    bold(&transaction_id),
                    result.extracted_elements.len(),
                    result.metadata.page_count,
                    validated,
                );
            }
            ProcessingStatus::Failed => {
                eprintln!(
                    "{} {}  {}",
                    red("✘"),
                    bold(&transaction_id),
                    red(result.error_message.as_deref().unwrap_or("unknown error")),
                );
                std::process::exit(1);
            }
            other => {
                eprintln!("{} {}  unexpected final status: {other}", red("✘"), transaction_id);
                std::process::exit(1);
            }
        }
        for line in &result.processing_log {
            eprintln!("   {}", dim(line));
        }
    }

    if result.status == ProcessingStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Build the optional reasoning-service client from flags and environment.
fn build_service(
    cli: &Cli,
    config: &PipelineConfig,
) -> Result<Option<Arc<dyn doc2tree::ReasoningService>>> {
    let Ok(key) = std::env::var("OPENAI_API_KEY") else {
        return Ok(None);
    };
    if key.is_empty() {
        return Ok(None);
    }
    let service = match &cli.base_url {
        Some(base_url) => OpenAiReasoning::with_base_url(key, base_url, config),
        None => OpenAiReasoning::new(key, config),
    }
    .context("Failed to build reasoning-service client")?;
    Ok(Some(Arc::new(service)))
}
