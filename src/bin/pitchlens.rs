//! CLI binary for pitchlens.
//!
//! A thin shim over the library crate: maps flags onto `PipelineConfig`,
//! drives the orchestrator against a filesystem store and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pitchlens::{
    process_stream, AuditStatus, Document, DocumentStatus, FsStore, LlmGateway, Orchestrator,
    OutputBundle, PipelineConfig, PipelineError, PipelineObserver, SharedObserver,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// One spinner per document run, labelled with the current stage.
struct CliObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn with_bar(&self, id: &str, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bars().get(id) {
            f(bar);
        }
    }
}

impl PipelineObserver for CliObserver {
    fn on_run_start(&self, document_id: &str, filename: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix(filename.to_string());
        bar.set_message("queued");
        bar.enable_steady_tick(Duration::from_millis(80));
        self.bars().insert(document_id.to_string(), bar);
    }

    fn on_stage_start(&self, document_id: &str, stage: &str) {
        self.with_bar(document_id, |b| b.set_message(format!("{stage}…")));
    }

    fn on_stage_degraded(&self, document_id: &str, stage: &str, cause: &str) {
        let cause = truncate(cause, 80);
        self.with_bar(document_id, |b| {
            b.println(format!("  {} {stage} degraded: {}", yellow("⚠"), dim(&cause)))
        });
    }

    fn on_stage_failed(&self, document_id: &str, stage: &str, error: &str) {
        let error = truncate(error, 80);
        self.with_bar(document_id, |b| {
            b.println(format!("  {} {stage} failed: {}", red("✗"), red(&error)))
        });
    }

    fn on_run_complete(&self, document_id: &str, confidence: Option<f64>) {
        if let Some(bar) = self.bars().remove(document_id) {
            let prefix = bar.prefix();
            bar.finish_and_clear();
            match confidence {
                Some(c) => {
                    let _ = self.multi.println(format!(
                        "{} {}  confidence {}",
                        green("✔"),
                        bold(&prefix),
                        dim(&format!("{c:.2}"))
                    ));
                }
                None => {
                    let _ = self.multi.println(format!("{} {}", red("✘"), bold(&prefix)));
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse one deck with the default hosted model (Gemini)
  pitchlens analyze deck.pdf

  # Several decks, four at a time, JSON bundles on stdout
  pitchlens analyze --json --concurrency 4 a.pdf b.pptx c.pdf > results.json

  # Local model server
  pitchlens analyze --provider ollama --model llama3.1:8b deck.pptx

  # Inspect stored runs
  pitchlens list
  pitchlens status <DOCUMENT_ID>
  pitchlens audit <DOCUMENT_ID>

ENVIRONMENT VARIABLES:
  LLM_PROVIDER            gemini (default), openai, anthropic, mistral, ollama
  LLM_MODEL               Hosted model ID (default gemini-2.0-flash)
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  OLLAMA_URL              Local server URL (default http://localhost:11434)
  OLLAMA_MODEL            Local model (default llama3.1:8b)
  OLLAMA_TIMEOUT_SECS     Local call timeout (default 120)
  MAX_FILE_SIZE_MB        Upload limit (default 50)
  PITCHLENS_STORE         Store directory (default ./pitchlens-data)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

A .env file in the working directory is loaded when present.
"#;

/// Extract investment data and signals from pitch decks using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pitchlens",
    version,
    about = "Extract investment data and signals from pitch decks using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Store directory for documents, results and audit trails.
    #[arg(long, global = true, env = "PITCHLENS_STORE", default_value = "pitchlens-data")]
    store: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PITCHLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PITCHLENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest and process one or more decks.
    Analyze(AnalyzeArgs),
    /// Show a document's status and latest result summary.
    Status {
        /// Document identifier.
        id: String,
        /// Print the document and latest result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print a document's audit trail.
    Audit {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List every stored document.
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// PDF or PPTX files.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print result bundles as JSON instead of a summary.
    #[arg(long, env = "PITCHLENS_JSON")]
    json: bool,

    /// LLM provider: gemini, openai, anthropic, mistral, ollama.
    #[arg(long)]
    provider: Option<String>,

    /// Model ID for the selected provider.
    #[arg(long)]
    model: Option<String>,

    /// Local model server URL, used when the provider is ollama.
    #[arg(long)]
    ollama_url: Option<String>,

    /// Documents processed at once.
    #[arg(short, long, env = "PITCHLENS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Upload size limit in MB.
    #[arg(long)]
    max_file_size_mb: Option<u64>,

    /// Disable progress spinners.
    #[arg(long, env = "PITCHLENS_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = match &cli.command {
        Command::Analyze(a) => !cli.quiet && !a.no_progress && !a.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(
        FsStore::open(&cli.store)
            .await
            .with_context(|| format!("Failed to open store at {}", cli.store.display()))?,
    );

    match &cli.command {
        Command::Analyze(args) => analyze(&cli, args, store, show_progress).await,
        Command::Status { id, json } => status(store, id, *json).await,
        Command::Audit { id, json } => audit(store, id, *json).await,
        Command::List { json } => list(store, *json).await,
    }
}

/// Map CLI args over the environment and build the config.
fn build_config(args: &AnalyzeArgs) -> Result<PipelineConfig> {
    let local = args
        .provider
        .clone()
        .or_else(|| std::env::var("LLM_PROVIDER").ok())
        .map(|p| matches!(p.trim().to_ascii_lowercase().as_str(), "ollama" | "local"))
        .unwrap_or(false);
    let lookup = |key: &str| -> Option<String> {
        let flag = match key {
            "LLM_PROVIDER" => args.provider.clone(),
            "LLM_MODEL" if !local => args.model.clone(),
            "OLLAMA_MODEL" if local => args.model.clone(),
            "OLLAMA_URL" => args.ollama_url.clone(),
            "MAX_FILE_SIZE_MB" => args.max_file_size_mb.map(|m| m.to_string()),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    };
    let base = PipelineConfig::from_lookup(lookup).context("Invalid configuration")?;
    PipelineConfig::builder()
        .max_upload_bytes(base.max_upload_bytes)
        .backend(base.backend)
        .concurrency(args.concurrency)
        .build()
        .context("Invalid configuration")
}

// ── analyze ──────────────────────────────────────────────────────────────────

async fn analyze(
    cli: &Cli,
    args: &AnalyzeArgs,
    store: Arc<FsStore>,
    show_progress: bool,
) -> Result<()> {
    let config = build_config(args)?;
    let gateway = LlmGateway::from_config(&config).context("Failed to set up the LLM backend")?;
    let mut orch = Orchestrator::new(store, gateway, config);
    if show_progress {
        orch = orch.with_observer(CliObserver::new() as SharedObserver);
    }

    let mut ids = Vec::new();
    let mut rejected = 0usize;
    for path in &args.files {
        match ingest_file(&orch, path).await {
            Ok(doc) => ids.push(doc.id),
            Err(e) => {
                rejected += 1;
                eprintln!("{} {}: {:#}", red("✘"), path.display(), e);
            }
        }
    }

    let mut bundles: Vec<OutputBundle> = Vec::new();
    let mut failed = 0usize;
    let mut reports = process_stream(&orch, ids);
    while let Some(report) = reports.next().await {
        match report.outcome {
            Ok(bundle) => {
                if !args.json && !cli.quiet {
                    print_summary(&bundle);
                }
                bundles.push(bundle);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", red("✘"), report.document_id, e);
            }
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&bundles).context("Failed to serialise results")?
        );
    }
    if !cli.quiet {
        eprintln!(
            "{} {} completed, {} failed, {} rejected",
            if failed + rejected == 0 { green("✔") } else { yellow("⚠") },
            bundles.len(),
            failed,
            rejected
        );
    }
    if bundles.is_empty() && (failed + rejected) > 0 {
        anyhow::bail!("no document was processed successfully");
    }
    Ok(())
}

async fn ingest_file(orch: &Orchestrator, path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(orch.ingest(&bytes, &filename).await?)
}

fn print_summary(bundle: &OutputBundle) {
    let meta = &bundle.document_metadata;
    let rec = &bundle.investment_analysis.investment_recommendation;
    println!("{}  {}", bold(&meta.filename), dim(&meta.document_id));
    println!("  Slides:          {}", meta.total_slides);
    println!(
        "  Sections:        {}",
        bundle.classification.section_map.sections_found()
    );
    println!("  Confidence:      {:.2}", bundle.confidence.overall);
    if let Some(name) = &bundle.extracted_data.company.name {
        println!("  Company:         {name}");
    }
    match rec.recommendation {
        Some(r) => println!("  Recommendation:  {}", r.as_str()),
        None => println!("  Recommendation:  {}", dim("n/a")),
    }
    if let Some(score) = rec.overall_score {
        println!("  Score:           {score:.0}/100");
    }
    let signals = &bundle.investment_analysis.investment_signals;
    println!(
        "  Flags:           {} green, {} red, {} yellow",
        signals.green_flags.len(),
        signals.red_flags.len(),
        signals.yellow_flags.len()
    );
    if let Some(err) = &bundle.investment_analysis.error {
        println!("  {} analysis unavailable: {}", yellow("⚠"), truncate(err, 100));
    }
}

// ── status / audit / list ────────────────────────────────────────────────────

fn reader(store: Arc<FsStore>) -> Orchestrator {
    // Read-only commands never call the model; the scripted backend is inert.
    let gateway = LlmGateway::new(Arc::new(pitchlens::ScriptedBackend::new(Vec::<String>::new())));
    Orchestrator::new(store, gateway, PipelineConfig::default())
}

fn not_found_hint(e: PipelineError) -> anyhow::Error {
    match e {
        PipelineError::NotFound { .. } => {
            anyhow::anyhow!("{e}. Run `pitchlens list` to see stored documents.")
        }
        other => other.into(),
    }
}

async fn status(store: Arc<FsStore>, id: &str, json: bool) -> Result<()> {
    let orch = reader(store);
    let doc = orch.document(id).await.map_err(not_found_hint)?;
    let latest = orch.latest_result(id).await?;

    if json {
        let out = serde_json::json!({"document": doc, "latest_result": latest});
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Document:     {}", doc.id);
    println!("File:         {} ({} bytes, {})", doc.filename, doc.size_bytes, doc.file_type);
    println!("Status:       {}", status_label(doc.status));
    println!("Uploaded:     {}", doc.uploaded_at.to_rfc3339());
    if let Some(c) = doc.overall_confidence {
        println!("Confidence:   {c:.2}");
    }
    if let Some(err) = &doc.error_message {
        println!("Error:        {}", red(err));
    }
    if let Some(r) = latest {
        println!("Runs:         {} (latest result run {})", doc.runs, r.run);
        print_summary(&r.bundle);
    }
    Ok(())
}

fn status_label(s: DocumentStatus) -> String {
    match s {
        DocumentStatus::Completed => green("completed"),
        DocumentStatus::Failed => red("failed"),
        other => yellow(&other.to_string()),
    }
}

async fn audit(store: Arc<FsStore>, id: &str, json: bool) -> Result<()> {
    let trail = reader(store).audit_trail(id).await.map_err(not_found_hint)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&trail)?);
        return Ok(());
    }
    for e in trail {
        let mark = match e.status {
            AuditStatus::Started => dim("→"),
            AuditStatus::Completed => green("✓"),
            AuditStatus::Failed => red("✗"),
        };
        let meta = e
            .metadata
            .map(|m| serde_json::Value::Object(m).to_string())
            .unwrap_or_default();
        println!(
            "{} {:<11} {}  {}{}",
            mark,
            e.stage,
            dim(&e.started_at.format("%H:%M:%S%.3f").to_string()),
            dim(&meta),
            e.error_details
                .map(|d| format!("  {}", red(&d)))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn list(store: Arc<FsStore>, json: bool) -> Result<()> {
    let docs = reader(store).documents().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        eprintln!("{}", dim("No documents stored."));
    }
    for d in docs {
        println!(
            "{}  {:<10}  {:>5}  {}",
            d.id,
            status_label(d.status),
            d.overall_confidence
                .map(|c| format!("{c:.2}"))
                .unwrap_or_else(|| "-".into()),
            d.filename
        );
    }
    Ok(())
}
