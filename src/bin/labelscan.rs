//! CLI binary for labelscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives the processing lifecycle and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use labelscan::pipeline::normalize::{rows, COLUMNS};
use labelscan::{
    copy_field, to_delimited_text, write_spreadsheet, CaptureSession, CaptureState,
    ExtractionConfig, ExtractionProgressCallback, ExtractionResult, FileFrameDevice,
    LabelField, LabelPipeline, PipelineState, ProgressCallback, StreamConstraints,
    REPORT_FILENAME,
};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner shown while the recognition service is working.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, filename: &str, mime_type: &str) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("{filename} {}", dim(mime_type)));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_extraction_complete(&self, filename: &str, label_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} labels detected in {}  {}",
            green("✔"),
            bold(&label_count.to_string()),
            filename,
            self.elapsed()
        );
    }

    fn on_extraction_error(&self, filename: &str, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}: {}  {}", red("✘"), filename, red(error), self.elapsed());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract labels from a photo and print them
  labelscan scan labels.jpg

  # Multi-label PDF sheet → spreadsheet report
  labelscan scan sheet.pdf --xlsx

  # Clipboard-ready delimited text
  labelscan scan labels.png --format csv | pbcopy

  # Just the barcode of the second label
  labelscan scan labels.jpg --field barcode-value --label 2

  # Capture from a snapshot feed (file-backed camera)
  labelscan capture --frame /run/kiosk/latest.jpg --torch

  # Use an edgequake-llm provider instead of native Gemini
  labelscan --provider openai --model gpt-4.1 scan labels.jpg

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY / API_KEY   Google Gemini API key (native backend)
  OPENAI_API_KEY, ANTHROPIC_API_KEY, …   keys for edgequake-llm providers
  LABELSCAN_PROVIDER         Override provider (gemini, openai, anthropic, ollama)
  LABELSCAN_MODEL            Override model ID
  RUST_LOG                   Log filter (overrides --verbose / --quiet)
"#;

/// Extract structured records from garment labels.
#[derive(Parser, Debug)]
#[command(
    name = "labelscan",
    version,
    about = "Extract structured records from photos and PDFs of garment labels",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: Options,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage a file or URL and extract its labels.
    Scan {
        /// Local PDF/JPEG/PNG/WebP path or HTTP/HTTPS URL.
        input: String,
    },

    /// Open a camera session on a file-backed device and extract one still.
    Capture {
        /// Image file serving as the live frame.
        #[arg(long, env = "LABELSCAN_FRAME")]
        frame: PathBuf,

        /// Switch the torch on before capturing, if the device has one.
        #[arg(long)]
        torch: bool,
    },
}

#[derive(Args, Debug)]
struct Options {
    /// Recognition provider: gemini (native), or any edgequake-llm provider.
    #[arg(long, global = true, env = "LABELSCAN_PROVIDER")]
    provider: Option<String>,

    /// Model ID. Default: gemini-3-flash-preview (gemini) or gpt-4.1-nano.
    #[arg(long, global = true, env = "LABELSCAN_MODEL")]
    model: Option<String>,

    /// Gemini API key. Falls back to GEMINI_API_KEY / API_KEY.
    #[arg(long, global = true, hide_env_values = true, env = "LABELSCAN_API_KEY")]
    api_key: Option<String>,

    /// Gemini REST base URL.
    #[arg(long, global = true, env = "LABELSCAN_ENDPOINT")]
    endpoint: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "LABELSCAN_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens for the recognition call.
    #[arg(long, global = true, env = "LABELSCAN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Path to a text file replacing the built-in instructions.
    #[arg(long, global = true, env = "LABELSCAN_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Recognition call timeout in seconds.
    #[arg(long, global = true, env = "LABELSCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "LABELSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Result format on stdout.
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: FormatArg,

    /// Also write the spreadsheet report (default name if no path given).
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = REPORT_FILENAME)]
    xlsx: Option<PathBuf>,

    /// Print one field of one label verbatim instead of the full result.
    #[arg(long, global = true, value_enum)]
    field: Option<FieldArg>,

    /// 1-based label number for --field.
    #[arg(long, global = true, default_value_t = 1)]
    label: usize,

    /// Disable the spinner.
    #[arg(long, global = true, env = "LABELSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LABELSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "LABELSCAN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Table,
    Csv,
    Json,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FieldArg {
    Title,
    Model,
    Color,
    Size,
    Order,
    BarcodeType,
    BarcodeValue,
    RawText,
}

impl From<FieldArg> for LabelField {
    fn from(v: FieldArg) -> Self {
        match v {
            FieldArg::Title => LabelField::Title,
            FieldArg::Model => LabelField::Model,
            FieldArg::Color => LabelField::Color,
            FieldArg::Size => LabelField::Size,
            FieldArg::Order => LabelField::OrderReference,
            FieldArg::BarcodeType => LabelField::BarcodeType,
            FieldArg::BarcodeValue => LabelField::BarcodeValue,
            FieldArg::RawText => LabelField::RawText,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep library INFO
    // logs from tearing through it.
    let show_progress = !opts.quiet && !opts.no_progress;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(opts, progress_cb).await?;
    let pipeline = LabelPipeline::from_config(config).context("Failed to configure recognition service")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let state = match &cli.command {
        Command::Scan { input } => {
            pipeline
                .submit_path(input)
                .await
                .with_context(|| format!("Rejected input '{input}'"))?;
            pipeline.trigger().await.context("Extraction failed")?
        }
        Command::Capture { frame, torch } => {
            let device = Arc::new(FileFrameDevice::new(frame.clone()));
            let mut session = CaptureSession::open(device, StreamConstraints::default()).await;
            if let CaptureState::Error(failure) = session.await_ready().await {
                bail!("{failure}");
            }
            if *torch {
                if session.torch_supported() {
                    session.toggle_torch().await;
                } else if !opts.quiet {
                    eprintln!("{}", dim("torch not available on this device"));
                }
            }
            pipeline
                .capture_and_extract(&mut session)
                .await
                .context("Capture failed")?
        }
    };

    let result = match state {
        PipelineState::Success(result) => result,
        PipelineState::Error(message) => bail!(message),
        other => bail!("Extraction ended in unexpected state: {}", other.name()),
    };

    emit(&result, opts)
}

/// Write the spreadsheet (if asked) and print the requested view.
fn emit(result: &ExtractionResult, opts: &Options) -> Result<()> {
    if let Some(ref path) = opts.xlsx {
        write_spreadsheet(&result.labels, path).context("Failed to write spreadsheet")?;
        if !opts.quiet {
            eprintln!("{} report → {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if let Some(field) = opts.field {
        let index = opts.label.checked_sub(1).context("--label is 1-based")?;
        let value = copy_field(&result.labels, index, field.into()).with_context(|| {
            format!(
                "label {} has no {:?} (found {} labels)",
                opts.label,
                field,
                result.len()
            )
        })?;
        println!("{value}");
        return Ok(());
    }

    match opts.format {
        FormatArg::Json => {
            let json = serde_json::to_string_pretty(result).context("Failed to serialise output")?;
            println!("{json}");
        }
        FormatArg::Csv => {
            println!("{}", to_delimited_text(&result.labels).context("Failed to render CSV")?);
        }
        FormatArg::Table => print_table(result),
    }
    Ok(())
}

fn print_table(result: &ExtractionResult) {
    if result.is_empty() {
        println!("No labels detected in {}", result.filename);
        return;
    }
    for (i, (label, row)) in result.labels.iter().zip(rows(&result.labels)).enumerate() {
        println!("{}", bold(&format!("Label {}", i + 1)));
        for (header, cell) in COLUMNS.iter().zip(row.cells()) {
            if !cell.is_empty() {
                println!("  {:<10} {}", dim(header), cell);
            }
        }
        if let Some(ref symbology) = label.barcode_type {
            println!("  {:<10} {}", dim("TYPE"), symbology);
        }
        println!();
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(opts: &Options, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(opts.temperature)
        .max_tokens(opts.max_tokens)
        .api_timeout_secs(opts.api_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(ref path) = opts.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref key) = opts.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref endpoint) = opts.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
