//! CLI binary for pagemill.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagemill::intake::{classify, classify_dir};
use pagemill::{
    DocumentState, Engines, PageSeparator, Pipeline, PipelineConfig, PipelineProgressCallback,
    ProgressCallback, StageName,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar, reset at the start of every stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:<12}  [{bar:42.green/238}] {pos:>4}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_stage_start(&self, stage: StageName, eligible: usize) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_length(eligible as u64);
        self.bar.set_position(0);
    }

    fn on_page_done(&self, _stage: StageName, _page_no: usize) {
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page_no: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar
            .println(format!("  {} Page {:>4}  {}", red("✗"), page_no + 1, red(&msg)));
    }

    fn on_run_complete(&self, total_pages: usize, failed_pages: usize) {
        self.bar.finish_and_clear();
        if failed_pages == 0 {
            eprintln!("{} {} pages processed", green("✔"), bold(&total_pages.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} failed)",
                if failed_pages == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_pages - failed_pages).to_string()),
                total_pages,
                red(&failed_pages.to_string()),
            );
        }
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text (stdout)
  pagemill scan.pdf

  # Write to a file (atomic: temp file + rename)
  pagemill scan.pdf -o scan.txt

  # English only, skip layout detection
  pagemill --lang en --no-layout invoice.jpg

  # Full per-page state as JSON
  pagemill --json report.pdf > report.json

  # Explain how each file in a folder would be routed
  pagemill --classify-only data/raw

RESUMING:
  Artifacts live under <work-root>/<content-id>/. Rerunning on the same
  file reuses pages/ and preprocessed/ and only redoes missing work.

EXTERNAL TOOLS:
  pdftoppm (poppler-utils)  PDF rasterization
  tesseract                 layout detection and OCR
  libpdfium                 text layers (./ or system library path)
"#;

#[derive(Parser, Debug)]
#[command(
    name = "pagemill",
    version,
    about = "Extract text from PDFs and scanned images, resumably",
    long_about = "Extract text from PDFs and images. Pages with a usable text layer are read \
directly; everything else is rasterized, denoised, and OCR'd. Failed pages are reported without \
aborting the document, and reruns resume from the work directory.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file (pdf, png, jpg, jpeg), or a directory with --classify-only.
    input: PathBuf,

    /// Write extracted text to this file instead of stdout.
    #[arg(short, long, env = "PAGEMILL_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the full document state as JSON.
    #[arg(long, env = "PAGEMILL_JSON")]
    json: bool,

    /// Only print the advisory route for the input file(s).
    #[arg(long)]
    classify_only: bool,

    /// Root directory for per-document work directories.
    #[arg(long, env = "PAGEMILL_WORK_ROOT", default_value = "data/temp")]
    work_root: PathBuf,

    /// Rasterization DPI (72–600).
    #[arg(long, env = "PAGEMILL_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Maximum number of pages a document may have.
    #[arg(long, env = "PAGEMILL_MAX_PAGES", default_value_t = 2000)]
    max_pages: usize,

    /// OCR languages in priority order, comma-separated.
    #[arg(long = "lang", env = "PAGEMILL_LANG", value_delimiter = ',', default_value = "hi,en")]
    languages: Vec<String>,

    /// Never use the GPU even if one is available.
    #[arg(long, env = "PAGEMILL_NO_GPU")]
    no_gpu: bool,

    /// Skip layout detection; OCR whole pages.
    #[arg(long, env = "PAGEMILL_NO_LAYOUT")]
    no_layout: bool,

    /// Skip text normalization.
    #[arg(long, env = "PAGEMILL_NO_POSTPROCESS")]
    no_postprocess: bool,

    /// Rasterizer timeout in seconds.
    #[arg(long = "timeout", env = "PAGEMILL_TIMEOUT", default_value_t = 120)]
    timeout_secs: u64,

    /// Pages processed in parallel within a stage.
    #[arg(short, long, env = "PAGEMILL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page separator: blank, none, ff, marker, or a custom string.
    #[arg(long, env = "PAGEMILL_SEPARATOR", default_value = "blank")]
    separator: String,

    /// Disable progress bar.
    #[arg(long, env = "PAGEMILL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGEMILL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGEMILL_QUIET")]
    quiet: bool,
}

/// `--json` payload.
#[derive(Serialize)]
struct JsonReport<'a> {
    text: String,
    succeeded_pages: usize,
    failed_pages: usize,
    document: &'a DocumentState,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.classify_only;
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

    // ── Classify-only mode ───────────────────────────────────────────────
    if cli.classify_only {
        return print_routes(&cli.input);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let separator = PageSeparator::parse(&cli.separator);
    let pipeline = Pipeline::new(config.clone(), Engines::detect(&config));

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let doc = match cli.output {
        Some(ref output_path) => pipeline
            .run_to_file(&cli.input, output_path, &separator)
            .await
            .context("Extraction failed")?,
        None => pipeline.run(&cli.input).await.context("Extraction failed")?,
    };

    if cli.json {
        let report = JsonReport {
            text: doc.text(&separator),
            succeeded_pages: doc.succeeded_pages(),
            failed_pages: doc.failed_pages(),
            document: &doc,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let text = doc.text(&separator);
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Processed {}/{} pages in {}ms",
                doc.page_count() - doc.failed_pages(),
                doc.page_count(),
                started.elapsed().as_millis()
            );
            for page in doc.pages.values() {
                if let Some(err) = page.error() {
                    eprintln!("  page {}: {}", page.page_no + 1, err);
                }
            }
        }
        if let Some(ref output_path) = cli.output {
            eprintln!("   {}  {}", dim("→"), bold(&output_path.display().to_string()));
        }
    }

    Ok(())
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .work_root(&cli.work_root)
        .dpi(cli.dpi)
        .max_pages(cli.max_pages)
        .languages(cli.languages.iter().map(|l| l.trim()))
        .allow_gpu(!cli.no_gpu)
        .use_layout(!cli.no_layout)
        .use_postprocess(!cli.no_postprocess)
        .rasterize_timeout_secs(cli.timeout_secs)
        .concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_routes(input: &Path) -> Result<()> {
    let routes = if input.is_dir() {
        classify_dir(input).with_context(|| format!("Failed to list {}", input.display()))?
    } else {
        vec![(input.to_path_buf(), classify(input))]
    };

    for (path, route) in routes {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        println!("{}", route.describe(&name));
    }
    Ok(())
}
