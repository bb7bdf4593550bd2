//! CLI binary for pdf-page-ocr.
//!
//! A thin presentation shell: picks a document, sends one request to the
//! coordinator, prints the recognised lines and optionally saves the
//! analysed image.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_page_ocr::{
    select_source, BoxKind, PipelineConfig, PipelineCoordinator, PipelineObserver, PipelineRequest,
    PipelineResponse, RecognitionLevel, RegionLevel, RequestId, Selection, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Shows the running stage on a spinner and prints fallbacks as they happen.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("page-ocr");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineObserver for SpinnerObserver {
    fn on_stage_start(&self, _id: RequestId, stage: Stage) {
        let msg = match stage {
            Stage::Rasterize => "Rendering page…",
            Stage::Filter => "Upscaling and smoothing…",
            Stage::Recognize => "Recognising text…",
            Stage::Assemble => "Assembling…",
        };
        self.bar.set_message(msg);
    }

    fn on_stage_complete(&self, _id: RequestId, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            green("✓"),
            stage,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0))
        ));
    }

    fn on_stage_degraded(&self, _id: RequestId, stage: Stage, error: &str) {
        let msg = if error.len() > 80 {
            let cut = error.char_indices().nth(79).map(|(i, _)| i).unwrap_or(error.len());
            format!("{}\u{2026}", &error[..cut])
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<10} {}", yellow("⚠"), stage, yellow(&msg)));
    }

    fn on_request_complete(&self, _id: RequestId, _line_count: usize) {
        self.bar.finish_and_clear();
    }

    fn on_request_failed(&self, _id: RequestId, stage: Stage, _error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), stage));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognise page 1 as rendered (art box)
  page-ocr invoice.pdf

  # Upscale + blur before OCR, and keep the analysed image
  page-ocr invoice.pdf --page 2 --filters --save-image page2.png

  # Machine-readable output with the image embedded as base64 PNG
  page-ocr invoice.pdf --json --embed-image > page1.json

  # Page boxes and page count, no OCR
  page-ocr --inspect brochure.pdf

  # German + English, word-level regions
  page-ocr --lang deu+eng --word-level letter.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   pdfium shared library file or the directory holding it
  TESSDATA_PREFIX   directory containing Tesseract *.traineddata files
  RUST_LOG          tracing filter, overrides -v / -q

EXIT STATUS:
  0 on success, including "no text found" and degraded results
  1 when the document cannot be opened or the page does not exist
"#;

/// Recognise the text on one page of a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "page-ocr",
    version,
    about = "Recognise the text on one page of a PDF",
    long_about = "Render one page of a PDF with pdfium, optionally upscale (Lanczos 3x) and \
smooth (box blur) it, and run Tesseract OCR over the result.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file. When omitted nothing is selected and the command exits quietly.
    input: Option<PathBuf>,

    /// 1-based page number.
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    page: i64,

    /// Upscale and blur the page before OCR.
    #[arg(short, long, env = "PAGE_OCR_FILTERS")]
    filters: bool,

    /// Write the analysed image to this PNG file.
    #[arg(long)]
    save_image: Option<PathBuf>,

    /// Output a JSON summary instead of plain lines.
    #[arg(long)]
    json: bool,

    /// With --json, include the analysed image as base64 PNG.
    #[arg(long, requires = "json")]
    embed_image: bool,

    /// Print page count and page boxes only, no OCR.
    #[arg(long)]
    inspect: bool,

    /// String placed between recognised lines.
    #[arg(long, default_value = "\n")]
    separator: String,

    /// Tesseract language(s), e.g. eng or eng+fra.
    #[arg(short, long, env = "PAGE_OCR_LANG", default_value = "eng")]
    lang: String,

    /// Directory containing *.traineddata files.
    #[arg(long)]
    tessdata: Option<PathBuf>,

    /// Render scale in pixels per PDF point (0.1–8.0).
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Page box rendered without filters: media, crop, bleed, trim, art.
    #[arg(long, default_value = "art")]
    display_box: BoxKind,

    /// Page box rendered with filters: media, crop, bleed, trim, art.
    #[arg(long, default_value = "media")]
    filter_box: BoxKind,

    /// Skip layout analysis for speed.
    #[arg(long)]
    fast: bool,

    /// Report one region per word instead of per line.
    #[arg(long)]
    word_level: bool,

    /// Fail instead of falling back when filtering or OCR fails.
    #[arg(long)]
    strict: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGE_OCR_PASSWORD")]
    password: Option<String>,

    /// pdfium library file or directory (overrides PDFIUM_LIB_PATH).
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Document selection ───────────────────────────────────────────────
    let source = match select_source(cli.input.as_ref()).context("Cannot use the selected file")? {
        Selection::Selected(source) => source,
        Selection::NoSelection => {
            if !cli.quiet {
                eprintln!("{}", dim("No document selected."));
            }
            return Ok(());
        }
    };

    let observer = show_progress.then(SpinnerObserver::new);
    let config = build_config(&cli, observer.clone())?;
    let coordinator = PipelineCoordinator::new(config);

    // ── Inspect mode ─────────────────────────────────────────────────────
    if cli.inspect {
        let info = coordinator
            .inspect(source.clone())
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize page boxes")?
            );
        } else {
            println!("File:   {}", source.describe());
            println!("Pages:  {}", info.page_count);
            for page in &info.pages {
                println!("{}", bold(&format!("Page {}", page.page_number)));
                for kind in [BoxKind::Media, BoxKind::Crop, BoxKind::Bleed, BoxKind::Trim, BoxKind::Art] {
                    let r = page.get(kind);
                    println!(
                        "  {:<10} {:>7.1} x {:<7.1} pt  [{:.1} {:.1} {:.1} {:.1}]",
                        kind.to_string(),
                        r.width(),
                        r.height(),
                        r.left,
                        r.bottom,
                        r.right,
                        r.top
                    );
                }
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let request = PipelineRequest::new(source, cli.page).with_filters(cli.filters);
    let response = match coordinator.run(request).await {
        Ok(r) => r,
        Err(e) => {
            if let Some(o) = &observer {
                o.bar.finish_and_clear();
            }
            return Err(e).context("Page OCR failed");
        }
    };

    if let Some(ref path) = cli.save_image {
        response
            .image
            .to_dynamic()
            .save(path)
            .with_context(|| format!("Failed to write image to {}", path.display()))?;
    }

    if cli.json {
        print_json(&response, cli.embed_image)?;
    } else {
        let text = response.lines().join(&cli.separator);
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.is_empty() && !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&response, cli.save_image.as_ref());
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<SpinnerObserver>>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .render_scale(cli.scale)
        .display_box(cli.display_box)
        .filtering_box(cli.filter_box)
        .language(cli.lang.clone())
        .recognition_level(if cli.fast {
            RecognitionLevel::Fast
        } else {
            RecognitionLevel::Accurate
        })
        .region_level(if cli.word_level {
            RegionLevel::Word
        } else {
            RegionLevel::Line
        })
        .strict(cli.strict);

    if let Some(ref dir) = cli.tessdata {
        builder = builder.tessdata_dir(dir);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    if let Some(o) = observer {
        builder = builder.observer(o);
    }

    builder.build().context("Invalid configuration")
}

fn print_json(response: &PipelineResponse, embed_image: bool) -> Result<()> {
    let mut value = serde_json::to_value(response.summary()).context("Failed to serialise output")?;
    if embed_image {
        let png = response
            .image
            .encode_png_base64()
            .context("Failed to encode image as PNG")?;
        value["image_png_base64"] = serde_json::Value::String(png);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialise output")?
    );
    Ok(())
}

fn print_summary(response: &PipelineResponse, saved: Option<&PathBuf>) {
    let status = if response.is_degraded() {
        yellow("⚠")
    } else {
        green("✔")
    };
    let lines = response.recognition.len();
    let what = if lines == 0 {
        "no text found".to_string()
    } else {
        format!("{} lines", lines)
    };
    eprintln!(
        "{}  page {}  {}  {}x{} px ({}{})  {}ms",
        status,
        response.page_number,
        bold(&what),
        response.image.width(),
        response.image.height(),
        response.box_kind,
        if response.filters_applied { ", filtered" } else { "" },
        response.timings.total_ms,
    );
    if let Some(ref e) = response.filter_error {
        eprintln!("   {} {}", yellow("filters skipped:"), e);
    }
    if let Some(ref e) = response.recognition_error {
        eprintln!("   {} {}", red("OCR failed:"), e);
    }
    if let Some(path) = saved {
        eprintln!("   image → {}", bold(&path.display().to_string()));
    }
}
