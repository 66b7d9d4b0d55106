//! CLI binary for docpages.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, runs the pipeline in a workspace and prints the pages.

use anyhow::{Context, Result};
use clap::Parser;
use docpages::{
    classify_source, encode_page, process, ConversionConfig, DocumentKind, DocumentPages,
    EncodedImage, PagePayload, PageSelection, RenderedPage, SourceReference, SpreadsheetFormat,
    Workspace,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render every page of a PDF into ./pages
  docpages report.pdf --workdir ./pages

  # Pages 1 and 3 of a Word document, as JSON
  docpages --pages 1,3 --json proposal.docx --workdir ./out

  # Spreadsheet sheets as Markdown tables
  docpages --markdown budget.xlsx

  # Extensionless download, JSON with base64 images inlined
  docpages --json --inline-images https://example.com/download?id=42

  # Only report what kind of document it is
  docpages --classify-only scan.heic

EXTERNAL ENGINES:
  pdfium        primary PDF rasteriser (PDFIUM_LIB_PATH or system library)
  pdftoppm      fallback PDF rasteriser and pdfinfo page probe (poppler-utils)
  soffice       office documents → PDF (LibreOffice)
  heif-convert  HEIC photos → JPEG (libheif)

  Paths can be overridden in a JSON config file:
    {"tools": {"soffice": "/opt/libreoffice/program/soffice"}}

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium when no library is configured
  RUST_LOG          Log filter, overrides -v / -q
"#;

/// Normalise documents into ordered page images and sheet tables.
#[derive(Parser, Debug)]
#[command(
    name = "docpages",
    version,
    about = "Normalise PDFs, office files, images and spreadsheets into ordered pages",
    long_about = "Fetch a document (local path or HTTP/HTTPS URL), work out what it is, and \
turn it into pages: PNG images for PDFs, office documents and photos, HTML or Markdown tables \
for spreadsheets.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// Page selection: all, 5, 3-7, or 1,3,5. For spreadsheets N means the first N sheets.
    #[arg(long, env = "DOCPAGES_PAGES")]
    pages: Option<String>,

    /// Rendering DPI (72–600). Default: 300.
    #[arg(long, env = "DOCPAGES_DPI",
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Base height of page images in pixels. Default: 2048.
    #[arg(long, env = "DOCPAGES_HEIGHT")]
    height: Option<u32>,

    /// Render at the DPI alone instead of scaling to the target height.
    #[arg(long)]
    no_preserve_aspect: bool,

    /// Transcode spreadsheets to Markdown instead of HTML.
    #[arg(long, env = "DOCPAGES_MARKDOWN")]
    markdown: bool,

    /// Crop uniform borders from image pages.
    #[arg(long)]
    trim_edges: bool,

    /// Keep artifacts in this directory (created if missing) instead of a temp dir.
    #[arg(long, env = "DOCPAGES_WORKDIR")]
    workdir: Option<PathBuf>,

    /// JSON file with a ConversionConfig; flags override its values.
    #[arg(long, env = "DOCPAGES_CONFIG")]
    config: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// With --json, embed every page image as base64.
    #[arg(long, requires = "json")]
    inline_images: bool,

    /// Fetch and classify only, no rendering.
    #[arg(long)]
    classify_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPAGES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "DOCPAGES_QUIET")]
    quiet: bool,
}

/// A page in `--json` output, optionally with its image inlined.
#[derive(Serialize)]
struct JsonPage<'a> {
    #[serde(flatten)]
    page: &'a RenderedPage,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EncodedImage>,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    source: &'a str,
    kind: DocumentKind,
    total_pages: usize,
    workdir: &'a Path,
    /// False when the workspace is a temp dir removed at exit.
    persistent: bool,
    pages: Vec<JsonPage<'a>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs out of
    // its way unless asked for.
    let show_progress = !cli.quiet && !cli.json;
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

    let config = build_config(&cli).await?;

    // ── Workspace ────────────────────────────────────────────────────────
    // The temp dir must outlive every use of the workspace below.
    let (_temp, workspace) = match &cli.workdir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create workdir {}", dir.display()))?;
            (None, Workspace::new(dir).context("Invalid workdir")?)
        }
        None => {
            let temp = tempfile::tempdir().context("Failed to create temporary directory")?;
            let ws = Workspace::from_temp_dir(&temp);
            (Some(temp), ws)
        }
    };
    let persistent = cli.workdir.is_some();

    let source = SourceReference::new(cli.input.clone());

    // ── Classify-only mode ───────────────────────────────────────────────
    if cli.classify_only {
        let info = classify_source(&source, &workspace, &config)
            .await
            .context("Failed to classify source")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise result")?
            );
        } else {
            println!("Source:     {}", info.source);
            println!("Kind:       {}", info.kind);
            println!("Extension:  {}", info.artifact.extension);
            if let Some(ref mime) = info.artifact.mime_type {
                println!("Mime type:  {}", mime);
            }
            if persistent {
                println!("Local copy: {}", info.artifact.path.display());
            }
        }
        return Ok(());
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing");
        bar.set_message(cli.input.clone());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let start = Instant::now();
    let result = process(&source, &workspace, &config).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let document = result.context("Processing failed")?;
    let elapsed_ms = start.elapsed().as_millis();

    if cli.json {
        print_json(&document, workspace.path(), persistent, cli.inline_images)?;
    } else {
        print_pages(&document)?;
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {} {}  {}/{} pages  {}ms",
            green("✔"),
            bold(&document.kind.to_string()),
            document.source,
            document.pages.len(),
            document.total_pages,
            elapsed_ms
        );
        if !persistent && document.pages.iter().any(|p| p.image_path().is_some()) {
            eprintln!(
                "   {}",
                dim("images were written to a temporary directory; use --workdir to keep them")
            );
        }
    }

    Ok(())
}

/// Merge the optional config file with CLI flags.
async fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut config = if let Some(ref path) = cli.config {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        serde_json::from_str::<ConversionConfig>(&raw)
            .with_context(|| format!("Failed to parse config {:?}", path))?
    } else {
        ConversionConfig::default()
    };

    if let Some(ref pages) = cli.pages {
        config.pages = parse_pages(pages)?;
    }
    if let Some(dpi) = cli.dpi {
        config.dpi = dpi;
    }
    if let Some(height) = cli.height {
        config.image_height = height;
    }
    if cli.no_preserve_aspect {
        config.preserve_aspect_ratio = false;
    }
    if cli.markdown {
        config.spreadsheet_format = SpreadsheetFormat::Markdown;
    }
    if cli.trim_edges {
        config.trim_edges = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_pages(document: &DocumentPages) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for page in &document.pages {
        let written = match &page.payload {
            PagePayload::Image { path } => {
                writeln!(
                    handle,
                    "page {:>3}  {}  ({} bytes)",
                    page.page,
                    path.display(),
                    page.content_length
                )
            }
            PagePayload::Text { content } => {
                writeln!(handle, "{}", content.trim_end()).and_then(|_| writeln!(handle))
            }
        };
        written.context("Failed to write to stdout")?;
    }
    Ok(())
}

fn print_json(
    document: &DocumentPages,
    workdir: &Path,
    persistent: bool,
    inline_images: bool,
) -> Result<()> {
    let pages = document
        .pages
        .iter()
        .map(|page| {
            let image = if inline_images {
                encode_page(page)
                    .with_context(|| format!("Failed to encode page {}", page.page))?
            } else {
                None
            };
            Ok(JsonPage { page, image })
        })
        .collect::<Result<Vec<_>>>()?;

    let output = JsonOutput {
        source: &document.source,
        kind: document.kind,
        total_pages: document.total_pages,
        workdir,
        persistent,
        pages,
    };
    let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

/// Parse `--pages` string into `PageSelection`.
///
/// Ranges expand to an explicit set, so `3-5` selects pages 3, 4 and 5 of
/// a PDF and sheets 3 to 5 of a workbook.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-7"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Set((start..=end).collect()));
    }

    // Set: "1,3,5"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pages_forms() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages(" ALL ").unwrap(), PageSelection::All);
        assert_eq!(parse_pages("4").unwrap(), PageSelection::Single(4));
        assert_eq!(
            parse_pages("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert_eq!(
            parse_pages("2-4").unwrap(),
            PageSelection::Set(vec![2, 3, 4])
        );
    }

    #[test]
    fn parse_pages_rejects_bad_input() {
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("1,0").is_err());
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("abc").is_err());
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::try_parse_from([
            "docpages",
            "--pages",
            "1,3",
            "--markdown",
            "--json",
            "--inline-images",
            "in.xlsx",
        ])
        .unwrap();
        assert_eq!(cli.input, "in.xlsx");
        assert!(cli.markdown && cli.json && cli.inline_images);
        assert!(Cli::try_parse_from(["docpages", "--inline-images", "in.pdf"]).is_err());
    }
}
