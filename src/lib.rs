//! # docpages
//!
//! Normalise arbitrary documents into ordered page artifacts for downstream
//! content extraction.
//!
//! ## Why this crate?
//!
//! Extraction services want one thing per page: an image they can read, or
//! text they can parse. Real inputs arrive as PDFs, Word and PowerPoint
//! files, phone photos (often HEIC), scans and spreadsheets, sometimes behind
//! a URL with no file extension at all. This crate turns each of them into
//! an ordered list of pages: PNG images for anything visual, HTML or
//! Markdown tables for spreadsheets.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source (URL or path)
//!  │
//!  ├─ 1. Fetch      copy / stream into the caller's workspace
//!  ├─ 2. Classify   %PDF magic, spreadsheet ext, HEIC, image, else office
//!  ├─ 3. Normalise  soffice → PDF, heif-convert → JPEG
//!  ├─ 4. Render     pdfium, falling back to pdftoppm (tall pages get taller images)
//!  │    or Transcode calamine → HTML / Markdown per sheet
//!  ├─ 5. Trim       optional border crop on image pages
//!  └─ 6. Assemble   ordered pages + total page count
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpages::{process, ConversionConfig, PageSelection, SourceReference, Workspace};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tmp = tempfile::tempdir()?;
//!     let workspace = Workspace::from_temp_dir(&tmp);
//!     let config = ConversionConfig::builder()
//!         .pages(PageSelection::Set(vec![1, 3]))
//!         .build()?;
//!
//!     let doc = process(&SourceReference::new("report.docx"), &workspace, &config).await?;
//!     for page in &doc.pages {
//!         println!("page {} → {:?}", page.page, page.image_path());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External engines
//!
//! | Engine         | Used for | Configured by |
//! |----------------|----------|---------------|
//! | pdfium         | primary rasteriser, page geometry | `tools.pdfium_library`, `PDFIUM_LIB_PATH` |
//! | `pdftoppm`     | fallback rasteriser | `tools.pdftoppm` |
//! | `pdfinfo`      | page geometry when pdfium is unavailable | `tools.pdfinfo` |
//! | `soffice`      | office → PDF | `tools.soffice` |
//! | `heif-convert` | HEIC → JPEG | `tools.heif_convert` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpages` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docpages = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    adjusted_height, ConversionConfig, ConversionConfigBuilder, ExternalTools, PageSelection,
    RenderStrategy, SpreadsheetFormat, ASPECT_RATIO_THRESHOLD,
};
pub use convert::{classify_source, process, process_sync};
pub use error::DocPagesError;
pub use output::{DocumentPages, PagePayload, PageStatus, RenderedPage, SourceInfo};
pub use pipeline::classify::DocumentKind;
pub use pipeline::encode::{encode_page, EncodedImage};
pub use pipeline::fetch::{LocalArtifact, SourceReference};
pub use workspace::Workspace;
