//! Pipeline entry points.
//!
//! [`process`] drives one source document through the whole pipeline:
//!
//! ```text
//! fetch ──▶ classify ──┬─ Pdf ────────────────────▶ render ──┐
//!                      ├─ OfficeDocument ─▶ soffice ─▶ render ┤
//!                      ├─ StructuredData ─▶ transcode ────────┤──▶ [trim] ──▶ assemble
//!                      ├─ Image ──────────────────────────────┤
//!                      └─ Heic ─▶ heif-convert ───────────────┘
//! ```
//!
//! Every artifact is written into the caller's [`Workspace`]; nothing is
//! cleaned up here.

use crate::config::ConversionConfig;
use crate::error::DocPagesError;
use crate::output::{DocumentPages, SourceInfo};
use crate::pipeline::classify::{self, DocumentKind};
use crate::pipeline::fetch::{self, SourceReference};
use crate::pipeline::{assemble, image, office, render, spreadsheet};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Normalise `source` into an ordered list of pages.
///
/// # Errors
/// Any stage failure is returned as-is; there are no retries and no partial
/// results. See [`DocPagesError`] for which stage raises what.
pub async fn process(
    source: &SourceReference,
    workspace: &Workspace,
    config: &ConversionConfig,
) -> Result<DocumentPages, DocPagesError> {
    config.validate()?;
    let start = Instant::now();
    info!("Processing {}", source.location);

    // ── Step 1: Fetch ────────────────────────────────────────────────────
    let artifact = fetch::fetch(source, workspace, config.download_timeout_secs).await?;

    // ── Step 2: Classify ─────────────────────────────────────────────────
    let kind = classify::classify(&artifact)?;
    info!("Classified {} as {}", artifact.path.display(), kind);

    // ── Step 3: Produce pages ────────────────────────────────────────────
    let document = match kind {
        DocumentKind::Pdf => {
            let rendered = render::render_pdf(&artifact.path, workspace, config).await?;
            image_document(source, kind, rendered.total_pages, rendered.pages, config).await?
        }
        DocumentKind::OfficeDocument => {
            let pdf = office::convert_file(&artifact.path, workspace, &config.tools.soffice).await?;
            let rendered = render::render_pdf(&pdf, workspace, config).await?;
            image_document(source, kind, rendered.total_pages, rendered.pages, config).await?
        }
        DocumentKind::StructuredData => {
            let workbook = spreadsheet::transcode(
                &artifact.path,
                config.spreadsheet_format,
                &config.pages,
            )
            .await?;
            let pages = assemble::assemble_text(workbook.sheets);
            assemble::document(&source.location, kind, workbook.total_sheets, pages)
        }
        DocumentKind::Image => {
            let pages = image::select_image_page(artifact.path.clone(), &config.pages)?;
            image_document(source, kind, 1, pages, config).await?
        }
        DocumentKind::Heic => {
            let jpeg =
                image::heic_to_jpeg(&artifact.path, workspace, &config.tools.heif_convert).await?;
            let pages = image::select_image_page(jpeg, &config.pages)?;
            image_document(source, kind, 1, pages, config).await?
        }
    };

    info!(
        "Produced {} of {} pages in {}ms",
        document.pages.len(),
        document.total_pages,
        start.elapsed().as_millis()
    );
    Ok(document)
}

/// Blocking wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn process_sync(
    source: &SourceReference,
    workspace: &Workspace,
    config: &ConversionConfig,
) -> Result<DocumentPages, DocPagesError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocPagesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(source, workspace, config))
}

/// Fetch and classify a source without rendering anything.
pub async fn classify_source(
    source: &SourceReference,
    workspace: &Workspace,
    config: &ConversionConfig,
) -> Result<SourceInfo, DocPagesError> {
    let artifact = fetch::fetch(source, workspace, config.download_timeout_secs).await?;
    let kind = classify::classify(&artifact)?;
    Ok(SourceInfo {
        source: source.location.clone(),
        kind,
        artifact,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn image_document(
    source: &SourceReference,
    kind: DocumentKind,
    total_pages: usize,
    pages: Vec<(usize, PathBuf)>,
    config: &ConversionConfig,
) -> Result<DocumentPages, DocPagesError> {
    if config.trim_edges {
        let paths: Vec<PathBuf> = pages.iter().map(|(_, p)| p.clone()).collect();
        image::trim_all(&paths).await?;
        debug!("Trimmed {} images", paths.len());
    }
    let pages = assemble::assemble_images(pages)?;
    Ok(assemble::document(&source.location, kind, total_pages, pages))
}
