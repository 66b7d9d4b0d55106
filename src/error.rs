//! Error types for the docpages library.
//!
//! Every stage of the pipeline fails with a typed [`DocPagesError`] that is
//! surfaced to the caller immediately. Nothing is retried internally and a
//! partial result is never returned: a renderer that produces fewer images
//! than requested, or a workbook with one unreadable sheet, fails the whole
//! call.
//!
//! The first five variant groups mirror the stages that produce them:
//!
//! | Variant        | Raised by |
//! |----------------|-----------|
//! | `Fetch*`       | [`crate::pipeline::fetch`] |
//! | `Conversion`   | [`crate::pipeline::office`], [`crate::pipeline::image`] |
//! | `Render`       | [`crate::pipeline::render`], image pass-through |
//! | `Format`       | [`crate::pipeline::spreadsheet`] |
//! | `NotFound`     | fetcher and transcoder, for missing input files |

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docpages library.
#[derive(Debug, Error)]
pub enum DocPagesError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The remote source could not be downloaded.
    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s\nIncrease download_timeout_secs.")]
    FetchTimeout { url: String, secs: u64 },

    /// Neither the mime type nor the path gave a usable file extension.
    #[error("Cannot determine a file extension for '{source_ref}' (mime type: {mime})")]
    UnresolvedExtension { source_ref: String, mime: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// An input file does not exist.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// An external conversion engine (office → PDF, HEIC → JPEG) failed.
    #[error("{engine} could not convert '{path}': {detail}")]
    Conversion {
        engine: String,
        path: PathBuf,
        detail: String,
    },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Every rasterisation strategy failed for the document.
    #[error("Rasterisation of '{path}' failed: {detail}")]
    Render { path: PathBuf, detail: String },

    /// The selection names a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Spreadsheet errors ────────────────────────────────────────────────
    /// The workbook could not be read or contains no sheets.
    #[error("Invalid spreadsheet '{path}': {detail}")]
    Format { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing inside the workspace failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocPagesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocPagesError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the rasterisation failures (`Render`, `PageOutOfRange`).
    pub fn is_render_error(&self) -> bool {
        matches!(
            self,
            DocPagesError::Render { .. } | DocPagesError::PageOutOfRange { .. }
        )
    }

    /// True for every fetch-stage failure.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            DocPagesError::Fetch { .. }
                | DocPagesError::FetchTimeout { .. }
                | DocPagesError::UnresolvedExtension { .. }
        )
    }
}
