//! Pipeline stages for document-to-pages normalisation.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and an engine can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ classify ──▶ office / render / spreadsheet / image ──▶ assemble ──▶ encode
//! (URL/path) (magic)     (soffice, pdfium|pdftoppm, calamine)       (pages)     (base64)
//! ```
//!
//! 1. [`fetch`]: copy or download the source into the workspace
//! 2. [`classify`]: pick exactly one handler from the leading bytes
//! 3. [`office`]: office formats → PDF via LibreOffice
//! 4. [`render`]: rasterise selected PDF pages, primary then fallback
//! 5. [`spreadsheet`]: one HTML or Markdown page per worksheet
//! 6. [`image`]: HEIC decoding, single-image pages, edge trimming
//! 7. [`assemble`]: ordered [`crate::output::RenderedPage`] list
//! 8. [`encode`]: base64 payloads for the extraction service

pub mod assemble;
pub mod classify;
pub mod encode;
pub mod fetch;
pub mod image;
pub mod office;
pub mod render;
pub mod spreadsheet;
