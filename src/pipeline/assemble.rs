//! Page assembly: turn `(page, artifact)` pairs into [`RenderedPage`]s.
//!
//! Producers (renderer, transcoder, image pass-through) have already
//! validated their output, so nothing here second-guesses success. The only
//! work is ordering, measuring and wrapping.

use crate::error::DocPagesError;
use crate::output::{DocumentPages, PagePayload, PageStatus, RenderedPage};
use crate::pipeline::classify::DocumentKind;
use std::path::PathBuf;

/// Image pages; content length is the file size in bytes.
pub fn assemble_images(
    mut pages: Vec<(usize, PathBuf)>,
) -> Result<Vec<RenderedPage>, DocPagesError> {
    pages.sort_by_key(|(page, _)| *page);
    pages
        .into_iter()
        .map(|(page, path)| {
            let content_length = std::fs::metadata(&path)
                .map_err(|e| DocPagesError::io(&path, e))?
                .len() as usize;
            Ok(RenderedPage {
                page,
                payload: PagePayload::Image { path },
                content_length,
                status: PageStatus::Success,
            })
        })
        .collect()
}

/// Text pages; content length is the string length in bytes.
pub fn assemble_text(mut pages: Vec<(usize, String)>) -> Vec<RenderedPage> {
    pages.sort_by_key(|(page, _)| *page);
    pages
        .into_iter()
        .map(|(page, content)| RenderedPage {
            page,
            content_length: content.len(),
            payload: PagePayload::Text { content },
            status: PageStatus::Success,
        })
        .collect()
}

/// Wrap assembled pages with the document-level facts.
pub fn document(
    source: &str,
    kind: DocumentKind,
    total_pages: usize,
    pages: Vec<RenderedPage>,
) -> DocumentPages {
    DocumentPages {
        source: source.to_string(),
        kind,
        total_pages,
        pages,
    }
}
