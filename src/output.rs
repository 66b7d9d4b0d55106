//! Output types handed to the downstream extraction step.

use crate::pipeline::classify::DocumentKind;
use crate::pipeline::fetch::LocalArtifact;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageStatus {
    Success,
    Error,
}

/// What a page carries: an image on disk or serialised text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PagePayload {
    /// A rasterised page or pass-through image inside the workspace.
    Image { path: PathBuf },
    /// A transcoded spreadsheet sheet.
    Text { content: String },
}

/// One unit of pipeline output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    /// 1-indexed page (or sheet) number.
    pub page: usize,
    pub payload: PagePayload,
    /// Size of the image file, or of the text content as UTF-8, in bytes.
    pub content_length: usize,
    pub status: PageStatus,
}

impl RenderedPage {
    pub fn image_path(&self) -> Option<&Path> {
        match &self.payload {
            PagePayload::Image { path } => Some(path),
            PagePayload::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            PagePayload::Image { .. } => None,
            PagePayload::Text { content } => Some(content),
        }
    }
}

/// The assembled result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPages {
    /// The URL or path the run started from.
    pub source: String,
    pub kind: DocumentKind,
    /// Pages (or sheets) in the whole document, not just the selection.
    pub total_pages: usize,
    /// Selected pages in ascending page order.
    pub pages: Vec<RenderedPage>,
}

impl DocumentPages {
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.page).collect()
    }
}

/// What [`crate::classify_source`] learned about a source without rendering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source: String,
    pub kind: DocumentKind,
    /// The fetched copy inside the workspace.
    pub artifact: LocalArtifact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serialises_tagged() {
        let page = RenderedPage {
            page: 2,
            payload: PagePayload::Text {
                content: "## Sheet: A".into(),
            },
            content_length: 11,
            status: PageStatus::Success,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["payload"]["type"], "text");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(page.text(), Some("## Sheet: A"));
        assert!(page.image_path().is_none());
    }
}
