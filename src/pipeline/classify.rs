//! Format classification: decide which handler a fetched artifact goes to.
//!
//! Extensions lie (a `.pdf` that is really a Word 97 file, a download with
//! no extension at all), so the decisive checks look at the leading bytes.
//! The checks run in a fixed order and the first match wins, which makes
//! the mapping from artifact to [`DocumentKind`] a function: no artifact
//! can reach two handlers.

use crate::error::DocPagesError;
use crate::pipeline::fetch::LocalArtifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// PDF magic bytes.
const PDF_MAGIC: &[u8] = b"%PDF";

/// OLE2 compound file header used by legacy `.doc`/`.ppt`/`.xls`.
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// ISO-BMFF brands that identify HEIF/HEIC images.
const HEIF_BRANDS: &[&[u8]] = &[b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1"];

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "jpe", "jfif", "gif", "bmp", "tif", "tiff", "webp",
];

/// Bytes read from the head of a file for classification.
const SNIFF_LEN: usize = 16;

/// Document category; each maps to exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Rasterised directly.
    Pdf,
    /// Spreadsheets, transcoded to markup.
    StructuredData,
    /// Anything the office engine may turn into a PDF.
    OfficeDocument,
    /// Raster images, passed through as a single page.
    Image,
    /// HEIC/HEIF photos, decoded to JPEG then passed through.
    Heic,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::StructuredData => "structured data",
            DocumentKind::OfficeDocument => "office document",
            DocumentKind::Image => "image",
            DocumentKind::Heic => "heic",
        };
        f.write_str(s)
    }
}

pub fn is_pdf_bytes(head: &[u8]) -> bool {
    head.starts_with(PDF_MAGIC)
}

pub fn is_compound_binary(head: &[u8]) -> bool {
    head.starts_with(CFB_MAGIC)
}

/// `....ftyp<brand>` with a HEIF major brand.
pub fn is_heif_bytes(head: &[u8]) -> bool {
    head.len() >= 12 && &head[4..8] == b"ftyp" && HEIF_BRANDS.contains(&&head[8..12])
}

pub fn is_spreadsheet_extension(ext: &str) -> bool {
    SPREADSHEET_EXTENSIONS.contains(&ext)
}

fn is_heic(ext: &str, mime: Option<&str>, head: &[u8]) -> bool {
    HEIC_EXTENSIONS.contains(&ext)
        || matches!(mime, Some("image/heic" | "image/heif"))
        || is_heif_bytes(head)
}

fn is_image(ext: &str, mime: Option<&str>) -> bool {
    IMAGE_EXTENSIONS.contains(&ext) || mime.is_some_and(|m| m.starts_with("image/"))
}

/// Classify from the leading bytes plus extension and mime type.
pub fn classify_bytes(head: &[u8], extension: &str, mime: Option<&str>) -> DocumentKind {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    let ext = ext.as_str();

    if is_pdf_bytes(head) {
        DocumentKind::Pdf
    } else if is_spreadsheet_extension(ext) {
        DocumentKind::StructuredData
    } else if is_heic(ext, mime, head) {
        DocumentKind::Heic
    } else if is_image(ext, mime) {
        DocumentKind::Image
    } else {
        // Compound binaries and everything unrecognised go to the office
        // engine; a `.pdf` without `%PDF` lands here too.
        DocumentKind::OfficeDocument
    }
}

/// Classify a fetched artifact.
pub fn classify(artifact: &LocalArtifact) -> Result<DocumentKind, DocPagesError> {
    let head = read_head(&artifact.path)?;
    Ok(classify_bytes(
        &head,
        &artifact.extension,
        artifact.mime_type.as_deref(),
    ))
}

/// Up to [`SNIFF_LEN`] leading bytes of a file.
pub fn read_head(path: &Path) -> Result<Vec<u8>, DocPagesError> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocPagesError::NotFound {
            path: path.to_path_buf(),
        },
        _ => DocPagesError::io(path, e),
    })?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| DocPagesError::io(path, e))?;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEIC_HEAD: &[u8] = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00";

    #[test]
    fn pdf_magic_wins_regardless_of_extension() {
        for ext in ["pdf", "docx", "xlsx", "png", "bin", ""] {
            assert_eq!(
                classify_bytes(b"%PDF-1.7\n%", ext, None),
                DocumentKind::Pdf,
                "extension {ext:?}"
            );
        }
    }

    #[test]
    fn spreadsheet_by_extension() {
        assert_eq!(
            classify_bytes(b"PK\x03\x04", "XLSX", None),
            DocumentKind::StructuredData
        );
        // Legacy .xls is a compound binary but still a spreadsheet
        assert_eq!(
            classify_bytes(CFB_MAGIC, "xls", None),
            DocumentKind::StructuredData
        );
    }

    #[test]
    fn compound_binary_with_pdf_extension_is_office() {
        assert!(is_compound_binary(CFB_MAGIC));
        assert_eq!(
            classify_bytes(CFB_MAGIC, "pdf", Some("application/pdf")),
            DocumentKind::OfficeDocument
        );
    }

    #[test]
    fn heic_by_extension_mime_or_brand() {
        assert_eq!(classify_bytes(b"", "heic", None), DocumentKind::Heic);
        assert_eq!(
            classify_bytes(b"", "bin", Some("image/heif")),
            DocumentKind::Heic
        );
        assert_eq!(classify_bytes(HEIC_HEAD, "bin", None), DocumentKind::Heic);
    }

    #[test]
    fn images_by_extension_or_mime() {
        assert_eq!(
            classify_bytes(b"\x89PNG", "png", None),
            DocumentKind::Image
        );
        assert_eq!(
            classify_bytes(b"\xff\xd8\xff", "jfif", Some("image/jpeg")),
            DocumentKind::Image
        );
        assert_eq!(
            classify_bytes(b"", "bin", Some("image/gif")),
            DocumentKind::Image
        );
    }

    #[test]
    fn unknown_goes_to_office_engine() {
        assert_eq!(
            classify_bytes(b"PK\x03\x04", "docx", None),
            DocumentKind::OfficeDocument
        );
        assert_eq!(
            classify_bytes(b"{\\rtf1", "rtf", None),
            DocumentKind::OfficeDocument
        );
    }

    #[test]
    fn short_input_is_not_heif() {
        assert!(!is_heif_bytes(b"\x00\x00ftyp"));
        assert!(!is_pdf_bytes(b"%PD"));
    }

    #[test]
    fn classify_reads_file_head() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.docx");
        std::fs::write(&path, b"%PDF-1.4 rest of file").unwrap();
        let artifact = LocalArtifact {
            path,
            extension: "docx".into(),
            mime_type: None,
        };
        assert_eq!(classify(&artifact).unwrap(), DocumentKind::Pdf);
    }
}
