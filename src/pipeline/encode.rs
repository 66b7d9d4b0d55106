//! Image encoding: page image file → base64 payload with its mime type.
//!
//! Vision/OCR services take images as base64 data embedded in a JSON
//! request body. PNG and JPEG files are passed through byte-for-byte; any
//! other raster format is re-encoded as PNG, which is lossless and keeps
//! rendered text crisp.

use crate::error::DocPagesError;
use crate::output::RenderedPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// A base64 image ready for an extraction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard base64, no line breaks.
    pub data: String,
}

impl EncodedImage {
    /// `data:{mime};base64,{data}`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode an image page. Text pages have nothing to encode and yield `None`.
pub fn encode_page(page: &RenderedPage) -> Result<Option<EncodedImage>, DocPagesError> {
    page.image_path().map(encode_image_file).transpose()
}

/// Base64-encode an image file, re-encoding to PNG unless it already is
/// PNG or JPEG.
pub fn encode_image_file(path: &Path) -> Result<EncodedImage, DocPagesError> {
    let bytes = std::fs::read(path).map_err(|e| DocPagesError::io(path, e))?;

    let (mime_type, bytes) = match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => ("image/png", bytes),
        Ok(ImageFormat::Jpeg) => ("image/jpeg", bytes),
        _ => {
            let img = image::load_from_memory(&bytes).map_err(|e| DocPagesError::Render {
                path: path.to_path_buf(),
                detail: format!("cannot decode image for encoding: {e}"),
            })?;
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| DocPagesError::Render {
                    path: path.to_path_buf(),
                    detail: format!("cannot re-encode image as PNG: {e}"),
                })?;
            ("image/png", buf)
        }
    };

    let data = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), data.len());

    Ok(EncodedImage {
        mime_type: mime_type.to_string(),
        data,
    })
}
