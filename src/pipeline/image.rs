//! Image pages: HEIC decoding, single-image selection and edge trimming.
//!
//! A photo or scan is already a page; it only needs to become a format the
//! downstream vision model accepts (HEIC does not qualify) and, optionally,
//! lose the scanner-bed border around it. Trimming is CPU-bound and
//! independent per image, so all pages are trimmed concurrently on the
//! blocking pool and joined before assembly.

use crate::config::PageSelection;
use crate::error::DocPagesError;
use crate::workspace::Workspace;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const HEIF_ENGINE: &str = "heif-convert";

/// Per-channel difference below which a pixel counts as background.
const TRIM_TOLERANCE: u8 = 12;

/// Decode a HEIC/HEIF photo to `{stem}.jpg` inside the workspace.
pub async fn heic_to_jpeg(
    input: &Path,
    workspace: &Workspace,
    heif_convert: &Path,
) -> Result<PathBuf, DocPagesError> {
    let conversion_err = |detail: String| DocPagesError::Conversion {
        engine: HEIF_ENGINE.to_string(),
        path: input.to_path_buf(),
        detail,
    };

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| conversion_err("input has no file name".into()))?;
    let output = workspace.join(format!("{stem}.jpg"));

    info!("Decoding HEIC {}", input.display());
    let result = Command::new(heif_convert)
        .arg("-q")
        .arg("100")
        .arg(input)
        .arg(&output)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                conversion_err(format!(
                    "{} not found. Install libheif to decode HEIC photos.",
                    heif_convert.display()
                ))
            } else {
                conversion_err(e.to_string())
            }
        })?;

    if !result.status.success() || !output.is_file() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(conversion_err(format!(
            "{} ({})",
            result.status,
            stderr.trim()
        )));
    }
    Ok(output)
}

/// Treat a single image as a one-page document and apply the selection.
pub fn select_image_page(
    path: PathBuf,
    selection: &PageSelection,
) -> Result<Vec<(usize, PathBuf)>, DocPagesError> {
    let pages = selection.page_numbers(1)?;
    Ok(pages.into_iter().map(|p| (p, path.clone())).collect())
}

/// Trim every image in place, concurrently.
pub async fn trim_all(paths: &[PathBuf]) -> Result<(), DocPagesError> {
    let tasks = paths.iter().cloned().map(|path| async move {
        tokio::task::spawn_blocking(move || trim_file(&path))
            .await
            .map_err(|e| DocPagesError::Internal(format!("Trim task panicked: {e}")))?
    });
    futures::future::try_join_all(tasks).await?;
    Ok(())
}

/// Crop the uniform border of an image file, rewriting it in place.
///
/// Formats the image stack cannot encode are left untouched.
fn trim_file(path: &Path) -> Result<(), DocPagesError> {
    let format = match ImageFormat::from_path(path) {
        Ok(
            f @ (ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::WebP),
        ) => f,
        _ => {
            debug!("Not trimming {}: unsupported format", path.display());
            return Ok(());
        }
    };

    let img = image::open(path).map_err(|e| DocPagesError::Render {
        path: path.to_path_buf(),
        detail: format!("cannot decode image for trimming: {e}"),
    })?;

    if let Some(trimmed) = trim_border(&img) {
        debug!(
            "Trimmed {} from {}x{} to {}x{}",
            path.display(),
            img.width(),
            img.height(),
            trimmed.width(),
            trimmed.height()
        );
        trimmed
            .save_with_format(path, format)
            .map_err(|e| DocPagesError::Render {
                path: path.to_path_buf(),
                detail: format!("cannot write trimmed image: {e}"),
            })?;
    }
    Ok(())
}

/// The image cropped to the content box, or `None` when there is nothing to
/// crop (no border, or the whole image is background).
pub fn trim_border(img: &DynamicImage) -> Option<DynamicImage> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let background = img.get_pixel(0, 0);

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
    for (x, y, px) in img.pixels() {
        if !is_background(px, background) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x > max_x || min_y > max_y {
        return None;
    }
    let (cw, ch) = (max_x - min_x + 1, max_y - min_y + 1);
    if cw == w && ch == h {
        return None;
    }
    Some(img.crop_imm(min_x, min_y, cw, ch))
}

fn is_background(px: Rgba<u8>, background: Rgba<u8>) -> bool {
    px.0.iter()
        .zip(background.0.iter())
        .all(|(a, b)| a.abs_diff(*b) <= TRIM_TOLERANCE)
}
