//! Office → PDF normalisation through LibreOffice.
//!
//! Word, PowerPoint, RTF, OpenDocument and legacy compound-binary files are
//! all handed to `soffice --headless --convert-to pdf`, and the result is
//! rasterised like any other PDF. The engine is a black box: it either
//! leaves a valid PDF next to the input or the call fails with
//! [`DocPagesError::Conversion`]. Nothing is retried here.
//!
//! LibreOffice refuses to run two instances on one user profile, so every
//! workspace gets its own profile directory.

use crate::error::DocPagesError;
use crate::pipeline::classify::is_pdf_bytes;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const ENGINE: &str = "soffice";
const PROFILE_DIR: &str = ".soffice-profile";

/// Convert in-memory office document bytes to a PDF inside the workspace.
///
/// `extension` tells the engine which import filter to try first.
pub async fn to_pdf(
    bytes: &[u8],
    extension: &str,
    workspace: &Workspace,
    soffice: &Path,
) -> Result<PathBuf, DocPagesError> {
    let staged = workspace.unique_file(extension.trim_start_matches('.'));
    tokio::fs::write(&staged, bytes)
        .await
        .map_err(|e| DocPagesError::io(&staged, e))?;
    convert_file(&staged, workspace, soffice).await
}

/// Convert an office document already inside the workspace to
/// `{stem}.pdf` next to it.
pub async fn convert_file(
    input: &Path,
    workspace: &Workspace,
    soffice: &Path,
) -> Result<PathBuf, DocPagesError> {
    let conversion_err = |detail: String| DocPagesError::Conversion {
        engine: ENGINE.to_string(),
        path: input.to_path_buf(),
        detail,
    };

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| conversion_err("input has no file name".into()))?;
    let output = workspace.join(format!("{stem}.pdf"));

    // A mislabelled `.pdf` would be overwritten by its own output.
    let input = if output == input {
        let renamed = workspace.join(format!("{stem}.doc"));
        tokio::fs::rename(input, &renamed)
            .await
            .map_err(|e| DocPagesError::io(input, e))?;
        renamed
    } else {
        input.to_path_buf()
    };

    let profile = workspace.join(PROFILE_DIR);
    let profile_url = file_url(&profile)?;
    info!("Converting {} to PDF with {}", input.display(), soffice.display());

    let result = Command::new(soffice)
        .arg(format!("-env:UserInstallation={profile_url}"))
        .arg("--headless")
        .arg("--norestore")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(workspace.path())
        .arg(&input)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                conversion_err(format!(
                    "{} not found. Install LibreOffice to convert office documents.",
                    soffice.display()
                ))
            } else {
                conversion_err(e.to_string())
            }
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(conversion_err(format!(
            "{} ({})",
            result.status,
            stderr.trim()
        )));
    }

    // soffice exits 0 for some import failures; trust only the output file.
    let head = match tokio::fs::read(&output).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(conversion_err(format!(
                "no PDF was produced ({})",
                stderr.trim()
            )));
        }
    };
    if !is_pdf_bytes(&head) {
        return Err(conversion_err("output is not a PDF".into()));
    }

    debug!("Converted to {} ({} bytes)", output.display(), head.len());
    Ok(output)
}

/// Percent-encoded `file://` URL of a path, as `-env:` expects.
fn file_url(dir: &Path) -> Result<reqwest::Url, DocPagesError> {
    let bad_path = |detail: String| DocPagesError::Conversion {
        engine: ENGINE.to_string(),
        path: dir.to_path_buf(),
        detail,
    };
    let absolute = std::path::absolute(dir).map_err(|e| bad_path(e.to_string()))?;
    reqwest::Url::from_file_path(&absolute)
        .map_err(|_| bad_path("profile path cannot be expressed as a file URL".into()))
}
