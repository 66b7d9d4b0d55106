//! Source resolution: copy a local file or stream a URL into the workspace.
//!
//! Every run starts by materialising the source as a uniquely named file
//! inside the caller's [`Workspace`], whatever its origin. Later stages can
//! then open it by path (pdfium, soffice and calamine all require one) and
//! the caller's directory owns every byte the run produced.
//!
//! ## Extension resolution
//!
//! Downstream classification keys partly off the extension, so it is
//! resolved here, in order of trust:
//!
//! 1. the response (or guessed) mime type, unless it is an opaque
//!    octet-stream;
//! 2. the original extension of the reference or its path;
//! 3. `bin`, when the mime type says octet-stream.
//!
//! Anything else cannot be routed and fails with
//! [`DocPagesError::UnresolvedExtension`].

use crate::error::DocPagesError;
use crate::workspace::Workspace;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Mime types that say nothing about the content.
const OPAQUE_MIME_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Canonical extensions for mime types whose first `mime_guess` candidate
/// is an obscure alias (`slk` for Excel, `jfif` for JPEG).
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/msword", "doc"),
    ("image/jpeg", "jpg"),
    ("image/tiff", "tiff"),
];

/// A document to process: a URL or local path, plus an optional extension
/// that overrides the one in the path (useful for extensionless URLs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub location: String,
    pub original_extension: Option<String>,
}

impl SourceReference {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            original_extension: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.original_extension = Some(extension.into());
        self
    }

    pub fn is_url(&self) -> bool {
        is_url(&self.location)
    }

    /// The extension the reference claims, normalised to lower case without
    /// a leading dot.
    fn claimed_extension(&self) -> Option<String> {
        let explicit = self
            .original_extension
            .as_deref()
            .map(normalise_extension)
            .filter(|e| !e.is_empty());
        explicit.or_else(|| {
            if self.is_url() {
                url_path_extension(&self.location)
            } else {
                path_extension(Path::new(&self.location))
            }
        })
    }
}

impl From<&str> for SourceReference {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

/// The source, copied or downloaded into the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalArtifact {
    pub path: PathBuf,
    /// Lower case, no leading dot.
    pub extension: String,
    pub mime_type: Option<String>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Materialise `source` as a uniquely named file inside `workspace`.
pub async fn fetch(
    source: &SourceReference,
    workspace: &Workspace,
    timeout_secs: u64,
) -> Result<LocalArtifact, DocPagesError> {
    if source.is_url() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocPagesError::Fetch {
                url: source.location.clone(),
                reason: e.to_string(),
            })?;
        download(&client, source, workspace, timeout_secs).await
    } else {
        copy_local(source, workspace).await
    }
}

/// Copy a local file into the workspace.
async fn copy_local(
    source: &SourceReference,
    workspace: &Workspace,
) -> Result<LocalArtifact, DocPagesError> {
    let path = PathBuf::from(&source.location);
    if !path.is_file() {
        return Err(DocPagesError::NotFound { path });
    }

    let claimed = source.claimed_extension();
    let mime = claimed
        .as_deref()
        .and_then(|ext| mime_guess::from_ext(ext).first_raw())
        .map(str::to_string);

    let extension = resolve_extension(mime.as_deref(), claimed.as_deref()).ok_or_else(|| {
        DocPagesError::UnresolvedExtension {
            source_ref: source.location.clone(),
            mime: mime.clone().unwrap_or_else(|| "unknown".into()),
        }
    })?;

    let local_path = workspace.unique_file(&extension);
    tokio::fs::copy(&path, &local_path)
        .await
        .map_err(|e| DocPagesError::io(&path, e))?;

    debug!("Copied {} → {}", path.display(), local_path.display());
    Ok(LocalArtifact {
        path: local_path,
        extension,
        mime_type: mime,
    })
}

/// Stream a URL into the workspace.
///
/// The extension is settled from the response headers before the body is
/// read, so the file is created under its final name.
async fn download(
    client: &reqwest::Client,
    source: &SourceReference,
    workspace: &Workspace,
    timeout_secs: u64,
) -> Result<LocalArtifact, DocPagesError> {
    let url = source.location.as_str();
    info!("Downloading: {}", url);

    let fetch_err = |e: reqwest::Error| {
        if e.is_timeout() {
            DocPagesError::FetchTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocPagesError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(fetch_err)?;

    if !response.status().is_success() {
        return Err(DocPagesError::Fetch {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(essence);

    let claimed = source.claimed_extension();
    let extension = resolve_extension(mime.as_deref(), claimed.as_deref()).ok_or_else(|| {
        DocPagesError::UnresolvedExtension {
            source_ref: url.to_string(),
            mime: mime.clone().unwrap_or_else(|| "none".into()),
        }
    })?;

    let local_path = workspace.unique_file(&extension);
    let mut file = tokio::fs::File::create(&local_path)
        .await
        .map_err(|e| DocPagesError::io(&local_path, e))?;

    let mut written = 0usize;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(fetch_err)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DocPagesError::io(&local_path, e))?;
        written += chunk.len();
    }
    file.flush()
        .await
        .map_err(|e| DocPagesError::io(&local_path, e))?;

    info!(
        "Downloaded {} bytes to {} ({})",
        written,
        local_path.display(),
        mime.as_deref().unwrap_or("no content-type")
    );

    Ok(LocalArtifact {
        path: local_path,
        extension,
        mime_type: mime,
    })
}

/// Pick the artifact extension from the mime type and the claimed extension.
///
/// Returns `None` when neither yields one and the mime type is not an
/// opaque octet-stream.
pub fn resolve_extension(mime: Option<&str>, claimed: Option<&str>) -> Option<String> {
    let claimed = claimed.map(normalise_extension).filter(|e| !e.is_empty());
    let opaque = mime.is_some_and(|m| OPAQUE_MIME_TYPES.contains(&m));

    if let Some(candidates) = mime
        .filter(|_| !opaque)
        .and_then(mime_guess::get_mime_extensions_str)
    {
        if let Some(ext) = claimed.as_deref() {
            if candidates.contains(&ext) {
                return Some(ext.to_string());
            }
        }
        if let Some((_, preferred)) = PREFERRED_EXTENSIONS
            .iter()
            .find(|(m, _)| mime == Some(*m))
        {
            return Some((*preferred).to_string());
        }
        if let Some(first) = candidates.first() {
            return Some((*first).to_string());
        }
    }

    if claimed.is_some() {
        return claimed;
    }

    opaque.then(|| "bin".to_string())
}

/// `"text/html; charset=utf-8"` → `"text/html"`.
fn essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    (!essence.is_empty()).then_some(essence)
}

fn normalise_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn path_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalise_extension)
        .filter(|e| !e.is_empty())
}

/// Extension of the last path segment of a URL, ignoring the query string.
fn url_path_extension(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    path_extension(Path::new(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn mime_type_wins_over_path() {
        assert_eq!(
            resolve_extension(Some("application/pdf"), Some("docx")).as_deref(),
            Some("pdf")
        );
    }

    #[test]
    fn path_extension_breaks_mime_ties() {
        assert_eq!(
            resolve_extension(Some("image/jpeg"), Some(".JPG")).as_deref(),
            Some("jpg")
        );
    }

    #[test]
    fn legacy_office_mime_types_use_canonical_extension() {
        assert_eq!(
            resolve_extension(Some("application/vnd.ms-excel"), None).as_deref(),
            Some("xls")
        );
        assert_eq!(
            resolve_extension(Some("application/vnd.ms-powerpoint"), None).as_deref(),
            Some("ppt")
        );
        assert_eq!(resolve_extension(Some("image/jpeg"), None).as_deref(), Some("jpg"));
        // A claimed extension the mime type does not list still loses.
        assert_eq!(
            resolve_extension(Some("application/vnd.ms-excel"), Some("xlsx")).as_deref(),
            Some("xls")
        );
    }

    #[tokio::test]
    async fn download_xls_mime_routes_to_spreadsheet() {
        let base = serve_once("200 OK", "application/vnd.ms-excel", b"\xD0\xCF\x11\xE0").await;
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let source = SourceReference::new(format!("{base}/export?id=9"));

        let artifact = download(&loopback_client(), &source, &ws, 5).await.unwrap();
        assert_eq!(artifact.extension, "xls");
        assert_eq!(
            crate::pipeline::classify::classify(&artifact).unwrap(),
            crate::pipeline::classify::DocumentKind::StructuredData
        );
    }

    #[test]
    fn path_extension_when_mime_unknown() {
        assert_eq!(
            resolve_extension(None, Some("xlsx")).as_deref(),
            Some("xlsx")
        );
        assert_eq!(
            resolve_extension(Some("application/x-made-up"), Some("heic")).as_deref(),
            Some("heic")
        );
    }

    #[test]
    fn octet_stream_defers_to_path_then_bin() {
        assert_eq!(
            resolve_extension(Some("application/octet-stream"), Some("pdf")).as_deref(),
            Some("pdf")
        );
        assert_eq!(
            resolve_extension(Some("binary/octet-stream"), None).as_deref(),
            Some("bin")
        );
    }

    #[test]
    fn nothing_to_go_on_is_none() {
        assert_eq!(resolve_extension(None, None), None);
        assert_eq!(resolve_extension(Some("application/x-made-up"), None), None);
    }

    #[test]
    fn url_extension_ignores_query() {
        assert_eq!(
            url_path_extension("https://host/files/Report.PDF?sig=abc.def").as_deref(),
            Some("pdf")
        );
        assert_eq!(url_path_extension("https://host/files/blob"), None);
    }

    #[test]
    fn explicit_extension_overrides_path() {
        let r = SourceReference::new("https://host/download?id=7").with_extension(".XLSX");
        assert_eq!(r.claimed_extension().as_deref(), Some("xlsx"));
    }

    #[test]
    fn essence_strips_parameters() {
        assert_eq!(
            essence("Application/PDF; charset=binary").as_deref(),
            Some("application/pdf")
        );
        assert_eq!(essence(""), None);
    }

    #[tokio::test]
    async fn local_copy_lands_in_workspace() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("report.PDF");
        std::fs::write(&src, b"%PDF-1.4\n").unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let artifact = fetch(&SourceReference::new(src.to_str().unwrap()), &ws, 5)
            .await
            .unwrap();

        assert_eq!(artifact.extension, "pdf");
        assert_eq!(artifact.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(artifact.path.parent(), Some(tmp.path()));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn local_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let err = tokio_test::block_on(fetch(
            &SourceReference::new("/definitely/not/here.pdf"),
            &ws,
            5,
        ))
        .unwrap_err();
        assert!(matches!(err, DocPagesError::NotFound { .. }));
    }

    #[tokio::test]
    async fn local_without_extension_is_unresolved() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("README");
        std::fs::write(&src, b"plain").unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let err = fetch(&SourceReference::new(src.to_str().unwrap()), &ws, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DocPagesError::UnresolvedExtension { .. }));
    }

    /// Serve exactly one HTTP response on a loopback port.
    async fn serve_once(status: &'static str, content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn loopback_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn download_uses_content_type() {
        let base = serve_once("200 OK", "application/pdf", b"%PDF-1.7 body").await;
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let source = SourceReference::new(format!("{base}/download?id=1"));

        let artifact = download(&loopback_client(), &source, &ws, 5).await.unwrap();
        assert_eq!(artifact.extension, "pdf");
        assert_eq!(artifact.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn download_octet_stream_without_extension_is_bin() {
        let base = serve_once("200 OK", "binary/octet-stream", b"\x00\x01").await;
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let source = SourceReference::new(format!("{base}/blob"));

        let artifact = download(&loopback_client(), &source, &ws, 5).await.unwrap();
        assert_eq!(artifact.extension, "bin");
    }

    #[tokio::test]
    async fn download_non_success_is_fetch_error() {
        let base = serve_once("404 Not Found", "text/plain", b"nope").await;
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let source = SourceReference::new(format!("{base}/missing.pdf"));

        let err = download(&loopback_client(), &source, &ws, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DocPagesError::Fetch { .. }), "got {err:?}");
        assert!(err.to_string().contains("404"));
    }
}
