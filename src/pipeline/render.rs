//! PDF rasterisation: render selected pages to PNG files in the workspace.
//!
//! ## Strategies
//!
//! Rendering goes through an ordered list of [`RenderStrategy`] values
//! (pdfium first, `pdftoppm` second by default). Each strategy's output is
//! checked against an explicit post-condition before it is accepted: every
//! result must name a page and an existing file, and the pages must be
//! exactly the requested ones. A strategy that errors *or* fails the check
//! hands over to the next one. When none is left the document fails with
//! [`DocPagesError::Render`]; a partial set of images is never returned.
//!
//! pdfium returns a structured page → file map. `pdftoppm` does not, so its
//! results are reconciled by scanning the workspace for
//! `{prefix}-{page}.png`. The scan is best-effort, which is why the fallback
//! writes under its own prefix and one workspace holds one document.
//!
//! ## Why scale height for tall pages?
//!
//! A receipt or a long web capture squeezed into a 2048 px tall image has
//! unreadably small text. Above [`crate::config::ASPECT_RATIO_THRESHOLD`]
//! the target height grows with the aspect ratio, see
//! [`crate::config::adjusted_height`].

use crate::config::{adjusted_height, ConversionConfig, ExternalTools, PageSelection, RenderStrategy};
use crate::error::DocPagesError;
use crate::workspace::Workspace;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

static PDFINFO_PAGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)").expect("valid regex"));
static PDFINFO_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Page size:\s+([\d.]+)\s+x\s+([\d.]+)").expect("valid regex")
});
static FALLBACK_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\d+)\.png$").expect("valid regex"));

/// Page count and first-page shape of a PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfGeometry {
    /// `None` when no probe could open the document.
    pub page_count: Option<usize>,
    /// Height / width of the first page; 1.0 when unknown.
    pub aspect_ratio: f64,
}

/// One strategy result before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedPage {
    pub page: Option<usize>,
    pub path: Option<PathBuf>,
}

/// Validated rasterisation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    /// Probed page count; without a probe, the highest rendered page.
    pub total_pages: usize,
    /// `(1-based page, image path)` in ascending page order.
    pub pages: Vec<(usize, PathBuf)>,
}

/// Everything a strategy needs to render one document.
#[derive(Debug, Clone)]
struct RenderJob {
    pdf: PathBuf,
    selection: PageSelection,
    /// Requested pages, or `None` for "all" when the page count is unknown.
    expected: Option<Vec<usize>>,
    dpi: u32,
    height: u32,
    preserve_aspect_ratio: bool,
    /// Output file stem shared by every image of this document.
    stem: String,
    out_dir: PathBuf,
}

/// Rasterise the selected pages of `pdf` into `workspace`.
pub async fn render_pdf(
    pdf: &Path,
    workspace: &Workspace,
    config: &ConversionConfig,
) -> Result<RenderedPdf, DocPagesError> {
    let geometry = probe_geometry(pdf, &config.tools).await;
    info!(
        "PDF {}: {} pages, aspect ratio {:.3}",
        pdf.display(),
        geometry
            .page_count
            .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        geometry.aspect_ratio
    );

    let expected = match geometry.page_count {
        Some(total) => Some(config.pages.page_numbers(total)?),
        None => match &config.pages {
            PageSelection::All => None,
            selection => Some(selection.page_numbers(usize::MAX)?),
        },
    };

    let height = adjusted_height(geometry.aspect_ratio, config.image_height);
    if height != config.image_height {
        debug!(
            "Tall page (ratio {:.2}): target height {} → {}",
            geometry.aspect_ratio, config.image_height, height
        );
    }

    let stem = pdf
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();

    let job = RenderJob {
        pdf: pdf.to_path_buf(),
        selection: config.pages.clone(),
        expected,
        dpi: config.dpi,
        height,
        preserve_aspect_ratio: config.preserve_aspect_ratio,
        stem,
        out_dir: workspace.path().to_path_buf(),
    };

    let mut failures = Vec::new();
    for &strategy in &config.render_strategies {
        let attempt = match strategy {
            RenderStrategy::Pdfium => render_with_pdfium(&job, &config.tools).await,
            RenderStrategy::Pdftoppm => render_with_pdftoppm(&job, &config.tools.pdftoppm).await,
        };

        match attempt.and_then(|results| validate_pages(pdf, job.expected.as_deref(), results)) {
            Ok(pages) => {
                info!("Rendered {} pages with {}", pages.len(), strategy);
                let total_pages = geometry
                    .page_count
                    .unwrap_or_else(|| inferred_total(&pages));
                return Ok(RenderedPdf { total_pages, pages });
            }
            Err(e) => {
                warn!("{} could not render {}: {}", strategy, pdf.display(), e);
                failures.push(format!("{strategy}: {e}"));
            }
        }
    }

    Err(DocPagesError::Render {
        path: pdf.to_path_buf(),
        detail: failures.join("; "),
    })
}

/// Accept strategy output only if it covers exactly the expected pages with
/// existing files. With `expected == None` any non-empty, duplicate-free
/// result is accepted.
pub fn validate_pages(
    pdf: &Path,
    expected: Option<&[usize]>,
    results: Vec<RasterizedPage>,
) -> Result<Vec<(usize, PathBuf)>, DocPagesError> {
    let render_err = |detail: String| DocPagesError::Render {
        path: pdf.to_path_buf(),
        detail,
    };

    let mut pages = Vec::with_capacity(results.len());
    for result in results {
        let (Some(page), Some(path)) = (result.page, result.path) else {
            return Err(render_err("could not identify page data".into()));
        };
        if !path.is_file() {
            return Err(render_err(format!(
                "page {page} image missing: {}",
                path.display()
            )));
        }
        pages.push((page, path));
    }
    pages.sort_by_key(|(page, _)| *page);

    let numbers: Vec<usize> = pages.iter().map(|(p, _)| *p).collect();
    if numbers.windows(2).any(|w| w[0] == w[1]) {
        return Err(render_err("duplicate page in output".into()));
    }

    match expected {
        Some(expected) if numbers != expected => Err(render_err(format!(
            "expected {} pages {:?}, got {} pages {:?}",
            expected.len(),
            expected,
            numbers.len(),
            numbers
        ))),
        None if numbers.is_empty() => Err(render_err("no pages were produced".into())),
        _ => Ok(pages),
    }
}

/// Lower bound on the page count when no probe could read it: the document
/// has at least as many pages as the highest page rendered from it.
fn inferred_total(pages: &[(usize, PathBuf)]) -> usize {
    pages
        .iter()
        .map(|(page, _)| *page)
        .max()
        .unwrap_or(0)
        .max(pages.len())
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Page count and first-page aspect ratio, from pdfium, else `pdfinfo`.
pub async fn probe_geometry(pdf: &Path, tools: &ExternalTools) -> PdfGeometry {
    let path = pdf.to_path_buf();
    let library = tools.pdfium_library.clone();
    let from_pdfium =
        tokio::task::spawn_blocking(move || probe_with_pdfium(&path, library.as_deref())).await;

    match from_pdfium {
        Ok(Ok(geometry)) => return geometry,
        Ok(Err(e)) => debug!("pdfium geometry probe failed: {}", e),
        Err(e) => debug!("pdfium geometry task panicked: {}", e),
    }

    match Command::new(&tools.pdfinfo).arg(pdf).output().await {
        Ok(out) if out.status.success() => parse_pdfinfo(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            debug!("pdfinfo exited with {}", out.status);
            PdfGeometry {
                page_count: None,
                aspect_ratio: 1.0,
            }
        }
        Err(e) => {
            debug!("pdfinfo unavailable: {}", e);
            PdfGeometry {
                page_count: None,
                aspect_ratio: 1.0,
            }
        }
    }
}

fn probe_with_pdfium(pdf: &Path, library: Option<&Path>) -> Result<PdfGeometry, DocPagesError> {
    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| DocPagesError::Render {
            path: pdf.to_path_buf(),
            detail: format!("{e:?}"),
        })?;
    let pages = document.pages();
    let page_count = pages.len() as usize;

    let aspect_ratio = pages
        .get(0)
        .ok()
        .and_then(|page| {
            let (w, h) = (page.width().value, page.height().value);
            (w > 0.0 && h > 0.0).then(|| f64::from(h) / f64::from(w))
        })
        .unwrap_or(1.0);

    Ok(PdfGeometry {
        page_count: Some(page_count),
        aspect_ratio,
    })
}

/// Read `Pages:` and the first `Page size:` line of `pdfinfo` output.
pub fn parse_pdfinfo(stdout: &str) -> PdfGeometry {
    let page_count = PDFINFO_PAGES
        .captures(stdout)
        .and_then(|c| c[1].parse::<usize>().ok());

    let aspect_ratio = PDFINFO_SIZE
        .captures(stdout)
        .and_then(|c| {
            let width = c[1].parse::<f64>().ok()?;
            let height = c[2].parse::<f64>().ok()?;
            (width > 0.0 && height > 0.0).then(|| height / width)
        })
        .unwrap_or(1.0);

    PdfGeometry {
        page_count,
        aspect_ratio,
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Bind the configured pdfium library, else `PDFIUM_LIB_PATH`, else the
/// system one. Unlike `Pdfium::default()` this never panics.
fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, DocPagesError> {
    let library = library
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocPagesError::Render {
        path: PathBuf::from("pdfium"),
        detail: format!("cannot bind pdfium library: {e:?}"),
    })?;

    Ok(Pdfium::new(bindings))
}

async fn render_with_pdfium(
    job: &RenderJob,
    tools: &ExternalTools,
) -> Result<Vec<RasterizedPage>, DocPagesError> {
    let job = job.clone();
    let library = tools.pdfium_library.clone();
    tokio::task::spawn_blocking(move || render_with_pdfium_blocking(&job, library.as_deref()))
        .await
        .map_err(|e| DocPagesError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of the pdfium strategy. Writes `{stem}.{page}.png`.
fn render_with_pdfium_blocking(
    job: &RenderJob,
    library: Option<&Path>,
) -> Result<Vec<RasterizedPage>, DocPagesError> {
    let render_err = |detail: String| DocPagesError::Render {
        path: job.pdf.clone(),
        detail,
    };

    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_file(&job.pdf, None)
        .map_err(|e| render_err(format!("{e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let targets = job
        .expected
        .clone()
        .unwrap_or_else(|| (1..=total_pages).collect());

    let render_config = if job.preserve_aspect_ratio {
        PdfRenderConfig::new().set_target_height(job.height as i32)
    } else {
        PdfRenderConfig::new().scale_page_by_factor(job.dpi as f32 / 72.0)
    };

    let mut results = Vec::with_capacity(targets.len());
    for page_num in targets {
        if page_num == 0 || page_num > total_pages {
            return Err(DocPagesError::PageOutOfRange {
                page: page_num,
                total: total_pages,
            });
        }

        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| render_err(format!("page {page_num}: {e:?}")))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_err(format!("page {page_num}: {e:?}")))?;

        let image = bitmap.as_image();
        let path = job.out_dir.join(format!("{}.{}.png", job.stem, page_num));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| render_err(format!("page {page_num}: {e}")))?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        results.push(RasterizedPage {
            page: Some(page_num),
            path: Some(path),
        });
    }

    Ok(results)
}

// ── pdftoppm ─────────────────────────────────────────────────────────────

/// Page ranges for the fallback invocations: one unrestricted run for
/// `All`, one `[n, n]` run for `Single(n)`, one `[i, i]` run per set member.
pub fn fallback_ranges(selection: &PageSelection) -> Vec<Option<(usize, usize)>> {
    match selection {
        PageSelection::All => vec![None],
        PageSelection::Single(n) => vec![Some((*n, *n))],
        PageSelection::Set(members) => {
            let mut members = members.clone();
            members.sort_unstable();
            members.dedup();
            members.into_iter().map(|i| Some((i, i))).collect()
        }
    }
}

async fn render_with_pdftoppm(
    job: &RenderJob,
    pdftoppm: &Path,
) -> Result<Vec<RasterizedPage>, DocPagesError> {
    let prefix_name = format!("{}-fallback", job.stem);
    let prefix = job.out_dir.join(&prefix_name);

    let runs = fallback_ranges(&job.selection)
        .into_iter()
        .map(|range| run_pdftoppm(job, pdftoppm, &prefix, range));
    // Unbounded fan-out: one process per explicitly selected page.
    futures::future::try_join_all(runs).await?;

    scan_fallback_output(&job.out_dir, &prefix_name)
}

async fn run_pdftoppm(
    job: &RenderJob,
    pdftoppm: &Path,
    prefix: &Path,
    range: Option<(usize, usize)>,
) -> Result<(), DocPagesError> {
    let render_err = |detail: String| DocPagesError::Render {
        path: job.pdf.clone(),
        detail,
    };

    let mut cmd = Command::new(pdftoppm);
    cmd.arg("-png").arg("-r").arg(job.dpi.to_string());
    if job.preserve_aspect_ratio {
        cmd.arg("-scale-to-y")
            .arg(job.height.to_string())
            .arg("-scale-to-x")
            .arg("-1");
    }
    if let Some((first, last)) = range {
        cmd.arg("-f")
            .arg(first.to_string())
            .arg("-l")
            .arg(last.to_string());
    }
    cmd.arg(&job.pdf).arg(prefix);

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            render_err(format!(
                "{} not found. Install poppler-utils to enable the fallback renderer.",
                pdftoppm.display()
            ))
        } else {
            render_err(e.to_string())
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(render_err(format!(
            "pdftoppm {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Collect `{prefix}*.png` files from `dir`, recovering page numbers from
/// the trailing `-{digits}` that `pdftoppm` appends.
pub fn scan_fallback_output(
    dir: &Path,
    prefix_name: &str,
) -> Result<Vec<RasterizedPage>, DocPagesError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DocPagesError::io(dir, e))?;

    let mut results = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix_name) || !name.ends_with(".png") {
            continue;
        }
        let page = FALLBACK_PAGE
            .captures(&name[prefix_name.len()..])
            .and_then(|c| c[1].parse::<usize>().ok());
        results.push(RasterizedPage {
            page,
            path: Some(path),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"png").unwrap();
        p
    }

    #[test]
    fn validate_accepts_exact_pages_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let a = touch(tmp.path(), "d.1.png");
        let c = touch(tmp.path(), "d.3.png");
        let results = vec![
            RasterizedPage {
                page: Some(3),
                path: Some(c.clone()),
            },
            RasterizedPage {
                page: Some(1),
                path: Some(a.clone()),
            },
        ];
        let pages = validate_pages(Path::new("d.pdf"), Some(&[1, 3]), results).unwrap();
        assert_eq!(pages, vec![(1, a), (3, c)]);
    }

    #[test]
    fn validate_rejects_missing_page_number() {
        let tmp = tempfile::tempdir().unwrap();
        let a = touch(tmp.path(), "d.png");
        let results = vec![RasterizedPage {
            page: None,
            path: Some(a),
        }];
        let err = validate_pages(Path::new("d.pdf"), None, results).unwrap_err();
        assert!(err.to_string().contains("page data"), "got: {err}");
    }

    #[test]
    fn validate_rejects_missing_file() {
        let results = vec![RasterizedPage {
            page: Some(1),
            path: Some(PathBuf::from("/definitely/not/here.png")),
        }];
        let err = validate_pages(Path::new("d.pdf"), Some(&[1]), results).unwrap_err();
        assert!(err.is_render_error());
    }

    #[test]
    fn validate_rejects_count_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let a = touch(tmp.path(), "d.1.png");
        let results = vec![RasterizedPage {
            page: Some(1),
            path: Some(a),
        }];
        let err = validate_pages(Path::new("d.pdf"), Some(&[1, 2]), results).unwrap_err();
        assert!(err.to_string().contains("expected 2 pages"), "got: {err}");
    }

    #[test]
    fn validate_unknown_total_requires_output() {
        let err = validate_pages(Path::new("d.pdf"), None, vec![]).unwrap_err();
        assert!(err.to_string().contains("no pages"));
    }

    #[test]
    fn unknown_total_is_at_least_highest_page() {
        let pages = vec![(2, PathBuf::from("d-fallback-2.png"))];
        assert_eq!(inferred_total(&pages), 2);
        let pages = vec![
            (1, PathBuf::from("d-fallback-1.png")),
            (3, PathBuf::from("d-fallback-3.png")),
        ];
        assert_eq!(inferred_total(&pages), 3);
        assert_eq!(inferred_total(&[]), 0);
    }

    #[test]
    fn fallback_invocation_shapes() {
        assert_eq!(fallback_ranges(&PageSelection::All), vec![None]);
        assert_eq!(
            fallback_ranges(&PageSelection::Single(4)),
            vec![Some((4, 4))]
        );
        assert_eq!(
            fallback_ranges(&PageSelection::Set(vec![3, 1, 3])),
            vec![Some((1, 1)), Some((3, 3))]
        );
    }

    #[test]
    fn scan_matches_prefix_and_parses_pages() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "doc-fallback-01.png");
        touch(tmp.path(), "doc-fallback-12.png");
        touch(tmp.path(), "doc.1.png"); // primary leftover
        touch(tmp.path(), "doc-fallback-02.jpg");
        touch(tmp.path(), "other-fallback-1.png");

        let mut found = scan_fallback_output(tmp.path(), "doc-fallback").unwrap();
        found.sort_by_key(|r| r.page);
        let pages: Vec<_> = found.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![Some(1), Some(12)]);
    }

    #[test]
    fn parse_pdfinfo_output() {
        let out = "Title:          x\nPages:          3\nEncrypted:      no\n\
                   Page size:      612 x 792 pts (letter)\nPage rot:       0\n";
        let g = parse_pdfinfo(out);
        assert_eq!(g.page_count, Some(3));
        assert!((g.aspect_ratio - 792.0 / 612.0).abs() < 1e-9);
    }

    #[test]
    fn parse_pdfinfo_defaults_ratio() {
        let g = parse_pdfinfo("Pages: 2\n");
        assert_eq!(g.page_count, Some(2));
        assert_eq!(g.aspect_ratio, 1.0);
        assert_eq!(parse_pdfinfo("garbage").page_count, None);
    }

    #[tokio::test]
    async fn all_strategies_failing_is_render_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::from_temp_dir(&tmp);
        let pdf = ws.join("broken.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\nnot really\n").unwrap();

        let tools = ExternalTools {
            pdftoppm: PathBuf::from("/definitely/not/pdftoppm"),
            pdfinfo: PathBuf::from("/definitely/not/pdfinfo"),
            pdfium_library: Some(PathBuf::from("/definitely/not/libpdfium.so")),
            ..ExternalTools::default()
        };
        let config = ConversionConfig::builder()
            .pages(PageSelection::Single(1))
            .tools(tools)
            .build()
            .unwrap();

        let err = render_pdf(&pdf, &ws, &config).await.unwrap_err();
        match err {
            DocPagesError::Render { detail, .. } => {
                assert!(detail.contains("pdfium:"), "got: {detail}");
                assert!(detail.contains("pdftoppm:"), "got: {detail}");
            }
            other => panic!("expected Render, got {other:?}"),
        }
    }
}
