//! Configuration types for document-to-pages conversion.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`] or deserialised from JSON (every field
//! has a default, so a config file only needs the keys it changes).

use crate::error::DocPagesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pages taller than `ASPECT_RATIO_THRESHOLD` × their width are rendered
/// with a proportionally larger target height.
pub const ASPECT_RATIO_THRESHOLD: f64 = 5.0;

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use docpages::{ConversionConfig, PageSelection, SpreadsheetFormat};
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .pages(PageSelection::Set(vec![1, 3]))
///     .spreadsheet_format(SpreadsheetFormat::Markdown)
///     .build()
///     .unwrap();
/// assert_eq!(config.image_height, 2048);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Rasterisation density in DPI. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Base target height of rendered page images in pixels. Default: 2048.
    ///
    /// Raised for unusually tall pages, see [`adjusted_height`].
    pub image_height: u32,

    /// Keep the page's aspect ratio when scaling to `image_height`. Default: true.
    ///
    /// When false, pages are rendered at the size implied by `dpi` alone.
    pub preserve_aspect_ratio: bool,

    /// Which pages (or sheets) to produce. Default: all.
    pub pages: PageSelection,

    /// Serialisation used for spreadsheet sheets. Default: HTML.
    pub spreadsheet_format: SpreadsheetFormat,

    /// Crop a uniform border from every image page. Default: false.
    pub trim_edges: bool,

    /// Rasterisation strategies, tried in order until one passes validation.
    /// Default: pdfium, then pdftoppm.
    pub render_strategies: Vec<RenderStrategy>,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Locations of the external engines.
    pub tools: ExternalTools,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            image_height: 2048,
            preserve_aspect_ratio: true,
            pages: PageSelection::default(),
            spreadsheet_format: SpreadsheetFormat::default(),
            trim_edges: false,
            render_strategies: vec![RenderStrategy::Pdfium, RenderStrategy::Pdftoppm],
            download_timeout_secs: 120,
            tools: ExternalTools::default(),
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the constraints the builder enforces; used for configs that
    /// were deserialised rather than built.
    pub fn validate(&self) -> Result<(), DocPagesError> {
        if !(72..=600).contains(&self.dpi) {
            return Err(DocPagesError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.dpi
            )));
        }
        if self.image_height < 16 {
            return Err(DocPagesError::InvalidConfig(format!(
                "image height must be ≥ 16 px, got {}",
                self.image_height
            )));
        }
        if self.render_strategies.is_empty() {
            return Err(DocPagesError::InvalidConfig(
                "at least one render strategy is required".into(),
            ));
        }
        self.pages.validate()
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn image_height(mut self, px: u32) -> Self {
        self.config.image_height = px.max(16);
        self
    }

    pub fn preserve_aspect_ratio(mut self, v: bool) -> Self {
        self.config.preserve_aspect_ratio = v;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn spreadsheet_format(mut self, format: SpreadsheetFormat) -> Self {
        self.config.spreadsheet_format = format;
        self
    }

    pub fn trim_edges(mut self, v: bool) -> Self {
        self.config.trim_edges = v;
        self
    }

    pub fn render_strategies(mut self, strategies: Vec<RenderStrategy>) -> Self {
        self.config.render_strategies = strategies;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn tools(mut self, tools: ExternalTools) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, DocPagesError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Executables and libraries the pipeline shells out to.
///
/// Plain names are resolved through `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalTools {
    /// LibreOffice binary used for office → PDF conversion.
    pub soffice: PathBuf,
    /// Poppler rasteriser used as the fallback strategy.
    pub pdftoppm: PathBuf,
    /// Poppler info tool, consulted when pdfium cannot report page geometry.
    pub pdfinfo: PathBuf,
    /// libheif converter for HEIC photos.
    pub heif_convert: PathBuf,
    /// Explicit pdfium shared library. Falls back to `PDFIUM_LIB_PATH`,
    /// then the system library.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            soffice: PathBuf::from("soffice"),
            pdftoppm: PathBuf::from("pdftoppm"),
            pdfinfo: PathBuf::from("pdfinfo"),
            heif_convert: PathBuf::from("heif-convert"),
            pdfium_library: None,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// A way of turning PDF pages into image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStrategy {
    /// In-process rendering through the pdfium library.
    Pdfium,
    /// The poppler `pdftoppm` command.
    Pdftoppm,
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStrategy::Pdfium => f.write_str("pdfium"),
            RenderStrategy::Pdftoppm => f.write_str("pdftoppm"),
        }
    }
}

/// Markup produced for each spreadsheet sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    /// `<h2>` heading plus a `<table>` (default).
    #[default]
    Html,
    /// `## Sheet:` heading plus a GFM pipe table.
    Markdown,
}

/// Specifies which pages of the document to produce. All indices are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// One page of a PDF; the first N sheets of a workbook.
    Single(usize),
    /// Specific pages, order-insensitive, deduplicated.
    Set(Vec<usize>),
}

impl PageSelection {
    /// Reject indices that can never match a page.
    pub fn validate(&self) -> Result<(), DocPagesError> {
        match self {
            PageSelection::All => Ok(()),
            PageSelection::Single(0) => Err(DocPagesError::InvalidConfig(
                "pages are 1-indexed, got 0".into(),
            )),
            PageSelection::Single(_) => Ok(()),
            PageSelection::Set(pages) if pages.is_empty() => Err(DocPagesError::InvalidConfig(
                "page set must not be empty".into(),
            )),
            PageSelection::Set(pages) if pages.contains(&0) => Err(DocPagesError::InvalidConfig(
                "pages are 1-indexed, got 0".into(),
            )),
            PageSelection::Set(_) => Ok(()),
        }
    }

    /// Expand the selection against a paged document of `total_pages` pages
    /// into a sorted, deduplicated list of 1-based page numbers.
    ///
    /// Every selected page must exist: a page past the end is an error
    /// rather than being dropped, so the output length always equals the
    /// selection's cardinality.
    pub fn page_numbers(&self, total_pages: usize) -> Result<Vec<usize>, DocPagesError> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => vec![*p],
            PageSelection::Set(pages) => pages.clone(),
        };
        pages.sort_unstable();
        pages.dedup();
        if let Some(&bad) = pages.iter().find(|&&p| p == 0 || p > total_pages) {
            return Err(DocPagesError::PageOutOfRange {
                page: bad,
                total: total_pages,
            });
        }
        Ok(pages)
    }

    /// Expand the selection against a workbook of `total_sheets` sheets
    /// into ascending 1-based sheet positions.
    ///
    /// `Single(n)` keeps the *first n* sheets, unlike [`Self::page_numbers`].
    /// Set members with no matching sheet are ignored.
    pub fn sheet_positions(&self, total_sheets: usize) -> Vec<usize> {
        match self {
            PageSelection::All => (1..=total_sheets).collect(),
            PageSelection::Single(n) => (1..=(*n).min(total_sheets)).collect(),
            PageSelection::Set(members) => (1..=total_sheets)
                .filter(|pos| members.contains(pos))
                .collect(),
        }
    }
}

/// Target render height for a page with the given height/width ratio.
///
/// Tall, narrow pages would lose detail at `base_height`, so above
/// [`ASPECT_RATIO_THRESHOLD`] the height grows with the ratio.
pub fn adjusted_height(aspect_ratio: f64, base_height: u32) -> u32 {
    if aspect_ratio > ASPECT_RATIO_THRESHOLD {
        let scaled = (aspect_ratio * f64::from(base_height)).round();
        base_height.max(scaled.min(f64::from(u32::MAX)) as u32)
    } else {
        base_height
    }
}
