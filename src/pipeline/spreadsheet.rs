//! Spreadsheet transcoding: one text page per worksheet.
//!
//! Workbooks are read with calamine (xlsx, xlsm, xlsb, xls, ods) and every
//! sheet is serialised to HTML or a GFM pipe table. Transcoding is
//! all-or-nothing: a sheet that cannot be read fails the whole call.

use crate::config::{PageSelection, SpreadsheetFormat};
use crate::error::DocPagesError;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::{debug, info};

const TABLE_CLASS: &str = "docpages-sheet";

/// Transcoded workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedWorkbook {
    pub total_sheets: usize,
    /// `(1-based sheet position, markup)` for the selected sheets.
    pub sheets: Vec<(usize, String)>,
}

/// Transcode the selected sheets of the workbook at `path`.
pub async fn transcode(
    path: &Path,
    format: SpreadsheetFormat,
    selection: &PageSelection,
) -> Result<TranscodedWorkbook, DocPagesError> {
    let path = path.to_path_buf();
    let selection = selection.clone();
    tokio::task::spawn_blocking(move || transcode_blocking(&path, format, &selection))
        .await
        .map_err(|e| DocPagesError::Internal(format!("Transcode task panicked: {e}")))?
}

fn transcode_blocking(
    path: &Path,
    format: SpreadsheetFormat,
    selection: &PageSelection,
) -> Result<TranscodedWorkbook, DocPagesError> {
    if !path.is_file() {
        return Err(DocPagesError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let format_err = |detail: String| DocPagesError::Format {
        path: path.to_path_buf(),
        detail,
    };

    let mut workbook =
        open_workbook_auto(path).map_err(|e| format_err(format!("cannot open workbook: {e}")))?;

    let names = workbook.sheet_names().to_owned();
    if names.is_empty() {
        return Err(format_err("workbook has no sheets".into()));
    }
    info!("Workbook {}: {} sheets", path.display(), names.len());

    let positions = selection.sheet_positions(names.len());
    let mut sheets = Vec::with_capacity(positions.len());
    for position in positions {
        let name = &names[position - 1];
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| format_err(format!("cannot read sheet '{name}': {e}")))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        let markup = match format {
            SpreadsheetFormat::Html => sheet_to_html(name, &rows),
            SpreadsheetFormat::Markdown => sheet_to_markdown(name, &rows),
        };
        debug!("Sheet {} '{}': {} rows → {} chars", position, name, rows.len(), markup.len());
        sheets.push((position, markup));
    }

    Ok(TranscodedWorkbook {
        total_sheets: names.len(),
        sheets,
    })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        _ => cell.to_string(),
    }
}

/// `<h2>` heading plus a table; the first row uses header cells.
pub fn sheet_to_html(name: &str, rows: &[Vec<String>]) -> String {
    let mut out = format!(
        "<h2>Sheet: {}</h2><table class=\"{}\">",
        escape_html(name),
        TABLE_CLASS
    );
    for (i, row) in rows.iter().enumerate() {
        let tag = if i == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape_html(cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

/// `## Sheet:` heading plus a pipe table whose width is set by the first row.
pub fn sheet_to_markdown(name: &str, rows: &[Vec<String>]) -> String {
    let mut out = format!("## Sheet: {name}\n\n");

    let Some((header, body)) = rows.split_first() else {
        out.push_str("Empty sheet.\n");
        return out;
    };
    let header = trim_trailing_empty(header);
    if header.is_empty() {
        out.push_str("No data in this sheet.\n");
        return out;
    }
    let width = header.len();

    push_markdown_row(&mut out, header.iter().map(String::as_str));
    push_markdown_row(&mut out, std::iter::repeat("---").take(width));

    for row in body {
        let row = trim_trailing_empty(row);
        if row.is_empty() {
            continue;
        }
        let cells = (0..width).map(|j| row.get(j).map_or("", String::as_str));
        push_markdown_row(&mut out, cells);
    }
    out
}

fn push_markdown_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_markdown_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

fn trim_trailing_empty(row: &[String]) -> &[String] {
    let end = row
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map_or(0, |i| i + 1);
    &row[..end]
}

fn escape_markdown_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn html_header_then_data_cells() {
        let html = sheet_to_html("Q1", &rows(&[&["Name", "Qty"], &["Bolt", "4"]]));
        assert_eq!(
            html,
            "<h2>Sheet: Q1</h2><table class=\"docpages-sheet\">\
             <tr><th>Name</th><th>Qty</th></tr>\
             <tr><td>Bolt</td><td>4</td></tr></table>"
        );
    }

    #[test]
    fn html_escapes_cells_and_names() {
        let html = sheet_to_html("R&D", &rows(&[&["<b>x</b>"]]));
        assert!(html.contains("<h2>Sheet: R&amp;D</h2>"));
        assert!(html.contains("<th>&lt;b&gt;x&lt;/b&gt;</th>"));
    }

    #[test]
    fn html_empty_sheet_is_empty_table() {
        assert_eq!(
            sheet_to_html("S", &[]),
            "<h2>Sheet: S</h2><table class=\"docpages-sheet\"></table>"
        );
    }

    #[test]
    fn markdown_pads_and_truncates_to_header_width() {
        let md = sheet_to_markdown(
            "Data",
            &rows(&[&["a", "b", "c"], &["1"], &["1", "2", "3", "4"]]),
        );
        assert_eq!(
            md,
            "## Sheet: Data\n\n\
             | a | b | c |\n\
             | --- | --- | --- |\n\
             | 1 |  |  |\n\
             | 1 | 2 | 3 |\n"
        );
    }

    #[test]
    fn markdown_skips_blank_rows_and_escapes_pipes() {
        let md = sheet_to_markdown("S", &rows(&[&["k", ""], &["", ""], &["a|b", ""]]));
        assert_eq!(md, "## Sheet: S\n\n| k |\n| --- |\n| a\\|b |\n");
    }

    #[test]
    fn markdown_empty_markers() {
        assert_eq!(sheet_to_markdown("E", &[]), "## Sheet: E\n\nEmpty sheet.\n");
        assert_eq!(
            sheet_to_markdown("E", &rows(&[&["", ""], &["x"]])),
            "## Sheet: E\n\nNo data in this sheet.\n"
        );
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("hi".into())), "hi");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
    }

    #[tokio::test]
    async fn missing_workbook_is_not_found() {
        let err = transcode(
            Path::new("/definitely/not/here.xlsx"),
            SpreadsheetFormat::Html,
            &PageSelection::All,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocPagesError::NotFound { .. }));
    }

    #[tokio::test]
    async fn garbage_workbook_is_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();
        let err = transcode(&path, SpreadsheetFormat::Markdown, &PageSelection::All)
            .await
            .unwrap_err();
        assert!(matches!(err, DocPagesError::Format { .. }), "got {err:?}");
    }
}
