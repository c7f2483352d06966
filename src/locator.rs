use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, Result};
use crate::schema::Page;

static NUMERIC_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?[-–−]?[$€£]?\d[\d,.']*\)?%?$").unwrap());
static YEAR_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:FY)?(?:19|20)\d{2}$").unwrap());

/// Page-level access to a report.
///
/// Implementations never fail per page: a page whose text cannot be
/// extracted reports `None` and is treated as non-matching.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    /// Text of the 1-based `page_number`.
    fn page_text(&self, page_number: usize) -> Option<String>;

    /// Whether the page holds at least one extractable table.
    fn has_table(&self, page_number: usize) -> bool;

    fn page(&self, page_number: usize) -> Page {
        Page {
            page_number,
            text: self.page_text(page_number).unwrap_or_default(),
            has_table: self.has_table(page_number),
        }
    }
}

/// Opens documents by path. Failing to open is fatal for that document only.
pub trait DocumentLoader {
    type Document: DocumentSource;

    fn open(&self, path: &Path) -> Result<Self::Document>;
}

/// Pages whose text mentions any keyword and that hold a table, in page
/// order.
pub fn locate_pages<D>(document: &D, keywords: &[String]) -> Vec<(usize, String)>
where
    D: DocumentSource + ?Sized,
{
    let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut matches = Vec::new();

    for page_number in 1..=document.page_count() {
        let text = document.page_text(page_number).unwrap_or_default();
        let lowered = text.to_lowercase();
        if !needles.iter().any(|needle| lowered.contains(needle.as_str())) {
            continue;
        }
        if document.has_table(page_number) {
            matches.push((page_number, text));
        } else {
            debug!(
                "Page {} mentions a statement keyword but has no table; skipping",
                page_number
            );
        }
    }

    matches
}

impl DocumentSource for Vec<Page> {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page_text(&self, page_number: usize) -> Option<String> {
        self.iter()
            .find(|p| p.page_number == page_number)
            .map(|p| p.text.clone())
    }

    fn has_table(&self, page_number: usize) -> bool {
        self.iter()
            .find(|p| p.page_number == page_number)
            .is_some_and(|p| p.has_table)
    }
}

/// A report exported to plain text, one page per form-feed separated block.
#[derive(Debug, Clone)]
pub struct TextDocument {
    path: Option<PathBuf>,
    pages: Vec<String>,
    min_table_rows: usize,
}

impl TextDocument {
    pub fn from_text(text: &str, min_table_rows: usize) -> Self {
        let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self::from_pages(pages, min_table_rows)
    }

    pub fn from_pages(pages: Vec<String>, min_table_rows: usize) -> Self {
        Self {
            path: None,
            pages,
            min_table_rows: min_table_rows.max(1),
        }
    }

    pub fn open(path: &Path, min_table_rows: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ReconcileError::DocumentOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut document = Self::from_text(&text, min_table_rows);
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl DocumentSource for TextDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_number: usize) -> Option<String> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .cloned()
    }

    fn has_table(&self, page_number: usize) -> bool {
        self.page_text(page_number)
            .is_some_and(|text| count_table_rows(&text) >= self.min_table_rows)
    }
}

/// Loads [`TextDocument`]s from disk.
#[derive(Debug, Clone, Copy)]
pub struct TextDocumentLoader {
    pub min_table_rows: usize,
}

impl DocumentLoader for TextDocumentLoader {
    type Document = TextDocument;

    fn open(&self, path: &Path) -> Result<TextDocument> {
        TextDocument::open(path, self.min_table_rows)
    }
}

fn is_numeric_cell(token: &str) -> bool {
    NUMERIC_CELL.is_match(token) || matches!(token, "-" | "–" | "—")
}

/// Counts lines that look like statement rows: a text label followed by
/// numeric cells. Two cells are required unless the page carries a header
/// line of year columns; the header line itself is not a row.
pub fn count_table_rows(text: &str) -> usize {
    let has_year_header = text.lines().any(|line| {
        line.split_whitespace()
            .filter(|token| YEAR_CELL.is_match(token))
            .count()
            >= 2
    });
    let min_cells = if has_year_header { 1 } else { 2 };

    text.lines()
        .filter(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(first_numeric) = tokens.iter().position(|t| is_numeric_cell(t)) else {
                return false;
            };
            let has_label = tokens[..first_numeric]
                .iter()
                .any(|t| t.chars().any(char::is_alphabetic));
            let cells: Vec<&&str> = tokens[first_numeric..]
                .iter()
                .filter(|t| is_numeric_cell(t))
                .collect();
            let header_only = cells.iter().all(|t| YEAR_CELL.is_match(t));
            has_label && !header_only && cells.len() >= min_cells
        })
        .count()
}
