use log::{debug, warn};
use lopdf::Document;
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, Result};
use crate::locator::{count_table_rows, DocumentLoader, DocumentSource, TextDocument};

/// A PDF report with its page text extracted up front.
///
/// Pages whose content stream cannot be decoded report `None` from
/// [`DocumentSource::page_text`] and never match a statement.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    path: PathBuf,
    pages: Vec<Option<String>>,
    min_table_rows: usize,
}

impl PdfDocument {
    pub fn open(path: &Path, min_table_rows: usize) -> Result<Self> {
        let document = Document::load(path).map_err(|e| ReconcileError::DocumentOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_document(path, &document, min_table_rows))
    }

    /// Extracts every page of an already loaded document.
    pub fn from_document(path: &Path, document: &Document, min_table_rows: usize) -> Self {
        let pages: Vec<Option<String>> = document
            .get_pages()
            .keys()
            .map(|&page_number| match document.extract_text(&[page_number]) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(
                        "{}: no text for page {}: {}",
                        path.display(),
                        page_number,
                        e
                    );
                    None
                }
            })
            .collect();

        debug!("{}: extracted {} pages", path.display(), pages.len());
        Self {
            path: path.to_path_buf(),
            pages,
            min_table_rows: min_table_rows.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_number: usize) -> Option<String> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .cloned()
            .flatten()
    }

    fn has_table(&self, page_number: usize) -> bool {
        self.page_text(page_number)
            .is_some_and(|text| count_table_rows(&text) >= self.min_table_rows)
    }
}

/// Loads [`PdfDocument`]s from disk.
#[derive(Debug, Clone, Copy)]
pub struct PdfDocumentLoader {
    pub min_table_rows: usize,
}

impl DocumentLoader for PdfDocumentLoader {
    type Document = PdfDocument;

    fn open(&self, path: &Path) -> Result<PdfDocument> {
        PdfDocument::open(path, self.min_table_rows)
    }
}

/// Either kind of report a company folder may hold.
#[derive(Debug, Clone)]
pub enum ReportDocument {
    Pdf(PdfDocument),
    Text(TextDocument),
}

impl DocumentSource for ReportDocument {
    fn page_count(&self) -> usize {
        match self {
            ReportDocument::Pdf(doc) => doc.page_count(),
            ReportDocument::Text(doc) => doc.page_count(),
        }
    }

    fn page_text(&self, page_number: usize) -> Option<String> {
        match self {
            ReportDocument::Pdf(doc) => doc.page_text(page_number),
            ReportDocument::Text(doc) => doc.page_text(page_number),
        }
    }

    fn has_table(&self, page_number: usize) -> bool {
        match self {
            ReportDocument::Pdf(doc) => doc.has_table(page_number),
            ReportDocument::Text(doc) => doc.has_table(page_number),
        }
    }
}

/// Opens `.pdf` files as PDFs and anything else as form-feed separated text.
#[derive(Debug, Clone, Copy)]
pub struct ReportLoader {
    pub min_table_rows: usize,
}

impl DocumentLoader for ReportLoader {
    type Document = ReportDocument;

    fn open(&self, path: &Path) -> Result<ReportDocument> {
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            PdfDocument::open(path, self.min_table_rows).map(ReportDocument::Pdf)
        } else {
            TextDocument::open(path, self.min_table_rows).map(ReportDocument::Text)
        }
    }
}
