//! # Statement Reconciler
//!
//! A library for turning annual-report documents into normalized,
//! year-indexed financial statement tables with the help of a language model.
//!
//! ## Core Concepts
//!
//! - **Page Locator**: Finds pages that mention a statement type and hold a table
//! - **Statement Extractor**: Asks a [`ModelService`] for the statement rows of one page and one year
//! - **Response Parser**: Recovers records from fenced, Python-literal or prose-wrapped JSON
//! - **Normalizer**: Maps line-item labels onto canonical names via a [`SynonymTable`]
//! - **Reconciler**: Folds per-page records into a table and merges tables across years,
//!   keeping existing row order and appending new rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_reconciler::*;
//!
//! let config = EngineConfig::default();
//! let loader = ReportLoader { min_table_rows: config.min_table_rows };
//! let model = llm::GeminiClient::new(std::env::var("GEMINI_API_KEY")?);
//! let pipeline = CompanyPipeline::new(config, model, loader)?;
//!
//! let company = CompanyProfile::new("Ericsson");
//! let store = DocumentStore::scan_dir("reports/ericsson".as_ref())?;
//! let output = WorkbookStore::new("out");
//!
//! let prior = output.load(&company.name)?;
//! let (workbook, report) = pipeline.run(&company, &store, prior).await;
//! output.save(&workbook)?;
//! ```

pub mod config;
pub mod document_store;
pub mod error;
pub mod extractor;
pub mod locator;
pub mod normalizer;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod reconciler;
pub mod schema;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod llm;

#[cfg(feature = "pdf")]
pub mod pdf;

pub use config::{ChunkingOptions, EngineConfig, PromptStyle, DEFAULT_MODEL};
pub use document_store::{year_from_filename, DocumentStore};
pub use error::{ParseError, ReconcileError, Result};
pub use extractor::{ExtractionPrompt, ModelResponse, ModelService, StatementExtractor};
pub use locator::{locate_pages, DocumentLoader, DocumentSource, TextDocument, TextDocumentLoader};
pub use normalizer::SynonymTable;
pub use output::{sheet_name, WorkbookStore};
pub use parser::{parse_response, ParseStrategy};
#[cfg(feature = "pdf")]
pub use pdf::{PdfDocument, PdfDocumentLoader, ReportDocument, ReportLoader};
pub use pipeline::{CompanyPipeline, RunReport, StatementStats};
pub use reconciler::{CompanyWorkbook, Reconciler, StatementTable, TableRow};
pub use schema::*;
pub use utils::chunk_text;

/// Parses one model response, normalizes its labels and folds the records
/// into `table`.
///
/// This is the per-page step of the pipeline without the model call, for
/// callers that obtain responses some other way.
pub fn reconcile_response(
    reconciler: &Reconciler,
    table: StatementTable,
    raw: &str,
    year: &str,
) -> std::result::Result<StatementTable, ParseError> {
    let records = parse_response(raw, year)?;
    let normalized = records
        .into_iter()
        .map(|record| reconciler.synonyms().normalize_record(record));
    Ok(reconciler.fold(table, normalized))
}
