use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::document_store::DocumentStore;
use crate::error::{ReconcileError, Result};
use crate::extractor::{ModelService, StatementExtractor};
use crate::locator::{locate_pages, DocumentLoader, DocumentSource};
use crate::parser::parse_response;
use crate::reconciler::{CompanyWorkbook, Reconciler, StatementTable};
use crate::schema::{CompanyProfile, StatementType};
use crate::utils::chunk_text;

/// Counters for one (year, statement type).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatementStats {
    pub pages_matched: usize,
    pub pages_parsed: usize,
    pub pages_failed: usize,
    pub records_merged: usize,
}

impl StatementStats {
    fn add(&mut self, other: &StatementStats) {
        self.pages_matched += other.pages_matched;
        self.pages_parsed += other.pages_parsed;
        self.pages_failed += other.pages_failed;
        self.records_merged += other.records_merged;
    }
}

/// What a run did, including everything that was dropped along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub company: String,
    pub statements: BTreeMap<i32, BTreeMap<StatementType, StatementStats>>,
    /// Years whose document could not be opened, with the reason.
    pub failed_documents: BTreeMap<i32, String>,
}

impl RunReport {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            ..Self::default()
        }
    }

    pub fn stats(&self, year: i32, statement: StatementType) -> Option<&StatementStats> {
        self.statements.get(&year).and_then(|s| s.get(&statement))
    }

    fn stats_mut(&mut self, year: i32, statement: StatementType) -> &mut StatementStats {
        self.statements
            .entry(year)
            .or_default()
            .entry(statement)
            .or_default()
    }

    pub fn totals(&self) -> StatementStats {
        let mut total = StatementStats::default();
        for stats in self.statements.values().flat_map(BTreeMap::values) {
            total.add(stats);
        }
        total
    }
}

/// Drives locate → extract → parse → normalize → reconcile for one company.
pub struct CompanyPipeline<M, L> {
    config: EngineConfig,
    reconciler: Reconciler,
    extractor: StatementExtractor<M>,
    loader: L,
}

impl<M, L> CompanyPipeline<M, L>
where
    M: ModelService,
    L: DocumentLoader,
{
    pub fn new(config: EngineConfig, model: M, loader: L) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reconciler: Reconciler::new(config.synonyms.clone()),
            extractor: StatementExtractor::new(model, config.prompt_style),
            config,
            loader,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Processes every document in `store`, most recent year first, on top of
    /// `prior` output when given.
    ///
    /// Nothing short of a panic aborts the run: unopenable documents skip
    /// their year and failed pages are dropped. Both are counted in the
    /// returned report.
    pub async fn run(
        &self,
        company: &CompanyProfile,
        store: &DocumentStore,
        prior: Option<CompanyWorkbook>,
    ) -> (CompanyWorkbook, RunReport) {
        let mut workbook = prior.unwrap_or_else(|| CompanyWorkbook::new(company.name.clone()));
        let mut report = RunReport::new(company.name.clone());
        info!(
            "Processing {} ({} reports)",
            company.name,
            store.len()
        );

        for (year, path) in store.iter() {
            let document = match self.loader.open(path) {
                Ok(document) => document,
                Err(e) => {
                    error!("{} {}: {}", company.name, year, e);
                    report.failed_documents.insert(year, e.to_string());
                    continue;
                }
            };
            info!("{} {}: {}", company.name, year, path.display());
            self.process_document(&mut workbook, year, &document, &mut report)
                .await;
        }

        let totals = report.totals();
        info!(
            "Finished {}: {} pages parsed, {} failed, {} records merged",
            company.name, totals.pages_parsed, totals.pages_failed, totals.records_merged
        );
        (workbook, report)
    }

    /// Extracts every statement type from one year's document and merges the
    /// results into `workbook`.
    pub async fn process_document<D>(
        &self,
        workbook: &mut CompanyWorkbook,
        year: i32,
        document: &D,
        report: &mut RunReport,
    ) where
        D: DocumentSource + ?Sized,
    {
        let chunks = self.config.batching.map(|options| {
            let full_text = (1..=document.page_count())
                .filter_map(|n| document.page_text(n))
                .collect::<Vec<_>>()
                .join("\n\n");
            chunk_text(&full_text, options.chunk_size, options.chunk_overlap)
        });

        for statement in StatementType::ALL {
            let pages: Vec<(usize, String)> = match &chunks {
                Some(chunks) => chunks
                    .iter()
                    .enumerate()
                    .map(|(i, chunk)| (i + 1, chunk.clone()))
                    .collect(),
                None => locate_pages(document, &self.config.keywords_for(statement)),
            };

            let stats = report.stats_mut(year, statement);
            let table = self.extract_statement(statement, year, &pages, stats).await;
            info!(
                "{} {}: {} of {} pages parsed, {} rows",
                statement,
                year,
                stats.pages_parsed,
                stats.pages_matched,
                table.len()
            );

            if !table.is_empty() {
                workbook.merge_statement(&self.reconciler, statement, &table);
            }
        }
    }

    /// Folds the records of every page into a fresh table. Pages that fail
    /// are logged and counted, never propagated.
    async fn extract_statement(
        &self,
        statement: StatementType,
        year: i32,
        pages: &[(usize, String)],
        stats: &mut StatementStats,
    ) -> StatementTable {
        let year_label = year.to_string();
        let synonyms = self.reconciler.synonyms();
        let mut table = StatementTable::new();
        stats.pages_matched += pages.len();

        for (page, text) in pages {
            let raw = match self.extractor.extract_page(statement, text, &year_label).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Dropping {} page {} ({}): {}", statement, page, year, e);
                    stats.pages_failed += 1;
                    continue;
                }
            };

            match parse_response(&raw, &year_label) {
                Ok(records) => {
                    debug!("{} page {}: {} records", statement, page, records.len());
                    stats.pages_parsed += 1;
                    stats.records_merged += records.len();
                    let normalized = records.into_iter().map(|r| synonyms.normalize_record(r));
                    table = self.reconciler.fold(table, normalized);
                }
                Err(source) => {
                    let e = ReconcileError::Parse {
                        statement,
                        page: *page,
                        source,
                    };
                    warn!("{}", parse_failure_message(year, &e, &raw));
                    stats.pages_failed += 1;
                }
            }
        }

        table
    }
}

/// Log line for a page whose response could not be parsed. Carries the raw
/// model response as received, fences included.
fn parse_failure_message(year: i32, error: &ReconcileError, raw: &str) -> String {
    match error {
        ReconcileError::Parse { source, .. } if source.payload != raw => format!(
            "Dropping page ({}): {}; payload: {}; raw response: {}",
            year, error, source.payload, raw
        ),
        _ => format!("Dropping page ({}): {}; raw response: {}", year, error, raw),
    }
}
