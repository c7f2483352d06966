use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::normalizer::SynonymTable;
use crate::schema::{CellValue, NormalizedRecord, StatementType};

/// One line item and its value per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub line_item: String,
    pub values: BTreeMap<String, CellValue>,
}

impl TableRow {
    pub fn value(&self, period: &str) -> Option<&CellValue> {
        self.values.get(period)
    }
}

#[derive(Serialize, Deserialize)]
struct StatementTableData {
    periods: Vec<String>,
    rows: Vec<TableRow>,
}

/// Ordered line-item table for one (company, statement type).
///
/// Rows keep insertion order. Rows are located through a match key supplied
/// by the caller (see [`Reconciler`]); the label a row was created with is
/// never rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StatementTableData", into = "StatementTableData")]
pub struct StatementTable {
    periods: Vec<String>,
    rows: Vec<TableRow>,
    index: HashMap<String, usize>,
}

impl StatementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn line_items(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.line_item.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row whose label matches `line_item` ignoring case and surrounding
    /// whitespace.
    pub fn row(&self, line_item: &str) -> Option<&TableRow> {
        let wanted = line_item.trim();
        self.rows
            .iter()
            .find(|row| row.line_item.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn value(&self, line_item: &str, period: &str) -> Option<&CellValue> {
        self.row(line_item).and_then(|row| row.value(period))
    }

    pub fn ensure_period(&mut self, period: &str) {
        if !self.periods.iter().any(|p| p == period) {
            self.periods.push(period.to_string());
        }
    }

    /// Index of the row stored under `key`, appending a new row labelled
    /// `label` when none exists.
    pub fn ensure_row(&mut self, key: &str, label: &str) -> usize {
        if let Some(&idx) = self.index.get(key) {
            return idx;
        }
        let idx = self.rows.len();
        self.rows.push(TableRow {
            line_item: label.to_string(),
            values: BTreeMap::new(),
        });
        self.index.insert(key.to_string(), idx);
        idx
    }

    /// Writes `value` into the cell, overwriting any earlier value.
    ///
    /// An empty value only fills a cell that has no value yet.
    pub fn upsert(&mut self, key: &str, label: &str, period: &str, value: CellValue) {
        self.ensure_period(period);
        let idx = self.ensure_row(key, label);
        let cells = &mut self.rows[idx].values;
        match cells.get(period) {
            Some(existing) if value.is_empty() && !existing.is_empty() => {}
            _ => {
                cells.insert(period.to_string(), value);
            }
        }
    }

    /// Rebuilds the row index with `key_fn`.
    ///
    /// Rows that now share a key are folded into the first of them, which
    /// keeps its position and label. Cells of later rows fill in or overwrite
    /// the first row's cells, except that an empty cell never replaces a
    /// value.
    pub fn reindex<F>(&mut self, key_fn: F)
    where
        F: Fn(&str) -> String,
    {
        self.index.clear();
        let rows = std::mem::take(&mut self.rows);
        let mut collapsed = 0usize;

        for row in rows {
            let key = key_fn(&row.line_item);
            match self.index.get(&key) {
                Some(&idx) => {
                    let cells = &mut self.rows[idx].values;
                    for (period, value) in row.values {
                        match cells.get(&period) {
                            Some(existing) if value.is_empty() && !existing.is_empty() => {}
                            _ => {
                                cells.insert(period, value);
                            }
                        }
                    }
                    collapsed += 1;
                }
                None => {
                    self.index.insert(key, self.rows.len());
                    self.rows.push(row);
                }
            }
        }

        if collapsed > 0 {
            debug!("Folded {} duplicate rows while re-keying", collapsed);
        }
    }

    /// Ordered `{line item: {period: value}}` view.
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for row in &self.rows {
            let mut cells = serde_json::Map::new();
            for period in &self.periods {
                if let Some(value) = row.values.get(period) {
                    let cell = serde_json::to_value(value).unwrap_or_default();
                    cells.insert(period.clone(), cell);
                }
            }
            out.insert(row.line_item.clone(), serde_json::Value::Object(cells));
        }
        serde_json::Value::Object(out)
    }
}

pub(crate) fn default_key(label: &str) -> String {
    label.trim().to_lowercase()
}

impl From<StatementTableData> for StatementTable {
    fn from(data: StatementTableData) -> Self {
        let mut table = Self {
            periods: data.periods,
            rows: data.rows,
            index: HashMap::new(),
        };
        table.reindex(default_key);
        table
    }
}

impl From<StatementTable> for StatementTableData {
    fn from(table: StatementTable) -> Self {
        Self {
            periods: table.periods,
            rows: table.rows,
        }
    }
}

impl PartialEq for StatementTable {
    fn eq(&self, other: &Self) -> bool {
        self.periods == other.periods && self.rows == other.rows
    }
}

/// Folds records into statement tables and merges tables across documents.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    synonyms: SynonymTable,
}

impl Reconciler {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Applies records in order; a later record for the same
    /// (line item, period) overwrites an earlier one.
    pub fn fold<I>(&self, mut table: StatementTable, records: I) -> StatementTable
    where
        I: IntoIterator<Item = NormalizedRecord>,
    {
        table.reindex(|label| self.synonyms.match_key(label));
        for record in records {
            let key = self.synonyms.match_key(&record.line_item);
            table.upsert(&key, &record.line_item, &record.period, record.value);
        }
        table
    }

    /// Outer join of `incoming` into `existing` on the canonical line item.
    ///
    /// Existing rows and period columns keep their positions; new rows and
    /// columns are appended in the order `incoming` holds them. Conflicting
    /// cells take the incoming value.
    pub fn merge(&self, mut existing: StatementTable, incoming: &StatementTable) -> StatementTable {
        existing.reindex(|label| self.synonyms.match_key(label));
        let rows_before = existing.len();

        for period in &incoming.periods {
            existing.ensure_period(period);
        }

        for row in &incoming.rows {
            let key = self.synonyms.match_key(&row.line_item);
            existing.ensure_row(&key, &row.line_item);
            for period in &incoming.periods {
                if let Some(value) = row.values.get(period) {
                    existing.upsert(&key, &row.line_item, period, value.clone());
                }
            }
        }

        debug!(
            "Merged {} incoming rows: {} existing, {} appended, {} periods",
            incoming.len(),
            rows_before,
            existing.len() - rows_before,
            existing.periods.len()
        );
        existing
    }
}

/// Every statement table for one company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyWorkbook {
    pub company: String,
    #[serde(default)]
    statements: BTreeMap<StatementType, StatementTable>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CompanyWorkbook {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            statements: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn statement(&self, statement: StatementType) -> Option<&StatementTable> {
        self.statements.get(&statement)
    }

    pub fn statements(&self) -> impl Iterator<Item = (StatementType, &StatementTable)> {
        self.statements.iter().map(|(st, table)| (*st, table))
    }

    pub fn is_empty(&self) -> bool {
        self.statements.values().all(StatementTable::is_empty)
    }

    /// Replaces the table for `statement` wholesale.
    pub fn insert_statement(&mut self, statement: StatementType, table: StatementTable) {
        self.statements.insert(statement, table);
    }

    /// Merges `table` into the existing table for `statement` (or adopts it).
    pub fn merge_statement(
        &mut self,
        reconciler: &Reconciler,
        statement: StatementType,
        table: &StatementTable,
    ) {
        let existing = self.statements.remove(&statement).unwrap_or_default();
        let merged = reconciler.merge(existing, table);
        self.statements.insert(statement, merged);
        self.updated_at = Some(Utc::now());
    }

    /// Merges every table of `other` into this workbook.
    pub fn merge_workbook(&mut self, reconciler: &Reconciler, other: &CompanyWorkbook) {
        for (statement, table) in other.statements() {
            self.merge_statement(reconciler, statement, table);
        }
    }
}
