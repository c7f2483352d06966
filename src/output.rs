//! Persisting workbooks and reading prior output back in.
//!
//! A workbook is stored as one JSON document (the source of truth for later
//! runs) plus one CSV file per statement table for people to read. Prior
//! output is always loaded and merged, never replaced.

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, Result};
use crate::reconciler::{default_key, CompanyWorkbook, StatementTable};
use crate::schema::{CellValue, StatementType};
use crate::utils::{file_stem, truncate_sheet_name};

pub const LINE_ITEM_HEADER: &str = "Line Item";

/// Sheet (and CSV file) name for a statement table.
pub fn sheet_name(statement: StatementType) -> String {
    let title = match statement {
        StatementType::Income => "Income Statement",
        StatementType::Balance => "Balance Sheet",
        StatementType::CashFlow => "Cash Flow Statement",
    };
    truncate_sheet_name(title)
}

impl StatementTable {
    /// Header (`Line Item`, then the period columns) and one text row per
    /// line item. Missing cells are empty strings.
    pub fn to_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header = Vec::with_capacity(self.periods().len() + 1);
        header.push(LINE_ITEM_HEADER.to_string());
        header.extend(self.periods().iter().cloned());

        let rows = self
            .rows()
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(header.len());
                cells.push(row.line_item.clone());
                for period in self.periods() {
                    cells.push(row.value(period).map(ToString::to_string).unwrap_or_default());
                }
                cells
            })
            .collect();

        (header, rows)
    }

    /// Rebuilds a table from a sheet laid out as [`StatementTable::to_rows`]
    /// writes it. Blank cells carry no value.
    pub fn from_rows(header: &[String], rows: &[Vec<String>]) -> Result<Self> {
        let first = header.first().map(|h| h.trim()).unwrap_or_default();
        if !first.eq_ignore_ascii_case(LINE_ITEM_HEADER) {
            return Err(ReconcileError::InvalidTable(format!(
                "first column must be '{}', found '{}'",
                LINE_ITEM_HEADER, first
            )));
        }

        let periods: Vec<&str> = header[1..].iter().map(|p| p.trim()).collect();
        if let Some(blank) = periods.iter().position(|p| p.is_empty()) {
            return Err(ReconcileError::InvalidTable(format!(
                "period column {} has no name",
                blank + 2
            )));
        }

        let mut table = StatementTable::new();
        for period in &periods {
            table.ensure_period(period);
        }

        for (line, row) in rows.iter().enumerate() {
            if row.len() > header.len() {
                return Err(ReconcileError::InvalidTable(format!(
                    "row {} has {} cells but the header has {}",
                    line + 1,
                    row.len(),
                    header.len()
                )));
            }
            let Some(label) = row.first().map(|l| l.trim()).filter(|l| !l.is_empty()) else {
                continue;
            };

            let key = default_key(label);
            table.ensure_row(&key, label);
            for (period, raw) in periods.iter().zip(row.iter().skip(1)) {
                let value = CellValue::from_cell_text(raw);
                if !value.is_empty() {
                    table.upsert(&key, label, period, value);
                }
            }
        }

        Ok(table)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let (header, rows) = self.to_rows();
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Self::from_rows(&header, &rows)
    }
}

impl CompanyWorkbook {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Directory of company workbooks: `<root>/<company>.json` plus
/// `<root>/<company>/<sheet>.csv`.
#[derive(Debug, Clone)]
pub struct WorkbookStore {
    root: PathBuf,
}

impl WorkbookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workbook_path(&self, company: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(company)))
    }

    pub fn sheet_dir(&self, company: &str) -> PathBuf {
        self.root.join(file_stem(company))
    }

    /// The prior workbook for `company`, if one was saved.
    pub fn load(&self, company: &str) -> Result<Option<CompanyWorkbook>> {
        let path = self.workbook_path(company);
        if !path.exists() {
            debug!("No prior output for {} at {}", company, path.display());
            return Ok(None);
        }
        let workbook = CompanyWorkbook::load_json(&path)?;
        info!("Loaded prior output for {} from {}", company, path.display());
        Ok(Some(workbook))
    }

    /// Writes the workbook JSON and one CSV per non-empty statement table.
    pub fn save(&self, workbook: &CompanyWorkbook) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.workbook_path(&workbook.company);
        workbook.save_json(&path)?;

        let sheets = self.sheet_dir(&workbook.company);
        for (statement, table) in workbook.statements() {
            if table.is_empty() {
                continue;
            }
            fs::create_dir_all(&sheets)?;
            let csv_path = sheets.join(format!("{}.csv", sheet_name(statement)));
            table.write_csv(&csv_path)?;
        }

        info!("Saved {} to {}", workbook.company, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::SynonymTable;
    use crate::reconciler::Reconciler;
    use crate::schema::NormalizedRecord;
    use tempfile::tempdir;

    fn sample_table() -> StatementTable {
        let reconciler = Reconciler::new(SynonymTable::default());
        reconciler.fold(
            StatementTable::new(),
            vec![
                NormalizedRecord {
                    line_item: "total revenue".into(),
                    period: "2023".into(),
                    value: CellValue::Text("1,000".into()),
                },
                NormalizedRecord {
                    line_item: "cost of sales".into(),
                    period: "2023".into(),
                    value: CellValue::Number(-400.0),
                },
                NormalizedRecord {
                    line_item: "total revenue".into(),
                    period: "2022".into(),
                    value: CellValue::Text("900".into()),
                },
            ],
        )
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_sheet_names_fit_limit() {
        for statement in StatementType::ALL {
            assert!(sheet_name(statement).chars().count() <= 31);
        }
        assert_eq!(sheet_name(StatementType::CashFlow), "Cash Flow Statement");
    }

    #[test]
    fn test_to_rows_layout() {
        let (header, rows) = sample_table().to_rows();
        assert_eq!(header, strings(&["Line Item", "2023", "2022"]));
        assert_eq!(rows[0], strings(&["total revenue", "1,000", "900"]));
        assert_eq!(rows[1], strings(&["cost of sales", "-400", ""]));
    }

    #[test]
    fn test_from_rows_skips_blank_cells_and_labels() {
        let header = strings(&["Line Item", "2022", "2021"]);
        let rows = vec![
            strings(&["Revenue", "900", ""]),
            strings(&["", "1", "2"]),
            strings(&["Goodwill", "", "15"]),
            strings(&["Provisions"]),
        ];
        let table = StatementTable::from_rows(&header, &rows).unwrap();

        assert_eq!(
            table.line_items().collect::<Vec<_>>(),
            vec!["Revenue", "Goodwill", "Provisions"]
        );
        assert_eq!(table.periods(), &["2022".to_string(), "2021".to_string()]);
        assert_eq!(table.value("Revenue", "2021"), None);
        assert_eq!(table.value("Goodwill", "2021"), Some(&CellValue::Text("15".into())));
    }

    #[test]
    fn test_from_rows_rejects_bad_header() {
        let err = StatementTable::from_rows(&strings(&["Item", "2022"]), &[]).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidTable(_)));

        let err = StatementTable::from_rows(
            &strings(&["Line Item", "2022"]),
            &[strings(&["Cash", "1", "2"])],
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidTable(_)));
    }

    #[test]
    fn test_csv_reads_back_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("income.csv");
        let table = sample_table();
        table.write_csv(&path).unwrap();

        let back = StatementTable::read_csv(&path).unwrap();
        assert_eq!(back.to_rows(), table.to_rows());
    }

    #[test]
    fn test_workbook_store_save_and_load() {
        let dir = tempdir().unwrap();
        let store = WorkbookStore::new(dir.path().join("out"));
        assert!(store.load("Acme Corp").unwrap().is_none());

        let mut workbook = CompanyWorkbook::new("Acme Corp");
        workbook.insert_statement(StatementType::Income, sample_table());
        workbook.insert_statement(StatementType::Balance, StatementTable::new());

        let path = store.save(&workbook).unwrap();
        assert!(path.ends_with("Acme_Corp.json"));
        assert!(store.sheet_dir("Acme Corp").join("Income Statement.csv").exists());
        assert!(!store.sheet_dir("Acme Corp").join("Balance Sheet.csv").exists());

        let loaded = store.load("Acme Corp").unwrap().unwrap();
        assert_eq!(loaded, workbook);
    }
}
