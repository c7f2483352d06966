use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    #[schemars(description = "Income statement / statement of operations (period totals)")]
    Income,

    #[schemars(description = "Balance sheet / statement of financial position (point-in-time balances)")]
    Balance,

    #[schemars(description = "Cash-flow statement (operating, investing and financing flows)")]
    CashFlow,
}

impl StatementType {
    /// Processing order used by the pipeline.
    pub const ALL: [StatementType; 3] = [
        StatementType::Income,
        StatementType::Balance,
        StatementType::CashFlow,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            StatementType::Income => "income statement",
            StatementType::Balance => "balance sheet",
            StatementType::CashFlow => "cash flow statement",
        }
    }

    /// Case-insensitive page keywords used when no configuration overrides them.
    pub fn default_keywords(&self) -> &'static [&'static str] {
        match self {
            StatementType::Income => &[
                "income statement",
                "statement of operations",
                "statement of income",
            ],
            StatementType::Balance => &["balance sheet", "statement of financial position"],
            StatementType::CashFlow => &["cash flow", "statement of cash flows"],
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single cell of a statement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// Converts a scalar JSON value. Arrays and objects are not cells.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(CellValue::Empty),
            serde_json::Value::Bool(b) => Some(CellValue::Text(b.to_string())),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number),
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(CellValue::Empty)
                } else {
                    Some(CellValue::Text(trimmed.to_string()))
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Parses a cell read back from a prior output (CSV/sheet text).
    pub fn from_cell_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One document page as seen by the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
    pub has_table: bool,
}

/// A line item value as reported by the model for one page, before
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub line_item: String,
    pub period: String,
    pub value: CellValue,
}

impl ExtractionRecord {
    pub fn new(
        line_item: impl Into<String>,
        period: impl Into<String>,
        value: impl Into<CellValue>,
    ) -> Self {
        Self {
            line_item: line_item.into(),
            period: period.into(),
            value: value.into(),
        }
    }
}

/// An [`ExtractionRecord`] whose `line_item` has been replaced by its
/// canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub line_item: String,
    pub period: String,
    pub value: CellValue,
}

/// The row shape requested from the model in the single-year prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SingleYearRow {
    #[serde(rename = "Line Item")]
    #[schemars(description = "The line item label exactly as printed in the statement (e.g. 'Revenue', 'Cost of sales')")]
    pub line_item: String,

    #[serde(rename = "Value(s)")]
    #[schemars(description = "The reported value for the requested year, digits only as printed (e.g. '1,234.5' or '(12)')")]
    pub value: String,
}

/// The record shape requested from the model in the period-records prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PeriodRecord {
    #[schemars(description = "The line item label exactly as printed in the statement")]
    pub item: String,

    #[schemars(description = "The reported value as printed")]
    pub value: String,

    #[schemars(description = "The fiscal year or period the value belongs to (e.g. '2023')")]
    pub period: String,
}

/// Static company data supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyProfile {
    #[schemars(description = "Display name; also used for output file names")]
    pub name: String,

    #[serde(default)]
    pub ticker: Option<String>,

    #[serde(default)]
    #[schemars(description = "Index page listing the company's annual reports")]
    pub annual_reports_url: Option<String>,
}

impl CompanyProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticker: None,
            annual_reports_url: None,
        }
    }
}
