use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::{ExtractionRecord, NormalizedRecord};

const DEFAULT_SYNONYMS: &[(&str, &str)] = &[
    ("revenue", "total revenue"),
    ("revenues", "total revenue"),
    ("net revenue", "total revenue"),
    ("net revenues", "total revenue"),
    ("sales", "total revenue"),
    ("net sales", "total revenue"),
    ("total revenue", "total revenue"),
    ("cost of goods sold", "cost of sales"),
    ("cogs", "cost of sales"),
    ("cost of sales", "cost of sales"),
    ("gross profit", "gross profit"),
    ("gross income", "gross profit"),
    ("operating income", "operating income"),
    ("operating profit", "operating income"),
    ("ebit", "operating income"),
    ("net income", "net income"),
    ("net income (loss)", "net income"),
    ("net profit", "net income"),
    ("profit for the year", "net income"),
    ("total assets", "total assets"),
    ("total liabilities", "total liabilities"),
    ("total equity", "total equity"),
    ("cash flow from operating activities", "operating cash flow"),
    ("net cash provided by operating activities", "operating cash flow"),
    ("net cash from operating activities", "operating cash flow"),
    ("operating cash flow", "operating cash flow"),
    ("cash flow from investing activities", "investing cash flow"),
    ("net cash used in investing activities", "investing cash flow"),
    ("investing cash flow", "investing cash flow"),
    ("cash flow from financing activities", "financing cash flow"),
    ("net cash provided by financing activities", "financing cash flow"),
    ("net cash used in financing activities", "financing cash flow"),
    ("financing cash flow", "financing cash flow"),
    ("free cash flow", "free cash flow"),
];

/// Maps raw line-item labels onto canonical names.
///
/// Keys are stored lowercased and trimmed. Every canonical name is also a
/// key mapping to itself, which keeps [`SynonymTable::normalize`] idempotent
/// for any user-supplied table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SynonymTable {
    entries: BTreeMap<String, String>,
}

impl SynonymTable {
    /// A table with no mappings: every label passes through unchanged.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::empty();
        for (alias, canonical) in pairs {
            table.insert(alias.as_ref(), canonical.as_ref());
        }
        table.resolve_chains();
        table
    }

    /// Collapses alias chains (`a -> b`, `b -> c`) so every key points at a
    /// terminal name, and pins each terminal to itself.
    fn resolve_chains(&mut self) {
        let limit = self.entries.len();
        let mut resolved = BTreeMap::new();
        for (key, value) in &self.entries {
            let mut current = value.clone();
            for _ in 0..limit {
                match self.entries.get(&current.to_lowercase()) {
                    Some(next) if *next != current => current = next.clone(),
                    _ => break,
                }
            }
            resolved.insert(key.clone(), current);
        }
        let terminals: Vec<String> = resolved.values().cloned().collect();
        for terminal in terminals {
            resolved.insert(terminal.to_lowercase(), terminal);
        }
        self.entries = resolved;
    }

    fn insert(&mut self, alias: &str, canonical: &str) {
        let canonical = canonical.trim().to_string();
        self.entries
            .entry(canonical.to_lowercase())
            .or_insert_with(|| canonical.clone());
        self.entries.insert(alias.trim().to_lowercase(), canonical);
    }

    /// Canonical form of `label`, or `label` itself when unmapped.
    pub fn normalize(&self, label: &str) -> String {
        let key = label.trim().to_lowercase();
        match self.entries.get(&key) {
            Some(canonical) => canonical.clone(),
            None => label.to_string(),
        }
    }

    /// Key used to decide whether two labels denote the same row.
    pub fn match_key(&self, label: &str) -> String {
        self.normalize(label).trim().to_lowercase()
    }

    pub fn normalize_record(&self, record: ExtractionRecord) -> NormalizedRecord {
        NormalizedRecord {
            line_item: self.normalize(&record.line_item),
            period: record.period,
            value: record.value,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_SYNONYMS.iter().copied())
    }
}

impl From<BTreeMap<String, String>> for SynonymTable {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::from_pairs(map)
    }
}

impl From<SynonymTable> for BTreeMap<String, String> {
    fn from(table: SynonymTable) -> Self {
        table.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_synonyms() {
        let table = SynonymTable::default();
        assert_eq!(table.normalize("Net Revenue"), "total revenue");
        assert_eq!(table.normalize("  EBIT "), "operating income");
        assert_eq!(table.normalize("COGS"), "cost of sales");
        assert_eq!(
            table.normalize("Net cash provided by operating activities"),
            "operating cash flow"
        );
    }

    #[test]
    fn test_unmapped_label_passes_through() {
        let table = SynonymTable::default();
        assert_eq!(table.normalize("Goodwill impairment"), "Goodwill impairment");
        assert_eq!(table.normalize(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let table = SynonymTable::default();
        let labels = [
            "Revenue",
            "net revenue",
            "Total Revenue",
            "EBIT",
            "Operating Income",
            " Free Cash Flow ",
            "Goodwill impairment",
            "Net income (loss)",
            "",
        ];
        for label in labels {
            let once = table.normalize(label);
            assert_eq!(table.normalize(&once), once, "label {:?}", label);
        }
    }

    #[test]
    fn test_custom_table_is_idempotent_via_canonical_self_mapping() {
        let table = SynonymTable::from_pairs([("turnover", "Group Revenue")]);
        assert_eq!(table.normalize("Turnover"), "Group Revenue");
        assert_eq!(table.normalize("Group Revenue"), "Group Revenue");
        assert_eq!(table.match_key("TURNOVER"), "group revenue");
    }

    #[test]
    fn test_alias_chains_resolve_to_terminal() {
        let table =
            SynonymTable::from_pairs([("sales", "turnover"), ("turnover", "total revenue")]);
        assert_eq!(table.normalize("Sales"), "total revenue");
        assert_eq!(table.normalize("turnover"), "total revenue");
        assert_eq!(table.normalize("total revenue"), "total revenue");
    }

    #[test]
    fn test_match_key_collapses_case() {
        let table = SynonymTable::default();
        assert_eq!(table.match_key("Revenue"), table.match_key("net revenue"));
        assert_eq!(table.match_key("Goodwill"), table.match_key(" goodwill"));
    }

    #[test]
    fn test_serde_as_plain_map() {
        let table: SynonymTable =
            serde_json::from_str(r#"{"turnover": "total revenue"}"#).unwrap();
        assert_eq!(table.normalize("Turnover"), "total revenue");
        assert_eq!(table.len(), 2);
    }
}
