use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ReconcileError, Result};
use crate::normalizer::SynonymTable;
use crate::schema::StatementType;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    #[default]
    #[schemars(description = "One `{\"Line Item\", \"Value(s)\"}` row per line item, values for the target year only")]
    SingleYear,

    #[schemars(description = "`{item, value, period}` objects; the model reports the period of each value")]
    PeriodRecords,
}

/// Overlapping character windows used by the batched extraction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkingOptions {
    #[schemars(description = "Maximum characters per chunk")]
    pub chunk_size: usize,

    #[schemars(description = "Characters shared between consecutive chunks; must be smaller than chunk_size")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

fn default_keywords() -> BTreeMap<StatementType, Vec<String>> {
    StatementType::ALL
        .iter()
        .map(|st| {
            let words = st.default_keywords().iter().map(|k| k.to_string()).collect();
            (*st, words)
        })
        .collect()
}

fn default_min_table_rows() -> usize {
    3
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Immutable engine configuration, injected into the pipeline at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page keywords per statement type. Missing statement types fall back to
    /// their built-in keywords.
    #[serde(default = "default_keywords")]
    pub keywords: BTreeMap<StatementType, Vec<String>>,

    #[serde(default)]
    pub synonyms: SynonymTable,

    #[serde(default)]
    pub prompt_style: PromptStyle,

    /// When set, documents are split into overlapping chunks and every chunk
    /// is sent for every statement type instead of locating pages.
    #[serde(default)]
    pub batching: Option<ChunkingOptions>,

    /// Numeric rows a page needs before the built-in text document reports
    /// a table on it.
    #[serde(default = "default_min_table_rows")]
    pub min_table_rows: usize,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            synonyms: SynonymTable::default(),
            prompt_style: PromptStyle::default(),
            batching: None,
            min_table_rows: default_min_table_rows(),
            model: default_model(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn with_prompt_style(mut self, style: PromptStyle) -> Self {
        self.prompt_style = style;
        self
    }

    pub fn with_batching(mut self, options: ChunkingOptions) -> Self {
        self.batching = Some(options);
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Keywords for `statement`, falling back to the built-in list.
    pub fn keywords_for(&self, statement: StatementType) -> Vec<String> {
        match self.keywords.get(&statement) {
            Some(words) if !words.is_empty() => words.clone(),
            _ => statement
                .default_keywords()
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_table_rows == 0 {
            return Err(ReconcileError::InvalidConfig(
                "min_table_rows must be at least 1".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "model name must not be empty".to_string(),
            ));
        }

        for (statement, words) in &self.keywords {
            if words.iter().any(|w| w.trim().is_empty()) {
                return Err(ReconcileError::InvalidConfig(format!(
                    "blank keyword configured for {}",
                    statement
                )));
            }
        }

        if let Some(options) = &self.batching {
            if options.chunk_size == 0 {
                return Err(ReconcileError::InvalidConfig(
                    "chunk_size must be positive".to_string(),
                ));
            }
            if options.chunk_overlap >= options.chunk_size {
                return Err(ReconcileError::InvalidConfig(format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    options.chunk_overlap, options.chunk_size
                )));
            }
        }

        Ok(())
    }
}
