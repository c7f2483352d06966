use futures::future::BoxFuture;
use log::debug;
use std::sync::Arc;

use crate::config::PromptStyle;
use crate::error::Result;
use crate::schema::StatementType;

const SYSTEM_PROMPT: &str = "You are a financial data extraction assistant. \
You read pages of company annual reports and return the financial statement \
tables they contain as strictly valid JSON. Never add commentary, explanations \
or markdown code fences.";

/// A fully rendered request for one page (or chunk) and one statement type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPrompt {
    pub statement: StatementType,
    pub year: String,
    pub style: PromptStyle,
    pub system: String,
    pub user: String,
}

/// The textual payload returned by a model service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
}

impl From<String> for ModelResponse {
    fn from(content: String) -> Self {
        Self { content }
    }
}

impl From<&str> for ModelResponse {
    fn from(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

/// A language-model backend. One call per prompt; retries, if any, are the
/// implementation's business.
pub trait ModelService: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a ExtractionPrompt) -> BoxFuture<'a, Result<ModelResponse>>;
}

impl<T: ModelService + ?Sized> ModelService for Arc<T> {
    fn complete<'a>(&'a self, prompt: &'a ExtractionPrompt) -> BoxFuture<'a, Result<ModelResponse>> {
        (**self).complete(prompt)
    }
}

impl<T: ModelService + ?Sized> ModelService for Box<T> {
    fn complete<'a>(&'a self, prompt: &'a ExtractionPrompt) -> BoxFuture<'a, Result<ModelResponse>> {
        (**self).complete(prompt)
    }
}

/// Builds statement- and year-scoped prompts and forwards them to a
/// [`ModelService`].
pub struct StatementExtractor<M> {
    model: M,
    style: PromptStyle,
}

impl<M: ModelService> StatementExtractor<M> {
    pub fn new(model: M, style: PromptStyle) -> Self {
        Self { model, style }
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn build_prompt(&self, statement: StatementType, text: &str, year: &str) -> ExtractionPrompt {
        ExtractionPrompt {
            statement,
            year: year.to_string(),
            style: self.style,
            system: SYSTEM_PROMPT.to_string(),
            user: render_instructions(self.style, statement, text, year),
        }
    }

    /// Sends one page to the model and returns its raw text.
    pub async fn extract_page(&self, statement: StatementType, text: &str, year: &str) -> Result<String> {
        let prompt = self.build_prompt(statement, text, year);
        debug!(
            "Requesting {} for {} ({} chars of page text)",
            statement,
            year,
            text.len()
        );
        let response = self.model.complete(&prompt).await?;
        Ok(response.content)
    }
}

fn render_instructions(style: PromptStyle, statement: StatementType, text: &str, year: &str) -> String {
    let shape = match style {
        PromptStyle::SingleYear => format!(
            "Return a JSON array of objects with exactly two keys: \"Line Item\" \
             (the label as printed) and \"Value(s)\" (the value for {year} only, as printed).\n\
             Example: [{{\"Line Item\": \"Revenue\", \"Value(s)\": \"1,000\"}}]"
        ),
        PromptStyle::PeriodRecords => "Return a JSON array of objects with exactly three keys: \
             \"item\" (the label as printed), \"value\" (the value as printed) and \
             \"period\" (the fiscal year the value belongs to).\n\
             Example: [{\"item\": \"Revenue\", \"value\": \"1,000\", \"period\": \"2023\"}]"
            .to_string(),
    };

    format!(
        "Extract every line item of the {name} and its value for the fiscal year {year} \
         from the annual report text below.\n\
         {shape}\n\
         Rules:\n\
         - Report one value per line item, for {year} only. Ignore comparative years.\n\
         - Copy numbers exactly as printed, including parentheses for negatives.\n\
         - If the text holds no {name} data, return [].\n\
         - Respond with strictly valid JSON. No prose, no markdown.\n\n\
         TEXT:\n{text}",
        name = statement.display_name(),
    )
}
