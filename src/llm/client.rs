use futures::future::BoxFuture;
use log::debug;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::config::{PromptStyle, DEFAULT_MODEL};
use crate::error::{ReconcileError, Result};
use crate::extractor::{ExtractionPrompt, ModelResponse, ModelService};
use crate::llm::types::*;
use crate::schema::{PeriodRecord, SingleYearRow};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(
        &self,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: Some(0.0),
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(ReconcileError::ModelService(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        let candidate = body
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| ReconcileError::ModelService("No candidates returned".to_string()))?;

        if let Some(reason) = &candidate.finish_reason {
            debug!("Gemini finish reason: {}", reason);
        }

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text),
                Part::Other(_) => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ReconcileError::ModelService(
                "Model returned non-text content".to_string(),
            ));
        }
        Ok(text)
    }
}

impl ModelService for GeminiClient {
    fn complete<'a>(&'a self, prompt: &'a ExtractionPrompt) -> BoxFuture<'a, Result<ModelResponse>> {
        Box::pin(async move {
            let schema = response_schema(prompt.style)?;
            let text = self
                .generate_content(&prompt.system, vec![Content::user(prompt.user.clone())], Some(schema))
                .await?;
            Ok(ModelResponse::from(text))
        })
    }
}

/// Response schema for `style` in the dialect Gemini accepts: no `$schema`,
/// no `$ref`/`definitions`, no `title`.
pub fn response_schema(style: PromptStyle) -> Result<Value> {
    let root = match style {
        PromptStyle::SingleYear => schemars::schema_for!(Vec<SingleYearRow>),
        PromptStyle::PeriodRecords => schemars::schema_for!(Vec<PeriodRecord>),
    };
    let mut value = serde_json::to_value(root)?;
    let definitions = value
        .as_object_mut()
        .and_then(|obj| obj.remove("definitions"))
        .and_then(|defs| match defs {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    Ok(inline_refs(value, &definitions))
}

fn inline_refs(value: Value, definitions: &Map<String, Value>) -> Value {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get("$ref") {
                let name = reference.trim_start_matches("#/definitions/");
                if let Some(target) = definitions.get(name) {
                    return inline_refs(target.clone(), definitions);
                }
            }
            let cleaned = obj
                .into_iter()
                .filter(|(key, _)| !matches!(key.as_str(), "$schema" | "$ref" | "title" | "definitions"))
                .map(|(key, v)| (key, inline_refs(v, definitions)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| inline_refs(v, definitions))
                .collect(),
        ),
        other => other,
    }
}
