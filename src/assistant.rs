//! OpenAI chat-completions client — turns a question plus the user's
//! selected tables into a prompt and relays the model's answer.
//!
//! The selected tables arrive verbatim from `/get-model` via the frontend;
//! nothing here re-fetches or re-validates them.

use std::time::Duration;

use serde_json::json;

use crate::config::OpenAiConfig;
use crate::desktop::TableDescriptor;
use crate::error::BridgeError;

/// System prompt framing the assistant's role.
const SYSTEM_PROMPT: &str =
    "You are a helpful Power BI and DAX expert assistant. Provide clear, practical advice.";

/// Render the selected tables as the data-model context block of the prompt.
pub fn build_context(tables: &[TableDescriptor]) -> String {
    let mut context = String::from("Power BI Data Model Context:\n\n");
    for table in tables {
        context.push_str(&format!("Table: {}\n", table.name));
        context.push_str(&format!("   Columns: {}\n", table.columns.join(", ")));
        if let Some(measures) = &table.measures {
            if !measures.is_empty() {
                context.push_str(&format!("   Measures: {}\n", measures.join(", ")));
            }
        }
        context.push('\n');
    }
    context
}

/// Assemble the full user prompt: context, question, closing guidance.
pub fn build_prompt(tables: &[TableDescriptor], question: &str) -> String {
    format!(
        "{}\nUser Question:\n{}\n\nPlease provide clear, actionable guidance based on this Power BI data model.",
        build_context(tables),
        question
    )
}

/// Chat-completions client with a shared connection pool.
#[derive(Debug, Clone)]
pub struct Assistant {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl Assistant {
    pub fn new(config: OpenAiConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BridgeError::Completion(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Send the question with its table context and return the answer text.
    ///
    /// Any failure — transport, non-2xx status, or an unexpected response
    /// shape — surfaces as `Completion` with a descriptive message.
    pub async fn ask(
        &self,
        api_key: &str,
        question: &str,
        tables: &[TableDescriptor],
    ) -> crate::Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(tables, question)},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Completion(format!("request failed: {e}")))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Completion(format!("invalid response body: {e}")))?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(BridgeError::Completion(format!(
                "API returned {status}: {message}"
            )));
        }

        payload
            .pointer("/choices/0/message/content")
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BridgeError::Completion("response contained no completion choices".to_string())
            })
    }
}
