//! Oracle backed by an OpenAI-compatible chat-completions endpoint.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use sem2sql_contract::{parse_candidate, Oracle, OracleCandidate};

use crate::config::OracleSettings;

const GENERATION_SYSTEM_PROMPT: &str =
    "You translate natural-language questions into SQL. Return only the JSON object you are asked for, no other text.";
const REVIEW_SYSTEM_PROMPT: &str = "You review SQL statements. Answer with a single word: YES or NO.";

pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpOracle {
    pub fn new(settings: &OracleSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .context("SEM2SQL_ORACLE_API_KEY or OPENAI_API_KEY must be configured")?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.clone(),
            api_key,
            model: settings.model.clone(),
        })
    }

    async fn chat(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": max_tokens
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion endpoint returned an error status")?;

        let payload: Value = response
            .json()
            .await
            .context("chat completion response is not JSON")?;
        let content = message_content(&payload)?;
        debug!(chars = content.len(), model = %self.model, "chat completion received");
        Ok(content)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn generate(&self, prompt: &str) -> Result<Option<OracleCandidate>> {
        let content = self.chat(GENERATION_SYSTEM_PROMPT, prompt, 1000).await?;
        Ok(parse_candidate(&content))
    }

    async fn answer(&self, prompt: &str) -> Result<String> {
        self.chat(REVIEW_SYSTEM_PROMPT, prompt, 5).await
    }
}

/// Extracts `choices[0].message.content`. A `null` content counts as an empty
/// answer, a missing `choices` array as a malformed response.
fn message_content(payload: &Value) -> Result<String> {
    let message = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("chat completion response has no choices"))?;

    Ok(message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}
