//! The text-generation oracle seam.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{dialect::SqlDialect, models::GenerationResult};

/// External capability mapping a prompt to an answer. Content and latency are
/// outside our control; errors mean the oracle could not be reached.
#[async_trait]
pub trait Oracle: Send + Sync + 'static {
    /// Generation call. `Ok(None)` means the oracle answered but produced no
    /// candidate.
    async fn generate(&self, prompt: &str) -> Result<Option<OracleCandidate>>;

    /// Free-text answer, used for the YES/NO dialect review.
    async fn answer(&self, prompt: &str) -> Result<String>;
}

/// Structured candidate as produced by the oracle. Only `sql` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleCandidate {
    pub sql: String,
    #[serde(default, alias = "isValid", skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, alias = "validationNotes", skip_serializing_if = "Option::is_none")]
    pub validation_notes: Option<String>,
    #[serde(default, alias = "dialectUsed", skip_serializing_if = "Option::is_none")]
    pub dialect_used: Option<SqlDialect>,
}

impl OracleCandidate {
    pub fn from_sql<S: Into<String>>(sql: S) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Fills omitted fields with the contract defaults.
    pub fn into_result(self, requested: SqlDialect) -> GenerationResult {
        GenerationResult {
            sql: self.sql.trim().to_string(),
            is_valid: self.is_valid.unwrap_or(true),
            validation_notes: self.validation_notes.unwrap_or_default(),
            dialect_used: self.dialect_used.unwrap_or(requested),
        }
    }
}

/// Interprets raw oracle text: a JSON object (optionally inside a Markdown
/// code fence) or bare SQL. Blank content yields `None`.
pub fn parse_candidate(raw: &str) -> Option<OracleCandidate> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return None;
    }

    if body.starts_with('{') {
        if let Ok(candidate) = serde_json::from_str::<OracleCandidate>(body) {
            return (!candidate.sql.trim().is_empty()).then_some(candidate);
        }
    }
    Some(OracleCandidate::from_sql(body))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (```json, ```sql)
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}
