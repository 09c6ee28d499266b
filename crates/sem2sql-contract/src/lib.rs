//! Natural-language to SQL generation under a validation contract.
//!
//! The generation step itself is delegated to an opaque [`Oracle`]. This crate
//! owns everything around it: the dialect-specific instruction prompt, the
//! structural [`DialectRuleEngine`] that accepts or rejects candidates, the
//! bounded remediation loop in [`GenerationContract`], and the
//! [`GenerationService`] facade that pulls schema context from a
//! `sem2sql-db` catalog and optionally executes the accepted statement.

mod audit;
pub mod contract;
pub mod dialect;
pub mod models;
pub mod oracle;
pub mod prompt;
pub mod rules;
pub mod service;

use std::time::Duration;

use sem2sql_db::StoreError;
use thiserror::Error;

pub use audit::{AuditConfig, AuditEvent, AuditEventKind};
pub use contract::GenerationContract;
pub use dialect::{DialectGuide, SqlDialect, UnknownDialect};
pub use models::{GenerationResult, QueryRequest, FALLBACK_SQL};
pub use oracle::{parse_candidate, Oracle, OracleCandidate};
pub use rules::{DialectRuleEngine, ValidationFailure};
pub use service::{table_schema_text, GenerationService, TableAnswer};

const DEFAULT_MAX_REMEDIATIONS: u32 = 3;
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_DEEP_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

/// Knobs of the generation contract.
#[derive(Debug, Clone)]
pub struct ContractConfig {
    /// Additional oracle calls allowed after the first rejected candidate.
    pub max_remediations: u32,
    /// Upper bound for a whole invocation, retries included.
    pub invocation_timeout: Option<Duration>,
    pub deep_check: DeepCheckConfig,
    pub audit: AuditConfig,
}

impl ContractConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_remediations.saturating_add(1)
    }
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            max_remediations: DEFAULT_MAX_REMEDIATIONS,
            invocation_timeout: Some(DEFAULT_INVOCATION_TIMEOUT),
            deep_check: DeepCheckConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Second-opinion review asking the oracle whether a structurally valid
/// candidate is idiomatic for the dialect.
#[derive(Debug, Clone)]
pub struct DeepCheckConfig {
    pub enabled: bool,
    pub timeout: Duration,
    /// Treat an unreachable reviewer as approval. Off by default: an
    /// unavailable reviewer rejects the candidate with
    /// [`ValidationFailure::DeepCheckUnavailable`].
    pub fail_open: bool,
}

impl Default for DeepCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: DEFAULT_DEEP_CHECK_TIMEOUT,
            fail_open: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error(
        "no dialect-valid SQL after {attempts} attempt(s): {}",
        .notes.join("; ")
    )]
    ValidationExhausted {
        attempts: u32,
        last_candidate: Box<GenerationResult>,
        notes: Vec<String>,
    },
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(anyhow::Error),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GenerationError {
    /// HTTP-style status a glue layer may map this error to.
    pub fn status_hint(&self) -> u16 {
        match self {
            GenerationError::Precondition(_) => 400,
            GenerationError::ValidationExhausted { .. } => 422,
            GenerationError::OracleUnavailable(_) => 502,
            GenerationError::Timeout(_) => 504,
            GenerationError::Store(StoreError::TableNotFound(_)) => 404,
            GenerationError::Store(StoreError::Execution { .. }) => 400,
            GenerationError::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_allows_four_attempts() {
        let config = ContractConfig::default();
        assert_eq!(config.max_attempts(), 4);
        assert!(!config.deep_check.enabled);
        assert!(!config.deep_check.fail_open);
    }

    #[test]
    fn status_hints_follow_taxonomy() {
        assert_eq!(GenerationError::Precondition("empty".into()).status_hint(), 400);
        assert_eq!(
            GenerationError::Store(StoreError::TableNotFound("x".into())).status_hint(),
            404
        );
        assert_eq!(
            GenerationError::OracleUnavailable(anyhow::anyhow!("down")).status_hint(),
            502
        );
        let exhausted = GenerationError::ValidationExhausted {
            attempts: 2,
            last_candidate: Box::new(GenerationResult::fallback(SqlDialect::Mysql)),
            notes: vec!["a".into(), "b".into()],
        };
        assert_eq!(exhausted.status_hint(), 422);
        assert_eq!(
            exhausted.to_string(),
            "no dialect-valid SQL after 2 attempt(s): a; b"
        );
    }
}
