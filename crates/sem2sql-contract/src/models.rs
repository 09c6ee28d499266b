use serde::{Deserialize, Serialize};

use crate::dialect::SqlDialect;

/// Statement returned when the oracle produced no candidate at all.
pub const FALLBACK_SQL: &str = "SELECT 1;";

/// Natural-language request for one contract invocation.
///
/// Fields are private and only set through the consuming builders, so a
/// request is immutable once handed to the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "query")]
    natural_language_query: String,
    #[serde(default)]
    table_schema: String,
    #[serde(default, alias = "sql_dialect")]
    dialect: SqlDialect,
}

impl QueryRequest {
    pub fn new<Q: Into<String>>(natural_language_query: Q) -> Self {
        Self {
            natural_language_query: natural_language_query.into(),
            table_schema: String::new(),
            dialect: SqlDialect::default(),
        }
    }

    pub fn with_schema<S: Into<String>>(mut self, table_schema: S) -> Self {
        self.table_schema = table_schema.into();
        self
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn natural_language_query(&self) -> &str {
        &self.natural_language_query
    }

    pub fn table_schema(&self) -> &str {
        &self.table_schema
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn has_schema(&self) -> bool {
        !self.table_schema.trim().is_empty()
    }
}

/// Outcome of one contract invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub sql: String,
    pub is_valid: bool,
    pub validation_notes: String,
    pub dialect_used: SqlDialect,
}

impl GenerationResult {
    pub fn fallback(dialect: SqlDialect) -> Self {
        Self {
            sql: FALLBACK_SQL.to_string(),
            is_valid: true,
            validation_notes: "oracle returned no candidate".to_string(),
            dialect_used: dialect,
        }
    }
}
