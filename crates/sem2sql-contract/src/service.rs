//! Caller-facing facade over the contract and a store catalog.

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use sem2sql_db::{qualify_table, render_schema_text, Database, RowMap, StoreError};

use crate::{
    audit::AuditEvent,
    contract::GenerationContract,
    dialect::SqlDialect,
    models::{GenerationResult, QueryRequest},
    oracle::Oracle,
    GenerationError,
};

const DEFAULT_ROW_LIMIT: usize = 10;

/// Minimal schema text for a table known only by name and column description.
pub fn table_schema_text(table: &str, columns_info: &str) -> String {
    render_schema_text(table, columns_info)
}

/// Outcome of [`GenerationService::answer_for_table`].
#[derive(Debug, Clone, Serialize)]
pub struct TableAnswer {
    pub table: String,
    /// Statement as accepted by the contract.
    pub sql: String,
    /// Statement actually run, after table re-qualification. `None` when
    /// execution was not requested.
    pub executed_sql: Option<String>,
    pub rows: Vec<RowMap>,
    pub total_rows: usize,
    pub truncated: bool,
}

pub struct GenerationService<O>
where
    O: Oracle,
{
    contract: GenerationContract<O>,
    default_dialect: SqlDialect,
    row_limit: usize,
}

impl<O> Clone for GenerationService<O>
where
    O: Oracle,
{
    fn clone(&self) -> Self {
        Self {
            contract: self.contract.clone(),
            default_dialect: self.default_dialect,
            row_limit: self.row_limit,
        }
    }
}

impl<O> GenerationService<O>
where
    O: Oracle,
{
    pub fn new(contract: GenerationContract<O>) -> Self {
        Self {
            contract,
            default_dialect: SqlDialect::default(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Dialect used by [`Self::generate_sql`] and [`Self::generate_sql_for_table`].
    pub fn with_default_dialect(mut self, dialect: SqlDialect) -> Self {
        self.default_dialect = dialect;
        self
    }

    /// Display cap applied by [`Self::answer_for_table`].
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn contract(&self) -> &GenerationContract<O> {
        &self.contract
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    pub async fn generate(&self, request: &QueryRequest) -> Result<GenerationResult, GenerationError> {
        self.contract.generate(request).await
    }

    pub async fn generate_sql(&self, query: &str, table_schema: &str) -> Result<String, GenerationError> {
        let request = QueryRequest::new(query)
            .with_schema(table_schema)
            .with_dialect(self.default_dialect);
        Ok(self.contract.generate(&request).await?.sql)
    }

    pub async fn generate_sql_for_table(
        &self,
        query: &str,
        table: &str,
        columns_info: &str,
    ) -> Result<String, GenerationError> {
        self.generate_sql(query, &table_schema_text(table, columns_info))
            .await
    }

    /// Generates against the live schema of `table`.
    pub async fn generate_for_catalog_table(
        &self,
        db: &mut Database,
        query: &str,
        table: &str,
        dialect: SqlDialect,
    ) -> Result<GenerationResult, GenerationError> {
        let schema = db.catalog().schema_text(table).await?;
        let request = QueryRequest::new(query)
            .with_schema(schema)
            .with_dialect(dialect);
        self.contract.generate(&request).await
    }

    /// Table-scoped flow: verify the table, generate SQLite SQL from its live
    /// schema, and optionally run it with the table name re-quoted.
    #[instrument(skip(self, db, query), fields(location = %db.location()))]
    pub async fn answer_for_table(
        &self,
        db: &mut Database,
        query: &str,
        table: &str,
        execute: bool,
    ) -> Result<TableAnswer, GenerationError> {
        let tables = db.catalog().list_tables().await?;
        if !tables.iter().any(|name| name == table) {
            return Err(StoreError::TableNotFound(table.to_owned()).into());
        }

        let generated = self
            .generate_for_catalog_table(db, query, table, SqlDialect::Sqlite)
            .await?;
        if !execute {
            return Ok(TableAnswer {
                table: table.to_owned(),
                sql: generated.sql,
                executed_sql: None,
                rows: Vec::new(),
                total_rows: 0,
                truncated: false,
            });
        }

        let executed_sql = qualify_table(&generated.sql, table);
        debug!(sql = %executed_sql, "executing generated statement");
        let mut rows = db.executor().execute(&executed_sql).await?;
        let total_rows = rows.len();
        info!(total_rows, "generated statement executed");

        self.contract
            .record_audit(AuditEvent::query_executed(
                Uuid::new_v4(),
                SqlDialect::Sqlite,
                table.to_owned(),
                executed_sql.clone(),
                total_rows,
            ))
            .await;

        let truncated = total_rows > self.row_limit;
        rows.truncate(self.row_limit);

        Ok(TableAnswer {
            table: table.to_owned(),
            sql: generated.sql,
            executed_sql: Some(executed_sql),
            rows,
            total_rows,
            truncated,
        })
    }
}
