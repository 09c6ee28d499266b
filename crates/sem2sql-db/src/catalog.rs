//! Schema discovery and canonical schema rendering.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteConnection, Row};
use tracing::{debug, instrument};

use crate::{quote::quote_identifier, StoreError};

/// Column metadata as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub is_primary_key: bool,
    pub not_null: bool,
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.declared_type)?;
        if self.is_primary_key {
            f.write_str(", PRIMARY KEY")?;
        } else if self.not_null {
            // primary keys already imply the constraint in the rendering
            f.write_str(", NOT NULL")?;
        }
        f.write_str(")")
    }
}

/// Ordered column list of a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchemaDescription {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchemaDescription {
    /// Comma separated column rendering, e.g. `id (INTEGER, PRIMARY KEY), name (TEXT)`.
    pub fn columns_text(&self) -> String {
        self.columns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Canonical schema text passed across the generation boundary.
    pub fn render(&self) -> String {
        render_schema_text(&self.table, &self.columns_text())
    }
}

/// Formats the two-line schema block from a table name and a columns body.
pub fn render_schema_text(table: &str, columns_text: &str) -> String {
    format!("Table: {table}\n   Columns: {columns_text}")
}

/// Summary row of [`SchemaCatalog::list_tables_with_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: u64,
    pub column_count: usize,
    pub columns: Vec<String>,
}

/// Metadata view borrowed from a [`crate::Database`] handle.
pub struct SchemaCatalog<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SchemaCatalog<'a> {
    pub(crate) fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Lists user tables in the store's enumeration order. SQLite internal
    /// tables (`sqlite_%`) are skipped.
    pub async fn list_tables(&mut self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *self.conn)
        .await
        .map_err(StoreError::Metadata)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Metadata)
    }

    /// Describes one table. Fails with [`StoreError::TableNotFound`] when the
    /// store reports no columns for `table`.
    #[instrument(skip(self))]
    pub async fn describe_table(&mut self, table: &str) -> Result<TableSchemaDescription, StoreError> {
        let columns = self.columns(table).await?;
        if columns.is_empty() {
            return Err(StoreError::TableNotFound(table.to_owned()));
        }

        debug!(columns = columns.len(), "table described");
        Ok(TableSchemaDescription {
            table: table.to_owned(),
            columns,
        })
    }

    /// Canonical schema text for `table`, see [`TableSchemaDescription::render`].
    pub async fn schema_text(&mut self, table: &str) -> Result<String, StoreError> {
        Ok(self.describe_table(table).await?.render())
    }

    /// Columns body only, see [`TableSchemaDescription::columns_text`].
    pub async fn columns_info(&mut self, table: &str) -> Result<String, StoreError> {
        Ok(self.describe_table(table).await?.columns_text())
    }

    /// Row count, column count and column names per table. Every table costs
    /// one full `COUNT(*)` scan.
    #[instrument(skip(self))]
    pub async fn list_tables_with_stats(
        &mut self,
    ) -> Result<BTreeMap<String, TableStats>, StoreError> {
        let mut out = BTreeMap::new();
        for table in self.list_tables().await? {
            let count_sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&table));
            let row_count: i64 = sqlx::query_scalar(&count_sql)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(StoreError::Metadata)?;

            let columns: Vec<String> = self
                .columns(&table)
                .await?
                .into_iter()
                .map(|column| column.name)
                .collect();

            out.insert(
                table,
                TableStats {
                    row_count: row_count.max(0) as u64,
                    column_count: columns.len(),
                    columns,
                },
            );
        }
        Ok(out)
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        // Bound as a parameter, so the name never has to be spliced into SQL.
        let rows = sqlx::query(
            r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(StoreError::Metadata)?;

        rows.iter()
            .map(|row| -> Result<ColumnDescriptor, sqlx::Error> {
                Ok(ColumnDescriptor {
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    is_primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Metadata)
    }
}
