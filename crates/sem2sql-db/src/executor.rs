//! Statement execution and row shaping.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number, Value};
use sqlx::{
    sqlite::{SqliteConnection, SqliteRow},
    Column, Row, TypeInfo, ValueRef,
};
use tracing::{debug, instrument};

use crate::StoreError;

/// One result row: column name to value, in the column order the store reported.
pub type RowMap = Map<String, Value>;

/// Execution view borrowed from a [`crate::Database`] handle.
///
/// Statements are expected to be validated upstream; the executor neither
/// retries nor limits the result set.
pub struct QueryExecutor<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> QueryExecutor<'a> {
    pub(crate) fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self))]
    pub async fn execute(&mut self, sql: &str) -> Result<Vec<RowMap>, StoreError> {
        let rows = sqlx::query(sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|source| StoreError::Execution {
                sql: sql.to_owned(),
                source,
            })?;

        let shaped = rows
            .iter()
            .map(shape_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::Execution {
                sql: sql.to_owned(),
                source,
            })?;
        debug!(rows = shaped.len(), "statement executed");
        Ok(shaped)
    }
}

fn shape_row(row: &SqliteRow) -> Result<RowMap, sqlx::Error> {
    let mut out = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_value(row, column.ordinal())?;
        out.insert(column.name().to_owned(), value);
    }
    Ok(out)
}

// SQLite is dynamically typed, so dispatch on the storage class of the value
// rather than the declared column type.
fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage_class = raw.type_info().name().to_ascii_uppercase();

    let value = match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
            Value::Number(row.try_get_unchecked::<i64, _>(index)?.into())
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            let real = row.try_get_unchecked::<f64, _>(index)?;
            Number::from_f64(real).map(Value::Number).unwrap_or(Value::Null)
        }
        "BLOB" => Value::String(STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}
