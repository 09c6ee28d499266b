//! Store adapter for the semantic2sql pipeline.
//!
//! This crate wraps a single SQLite connection (sqlx) and exposes the two
//! views the generation pipeline needs: a [`SchemaCatalog`] that discovers
//! tables and renders the canonical schema text handed to the oracle, and a
//! [`QueryExecutor`] that runs already validated statements and shapes rows
//! into ordered field maps.
//!
//! A [`Database`] owns its connection exclusively. Open one handle per logical
//! session; [`with_database`] scopes a unit of work and closes the handle on
//! every exit path.

pub mod catalog;
pub mod executor;
pub mod quote;

use std::{path::Path, str::FromStr, time::Duration};

use futures::future::BoxFuture;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection,
};
use thiserror::Error;
use tracing::{debug, warn};

pub use catalog::{
    render_schema_text, ColumnDescriptor, SchemaCatalog, TableSchemaDescription, TableStats,
};
pub use executor::{QueryExecutor, RowMap};
pub use quote::{qualify_table, quote_identifier};

/// Default SQLite busy timeout in milliseconds when the file is locked by a writer.
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors surfaced at the store boundary. None of them are retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database '{location}': {source}")]
    Connect {
        location: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("query execution failed: {source}")]
    Execution {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("schema introspection failed: {0}")]
    Metadata(#[source] sqlx::Error),
}

impl StoreError {
    /// Backend detail for execution failures (e.g. `no such table: users`).
    pub fn backend_message(&self) -> Option<String> {
        match self {
            StoreError::Execution { source, .. } | StoreError::Metadata(source) => {
                match source {
                    sqlx::Error::Database(db_err) => Some(db_err.message().to_owned()),
                    other => Some(other.to_string()),
                }
            }
            _ => None,
        }
    }
}

/// Exclusively owned handle over one connection to a backing store.
#[derive(Debug)]
pub struct Database {
    conn: SqliteConnection,
    location: String,
}

impl Database {
    /// Opens a connection to the SQLite database at the given URL
    /// (e.g. `sqlite://data/shop.db` or `sqlite::memory:`).
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|source| StoreError::Connect {
                location: database_url.to_owned(),
                source,
            })?
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        Self::open_with(options, database_url).await
    }

    /// Opens (creating if needed) a writable database file. The path is used
    /// as-is, so names containing `?`, `#` or `%` need no escaping.
    pub async fn connect_file(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        Self::open_with(options, &path.display().to_string()).await
    }

    /// Opens an existing database file without write access. Used by callers
    /// that execute generated statements.
    pub async fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        Self::open_with(options, &path.display().to_string()).await
    }

    async fn open_with(options: SqliteConnectOptions, location: &str) -> Result<Self, StoreError> {
        let conn = options
            .connect()
            .await
            .map_err(|source| StoreError::Connect {
                location: location.to_owned(),
                source,
            })?;
        debug!(location, "database handle opened");
        Ok(Self {
            conn,
            location: location.to_owned(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Raw connection for seeding fixtures. Not part of the runtime API:
    /// generated statements only ever reach the store through [`Self::executor`].
    #[cfg(any(test, feature = "test-util"))]
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Metadata view over this handle.
    pub fn catalog(&mut self) -> SchemaCatalog<'_> {
        SchemaCatalog::new(&mut self.conn)
    }

    /// Execution view over this handle.
    pub fn executor(&mut self) -> QueryExecutor<'_> {
        QueryExecutor::new(&mut self.conn)
    }

    /// Closes the underlying connection gracefully.
    pub async fn close(self) -> Result<(), StoreError> {
        let location = self.location;
        self.conn
            .close()
            .await
            .map_err(|source| StoreError::Connect {
                location: location.clone(),
                source,
            })?;
        debug!(location = %location, "database handle closed");
        Ok(())
    }
}

/// Runs `work` against a freshly opened handle and closes it afterwards,
/// whether `work` succeeded or not. Close failures are logged; the outcome of
/// `work` is what the caller receives.
///
/// The closure receives the handle by mutable reference and must return a
/// boxed future borrowing it, so captured state has to be owned:
///
/// ```no_run
/// # async fn demo() -> Result<(), sem2sql_db::StoreError> {
/// let tables = sem2sql_db::with_database("sqlite::memory:", |db| {
///     Box::pin(async move { db.catalog().list_tables().await })
/// })
/// .await?;
/// # let _ = tables;
/// # Ok(())
/// # }
/// ```
pub async fn with_database<T, E, F>(database_url: &str, work: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: for<'c> FnOnce(&'c mut Database) -> BoxFuture<'c, Result<T, E>>,
{
    let db = Database::connect(database_url).await?;
    scoped(db, work).await
}

/// [`with_database`] over an existing file opened without write access.
pub async fn with_read_only_database<T, E, F>(path: &Path, work: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: for<'c> FnOnce(&'c mut Database) -> BoxFuture<'c, Result<T, E>>,
{
    let db = Database::open_read_only(path).await?;
    scoped(db, work).await
}

async fn scoped<T, E, F>(mut db: Database, work: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut Database) -> BoxFuture<'c, Result<T, E>>,
{
    let outcome = work(&mut db).await;
    if let Err(err) = db.close().await {
        warn!(error = %err, "failed to close database handle");
    }
    outcome
}
