use std::path::Path;

use anyhow::Result;
use serde_json::json;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Connection};
use tempfile::tempdir;

use sem2sql_db::{
    qualify_table, with_database, with_read_only_database, Database, StoreError,
};

async fn seed_file(path: &Path) -> Result<()> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await?;
    for statement in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, country TEXT)",
        "CREATE TABLE \"group\" (id INTEGER PRIMARY KEY, label TEXT)",
        "INSERT INTO customers (name, country) VALUES ('Ana', 'USA'), ('Bo', 'SE'), ('Cy', 'USA')",
        "INSERT INTO \"group\" (label) VALUES ('admins')",
    ] {
        sqlx::query(statement).execute(&mut conn).await?;
    }
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn catalog_and_executor_over_a_file_store() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("shop.db");
    seed_file(&path).await?;

    let mut db = Database::open_read_only(&path).await?;

    let tables = db.catalog().list_tables().await?;
    assert_eq!(tables, vec!["customers".to_string(), "group".to_string()]);

    let stats = db.catalog().list_tables_with_stats().await?;
    assert_eq!(stats["customers"].row_count, 3);
    assert_eq!(stats["group"].row_count, 1);

    let columns = db.catalog().columns_info("customers").await?;
    assert_eq!(
        columns,
        "id (INTEGER, PRIMARY KEY), name (TEXT, NOT NULL), country (TEXT)"
    );

    let sql = qualify_table("SELECT label FROM group", "group");
    assert_eq!(sql, "SELECT label FROM \"group\"");
    let rows = db.executor().execute(&sql).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["label"], json!("admins"));

    let rows = db
        .executor()
        .execute("SELECT name, country FROM customers WHERE country = 'USA' ORDER BY id")
        .await?;
    let names: Vec<_> = rows.iter().map(|row| row["name"].clone()).collect();
    assert_eq!(names, vec![json!("Ana"), json!("Cy")]);

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn read_only_handle_rejects_writes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("shop.db");
    seed_file(&path).await?;

    let mut db = Database::open_read_only(&path).await?;
    let err = db
        .executor()
        .execute("DELETE FROM customers")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Execution { .. }));

    let remaining = db.executor().execute("SELECT COUNT(*) AS n FROM customers").await?;
    assert_eq!(remaining[0]["n"], json!(3));
    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn missing_table_fails_without_partial_rows() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("shop.db");
    seed_file(&path).await?;
    let url = format!("sqlite://{}", path.display());

    let outcome: Result<Vec<_>, StoreError> = with_database(&url, |db| {
        Box::pin(async move { db.executor().execute("SELECT * FROM invoices").await })
    })
    .await;

    let err = outcome.unwrap_err();
    assert!(matches!(err, StoreError::Execution { .. }));
    assert!(err.backend_message().unwrap().contains("no such table"));
    Ok(())
}

#[tokio::test]
async fn file_names_with_url_metacharacters_open_by_path() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("q3?draft#2 100%.db");
    seed_file(&path).await?;

    let tables = with_read_only_database(&path, |db| {
        Box::pin(async move { db.catalog().list_tables().await })
    })
    .await?;
    assert_eq!(tables, vec!["customers".to_string(), "group".to_string()]);

    let fresh = dir.path().join("new?#%.db");
    let db = Database::connect_file(&fresh).await?;
    db.close().await?;
    assert!(fresh.exists());
    Ok(())
}

#[tokio::test]
async fn read_only_scope_rejects_writes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("shop.db");
    seed_file(&path).await?;

    let outcome: Result<Vec<_>, StoreError> = with_read_only_database(&path, |db| {
        Box::pin(async move { db.executor().execute("DELETE FROM customers").await })
    })
    .await;
    assert!(matches!(outcome, Err(StoreError::Execution { .. })));

    let mut db = Database::open_read_only(&path).await?;
    let rows = db.executor().execute("SELECT COUNT(*) AS n FROM customers").await?;
    assert_eq!(rows[0]["n"], json!(3));
    db.close().await?;
    Ok(())
}
