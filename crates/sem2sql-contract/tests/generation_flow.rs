use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use sem2sql_contract::{
    ContractConfig, GenerationContract, GenerationError, GenerationService, Oracle,
    OracleCandidate, QueryRequest, SqlDialect,
};
use sem2sql_db::{Database, StoreError};

/// Answers every generation prompt with the same SQL and records prompts.
struct FixedOracle {
    sql: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FixedOracle {
    fn answering(sql: &'static str) -> Self {
        Self {
            sql: Some(sql),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn silent() -> Self {
        Self {
            sql: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn generate(&self, prompt: &str) -> Result<Option<OracleCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        Ok(self.sql.map(OracleCandidate::from_sql))
    }

    async fn answer(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("no reviewer"))
    }
}

/// Echoes the request line back inside a string literal, so concurrent
/// invocations can be told apart by their output.
struct EchoOracle;

#[async_trait]
impl Oracle for EchoOracle {
    async fn generate(&self, prompt: &str) -> Result<Option<OracleCandidate>> {
        let request = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Request: "))
            .ok_or_else(|| anyhow!("prompt without request line"))?;
        tokio::task::yield_now().await;
        Ok(Some(OracleCandidate::from_sql(format!(
            "SELECT '{}' AS echo",
            request.replace('\'', "''")
        ))))
    }

    async fn answer(&self, _prompt: &str) -> Result<String> {
        Ok("YES".into())
    }
}

async fn shop() -> Result<Database> {
    let mut db = Database::connect("sqlite::memory:").await?;
    for statement in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, country TEXT)",
        "CREATE TABLE \"order items\" (sku TEXT NOT NULL, qty INT)",
        "INSERT INTO \"order items\" VALUES ('A-1', 2), ('B-7', 1)",
    ] {
        sqlx::query(statement).execute(db.connection()).await?;
    }
    for n in 1..=25 {
        sqlx::query("INSERT INTO users (name, country) VALUES (?1, ?2)")
            .bind(format!("user{n}"))
            .bind(if n % 2 == 0 { "USA" } else { "SE" })
            .execute(db.connection())
            .await?;
    }
    Ok(db)
}

fn service(oracle: FixedOracle) -> GenerationService<FixedOracle> {
    GenerationService::new(GenerationContract::new(oracle, ContractConfig::default()))
}

#[tokio::test]
async fn fallback_sentinel_when_oracle_has_nothing() -> Result<()> {
    let service = service(FixedOracle::silent());
    let sql = service.generate_sql("anything at all", "").await?;
    assert_eq!(sql, "SELECT 1;");
    Ok(())
}

#[tokio::test]
async fn generate_sql_for_table_sends_minimal_schema() -> Result<()> {
    let service = service(FixedOracle::answering("SELECT name FROM users"))
        .with_default_dialect(SqlDialect::Mysql);
    let sql = service
        .generate_sql_for_table("all names", "users", "id (INT), name (VARCHAR)")
        .await?;
    assert_eq!(sql, "SELECT name FROM users");

    let prompts = service.contract().oracle().prompts.lock().clone();
    assert!(prompts[0].contains("Target dialect: MYSQL"));
    assert!(prompts[0].contains("Table: users\n   Columns: id (INT), name (VARCHAR)"));
    Ok(())
}

#[tokio::test]
async fn persistent_dialect_violation_exhausts_default_budget() -> Result<()> {
    let service = service(FixedOracle::answering(
        "SELECT * FROM a FULL OUTER JOIN b ON a.id = b.id",
    ));
    let request = QueryRequest::new("join everything").with_dialect(SqlDialect::Sqlite);
    let err = service.generate(&request).await.unwrap_err();

    assert_eq!(err.status_hint(), 422);
    match err {
        GenerationError::ValidationExhausted {
            attempts, notes, ..
        } => {
            assert_eq!(attempts, 4);
            assert_eq!(notes.len(), 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.contract().oracle().calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn concurrent_invocations_keep_their_own_state() -> Result<()> {
    let contract = Arc::new(GenerationContract::new(EchoOracle, ContractConfig::default()));
    let dialects = [
        SqlDialect::Sqlite,
        SqlDialect::Mysql,
        SqlDialect::Postgresql,
        SqlDialect::Generic,
    ];

    let mut handles = Vec::new();
    for n in 0..16 {
        let contract = contract.clone();
        let dialect = dialects[n % dialects.len()];
        handles.push(tokio::spawn(async move {
            let request = QueryRequest::new(format!("request number {n}")).with_dialect(dialect);
            let result = contract.generate(&request).await;
            (n, dialect, result)
        }));
    }

    for handle in handles {
        let (n, dialect, result) = handle.await?;
        let result = result?;
        assert_eq!(result.sql, format!("SELECT 'request number {n}' AS echo"));
        assert_eq!(result.dialect_used, dialect);
    }
    Ok(())
}

#[tokio::test]
async fn answer_for_table_executes_and_caps_rows() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering(
        "SELECT id, name, country FROM users ORDER BY id",
    ));

    let answer = service
        .answer_for_table(&mut db, "every user", "users", true)
        .await?;

    assert_eq!(
        answer.executed_sql.as_deref(),
        Some("SELECT id, name, country FROM \"users\" ORDER BY id")
    );
    assert_eq!(answer.total_rows, 25);
    assert!(answer.truncated);
    assert_eq!(answer.rows.len(), 10);
    let first: Vec<&str> = answer.rows[0].keys().map(String::as_str).collect();
    assert_eq!(first, ["id", "name", "country"]);
    assert_eq!(answer.rows[0]["name"], json!("user1"));

    let prompts = service.contract().oracle().prompts.lock().clone();
    assert!(prompts[0].contains("Target dialect: SQLITE"));
    assert!(prompts[0].contains(
        "Table: users\n   Columns: id (INTEGER, PRIMARY KEY), name (TEXT, NOT NULL), country (TEXT)"
    ));
    Ok(())
}

#[tokio::test]
async fn answer_for_table_quotes_awkward_table_names() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering("SELECT sku FROM order items ORDER BY sku"))
        .with_row_limit(1);

    let answer = service
        .answer_for_table(&mut db, "all skus", "order items", true)
        .await?;
    assert_eq!(answer.total_rows, 2);
    assert_eq!(answer.rows, vec![json!({"sku": "A-1"}).as_object().cloned().unwrap()]);
    assert!(answer.truncated);
    Ok(())
}

#[tokio::test]
async fn answer_for_table_can_skip_execution() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering("SELECT COUNT(*) FROM users"));

    let answer = service
        .answer_for_table(&mut db, "how many users", "users", false)
        .await?;
    assert_eq!(answer.sql, "SELECT COUNT(*) FROM users");
    assert!(answer.executed_sql.is_none());
    assert!(answer.rows.is_empty());
    assert!(!answer.truncated);
    Ok(())
}

#[tokio::test]
async fn unknown_table_is_reported_before_generation() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering("SELECT * FROM ghosts"));

    let err = service
        .answer_for_table(&mut db, "anything", "ghosts", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Store(StoreError::TableNotFound(ref table)) if table == "ghosts"
    ));
    assert_eq!(err.status_hint(), 404);
    assert_eq!(service.contract().oracle().calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn execution_failures_are_not_retried() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering("SELECT missing_column FROM users"));

    let err = service
        .answer_for_table(&mut db, "broken", "users", true)
        .await
        .unwrap_err();
    assert_eq!(err.status_hint(), 400);
    match err {
        GenerationError::Store(store @ StoreError::Execution { .. }) => {
            let detail = store.backend_message().unwrap_or_default();
            assert!(detail.contains("no such column"), "{detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.contract().oracle().calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn stacked_statements_never_reach_the_store() -> Result<()> {
    let mut db = shop().await?;
    let service = service(FixedOracle::answering(
        "SELECT COUNT(*) AS n FROM users; DELETE FROM users",
    ));

    let err = service
        .answer_for_table(&mut db, "count then wipe", "users", true)
        .await
        .unwrap_err();
    match err {
        GenerationError::ValidationExhausted {
            attempts, notes, ..
        } => {
            assert_eq!(attempts, 4);
            assert!(notes.iter().all(|note| note.contains("only one statement")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.contract().oracle().calls.load(Ordering::SeqCst), 4);

    let remaining = db
        .executor()
        .execute("SELECT COUNT(*) AS n FROM users")
        .await?;
    assert_eq!(remaining[0]["n"], json!(25));
    Ok(())
}
