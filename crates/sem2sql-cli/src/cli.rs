use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use sem2sql_contract::{
    DialectRuleEngine, GenerationContract, GenerationError, GenerationService, QueryRequest,
    SqlDialect,
};
use sem2sql_db::{with_read_only_database, StoreError};

use crate::{
    config::{timeout_from_seconds, AppConfig},
    oracle::HttpOracle,
};

#[derive(Parser, Debug)]
#[command(
    name = "sem2sql",
    version,
    about = "Generate dialect-valid SQL from natural language"
)]
pub struct Cli {
    /// SQLite database file (overrides SEM2SQL_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Extra oracle calls allowed after a rejected candidate
    #[arg(long, global = true)]
    pub max_remediations: Option<u32>,

    /// Whole-invocation deadline in seconds, 0 disables it
    #[arg(long, global = true)]
    pub timeout_seconds: Option<u64>,

    /// Ask the oracle to review accepted candidates
    #[arg(long, global = true)]
    pub deep_check: bool,

    /// Debug logging on stderr unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List tables with row and column counts
    Tables,
    /// Show the schema text of one table
    Describe { table: String },
    /// Generate SQL for a query and an optional schema text
    Generate {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "")]
        schema: String,
        #[arg(long, default_value = "generic")]
        dialect: SqlDialect,
    },
    /// Generate SQLite SQL against a table of the database and run it
    Ask {
        #[arg(long)]
        table: String,
        #[arg(long)]
        query: String,
        /// Only generate, do not execute
        #[arg(long)]
        no_execute: bool,
        /// Maximum rows printed (overrides SEM2SQL_ROW_LIMIT)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run the dialect rules against a statement without calling the oracle
    Validate {
        #[arg(long, default_value = "generic")]
        dialect: SqlDialect,
        sql: String,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("failed to write output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("statement rejected")]
    Rejected,
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::Generation(err.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err)
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Output(_) => 1,
            CliError::Generation(err) => match err {
                GenerationError::Precondition(_) => 2,
                GenerationError::ValidationExhausted { .. } => 3,
                GenerationError::OracleUnavailable(_) => 4,
                GenerationError::Timeout(_) => 5,
                GenerationError::Store(StoreError::TableNotFound(_)) => 6,
                GenerationError::Store(_) => 7,
            },
            CliError::Rejected => 3,
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::from_env()?;
    apply_overrides(&cli, &mut config);

    match cli.command {
        Command::Validate { dialect, sql } => validate(dialect, &sql),
        Command::Tables => {
            let stats = with_read_only_database(database_path(&config)?, |db| {
                Box::pin(async move { db.catalog().list_tables_with_stats().await })
            })
            .await
            .map_err(CliError::from)?;
            print_json(&stats)
        }
        Command::Describe { table } => {
            let description = with_read_only_database(database_path(&config)?, |db| {
                Box::pin(async move { db.catalog().describe_table(&table).await })
            })
            .await
            .map_err(CliError::from)?;
            let schema_text = description.render();
            print_json(&json!({
                "table": description.table,
                "columns": description.columns,
                "schema_text": schema_text,
            }))
        }
        Command::Generate {
            query,
            schema,
            dialect,
        } => {
            let service = build_service(&config)?;
            let request = QueryRequest::new(query)
                .with_schema(schema)
                .with_dialect(dialect);
            let result = service.generate(&request).await?;
            print_json(&result)
        }
        Command::Ask {
            table,
            query,
            no_execute,
            limit,
        } => {
            let path = database_path(&config)?;
            let service = build_service(&config)?.with_row_limit(limit.unwrap_or(config.row_limit));
            let answer = with_read_only_database(path, |db| {
                Box::pin(async move {
                    service
                        .answer_for_table(db, &query, &table, !no_execute)
                        .await
                        .map_err(CliError::from)
                })
            })
            .await?;
            print_json(&answer)
        }
    }
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(max) = cli.max_remediations {
        config.contract.max_remediations = max;
    }
    if let Some(seconds) = cli.timeout_seconds {
        config.contract.invocation_timeout = timeout_from_seconds(seconds);
    }
    if cli.deep_check {
        config.contract.deep_check.enabled = true;
    }
}

/// The store is always opened read-only: generated statements never get write access.
fn database_path(config: &AppConfig) -> Result<&Path, CliError> {
    let path = config
        .db_path
        .as_deref()
        .ok_or_else(|| anyhow!("no database configured: pass --db or set SEM2SQL_DB_PATH"))?;
    Ok(path)
}

fn build_service(config: &AppConfig) -> Result<GenerationService<HttpOracle>, CliError> {
    let oracle = HttpOracle::new(&config.oracle)?;
    info!(
        model = %config.oracle.model,
        max_attempts = config.contract.max_attempts(),
        deep_check = config.contract.deep_check.enabled,
        "generation service ready"
    );
    Ok(GenerationService::new(GenerationContract::new(
        oracle,
        config.contract.clone(),
    )))
}

fn validate(dialect: SqlDialect, sql: &str) -> Result<(), CliError> {
    let outcome = DialectRuleEngine::new().check(sql, dialect);
    print_json(&json!({
        "dialect": dialect,
        "valid": outcome.is_ok(),
        "failure": outcome.as_ref().err(),
        "reason": outcome.as_ref().err().map(ToString::to_string),
    }))?;
    outcome.map_err(|_| CliError::Rejected)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
