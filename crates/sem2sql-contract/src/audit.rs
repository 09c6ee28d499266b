//! Optional JSON-lines journal of generation attempts and executions.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use crate::dialect::SqlDialect;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub log_path: PathBuf,
    /// When set, every line carries a base64 HMAC-SHA256 of its payload.
    pub hmac_key: Option<Vec<u8>>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: PathBuf::from("./logs/generation.jsonl"),
            hmac_key: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AuditLogWriter {
    path: PathBuf,
    hmac_key: Option<Vec<u8>>,
    // serialises appends from concurrent invocations
    lock: Mutex<()>,
}

impl AuditLogWriter {
    pub fn try_new(config: &AuditConfig) -> Result<Self> {
        if let Some(parent) = config.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating journal directory {}", parent.display()))?;
        }

        Ok(Self {
            path: config.log_path.clone(),
            hmac_key: config.hmac_key.clone(),
            lock: Mutex::new(()),
        })
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<()> {
        #[derive(Serialize)]
        struct JournalLine<'a> {
            #[serde(flatten)]
            event: &'a AuditEvent,
            #[serde(skip_serializing_if = "Option::is_none")]
            signature: Option<String>,
        }

        let payload = serde_json::to_vec(event).context("serializing journal event")?;
        let signature = self.sign(&payload)?;
        let mut encoded = serde_json::to_vec(&JournalLine { event, signature })
            .context("serializing journal line")?;
        encoded.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening journal {}", self.path.display()))?;
        file.write_all(&encoded).await?;
        Ok(())
    }

    fn sign(&self, payload: &[u8]) -> Result<Option<String>> {
        let Some(key) = &self.hmac_key else {
            return Ok(None);
        };
        let mut mac =
            HmacSha256::new_from_slice(key).context("initializing HMAC for journal line")?;
        mac.update(payload);
        Ok(Some(STANDARD_NO_PAD.encode(mac.finalize().into_bytes())))
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub dialect: SqlDialect,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventKind {
    #[serde(rename = "generation_attempt")]
    Attempt { attempt: u32 },
    #[serde(rename = "generation_rejected")]
    Rejected {
        attempt: u32,
        sql: String,
        reason: String,
    },
    #[serde(rename = "generation_accepted")]
    Accepted { attempt: u32, sql: String },
    #[serde(rename = "generation_failed")]
    Failed { reason: String },
    QueryExecuted {
        table: String,
        sql: String,
        row_count: usize,
    },
}

impl AuditEvent {
    fn new(request_id: Uuid, dialect: SqlDialect, kind: AuditEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            dialect,
            kind,
        }
    }

    pub fn attempt(request_id: Uuid, dialect: SqlDialect, attempt: u32) -> Self {
        Self::new(request_id, dialect, AuditEventKind::Attempt { attempt })
    }

    pub fn rejected(
        request_id: Uuid,
        dialect: SqlDialect,
        attempt: u32,
        sql: String,
        reason: String,
    ) -> Self {
        Self::new(
            request_id,
            dialect,
            AuditEventKind::Rejected {
                attempt,
                sql,
                reason,
            },
        )
    }

    pub fn accepted(request_id: Uuid, dialect: SqlDialect, attempt: u32, sql: String) -> Self {
        Self::new(request_id, dialect, AuditEventKind::Accepted { attempt, sql })
    }

    pub fn failed(request_id: Uuid, dialect: SqlDialect, reason: String) -> Self {
        Self::new(request_id, dialect, AuditEventKind::Failed { reason })
    }

    pub fn query_executed(
        request_id: Uuid,
        dialect: SqlDialect,
        table: String,
        sql: String,
        row_count: usize,
    ) -> Self {
        Self::new(
            request_id,
            dialect,
            AuditEventKind::QueryExecuted {
                table,
                sql,
                row_count,
            },
        )
    }
}
