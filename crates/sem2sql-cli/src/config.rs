use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use sem2sql_contract::{AuditConfig, ContractConfig};

pub const DEFAULT_ORACLE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: Option<PathBuf>,
    pub oracle: OracleSettings,
    pub contract: ContractConfig,
    pub row_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let db_path = value("SEM2SQL_DB_PATH").map(PathBuf::from);

        let oracle = OracleSettings {
            base_url: value("SEM2SQL_ORACLE_URL")
                .unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: value("SEM2SQL_ORACLE_API_KEY").or_else(|| value("OPENAI_API_KEY")),
            model: value("SEM2SQL_ORACLE_MODEL").unwrap_or_else(|| DEFAULT_ORACLE_MODEL.to_string()),
        };

        let mut contract = ContractConfig::default();
        if let Some(max) = parse_number::<u32>(&value, "SEM2SQL_MAX_REMEDIATIONS")? {
            contract.max_remediations = max;
        }
        if let Some(seconds) = parse_number::<u64>(&value, "SEM2SQL_TIMEOUT_SECONDS")? {
            contract.invocation_timeout = timeout_from_seconds(seconds);
        }
        if let Some(enabled) = bool_value(&value, "SEM2SQL_DEEP_CHECK") {
            contract.deep_check.enabled = enabled;
        }
        if let Some(fail_open) = bool_value(&value, "SEM2SQL_DEEP_CHECK_FAIL_OPEN") {
            contract.deep_check.fail_open = fail_open;
        }
        if let Some(seconds) = parse_number::<u64>(&value, "SEM2SQL_DEEP_CHECK_TIMEOUT_SECONDS")? {
            if seconds == 0 {
                return Err(anyhow!("SEM2SQL_DEEP_CHECK_TIMEOUT_SECONDS must be positive"));
            }
            contract.deep_check.timeout = Duration::from_secs(seconds);
        }

        contract.audit = match value("SEM2SQL_AUDIT_LOG") {
            Some(path) => AuditConfig {
                enabled: true,
                log_path: PathBuf::from(path),
                hmac_key: None,
            },
            None => AuditConfig::default(),
        };
        if let Some(key) = value("SEM2SQL_AUDIT_HMAC_KEY") {
            contract.audit.hmac_key = Some(
                STANDARD
                    .decode(key)
                    .context("invalid base64 in SEM2SQL_AUDIT_HMAC_KEY")?,
            );
        }

        let row_limit =
            parse_number::<usize>(&value, "SEM2SQL_ROW_LIMIT")?.unwrap_or(DEFAULT_ROW_LIMIT);

        Ok(Self {
            db_path,
            oracle,
            contract,
            row_limit,
        })
    }
}

/// Zero disables the invocation deadline.
pub fn timeout_from_seconds(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

fn parse_number<T>(value: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid {key}: '{raw}'"))
        })
        .transpose()
}

fn bool_value(value: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    value(key).and_then(|raw| match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}
