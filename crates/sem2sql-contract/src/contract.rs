//! Bounded pre/post contract around the oracle.
//!
//! One invocation walks `Init -> Attempt -> Validate -> (Done | Attempt | Failed)`:
//! the precondition is checked before any oracle call, each rejected candidate
//! appends its failure reason to the next prompt, and the loop stops once the
//! remediation budget is spent. All per-invocation state (dialect, query,
//! notes) lives on the stack of [`GenerationContract::generate`], so one
//! contract can serve concurrent callers.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditEvent, AuditLogWriter},
    models::{GenerationResult, QueryRequest},
    oracle::Oracle,
    prompt,
    rules::{DialectRuleEngine, ValidationFailure},
    ContractConfig, GenerationError,
};

pub struct GenerationContract<O>
where
    O: Oracle,
{
    oracle: Arc<O>,
    rules: Arc<DialectRuleEngine>,
    config: ContractConfig,
    audit: Option<Arc<AuditLogWriter>>,
}

impl<O> Clone for GenerationContract<O>
where
    O: Oracle,
{
    fn clone(&self) -> Self {
        Self {
            oracle: self.oracle.clone(),
            rules: self.rules.clone(),
            config: self.config.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<O> GenerationContract<O>
where
    O: Oracle,
{
    pub fn new(oracle: O, config: ContractConfig) -> Self {
        Self::with_shared_oracle(Arc::new(oracle), config)
    }

    pub fn with_shared_oracle(oracle: Arc<O>, config: ContractConfig) -> Self {
        let audit = if config.audit.enabled {
            match AuditLogWriter::try_new(&config.audit) {
                Ok(writer) => Some(Arc::new(writer)),
                Err(err) => {
                    warn!(error = %err, "failed to initialize generation journal; disabling it");
                    None
                }
            }
        } else {
            None
        };

        Self {
            oracle,
            rules: Arc::new(DialectRuleEngine::new()),
            config,
            audit,
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    pub fn rules(&self) -> &DialectRuleEngine {
        &self.rules
    }

    pub fn oracle(&self) -> &Arc<O> {
        &self.oracle
    }

    /// The natural-language query must contain something besides whitespace.
    pub fn precondition(request: &QueryRequest) -> Result<(), GenerationError> {
        if request.natural_language_query().trim().is_empty() {
            return Err(GenerationError::Precondition(
                "natural language query must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Produces a validated [`GenerationResult`] for `request`.
    #[instrument(skip(self, request), fields(dialect = %request.dialect()))]
    pub async fn generate(&self, request: &QueryRequest) -> Result<GenerationResult, GenerationError> {
        Self::precondition(request)?;
        let request_id = Uuid::new_v4();

        let outcome = match self.config.invocation_timeout {
            Some(limit) => match timeout(limit, self.run(request, request_id)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GenerationError::Timeout(limit)),
            },
            None => self.run(request, request_id).await,
        };

        if let Err(err) = &outcome {
            self.record_audit(AuditEvent::failed(
                request_id,
                request.dialect(),
                err.to_string(),
            ))
            .await;
        }
        outcome
    }

    async fn run(
        &self,
        request: &QueryRequest,
        request_id: Uuid,
    ) -> Result<GenerationResult, GenerationError> {
        let dialect = request.dialect();
        let max_attempts = self.config.max_attempts();
        let mut notes: Vec<String> = Vec::new();
        let mut last_candidate: Option<GenerationResult> = None;

        for attempt in 1..=max_attempts {
            let prompt = prompt::generation_prompt(request, &notes);
            self.record_audit(AuditEvent::attempt(request_id, dialect, attempt))
                .await;

            let candidate = match self.oracle.generate(&prompt).await {
                Ok(Some(candidate)) => candidate.into_result(dialect),
                Ok(None) => {
                    warn!(attempt, "oracle returned no candidate; using fallback statement");
                    GenerationResult::fallback(dialect)
                }
                Err(err) => {
                    warn!(attempt, error = %err, "oracle call failed");
                    return Err(GenerationError::OracleUnavailable(err));
                }
            };

            match self.post(request, &candidate.sql).await {
                Ok(()) => {
                    info!(attempt, "candidate accepted");
                    self.record_audit(AuditEvent::accepted(
                        request_id,
                        dialect,
                        attempt,
                        candidate.sql.clone(),
                    ))
                    .await;
                    return Ok(GenerationResult {
                        dialect_used: dialect,
                        ..candidate
                    });
                }
                Err(failure) => {
                    warn!(attempt, reason = %failure, "candidate rejected");
                    self.record_audit(AuditEvent::rejected(
                        request_id,
                        dialect,
                        attempt,
                        candidate.sql.clone(),
                        failure.to_string(),
                    ))
                    .await;
                    notes.push(format!(
                        "attempt {attempt}: `{}` was rejected because {failure}",
                        candidate.sql
                    ));
                    last_candidate = Some(candidate);
                }
            }
        }

        Err(GenerationError::ValidationExhausted {
            attempts: max_attempts,
            last_candidate: Box::new(
                last_candidate.unwrap_or_else(|| GenerationResult::fallback(dialect)),
            ),
            notes,
        })
    }

    /// Post-condition: structural rules first, then the optional review.
    async fn post(&self, request: &QueryRequest, sql: &str) -> Result<(), ValidationFailure> {
        self.rules.check(sql, request.dialect())?;
        if self.config.deep_check.enabled {
            self.deep_check(request, sql).await?;
        }
        Ok(())
    }

    async fn deep_check(&self, request: &QueryRequest, sql: &str) -> Result<(), ValidationFailure> {
        let settings = &self.config.deep_check;
        let prompt = prompt::deep_check_prompt(request, sql);

        let unavailable = match timeout(settings.timeout, self.oracle.answer(&prompt)).await {
            Ok(Ok(answer)) => {
                let verdict = answer.trim().trim_end_matches('.').to_ascii_uppercase();
                if verdict == "YES" {
                    debug!("dialect review approved candidate");
                    return Ok(());
                }
                return Err(ValidationFailure::DeepCheckRejected {
                    answer: answer.trim().to_string(),
                });
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no answer within {:?}", settings.timeout),
        };

        if settings.fail_open {
            warn!(reason = %unavailable, "dialect review unavailable; accepting candidate (fail-open)");
            Ok(())
        } else {
            warn!(reason = %unavailable, "dialect review unavailable; rejecting candidate");
            Err(ValidationFailure::DeepCheckUnavailable {
                reason: unavailable,
            })
        }
    }

    pub(crate) async fn record_audit(&self, event: AuditEvent) {
        if let Some(writer) = self.audit.clone() {
            if let Err(err) = writer.append(&event).await {
                warn!(
                    request_id = %event.request_id,
                    error = %err,
                    "failed to append generation journal entry"
                );
            }
        }
    }
}
