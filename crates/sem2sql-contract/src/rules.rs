//! Structural and dialect-keyword validation of candidate statements.
//!
//! The engine is a pure function of (SQL text, dialect): no I/O and no
//! mutable state, so a single instance can be shared across concurrent
//! contract invocations. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. non-empty after trimming
//! 2. starts with `SELECT` (generated DDL/DML never passes)
//! 3. balanced parentheses, single quotes and double quotes
//! 4. a single statement: no `;` outside literals except a trailing one
//! 5. none of the dialect's forbidden keywords outside literals

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::dialect::SqlDialect;

/// Reason a candidate was rejected. The `Display` text is fed back to the
/// oracle as remediation context.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("the statement is empty")]
    Empty,
    #[error("the statement must be a single SELECT query")]
    NotSelect,
    #[error("unbalanced parentheses ({open} opening vs {close} closing)")]
    UnbalancedParentheses { open: usize, close: usize },
    #[error("unbalanced single quotes")]
    UnbalancedSingleQuotes,
    #[error("unbalanced double quotes")]
    UnbalancedDoubleQuotes,
    #[error("only one statement is allowed; remove everything after the first ';'")]
    MultipleStatements,
    #[error("{token} is not valid {dialect} syntax")]
    ForbiddenToken {
        token: &'static str,
        dialect: SqlDialect,
    },
    #[error("the dialect review answered '{answer}' instead of YES")]
    DeepCheckRejected { answer: String },
    #[error("the dialect review could not run: {reason}")]
    DeepCheckUnavailable { reason: String },
}

#[derive(Debug)]
struct ForbiddenRule {
    token: &'static str,
    pattern: Regex,
}

/// Compiled per-dialect rule sets.
#[derive(Debug)]
pub struct DialectRuleEngine {
    // Indexed by `SqlDialect as usize`, mirroring the guide table.
    forbidden: Vec<Vec<ForbiddenRule>>,
}

impl Default for DialectRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectRuleEngine {
    pub fn new() -> Self {
        let forbidden = SqlDialect::ALL
            .iter()
            .map(|dialect| {
                dialect
                    .guide()
                    .forbidden_tokens
                    .iter()
                    .map(|&token| ForbiddenRule {
                        token,
                        pattern: keyword_pattern(token),
                    })
                    .collect()
            })
            .collect();
        Self { forbidden }
    }

    /// Full pipeline; `Ok(())` means the candidate is acceptable for `dialect`.
    pub fn check(&self, sql: &str, dialect: SqlDialect) -> Result<(), ValidationFailure> {
        let searchable = check_structure(sql)?;

        if let Some(rule) = self.forbidden[dialect as usize]
            .iter()
            .find(|rule| rule.pattern.is_match(&searchable))
        {
            return Err(ValidationFailure::ForbiddenToken {
                token: rule.token,
                dialect,
            });
        }
        Ok(())
    }

    pub fn validate(&self, sql: &str, dialect: SqlDialect) -> bool {
        self.check(sql, dialect).is_ok()
    }
}

/// Dialect-independent checks (steps 1 to 4). Returns the statement with
/// quoted contents blanked, ready for the keyword scan.
pub fn check_structure(sql: &str) -> Result<String, ValidationFailure> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(ValidationFailure::Empty);
    }

    let starts_with_select = trimmed
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("SELECT"))
        .unwrap_or(false);
    if !starts_with_select {
        return Err(ValidationFailure::NotSelect);
    }

    let open = trimmed.matches('(').count();
    let close = trimmed.matches(')').count();
    if open != close {
        return Err(ValidationFailure::UnbalancedParentheses { open, close });
    }
    if trimmed.matches('\'').count() % 2 != 0 {
        return Err(ValidationFailure::UnbalancedSingleQuotes);
    }
    if trimmed.matches('"').count() % 2 != 0 {
        return Err(ValidationFailure::UnbalancedDoubleQuotes);
    }

    let masked = mask_quoted(trimmed);
    if let Some(semicolon) = masked.find(';') {
        if !masked[semicolon + 1..].trim().is_empty() {
            return Err(ValidationFailure::MultipleStatements);
        }
    }
    Ok(masked)
}

// Whole-keyword match: `TOP` must not fire on `stop_date`, and multi-word
// tokens tolerate any run of whitespace between words.
fn keyword_pattern(token: &str) -> Regex {
    let words: Vec<String> = token.split_whitespace().map(regex::escape).collect();
    let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
    Regex::new(&pattern).expect("forbidden-token patterns are escaped literals")
}

// Blanks out the contents of string literals and quoted identifiers so data
// such as `'top sellers'` is not mistaken for syntax.
fn mask_quoted(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut closing: Option<char> = None;
    for ch in sql.chars() {
        match closing {
            Some(close) if ch == close => {
                closing = None;
                out.push(ch);
            }
            Some(_) => out.push(' '),
            None => {
                if matches!(ch, '\'' | '"' | '`') {
                    closing = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}
