//! SQL dialects and their syntax guides.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of supported SQL dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Sqlite = 0,
    Mysql = 1,
    Postgresql = 2,
    #[default]
    Generic = 3,
}

impl SqlDialect {
    pub const ALL: [SqlDialect; 4] = [
        SqlDialect::Sqlite,
        SqlDialect::Mysql,
        SqlDialect::Postgresql,
        SqlDialect::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Postgresql => "postgresql",
            SqlDialect::Generic => "generic",
        }
    }

    /// Upper-case name used in prompts and notes.
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "SQLITE",
            SqlDialect::Mysql => "MYSQL",
            SqlDialect::Postgresql => "POSTGRESQL",
            SqlDialect::Generic => "GENERIC",
        }
    }

    pub fn guide(self) -> &'static DialectGuide {
        &DIALECT_GUIDES[self as usize]
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown SQL dialect '{0}' (expected sqlite, mysql, postgresql or generic)")]
pub struct UnknownDialect(pub String);

impl FromStr for SqlDialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(SqlDialect::Sqlite),
            "mysql" | "mariadb" => Ok(SqlDialect::Mysql),
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::Postgresql),
            "generic" | "ansi" | "" => Ok(SqlDialect::Generic),
            other => Err(UnknownDialect(other.to_owned())),
        }
    }
}

/// Static syntax guidance for one dialect. Rendered into prompts and
/// cross-checked structurally through `forbidden_tokens`.
#[derive(Debug)]
pub struct DialectGuide {
    pub dialect: SqlDialect,
    pub date_arithmetic: Option<&'static str>,
    pub date_formatting: Option<&'static str>,
    pub identity_column: Option<&'static str>,
    pub concatenation: Option<&'static str>,
    pub case_insensitive_match: &'static str,
    pub forbidden_tokens: &'static [&'static str],
}

// Indexed by `SqlDialect as usize`; adding a dialect means adding a row here.
static DIALECT_GUIDES: [DialectGuide; 4] = [
    DialectGuide {
        dialect: SqlDialect::Sqlite,
        date_arithmetic: Some("datetime('now','-n days')"),
        date_formatting: Some("strftime"),
        identity_column: Some("INTEGER PRIMARY KEY AUTOINCREMENT"),
        concatenation: Some("||"),
        case_insensitive_match: "LIKE",
        forbidden_tokens: &["FULL OUTER JOIN", "TOP", "ILIKE", "INTERVAL", "SERIAL"],
    },
    DialectGuide {
        dialect: SqlDialect::Mysql,
        date_arithmetic: Some("INTERVAL n DAY"),
        date_formatting: Some("DATE_FORMAT"),
        identity_column: Some("AUTO_INCREMENT"),
        concatenation: Some("CONCAT()"),
        case_insensitive_match: "LIKE",
        forbidden_tokens: &["TOP", "AUTOINCREMENT"],
    },
    DialectGuide {
        dialect: SqlDialect::Postgresql,
        date_arithmetic: Some("INTERVAL 'n days'"),
        date_formatting: Some("to_char"),
        identity_column: Some("SERIAL / GENERATED ALWAYS AS IDENTITY"),
        concatenation: Some("CONCAT() or ||"),
        case_insensitive_match: "ILIKE",
        forbidden_tokens: &["TOP", "AUTO_INCREMENT"],
    },
    DialectGuide {
        dialect: SqlDialect::Generic,
        date_arithmetic: None,
        date_formatting: None,
        identity_column: None,
        concatenation: None,
        case_insensitive_match: "LIKE",
        forbidden_tokens: &[],
    },
];

impl DialectGuide {
    /// Bullet list of allowed and forbidden constructs.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(6);
        let entries = [
            ("Date arithmetic", self.date_arithmetic),
            ("Date formatting", self.date_formatting),
            ("Identity column", self.identity_column),
            ("String concatenation", self.concatenation),
        ];
        for (label, value) in entries {
            if let Some(value) = value {
                lines.push(format!("- {label}: {value}"));
            }
        }
        lines.push(format!(
            "- Case-insensitive match: {}",
            self.case_insensitive_match
        ));
        if self.forbidden_tokens.is_empty() {
            lines.push("- Use portable ANSI SQL; avoid vendor-specific functions".to_string());
        } else {
            lines.push(format!(
                "- Never use: {}",
                self.forbidden_tokens.join(", ")
            ));
        }
        lines.join("\n")
    }
}
