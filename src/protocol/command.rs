//! Command definitions
//!
//! Represents requests from clients and the parsed form of their query.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VaultError;

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Insert,
    Select,
    Update,
    Delete,
    Like,
    Backup,
    Restore,
    Compress,
}

impl Verb {
    /// Every verb, in table order
    pub const ALL: [Verb; 8] = [
        Verb::Insert,
        Verb::Select,
        Verb::Update,
        Verb::Delete,
        Verb::Like,
        Verb::Backup,
        Verb::Restore,
        Verb::Compress,
    ];

    /// Upper-case keyword
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Insert => "INSERT",
            Verb::Select => "SELECT",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
            Verb::Like => "LIKE",
            Verb::Backup => "BACKUP",
            Verb::Restore => "RESTORE",
            Verb::Compress => "COMPRESS",
        }
    }

    /// Whether the verb changes stored data
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Verb::Insert | Verb::Update | Verb::Delete | Verb::Restore | Verb::Compress
        )
    }
}

impl FromStr for Verb {
    type Err = VaultError;

    /// Case-insensitive; anything outside the verb table is a syntax error
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == upper)
            .ok_or(VaultError::InvalidSyntax)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query split into its verb keyword and argument
///
/// The keyword is kept as text (upper-cased) so an unknown verb is only
/// rejected at dispatch, after the secret has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Upper-cased first token
    pub keyword: String,
    /// Remaining tokens joined with single spaces
    pub argument: String,
}

impl ParsedQuery {
    /// Resolve the keyword against the verb table
    pub fn verb(&self) -> Result<Verb, VaultError> {
        self.keyword.parse()
    }
}

/// A decoded request body
///
/// Every field defaults when absent, so a partial body still reaches the
/// validation rules of the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub query: String,
    pub apikey: String,
    pub values: Vec<Value>,
    pub db: String,
}

impl Request {
    pub fn new(query: impl Into<String>, apikey: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            apikey: apikey.into(),
            values: Vec::new(),
            db: db.into(),
        }
    }

    /// Attach auxiliary values
    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }
}
