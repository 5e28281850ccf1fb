//! Query parser
//!
//! `<VERB> <ARGUMENT>`: the verb/argument boundary is the only significant
//! split, so the argument may contain spaces.

use crate::error::{Result, VaultError};

use super::ParsedQuery;

/// Longest accepted query, in characters
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Split a raw query into keyword and argument
///
/// The length bound is checked before anything else. The query is trimmed
/// and split on single spaces; fewer than two tokens is a syntax error.
pub fn parse_query(raw: &str) -> Result<ParsedQuery> {
    if raw.chars().count() > MAX_QUERY_LENGTH {
        return Err(VaultError::QueryTooLong);
    }

    let tokens: Vec<&str> = raw.trim().split(' ').collect();
    if tokens.len() < 2 {
        return Err(VaultError::InvalidSyntax);
    }

    Ok(ParsedQuery {
        keyword: tokens[0].to_uppercase(),
        argument: tokens[1..].join(" "),
    })
}

