//! Protocol Module
//!
//! The textual command language carried inside a request body.
//!
//! ## Request
//! ```text
//! { "query": "<VERB> <ARGUMENT>", "apikey": "...", "values": [..], "db": "..." }
//! ```
//!
//! ### Verbs
//! - INSERT   - argument: key,        values: payload
//! - SELECT   - argument: key
//! - UPDATE   - argument: key,        values: replacement payload
//! - DELETE   - argument: key
//! - LIKE     - argument: key prefix, values: [limit]
//! - BACKUP   - argument: ignored
//! - RESTORE  - argument: backup file path
//! - COMPRESS - argument: ignored
//!
//! Verbs are case-insensitive. The argument is everything after the first
//! space and may itself contain spaces.
//!
//! ## Response
//! ```text
//! { "status": "success" | "error", "message": "...", "result": [..] | {..} }
//! ```
//! with an HTTP-style status code (200, 400, 401, 404, 500).

mod command;
mod parser;
mod response;

pub use command::{ParsedQuery, Request, Verb};
pub use parser::{parse_query, MAX_QUERY_LENGTH};
pub use response::{Reply, ResultEnvelope, Status};
