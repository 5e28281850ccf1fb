//! Command Dispatcher
//!
//! Executes one request end to end and always produces a [`Reply`]:
//!
//! 1. Parse the query (length bound first, then syntax)
//! 2. Check the shared secret against the current config snapshot
//! 3. Require a database name and a known verb
//! 4. Resolve the database through the registry (may run open/recovery)
//! 5. Route the verb to the database operation
//!
//! Errors never escape: each one is turned into an error envelope whose
//! code comes from [`VaultError::kind`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::ConfigHandle;
use crate::database::{backup_file_name, validate_name, Database, Registry};
use crate::error::{ErrorKind, Result, VaultError};
use crate::protocol::{parse_query, Reply, Request, Verb};

/// Routes requests to databases
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    config: Arc<ConfigHandle>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: Arc<ConfigHandle>) -> Self {
        Self { registry, config }
    }

    /// Execute a request, mapping any failure to an error envelope
    pub fn execute(&self, request: &Request) -> Reply {
        match self.try_execute(request) {
            Ok(reply) => reply,
            Err(e) => {
                match e.kind() {
                    ErrorKind::Storage | ErrorKind::Decode => {
                        tracing::warn!("Command {:?} on {:?} failed: {}", request.query, request.db, e)
                    }
                    _ => tracing::debug!("Command {:?} on {:?} rejected: {}", request.query, request.db, e),
                }
                Reply::error(&e)
            }
        }
    }

    fn try_execute(&self, request: &Request) -> Result<Reply> {
        let parsed = parse_query(&request.query)?;

        let config = self.config.snapshot();
        if !constant_time_compare(&request.apikey, &config.apikey) {
            return Err(VaultError::InvalidApiKey);
        }

        validate_name(&request.db)?;
        let verb = parsed.verb()?;

        let db = self.registry.get_or_create(&request.db)?;
        tracing::debug!("Executing {} {:?} on {}", verb, parsed.argument, db.name());

        let key = parsed.argument.as_str();
        match verb {
            Verb::Insert => {
                db.insert(key, &request.values)?;
                Ok(Reply::ok())
            }
            Verb::Select => {
                let values = db.get(key)?;
                Ok(Reply::success("ok", Value::Array(values)))
            }
            Verb::Update => {
                db.update(key, &request.values)?;
                Ok(Reply::ok())
            }
            Verb::Delete => {
                db.delete(key)?;
                Ok(Reply::ok())
            }
            Verb::Like => {
                let limit = parse_limit(&request.values)?;
                let result: Map<String, Value> = db
                    .prefix_query(key, limit)?
                    .into_iter()
                    .map(|(k, values)| (k, Value::Array(values)))
                    .collect();
                Ok(Reply::success("ok", Value::Object(result)))
            }
            Verb::Backup => {
                let relative = self.backup(&db, &config.datadir)?;
                Ok(Reply::success(
                    format!("backup created: {}", relative.display()),
                    Value::Array(Vec::new()),
                ))
            }
            Verb::Restore => {
                let source = resolve_backup_path(&config.datadir, key)?;
                let loaded = db.restore_from(&source)?;
                tracing::info!("Restored {} entries into {} from {}", loaded, db.name(), source.display());
                Ok(Reply::success("database restored", Value::Array(Vec::new())))
            }
            Verb::Compress => {
                let stats = db.compress()?;
                tracing::info!(
                    "Compress on {}: rewritten={}, {} -> {} bytes",
                    db.name(),
                    stats.rewritten,
                    stats.bytes_before,
                    stats.bytes_after
                );
                Ok(Reply::ok())
            }
        }
    }

    /// Write a timestamped backup, returning its path relative to `datadir`
    fn backup(&self, db: &Database, datadir: &Path) -> Result<PathBuf> {
        let relative = Path::new("backups").join(backup_file_name(db.name(), &chrono::Local::now()));
        let summary = db.backup_to(&datadir.join(&relative))?;
        tracing::info!(
            "Backed up {} entries of {} to {}",
            summary.entries,
            db.name(),
            relative.display()
        );
        Ok(relative)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }
}

/// LIKE limit: the first auxiliary value, a non-negative number
///
/// Fractional numbers are truncated.
pub fn parse_limit(values: &[Value]) -> Result<usize> {
    let first = values.first().ok_or(VaultError::InvalidLimit)?;
    if let Some(n) = first.as_u64() {
        return Ok(usize::try_from(n).unwrap_or(usize::MAX));
    }
    match first.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f.trunc() as usize),
        _ => Err(VaultError::InvalidLimit),
    }
}

/// Resolve a RESTORE argument against `datadir`
///
/// Only plain relative paths are accepted: no root, no drive prefix, no `..`.
pub fn resolve_backup_path(datadir: &Path, argument: &str) -> Result<PathBuf> {
    let argument = argument.trim();
    if argument.is_empty() {
        return Err(VaultError::InvalidBackupPath(argument.to_string()));
    }

    let relative = Path::new(argument);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(VaultError::InvalidBackupPath(argument.to_string()));
    }

    Ok(datadir.join(relative))
}

/// Constant-time string comparison
///
/// Both inputs are padded to the same length with different fill bytes so
/// the comparison cost does not depend on where they differ.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
