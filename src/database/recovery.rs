//! Open/recovery strategy
//!
//! Opens a database directory through an ordered list of increasingly
//! permissive configurations. The first attempt that opens wins; if all of
//! them fail the directory is moved aside and a fresh store is created.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{StoreConfig, WalSyncStrategy};
use crate::engine::Engine;
use crate::error::{Result, VaultError};

/// Memtable size used by the normal attempts (16 MB)
const NORMAL_MEMTABLE_SIZE: usize = 16 * 1024 * 1024;

/// Memtable size used by the minimal attempt (1 MB)
const MINIMAL_MEMTABLE_SIZE: usize = 1024 * 1024;

/// One step of the recovery sequence, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAttempt {
    /// Durable writes, moderate memtable, no compaction on close
    Normal,
    /// As `Normal`, taking over a stale lock file
    BypassLockGuard,
    /// No lock, no writes; salvage access only
    ReadOnly,
    /// Small memtable, no fsync on the write path, lock bypass
    ///
    /// Neither option changes whether the directory opens, so this step only
    /// succeeds where `BypassLockGuard` already did. It stays in the sequence
    /// to keep the documented state order.
    Minimal,
    /// Directory renamed aside, fresh empty store at the original path
    Quarantine,
}

impl OpenAttempt {
    /// Every attempt, in order
    pub const SEQUENCE: [OpenAttempt; 5] = [
        OpenAttempt::Normal,
        OpenAttempt::BypassLockGuard,
        OpenAttempt::ReadOnly,
        OpenAttempt::Minimal,
        OpenAttempt::Quarantine,
    ];

    /// Engine config for this attempt, derived from `path`
    pub fn store_config(self, path: &Path) -> StoreConfig {
        let builder = StoreConfig::builder()
            .data_dir(path)
            .wal_sync_strategy(WalSyncStrategy::EveryWrite)
            .memtable_size_limit(NORMAL_MEMTABLE_SIZE)
            .compact_on_close(false);

        let builder = match self {
            OpenAttempt::Normal | OpenAttempt::Quarantine => builder,
            OpenAttempt::BypassLockGuard => builder.bypass_lock_guard(true),
            OpenAttempt::ReadOnly => builder.bypass_lock_guard(true).read_only(true),
            OpenAttempt::Minimal => builder
                .memtable_size_limit(MINIMAL_MEMTABLE_SIZE)
                .wal_sync_strategy(WalSyncStrategy::Never)
                .bypass_lock_guard(true),
        };
        builder.build()
    }
}

impl fmt::Display for OpenAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenAttempt::Normal => "normal",
            OpenAttempt::BypassLockGuard => "bypass-lock-guard",
            OpenAttempt::ReadOnly => "read-only",
            OpenAttempt::Minimal => "minimal",
            OpenAttempt::Quarantine => "quarantine",
        };
        f.write_str(name)
    }
}

/// Open `path`, degrading through [`OpenAttempt::SEQUENCE`]
///
/// Returns the engine and the attempt that produced it. Fails with
/// [`VaultError::Unrecoverable`] wrapping the last cause only if the
/// quarantine step cannot rename or reopen.
pub fn open_with_recovery(path: &Path) -> Result<(Engine, OpenAttempt)> {
    let mut last_error = None;

    for attempt in OpenAttempt::SEQUENCE {
        let result = match attempt {
            OpenAttempt::Quarantine => quarantine_and_recreate(path),
            _ => Engine::open(attempt.store_config(path)),
        };

        match result {
            Ok(engine) => {
                if attempt != OpenAttempt::Normal {
                    tracing::warn!("Opened {} using the {} attempt", path.display(), attempt);
                }
                return Ok((engine, attempt));
            }
            Err(e) => {
                tracing::warn!("Open attempt {} failed for {}: {}", attempt, path.display(), e);
                last_error = Some(e);
            }
        }
    }

    let source = last_error.unwrap_or_else(|| VaultError::Storage("no open attempt ran".to_string()));
    Err(VaultError::Unrecoverable {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// Where an unopenable directory is moved: `<path>_backup_<unix seconds>`
pub fn quarantine_path(path: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("_backup_{}", secs));
    PathBuf::from(name)
}

fn quarantine_and_recreate(path: &Path) -> Result<Engine> {
    let target = quarantine_path(path);
    fs::rename(path, &target)?;
    tracing::warn!("Moved unopenable database {} to {}", path.display(), target.display());

    let engine = Engine::open(OpenAttempt::Quarantine.store_config(path))?;
    tracing::warn!("Created empty database at {}", path.display());
    Ok(engine)
}
