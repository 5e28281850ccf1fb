//! # VaultKV
//!
//! A small network service storing JSON-valued records in named,
//! independently opened embedded key-value databases:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with partial write handling
//! - Degrading open/recovery sequence for damaged database directories
//! - Single-writer/multi-reader transactions per database
//! - Textual command language (`INSERT key`, `LIKE prefix`, ...) over HTTP
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │                  (POST /data, POST /)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │              Parser → Dispatcher                             │
//! │        (auth, database resolution, verb routing)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Registry                                  │
//! │         (name → Database, open/recovery on first use)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one Engine per database
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod logging;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod database;
pub mod protocol;
pub mod dispatcher;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, VaultError};
pub use config::{ConfigHandle, ServerConfig, StoreConfig};
pub use engine::Engine;
pub use database::{Database, Registry};
pub use dispatcher::Dispatcher;
pub use protocol::{Reply, Request, ResultEnvelope};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of VaultKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
