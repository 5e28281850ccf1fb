//! Network Module
//!
//! HTTP transport in front of the dispatcher.
//!
//! ## Routes
//! - `POST /data` - command endpoint, JSON request in, result envelope out
//! - `POST /`     - health check, answers `ok`
//!
//! ## Architecture
//! - axum router on the tokio runtime
//! - Commands run on the blocking pool (storage calls block on disk I/O)
//! - Graceful shutdown closes every open database

mod router;
mod server;

pub use router::{build_router, cors_layer};
pub use server::Server;
