//! Response definitions
//!
//! Represents the uniform result envelope sent to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VaultError;

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Body of every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,
    pub message: String,
    /// Sequence or mapping; an empty sequence when there is nothing to return
    pub result: Value,
}

/// An envelope paired with its status code
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub envelope: ResultEnvelope,
}

impl Reply {
    /// 200 with a result
    pub fn success(message: impl Into<String>, result: Value) -> Self {
        Self {
            code: 200,
            envelope: ResultEnvelope {
                status: Status::Success,
                message: message.into(),
                result,
            },
        }
    }

    /// 200 with an empty result
    pub fn ok() -> Self {
        Self::success("ok", empty_result())
    }

    /// Error envelope carrying the error's status code
    pub fn error(err: &VaultError) -> Self {
        Self::failure(err.status_code(), err.to_string())
    }

    /// Error envelope with an explicit code
    pub fn failure(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            envelope: ResultEnvelope {
                status: Status::Error,
                message: message.into(),
                result: empty_result(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.envelope.status == Status::Success
    }
}

fn empty_result() -> Value {
    Value::Array(Vec::new())
}
