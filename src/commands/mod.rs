//! Uniform command surface.
//!
//! Every command returns a `CommandResponse`, so no engine error crosses
//! the boundary as a panic or a bare string. Write commands open a fresh
//! connection per attempt and run under the engine's `RetryPolicy`; only
//! transient store failures are retried.

pub mod billing;
pub mod booking;
pub mod finance;
pub mod lab;
pub mod pharmacy;
pub mod session;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::core_state::CoreState;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Stable machine code on failure, e.g. `CAPACITY_EXHAUSTED`.
    pub code: Option<String>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn failed(err: &EngineError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
        }
    }
}

impl<T> From<Result<T, EngineError>> for CommandResponse<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => {
                match &err {
                    EngineError::Internal(_) | EngineError::TransientStoreFailure(_) => {
                        tracing::error!(code = err.code(), error = %err, "Command failed")
                    }
                    _ => tracing::debug!(code = err.code(), error = %err, "Command refused"),
                }
                Self::failed(&err)
            }
        }
    }
}

/// Verifies the engine can reach its store.
pub fn health_check(state: &CoreState) -> CommandResponse<String> {
    read(state, |_| Ok("ok".to_string())).into()
}

/// Run a write workflow under the retry policy, on a fresh connection per
/// attempt.
pub(crate) fn write<T, F>(state: &CoreState, mut op: F) -> Result<T, EngineError>
where
    F: FnMut(&mut Connection) -> Result<T, EngineError>,
{
    state.retry().run(|_attempt| {
        let mut conn = state.open_db()?;
        op(&mut conn)
    })
}

/// Run a read on a scoped connection.
pub(crate) fn read<T, F>(state: &CoreState, op: F) -> Result<T, EngineError>
where
    F: FnOnce(&Connection) -> Result<T, EngineError>,
{
    let conn = state.open_db()?;
    op(&conn)
}
