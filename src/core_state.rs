//! Shared engine state.
//!
//! `CoreState` is created once at startup and shared behind an `Arc` by
//! whatever transport drives the engine. It owns no connection: every
//! request opens its own scoped connection with `open_db()` and drops it
//! when done, so concurrent requests never share a transaction.
//! Authorization is not stored here; callers pass an `AuthContext` into
//! each command.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::db;
use crate::procedures::{LedgerProcedures, SqliteProcedures};
use crate::unit_of_work::RetryPolicy;

pub struct CoreState {
    pub config: EngineConfig,
    procedures: Arc<dyn LedgerProcedures>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl CoreState {
    /// SQLite-backed procedures and the wall clock.
    pub fn new(config: EngineConfig) -> Self {
        let procedures = Arc::new(SqliteProcedures::new(&config));
        Self::with_parts(config, procedures, Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: EngineConfig,
        procedures: Arc<dyn LedgerProcedures>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            config,
            procedures,
            clock,
            retry,
        }
    }

    /// Open a connection for one request. Migrations run on open.
    pub fn open_db(&self) -> Result<Connection, db::DatabaseError> {
        db::open_database(&self.config.database_path, &self.config)
    }

    pub fn procedures(&self) -> &dyn LedgerProcedures {
        self.procedures.as_ref()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}
