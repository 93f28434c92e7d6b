//! Unit of work: an ordered list of dependent writes committed or rolled
//! back as one.
//!
//! Steps share a caller-defined context `C`, so an identifier generated by
//! one step is visible to the next. The whole unit runs in a single
//! `BEGIN IMMEDIATE` transaction: the write lock is taken up front, so the
//! binding availability read and the write it gates see the same state.
//! The first failing step aborts the unit, every earlier step is rolled
//! back, and the step's error is returned unchanged.
//!
//! Steps are `FnOnce` and a unit runs at most once. Retrying means building
//! and executing a fresh unit (`RetryPolicy::run`), never resuming one.

use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RetrySettings;
use crate::db::repository::{get_stored_response, insert_stored_response};
use crate::error::EngineError;

type Step<'a, C> = Box<dyn FnOnce(&Transaction<'_>, &mut C) -> Result<(), EngineError> + 'a>;

pub struct UnitOfWork<'a, C> {
    name: &'static str,
    steps: Vec<(&'static str, Step<'a, C>)>,
}

impl<'a, C> UnitOfWork<'a, C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step. Steps run in insertion order.
    pub fn step<F>(mut self, label: &'static str, f: F) -> Self
    where
        F: FnOnce(&Transaction<'_>, &mut C) -> Result<(), EngineError> + 'a,
    {
        self.steps.push((label, Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step and commit, or roll back on the first failure.
    pub fn execute(self, conn: &mut Connection, ctx: C) -> Result<C, EngineError> {
        let name = self.name;
        let tx = begin(conn)?;
        // Dropping `tx` on any early return rolls it back.
        let ctx = self.run_steps(&tx, ctx)?;
        tx.commit()?;
        tracing::debug!(unit = name, "Unit of work committed");
        Ok(ctx)
    }

    /// Like `execute`, but a request carrying an idempotency key is
    /// answered from the stored response when the key was already used.
    /// The response is recorded inside the unit's own transaction.
    pub fn execute_keyed<T, R>(
        self,
        conn: &mut Connection,
        ctx: C,
        key: Option<&str>,
        now: NaiveDateTime,
        respond: R,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        R: FnOnce(C) -> T,
    {
        let Some(key) = key else {
            return self.execute(conn, ctx).map(respond);
        };

        let name = self.name;
        let tx = begin(conn)?;
        if let Some(stored) = get_stored_response(&tx, key)? {
            if stored.operation != name {
                return Err(EngineError::ValidationRejected(format!(
                    "Idempotency key was already used for {}",
                    stored.operation
                )));
            }
            tracing::info!(unit = name, key, "Replaying stored response for idempotency key");
            return Ok(serde_json::from_str(&stored.response)?);
        }

        let ctx = self.run_steps(&tx, ctx)?;
        let response = respond(ctx);
        insert_stored_response(&tx, key, name, &serde_json::to_string(&response)?, now)?;
        tx.commit()?;
        tracing::debug!(unit = name, key, "Unit of work committed");
        Ok(response)
    }

    fn run_steps(self, tx: &Transaction<'_>, mut ctx: C) -> Result<C, EngineError> {
        let name = self.name;
        let total = self.steps.len();
        tracing::debug!(unit = name, steps = total, "Unit of work begin");

        for (index, (label, step)) in self.steps.into_iter().enumerate() {
            if let Err(err) = step(tx, &mut ctx) {
                tracing::warn!(
                    unit = name,
                    step = label,
                    position = index + 1,
                    total,
                    code = err.code(),
                    error = %err,
                    "Unit of work rolled back"
                );
                return Err(err);
            }
        }
        Ok(ctx)
    }
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>, EngineError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

// ═══════════════════════════════════════════════════════════
// Bounded retry
// ═══════════════════════════════════════════════════════════

/// Jittered exponential backoff for whole units that failed with a
/// transient store error. Any other error is returned on first sight.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1, 1, 1, 0.0)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jittered = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. `op` receives the zero-based attempt.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut(usize) -> Result<T, EngineError>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying unit"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.base_delay_ms,
            settings.max_delay_ms,
            settings.jitter_pct,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}
