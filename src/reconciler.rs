//! Lab test lifecycle reconciliation.
//!
//! There is no background ticker. Elapsed `SCHEDULED` orders are completed
//! on read, each time the pending-test listing is requested, and a manual
//! result may only be recorded once the test window has ended.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::db::repository::{
    complete_elapsed_test_orders, get_test_order, list_test_orders as query_test_orders,
    record_test_result, TestOrderListing,
};
use crate::error::EngineError;
use crate::models::enums::TestStatus;
use crate::models::LabTestOrder;
use crate::unit_of_work::UnitOfWork;

/// Complete every elapsed `SCHEDULED` order. Running it again at the same
/// instant completes nothing.
pub fn reconcile_elapsed_tests(conn: &Connection, now: NaiveDateTime) -> Result<usize, EngineError> {
    let completed = complete_elapsed_test_orders(conn, now)?;
    if completed > 0 {
        tracing::info!(completed, "Auto-completed elapsed lab tests");
    }
    Ok(completed)
}

/// Reconcile, then list the most recent orders. A failed reconciliation is
/// logged and the listing is still served.
pub fn list_test_orders(
    conn: &Connection,
    now: NaiveDateTime,
    limit: u32,
) -> Result<Vec<TestOrderListing>, EngineError> {
    if let Err(err) = reconcile_elapsed_tests(conn, now) {
        tracing::warn!(error = %err, "Lab test reconciliation failed");
    }
    Ok(query_test_orders(conn, limit)?)
}

/// Record a manual result. Refused with `TemporalGuardViolation` while the
/// test window is still running.
pub fn finalize_test_result(
    conn: &mut Connection,
    ctx: &AuthContext,
    order_id: &Uuid,
    result: &str,
    now: NaiveDateTime,
) -> Result<LabTestOrder, EngineError> {
    authorize(ctx, Operation::FinalizeLabResult)?;
    let result = result.trim();
    if result.is_empty() {
        return Err(EngineError::ValidationRejected("Result summary is required".into()));
    }

    let order = UnitOfWork::new("finalize_test_result")
        .step("record result", |tx, finalized: &mut Option<LabTestOrder>| {
            let order = get_test_order(tx, order_id)?
                .ok_or_else(|| EngineError::not_found("test order", order_id))?;
            let end = match (order.status, order.scheduled_end_at) {
                (TestStatus::Scheduled | TestStatus::Completed, Some(end)) => end,
                _ => {
                    return Err(EngineError::ValidationRejected(
                        "Test must be scheduled before a result can be recorded".into(),
                    ))
                }
            };
            if now < end {
                return Err(EngineError::TemporalGuardViolation {
                    remaining_secs: (end - now).num_seconds(),
                });
            }
            if record_test_result(tx, order_id, result, now)? == 0 {
                return Err(EngineError::ValidationRejected(
                    "Test must be scheduled before a result can be recorded".into(),
                ));
            }
            *finalized = get_test_order(tx, order_id)?;
            Ok(())
        })
        .execute(conn, None)?
        .ok_or_else(|| EngineError::not_found("test order", order_id))?;

    tracing::info!(order_id = %order_id, "Lab test result recorded");
    Ok(order)
}
