//! Lab test commands.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::authorization::AuthContext;
use crate::booking::{self, LabTestReceipt, LabTestRequest, ScheduledTest};
use crate::core_state::CoreState;
use crate::db::repository::TestOrderListing;
use crate::models::LabTestOrder;
use crate::reconciler;

use super::{read, write, CommandResponse};

pub fn order_lab_test(
    state: &CoreState,
    ctx: &AuthContext,
    request: LabTestRequest,
) -> CommandResponse<LabTestReceipt> {
    write(state, |conn| booking::order_lab_test(conn, ctx, &request, state.now())).into()
}

pub fn schedule_lab_test(
    state: &CoreState,
    ctx: &AuthContext,
    order_id: Uuid,
    start: NaiveDateTime,
) -> CommandResponse<ScheduledTest> {
    write(state, |conn| booking::schedule_lab_test(conn, ctx, &order_id, start)).into()
}

/// Recent orders, with elapsed tests completed first.
pub fn list_test_orders(state: &CoreState) -> CommandResponse<Vec<TestOrderListing>> {
    let limit = state.config.pending_tests_limit;
    read(state, |conn| reconciler::list_test_orders(conn, state.now(), limit)).into()
}

pub fn finalize_test_result(
    state: &CoreState,
    ctx: &AuthContext,
    order_id: Uuid,
    result: String,
) -> CommandResponse<LabTestOrder> {
    write(state, |conn| {
        reconciler::finalize_test_result(conn, ctx, &order_id, &result, state.now())
    })
    .into()
}
