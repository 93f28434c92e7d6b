//! Finance and ledger-health commands. All of them authorize `ViewFinance`,
//! which patients are refused.

use chrono::NaiveDate;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::core_state::CoreState;
use crate::db::repository::{check_consistency, ConsistencyReport};
use crate::finance;
use crate::models::{DashboardStats, RevenueReport, RollupDrift, RollupEntry};

use super::{read, write, CommandResponse};

pub fn revenue_report(
    state: &CoreState,
    ctx: &AuthContext,
    start: NaiveDate,
    end: NaiveDate,
) -> CommandResponse<RevenueReport> {
    read(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        finance::revenue_between(conn, start, end)
    })
    .into()
}

pub fn dashboard_stats(state: &CoreState, ctx: &AuthContext) -> CommandResponse<DashboardStats> {
    read(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        finance::dashboard_stats(conn, state.now())
    })
    .into()
}

pub fn rollup_snapshot(state: &CoreState, ctx: &AuthContext) -> CommandResponse<Vec<RollupEntry>> {
    read(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        finance::rollup_snapshot(conn)
    })
    .into()
}

pub fn verify_rollups(state: &CoreState, ctx: &AuthContext) -> CommandResponse<Vec<RollupDrift>> {
    read(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        finance::verify_rollups(conn)
    })
    .into()
}

/// Rebuild the rollup snapshot from payment history. Returns buckets written.
pub fn recompute_rollups(state: &CoreState, ctx: &AuthContext) -> CommandResponse<usize> {
    write(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        finance::recompute_rollups(conn, state.now())
    })
    .into()
}

pub fn consistency_report(
    state: &CoreState,
    ctx: &AuthContext,
) -> CommandResponse<ConsistencyReport> {
    read(state, |conn| {
        authorize(ctx, Operation::ViewFinance)?;
        Ok(check_consistency(conn)?)
    })
    .into()
}
