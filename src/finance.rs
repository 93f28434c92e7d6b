//! Financial reporting: revenue attribution over paid invoices, the
//! denormalized period rollups, and the dashboard counters.
//!
//! Rollups are a cache. Payment history is the source of truth, and
//! `verify_rollups` / `recompute_rollups` compare against or rebuild from it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::repository::{
    clear_rollups, count_active_admissions, count_appointments_on_day, count_doctors,
    count_patients, increment_rollup, list_applied_payments, list_rollups, paid_revenue_by_source,
    sum_expenses_between, sum_unpaid_totals,
};
use crate::error::EngineError;
use crate::models::enums::ExpenseCategory;
use crate::models::{
    period_label, rollups_from_payments, DashboardStats, Money, RevenueReport, RevenueSource,
    RollupDrift, RollupEntry, SourceRevenue, ROLLUP_PERIODS,
};
use crate::unit_of_work::UnitOfWork;

/// Add an applied payment to its yearly, monthly and weekly buckets.
pub fn record_payment_rollup(
    conn: &Connection,
    amount: Money,
    paid_at: NaiveDateTime,
) -> Result<(), EngineError> {
    for period in ROLLUP_PERIODS {
        increment_rollup(conn, period, &period_label(period, paid_at), amount, paid_at)?;
    }
    Ok(())
}

/// Revenue from invoices paid from `start` 00:00:00 up to midnight after
/// `end`, net of pharmacy restock expenses in the same window.
pub fn revenue_between(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RevenueReport, EngineError> {
    if start > end {
        return Err(EngineError::ValidationRejected(
            "Start date must not be after end date".into(),
        ));
    }
    let window_start = start.and_time(NaiveTime::MIN);
    let window_end = end
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN))
        .unwrap_or(NaiveDateTime::MAX);

    let mut by_source: Vec<SourceRevenue> = paid_revenue_by_source(conn, window_start, window_end)?
        .into_iter()
        .map(|(source, amount)| SourceRevenue {
            label: source.label(),
            source,
            amount,
        })
        .collect();

    let restock = sum_expenses_between(
        conn,
        ExpenseCategory::PharmacyRestock,
        window_start,
        window_end,
    )?;
    if !restock.is_zero() {
        by_source.push(SourceRevenue {
            source: RevenueSource::PharmacyRestock,
            label: RevenueSource::PharmacyRestock.label(),
            amount: -restock,
        });
    }

    let total = by_source.iter().map(|line| line.amount).sum();
    tracing::debug!(%start, %end, lines = by_source.len(), total = %total, "Revenue report built");
    Ok(RevenueReport {
        start,
        end,
        total,
        by_source,
    })
}

pub fn rollup_snapshot(conn: &Connection) -> Result<Vec<RollupEntry>, EngineError> {
    Ok(list_rollups(conn)?)
}

/// Buckets whose stored total disagrees with payment history. A bucket
/// missing on either side counts as zero there.
pub fn verify_rollups(conn: &Connection) -> Result<Vec<RollupDrift>, EngineError> {
    let mut expected = rollups_from_payments(&list_applied_payments(conn)?);
    let mut drift = Vec::new();

    for entry in list_rollups(conn)? {
        let recomputed = expected
            .remove(&(entry.period, entry.label.clone()))
            .unwrap_or(Money::ZERO);
        if recomputed != entry.total_revenue {
            drift.push(RollupDrift {
                period: entry.period,
                label: entry.label,
                stored: entry.total_revenue,
                recomputed,
            });
        }
    }
    drift.extend(
        expected
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|((period, label), recomputed)| RollupDrift {
                period,
                label,
                stored: Money::ZERO,
                recomputed,
            }),
    );

    if !drift.is_empty() {
        tracing::warn!(buckets = drift.len(), "Financial rollups drifted from payment history");
    }
    Ok(drift)
}

/// Rebuild every rollup bucket from payment history. Returns the number of
/// buckets written.
pub fn recompute_rollups(conn: &mut Connection, now: NaiveDateTime) -> Result<usize, EngineError> {
    let written = UnitOfWork::new("recompute_rollups")
        .step("clear snapshot", |tx, _: &mut usize| {
            clear_rollups(tx)?;
            Ok(())
        })
        .step("replay payments", |tx, written| {
            let buckets: BTreeMap<_, _> = rollups_from_payments(&list_applied_payments(tx)?);
            for ((period, label), amount) in &buckets {
                increment_rollup(tx, *period, label, *amount, now)?;
            }
            *written = buckets.len();
            Ok(())
        })
        .execute(conn, 0)?;

    tracing::info!(buckets = written, "Financial rollups recomputed");
    Ok(written)
}

pub fn dashboard_stats(conn: &Connection, now: NaiveDateTime) -> Result<DashboardStats, EngineError> {
    Ok(DashboardStats {
        total_patients: count_patients(conn)?,
        active_doctors: count_doctors(conn)?,
        today_appointments: count_appointments_on_day(conn, now.date())?,
        active_admissions: count_active_admissions(conn)?,
        pending_revenue: sum_unpaid_totals(conn)?,
        generated_at: now,
    })
}
