use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::ReportPeriod;
use crate::models::{Money, RollupEntry};

/// Add `amount` to one rollup bucket, creating it on first use.
pub fn increment_rollup(
    conn: &Connection,
    period: ReportPeriod,
    label: &str,
    amount: Money,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO financial_reports (report_type, period_label, total_revenue, last_updated)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (report_type, period_label)
         DO UPDATE SET total_revenue = total_revenue + excluded.total_revenue,
                       last_updated = excluded.last_updated",
        params![period, label, amount, now],
    )?;
    Ok(())
}

pub fn list_rollups(conn: &Connection) -> Result<Vec<RollupEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT report_type, period_label, total_revenue FROM financial_reports
         ORDER BY report_type, period_label",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RollupEntry {
            period: row.get(0)?,
            label: row.get(1)?,
            total_revenue: row.get(2)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn clear_rollups(conn: &Connection) -> Result<usize, DatabaseError> {
    let removed = conn.execute("DELETE FROM financial_reports", [])?;
    Ok(removed)
}
