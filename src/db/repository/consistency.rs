use rusqlite::Connection;

use crate::db::DatabaseError;
use crate::models::rollups_from_payments;

use super::financial_report::list_rollups;
use super::payment::list_applied_payments;

/// A single consistency issue detected by the checker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyIssue {
    pub category: String,
    pub severity: String,
    pub description: String,
    pub entity_id: Option<String>,
}

/// Result of a consistency check across the reservation and billing ledger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub invoices_checked: i64,
    pub rollup_drift_detected: bool,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

fn collect_ids(conn: &Connection, sql: &str) -> Result<Vec<(String, String)>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Run a full consistency check across the database.
///
/// Detects:
/// - Invoices whose total differs from the sum of their line items
/// - Invoices whose Paid/Unpaid status disagrees with applied payments
/// - Medicines with negative stock
/// - Rooms referenced by more than one active admission
/// - Test orders SCHEDULED without being paid
/// - Rollup snapshot drift against payment history
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport, DatabaseError> {
    let mut issues = Vec::new();

    // 1. Invoice total vs line items
    for (id, detail) in collect_ids(
        conn,
        "SELECT i.id, i.total_amount || ' vs ' || COALESCE(SUM(l.quantity * l.unit_price), 0)
         FROM invoices i
         LEFT JOIN invoice_line_items l ON l.invoice_id = i.id
         GROUP BY i.id
         HAVING i.total_amount <> COALESCE(SUM(l.quantity * l.unit_price), 0)",
    )? {
        issues.push(ConsistencyIssue {
            category: "invoice_total_drift".into(),
            severity: "high".into(),
            description: format!("Invoice total differs from its line items ({detail})"),
            entity_id: Some(id),
        });
    }

    // 2. Paid status vs applied payments
    for (id, status) in collect_ids(
        conn,
        "SELECT i.id, i.status
         FROM invoices i
         LEFT JOIN (
             SELECT invoice_id, SUM(applied_amount) AS paid FROM payments GROUP BY invoice_id
         ) p ON p.invoice_id = i.id
         WHERE (i.status = 'Unpaid' AND COALESCE(p.paid, 0) >= i.total_amount)
            OR (i.status = 'Paid' AND COALESCE(p.paid, 0) < i.total_amount)",
    )? {
        issues.push(ConsistencyIssue {
            category: "paid_status_drift".into(),
            severity: "high".into(),
            description: format!("Invoice marked '{status}' disagrees with its payments"),
            entity_id: Some(id),
        });
    }

    // 3. Negative stock
    for (id, qty) in collect_ids(
        conn,
        "SELECT id, CAST(stock_quantity AS TEXT) FROM medicines WHERE stock_quantity < 0",
    )? {
        issues.push(ConsistencyIssue {
            category: "negative_stock".into(),
            severity: "high".into(),
            description: format!("Medicine stock is {qty}"),
            entity_id: Some(id),
        });
    }

    // 4. Double-occupied rooms
    for (room, count) in collect_ids(
        conn,
        "SELECT room_number, CAST(COUNT(*) AS TEXT) FROM admissions
         WHERE status = 'Admitted'
         GROUP BY room_number HAVING COUNT(*) > 1",
    )? {
        issues.push(ConsistencyIssue {
            category: "double_occupancy".into(),
            severity: "high".into(),
            description: format!("Room has {count} active admissions"),
            entity_id: Some(room),
        });
    }

    // 5. Scheduled but unpaid test orders
    for (id, payment_status) in collect_ids(
        conn,
        "SELECT id, payment_status FROM test_orders
         WHERE status = 'SCHEDULED' AND payment_status <> 'Paid'",
    )? {
        issues.push(ConsistencyIssue {
            category: "scheduled_unpaid_test".into(),
            severity: "medium".into(),
            description: format!("Test order scheduled with payment '{payment_status}'"),
            entity_id: Some(id),
        });
    }

    // 6. Rollup drift
    let expected = rollups_from_payments(&list_applied_payments(conn)?);
    let stored = list_rollups(conn)?;
    let stored_matches = stored.len() == expected.len()
        && stored.iter().all(|entry| {
            expected.get(&(entry.period, entry.label.clone())) == Some(&entry.total_revenue)
        });
    let rollup_drift = !stored_matches;
    if rollup_drift {
        issues.push(ConsistencyIssue {
            category: "rollup_drift".into(),
            severity: "low".into(),
            description: "Financial rollup snapshot differs from payment history".into(),
            entity_id: None,
        });
    }

    let invoices_checked: i64 = conn.query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))?;

    Ok(ConsistencyReport {
        issues,
        invoices_checked,
        rollup_drift_detected: rollup_drift,
    })
}
