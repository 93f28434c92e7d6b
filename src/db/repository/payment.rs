use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Money, Payment};

use super::uuid_column;

pub fn insert_payment(conn: &Connection, payment: &Payment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO payments (id, invoice_id, amount, applied_amount, method, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            payment.id.to_string(),
            payment.invoice_id.to_string(),
            payment.amount,
            payment.applied_amount,
            payment.method,
            payment.paid_at,
        ],
    )?;
    Ok(())
}

/// Sum of amounts applied to an invoice's balance.
pub fn sum_applied_for_invoice(conn: &Connection, invoice_id: &Uuid) -> Result<Money, DatabaseError> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(applied_amount), 0) FROM payments WHERE invoice_id = ?1",
        params![invoice_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn list_payments_for_invoice(
    conn: &Connection,
    invoice_id: &Uuid,
) -> Result<Vec<Payment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, invoice_id, amount, applied_amount, method, paid_at
         FROM payments WHERE invoice_id = ?1 ORDER BY paid_at, id",
    )?;
    let rows = stmt.query_map(params![invoice_id.to_string()], |row| {
        Ok(Payment {
            id: uuid_column(row, 0)?,
            invoice_id: uuid_column(row, 1)?,
            amount: row.get(2)?,
            applied_amount: row.get(3)?,
            method: row.get(4)?,
            paid_at: row.get(5)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// `(applied_amount, paid_at)` for every payment that moved a balance.
pub fn list_applied_payments(
    conn: &Connection,
) -> Result<Vec<(Money, NaiveDateTime)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT applied_amount, paid_at FROM payments WHERE applied_amount > 0 ORDER BY paid_at",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
