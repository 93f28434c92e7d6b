use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::ExpenseCategory;
use crate::models::{Expense, Money};

pub fn insert_expense(conn: &Connection, expense: &Expense) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO expenses (id, category, description, amount, medicine_id, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            expense.id.to_string(),
            expense.category,
            expense.description,
            expense.amount,
            expense.medicine_id.map(|id| id.to_string()),
            expense.recorded_at,
        ],
    )?;
    Ok(())
}

/// Expenses of one category recorded in `[start, end)`.
pub fn sum_expenses_between(
    conn: &Connection,
    category: ExpenseCategory,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Money, DatabaseError> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM expenses
         WHERE category = ?1 AND recorded_at >= ?2 AND recorded_at < ?3",
        params![category, start, end],
        |row| row.get(0),
    )?;
    Ok(total)
}
