use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::PharmacyOrderStatus;
use crate::models::{PharmacyOrder, PharmacyOrderItem};

use super::{u32_column, uuid_column};

pub fn insert_pharmacy_order(conn: &Connection, order: &PharmacyOrder) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacy_orders (id, patient_id, total_amount, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            order.id.to_string(),
            order.patient_id.to_string(),
            order.total_amount,
            order.status,
            order.created_at,
        ],
    )?;
    Ok(())
}

pub fn insert_pharmacy_order_item(
    conn: &Connection,
    item: &PharmacyOrderItem,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacy_order_items (id, order_id, medicine_id, quantity, unit_price)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            item.id.to_string(),
            item.order_id.to_string(),
            item.medicine_id.to_string(),
            item.quantity,
            item.unit_price,
        ],
    )?;
    Ok(())
}

pub fn get_pharmacy_order_items(
    conn: &Connection,
    order_id: &Uuid,
) -> Result<Vec<PharmacyOrderItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, medicine_id, quantity, unit_price
         FROM pharmacy_order_items WHERE order_id = ?1",
    )?;
    let rows = stmt.query_map(params![order_id.to_string()], |row| {
        Ok(PharmacyOrderItem {
            id: uuid_column(row, 0)?,
            order_id: uuid_column(row, 1)?,
            medicine_id: uuid_column(row, 2)?,
            quantity: u32_column(row, 3)?,
            unit_price: row.get(4)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn set_pharmacy_order_status(
    conn: &Connection,
    id: &Uuid,
    status: PharmacyOrderStatus,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE pharmacy_orders SET status = ?2 WHERE id = ?1",
        params![id.to_string(), status],
    )?;
    Ok(changed)
}
