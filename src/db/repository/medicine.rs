use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Medicine;

use super::{u32_column, uuid_column};

fn medicine_from_row(row: &Row<'_>) -> rusqlite::Result<Medicine> {
    Ok(Medicine {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        stock_quantity: u32_column(row, 2)?,
        unit_price: row.get(3)?,
    })
}

pub fn insert_medicine(conn: &Connection, medicine: &Medicine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medicines (id, name, stock_quantity, unit_price) VALUES (?1, ?2, ?3, ?4)",
        params![
            medicine.id.to_string(),
            medicine.name,
            medicine.stock_quantity,
            medicine.unit_price,
        ],
    )?;
    Ok(())
}

pub fn get_medicine(conn: &Connection, id: &Uuid) -> Result<Option<Medicine>, DatabaseError> {
    let medicine = conn
        .query_row(
            "SELECT id, name, stock_quantity, unit_price FROM medicines WHERE id = ?1",
            params![id.to_string()],
            medicine_from_row,
        )
        .optional()?;
    Ok(medicine)
}

pub fn require_medicine(conn: &Connection, id: &Uuid) -> Result<Medicine, DatabaseError> {
    get_medicine(conn, id)?.ok_or_else(|| DatabaseError::not_found("medicine", id))
}

pub fn list_medicines(conn: &Connection) -> Result<Vec<Medicine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, stock_quantity, unit_price FROM medicines ORDER BY name",
    )?;
    let rows = stmt.query_map([], medicine_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Conditional decrement: succeeds only while enough stock remains.
/// Returns rows changed (0 when stock is short or the medicine is unknown).
pub fn decrement_stock_if_available(
    conn: &Connection,
    id: &Uuid,
    quantity: u32,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medicines SET stock_quantity = stock_quantity - ?2
         WHERE id = ?1 AND stock_quantity >= ?2",
        params![id.to_string(), quantity],
    )?;
    Ok(changed)
}

pub fn increment_stock(conn: &Connection, id: &Uuid, quantity: u32) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medicines SET stock_quantity = stock_quantity + ?2 WHERE id = ?1",
        params![id.to_string(), quantity],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Money;

    #[test]
    fn conditional_decrement_never_goes_negative() {
        let conn = open_memory_database().unwrap();
        let med = Medicine {
            id: Uuid::new_v4(),
            name: "Amoxicillin 250mg".into(),
            stock_quantity: 3,
            unit_price: Money::from_minor(450),
        };
        insert_medicine(&conn, &med).unwrap();

        assert_eq!(decrement_stock_if_available(&conn, &med.id, 2).unwrap(), 1);
        assert_eq!(decrement_stock_if_available(&conn, &med.id, 2).unwrap(), 0);
        assert_eq!(require_medicine(&conn, &med.id).unwrap().stock_quantity, 1);

        assert_eq!(increment_stock(&conn, &med.id, 10).unwrap(), 1);
        assert_eq!(require_medicine(&conn, &med.id).unwrap().stock_quantity, 11);
    }

    #[test]
    fn schema_rejects_negative_stock() {
        let conn = open_memory_database().unwrap();
        let result = conn.execute(
            "INSERT INTO medicines (id, name, stock_quantity, unit_price) VALUES ('m', 'x', -1, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
