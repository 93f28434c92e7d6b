use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::RoomCategory;
use crate::models::Room;

use super::opt_uuid_column;

/// Free/total room counts for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCategoryStats {
    pub category: RoomCategory,
    pub total: i64,
    pub free: i64,
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        room_number: row.get(0)?,
        category: row.get(1)?,
        charge_per_day: row.get(2)?,
        is_available: row.get(3)?,
        current_doctor_id: opt_uuid_column(row, 4)?,
    })
}

pub fn insert_room(conn: &Connection, room: &Room) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO rooms (room_number, category, charge_per_day, is_available, current_doctor_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            room.room_number,
            room.category,
            room.charge_per_day,
            room.is_available,
            room.current_doctor_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_room(conn: &Connection, room_number: &str) -> Result<Option<Room>, DatabaseError> {
    let room = conn
        .query_row(
            "SELECT room_number, category, charge_per_day, is_available, current_doctor_id
             FROM rooms WHERE room_number = ?1",
            params![room_number],
            room_from_row,
        )
        .optional()?;
    Ok(room)
}

/// First room of `category` that is administratively available and has no
/// active admission.
pub fn find_free_room(
    conn: &Connection,
    category: RoomCategory,
) -> Result<Option<Room>, DatabaseError> {
    let room = conn
        .query_row(
            "SELECT r.room_number, r.category, r.charge_per_day, r.is_available, r.current_doctor_id
             FROM rooms r
             WHERE r.category = ?1 AND r.is_available = 1
               AND NOT EXISTS (
                   SELECT 1 FROM admissions a
                   WHERE a.room_number = r.room_number AND a.status = 'Admitted'
               )
             ORDER BY r.room_number
             LIMIT 1",
            params![category],
            room_from_row,
        )
        .optional()?;
    Ok(room)
}

/// Hand a free room to a doctor and withdraw it from the pool. Returns rows
/// changed (0 when the room was already taken).
pub fn assign_room_to_doctor(
    conn: &Connection,
    room_number: &str,
    doctor_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE rooms SET is_available = 0, current_doctor_id = ?2
         WHERE room_number = ?1 AND is_available = 1 AND current_doctor_id IS NULL",
        params![room_number, doctor_id.to_string()],
    )?;
    Ok(changed)
}

pub fn room_category_stats(conn: &Connection) -> Result<Vec<RoomCategoryStats>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT r.category,
                COUNT(*),
                SUM(CASE WHEN r.is_available = 1 AND NOT EXISTS (
                        SELECT 1 FROM admissions a
                        WHERE a.room_number = r.room_number AND a.status = 'Admitted'
                    ) THEN 1 ELSE 0 END)
         FROM rooms r
         GROUP BY r.category
         ORDER BY r.category",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(RoomCategoryStats {
            category: row.get(0)?,
            total: row.get(1)?,
            free: row.get(2)?,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
