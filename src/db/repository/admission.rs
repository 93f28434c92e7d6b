use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::PaymentStatus;
use crate::models::Admission;

use super::uuid_column;

const ADMISSION_COLUMNS: &str =
    "id, patient_id, room_number, admitted_at, discharged_at, status, payment_status";

fn admission_from_row(row: &Row<'_>) -> rusqlite::Result<Admission> {
    Ok(Admission {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        room_number: row.get(2)?,
        admitted_at: row.get(3)?,
        discharged_at: row.get(4)?,
        status: row.get(5)?,
        payment_status: row.get(6)?,
    })
}

pub fn insert_admission(conn: &Connection, admission: &Admission) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO admissions (id, patient_id, room_number, admitted_at, discharged_at, status, payment_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            admission.id.to_string(),
            admission.patient_id.to_string(),
            admission.room_number,
            admission.admitted_at,
            admission.discharged_at,
            admission.status,
            admission.payment_status,
        ],
    )?;
    Ok(())
}

pub fn get_admission(conn: &Connection, id: &Uuid) -> Result<Option<Admission>, DatabaseError> {
    let admission = conn
        .query_row(
            &format!("SELECT {ADMISSION_COLUMNS} FROM admissions WHERE id = ?1"),
            params![id.to_string()],
            admission_from_row,
        )
        .optional()?;
    Ok(admission)
}

pub fn get_active_admission_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<Admission>, DatabaseError> {
    let admission = conn
        .query_row(
            &format!(
                "SELECT {ADMISSION_COLUMNS} FROM admissions
                 WHERE patient_id = ?1 AND status = 'Admitted'"
            ),
            params![patient_id.to_string()],
            admission_from_row,
        )
        .optional()?;
    Ok(admission)
}

/// Close an active admission. Returns rows changed (0 when not admitted).
pub fn discharge_admission(
    conn: &Connection,
    id: &Uuid,
    at: NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE admissions SET status = 'Discharged', discharged_at = ?2
         WHERE id = ?1 AND status = 'Admitted'",
        params![id.to_string(), at],
    )?;
    Ok(changed)
}

pub fn set_admission_payment_status(
    conn: &Connection,
    id: &Uuid,
    status: PaymentStatus,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE admissions SET payment_status = ?2 WHERE id = ?1",
        params![id.to_string(), status],
    )?;
    Ok(changed)
}

pub fn count_active_admissions(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM admissions WHERE status = 'Admitted'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
