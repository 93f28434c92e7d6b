use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Patient;

use super::{opt_uuid_column, uuid_column};

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, phone, user_id) VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.full_name,
            patient.phone,
            patient.user_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            "SELECT id, full_name, phone, user_id FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(Patient {
                    id: uuid_column(row, 0)?,
                    full_name: row.get(1)?,
                    phone: row.get(2)?,
                    user_id: opt_uuid_column(row, 3)?,
                })
            },
        )
        .optional()?;
    Ok(patient)
}

/// Fails with `NotFound` when the patient does not exist.
pub fn require_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    get_patient(conn, id)?.ok_or_else(|| DatabaseError::not_found("patient", id))
}

pub fn count_patients(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_require() {
        let conn = open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Amina Rahman".into(),
            phone: Some("01700000000".into()),
            user_id: None,
        };
        insert_patient(&conn, &patient).unwrap();

        let loaded = require_patient(&conn, &patient.id).unwrap();
        assert_eq!(loaded.full_name, "Amina Rahman");
        assert_eq!(count_patients(&conn).unwrap(), 1);

        let missing = require_patient(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(missing, DatabaseError::NotFound { .. }));
    }
}
