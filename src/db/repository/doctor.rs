use chrono::NaiveTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Doctor, DoctorSchedule};

use super::{u32_column, uuid_column};

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: uuid_column(row, 0)?,
        full_name: row.get(1)?,
        department: row.get(2)?,
        specialization: row.get(3)?,
        license_number: row.get(4)?,
        consultation_fee: row.get(5)?,
        joining_date: row.get(6)?,
    })
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, full_name, department, specialization, license_number,
         consultation_fee, joining_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            doctor.id.to_string(),
            doctor.full_name,
            doctor.department,
            doctor.specialization,
            doctor.license_number,
            doctor.consultation_fee,
            doctor.joining_date,
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let doctor = conn
        .query_row(
            "SELECT id, full_name, department, specialization, license_number,
             consultation_fee, joining_date
             FROM doctors WHERE id = ?1",
            params![id.to_string()],
            doctor_from_row,
        )
        .optional()?;
    Ok(doctor)
}

pub fn require_doctor(conn: &Connection, id: &Uuid) -> Result<Doctor, DatabaseError> {
    get_doctor(conn, id)?.ok_or_else(|| DatabaseError::not_found("doctor", id))
}

pub fn license_exists(conn: &Connection, license_number: &str) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM doctors WHERE license_number = ?1)",
        params![license_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn count_doctors(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM doctors", [], |row| row.get(0))?;
    Ok(count)
}

/// Insert or replace the doctor's window for one weekday.
pub fn upsert_doctor_schedule(
    conn: &Connection,
    schedule: &DoctorSchedule,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_schedules (doctor_id, day_of_week, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (doctor_id, day_of_week)
         DO UPDATE SET start_time = excluded.start_time, end_time = excluded.end_time",
        params![
            schedule.doctor_id.to_string(),
            schedule.day_of_week,
            schedule.start_time,
            schedule.end_time,
        ],
    )?;
    Ok(())
}

pub fn get_doctor_schedule(
    conn: &Connection,
    doctor_id: &Uuid,
    day_of_week: u32,
) -> Result<Option<DoctorSchedule>, DatabaseError> {
    let schedule = conn
        .query_row(
            "SELECT doctor_id, day_of_week, start_time, end_time
             FROM doctor_schedules WHERE doctor_id = ?1 AND day_of_week = ?2",
            params![doctor_id.to_string(), day_of_week],
            |row| {
                Ok(DoctorSchedule {
                    doctor_id: uuid_column(row, 0)?,
                    day_of_week: u32_column(row, 1)?,
                    start_time: row.get::<_, NaiveTime>(2)?,
                    end_time: row.get::<_, NaiveTime>(3)?,
                })
            },
        )
        .optional()?;
    Ok(schedule)
}
