use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{AppointmentStatus, InvoiceStatus};
use crate::models::{Appointment, Money};

use super::{opt_uuid_column, uuid_column};

/// Which appointments a listing covers, relative to "now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentFilter {
    /// Scheduled on today's calendar date.
    Today,
    /// Scheduled at or after now.
    Upcoming,
    #[default]
    All,
}

/// Appointment joined with its doctor, patient and invoice, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentListing {
    pub appointment: Appointment,
    pub doctor_name: String,
    pub department: String,
    pub patient_name: String,
    pub invoice_id: Option<Uuid>,
    pub invoice_status: Option<InvoiceStatus>,
    pub invoice_total: Option<Money>,
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        doctor_id: uuid_column(row, 2)?,
        scheduled_at: row.get(3)?,
        reason: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<AppointmentListing> {
    Ok(AppointmentListing {
        appointment: appointment_from_row(row)?,
        doctor_name: row.get(7)?,
        department: row.get(8)?,
        patient_name: row.get(9)?,
        invoice_id: opt_uuid_column(row, 10)?,
        invoice_status: row.get(11)?,
        invoice_total: row.get(12)?,
    })
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, scheduled_at, reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            appt.scheduled_at,
            appt.reason,
            appt.status,
            appt.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let appt = conn
        .query_row(
            "SELECT id, patient_id, doctor_id, scheduled_at, reason, status, created_at
             FROM appointments WHERE id = ?1",
            params![id.to_string()],
            appointment_from_row,
        )
        .optional()?;
    Ok(appt)
}

/// Bookings for a doctor on a calendar day.
pub fn count_live_appointments_on_day(
    conn: &Connection,
    doctor_id: &Uuid,
    day: NaiveDate,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE doctor_id = ?1 AND date(scheduled_at) = ?2",
        params![doctor_id.to_string(), day],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Start times already taken for a doctor on a calendar day.
pub fn booked_times_on_day(
    conn: &Connection,
    doctor_id: &Uuid,
    day: NaiveDate,
) -> Result<Vec<NaiveDateTime>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT scheduled_at FROM appointments
         WHERE doctor_id = ?1 AND date(scheduled_at) = ?2
         ORDER BY scheduled_at",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string(), day], |row| row.get(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn is_slot_taken(
    conn: &Connection,
    doctor_id: &Uuid,
    at: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM appointments
         WHERE doctor_id = ?1 AND scheduled_at = ?2)",
        params![doctor_id.to_string(), at],
        |row| row.get(0),
    )?;
    Ok(taken)
}

/// Move an appointment between states. Returns rows changed (0 when the
/// appointment was not in `from`).
pub fn transition_appointment(
    conn: &Connection,
    id: &Uuid,
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?3 WHERE id = ?1 AND status = ?2",
        params![id.to_string(), from, to],
    )?;
    Ok(changed)
}

/// Appointments on a calendar day, across all doctors.
pub fn count_appointments_on_day(conn: &Connection, day: NaiveDate) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE date(scheduled_at) = ?1",
        params![day],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Latest appointment first, with the invoice status when one exists.
pub fn list_appointments(
    conn: &Connection,
    filter: AppointmentFilter,
    now: NaiveDateTime,
    limit: u32,
) -> Result<Vec<AppointmentListing>, DatabaseError> {
    let clause = match filter {
        AppointmentFilter::Today => "WHERE date(a.scheduled_at) = date(?2)",
        AppointmentFilter::Upcoming => "WHERE a.scheduled_at >= ?2",
        AppointmentFilter::All => "",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.patient_id, a.doctor_id, a.scheduled_at, a.reason, a.status, a.created_at,
                d.full_name, d.department, p.full_name, i.id, i.status, i.total_amount
         FROM appointments a
         JOIN doctors d ON d.id = a.doctor_id
         JOIN patients p ON p.id = a.patient_id
         LEFT JOIN invoices i ON i.appointment_id = a.id
         {clause}
         ORDER BY a.scheduled_at DESC, a.id
         LIMIT ?1"
    ))?;

    let rows = match filter {
        AppointmentFilter::All => stmt.query_map(params![limit], listing_from_row)?,
        _ => stmt.query_map(params![limit, now], listing_from_row)?,
    };
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn filters_split_today_from_later_days() {
        let fx = Fixture::new();
        let today = fx.insert_pending_appointment(slot_at(10, 0));
        let earlier_today = fx.insert_pending_appointment(slot_at(7, 0));
        let next_week = fx.insert_pending_appointment(slot_at(9, 0) + chrono::Duration::days(7));
        let now = fx.now();

        let ids = |filter| -> Vec<Uuid> {
            list_appointments(&fx.conn, filter, now, 50)
                .unwrap()
                .into_iter()
                .map(|l| l.appointment.id)
                .collect()
        };
        assert_eq!(ids(AppointmentFilter::Today), vec![today, earlier_today]);
        assert_eq!(ids(AppointmentFilter::Upcoming), vec![next_week, today]);
        assert_eq!(ids(AppointmentFilter::All), vec![next_week, today, earlier_today]);
    }

    #[test]
    fn listing_without_invoice_leaves_invoice_columns_empty() {
        let fx = Fixture::new();
        fx.insert_pending_appointment(slot_at(10, 0));
        let listing = list_appointments(&fx.conn, AppointmentFilter::All, fx.now(), 50).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].doctor_name, fx.doctor.full_name);
        assert_eq!(listing[0].department, "Cardiology");
        assert_eq!(listing[0].patient_name, fx.patient.full_name);
        assert!(listing[0].invoice_id.is_none());
        assert!(listing[0].invoice_status.is_none());
    }

    #[test]
    fn limit_caps_rows() {
        let fx = Fixture::new();
        for hour in [9, 10, 11] {
            fx.insert_pending_appointment(slot_at(hour, 0));
        }
        let listing = list_appointments(&fx.conn, AppointmentFilter::All, fx.now(), 2).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].appointment.scheduled_at, slot_at(11, 0));
    }

    #[test]
    fn filter_reads_lowercase_names() {
        let filter: AppointmentFilter = serde_json::from_str("\"upcoming\"").unwrap();
        assert_eq!(filter, AppointmentFilter::Upcoming);
    }
}
