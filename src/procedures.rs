//! Ledger store procedures: the allocation and validation primitives the
//! workflows call but do not own.
//!
//! `LedgerProcedures` is the port. `SqliteProcedures` is the adapter backed
//! by the bundled ledger database; tests substitute their own
//! implementation to exercise failure paths. Every call receives the
//! caller's connection, so a procedure invoked inside a unit of work reads
//! and writes under that unit's transaction.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::verify_password;
use crate::config::EngineConfig;
use crate::db::repository::{
    assign_room_to_doctor, booked_times_on_day, count_live_appointments_on_day,
    find_free_room, get_active_admission_for_patient, get_credentials_by_email,
    get_doctor_schedule, get_room, insert_doctor, is_slot_taken, license_exists,
    require_doctor, require_patient, upsert_doctor_schedule,
};
use crate::error::EngineError;
use crate::models::enums::{Role, RoomCategory};
use crate::models::{Doctor, DoctorSchedule, Money};

/// Professional license IDs, e.g. `BMDC-A-12345` or `BM-12345`.
static LICENSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,5}-(?:[A-Z]-)?\d{4,6}$").unwrap());

pub const ALLOCATION_SUCCESS: &str = "Success";

// ═══════════════════════════════════════════════════════════
// Request / response records
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCheck {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
}

impl CredentialCheck {
    fn rejected() -> Self {
        Self {
            valid: false,
            user_id: None,
            role: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub time: NaiveTime,
    /// 12-hour label, e.g. `10:30 AM`.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    /// Bookings the doctor can still take that day.
    pub remaining: i64,
    pub available: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAllocation {
    pub room_number: Option<String>,
    /// `Success`, or the refusal reason surfaced verbatim.
    pub status: String,
}

impl RoomAllocation {
    pub fn is_success(&self) -> bool {
        self.status == ALLOCATION_SUCCESS && self.room_number.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub day_of_week: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDoctor {
    pub full_name: String,
    pub department: String,
    pub specialization: String,
    pub license_number: String,
    pub consultation_fee: Money,
    pub joining_date: Option<NaiveDate>,
    /// Consultation room withdrawn from the pool for this doctor.
    pub room_number: Option<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleWindow>,
}

// ═══════════════════════════════════════════════════════════
// Port
// ═══════════════════════════════════════════════════════════

pub trait LedgerProcedures: Send + Sync {
    fn verify_credentials(
        &self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<CredentialCheck, EngineError>;

    /// Free slots in the doctor's window for `date`; empty when the day is
    /// full or outside the schedule.
    fn compute_available_slots(
        &self,
        conn: &Connection,
        doctor_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, EngineError>;

    fn check_slot_availability(
        &self,
        conn: &Connection,
        doctor_id: &Uuid,
        at: NaiveDateTime,
    ) -> Result<SlotAvailability, EngineError>;

    fn allocate_room(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        category: RoomCategory,
    ) -> Result<RoomAllocation, EngineError>;

    /// Signals `ValidationRejected` with a user-facing message on rule
    /// violations such as an invalid license.
    fn validate_and_create_doctor(
        &self,
        conn: &Connection,
        doctor: &NewDoctor,
    ) -> Result<Uuid, EngineError>;
}

// ═══════════════════════════════════════════════════════════
// SQLite adapter
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SqliteProcedures {
    daily_capacity: i64,
    slot_minutes: i64,
    password_iterations: u32,
}

impl SqliteProcedures {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            daily_capacity: i64::from(config.daily_slot_capacity),
            slot_minutes: i64::from(config.slot_minutes.max(1)),
            password_iterations: config.password_iterations,
        }
    }

    fn slot_length(&self) -> Duration {
        Duration::minutes(self.slot_minutes)
    }

    fn schedule_for(
        &self,
        conn: &Connection,
        doctor_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Option<DoctorSchedule>, EngineError> {
        Ok(get_doctor_schedule(
            conn,
            doctor_id,
            date.weekday().num_days_from_monday(),
        )?)
    }
}

impl LedgerProcedures for SqliteProcedures {
    fn verify_credentials(
        &self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<CredentialCheck, EngineError> {
        let Some(stored) = get_credentials_by_email(conn, email)? else {
            return Ok(CredentialCheck::rejected());
        };
        if !verify_password(
            password,
            &stored.password_hash,
            &stored.salt,
            self.password_iterations,
        ) {
            return Ok(CredentialCheck::rejected());
        }
        Ok(CredentialCheck {
            valid: true,
            user_id: Some(stored.account.id),
            role: Some(stored.account.role),
        })
    }

    fn compute_available_slots(
        &self,
        conn: &Connection,
        doctor_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, EngineError> {
        require_doctor(conn, doctor_id)?;
        let Some(schedule) = self.schedule_for(conn, doctor_id, date)? else {
            return Ok(Vec::new());
        };
        if count_live_appointments_on_day(conn, doctor_id, date)? >= self.daily_capacity {
            return Ok(Vec::new());
        }

        let booked = booked_times_on_day(conn, doctor_id, date)?;
        let mut slots = Vec::new();
        let mut cursor = date.and_time(schedule.start_time);
        let window_end = date.and_time(schedule.end_time);
        while cursor + self.slot_length() <= window_end {
            if !booked.contains(&cursor) {
                slots.push(TimeSlot {
                    time: cursor.time(),
                    label: cursor.format("%I:%M %p").to_string(),
                });
            }
            cursor += self.slot_length();
        }
        Ok(slots)
    }

    fn check_slot_availability(
        &self,
        conn: &Connection,
        doctor_id: &Uuid,
        at: NaiveDateTime,
    ) -> Result<SlotAvailability, EngineError> {
        require_doctor(conn, doctor_id)?;
        let date = at.date();
        let booked = count_live_appointments_on_day(conn, doctor_id, date)?;
        let remaining = (self.daily_capacity - booked).max(0);
        let refuse = |message: String| SlotAvailability {
            remaining,
            available: false,
            message,
        };

        let Some(schedule) = self.schedule_for(conn, doctor_id, date)? else {
            return Ok(refuse(format!("Doctor is not available on {}", date.format("%A"))));
        };

        let time = at.time();
        let fits_window = time >= schedule.start_time
            && at + self.slot_length() <= date.and_time(schedule.end_time);
        let aligned = (at - date.and_time(schedule.start_time)).num_minutes() % self.slot_minutes == 0
            && time.second() == 0
            && time.nanosecond() == 0;
        if !fits_window || !aligned {
            return Ok(refuse(format!(
                "Selected time is outside the doctor's schedule ({} - {})",
                schedule.start_time.format("%I:%M %p"),
                schedule.end_time.format("%I:%M %p"),
            )));
        }
        if remaining == 0 {
            return Ok(refuse(format!("Doctor is fully booked on {date}")));
        }
        if is_slot_taken(conn, doctor_id, at)? {
            return Ok(refuse("Selected slot is already booked".into()));
        }

        Ok(SlotAvailability {
            remaining,
            available: true,
            message: format!("{remaining} slots remaining"),
        })
    }

    fn allocate_room(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        category: RoomCategory,
    ) -> Result<RoomAllocation, EngineError> {
        require_patient(conn, patient_id)?;
        let refuse = |status: String| RoomAllocation {
            room_number: None,
            status,
        };

        if !category.is_inpatient() {
            return Ok(refuse(format!("{category} rooms cannot be used for admission")));
        }
        if let Some(active) = get_active_admission_for_patient(conn, patient_id)? {
            return Ok(refuse(format!(
                "Patient is already admitted in room {}",
                active.room_number
            )));
        }
        match find_free_room(conn, category)? {
            Some(room) => Ok(RoomAllocation {
                room_number: Some(room.room_number),
                status: ALLOCATION_SUCCESS.into(),
            }),
            None => Ok(refuse(format!("No {category} rooms available"))),
        }
    }

    fn validate_and_create_doctor(
        &self,
        conn: &Connection,
        doctor: &NewDoctor,
    ) -> Result<Uuid, EngineError> {
        let license = doctor.license_number.trim();
        if !LICENSE_PATTERN.is_match(license) {
            return Err(EngineError::ValidationRejected("Invalid License ID".into()));
        }
        if doctor.full_name.trim().is_empty() {
            return Err(EngineError::ValidationRejected("Doctor name is required".into()));
        }
        if doctor.consultation_fee <= Money::ZERO {
            return Err(EngineError::ValidationRejected(
                "Consultation fee must be positive".into(),
            ));
        }
        if license_exists(conn, license)? {
            return Err(EngineError::ValidationRejected(format!(
                "License ID {license} is already registered"
            )));
        }

        let record = Doctor {
            id: Uuid::new_v4(),
            full_name: doctor.full_name.trim().into(),
            department: doctor.department.trim().into(),
            specialization: doctor.specialization.trim().into(),
            license_number: license.into(),
            consultation_fee: doctor.consultation_fee,
            joining_date: doctor.joining_date,
        };
        insert_doctor(conn, &record)?;

        for window in &doctor.schedule {
            if window.day_of_week > 6 || window.start_time >= window.end_time {
                return Err(EngineError::ValidationRejected(format!(
                    "Invalid schedule window for day {}",
                    window.day_of_week
                )));
            }
            upsert_doctor_schedule(
                conn,
                &DoctorSchedule {
                    doctor_id: record.id,
                    day_of_week: window.day_of_week,
                    start_time: window.start_time,
                    end_time: window.end_time,
                },
            )?;
        }

        if let Some(room_number) = &doctor.room_number {
            if get_room(conn, room_number)?.is_none() {
                return Err(EngineError::not_found("room", room_number));
            }
            if assign_room_to_doctor(conn, room_number, &record.id)? == 0 {
                return Err(EngineError::ValidationRejected(format!(
                    "Room {room_number} is not available"
                )));
            }
        }

        Ok(record.id)
    }
}
