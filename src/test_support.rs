//! Seeded ledger shared by the module tests.
//!
//! One cardiologist consulting Wednesdays 09:00-12:00 (six 30-minute slots,
//! five bookings a day), two free ICU beds, one bed in each ward, a free
//! consultation room, two patients, two medicines and one lab test.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use tempfile::TempDir;
use uuid::Uuid;

use crate::authorization::{hash_password, AuthContext};
use crate::clock::{Clock, FixedClock};
use crate::config::{EngineConfig, RetrySettings};
use crate::db::repository::{
    insert_appointment, insert_doctor, insert_medical_test, insert_medicine, insert_patient,
    insert_pharmacy_order, insert_room, insert_test_order, insert_user, upsert_doctor_schedule,
};
use crate::db::sqlite::{open_database, open_memory_database};
use crate::error::EngineError;
use crate::models::enums::{
    AppointmentStatus, PaymentStatus, PharmacyOrderStatus, Role, RoomCategory, TestStatus,
};
use crate::models::{
    Appointment, Doctor, DoctorSchedule, LabTestOrder, MedicalTest, Medicine, Money, Patient,
    PharmacyOrder, Room, UserAccount,
};
use crate::procedures::{
    CredentialCheck, LedgerProcedures, NewDoctor, RoomAllocation, ScheduleWindow,
    SlotAvailability, SqliteProcedures, TimeSlot,
};

pub const TEST_PASSWORD_ITERATIONS: u32 = 1_000;
pub const FRONT_DESK_EMAIL: &str = "desk@careconnect.test";
pub const FRONT_DESK_PASSWORD: &str = "front-desk-pass";

/// Wednesday.
pub fn booking_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

pub fn slot_at(hour: u32, minute: u32) -> NaiveDateTime {
    booking_day().and_hms_opt(hour, minute, 0).unwrap()
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        password_iterations: TEST_PASSWORD_ITERATIONS,
        retry: RetrySettings {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_pct: 0.0,
        },
        ..EngineConfig::default()
    }
}

pub fn new_doctor_request(license: &str) -> NewDoctor {
    NewDoctor {
        full_name: "Dr. Tanvir Hasan".into(),
        department: "Neurology".into(),
        specialization: "Neurophysiology".into(),
        license_number: license.into(),
        consultation_fee: Money::from_major(1500),
        joining_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        room_number: None,
        schedule: vec![ScheduleWindow {
            day_of_week: 0,
            start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }],
    }
}

pub struct Fixture {
    pub conn: Connection,
    pub config: EngineConfig,
    pub procedures: SqliteProcedures,
    pub clock: FixedClock,
    pub doctor: Doctor,
    pub patient: Patient,
    pub second_patient: Patient,
    /// Stock 20 at 5.00.
    pub medicine: Medicine,
    /// Stock 2 at 12.50.
    pub scarce_medicine: Medicine,
    /// 300.00, 30 minutes.
    pub test: MedicalTest,
    pub desk: AuthContext,
    pub admin: AuthContext,
    pub pharmacist: AuthContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::seed(open_memory_database().unwrap(), test_config())
    }

    /// File-backed ledger, for tests that need several connections.
    pub fn on_disk() -> (Self, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            database_path: dir.path().join("careconnect.db"),
            ..test_config()
        };
        let conn = open_database(&config.database_path, &config).unwrap();
        (Self::seed(conn, config), dir)
    }

    /// Another connection to the same file-backed ledger.
    pub fn connect(&self) -> Connection {
        open_database(&self.config.database_path, &self.config).unwrap()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn seed(conn: Connection, config: EngineConfig) -> Self {
        let doctor = Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Farhana Islam".into(),
            department: "Cardiology".into(),
            specialization: "Interventional Cardiology".into(),
            license_number: "BMDC-A-10001".into(),
            consultation_fee: Money::from_major(1000),
            joining_date: NaiveDate::from_ymd_opt(2020, 3, 1),
        };
        insert_doctor(&conn, &doctor).unwrap();
        upsert_doctor_schedule(
            &conn,
            &DoctorSchedule {
                doctor_id: doctor.id,
                day_of_week: 2,
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            },
        )
        .unwrap();

        for (number, category, charge) in [
            ("ICU-101", RoomCategory::Icu, 5000),
            ("ICU-102", RoomCategory::Icu, 5000),
            ("W-201", RoomCategory::WardAc, 2000),
            ("N-301", RoomCategory::WardNonAc, 800),
            ("C-201", RoomCategory::Consultation, 0),
        ] {
            insert_room(
                &conn,
                &Room {
                    room_number: number.into(),
                    category,
                    charge_per_day: Money::from_major(charge),
                    is_available: true,
                    current_doctor_id: None,
                },
            )
            .unwrap();
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Rahim Uddin".into(),
            phone: Some("01700000001".into()),
            user_id: None,
        };
        let second_patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Karima Begum".into(),
            phone: None,
            user_id: None,
        };
        insert_patient(&conn, &patient).unwrap();
        insert_patient(&conn, &second_patient).unwrap();

        let medicine = Medicine {
            id: Uuid::new_v4(),
            name: "Paracetamol 500mg".into(),
            stock_quantity: 20,
            unit_price: Money::from_minor(500),
        };
        let scarce_medicine = Medicine {
            id: Uuid::new_v4(),
            name: "Amoxicillin 250mg".into(),
            stock_quantity: 2,
            unit_price: Money::from_minor(1250),
        };
        insert_medicine(&conn, &medicine).unwrap();
        insert_medicine(&conn, &scarce_medicine).unwrap();

        let test = MedicalTest {
            id: Uuid::new_v4(),
            name: "Complete Blood Count".into(),
            cost: Money::from_major(300),
            duration_minutes: 30,
        };
        insert_medical_test(&conn, &test).unwrap();

        let desk_account = UserAccount {
            id: Uuid::new_v4(),
            email: FRONT_DESK_EMAIL.into(),
            role: Role::Receptionist,
        };
        let (hash, salt) = hash_password(FRONT_DESK_PASSWORD, config.password_iterations);
        insert_user(&conn, &desk_account, &hash, &salt).unwrap();

        Self {
            procedures: SqliteProcedures::new(&config),
            clock: FixedClock::new(slot_at(8, 0)),
            desk: AuthContext::new(desk_account.id, Role::Receptionist),
            admin: AuthContext::new(Uuid::new_v4(), Role::Admin),
            pharmacist: AuthContext::new(Uuid::new_v4(), Role::Pharmacist),
            conn,
            config,
            doctor,
            patient,
            second_patient,
            medicine,
            scarce_medicine,
            test,
        }
    }

    /// Raw appointment row awaiting payment, bypassing the booking workflow.
    pub fn insert_pending_appointment(&self, at: NaiveDateTime) -> Uuid {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: self.patient.id,
            doctor_id: self.doctor.id,
            scheduled_at: at,
            reason: None,
            status: AppointmentStatus::PendingPayment,
            created_at: self.now(),
        };
        insert_appointment(&self.conn, &appointment).unwrap();
        appointment.id
    }

    pub fn insert_pending_pharmacy_order(&self) -> Uuid {
        let order = PharmacyOrder {
            id: Uuid::new_v4(),
            patient_id: self.patient.id,
            total_amount: Money::ZERO,
            status: PharmacyOrderStatus::PendingPayment,
            created_at: self.now(),
        };
        insert_pharmacy_order(&self.conn, &order).unwrap();
        order.id
    }

    pub fn insert_pending_test_order(&self) -> Uuid {
        let order = LabTestOrder {
            id: Uuid::new_v4(),
            patient_id: self.patient.id,
            test_id: self.test.id,
            doctor_id: None,
            status: TestStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            scheduled_at: None,
            scheduled_end_at: None,
            result_summary: None,
            created_at: self.now(),
            completed_at: None,
        };
        insert_test_order(&self.conn, &order).unwrap();
        order.id
    }
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

/// Scripted procedure port. Unscripted calls fail with `Internal`.
#[derive(Default)]
pub struct FakeProcedures {
    pub slot: Option<SlotAvailability>,
    pub room: Option<RoomAllocation>,
    /// Every call fails with `TransientStoreFailure(message)`.
    pub failure: Option<String>,
}

impl FakeProcedures {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_slot(slot: SlotAvailability) -> Self {
        Self {
            slot: Some(slot),
            ..Self::default()
        }
    }

    pub fn with_room(room_number: &str) -> Self {
        Self {
            room: Some(RoomAllocation {
                room_number: Some(room_number.into()),
                status: "Success".into(),
            }),
            ..Self::default()
        }
    }

    fn scripted<T: Clone>(&self, value: &Option<T>, call: &str) -> Result<T, EngineError> {
        if let Some(message) = &self.failure {
            return Err(EngineError::TransientStoreFailure(message.clone()));
        }
        value
            .clone()
            .ok_or_else(|| EngineError::Internal(format!("{call} was not scripted")))
    }
}

impl LedgerProcedures for FakeProcedures {
    fn verify_credentials(
        &self,
        _conn: &Connection,
        _email: &str,
        _password: &str,
    ) -> Result<CredentialCheck, EngineError> {
        self.scripted(&None, "verify_credentials")
    }

    fn compute_available_slots(
        &self,
        _conn: &Connection,
        _doctor_id: &Uuid,
        _date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, EngineError> {
        self.scripted(&None, "compute_available_slots")
    }

    fn check_slot_availability(
        &self,
        _conn: &Connection,
        _doctor_id: &Uuid,
        _at: NaiveDateTime,
    ) -> Result<SlotAvailability, EngineError> {
        self.scripted(&self.slot, "check_slot_availability")
    }

    fn allocate_room(
        &self,
        _conn: &Connection,
        _patient_id: &Uuid,
        _category: RoomCategory,
    ) -> Result<RoomAllocation, EngineError> {
        self.scripted(&self.room, "allocate_room")
    }

    fn validate_and_create_doctor(
        &self,
        _conn: &Connection,
        _doctor: &NewDoctor,
    ) -> Result<Uuid, EngineError> {
        self.scripted(&None, "validate_and_create_doctor")
    }
}
