use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ExpenseCategory, Role, RoomCategory};
use super::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub department: String,
    pub specialization: String,
    pub license_number: String,
    pub consultation_fee: Money,
    pub joining_date: Option<NaiveDate>,
}

/// Weekly consulting window. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub doctor_id: Uuid,
    pub day_of_week: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_number: String,
    pub category: RoomCategory,
    pub charge_per_day: Money,
    /// Administrative availability; occupancy is derived from admissions.
    pub is_available: bool,
    pub current_doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalTest {
    pub id: Uuid,
    pub name: String,
    pub cost: Money,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub stock_quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub category: ExpenseCategory,
    pub description: String,
    pub amount: Money,
    pub medicine_id: Option<Uuid>,
    pub recorded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}
