//! Availability Oracle.
//!
//! The same check runs twice per booking: once on a plain connection for
//! display (advisory, may be stale by the time the user submits) and once
//! inside the booking's unit of work (binding). The binding variant only
//! accepts a `Transaction`, so it cannot be called outside one.

use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{get_medicine, room_category_stats, RoomCategoryStats};
use crate::error::EngineError;
use crate::models::enums::RoomCategory;
use crate::procedures::LedgerProcedures;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum ResourceSelector {
    DoctorSlot { doctor_id: Uuid, at: NaiveDateTime },
    Room { patient_id: Uuid, category: RoomCategory },
    Medicine { medicine_id: Uuid, quantity: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCheck {
    pub available: bool,
    pub remaining_capacity: i64,
    pub message: String,
    /// Room picked by a successful room check.
    pub room_number: Option<String>,
}

/// Advisory check for display.
pub fn display_check(
    conn: &Connection,
    procedures: &dyn LedgerProcedures,
    selector: &ResourceSelector,
) -> Result<AvailabilityCheck, EngineError> {
    check(conn, procedures, selector)
}

/// Commit-time check. Fails with `CapacityExhausted` carrying the
/// oracle's message when the resource is gone.
pub fn binding_check(
    tx: &Transaction<'_>,
    procedures: &dyn LedgerProcedures,
    selector: &ResourceSelector,
) -> Result<AvailabilityCheck, EngineError> {
    let result = check(tx, procedures, selector)?;
    if !result.available {
        tracing::debug!(?selector, message = %result.message, "Binding availability check refused");
        return Err(EngineError::CapacityExhausted(result.message));
    }
    Ok(result)
}

fn check(
    conn: &Connection,
    procedures: &dyn LedgerProcedures,
    selector: &ResourceSelector,
) -> Result<AvailabilityCheck, EngineError> {
    match selector {
        ResourceSelector::DoctorSlot { doctor_id, at } => {
            let slot = procedures.check_slot_availability(conn, doctor_id, *at)?;
            Ok(AvailabilityCheck {
                available: slot.available,
                remaining_capacity: slot.remaining,
                message: slot.message,
                room_number: None,
            })
        }
        ResourceSelector::Room {
            patient_id,
            category,
        } => {
            let allocation = procedures.allocate_room(conn, patient_id, *category)?;
            let free = room_category_stats(conn)?
                .into_iter()
                .find(|s| s.category == *category)
                .map(|s| s.free)
                .unwrap_or(0);
            Ok(AvailabilityCheck {
                available: allocation.is_success(),
                remaining_capacity: free,
                message: allocation.status,
                room_number: allocation.room_number,
            })
        }
        ResourceSelector::Medicine {
            medicine_id,
            quantity,
        } => {
            let medicine = get_medicine(conn, medicine_id)?
                .ok_or_else(|| EngineError::not_found("medicine", medicine_id))?;
            let available = medicine.stock_quantity >= *quantity;
            let message = if available {
                format!("{} in stock", medicine.stock_quantity)
            } else {
                insufficient_stock_message(&medicine.name, medicine.stock_quantity)
            };
            Ok(AvailabilityCheck {
                available,
                remaining_capacity: i64::from(medicine.stock_quantity),
                message,
                room_number: None,
            })
        }
    }
}

pub(crate) fn insufficient_stock_message(name: &str, available: u32) -> String {
    format!("Insufficient stock for {name}. Available: {available}")
}

/// Free and total rooms per category.
pub fn room_availability_stats(conn: &Connection) -> Result<Vec<RoomCategoryStats>, EngineError> {
    Ok(room_category_stats(conn)?)
}
