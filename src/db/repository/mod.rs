//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a `&Connection`; callers inside a unit of work pass
//! their `Transaction`, which derefs to one.

mod admission;
mod appointment;
mod consistency;
mod doctor;
mod expense;
mod financial_report;
mod idempotency;
mod invoice;
mod medicine;
mod patient;
mod payment;
mod pharmacy;
mod room;
mod user;

use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use super::DatabaseError;

pub use admission::*;
pub use appointment::*;
pub use consistency::*;
pub use doctor::*;
pub use expense::*;
pub use financial_report::*;
pub use idempotency::*;
pub use invoice::*;
pub use lab_test::*;
pub use medicine::*;
pub use patient::*;
pub use payment::*;
pub use pharmacy::*;
pub use room::*;
pub use user::*;

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Non-negative integer column into `u32`.
pub(crate) fn u32_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(idx)?;
    u32::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: raw.into(),
    })
}
