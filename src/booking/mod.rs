//! Reservation workflows.
//!
//! Each workflow is one unit of work: the binding availability check, the
//! reservation write and its invoice commit together or not at all. Every
//! workflow takes the caller's `AuthContext` explicitly, plus the time it
//! should treat as "now".

pub mod admission;
pub mod appointment;
pub mod pharmacy;
pub mod registration;

pub use admission::*;
pub use appointment::*;
pub use lab_test::*;
pub use pharmacy::*;
pub use registration::*;

/// Trimmed free text; blank becomes `None`.
pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
