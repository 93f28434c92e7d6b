//! Role-based authorization and credential hashing.
//!
//! The caller's identity travels as an explicit `AuthContext` argument.
//! Nothing in the engine reads a session from global state.
//!
//! Policy (default-allow, checked per operation):
//! 1. Pharmacy sale → refused for `Admin`
//! 2. Doctor registration → `Admin` only
//! 3. Restock, finance views, lab results and visit completion → refused
//!    for `Patient`
//! 4. Everything else → any authenticated role

use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::enums::Role;

pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, produced by credential verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Operations with a role restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    BookAppointment,
    CompleteAppointment,
    AdmitPatient,
    DischargePatient,
    OrderLabTest,
    FinalizeLabResult,
    PharmacySale,
    RestockMedicine,
    ProcessPayment,
    RegisterDoctor,
    RegisterPatient,
    ViewFinance,
}

// ═══════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════

/// Check whether `ctx` may perform `op`.
pub fn authorize(ctx: &AuthContext, op: Operation) -> Result<(), EngineError> {
    match (op, ctx.role) {
        (Operation::PharmacySale, Role::Admin) => {
            Err(EngineError::Forbidden("Admins cannot perform sales.".into()))
        }
        (Operation::RegisterDoctor, role) if role != Role::Admin => Err(EngineError::Forbidden(
            "Only administrators can register doctors.".into(),
        )),
        (Operation::RestockMedicine, Role::Patient) => {
            Err(EngineError::Forbidden("Patients cannot restock medicines.".into()))
        }
        (Operation::ViewFinance, Role::Patient) => {
            Err(EngineError::Forbidden("Patients cannot view hospital finances.".into()))
        }
        (Operation::FinalizeLabResult, Role::Patient) => {
            Err(EngineError::Forbidden("Patients cannot record test results.".into()))
        }
        (Operation::CompleteAppointment, Role::Patient) => {
            Err(EngineError::Forbidden("Patients cannot complete appointments.".into()))
        }
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════
// Password hashing (PBKDF2-SHA256)
// ═══════════════════════════════════════════════════════════

/// Base64 `(hash, salt)` for a new password.
pub fn hash_password(password: &str, iterations: u32) -> (String, String) {
    let salt = generate_salt();
    let hash = derive_hash(password, &salt, iterations);
    let engine = base64::engine::general_purpose::STANDARD;
    (engine.encode(hash), engine.encode(salt))
}

/// Constant-time comparison against a stored base64 hash. Malformed stored
/// values never verify.
pub fn verify_password(password: &str, stored_hash: &str, stored_salt: &str, iterations: u32) -> bool {
    let engine = base64::engine::general_purpose::STANDARD;
    let (Ok(expected), Ok(salt)) = (engine.decode(stored_hash), engine.decode(stored_salt)) else {
        return false;
    };
    let candidate = derive_hash(password, &salt, iterations);
    candidate[..].ct_eq(&expected[..]).unwrap_u8() == 1
}

fn derive_hash(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 1_000;

    fn ctx(role: Role) -> AuthContext {
        AuthContext::new(Uuid::new_v4(), role)
    }

    #[test]
    fn admin_cannot_sell() {
        let err = authorize(&ctx(Role::Admin), Operation::PharmacySale).unwrap_err();
        assert_eq!(err.to_string(), "Admins cannot perform sales.");
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(authorize(&ctx(Role::Pharmacist), Operation::PharmacySale).is_ok());
        assert!(authorize(&ctx(Role::Receptionist), Operation::PharmacySale).is_ok());
    }

    #[test]
    fn only_admin_registers_doctors() {
        assert!(authorize(&ctx(Role::Admin), Operation::RegisterDoctor).is_ok());
        assert!(authorize(&ctx(Role::Receptionist), Operation::RegisterDoctor).is_err());
    }

    #[test]
    fn patient_cannot_restock() {
        assert!(authorize(&ctx(Role::Patient), Operation::RestockMedicine).is_err());
        assert!(authorize(&ctx(Role::Pharmacist), Operation::RestockMedicine).is_ok());
    }

    #[test]
    fn patient_cannot_view_finance_or_record_results() {
        let patient = ctx(Role::Patient);
        let err = authorize(&patient, Operation::ViewFinance).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(authorize(&patient, Operation::FinalizeLabResult).is_err());
        assert!(authorize(&patient, Operation::BookAppointment).is_ok());
        assert!(authorize(&ctx(Role::Doctor), Operation::FinalizeLabResult).is_ok());
        assert!(authorize(&ctx(Role::Admin), Operation::ViewFinance).is_ok());
    }

    #[test]
    fn password_round_trip() {
        let (hash, salt) = hash_password("correct horse", FAST);
        assert!(verify_password("correct horse", &hash, &salt, FAST));
        assert!(!verify_password("wrong horse", &hash, &salt, FAST));
        assert!(!verify_password("correct horse", &hash, &salt, FAST + 1));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let (a, salt_a) = hash_password("same", FAST);
        let (b, salt_b) = hash_password("same", FAST);
        assert_ne!(salt_a, salt_b);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("x", "***", "***", FAST));
    }
}
