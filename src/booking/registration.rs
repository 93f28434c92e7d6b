//! Patient and doctor registration.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, hash_password, AuthContext, Operation};
use crate::db::repository::{get_credentials_by_email, insert_patient, insert_user};
use crate::error::EngineError;
use crate::models::enums::Role;
use crate::models::{Patient, UserAccount};
use crate::procedures::{LedgerProcedures, NewDoctor};
use crate::unit_of_work::UnitOfWork;

use super::clean_text;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Deserialize)]
pub struct PatientLogin {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Deserialize)]
pub struct NewPatient {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Creates a `Patient` login linked to the record.
    #[serde(default)]
    pub login: Option<PatientLogin>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRegistration {
    pub patient_id: Uuid,
    pub user_id: Option<Uuid>,
}

fn validate_login(login: &PatientLogin) -> Result<String, EngineError> {
    let email = login.email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(EngineError::ValidationRejected("Invalid email address".into()));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(EngineError::ValidationRejected("Invalid email address".into()));
    }
    if login.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(EngineError::ValidationRejected(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(email)
}

/// Create a patient record, with an optional login, in one unit.
pub fn register_patient(
    conn: &mut Connection,
    ctx: &AuthContext,
    request: &NewPatient,
    password_iterations: u32,
    now: NaiveDateTime,
) -> Result<PatientRegistration, EngineError> {
    authorize(ctx, Operation::RegisterPatient)?;
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(EngineError::ValidationRejected("Patient name is required".into()));
    }
    let email = request.login.as_ref().map(validate_login).transpose()?;

    let registration = UnitOfWork::new("register_patient")
        .step("create login", |tx, reg: &mut PatientRegistration| {
            let (Some(email), Some(login)) = (&email, &request.login) else {
                return Ok(());
            };
            if get_credentials_by_email(tx, email)?.is_some() {
                return Err(EngineError::ValidationRejected(format!(
                    "Email {email} is already registered"
                )));
            }
            let account = UserAccount {
                id: Uuid::new_v4(),
                email: email.clone(),
                role: Role::Patient,
            };
            let (hash, salt) = hash_password(&login.password, password_iterations);
            insert_user(tx, &account, &hash, &salt)?;
            reg.user_id = Some(account.id);
            Ok(())
        })
        .step("create patient", |tx, reg| {
            let patient = Patient {
                id: Uuid::new_v4(),
                full_name: full_name.to_string(),
                phone: clean_text(request.phone.as_deref()),
                user_id: reg.user_id,
            };
            insert_patient(tx, &patient)?;
            reg.patient_id = patient.id;
            Ok(())
        })
        .execute_keyed(
            conn,
            PatientRegistration {
                patient_id: Uuid::nil(),
                user_id: None,
            },
            request.idempotency_key.as_deref(),
            now,
            |reg| reg,
        )?;

    tracing::info!(
        patient_id = %registration.patient_id,
        with_login = registration.user_id.is_some(),
        "Patient registered"
    );
    Ok(registration)
}

/// Register a doctor through the store's validation procedure. An invalid
/// license or duplicate is surfaced with the store's message.
pub fn register_doctor(
    conn: &mut Connection,
    ctx: &AuthContext,
    procedures: &dyn LedgerProcedures,
    request: &NewDoctor,
) -> Result<Uuid, EngineError> {
    authorize(ctx, Operation::RegisterDoctor)?;

    let doctor_id = UnitOfWork::new("register_doctor")
        .step("validate and create doctor", |tx, id: &mut Uuid| {
            *id = procedures.validate_and_create_doctor(tx, request)?;
            Ok(())
        })
        .execute(conn, Uuid::nil())?;

    tracing::info!(doctor_id = %doctor_id, license = %request.license_number, "Doctor registered");
    Ok(doctor_id)
}
