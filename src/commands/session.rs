//! Sign-in and registration commands.

use uuid::Uuid;

use crate::authorization::AuthContext;
use crate::booking::{self, NewPatient, PatientRegistration};
use crate::core_state::CoreState;
use crate::error::EngineError;
use crate::procedures::NewDoctor;

use super::{read, write, CommandResponse};

/// Verify credentials and hand back the context the caller passes into
/// every later command.
pub fn login(state: &CoreState, email: &str, password: &str) -> CommandResponse<AuthContext> {
    read(state, |conn| {
        let check = state.procedures().verify_credentials(conn, email, password)?;
        match (check.valid, check.user_id, check.role) {
            (true, Some(user_id), Some(role)) => {
                tracing::info!(user_id = %user_id, role = %role, "Signed in");
                Ok(AuthContext::new(user_id, role))
            }
            _ => Err(EngineError::Forbidden("Invalid email or password".into())),
        }
    })
    .into()
}

pub fn register_patient(
    state: &CoreState,
    ctx: &AuthContext,
    request: NewPatient,
) -> CommandResponse<PatientRegistration> {
    let iterations = state.config.password_iterations;
    write(state, |conn| {
        booking::register_patient(conn, ctx, &request, iterations, state.now())
    })
    .into()
}

pub fn register_doctor(
    state: &CoreState,
    ctx: &AuthContext,
    request: NewDoctor,
) -> CommandResponse<Uuid> {
    write(state, |conn| {
        booking::register_doctor(conn, ctx, state.procedures(), &request)
    })
    .into()
}
