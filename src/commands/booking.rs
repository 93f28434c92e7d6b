//! Appointment and admission commands.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::authorization::AuthContext;
use crate::availability::{self, AvailabilityCheck, ResourceSelector};
use crate::booking::{
    self, AdmissionReceipt, AdmissionRequest, AppointmentReceipt, AppointmentRequest,
    DischargeReceipt,
};
use crate::core_state::CoreState;
use crate::db::repository::{self, AppointmentFilter, AppointmentListing, RoomCategoryStats};
use crate::models::Appointment;
use crate::procedures::TimeSlot;

use super::{read, write, CommandResponse};

/// Free slots for a doctor on a date. Advisory only.
pub fn available_slots(
    state: &CoreState,
    doctor_id: Uuid,
    date: NaiveDate,
) -> CommandResponse<Vec<TimeSlot>> {
    read(state, |conn| {
        state
            .procedures()
            .compute_available_slots(conn, &doctor_id, date)
    })
    .into()
}

/// Display-time availability for any bookable resource.
pub fn check_availability(
    state: &CoreState,
    selector: ResourceSelector,
) -> CommandResponse<AvailabilityCheck> {
    read(state, |conn| {
        availability::display_check(conn, state.procedures(), &selector)
    })
    .into()
}

pub fn room_availability(state: &CoreState) -> CommandResponse<Vec<RoomCategoryStats>> {
    read(state, availability::room_availability_stats).into()
}

pub fn book_appointment(
    state: &CoreState,
    ctx: &AuthContext,
    request: AppointmentRequest,
) -> CommandResponse<AppointmentReceipt> {
    write(state, |conn| {
        booking::book_appointment(conn, ctx, state.procedures(), &request, state.now())
    })
    .into()
}

/// Appointments for the dashboard, latest first, with invoice status.
pub fn list_appointments(
    state: &CoreState,
    filter: AppointmentFilter,
) -> CommandResponse<Vec<AppointmentListing>> {
    let limit = state.config.appointments_limit;
    read(state, |conn| {
        Ok(repository::list_appointments(conn, filter, state.now(), limit)?)
    })
    .into()
}

pub fn complete_appointment(
    state: &CoreState,
    ctx: &AuthContext,
    appointment_id: Uuid,
) -> CommandResponse<Appointment> {
    write(state, |conn| booking::complete_appointment(conn, ctx, &appointment_id)).into()
}

/// Admit and settle the first day with the configured payment method
/// unless the request names one.
pub fn admit_patient(
    state: &CoreState,
    ctx: &AuthContext,
    request: AdmissionRequest,
) -> CommandResponse<AdmissionReceipt> {
    let default_method = state.config.admission_payment_method;
    write(state, |conn| {
        booking::admit_patient(
            conn,
            ctx,
            state.procedures(),
            &request,
            default_method,
            state.now(),
        )
    })
    .into()
}

pub fn discharge_patient(
    state: &CoreState,
    ctx: &AuthContext,
    admission_id: Uuid,
) -> CommandResponse<DischargeReceipt> {
    write(state, |conn| {
        booking::discharge_patient(conn, ctx, &admission_id, state.now())
    })
    .into()
}
