//! Appointment booking: binding slot check, appointment row, consultation
//! invoice. Payment is deferred, so the appointment starts as
//! `Pending Payment` and is confirmed when its invoice is settled. A
//! confirmed visit is closed with `complete_appointment`.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::availability::{binding_check, ResourceSelector};
use crate::billing::create_invoice;
use crate::db::repository::{
    get_appointment, insert_appointment, require_doctor, require_patient, transition_appointment,
};
use crate::error::EngineError;
use crate::models::enums::{AppointmentStatus, InvoiceStatus};
use crate::models::{Appointment, LineItem, Money, ReservationRef};
use crate::procedures::LedgerProcedures;
use crate::unit_of_work::UnitOfWork;

use super::clean_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentReceipt {
    pub appointment_id: Uuid,
    pub invoice_id: Uuid,
    pub status: AppointmentStatus,
    pub invoice_status: InvoiceStatus,
    pub fee: Money,
    /// Bookings the doctor can still take that day, this one included.
    pub remaining_slots: i64,
}

#[derive(Default)]
struct Booked {
    remaining_before: i64,
    appointment_id: Uuid,
    invoice_id: Uuid,
    invoice_status: Option<InvoiceStatus>,
    fee: Money,
}

pub fn book_appointment(
    conn: &mut Connection,
    ctx: &AuthContext,
    procedures: &dyn LedgerProcedures,
    request: &AppointmentRequest,
    now: NaiveDateTime,
) -> Result<AppointmentReceipt, EngineError> {
    authorize(ctx, Operation::BookAppointment)?;
    let selector = ResourceSelector::DoctorSlot {
        doctor_id: request.doctor_id,
        at: request.scheduled_at,
    };

    let receipt = UnitOfWork::new("book_appointment")
        .step("binding slot check", |tx, booked: &mut Booked| {
            require_patient(tx, &request.patient_id)?;
            let check = binding_check(tx, procedures, &selector)?;
            booked.remaining_before = check.remaining_capacity;
            Ok(())
        })
        .step("create appointment", |tx, booked| {
            let appointment = Appointment {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                scheduled_at: request.scheduled_at,
                reason: clean_text(request.reason.as_deref()),
                status: AppointmentStatus::PendingPayment,
                created_at: now,
            };
            insert_appointment(tx, &appointment)?;
            booked.appointment_id = appointment.id;
            Ok(())
        })
        .step("invoice consultation fee", |tx, booked| {
            let doctor = require_doctor(tx, &request.doctor_id)?;
            let invoice = create_invoice(
                tx,
                ReservationRef::Appointment(booked.appointment_id),
                &[LineItem::new(
                    format!("Consultation with {}", doctor.full_name),
                    1,
                    doctor.consultation_fee,
                )],
                now,
            )?;
            booked.invoice_id = invoice.id;
            booked.invoice_status = Some(invoice.status);
            booked.fee = invoice.total_amount;
            Ok(())
        })
        .execute_keyed(
            conn,
            Booked::default(),
            request.idempotency_key.as_deref(),
            now,
            |booked| AppointmentReceipt {
                appointment_id: booked.appointment_id,
                invoice_id: booked.invoice_id,
                status: AppointmentStatus::PendingPayment,
                invoice_status: booked.invoice_status.unwrap_or(InvoiceStatus::Unpaid),
                fee: booked.fee,
                remaining_slots: (booked.remaining_before - 1).max(0),
            },
        )?;

    tracing::info!(
        appointment_id = %receipt.appointment_id,
        invoice_id = %receipt.invoice_id,
        doctor_id = %request.doctor_id,
        at = %request.scheduled_at,
        "Appointment booked"
    );
    Ok(receipt)
}

/// Close a paid visit: `Confirmed → Completed`.
pub fn complete_appointment(
    conn: &mut Connection,
    ctx: &AuthContext,
    appointment_id: &Uuid,
) -> Result<Appointment, EngineError> {
    authorize(ctx, Operation::CompleteAppointment)?;

    let appointment = UnitOfWork::new("complete_appointment")
        .step("complete", |tx, completed: &mut Option<Appointment>| {
            let appointment = get_appointment(tx, appointment_id)?
                .ok_or_else(|| EngineError::not_found("appointment", appointment_id))?;
            match appointment.status {
                AppointmentStatus::Confirmed => {}
                AppointmentStatus::PendingPayment => {
                    return Err(EngineError::ValidationRejected(
                        "Appointment must be paid before it can be completed".into(),
                    ))
                }
                AppointmentStatus::Completed => {
                    return Err(EngineError::ValidationRejected(
                        "Appointment is already Completed".into(),
                    ))
                }
            }
            transition_appointment(
                tx,
                appointment_id,
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
            )?;
            *completed = Some(Appointment {
                status: AppointmentStatus::Completed,
                ..appointment
            });
            Ok(())
        })
        .execute(conn, None)?
        .ok_or_else(|| EngineError::not_found("appointment", appointment_id))?;

    tracing::info!(appointment_id = %appointment_id, "Appointment completed");
    Ok(appointment)
}
