//! Inpatient admission and discharge.
//!
//! Admission settles its first day's charge immediately, unlike appointment
//! booking which defers payment: the room is allocated, the admission row
//! written, the invoice created and paid, all in one unit.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::availability::{binding_check, ResourceSelector};
use crate::billing::{apply_payment, create_invoice};
use crate::db::repository::{discharge_admission, get_admission, get_room, insert_admission};
use crate::error::EngineError;
use crate::models::enums::{AdmissionStatus, InvoiceStatus, PaymentMethod, PaymentStatus, RoomCategory};
use crate::models::{Admission, LineItem, Money, ReservationRef};
use crate::procedures::LedgerProcedures;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub patient_id: Uuid,
    pub category: RoomCategory,
    /// Settlement method; the configured default applies when absent.
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReceipt {
    pub admission_id: Uuid,
    pub room_number: String,
    pub invoice_id: Uuid,
    /// `None` when the room carries no charge.
    pub payment_id: Option<Uuid>,
    pub charge: Money,
    pub invoice_status: InvoiceStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DischargeReceipt {
    pub admission_id: Uuid,
    pub room_number: String,
    pub discharged_at: NaiveDateTime,
}

#[derive(Default)]
struct Admitted {
    room_number: String,
    admission_id: Uuid,
    invoice_id: Uuid,
    charge: Money,
    invoice_status: Option<InvoiceStatus>,
    payment_id: Option<Uuid>,
}

pub fn admit_patient(
    conn: &mut Connection,
    ctx: &AuthContext,
    procedures: &dyn LedgerProcedures,
    request: &AdmissionRequest,
    default_method: PaymentMethod,
    now: NaiveDateTime,
) -> Result<AdmissionReceipt, EngineError> {
    authorize(ctx, Operation::AdmitPatient)?;
    let method = request.payment_method.unwrap_or(default_method);
    let selector = ResourceSelector::Room {
        patient_id: request.patient_id,
        category: request.category,
    };

    let receipt = UnitOfWork::new("admit_patient")
        .step("allocate room", |tx, admitted: &mut Admitted| {
            let check = binding_check(tx, procedures, &selector)?;
            admitted.room_number = check.room_number.ok_or_else(|| {
                EngineError::Internal("room allocation succeeded without a room".into())
            })?;
            Ok(())
        })
        .step("create admission", |tx, admitted| {
            let admission = Admission {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                room_number: admitted.room_number.clone(),
                admitted_at: now,
                discharged_at: None,
                status: AdmissionStatus::Admitted,
                payment_status: PaymentStatus::Pending,
            };
            insert_admission(tx, &admission)?;
            admitted.admission_id = admission.id;
            Ok(())
        })
        .step("invoice first day", |tx, admitted| {
            let room = get_room(tx, &admitted.room_number)?
                .ok_or_else(|| EngineError::not_found("room", &admitted.room_number))?;
            let invoice = create_invoice(
                tx,
                ReservationRef::Admission(admitted.admission_id),
                &[LineItem::new(
                    format!("Room {} ({}), first day", room.room_number, room.category),
                    1,
                    room.charge_per_day,
                )],
                now,
            )?;
            admitted.invoice_id = invoice.id;
            admitted.charge = invoice.total_amount;
            admitted.invoice_status = Some(invoice.status);
            Ok(())
        })
        .step("settle first day", move |tx, admitted| {
            // A free room is settled by invoice creation.
            if admitted.charge.is_zero() {
                return Ok(());
            }
            let payment = apply_payment(tx, &admitted.invoice_id, admitted.charge, method, now)?;
            admitted.payment_id = Some(payment.payment_id);
            admitted.invoice_status = Some(payment.new_status);
            Ok(())
        })
        .execute_keyed(
            conn,
            Admitted::default(),
            request.idempotency_key.as_deref(),
            now,
            |admitted| AdmissionReceipt {
                admission_id: admitted.admission_id,
                room_number: admitted.room_number,
                invoice_id: admitted.invoice_id,
                payment_id: admitted.payment_id,
                charge: admitted.charge,
                invoice_status: admitted.invoice_status.unwrap_or(InvoiceStatus::Unpaid),
                payment_status: PaymentStatus::Paid,
            },
        )?;

    tracing::info!(
        admission_id = %receipt.admission_id,
        invoice_id = %receipt.invoice_id,
        room = %receipt.room_number,
        "Patient admitted"
    );
    Ok(receipt)
}

/// Close an active admission, freeing its room.
pub fn discharge_patient(
    conn: &mut Connection,
    ctx: &AuthContext,
    admission_id: &Uuid,
    now: NaiveDateTime,
) -> Result<DischargeReceipt, EngineError> {
    authorize(ctx, Operation::DischargePatient)?;

    let receipt = UnitOfWork::new("discharge_patient")
        .step("discharge", |tx, receipt: &mut Option<DischargeReceipt>| {
            let admission = get_admission(tx, admission_id)?
                .ok_or_else(|| EngineError::not_found("admission", admission_id))?;
            if discharge_admission(tx, admission_id, now)? == 0 {
                return Err(EngineError::ValidationRejected(format!(
                    "Admission {admission_id} is not active"
                )));
            }
            *receipt = Some(DischargeReceipt {
                admission_id: admission.id,
                room_number: admission.room_number,
                discharged_at: now,
            });
            Ok(())
        })
        .execute(conn, None)?
        .ok_or_else(|| EngineError::Internal("discharge produced no receipt".into()))?;

    tracing::info!(admission_id = %receipt.admission_id, room = %receipt.room_number, "Patient discharged");
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::billing::get_invoice_details;
    use crate::db::repository::{check_consistency, insert_patient, list_rollups};
    use crate::db::sqlite::open_database;
    use crate::models::Patient;
    use crate::procedures::SqliteProcedures;
    use crate::test_support::*;

    fn request(patient_id: Uuid, category: RoomCategory) -> AdmissionRequest {
        AdmissionRequest {
            patient_id,
            category,
            payment_method: None,
            idempotency_key: None,
        }
    }

    fn admit(fx: &mut Fixture, request: &AdmissionRequest) -> Result<AdmissionReceipt, EngineError> {
        let now = fx.now();
        let desk = fx.desk;
        let method = fx.config.admission_payment_method;
        admit_patient(&mut fx.conn, &desk, &fx.procedures, request, method, now)
    }

    fn extra_patient(fx: &Fixture) -> Uuid {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Jamal Hossain".into(),
            phone: None,
            user_id: None,
        };
        insert_patient(&fx.conn, &patient).unwrap();
        patient.id
    }

    #[test]
    fn admission_is_paid_immediately() {
        let mut fx = Fixture::new();
        let req = request(fx.patient.id, RoomCategory::Icu);
        let receipt = admit(&mut fx, &req).unwrap();

        assert_eq!(receipt.room_number, "ICU-101");
        assert_eq!(receipt.charge, Money::from_major(5000));
        assert_eq!(receipt.invoice_status, InvoiceStatus::Paid);
        assert!(receipt.payment_id.is_some());

        let admission = get_admission(&fx.conn, &receipt.admission_id).unwrap().unwrap();
        assert_eq!(admission.status, AdmissionStatus::Admitted);
        assert_eq!(admission.payment_status, PaymentStatus::Paid);

        let details = get_invoice_details(&fx.conn, &receipt.invoice_id).unwrap();
        assert_eq!(details.payments.len(), 1);
        assert_eq!(details.payments[0].method, PaymentMethod::Online);
        assert_eq!(details.balance_due, Money::ZERO);
        assert_eq!(list_rollups(&fx.conn).unwrap().len(), 3);
    }

    #[test]
    fn rooms_run_out_per_category() {
        let mut fx = Fixture::new();
        let (first_id, second_id, third_id) = (fx.patient.id, fx.second_patient.id, extra_patient(&fx));

        let first = admit(&mut fx, &request(first_id, RoomCategory::Icu)).unwrap();
        let second = admit(&mut fx, &request(second_id, RoomCategory::Icu)).unwrap();
        assert_eq!(first.room_number, "ICU-101");
        assert_eq!(second.room_number, "ICU-102");

        let err = admit(&mut fx, &request(third_id, RoomCategory::Icu)).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXHAUSTED");
        assert_eq!(err.to_string(), "No ICU rooms available");
        assert_eq!(count_rows(&fx.conn, "admissions"), 2);
        assert_eq!(count_rows(&fx.conn, "invoices"), 2);
    }

    #[test]
    fn patient_cannot_hold_two_rooms() {
        let mut fx = Fixture::new();
        let patient = fx.patient.id;
        admit(&mut fx, &request(patient, RoomCategory::Icu)).unwrap();
        let err = admit(&mut fx, &request(patient, RoomCategory::WardAc)).unwrap_err();
        assert_eq!(err.to_string(), "Patient is already admitted in room ICU-101");
    }

    #[test]
    fn consultation_rooms_are_not_beds() {
        let mut fx = Fixture::new();
        let req = request(fx.patient.id, RoomCategory::Consultation);
        let err = admit(&mut fx, &req).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXHAUSTED");
        assert_eq!(err.to_string(), "Consultation rooms cannot be used for admission");
    }

    #[test]
    fn occupied_room_from_port_rolls_back_everything() {
        let mut fx = Fixture::new();
        let first = request(fx.patient.id, RoomCategory::Icu);
        admit(&mut fx, &first).unwrap();

        let stale = FakeProcedures::with_room("ICU-101");
        let now = fx.now();
        let desk = fx.desk;
        let req = request(fx.second_patient.id, RoomCategory::Icu);
        let err = admit_patient(&mut fx.conn, &desk, &stale, &req, PaymentMethod::Cash, now)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_REJECTED");
        assert_eq!(count_rows(&fx.conn, "admissions"), 1);
        assert_eq!(count_rows(&fx.conn, "invoices"), 1);
        assert_eq!(count_rows(&fx.conn, "payments"), 1);
    }

    #[test]
    fn discharge_frees_the_room() {
        let mut fx = Fixture::new();
        let (patient, other) = (fx.patient.id, fx.second_patient.id);
        let first = admit(&mut fx, &request(patient, RoomCategory::WardNonAc)).unwrap();
        assert_eq!(first.room_number, "N-301");
        let err = admit(&mut fx, &request(other, RoomCategory::WardNonAc)).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXHAUSTED");

        let now = fx.now();
        let desk = fx.desk;
        let discharged = discharge_patient(&mut fx.conn, &desk, &first.admission_id, now).unwrap();
        assert_eq!(discharged.room_number, "N-301");

        let second = admit(&mut fx, &request(other, RoomCategory::WardNonAc)).unwrap();
        assert_eq!(second.room_number, "N-301");

        let again = discharge_patient(&mut fx.conn, &desk, &first.admission_id, now).unwrap_err();
        assert_eq!(again.code(), "VALIDATION_REJECTED");
        let missing = discharge_patient(&mut fx.conn, &desk, &Uuid::new_v4(), now).unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[test]
    fn explicit_method_overrides_default() {
        let mut fx = Fixture::new();
        let mut req = request(fx.patient.id, RoomCategory::WardAc);
        req.payment_method = Some(PaymentMethod::Insurance);
        let receipt = admit(&mut fx, &req).unwrap();
        let details = get_invoice_details(&fx.conn, &receipt.invoice_id).unwrap();
        assert_eq!(details.payments[0].method, PaymentMethod::Insurance);
    }

    #[test]
    fn last_icu_bed_goes_to_exactly_one_patient() {
        let (mut fx, _dir) = Fixture::on_disk();
        let first = extra_patient(&fx);
        let req = request(first, RoomCategory::Icu);
        assert_eq!(admit(&mut fx, &req).unwrap().room_number, "ICU-101");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [fx.patient.id, fx.second_patient.id]
            .into_iter()
            .map(|patient_id| {
                let barrier = Arc::clone(&barrier);
                let config = fx.config.clone();
                let desk = fx.desk;
                let now = fx.now();
                thread::spawn(move || {
                    let mut conn = open_database(&config.database_path, &config).unwrap();
                    let procedures = SqliteProcedures::new(&config);
                    let req = request(patient_id, RoomCategory::Icu);
                    barrier.wait();
                    admit_patient(
                        &mut conn,
                        &desk,
                        &procedures,
                        &req,
                        config.admission_payment_method,
                        now,
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let refused: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].room_number, "ICU-102");
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].code(), "CAPACITY_EXHAUSTED");
        assert_eq!(refused[0].to_string(), "No ICU rooms available");
        assert_eq!(count_rows(&fx.conn, "admissions"), 2);
        assert!(check_consistency(&fx.conn).unwrap().is_clean());
    }
}
