//! Invoice & Payment Ledger.
//!
//! Invoices are created once, from exactly one reservation, with a total
//! computed from their line items. Payments are append-only; invoice status
//! is derived from the applied payment sum and only ever moves
//! Unpaid → Paid. The transition settles the owning reservation in the same
//! transaction.

use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::clock::truncate_to_seconds;
use crate::db::repository::{
    get_invoice_by_owner, get_invoice_patient, get_line_items, insert_invoice, insert_line_item,
    insert_payment, list_payments_for_invoice, mark_invoice_paid, require_invoice,
    set_admission_payment_status, set_pharmacy_order_status, set_test_order_payment_status,
    sum_applied_for_invoice, transition_appointment,
};
use crate::error::EngineError;
use crate::finance::record_payment_rollup;
use crate::models::enums::{
    AppointmentStatus, InvoiceStatus, PaymentMethod, PaymentStatus, PharmacyOrderStatus,
};
use crate::models::{
    derive_invoice_status, Invoice, InvoiceDetails, LineItem, Money, Payment, ReservationRef,
    UnpaidInvoice,
};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Money,
    /// Portion of `amount` that reduced the balance.
    pub applied_amount: Money,
    pub total_paid: Money,
    pub new_status: InvoiceStatus,
    /// True only for the payment that moved the invoice to Paid.
    pub transitioned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// ─── Ledger primitives (run inside a unit of work) ─────────────────────────

/// Create the invoice for `owner`. The total is the sum of the lines; a
/// malformed line set is a programming error, not a business refusal.
pub fn create_invoice(
    tx: &Transaction<'_>,
    owner: ReservationRef,
    lines: &[LineItem],
    now: NaiveDateTime,
) -> Result<Invoice, EngineError> {
    let now = truncate_to_seconds(now);
    if lines.is_empty() {
        return Err(EngineError::Internal(format!(
            "invoice for {} {} has no line items",
            owner.kind(),
            owner.id()
        )));
    }

    let mut total = Money::ZERO;
    for line in lines {
        if line.quantity == 0 || line.unit_price.is_negative() {
            return Err(EngineError::Internal(format!(
                "invalid invoice line '{}': quantity {} at {}",
                line.description, line.quantity, line.unit_price
            )));
        }
        total = line
            .line_total()
            .and_then(|amount| total.checked_add(amount))
            .ok_or_else(|| EngineError::Internal("invoice total overflows".into()))?;
    }

    if get_invoice_by_owner(tx, &owner)?.is_some() {
        return Err(EngineError::Internal(format!(
            "{} {} already has an invoice",
            owner.kind(),
            owner.id()
        )));
    }

    // A zero total is settled at creation.
    let status = derive_invoice_status(total, Money::ZERO);
    let invoice = Invoice {
        id: Uuid::new_v4(),
        owner,
        total_amount: total,
        status,
        created_at: now,
        paid_at: (status == InvoiceStatus::Paid).then_some(now),
    };
    insert_invoice(tx, &invoice)?;
    for (position, line) in lines.iter().enumerate() {
        insert_line_item(tx, &invoice.id, position, line)?;
    }
    if status == InvoiceStatus::Paid {
        settle_owner(tx, &owner)?;
    }

    tracing::debug!(
        invoice_id = %invoice.id,
        owner = owner.kind(),
        owner_id = %owner.id(),
        total = %total,
        "Invoice created"
    );
    Ok(invoice)
}

/// Append a payment and derive the invoice's new status.
pub fn apply_payment(
    tx: &Transaction<'_>,
    invoice_id: &Uuid,
    amount: Money,
    method: PaymentMethod,
    now: NaiveDateTime,
) -> Result<PaymentReceipt, EngineError> {
    let now = truncate_to_seconds(now);
    if amount <= Money::ZERO {
        return Err(EngineError::ValidationRejected(
            "Payment amount must be positive".into(),
        ));
    }

    let invoice = require_invoice(tx, invoice_id)?;
    let paid_before = sum_applied_for_invoice(tx, invoice_id)?;
    let outstanding = invoice.total_amount.saturating_sub_floor(paid_before);
    let applied = amount.min(outstanding);

    let payment = Payment {
        id: Uuid::new_v4(),
        invoice_id: *invoice_id,
        amount,
        applied_amount: applied,
        method,
        paid_at: now,
    };
    insert_payment(tx, &payment)?;
    if !applied.is_zero() {
        record_payment_rollup(tx, applied, now)?;
    }

    let total_paid = paid_before + applied;
    let new_status = derive_invoice_status(invoice.total_amount, total_paid);
    let transitioned =
        invoice.status == InvoiceStatus::Unpaid && new_status == InvoiceStatus::Paid;
    if transitioned {
        mark_invoice_paid(tx, invoice_id, now)?;
        settle_owner(tx, &invoice.owner)?;
        tracing::info!(invoice_id = %invoice_id, owner = invoice.owner.kind(), "Invoice settled");
    }

    Ok(PaymentReceipt {
        payment_id: payment.id,
        invoice_id: *invoice_id,
        amount,
        applied_amount: applied,
        total_paid,
        // A Paid invoice never reopens.
        new_status: if invoice.status == InvoiceStatus::Paid {
            InvoiceStatus::Paid
        } else {
            new_status
        },
        transitioned,
    })
}

/// Propagate settlement to the reservation that owns the invoice.
fn settle_owner(conn: &Connection, owner: &ReservationRef) -> Result<(), EngineError> {
    match owner {
        ReservationRef::Appointment(id) => {
            transition_appointment(
                conn,
                id,
                AppointmentStatus::PendingPayment,
                AppointmentStatus::Confirmed,
            )?;
        }
        ReservationRef::Admission(id) => {
            set_admission_payment_status(conn, id, PaymentStatus::Paid)?;
        }
        ReservationRef::TestOrder(id) => {
            set_test_order_payment_status(conn, id, PaymentStatus::Paid)?;
        }
        ReservationRef::PharmacySale(id) => {
            set_pharmacy_order_status(conn, id, PharmacyOrderStatus::Paid)?;
        }
    }
    Ok(())
}

// ─── Workflows ─────────────────────────────────────────────────────────────

/// Take a payment against an invoice as its own unit of work.
pub fn process_payment(
    conn: &mut Connection,
    ctx: &AuthContext,
    request: &PaymentRequest,
    now: NaiveDateTime,
) -> Result<PaymentReceipt, EngineError> {
    authorize(ctx, Operation::ProcessPayment)?;

    let receipt = UnitOfWork::new("process_payment")
        .step("apply payment", |tx, receipt: &mut Option<PaymentReceipt>| {
            *receipt = Some(apply_payment(
                tx,
                &request.invoice_id,
                request.amount,
                request.method,
                now,
            )?);
            Ok(())
        })
        .execute_keyed(
            conn,
            None,
            request.idempotency_key.as_deref(),
            now,
            |receipt| receipt,
        )?;

    receipt.ok_or_else(|| EngineError::Internal("payment step produced no receipt".into()))
}

pub fn get_invoice_details(conn: &Connection, invoice_id: &Uuid) -> Result<InvoiceDetails, EngineError> {
    let invoice = require_invoice(conn, invoice_id)?;
    let (patient_id, patient_name) = get_invoice_patient(conn, invoice_id)?;
    let items = get_line_items(conn, invoice_id)?;
    let payments = list_payments_for_invoice(conn, invoice_id)?;
    let amount_paid: Money = payments.iter().map(|p| p.applied_amount).sum();
    let balance_due = invoice.total_amount.saturating_sub_floor(amount_paid);

    Ok(InvoiceDetails {
        invoice,
        patient_id,
        patient_name,
        items,
        payments,
        amount_paid,
        balance_due,
    })
}

pub fn list_unpaid_invoices(conn: &Connection) -> Result<Vec<UnpaidInvoice>, EngineError> {
    Ok(crate::db::repository::list_unpaid_invoices(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{get_appointment, list_rollups};
    use crate::finance::revenue_between;
    use crate::test_support::*;

    fn invoice_for_pending_appointment(fx: &mut Fixture, fee: Money) -> (Uuid, Uuid) {
        let appointment_id = fx.insert_pending_appointment(slot_at(10, 0));
        let now = fx.now();
        let tx = fx.conn.transaction().unwrap();
        let invoice = create_invoice(
            &tx,
            ReservationRef::Appointment(appointment_id),
            &[LineItem::new("Consultation", 1, fee)],
            now,
        )
        .unwrap();
        tx.commit().unwrap();
        (appointment_id, invoice.id)
    }

    fn pay(fx: &mut Fixture, invoice_id: Uuid, amount: Money) -> PaymentReceipt {
        let request = PaymentRequest {
            invoice_id,
            amount,
            method: PaymentMethod::Cash,
            idempotency_key: None,
        };
        let now = fx.now();
        let desk = fx.desk;
        process_payment(&mut fx.conn, &desk, &request, now).unwrap()
    }

    #[test]
    fn total_is_sum_of_lines() {
        let mut fx = Fixture::new();
        let order_id = fx.insert_pending_pharmacy_order();
        let now = fx.now();
        let tx = fx.conn.transaction().unwrap();
        let invoice = create_invoice(
            &tx,
            ReservationRef::PharmacySale(order_id),
            &[
                LineItem::new("Paracetamol", 3, Money::from_minor(250)),
                LineItem::new("Syrup", 1, Money::from_minor(1200)),
            ],
            now,
        )
        .unwrap();
        assert_eq!(invoice.total_amount, Money::from_minor(1950));
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(get_line_items(&tx, &invoice.id).unwrap().len(), 2);
    }

    #[test]
    fn empty_or_second_invoice_is_a_programming_error() {
        let mut fx = Fixture::new();
        let appointment_id = fx.insert_pending_appointment(slot_at(9, 0));
        let now = fx.now();
        let tx = fx.conn.transaction().unwrap();
        let owner = ReservationRef::Appointment(appointment_id);

        let err = create_invoice(&tx, owner, &[], now).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let line = [LineItem::new("Consultation", 1, Money::from_major(10))];
        create_invoice(&tx, owner, &line, now).unwrap();
        let dup = create_invoice(&tx, owner, &line, now).unwrap_err();
        assert!(dup.to_string().contains("already has an invoice"));
    }

    #[test]
    fn exact_payment_transitions_once_and_confirms_appointment() {
        let mut fx = Fixture::new();
        let fee = Money::from_major(1000);
        let (appointment_id, invoice_id) = invoice_for_pending_appointment(&mut fx, fee);

        let first = pay(&mut fx, invoice_id, fee);
        assert!(first.transitioned);
        assert_eq!(first.new_status, InvoiceStatus::Paid);
        let appt = get_appointment(&fx.conn, &appointment_id).unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Confirmed);

        let second = pay(&mut fx, invoice_id, fee);
        assert!(!second.transitioned);
        assert_eq!(second.new_status, InvoiceStatus::Paid);
        assert_eq!(second.applied_amount, Money::ZERO);
        assert_eq!(second.total_paid, fee);

        let report = revenue_between(&fx.conn, booking_day(), booking_day()).unwrap();
        assert_eq!(report.total, fee);
        let yearly = list_rollups(&fx.conn)
            .unwrap()
            .into_iter()
            .find(|r| r.label == "2025")
            .unwrap();
        assert_eq!(yearly.total_revenue, fee);
    }

    #[test]
    fn last_second_payment_counts_for_its_day() {
        let mut fx = Fixture::new();
        let fee = Money::from_major(1000);
        let (_, invoice_id) = invoice_for_pending_appointment(&mut fx, fee);
        let late = booking_day().and_hms_milli_opt(23, 59, 59, 500).unwrap();
        let request = PaymentRequest {
            invoice_id,
            amount: fee,
            method: PaymentMethod::Cash,
            idempotency_key: None,
        };
        let desk = fx.desk;
        process_payment(&mut fx.conn, &desk, &request, late).unwrap();

        let details = get_invoice_details(&fx.conn, &invoice_id).unwrap();
        assert_eq!(details.payments[0].paid_at, slot_at(23, 59) + chrono::Duration::seconds(59));
        let day = revenue_between(&fx.conn, booking_day(), booking_day()).unwrap();
        assert_eq!(day.total, fee);
        let next = booking_day().succ_opt().unwrap();
        assert_eq!(revenue_between(&fx.conn, next, next).unwrap().total, Money::ZERO);
        assert!(crate::finance::verify_rollups(&fx.conn).unwrap().is_empty());
    }

    #[test]
    fn partial_payments_accumulate() {
        let mut fx = Fixture::new();
        let fee = Money::from_major(1000);
        let (_, invoice_id) = invoice_for_pending_appointment(&mut fx, fee);

        let first = pay(&mut fx, invoice_id, Money::from_major(400));
        assert_eq!(first.new_status, InvoiceStatus::Unpaid);
        let second = pay(&mut fx, invoice_id, Money::from_major(700));
        assert!(second.transitioned);
        assert_eq!(second.applied_amount, Money::from_major(600));

        let details = get_invoice_details(&fx.conn, &invoice_id).unwrap();
        assert_eq!(details.payments.len(), 2);
        assert_eq!(details.amount_paid, fee);
        assert_eq!(details.balance_due, Money::ZERO);
        assert_eq!(details.patient_id, fx.patient.id);
    }

    #[test]
    fn non_positive_payment_rejected_without_side_effects() {
        let mut fx = Fixture::new();
        let (_, invoice_id) = invoice_for_pending_appointment(&mut fx, Money::from_major(100));
        let request = PaymentRequest {
            invoice_id,
            amount: Money::ZERO,
            method: PaymentMethod::Card,
            idempotency_key: None,
        };
        let now = fx.now();
        let desk = fx.desk;
        let err = process_payment(&mut fx.conn, &desk, &request, now).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_REJECTED");
        assert!(get_invoice_details(&fx.conn, &invoice_id).unwrap().payments.is_empty());
    }

    #[test]
    fn unknown_invoice_is_not_found() {
        let mut fx = Fixture::new();
        let request = PaymentRequest {
            invoice_id: Uuid::new_v4(),
            amount: Money::from_major(1),
            method: PaymentMethod::Cash,
            idempotency_key: None,
        };
        let now = fx.now();
        let desk = fx.desk;
        let err = process_payment(&mut fx.conn, &desk, &request, now).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn keyed_payment_is_not_applied_twice() {
        let mut fx = Fixture::new();
        let (_, invoice_id) = invoice_for_pending_appointment(&mut fx, Money::from_major(1000));
        let request = PaymentRequest {
            invoice_id,
            amount: Money::from_major(300),
            method: PaymentMethod::Card,
            idempotency_key: Some("pay-7".into()),
        };
        let now = fx.now();
        let desk = fx.desk;
        let first = process_payment(&mut fx.conn, &desk, &request, now).unwrap();
        let replay = process_payment(&mut fx.conn, &desk, &request, now).unwrap();
        assert_eq!(first, replay);

        let details = get_invoice_details(&fx.conn, &invoice_id).unwrap();
        assert_eq!(details.payments.len(), 1);
        assert_eq!(details.amount_paid, Money::from_major(300));
    }

    #[test]
    fn unpaid_list_names_patient_and_provider() {
        let mut fx = Fixture::new();
        let (_, invoice_id) = invoice_for_pending_appointment(&mut fx, Money::from_major(1000));
        let unpaid = list_unpaid_invoices(&fx.conn).unwrap();
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].invoice_id, invoice_id);
        assert_eq!(unpaid[0].patient_name, fx.patient.full_name);
        assert_eq!(unpaid[0].provider, fx.doctor.full_name);

        pay(&mut fx, invoice_id, Money::from_major(1000));
        assert!(list_unpaid_invoices(&fx.conn).unwrap().is_empty());
    }
}
