//! Pharmacy sales.
//!
//! A cart is reserved line by line with conditional decrements. If any line
//! is short, the whole sale rolls back and earlier lines get their stock
//! back. The order is invoiced unpaid and settled through billing.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::billing::create_invoice;
use crate::db::repository::{insert_pharmacy_order, insert_pharmacy_order_item, require_patient};
use crate::error::EngineError;
use crate::models::enums::{InvoiceStatus, PharmacyOrderStatus};
use crate::models::{LineItem, Money, PharmacyOrder, PharmacyOrderItem, ReservationRef};
use crate::stock::reserve_stock;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub medicine_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacySaleRequest {
    pub patient_id: Uuid,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacySaleReceipt {
    pub order_id: Uuid,
    pub invoice_id: Uuid,
    pub total: Money,
    pub status: PharmacyOrderStatus,
    pub invoice_status: InvoiceStatus,
}

#[derive(Default)]
struct Sale {
    /// Priced lines in cart order.
    priced: Vec<(CartLine, String, Money)>,
    total: Money,
    order_id: Uuid,
    invoice_id: Uuid,
    invoice_status: Option<InvoiceStatus>,
}

pub fn sell_medicines(
    conn: &mut Connection,
    ctx: &AuthContext,
    request: &PharmacySaleRequest,
    now: NaiveDateTime,
) -> Result<PharmacySaleReceipt, EngineError> {
    authorize(ctx, Operation::PharmacySale)?;
    if request.lines.is_empty() {
        return Err(EngineError::ValidationRejected("Cart is empty".into()));
    }

    let receipt = UnitOfWork::new("pharmacy_sale")
        .step("reserve stock", |tx, sale: &mut Sale| {
            require_patient(tx, &request.patient_id)?;
            for line in &request.lines {
                let medicine = reserve_stock(tx, &line.medicine_id, line.quantity)?;
                let subtotal = medicine
                    .unit_price
                    .checked_mul(line.quantity)
                    .and_then(|s| sale.total.checked_add(s))
                    .ok_or_else(|| EngineError::ValidationRejected("Cart total is too large".into()))?;
                sale.total = subtotal;
                sale.priced.push((*line, medicine.name, medicine.unit_price));
            }
            Ok(())
        })
        .step("create order", |tx, sale| {
            let order = PharmacyOrder {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                total_amount: sale.total,
                status: PharmacyOrderStatus::PendingPayment,
                created_at: now,
            };
            insert_pharmacy_order(tx, &order)?;
            sale.order_id = order.id;
            Ok(())
        })
        .step("record order items", |tx, sale| {
            for (line, _, unit_price) in &sale.priced {
                insert_pharmacy_order_item(
                    tx,
                    &PharmacyOrderItem {
                        id: Uuid::new_v4(),
                        order_id: sale.order_id,
                        medicine_id: line.medicine_id,
                        quantity: line.quantity,
                        unit_price: *unit_price,
                    },
                )?;
            }
            Ok(())
        })
        .step("invoice sale", |tx, sale| {
            let lines: Vec<LineItem> = sale
                .priced
                .iter()
                .map(|(line, name, unit_price)| LineItem::new(name.clone(), line.quantity, *unit_price))
                .collect();
            let invoice = create_invoice(tx, ReservationRef::PharmacySale(sale.order_id), &lines, now)?;
            sale.invoice_id = invoice.id;
            sale.invoice_status = Some(invoice.status);
            Ok(())
        })
        .execute_keyed(
            conn,
            Sale::default(),
            request.idempotency_key.as_deref(),
            now,
            |sale| {
                let invoice_status = sale.invoice_status.unwrap_or(InvoiceStatus::Unpaid);
                PharmacySaleReceipt {
                    order_id: sale.order_id,
                    invoice_id: sale.invoice_id,
                    total: sale.total,
                    status: if invoice_status == InvoiceStatus::Paid {
                        PharmacyOrderStatus::Paid
                    } else {
                        PharmacyOrderStatus::PendingPayment
                    },
                    invoice_status,
                }
            },
        )?;

    tracing::info!(
        order_id = %receipt.order_id,
        lines = request.lines.len(),
        total = %receipt.total,
        "Pharmacy sale recorded"
    );
    Ok(receipt)
}
