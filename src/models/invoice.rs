use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{InvoiceStatus, PaymentMethod};
use super::money::Money;
use super::reservation::ReservationRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// `quantity × unit_price`, `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner: ReservationRef,
    pub total_amount: Money,
    pub status: InvoiceStatus,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Money,
    /// Portion of `amount` that went toward the outstanding balance.
    pub applied_amount: Money,
    pub method: PaymentMethod,
    pub paid_at: NaiveDateTime,
}

/// Invoice header with its lines and payment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    pub amount_paid: Money,
    pub balance_due: Money,
}

/// Row of the unpaid-invoice listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpaidInvoice {
    pub invoice_id: Uuid,
    pub owner: ReservationRef,
    pub total_amount: Money,
    pub patient_name: String,
    /// Doctor name for appointments, otherwise the service desk.
    pub provider: String,
    pub created_at: NaiveDateTime,
}

/// Status derivation shared by creation and payment application.
pub fn derive_invoice_status(total: Money, paid: Money) -> InvoiceStatus {
    if paid >= total {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Unpaid
    }
}
