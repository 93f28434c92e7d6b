//! Stock Ledger: finite pharmacy inventory.
//!
//! Decrements are conditional updates (`stock >= qty`) so stock can never go
//! negative, even if two sales race past their display checks.

use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{authorize, AuthContext, Operation};
use crate::availability::insufficient_stock_message;
use crate::db::repository::{
    decrement_stock_if_available, get_medicine, increment_stock, insert_expense, list_medicines,
    require_medicine,
};
use crate::error::EngineError;
use crate::models::enums::ExpenseCategory;
use crate::models::{Expense, Medicine, Money};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockRequest {
    pub medicine_id: Uuid,
    pub quantity: u32,
    /// Purchase cost per unit.
    pub unit_cost: Money,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockReceipt {
    pub medicine_id: Uuid,
    pub new_stock: u32,
    pub expense_id: Uuid,
    pub expense_amount: Money,
}

/// Take `quantity` units out of stock. Returns the medicine as it was
/// before the decrement, for pricing.
pub fn reserve_stock(
    tx: &Transaction<'_>,
    medicine_id: &Uuid,
    quantity: u32,
) -> Result<Medicine, EngineError> {
    if quantity == 0 {
        return Err(EngineError::ValidationRejected(
            "Quantity must be at least 1".into(),
        ));
    }
    let medicine = get_medicine(tx, medicine_id)?
        .ok_or_else(|| EngineError::not_found("medicine", medicine_id))?;

    if decrement_stock_if_available(tx, medicine_id, quantity)? == 0 {
        return Err(EngineError::CapacityExhausted(insufficient_stock_message(
            &medicine.name,
            medicine.stock_quantity,
        )));
    }
    Ok(medicine)
}

/// Add stock and log the purchase as a restock expense, in one unit.
pub fn restock_medicine(
    conn: &mut Connection,
    ctx: &AuthContext,
    request: &RestockRequest,
    now: NaiveDateTime,
) -> Result<RestockReceipt, EngineError> {
    authorize(ctx, Operation::RestockMedicine)?;
    if request.quantity == 0 {
        return Err(EngineError::ValidationRejected(
            "Restock quantity must be at least 1".into(),
        ));
    }
    if request.unit_cost.is_negative() {
        return Err(EngineError::ValidationRejected(
            "Unit cost cannot be negative".into(),
        ));
    }
    let amount = request
        .unit_cost
        .checked_mul(request.quantity)
        .ok_or_else(|| EngineError::ValidationRejected("Restock cost is too large".into()))?;

    let medicine_id = request.medicine_id;
    let quantity = request.quantity;
    let receipt = UnitOfWork::new("restock_medicine")
        .step("increase stock", move |tx, receipt: &mut Option<RestockReceipt>| {
            let medicine = require_medicine(tx, &medicine_id)?;
            increment_stock(tx, &medicine_id, quantity)?;
            *receipt = Some(RestockReceipt {
                medicine_id,
                new_stock: medicine.stock_quantity.saturating_add(quantity),
                expense_id: Uuid::new_v4(),
                expense_amount: amount,
            });
            Ok(())
        })
        .step("log expense", move |tx, receipt| {
            let Some(receipt) = receipt.as_ref() else {
                return Err(EngineError::Internal("restock receipt missing".into()));
            };
            insert_expense(
                tx,
                &Expense {
                    id: receipt.expense_id,
                    category: ExpenseCategory::PharmacyRestock,
                    description: format!("Restock of {quantity} units"),
                    amount,
                    medicine_id: Some(medicine_id),
                    recorded_at: now,
                },
            )?;
            Ok(())
        })
        .execute_keyed(conn, None, request.idempotency_key.as_deref(), now, |r| r)?
        .ok_or_else(|| EngineError::Internal("restock produced no receipt".into()))?;

    tracing::info!(
        medicine_id = %receipt.medicine_id,
        quantity,
        new_stock = receipt.new_stock,
        expense = %receipt.expense_amount,
        "Medicine restocked"
    );
    Ok(receipt)
}

pub fn medicine_catalog(conn: &Connection) -> Result<Vec<Medicine>, EngineError> {
    Ok(list_medicines(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::sum_expenses_between;
    use crate::models::enums::Role;
    use crate::test_support::*;

    #[test]
    fn reserve_decrements_and_returns_price() {
        let mut fx = Fixture::new();
        let tx = fx.conn.transaction().unwrap();
        let medicine = reserve_stock(&tx, &fx.medicine.id, 5).unwrap();
        assert_eq!(medicine.unit_price, fx.medicine.unit_price);
        assert_eq!(require_medicine(&tx, &fx.medicine.id).unwrap().stock_quantity, 15);
    }

    #[test]
    fn reserve_refuses_more_than_stock() {
        let mut fx = Fixture::new();
        let tx = fx.conn.transaction().unwrap();
        let err = reserve_stock(&tx, &fx.scarce_medicine.id, 3).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXHAUSTED");
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Amoxicillin 250mg. Available: 2"
        );
        assert_eq!(require_medicine(&tx, &fx.scarce_medicine.id).unwrap().stock_quantity, 2);
    }

    #[test]
    fn reserve_exact_stock_reaches_zero() {
        let mut fx = Fixture::new();
        let tx = fx.conn.transaction().unwrap();
        reserve_stock(&tx, &fx.scarce_medicine.id, 2).unwrap();
        assert_eq!(require_medicine(&tx, &fx.scarce_medicine.id).unwrap().stock_quantity, 0);
        assert!(reserve_stock(&tx, &fx.scarce_medicine.id, 1).is_err());
    }

    #[test]
    fn reserve_unknown_medicine_is_not_found() {
        let mut fx = Fixture::new();
        let tx = fx.conn.transaction().unwrap();
        let err = reserve_stock(&tx, &Uuid::new_v4(), 1).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn restock_adds_stock_and_logs_expense() {
        let mut fx = Fixture::new();
        let request = RestockRequest {
            medicine_id: fx.scarce_medicine.id,
            quantity: 10,
            unit_cost: Money::from_minor(800),
            idempotency_key: None,
        };
        let now = fx.now();
        let pharmacist = fx.pharmacist;
        let receipt = restock_medicine(&mut fx.conn, &pharmacist, &request, now).unwrap();
        assert_eq!(receipt.new_stock, 12);
        assert_eq!(receipt.expense_amount, Money::from_major(80));
        assert_eq!(require_medicine(&fx.conn, &fx.scarce_medicine.id).unwrap().stock_quantity, 12);

        let spent = sum_expenses_between(&fx.conn, ExpenseCategory::PharmacyRestock, now, now).unwrap();
        assert_eq!(spent, Money::from_major(80));
    }

    #[test]
    fn patient_cannot_restock() {
        let mut fx = Fixture::new();
        let request = RestockRequest {
            medicine_id: fx.medicine.id,
            quantity: 1,
            unit_cost: Money::from_minor(100),
            idempotency_key: None,
        };
        let now = fx.now();
        let patient = AuthContext::new(Uuid::new_v4(), Role::Patient);
        let err = restock_medicine(&mut fx.conn, &patient, &request, now).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert_eq!(require_medicine(&fx.conn, &fx.medicine.id).unwrap().stock_quantity, 20);
    }

    #[test]
    fn restock_of_unknown_medicine_logs_nothing() {
        let mut fx = Fixture::new();
        let request = RestockRequest {
            medicine_id: Uuid::new_v4(),
            quantity: 5,
            unit_cost: Money::from_minor(100),
            idempotency_key: None,
        };
        let now = fx.now();
        let pharmacist = fx.pharmacist;
        let err = restock_medicine(&mut fx.conn, &pharmacist, &request, now).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let spent = sum_expenses_between(&fx.conn, ExpenseCategory::PharmacyRestock, now, now).unwrap();
        assert_eq!(spent, Money::ZERO);
    }

    #[test]
    fn catalog_lists_by_name() {
        let fx = Fixture::new();
        let names: Vec<_> = medicine_catalog(&fx.conn).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Amoxicillin 250mg", "Paracetamol 500mg"]);
    }
}
