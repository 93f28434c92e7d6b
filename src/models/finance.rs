use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::ReportPeriod;
use super::money::Money;

/// Where a revenue line comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "source", content = "department", rename_all = "snake_case")]
pub enum RevenueSource {
    /// Paid consultations, attributed to the doctor's department.
    Consultation(String),
    Inpatient,
    Laboratory,
    PharmacySales,
    /// Restock expenses, always reported as a negative amount.
    PharmacyRestock,
}

impl RevenueSource {
    pub fn label(&self) -> String {
        match self {
            Self::Consultation(department) => department.clone(),
            Self::Inpatient => "Inpatient".into(),
            Self::Laboratory => "Laboratory".into(),
            Self::PharmacySales => "Pharmacy Sales".into(),
            Self::PharmacyRestock => "Pharmacy (Restock Expenses)".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRevenue {
    pub source: RevenueSource,
    pub label: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Net of restock expenses.
    pub total: Money,
    pub by_source: Vec<SourceRevenue>,
}

impl RevenueReport {
    pub fn amount_for(&self, source: &RevenueSource) -> Money {
        self.by_source
            .iter()
            .filter(|line| &line.source == source)
            .map(|line| line.amount)
            .sum()
    }

    /// Pharmacy sales minus restock expenses.
    pub fn pharmacy_net(&self) -> Money {
        self.amount_for(&RevenueSource::PharmacySales)
            + self.amount_for(&RevenueSource::PharmacyRestock)
    }
}

/// Bucket label for a payment time: `2025`, `2025-01`, or ISO week `2025-W01`.
pub fn period_label(period: ReportPeriod, at: NaiveDateTime) -> String {
    match period {
        ReportPeriod::Yearly => at.format("%Y").to_string(),
        ReportPeriod::Monthly => at.format("%Y-%m").to_string(),
        ReportPeriod::Weekly => at.format("%G-W%V").to_string(),
    }
}

/// Every period a payment lands in.
pub const ROLLUP_PERIODS: [ReportPeriod; 3] =
    [ReportPeriod::Yearly, ReportPeriod::Monthly, ReportPeriod::Weekly];

/// Rollup totals rebuilt from `(applied_amount, paid_at)` history.
pub fn rollups_from_payments(
    payments: &[(Money, NaiveDateTime)],
) -> BTreeMap<(ReportPeriod, String), Money> {
    let mut buckets = BTreeMap::new();
    for (amount, at) in payments {
        for period in ROLLUP_PERIODS {
            *buckets
                .entry((period, period_label(period, *at)))
                .or_insert(Money::ZERO) += *amount;
        }
    }
    buckets
}

/// One row of the denormalized `financial_reports` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupEntry {
    pub period: ReportPeriod,
    pub label: String,
    pub total_revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupDrift {
    pub period: ReportPeriod,
    pub label: String,
    pub stored: Money,
    pub recomputed: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub active_doctors: i64,
    pub today_appointments: i64,
    pub active_admissions: i64,
    pub pending_revenue: Money,
    pub generated_at: NaiveDateTime,
}
