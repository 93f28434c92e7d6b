use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    AdmissionStatus, AppointmentStatus, PaymentStatus, PharmacyOrderStatus, TestStatus,
};
use super::money::Money;
use crate::db::DatabaseError;

/// The one reservation an invoice belongs to.
///
/// Stored as four mutually exclusive nullable columns on `invoices`; this
/// type is the only way the crate builds or reads those columns, so an
/// invoice can never reference zero or several owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReservationRef {
    Appointment(Uuid),
    Admission(Uuid),
    TestOrder(Uuid),
    PharmacySale(Uuid),
}

/// Column values for `invoices(appointment_id, admission_id, test_order_id, pharmacy_order_id)`.
pub(crate) type OwnerColumns = [Option<String>; 4];

impl ReservationRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Appointment(id)
            | Self::Admission(id)
            | Self::TestOrder(id)
            | Self::PharmacySale(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Appointment(_) => "appointment",
            Self::Admission(_) => "admission",
            Self::TestOrder(_) => "test_order",
            Self::PharmacySale(_) => "pharmacy_sale",
        }
    }

    pub(crate) fn owner_columns(&self) -> OwnerColumns {
        let id = Some(self.id().to_string());
        match self {
            Self::Appointment(_) => [id, None, None, None],
            Self::Admission(_) => [None, id, None, None],
            Self::TestOrder(_) => [None, None, id, None],
            Self::PharmacySale(_) => [None, None, None, id],
        }
    }

    pub(crate) fn from_owner_columns(columns: OwnerColumns) -> Result<Self, DatabaseError> {
        let present: Vec<(usize, String)> = columns
            .into_iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|v| (i, v)))
            .collect();

        let [(index, raw)] = <[(usize, String); 1]>::try_from(present).map_err(|found| {
            DatabaseError::ConstraintViolation(format!(
                "invoice must reference exactly one reservation, found {}",
                found.len()
            ))
        })?;

        let id = Uuid::parse_str(&raw).map_err(|_| DatabaseError::InvalidValue {
            field: "invoice owner id".into(),
            value: raw.clone(),
        })?;

        Ok(match index {
            0 => Self::Appointment(id),
            1 => Self::Admission(id),
            2 => Self::TestOrder(id),
            _ => Self::PharmacySale(id),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub room_number: String,
    pub admitted_at: NaiveDateTime,
    pub discharged_at: Option<NaiveDateTime>,
    pub status: AdmissionStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTestOrder {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub test_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub status: TestStatus,
    pub payment_status: PaymentStatus,
    pub scheduled_at: Option<NaiveDateTime>,
    pub scheduled_end_at: Option<NaiveDateTime>,
    pub result_summary: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacyOrder {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub total_amount: Money,
    pub status: PharmacyOrderStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacyOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub medicine_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_columns_place_id_in_variant_slot() {
        let id = Uuid::new_v4();
        let cols = ReservationRef::TestOrder(id).owner_columns();
        assert_eq!(cols[2].as_deref(), Some(id.to_string().as_str()));
        assert!(cols[0].is_none() && cols[1].is_none() && cols[3].is_none());
    }

    #[test]
    fn from_owner_columns_inverts_owner_columns() {
        for owner in [
            ReservationRef::Appointment(Uuid::new_v4()),
            ReservationRef::Admission(Uuid::new_v4()),
            ReservationRef::TestOrder(Uuid::new_v4()),
            ReservationRef::PharmacySale(Uuid::new_v4()),
        ] {
            let back = ReservationRef::from_owner_columns(owner.owner_columns()).unwrap();
            assert_eq!(back, owner);
        }
    }

    #[test]
    fn from_owner_columns_rejects_zero_or_many_owners() {
        assert!(ReservationRef::from_owner_columns([None, None, None, None]).is_err());

        let id = Some(Uuid::new_v4().to_string());
        let err = ReservationRef::from_owner_columns([id.clone(), None, id, None]).unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(ReservationRef::PharmacySale(id)).unwrap();
        assert_eq!(json["kind"], "pharmacy_sale");
        assert_eq!(json["id"], id.to_string());
    }
}
