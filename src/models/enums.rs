use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern,
/// plus the rusqlite conversions so rows can read and bind them directly.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

str_enum!(Role {
    Admin => "Admin",
    Receptionist => "Receptionist",
    Doctor => "Doctor",
    Pharmacist => "Pharmacist",
    Patient => "Patient",
});

str_enum!(AppointmentStatus {
    PendingPayment => "Pending Payment",
    Confirmed => "Confirmed",
    Completed => "Completed",
});

str_enum!(AdmissionStatus {
    Admitted => "Admitted",
    Discharged => "Discharged",
});

str_enum!(PaymentStatus {
    Pending => "Pending",
    Paid => "Paid",
});

str_enum!(TestStatus {
    PendingPayment => "PENDING_PAYMENT",
    Scheduled => "SCHEDULED",
    Completed => "COMPLETED",
});

str_enum!(PharmacyOrderStatus {
    PendingPayment => "Pending_Payment",
    Paid => "Paid",
});

str_enum!(InvoiceStatus {
    Unpaid => "Unpaid",
    Paid => "Paid",
});

str_enum!(PaymentMethod {
    Cash => "Cash",
    Card => "Card",
    Online => "Online",
    Insurance => "Insurance",
});

str_enum!(RoomCategory {
    Icu => "ICU",
    WardAc => "Ward_AC",
    WardNonAc => "Ward_NonAC",
    OperatingTheater => "Operation_Theater",
    Consultation => "Consultation",
    Lab => "Lab",
});

str_enum!(ExpenseCategory {
    PharmacyRestock => "Pharmacy_Restock",
});

str_enum!(ReportPeriod {
    Yearly => "Yearly",
    Monthly => "Monthly",
    Weekly => "Weekly",
});

impl RoomCategory {
    /// Categories a patient can be admitted to.
    pub fn is_inpatient(&self) -> bool {
        matches!(self, Self::Icu | Self::WardAc | Self::WardNonAc)
    }
}
