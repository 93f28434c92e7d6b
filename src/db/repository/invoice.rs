use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::InvoiceStatus;
use crate::models::{Invoice, LineItem, Money, ReservationRef, RevenueSource, UnpaidInvoice};

use super::{parse_uuid, u32_column};

const INVOICE_COLUMNS: &str = "i.id, i.appointment_id, i.admission_id, i.test_order_id,
     i.pharmacy_order_id, i.total_amount, i.status, i.created_at, i.paid_at";

/// Raw invoice row before owner validation.
struct InvoiceRow {
    id: String,
    owner: [Option<String>; 4],
    total_amount: Money,
    status: InvoiceStatus,
    created_at: NaiveDateTime,
    paid_at: Option<NaiveDateTime>,
}

fn invoice_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: row.get(0)?,
        owner: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
        total_amount: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        paid_at: row.get(8)?,
    })
}

fn invoice_from_row(row: InvoiceRow) -> Result<Invoice, DatabaseError> {
    Ok(Invoice {
        id: parse_uuid("invoice id", &row.id)?,
        owner: ReservationRef::from_owner_columns(row.owner)?,
        total_amount: row.total_amount,
        status: row.status,
        created_at: row.created_at,
        paid_at: row.paid_at,
    })
}

pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<(), DatabaseError> {
    let [appointment_id, admission_id, test_order_id, pharmacy_order_id] =
        invoice.owner.owner_columns();
    conn.execute(
        "INSERT INTO invoices (id, appointment_id, admission_id, test_order_id, pharmacy_order_id,
         total_amount, status, created_at, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            invoice.id.to_string(),
            appointment_id,
            admission_id,
            test_order_id,
            pharmacy_order_id,
            invoice.total_amount,
            invoice.status,
            invoice.created_at,
            invoice.paid_at,
        ],
    )?;
    Ok(())
}

pub fn insert_line_item(
    conn: &Connection,
    invoice_id: &Uuid,
    position: usize,
    item: &LineItem,
) -> Result<(), DatabaseError> {
    let position = i64::try_from(position).map_err(|_| DatabaseError::InvalidValue {
        field: "line item position".into(),
        value: position.to_string(),
    })?;
    conn.execute(
        "INSERT INTO invoice_line_items (id, invoice_id, position, description, quantity, unit_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4().to_string(),
            invoice_id.to_string(),
            position,
            item.description,
            item.quantity,
            item.unit_price,
        ],
    )?;
    Ok(())
}

pub fn get_invoice(conn: &Connection, id: &Uuid) -> Result<Option<Invoice>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.id = ?1"),
            params![id.to_string()],
            invoice_row_from_rusqlite,
        )
        .optional()?;
    row.map(invoice_from_row).transpose()
}

pub fn require_invoice(conn: &Connection, id: &Uuid) -> Result<Invoice, DatabaseError> {
    get_invoice(conn, id)?.ok_or_else(|| DatabaseError::not_found("invoice", id))
}

pub fn get_invoice_by_owner(
    conn: &Connection,
    owner: &ReservationRef,
) -> Result<Option<Invoice>, DatabaseError> {
    let column = match owner {
        ReservationRef::Appointment(_) => "appointment_id",
        ReservationRef::Admission(_) => "admission_id",
        ReservationRef::TestOrder(_) => "test_order_id",
        ReservationRef::PharmacySale(_) => "pharmacy_order_id",
    };
    let row = conn
        .query_row(
            &format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.{column} = ?1"),
            params![owner.id().to_string()],
            invoice_row_from_rusqlite,
        )
        .optional()?;
    row.map(invoice_from_row).transpose()
}

pub fn get_line_items(conn: &Connection, invoice_id: &Uuid) -> Result<Vec<LineItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT description, quantity, unit_price FROM invoice_line_items
         WHERE invoice_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![invoice_id.to_string()], |row| {
        Ok(LineItem {
            description: row.get(0)?,
            quantity: u32_column(row, 1)?,
            unit_price: row.get(2)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// One-way Unpaid → Paid. Returns rows changed (0 when already Paid).
pub fn mark_invoice_paid(
    conn: &Connection,
    id: &Uuid,
    at: NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE invoices SET status = 'Paid', paid_at = ?2 WHERE id = ?1 AND status = 'Unpaid'",
        params![id.to_string(), at],
    )?;
    Ok(changed)
}

/// `(patient_id, patient_name)` of whoever owns the invoice's reservation.
pub fn get_invoice_patient(
    conn: &Connection,
    invoice_id: &Uuid,
) -> Result<(Uuid, String), DatabaseError> {
    let (raw_id, name): (String, String) = conn
        .query_row(
            "SELECT p.id, p.full_name
             FROM invoices i
             LEFT JOIN appointments a ON a.id = i.appointment_id
             LEFT JOIN admissions ad ON ad.id = i.admission_id
             LEFT JOIN test_orders t ON t.id = i.test_order_id
             LEFT JOIN pharmacy_orders po ON po.id = i.pharmacy_order_id
             JOIN patients p ON p.id = COALESCE(a.patient_id, ad.patient_id, t.patient_id, po.patient_id)
             WHERE i.id = ?1",
            params![invoice_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| DatabaseError::not_found("invoice", invoice_id))?;
    Ok((parse_uuid("patient id", &raw_id)?, name))
}

/// Unpaid invoices, oldest first.
pub fn list_unpaid_invoices(conn: &Connection) -> Result<Vec<UnpaidInvoice>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVOICE_COLUMNS}, p.full_name,
                CASE
                    WHEN i.appointment_id IS NOT NULL THEN d.full_name
                    WHEN i.admission_id IS NOT NULL THEN 'Inpatient'
                    WHEN i.test_order_id IS NOT NULL THEN 'Laboratory'
                    ELSE 'Pharmacy'
                END
         FROM invoices i
         LEFT JOIN appointments a ON a.id = i.appointment_id
         LEFT JOIN doctors d ON d.id = a.doctor_id
         LEFT JOIN admissions ad ON ad.id = i.admission_id
         LEFT JOIN test_orders t ON t.id = i.test_order_id
         LEFT JOIN pharmacy_orders po ON po.id = i.pharmacy_order_id
         JOIN patients p ON p.id = COALESCE(a.patient_id, ad.patient_id, t.patient_id, po.patient_id)
         WHERE i.status = 'Unpaid'
         ORDER BY i.created_at, i.id"
    ))?;

    let rows = stmt.query_map([], |row| {
        Ok((
            invoice_row_from_rusqlite(row)?,
            row.get::<_, String>(9)?,
            row.get::<_, String>(10)?,
        ))
    })?;

    let mut unpaid = Vec::new();
    for row in rows {
        let (raw, patient_name, provider) = row?;
        let invoice = invoice_from_row(raw)?;
        unpaid.push(UnpaidInvoice {
            invoice_id: invoice.id,
            owner: invoice.owner,
            total_amount: invoice.total_amount,
            patient_name,
            provider,
            created_at: invoice.created_at,
        });
    }
    Ok(unpaid)
}

/// Σ total of unpaid invoices.
pub fn sum_unpaid_totals(conn: &Connection) -> Result<Money, DatabaseError> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(total_amount), 0) FROM invoices WHERE status = 'Unpaid'",
        [],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Paid invoice totals in `[start, end)` grouped by where the revenue came
/// from. Consultations are split by the doctor's department.
pub fn paid_revenue_by_source(
    conn: &Connection,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<(RevenueSource, Money)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT CASE
                    WHEN i.appointment_id IS NOT NULL THEN 'consultation'
                    WHEN i.admission_id IS NOT NULL THEN 'inpatient'
                    WHEN i.test_order_id IS NOT NULL THEN 'laboratory'
                    ELSE 'pharmacy'
                END AS source,
                d.department,
                SUM(i.total_amount)
         FROM invoices i
         LEFT JOIN appointments a ON a.id = i.appointment_id
         LEFT JOIN doctors d ON d.id = a.doctor_id
         WHERE i.status = 'Paid' AND i.paid_at >= ?1 AND i.paid_at < ?2
         GROUP BY source, d.department
         ORDER BY source, d.department",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Money>(2)?,
        ))
    })?;

    let mut totals = Vec::new();
    for row in rows {
        let (source, department, amount) = row?;
        let source = match source.as_str() {
            "consultation" => RevenueSource::Consultation(department.unwrap_or_default()),
            "inpatient" => RevenueSource::Inpatient,
            "laboratory" => RevenueSource::Laboratory,
            _ => RevenueSource::PharmacySales,
        };
        totals.push((source, amount));
    }
    Ok(totals)
}
