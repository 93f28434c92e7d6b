//! Invoice and payment commands.

use uuid::Uuid;

use crate::authorization::AuthContext;
use crate::billing::{self, PaymentReceipt, PaymentRequest};
use crate::core_state::CoreState;
use crate::models::{InvoiceDetails, UnpaidInvoice};

use super::{read, write, CommandResponse};

pub fn process_payment(
    state: &CoreState,
    ctx: &AuthContext,
    request: PaymentRequest,
) -> CommandResponse<PaymentReceipt> {
    write(state, |conn| billing::process_payment(conn, ctx, &request, state.now())).into()
}

pub fn invoice_details(state: &CoreState, invoice_id: Uuid) -> CommandResponse<InvoiceDetails> {
    read(state, |conn| billing::get_invoice_details(conn, &invoice_id)).into()
}

pub fn unpaid_invoices(state: &CoreState) -> CommandResponse<Vec<UnpaidInvoice>> {
    read(state, billing::list_unpaid_invoices).into()
}
