//! Pharmacy sale and stock commands.

use crate::authorization::AuthContext;
use crate::booking::{self, PharmacySaleReceipt, PharmacySaleRequest};
use crate::core_state::CoreState;
use crate::models::Medicine;
use crate::stock::{self, RestockReceipt, RestockRequest};

use super::{read, write, CommandResponse};

pub fn sell_medicines(
    state: &CoreState,
    ctx: &AuthContext,
    request: PharmacySaleRequest,
) -> CommandResponse<PharmacySaleReceipt> {
    write(state, |conn| booking::sell_medicines(conn, ctx, &request, state.now())).into()
}

pub fn restock_medicine(
    state: &CoreState,
    ctx: &AuthContext,
    request: RestockRequest,
) -> CommandResponse<RestockReceipt> {
    write(state, |conn| stock::restock_medicine(conn, ctx, &request, state.now())).into()
}

pub fn medicine_catalog(state: &CoreState) -> CommandResponse<Vec<Medicine>> {
    read(state, stock::medicine_catalog).into()
}
