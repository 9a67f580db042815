use stl_schemas::Contract;

/// Payload field carrying a holding's balance.
pub const HOLDING_AMOUNT_FIELD: &str = "amount";

/// Holding to lock `requested_micros` from: the largest eligible balance,
/// ties broken by contract id ascending. `holdings` must already be
/// filtered to the owner and currency.
pub fn select_holding(holdings: &[Contract], requested_micros: i64) -> Option<&Contract> {
    holdings
        .iter()
        .filter_map(|c| c.field_micros(HOLDING_AMOUNT_FIELD).map(|amt| (amt, c)))
        .filter(|(amt, _)| *amt >= requested_micros)
        .max_by(|(a_amt, a), (b_amt, b)| a_amt.cmp(b_amt).then_with(|| b.id.cmp(&a.id)))
        .map(|(_, c)| c)
}
