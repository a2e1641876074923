use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// `1234.5` -> `1234,50`: two decimal places, comma as decimal separator,
/// no thousands grouping.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded).replace('.', ",")
}

/// `dd/mm/yyyy` of the calendar date itself, no timezone shift.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// First word of a client's name, `Cliente` when nothing usable is left.
pub fn first_name(full_name: &str) -> &str {
    full_name
        .split_whitespace()
        .next()
        .unwrap_or("Cliente")
}
