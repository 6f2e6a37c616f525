use crate::model::{BookingType, Discounts, RateTable, Span};

/// Minimum billed units before the weekly-tier discount applies.
pub const WEEKLY_TIER_MIN_UNITS: i64 = 7;
/// Minimum billed units before the monthly-tier discount applies.
pub const MONTHLY_TIER_MIN_UNITS: i64 = 30;

/// Billable units for a span at the given granularity: the ceiling of the
/// duration in hours, days, or 30-day months.
pub fn units_for(span: &Span, booking_type: BookingType) -> i64 {
    let unit = booking_type.unit_ms();
    let duration = span.duration_ms();
    (duration + unit - 1) / unit
}

/// Price a span against a rate table. Pure — interval validity is enforced
/// upstream, never here.
///
/// A partial unit is never billed for less than one full unit:
/// `amount = max(units × rate, rate)`. Qualifying discount tiers are then
/// applied multiplicatively, each only once its unit threshold is met.
/// All amounts are integer minor currency units; discount division floors.
pub fn price(
    rates: &RateTable,
    discounts: &Discounts,
    span: &Span,
    booking_type: BookingType,
) -> i64 {
    let rate = rates.rate_for(booking_type);
    let units = units_for(span, booking_type);
    let mut amount = (units * rate).max(rate);

    if discounts.weekly_pct > 0 && units >= WEEKLY_TIER_MIN_UNITS {
        amount = amount * (100 - discounts.weekly_pct as i64) / 100;
    }
    if discounts.monthly_pct > 0 && units >= MONTHLY_TIER_MIN_UNITS {
        amount = amount * (100 - discounts.monthly_pct as i64) / 100;
    }

    amount
}
