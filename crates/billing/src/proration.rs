//! Proration date arithmetic
//!
//! Pure calendar math for mid-cycle annual commitments: how many whole
//! months remain until the target alignment date, how many leftover days,
//! and the backdated virtual start / billing anchor pair that makes the
//! provider's own proration produce the desired partial first charge.
//!
//! No I/O, no clock reads; callers supply "now".

use serde::Serialize;
use time::{Date, Duration, Month};

/// Days assumed in a year for the annual proration ratio
const DAYS_PER_YEAR: f64 = 365.0;

/// Output of [`calc_addon_proration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProrationSchedule {
    /// Whole months to bill, never less than 1
    pub billable_months: u32,
    /// Leftover days beyond the whole months
    pub extra_days: u32,
    /// Virtual subscription start in the past (midnight UTC by convention)
    pub backdate_start: Date,
    /// Date the provider anchors the next full-price renewal to
    pub billing_anchor: Date,
}

/// Compute the billing schedule for a commitment starting now and aligning
/// to `period_end`.
///
/// The month distance uses the absolute month difference, treating the
/// alignment date as recurring: a June start aligning to a May 31 cycle is
/// eleven months out, whichever year the May 31 belongs to.
///
/// A span of zero or negative months still bills a minimum of one month: the
/// floor is deliberate, not a proportional fraction.
///
/// The anchor day offset (`31 - extra_days`, i.e. the source's
/// `30 - extraDays + 1`) ignores variable month lengths and can drift across
/// month boundaries; it is preserved literally for compatibility with
/// existing schedules.
pub fn calc_addon_proration(now: Date, period_end: Date) -> ProrationSchedule {
    let mut months_diff = (period_end.year() - now.year()) * 12
        + (i32::from(u8::from(period_end.month())) - i32::from(u8::from(now.month()))).abs();
    let mut days_diff = i32::from(period_end.day()) - i32::from(now.day());

    if days_diff < 0 {
        // Borrow one month, measured in the length of the month preceding
        // the period end.
        months_diff -= 1;
        let prev = add_months(period_end, -1);
        days_diff += i32::from(time::util::days_in_year_month(prev.year(), prev.month()));
    }

    let (billable_months, extra_days) = if months_diff <= 0 {
        (1, days_diff)
    } else if days_diff > 0 {
        (months_diff + 1, days_diff)
    } else {
        (months_diff, 0)
    };

    let billing_anchor = if extra_days > 0 {
        period_end + Duration::days(i64::from(31 - extra_days))
    } else {
        period_end
    };

    // The annual commitment "virtually started" this many months ago.
    let months_already_passed = 12 - billable_months;
    let raw_backdate = add_months(now, -months_already_passed);

    // Align the backdate's day with the anchor so the cycle lines up,
    // clamping to the backdate month's length.
    let target_day = billing_anchor
        .day()
        .min(time::util::days_in_year_month(raw_backdate.year(), raw_backdate.month()));
    let backdate_start =
        Date::from_calendar_date(raw_backdate.year(), raw_backdate.month(), target_day)
            .unwrap_or(raw_backdate);

    ProrationSchedule {
        billable_months: billable_months.max(1) as u32,
        extra_days: extra_days.max(0) as u32,
        backdate_start,
        billing_anchor,
    }
}

/// Prorated first-year charge for an annual price.
///
/// The anniversary is one year after `start`, same month and day.
/// `days_remaining` counts both endpoints. Always rounds down, never up, so
/// a partial period can never be overcharged.
pub fn annual_prorated_amount(annual_price_cents: i64, start: Date) -> i64 {
    let anniversary = anniversary_of(start);
    let days_remaining = (anniversary - start).whole_days() + 1;
    let ratio = days_remaining as f64 / DAYS_PER_YEAR;
    (annual_price_cents as f64 * ratio).floor() as i64
}

/// Same month/day one year later; Feb 29 clamps to Feb 28.
fn anniversary_of(start: Date) -> Date {
    start.replace_year(start.year() + 1).unwrap_or_else(|_| {
        Date::from_calendar_date(start.year() + 1, Month::February, 28).unwrap_or(start)
    })
}

/// Calendar month addition with the day clamped to the target month's length
pub(crate) fn add_months(date: Date, months: i32) -> Date {
    let zero_based = date.year() * 12 + i32::from(u8::from(date.month())) - 1 + months;
    let year = zero_based.div_euclid(12);
    let month = Month::try_from((zero_based.rem_euclid(12) + 1) as u8).unwrap_or(Month::January);
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn add_months_clamps_to_month_length() {
        assert_eq!(add_months(date!(2026 - 01 - 31), 1), date!(2026 - 02 - 28));
        assert_eq!(add_months(date!(2024 - 01 - 31), 1), date!(2024 - 02 - 29));
        assert_eq!(add_months(date!(2026 - 03 - 15), -3), date!(2025 - 12 - 15));
        assert_eq!(add_months(date!(2026 - 01 - 10), -1), date!(2025 - 12 - 10));
    }

    #[test]
    fn mid_cycle_start_with_leftover_days() {
        // Oct 16 aligning to a May 31 cycle: five whole months plus 15 days.
        let schedule = calc_addon_proration(date!(2025 - 10 - 16), date!(2025 - 05 - 31));
        assert_eq!(schedule.billable_months, 6);
        assert_eq!(schedule.extra_days, 15);
        // Anchor = period end + (31 - 15) days, the literal source formula.
        assert_eq!(schedule.billing_anchor, date!(2025 - 06 - 16));
        // 12 - 6 = 6 months back from Oct 16, day aligned to the anchor's 16th.
        assert_eq!(schedule.backdate_start, date!(2025 - 04 - 16));
    }

    #[test]
    fn day_aligned_span_has_no_extra_days() {
        let schedule = calc_addon_proration(date!(2026 - 01 - 31), date!(2026 - 05 - 31));
        assert_eq!(schedule.billable_months, 4);
        assert_eq!(schedule.extra_days, 0);
        // No leftover days: the anchor is the period end itself.
        assert_eq!(schedule.billing_anchor, date!(2026 - 05 - 31));
        // 12 - 4 = 8 months back from Jan 31.
        assert_eq!(schedule.backdate_start, date!(2025 - 05 - 31));
    }

    #[test]
    fn borrowing_a_month_when_period_end_day_is_earlier() {
        // Jan 20 -> May 10: day diff is negative, borrow April's 30 days.
        let schedule = calc_addon_proration(date!(2026 - 01 - 20), date!(2026 - 05 - 10));
        // months 4 -> 3 after the borrow, days -10 + 30 = 20, rounded up.
        assert_eq!(schedule.billable_months, 4);
        assert_eq!(schedule.extra_days, 20);
        assert_eq!(schedule.billing_anchor, date!(2026 - 05 - 21));
        // 12 - 4 = 8 months back from Jan 20, day aligned to the anchor's 21st.
        assert_eq!(schedule.backdate_start, date!(2025 - 05 - 21));
    }

    #[test]
    fn same_month_span_bills_minimum_one_month() {
        let schedule = calc_addon_proration(date!(2026 - 05 - 01), date!(2026 - 05 - 25));
        assert_eq!(schedule.billable_months, 1);
        assert_eq!(schedule.extra_days, 24);
        // period end + (31 - 24) days
        assert_eq!(schedule.billing_anchor, date!(2026 - 06 - 01));
    }

    #[test]
    fn billable_months_is_at_least_one_for_valid_spans() {
        let pairs = [
            (date!(2026 - 05 - 31), date!(2026 - 05 - 31)),
            (date!(2026 - 05 - 30), date!(2026 - 05 - 31)),
            (date!(2025 - 06 - 30), date!(2026 - 05 - 31)),
            (date!(2026 - 02 - 28), date!(2026 - 03 - 01)),
            (date!(2026 - 01 - 31), date!(2026 - 03 - 01)),
            (date!(2025 - 10 - 16), date!(2025 - 05 - 31)),
        ];
        for (now, period_end) in pairs {
            let schedule = calc_addon_proration(now, period_end);
            assert!(
                schedule.billable_months >= 1,
                "billable_months < 1 for {now} -> {period_end}"
            );
        }
    }

    #[test]
    fn negative_day_span_still_bills_one_month_with_zero_extra() {
        // Jan 31 -> Mar 1: borrow leaves -30 + 28 = -2 days and one month;
        // leftover days never go below zero in the schedule.
        let schedule = calc_addon_proration(date!(2026 - 01 - 31), date!(2026 - 03 - 01));
        assert_eq!(schedule.billable_months, 1);
        assert_eq!(schedule.extra_days, 0);
        assert_eq!(schedule.billing_anchor, date!(2026 - 03 - 01));
    }

    #[test]
    fn pure_function_same_inputs_same_outputs() {
        let a = calc_addon_proration(date!(2025 - 10 - 16), date!(2025 - 05 - 31));
        let b = calc_addon_proration(date!(2025 - 10 - 16), date!(2025 - 05 - 31));
        assert_eq!(a, b);
    }

    #[test]
    fn annual_amount_is_roughly_full_price_for_a_full_year() {
        // Jan 1 2026 -> Jan 1 2027 is 365 days, 366 counting both endpoints.
        let amount = annual_prorated_amount(120_000, date!(2026 - 01 - 01));
        assert_eq!(amount, (120_000f64 * 366.0 / 365.0).floor() as i64);
        assert!(amount >= 120_000);
    }

    #[test]
    fn annual_amount_rounds_down_never_up() {
        // Sep 24 2026 -> Sep 24 2027: 365 days, 366 inclusive, on a 9999-cent
        // price the ratio is fractional and must floor.
        let start = date!(2026 - 09 - 24);
        let days = (date!(2027 - 09 - 24) - start).whole_days() + 1;
        let amount = annual_prorated_amount(9_999, start);
        assert_eq!(amount, (9_999f64 * days as f64 / 365.0).floor() as i64);
        assert!(amount as f64 <= 9_999f64 * days as f64 / 365.0);
    }

    #[test]
    fn leap_day_start_clamps_anniversary_to_feb_28() {
        // Feb 29 2024 -> Feb 28 2025: 365 days, 366 inclusive.
        let amount = annual_prorated_amount(36_500, date!(2024 - 02 - 29));
        assert_eq!(amount, 36_600);
    }
}
