//! Calendar-day helpers evaluated in the campus UTC offset.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// The local calendar date of `instant`.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// UTC instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN)
        - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&naive)
}

/// First and last instant (inclusive, millisecond precision) of the calendar
/// day that contains `now`.
pub fn day_bounds(now: DateTime<FixedOffset>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(now.date_naive(), *now.offset());
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Whether `instant` falls on the same local calendar day as `now`.
pub fn is_same_day(instant: DateTime<Utc>, now: DateTime<FixedOffset>) -> bool {
    local_date(instant, *now.offset()) == now.date_naive()
}

/// Whether `instant` falls on the local calendar day right before `now`'s.
pub fn is_previous_day(instant: DateTime<Utc>, now: DateTime<FixedOffset>) -> bool {
    now.date_naive()
        .pred_opt()
        .is_some_and(|yesterday| local_date(instant, *now.offset()) == yesterday)
}
