use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days from `now` until `expiry`, rounded toward negative infinity.
///
/// A certificate expiring in 4 days and 23 hours reports 4. One that expired
/// an hour ago reports -1.
pub fn days_left(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}
