//! Timestamp helpers.
//!
//! Cursor comparisons happen on whole microseconds, so every timestamp the
//! engine writes is truncated to microsecond precision up front. A value
//! read back from storage then compares equal to the one that was written.

use chrono::{DateTime, Utc};

/// Current time, truncated to microseconds.
pub fn now() -> DateTime<Utc> {
    from_micros(Utc::now().timestamp_micros())
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Out-of-range values clamp to the epoch.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_round_trips_through_micros() {
        let ts = now();
        assert_eq!(from_micros(to_micros(ts)), ts);
    }
}
