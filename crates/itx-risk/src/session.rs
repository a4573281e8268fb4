//! Converts UTC instants into the instrument-local wall-clock time the
//! constitutional filter and the state store's day-rollover both need.
//! Kept as the only place in the workspace that reasons about timezones;
//! everything downstream of it works with plain `NaiveTime`/day-id values.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;

/// The exchange timezone this engine trades in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock;

impl SessionClock {
    /// Wall-clock time of day in America/New_York for `ts_utc`.
    pub fn local_time(&self, ts_utc: DateTime<Utc>) -> NaiveTime {
        New_York.from_utc_datetime(&ts_utc.naive_utc()).time()
    }

    /// Trading-day id (`YYYYMMDD`) in America/New_York for `ts_utc`.
    pub fn day_id(&self, ts_utc: DateTime<Utc>) -> u32 {
        let local = New_York.from_utc_datetime(&ts_utc.naive_utc());
        let d = local.date_naive();
        d.format("%Y%m%d").to_string().parse().expect("YYYYMMDD always parses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_time_converts_utc_to_eastern() {
        // 2026-02-16 15:00:00 UTC is 10:00 EST (UTC-5) in February.
        let ts = Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap();
        let clock = SessionClock;
        assert_eq!(clock.local_time(ts), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn day_id_reflects_eastern_calendar_date() {
        // 2026-02-17 03:00:00 UTC is still 2026-02-16 22:00 EST.
        let ts = Utc.with_ymd_and_hms(2026, 2, 17, 3, 0, 0).unwrap();
        let clock = SessionClock;
        assert_eq!(clock.day_id(ts), 20260216);
    }
}
