//! Anonymization date shift, bounded by the FIFF date range.
//!
//! FIFF stores the measurement date as a signed 32-bit count of seconds since
//! the Unix epoch, so the earliest representable instant is
//! `1970-01-01T00:00:00Z − 2³¹ s` = `1901-12-13T20:45:52Z`.  Shifting a
//! recording further back than that produces a timestamp that downstream
//! readers cannot decode; [`clamp_days_back`] prevents it.
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Default shift: roughly ten years.
pub const DEFAULT_DAYS_BACK: i64 = 365 * 10;

/// Seconds per day, for converting a day shift into a stamp offset.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// A measurement timestamp as a recording library may report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasDate {
    /// Timezone-aware instant.
    Utc(DateTime<Utc>),
    /// Wall-clock time without zone; interpreted as UTC.
    Naive(NaiveDateTime),
    /// FIFF-style `(seconds, microseconds)` since the Unix epoch.
    Stamp { secs: i64, usecs: i64 },
}

impl MeasDate {
    /// Convert to a timezone-aware instant.  `None` for an out-of-range stamp.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match *self {
            MeasDate::Utc(dt) => Some(dt),
            MeasDate::Naive(naive) => Some(Utc.from_utc_datetime(&naive)),
            MeasDate::Stamp { secs, usecs } => {
                let nanos = u32::try_from(usecs.checked_mul(1_000)?).ok()?;
                DateTime::<Utc>::from_timestamp(secs, nanos)
            }
        }
    }
}

/// Earliest instant a signed 32-bit epoch-seconds counter can hold.
pub fn min_representable() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH - Duration::seconds(1_i64 << 31)
}

/// The shift actually applied to a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnonymizationParams {
    pub requested_days: i64,
    pub days_back: i64,
}

impl AnonymizationParams {
    pub fn was_clamped(&self) -> bool {
        self.days_back != self.requested_days
    }

    /// Move `instant` back by [`days_back`](Self::days_back) days.
    pub fn shift(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        instant - Duration::days(self.days_back)
    }

    /// Shift in seconds, for patching an epoch-seconds stamp.
    pub fn shift_secs(&self) -> i64 {
        self.days_back * SECONDS_PER_DAY
    }
}

/// Bound `requested` days against the earliest representable date.
///
/// Without a measurement date there is nothing to clamp against and the
/// request passes through unchanged.  Otherwise the result lies in
/// `0..=days(meas_date − min_representable())`; a warning is logged when the
/// request had to be reduced.
pub fn clamp_days_back(requested: i64, meas_date: Option<MeasDate>) -> AnonymizationParams {
    let Some(meas) = meas_date.and_then(|d| d.to_utc()) else {
        return AnonymizationParams { requested_days: requested, days_back: requested };
    };

    let max_days = (meas - min_representable()).num_days().max(0);
    let days_back = requested.clamp(0, max_days);
    if days_back != requested {
        tracing::warn!(
            requested,
            days_back,
            meas_date = %meas,
            "anonymization shift out of range; clamped"
        );
    }
    AnonymizationParams { requested_days: requested, days_back }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn min_representable_is_1901() {
        assert_eq!(min_representable().to_rfc3339(), "1901-12-13T20:45:52+00:00");
        assert_eq!(min_representable().timestamp(), i32::MIN as i64);
    }

    #[test]
    fn no_date_passes_request_through() {
        let p = clamp_days_back(DEFAULT_DAYS_BACK, None);
        assert_eq!(p.days_back, DEFAULT_DAYS_BACK);
        assert!(!p.was_clamped());
    }

    #[test]
    fn recent_recording_is_not_clamped() {
        let p = clamp_days_back(3650, Some(MeasDate::Utc(utc(2023, 5, 4))));
        assert_eq!(p.days_back, 3650);
    }

    #[test]
    fn large_shift_near_minimum_is_clamped() {
        let meas = min_representable() + Duration::days(4_999) + Duration::hours(3);
        let p = clamp_days_back(10_000, Some(MeasDate::Utc(meas)));
        assert!(p.days_back <= 5_000);
        assert_eq!(p.days_back, 4_999);
        assert!(p.was_clamped());
        assert!(p.shift(meas) >= min_representable());
    }

    #[test]
    fn date_before_minimum_floors_at_zero() {
        let p = clamp_days_back(10, Some(MeasDate::Utc(utc(1900, 1, 1))));
        assert_eq!(p.days_back, 0);
    }

    #[test]
    fn negative_request_floors_at_zero() {
        let p = clamp_days_back(-5, Some(MeasDate::Utc(utc(2020, 1, 1))));
        assert_eq!(p.days_back, 0);
    }

    #[test]
    fn naive_and_stamp_dates_are_treated_as_utc() {
        let aware = utc(2001, 9, 9);
        let naive = MeasDate::Naive(aware.naive_utc());
        let stamp = MeasDate::Stamp { secs: aware.timestamp(), usecs: 0 };
        assert_eq!(naive.to_utc(), Some(aware));
        assert_eq!(stamp.to_utc(), Some(aware));
        assert_eq!(
            clamp_days_back(40_000, Some(naive)),
            clamp_days_back(40_000, Some(MeasDate::Utc(aware)))
        );
    }

    #[test]
    fn shift_secs_matches_days() {
        let p = AnonymizationParams { requested_days: 2, days_back: 2 };
        assert_eq!(p.shift_secs(), 172_800);
    }
}
