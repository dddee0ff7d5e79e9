//! UTC offset to IANA timezone resolution
//!
//! Issue reports only carry a UTC offset. Local-day boundaries and schedule
//! lookups need a real zone, so the offset is matched against the zone
//! database at the report instant. There is no nearest-match: an offset that
//! no zone uses at that instant is an error, and the caller decides on a
//! fallback.

use chrono::{DateTime, Offset as _, TimeZone as _, Utc};
use chrono_tz::{TZ_VARIANTS, Tz};

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("no timezone has UTC offset {offset_seconds}s at {at}")]
pub struct TimezoneResolutionError {
    pub offset_seconds: i32,
    pub at: DateTime<Utc>,
}

/// Returns the alphabetically first zone whose UTC offset at `at` is exactly
/// `offset_seconds`.
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use loopstat_pipeline::timezone::resolve_timezone;
/// let at = Utc.with_ymd_and_hms(2020, 1, 15, 12, 0, 0).unwrap();
/// let tz = resolve_timezone(0, at).unwrap();
/// assert_eq!(tz.name(), "Africa/Abidjan");
/// assert!(resolve_timezone(7, at).is_err());
/// ```
pub fn resolve_timezone(offset_seconds: i32, at: DateTime<Utc>) -> Result<Tz, TimezoneResolutionError> {
    let naive = at.naive_utc();
    TZ_VARIANTS
        .iter()
        .copied()
        .filter(|tz| tz.offset_from_utc_datetime(&naive).fix().local_minus_utc() == offset_seconds)
        .min_by_key(|tz| tz.name())
        .ok_or(TimezoneResolutionError { offset_seconds, at })
}

#[cfg(test)]
mod tests {
    use chrono::{Offset as _, TimeZone as _};

    use super::*;

    #[test]
    fn test_resolved_zone_has_requested_offset() {
        let at = Utc.with_ymd_and_hms(2020, 7, 1, 0, 0, 0).unwrap();
        for offset in [-6 * 3600, -5 * 3600, 3600, 5 * 3600 + 1800] {
            let tz = resolve_timezone(offset, at).unwrap();
            let actual = tz.offset_from_utc_datetime(&at.naive_utc()).fix();
            assert_eq!(actual.local_minus_utc(), offset, "{}", tz.name());
        }
    }

    #[test]
    fn test_offset_depends_on_instant() {
        // US Central is -5h in July and -6h in January
        let summer = Utc.with_ymd_and_hms(2020, 7, 1, 0, 0, 0).unwrap();
        let winter = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let chicago = |at: DateTime<Utc>| {
            chrono_tz::America::Chicago
                .offset_from_utc_datetime(&at.naive_utc())
                .fix()
                .local_minus_utc()
        };
        assert_eq!(chicago(summer), -5 * 3600);
        assert_eq!(chicago(winter), -6 * 3600);
        assert!(resolve_timezone(-5 * 3600, summer).is_ok());
    }

    #[test]
    fn test_unknown_offset_fails() {
        let at = Utc.with_ymd_and_hms(2020, 7, 1, 0, 0, 0).unwrap();
        let err = resolve_timezone(-6 * 3600 + 7, at).unwrap_err();
        assert_eq!(err.offset_seconds, -6 * 3600 + 7);
    }
}
