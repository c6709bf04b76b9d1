//! GPS time conversion.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Offset between TAI and GPS time, seconds.
const TAI_GPS_OFFSET_S: i64 = 19;

/// 1980-01-06T00:00:00.
fn gps_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 6)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// 1970-01-01T00:00:10.
fn tai_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 10))
        .unwrap_or_default()
}

/// Converts seconds since the GPS epoch to UTC.
///
/// The GPS time is shifted to TAI and its distance from the TAI epoch
/// is taken as a Unix timestamp.
pub fn gps2utc(gps_seconds: f64) -> DateTime<Utc> {
    #[allow(clippy::cast_possible_truncation)]
    let gps = gps_epoch() + Duration::nanoseconds((gps_seconds * 1e9).round() as i64);
    let tai = gps + Duration::seconds(TAI_GPS_OFFSET_S);
    let unix = tai - tai_epoch();
    DateTime::<Utc>::UNIX_EPOCH + unix
}

/// [gps2utc] formatted as `YYYY-mm-dd HH:MM:SS[.ffffff]`.
pub fn gps2utc_string(gps_seconds: f64) -> String {
    gps2utc(gps_seconds)
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S%.f")
        .to_string()
}

/// Converts a `TIME8` value (nanoseconds since the Unix epoch) to UTC.
pub fn from_time8(nanos: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::nanoseconds(nanos)
}
