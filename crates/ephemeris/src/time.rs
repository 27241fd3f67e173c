//! UTC → TDB time-scale conversion.
//!
//! Element propagation is parameterized by Julian centuries of TDB since
//! J2000. UTC is first shifted to TT by a fixed ΔT (37 leap seconds +
//! 32.184 s), then the small periodic TDB−TT correction is applied.

use chrono::{DateTime, Utc};
use lightlag_core::constants::{J2000_JD, JULIAN_CENTURY_DAYS, SECONDS_PER_DAY};
use lightlag_core::julian::unix_seconds_to_jd;

/// Approximate TT − UTC in seconds (TAI−UTC 37 s + TT−TAI 32.184 s).
const DELTA_T_SECONDS: f64 = 69.184;

/// Julian centuries of TDB since J2000 for a UTC instant.
pub fn julian_centuries_tdb(t: DateTime<Utc>) -> f64 {
    let unix = t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9;
    let jd_tt = unix_seconds_to_jd(unix) + DELTA_T_SECONDS / SECONDS_PER_DAY;
    let t_tt = (jd_tt - J2000_JD) / JULIAN_CENTURY_DAYS;

    let g = (357.53 + 35_999.050 * t_tt).to_radians();
    let tdb_minus_tt = 0.001_658 * g.sin() + 0.000_014 * (2.0 * g).sin();

    let jd_tdb = jd_tt + tdb_minus_tt / SECONDS_PER_DAY;
    (jd_tdb - J2000_JD) / JULIAN_CENTURY_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn j2000_is_near_zero_centuries() {
        // 2000-01-01 11:58:55.816 UTC ≈ J2000 TT
        let t = Utc.with_ymd_and_hms(2000, 1, 1, 11, 58, 56).unwrap();
        let centuries = julian_centuries_tdb(t);
        assert!(centuries.abs() < 1e-6, "got {centuries}");
    }

    #[test]
    fn centuries_advance_monotonically() {
        let a = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let ca = julian_centuries_tdb(a);
        let cb = julian_centuries_tdb(b);
        assert!(cb > ca);
        // ~6.58 years apart
        assert!((cb - ca - 0.0658).abs() < 0.001, "delta {}", cb - ca);
    }

    #[test]
    fn tdb_correction_is_sub_millisecond() {
        let t = Utc.with_ymd_and_hms(2026, 4, 15, 6, 30, 0).unwrap();
        let with = julian_centuries_tdb(t);
        // Recompute without the periodic term.
        let unix = t.timestamp() as f64;
        let jd_tt = unix_seconds_to_jd(unix) + DELTA_T_SECONDS / SECONDS_PER_DAY;
        let without = (jd_tt - J2000_JD) / JULIAN_CENTURY_DAYS;
        let delta_seconds = (with - without).abs() * JULIAN_CENTURY_DAYS * SECONDS_PER_DAY;
        assert!(delta_seconds < 0.002, "TDB-TT was {delta_seconds}s");
    }
}
