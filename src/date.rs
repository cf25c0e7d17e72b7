use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Source of "now". Everything time-dependent takes one of these so that
/// run resolution and host selection can be pinned in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Synoptic cadence of a domain's runs.
///
/// `Hours(n)` requires `n` to divide 24, which holds for every registered
/// domain. `Continuous` feeds are floored to the minute only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hours(u32),
    Continuous,
}

impl Cadence {
    fn period_secs(self) -> i64 {
        match self {
            Cadence::Hours(n) => i64::from(n.max(1)) * 3600,
            Cadence::Continuous => 60,
        }
    }

    /// Largest aligned instant `<= t`.
    pub fn floor(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let rem = t.timestamp().rem_euclid(self.period_secs());
        t - Duration::seconds(rem) - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
    }

    pub fn is_aligned(self, t: DateTime<Utc>) -> bool {
        t.timestamp_subsec_nanos() == 0 && t.timestamp().rem_euclid(self.period_secs()) == 0
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hours(n) => write!(f, "{n}h"),
            Cadence::Continuous => f.write_str("continuous"),
        }
    }
}

/// Parse a run timestamp given on the command line.
///
/// Accepts `YYYYMMDDHH`, `YYYY-MM-DDTHH` and `YYYY-MM-DDTHH:MM`, with an
/// optional trailing `Z`. The result is always UTC.
pub fn parse_run_time(s: &str) -> Result<DateTime<Utc>> {
    let t = s.trim().trim_end_matches('Z');
    let invalid = || Error::InvalidRequest(format!("unsupported run time format: {s}"));

    let naive = if t.len() == 10 && t.bytes().all(|b| b.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(&t[..8], "%Y%m%d").map_err(|_| invalid())?;
        let hour: u32 = t[8..].parse().map_err(|_| invalid())?;
        date.and_hms_opt(hour, 0, 0).ok_or_else(invalid)?
    } else if t.len() == 13 && t.as_bytes()[10] == b'T' {
        let date = NaiveDate::parse_from_str(&t[..10], "%Y-%m-%d").map_err(|_| invalid())?;
        let hour: u32 = t[11..].parse().map_err(|_| invalid())?;
        date.and_hms_opt(hour, 0, 0).ok_or_else(invalid)?
    } else {
        NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S"))
            .map_err(|_| invalid())?
    };

    Ok(Utc.from_utc_datetime(&naive))
}

pub fn yyyymmdd(t: &DateTime<Utc>) -> String {
    t.format("%Y%m%d").to_string()
}

pub fn yyyymmddhh(t: &DateTime<Utc>) -> String {
    t.format("%Y%m%d%H").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_to_six_hour_cycles() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 17, 42, 9).unwrap();
        assert_eq!(
            Cadence::Hours(6).floor(t),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Cadence::Hours(3).floor(t),
            Utc.with_ymd_and_hms(2025, 1, 1, 15, 0, 0).unwrap()
        );
        assert_eq!(
            Cadence::Hours(1).floor(t),
            Utc.with_ymd_and_hms(2025, 1, 1, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn continuous_floors_to_minute() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 17, 42, 9).unwrap() + Duration::milliseconds(250);
        let f = Cadence::Continuous.floor(t);
        assert_eq!(f, Utc.with_ymd_and_hms(2025, 1, 1, 17, 42, 0).unwrap());
        assert!(Cadence::Continuous.is_aligned(f));
    }

    #[test]
    fn alignment_checks_hour_and_subfields() {
        let ok = Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap();
        assert!(Cadence::Hours(6).is_aligned(ok));
        assert!(!Cadence::Hours(6).is_aligned(ok + Duration::hours(3)));
        assert!(!Cadence::Hours(6).is_aligned(ok + Duration::minutes(1)));
        assert!(!Cadence::Hours(1).is_aligned(ok + Duration::microseconds(1)));
    }

    #[test]
    fn parses_run_time_forms() {
        let want = Utc.with_ymd_and_hms(2025, 1, 31, 6, 0, 0).unwrap();
        assert_eq!(parse_run_time("2025013106").unwrap(), want);
        assert_eq!(parse_run_time("2025-01-31T06").unwrap(), want);
        assert_eq!(parse_run_time("2025-01-31T06:00").unwrap(), want);
        assert_eq!(parse_run_time("2025-01-31T06:00:00Z").unwrap(), want);
        assert!(parse_run_time("2025013125").is_err());
        assert!(parse_run_time("yesterday").is_err());
    }
}
