use std::fmt;

use chrono::{DateTime, Duration, TimeDelta, Timelike, Utc};

use crate::date::parse_run_time;
use crate::domain::{Catalog, ProviderDomain};
use crate::error::{Error, Result};

/// A concrete model run: domain plus a UTC initialization time aligned to
/// the domain's cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunSpec {
    domain: &'static str,
    time: DateTime<Utc>,
}

impl RunSpec {
    /// Unaligned timestamps are rejected, never rounded.
    pub fn new(domain: &ProviderDomain, time: DateTime<Utc>) -> Result<Self> {
        if !domain.cadence.is_aligned(time) {
            return Err(Error::UnalignedRunTime {
                domain: domain.id.to_string(),
                time: time.to_rfc3339(),
                cadence: domain.cadence.to_string(),
            });
        }
        Ok(Self {
            domain: domain.id,
            time,
        })
    }

    pub fn parse(domain: &ProviderDomain, text: &str) -> Result<Self> {
        Self::new(domain, parse_run_time(text)?)
    }

    /// Most recent run that is plausibly published at `now`.
    pub fn latest(domain: &ProviderDomain, now: DateTime<Utc>) -> Result<Self> {
        let buffered = TimeDelta::try_hours(domain.latency_hours)
            .and_then(|lag| now.checked_sub_signed(lag))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "latency of {}h for {} is out of range",
                    domain.latency_hours, domain.id
                ))
            })?;
        Ok(Self {
            domain: domain.id,
            time: domain.cadence.floor(buffered),
        })
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.time
    }
}

impl fmt::Display for RunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.domain, self.time.format("%Y-%m-%dT%H:%MZ"))
    }
}

/// Resolve the latest published run for a registered domain identifier.
pub fn resolve_latest_run(catalog: &Catalog, domain: &str, now: DateTime<Utc>) -> Result<RunSpec> {
    let domain = catalog.get(domain)?;
    RunSpec::latest(domain, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Cadence;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn latest_applies_latency_then_floors() {
        let catalog = Catalog::builtin();
        // 13:30 - 4h = 09:30 -> 06z
        let run = resolve_latest_run(&catalog, "gfs025", at(13, 30)).unwrap();
        assert_eq!(run.time(), at(6, 0));
        // 13:30 - 7h = 06:30 -> 06z
        let run = resolve_latest_run(&catalog, "ifs025", at(13, 30)).unwrap();
        assert_eq!(run.time(), at(6, 0));
        // 13:30 - 2h = 11:30 -> 11z
        let run = resolve_latest_run(&catalog, "hrrr_conus", at(13, 30)).unwrap();
        assert_eq!(run.time(), at(11, 0));
        // crosses midnight
        let run = resolve_latest_run(&catalog, "ifs025", at(3, 0)).unwrap();
        assert_eq!(run.time(), Utc.with_ymd_and_hms(2024, 12, 31, 18, 0, 0).unwrap());
    }

    #[test]
    fn latest_is_aligned_and_not_in_future() {
        let catalog = Catalog::builtin();
        for domain in catalog.domains() {
            for minutes in (0..48 * 60).step_by(37) {
                let now = at(0, 0) + Duration::minutes(minutes);
                let run = RunSpec::latest(domain, now).unwrap();
                assert!(domain.cadence.is_aligned(run.time()), "{}", domain.id);
                assert!(run.time() <= now);
                assert!(RunSpec::new(domain, run.time()).is_ok());
            }
        }
    }

    #[test]
    fn continuous_cadence_keeps_minutes() {
        let mut domain = Catalog::builtin().get("hrrr_conus").unwrap().clone();
        domain.cadence = Cadence::Continuous;
        domain.latency_hours = 0;
        let run = RunSpec::latest(&domain, at(13, 47) + Duration::seconds(12)).unwrap();
        assert_eq!(run.time(), at(13, 47));
    }

    #[test]
    fn unknown_domain_fails() {
        let err = resolve_latest_run(&Catalog::builtin(), "nope", at(0, 0)).unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(_)));
    }

    #[test]
    fn unaligned_run_is_a_contract_violation() {
        let catalog = Catalog::builtin();
        let gfs = catalog.get("gfs025").unwrap();
        assert!(matches!(
            RunSpec::new(gfs, at(3, 0)),
            Err(Error::UnalignedRunTime { .. })
        ));
        assert!(RunSpec::new(gfs, at(6, 30)).is_err());
        let run = RunSpec::parse(gfs, "2025010112").unwrap();
        assert_eq!(run.hour(), 12);
        assert_eq!(run.to_string(), "gfs025@2025-01-01T12:00Z");
    }

    #[test]
    fn out_of_range_latency_is_a_config_error() {
        let mut domain = Catalog::builtin().get("gfs025").unwrap().clone();
        domain.latency_hours = 9_223_372_036_854_775;
        let err = RunSpec::latest(&domain, at(12, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
