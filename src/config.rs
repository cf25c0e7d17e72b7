//! Runtime configuration.
//!
//! Every field has a default so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "workers": 8, "latency_hours": { "ifs025": 8 }, "ecmwf_archive": "google" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper bound for any hour-valued setting (ten years).
const MAX_HOURS: i64 = 24 * 366 * 10;
const MAX_SECS_PER_MEGABYTE: f64 = 3600.0;
const MAX_TIMEOUT_SECS: u64 = 24 * 3600;
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Latency overrides must be non-negative and representable as a time offset.
pub(crate) fn check_latency(id: &str, hours: i64) -> Result<()> {
    if !(0..=MAX_HOURS).contains(&hours) {
        return Err(Error::InvalidConfig(format!(
            "latency for {id} must be within 0..={MAX_HOURS} hours, got {hours}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Size of the download worker pool.
    pub workers: usize,
    /// Runs older than this are fetched from the archive host.
    pub freshness_threshold_hours: i64,
    /// Always use the archive host when the domain has one.
    pub force_archive: bool,
    pub base_timeout_secs: u64,
    /// Added to the base timeout per megabyte of expected payload.
    pub secs_per_megabyte: f64,
    pub chunk_size: usize,
    /// Stop issuing requests once this many seconds have elapsed.
    pub deadline_secs: Option<u64>,
    /// Per-domain latency buffer overrides, in hours.
    pub latency_hours: BTreeMap<String, i64>,
    /// ECMWF archive mirror: `aws`, `azure`, `google`, `ecmwf` or a URL.
    pub ecmwf_archive: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            freshness_threshold_hours: 36,
            force_archive: false,
            base_timeout_secs: 10,
            secs_per_megabyte: 0.5,
            chunk_size: 8192,
            deadline_secs: None,
            latency_hours: BTreeMap::new(),
            ecmwf_archive: None,
        }
    }
}

impl FetchConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: FetchConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be >0".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be >0".into()));
        }
        if self.freshness_threshold_hours < 0 {
            return Err(Error::InvalidConfig(format!(
                "freshness_threshold_hours must be >=0, got {}",
                self.freshness_threshold_hours
            )));
        }
        if self.freshness_threshold_hours > MAX_HOURS {
            return Err(Error::InvalidConfig(format!(
                "freshness_threshold_hours must be <={MAX_HOURS}, got {}",
                self.freshness_threshold_hours
            )));
        }
        if !self.secs_per_megabyte.is_finite()
            || !(0.0..=MAX_SECS_PER_MEGABYTE).contains(&self.secs_per_megabyte)
        {
            return Err(Error::InvalidConfig(format!(
                "secs_per_megabyte must be within 0..={MAX_SECS_PER_MEGABYTE}, got {}",
                self.secs_per_megabyte
            )));
        }
        if self.base_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::InvalidConfig(format!(
                "base_timeout_secs must be <={MAX_TIMEOUT_SECS}, got {}",
                self.base_timeout_secs
            )));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size must be <={MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        for (id, hours) in &self.latency_hours {
            check_latency(id, *hours)?;
        }
        Ok(())
    }

    /// Request timeout for an artifact of roughly `payload_mb` megabytes.
    /// Saturates instead of overflowing for unvalidated values.
    pub fn timeout_for(&self, payload_mb: u32) -> Duration {
        let scaled = Duration::try_from_secs_f64(f64::from(payload_mb) * self.secs_per_megabyte)
            .unwrap_or(Duration::MAX);
        Duration::from_secs(self.base_timeout_secs).saturating_add(scaled)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let c = FetchConfig::from_json_str(r#"{"workers": 8, "latency_hours": {"ifs025": 8}}"#)
            .unwrap();
        assert_eq!(c.workers, 8);
        assert_eq!(c.freshness_threshold_hours, 36);
        assert_eq!(c.latency_hours.get("ifs025"), Some(&8));
        assert!(c.ecmwf_archive.is_none());
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(matches!(
            FetchConfig::from_json_str(r#"{"workers": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(FetchConfig::from_json_str("{"), Err(Error::Json(_))));
    }

    #[test]
    fn timeout_scales_with_payload() {
        let c = FetchConfig::default();
        assert_eq!(c.timeout_for(0), Duration::from_secs(10));
        assert_eq!(c.timeout_for(40), Duration::from_secs(30));
        assert!(c.timeout_for(500) > c.timeout_for(8));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fetch.json");
        std::fs::write(&path, r#"{"force_archive": true}"#).unwrap();
        assert!(FetchConfig::from_json_file(&path).unwrap().force_archive);
        assert!(FetchConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        for json in [
            r#"{"freshness_threshold_hours": 9223372036854775}"#,
            r#"{"latency_hours": {"gfs025": 9223372036854775}}"#,
            r#"{"latency_hours": {"gfs025": -1}}"#,
            r#"{"secs_per_megabyte": 1e300}"#,
            r#"{"base_timeout_secs": 18446744073709551615}"#,
            r#"{"chunk_size": 1099511627776}"#,
        ] {
            assert!(
                matches!(FetchConfig::from_json_str(json), Err(Error::InvalidConfig(_))),
                "{json}"
            );
        }
    }

    #[test]
    fn timeout_saturates_for_unvalidated_values() {
        let c = FetchConfig {
            base_timeout_secs: u64::MAX,
            secs_per_megabyte: 1e300,
            ..FetchConfig::default()
        };
        assert_eq!(c.timeout_for(8), Duration::MAX);
    }
}
