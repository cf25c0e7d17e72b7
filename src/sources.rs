use std::borrow::Cow;

use url::Url;

use crate::error::{Error, Result};

pub const NOMADS_GFS: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/gfs/prod";
pub const NOMADS_GEFS: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/gens/prod";
pub const NOMADS_HRRR: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/hrrr/prod";
pub const NOMADS_NAM: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/nam/prod";
pub const AWS_GFS: &str = "https://noaa-gfs-bdp-pds.s3.amazonaws.com";
pub const AWS_GEFS: &str = "https://noaa-gefs-pds.s3.amazonaws.com";
pub const AWS_HRRR: &str = "https://noaa-hrrr-bdp-pds.s3.amazonaws.com";
pub const AWS_NAM: &str = "https://noaa-nam-pds.s3.amazonaws.com";
pub const ECMWF_LIVE: &str = "https://data.ecmwf.int/forecasts";
pub const DWD_OPENDATA: &str = "https://opendata.dwd.de/weather/nwp";
pub const METEOFRANCE_PNT: &str = "https://object.data.gouv.fr/meteofrance-pnt/pnt";

/// Operational host plus an optional long-term archive mirror.
///
/// Providers without an archive always resolve to the live host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPair {
    pub live: Cow<'static, str>,
    pub archive: Option<Cow<'static, str>>,
}

impl HostPair {
    pub const fn new(live: &'static str, archive: &'static str) -> Self {
        Self {
            live: Cow::Borrowed(live),
            archive: Some(Cow::Borrowed(archive)),
        }
    }

    pub const fn live_only(live: &'static str) -> Self {
        Self {
            live: Cow::Borrowed(live),
            archive: None,
        }
    }

    pub fn select(&self, use_archive: bool) -> &str {
        match (&self.archive, use_archive) {
            (Some(archive), true) => archive,
            _ => &self.live,
        }
    }
}

/// Named ECMWF open-data mirrors (same set the upstream client knows).
///
/// If `source` is already an `http(s)` URL, it is used as-is.
pub fn ecmwf_source_to_base_url(source: &str) -> Option<&'static str> {
    match source {
        "ecmwf" => Some(ECMWF_LIVE),
        "azure" => Some("https://ai4edataeuwest.blob.core.windows.net/ecmwf"),
        "aws" => Some("https://ecmwf-forecasts.s3.eu-central-1.amazonaws.com"),
        "google" => Some("https://storage.googleapis.com/ecmwf-open-data"),
        _ => None,
    }
}

pub fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Resolve a mirror name or URL into a base URL without trailing slash.
pub fn resolve_mirror(source: &str) -> Result<String> {
    if is_http_url(source) {
        let parsed = Url::parse(source)?;
        if parsed.host_str().is_none() {
            return Err(Error::InvalidConfig(format!("mirror url has no host: {source}")));
        }
        return Ok(source.trim_end_matches('/').to_string());
    }
    ecmwf_source_to_base_url(source)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown mirror: {source}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_falls_back_to_live_without_archive() {
        let pair = HostPair::live_only(DWD_OPENDATA);
        assert_eq!(pair.select(true), DWD_OPENDATA);
        let pair = HostPair::new(NOMADS_GFS, AWS_GFS);
        assert_eq!(pair.select(false), NOMADS_GFS);
        assert_eq!(pair.select(true), AWS_GFS);
    }

    #[test]
    fn resolves_mirror_names_and_urls() {
        assert_eq!(
            resolve_mirror("google").unwrap(),
            "https://storage.googleapis.com/ecmwf-open-data"
        );
        assert_eq!(
            resolve_mirror("https://mirror.example.org/ecmwf/").unwrap(),
            "https://mirror.example.org/ecmwf"
        );
        assert!(resolve_mirror("ftp-ish").is_err());
        assert!(resolve_mirror("https://").is_err());
    }
}
