#![forbid(unsafe_code)]

//! Resolve and download numerical weather prediction output from public
//! open-data servers.
//!
//! Supported families are NOAA (GFS, GEFS, HRRR, NAM), ECMWF (IFS, AIFS and
//! the wave model), DWD ICON and Météo-France ARPEGE. Given a domain and the
//! current time the crate works out which run is published, which forecast
//! steps and members it contains, where each file lives and what it should
//! be called locally, then fetches everything that is not already on disk.
//!
//! **Quick start**
//! ```no_run
//! use nwp_opendata::{
//!     Catalog, FetchConfig, FetchPlan, HttpTransport, LocalStore, Orchestrator, SystemClock,
//! };
//!
//! let config = FetchConfig::default();
//! let catalog = Catalog::with_config(&config)?;
//! let transport = HttpTransport::new()?;
//! let store = LocalStore::open("data/gfs025")?;
//!
//! let orch = Orchestrator::new(&catalog, &transport, &SystemClock, &config);
//! let report = orch.fetch("gfs025", &FetchPlan::new().max_forecast_hour(24), &store)?;
//! println!("{report}");
//! # Ok::<(), nwp_opendata::Error>(())
//! ```
//!
//! **Building URLs without downloading**
//! ```
//! use chrono::{TimeZone, Utc};
//! use nwp_opendata::{Catalog, FixedClock, UrlBuilder, resolve_latest_run};
//!
//! let catalog = Catalog::builtin();
//! let clock = FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
//! let run = resolve_latest_run(&catalog, "ifs025", clock.0)?;
//! let artifact = UrlBuilder::new(&catalog, &clock).build("ifs025", &run, 6, 0, None)?;
//! assert!(artifact.url.starts_with("https://data.ecmwf.int/forecasts/20250101/00z/"));
//! # Ok::<(), nwp_opendata::Error>(())
//! ```
//!
//! Notes:
//! - Each provider has its own terms of use (attribution for ECMWF and DWD,
//!   fair-use limits on NOMADS). Keep worker counts modest.
//! - Files are written under a temporary name and renamed into place, so a
//!   file with its final name is always complete.

mod config;
mod date;
mod decompress;
mod domain;
mod error;
mod orchestrator;
mod run;
mod sources;
mod steps;
mod store;
mod transport;
mod url_builder;
mod variable;

pub use crate::config::FetchConfig;
pub use crate::date::{Cadence, Clock, FixedClock, SystemClock, parse_run_time};
pub use crate::decompress::{Bzip2Stream, Decompressor, decompressor_for};
pub use crate::domain::{Catalog, Compression, Provider, ProviderDomain};
pub use crate::error::{Error, FetchError, Result};
pub use crate::orchestrator::{CancelToken, FetchPlan, FetchReport, Orchestrator};
pub use crate::run::{RunSpec, resolve_latest_run};
pub use crate::sources::{HostPair, resolve_mirror};
pub use crate::steps::{PackageBlock, StepTable, cap_steps, enumerate_members, enumerate_steps};
pub use crate::store::{Claim, LocalStore, Published};
pub use crate::transport::{HttpTransport, Payload, Transport};
pub use crate::url_builder::{Artifact, UrlBuilder};
pub use crate::variable::{Level, LevelType, VariableSpec};
