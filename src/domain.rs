//! Static domain catalogue.
//!
//! Every provider domain is one [`ProviderDomain`] value: cadence, latency
//! buffer, hosts, member layout, step table and a tagged [`Naming`]
//! variant holding the provider-specific template inputs. Adding a domain
//! means adding one entry to [`builtin_domains`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::config::{FetchConfig, check_latency};
use crate::date::Cadence;
use crate::error::{Error, Result};
use crate::sources::{
    AWS_GEFS, AWS_GFS, AWS_HRRR, AWS_NAM, DWD_OPENDATA, ECMWF_LIVE, HostPair, METEOFRANCE_PNT,
    NOMADS_GEFS, NOMADS_GFS, NOMADS_HRRR, NOMADS_NAM, ecmwf_source_to_base_url, resolve_mirror,
};
use crate::steps::{HorizonRule, PackageBlock, RunHours, Segment, StepTable, expand_segments, seg};
use crate::variable::{
    ARPEGE_DEFAULT_PACKAGES, ARPEGE_PACKAGES, CatalogVariable, ICON_DEFAULT_VARIABLES,
    ICON_VARIABLES, VariableSpec, lookup,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Noaa,
    Ecmwf,
    Dwd,
    MeteoFrance,
}

/// Ensemble member tokens for per-member NOAA files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberTokens {
    pub control: &'static str,
    /// Prefix of the zero-padded perturbed member index.
    pub perturbed_prefix: &'static str,
}

impl MemberTokens {
    pub fn render(&self, member: u32) -> String {
        if member == 0 {
            self.control.to_string()
        } else {
            format!("{}{member:02}", self.perturbed_prefix)
        }
    }
}

pub const GEFS_MEMBERS: MemberTokens = MemberTokens {
    control: "gec00",
    perturbed_prefix: "gep",
};

/// Provider-specific naming inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Path template below the host, see `url_builder::render_noaa_path`.
    Noaa {
        pattern: &'static str,
        members: Option<MemberTokens>,
    },
    Ecmwf {
        model: &'static str,
        resol: &'static str,
        stream: &'static str,
        /// Stream renames keyed by run hour.
        stream_overrides: &'static [(u32, &'static str)],
        /// File type token per member slot; slot 0 is the control or
        /// deterministic product, later slots are bundled perturbations.
        type_slots: &'static [&'static str],
    },
    Icon {
        path: &'static str,
        region: &'static str,
        grid: &'static str,
    },
    Arpege {
        family: &'static str,
        grid: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ProviderDomain {
    pub id: &'static str,
    pub provider: Provider,
    pub resolution: &'static str,
    pub cadence: Cadence,
    /// Hours subtracted from "now" before flooring to the cadence.
    pub latency_hours: i64,
    /// Rough size of one artifact, used to scale request timeouts.
    pub payload_mb: u32,
    pub hosts: HostPair,
    /// Ensemble size including the control; 0 for deterministic domains.
    pub ensemble_members: u32,
    pub steps: StepTable,
    pub naming: Naming,
    /// Compression suffix on remote payloads (the local file is stored decompressed).
    pub compression: Option<Compression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bzip2,
}

impl Compression {
    pub fn suffix(self) -> &'static str {
        match self {
            Compression::Bzip2 => ".bz2",
        }
    }
}

impl ProviderDomain {
    pub fn is_ensemble(&self) -> bool {
        self.ensemble_members > 0
    }

    /// Number of member indices the enumerator yields.
    pub fn member_slots(&self) -> u32 {
        match self.naming {
            Naming::Ecmwf { type_slots, .. } => type_slots.len() as u32,
            Naming::Noaa { members: Some(_), .. } => self.ensemble_members.max(1),
            _ => 1,
        }
    }

    pub fn max_horizon(&self, run_hour: u32) -> Option<u32> {
        match self.steps {
            StepTable::Ranges { rules, .. } => rules
                .iter()
                .find(|r| r.hours.matches(run_hour))
                .and_then(|r| expand_segments(r.segments).last().copied()),
            StepTable::Blocks { hours, blocks } => {
                if hours.matches(run_hour) {
                    blocks.last().map(|b| b.end)
                } else {
                    None
                }
            }
        }
    }

    fn variable_catalog(&self) -> &'static [CatalogVariable] {
        match self.naming {
            Naming::Icon { .. } => ICON_VARIABLES,
            Naming::Arpege { .. } => ARPEGE_PACKAGES,
            _ => &[],
        }
    }

    /// Whether files are split per variable (and so need a selection).
    pub fn has_variables(&self) -> bool {
        !self.variable_catalog().is_empty()
    }

    pub fn default_variables(&self) -> Vec<VariableSpec> {
        let names: &[&str] = match self.naming {
            Naming::Icon { .. } => ICON_DEFAULT_VARIABLES,
            Naming::Arpege { .. } => ARPEGE_DEFAULT_PACKAGES,
            _ => &[],
        };
        names.iter().map(|n| VariableSpec::single(*n)).collect()
    }

    /// Resolve a requested variable against the domain's catalogue.
    pub fn resolve_variable(&self, variable: &VariableSpec) -> Result<&'static CatalogVariable> {
        let unknown = || Error::UnknownVariable {
            domain: self.id.to_string(),
            variable: variable.to_string(),
        };
        let entry = lookup(self.variable_catalog(), &variable.name).ok_or_else(unknown)?;
        if !entry.supports(variable.level.kind()) {
            return Err(unknown());
        }
        Ok(entry)
    }

    pub fn stream_for_hour(&self, run_hour: u32) -> Option<&'static str> {
        match self.naming {
            Naming::Ecmwf {
                stream,
                stream_overrides,
                ..
            } => Some(
                stream_overrides
                    .iter()
                    .find(|(h, _)| *h == run_hour)
                    .map(|(_, s)| *s)
                    .unwrap_or(stream),
            ),
            _ => None,
        }
    }

    pub fn package_blocks(&self) -> &'static [PackageBlock] {
        match self.steps {
            StepTable::Blocks { blocks, .. } => blocks,
            StepTable::Ranges { .. } => &[],
        }
    }
}

/// Immutable table of registered domains, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    domains: Vec<ProviderDomain>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            domains: builtin_domains(),
        }
    }

    /// Built-in table with latency and mirror overrides from `config`.
    pub fn with_config(config: &FetchConfig) -> Result<Self> {
        let mut domains = builtin_domains();
        apply_latency_overrides(&mut domains, &config.latency_hours)?;

        if let Some(source) = &config.ecmwf_archive {
            let base = resolve_mirror(source)?;
            for d in domains.iter_mut().filter(|d| d.provider == Provider::Ecmwf) {
                d.hosts.archive = Some(Cow::Owned(base.clone()));
            }
        }

        Ok(Self { domains })
    }

    pub fn get(&self, id: &str) -> Result<&ProviderDomain> {
        self.domains
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::UnknownDomain(id.to_string()))
    }

    pub fn domains(&self) -> &[ProviderDomain] {
        &self.domains
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.domains.iter().map(|d| d.id)
    }
}

fn apply_latency_overrides(
    domains: &mut [ProviderDomain],
    overrides: &BTreeMap<String, i64>,
) -> Result<()> {
    for (id, hours) in overrides {
        check_latency(id, *hours)?;
        let domain = domains
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::UnknownDomain(id.clone()))?;
        domain.latency_hours = *hours;
    }
    Ok(())
}

const SYNOPTIC: RunHours = RunHours::Every(6);
const MAIN_HOURS: RunHours = RunHours::Only(&[0, 12]);
const SHORT_CUTOFF_HOURS: RunHours = RunHours::Only(&[6, 18]);

const GFS_DET: &[HorizonRule] = &[HorizonRule {
    hours: SYNOPTIC,
    segments: &[seg(0, 119, 1), seg(120, 384, 3)],
}];
const GEFS_05: &[HorizonRule] = &[HorizonRule {
    hours: SYNOPTIC,
    segments: &[seg(0, 237, 3), seg(240, 384, 6)],
}];
const GEFS_05_SECOND_FLUSH: &[Segment] = &[seg(390, 840, 6)];
const GEFS_025: &[HorizonRule] = &[HorizonRule {
    hours: SYNOPTIC,
    segments: &[seg(0, 240, 3)],
}];
const NAM: &[HorizonRule] = &[HorizonRule {
    hours: SYNOPTIC,
    segments: &[seg(0, 60, 1)],
}];
const HRRR: &[HorizonRule] = &[
    HorizonRule {
        hours: SYNOPTIC,
        segments: &[seg(0, 48, 1)],
    },
    HorizonRule {
        hours: RunHours::Any,
        segments: &[seg(0, 18, 1)],
    },
];
const HRRR_SUBHOURLY: &[HorizonRule] = &[HorizonRule {
    hours: RunHours::Any,
    segments: &[seg(0, 18, 1)],
}];

const IFS_FULL: &[HorizonRule] = &[
    HorizonRule {
        hours: MAIN_HOURS,
        segments: &[seg(0, 144, 3), seg(150, 360, 6)],
    },
    HorizonRule {
        hours: SHORT_CUTOFF_HOURS,
        segments: &[seg(0, 144, 3)],
    },
];
const IFS_SHORT: &[HorizonRule] = &[
    HorizonRule {
        hours: MAIN_HOURS,
        segments: &[seg(0, 144, 3), seg(150, 240, 6)],
    },
    HorizonRule {
        hours: SHORT_CUTOFF_HOURS,
        segments: &[seg(0, 90, 3)],
    },
];
const AIFS: &[HorizonRule] = &[HorizonRule {
    hours: SYNOPTIC,
    segments: &[seg(0, 360, 6)],
}];

const ICON_GLOBAL: &[HorizonRule] = &[
    HorizonRule {
        hours: SHORT_CUTOFF_HOURS,
        segments: &[seg(0, 78, 1), seg(81, 120, 3)],
    },
    HorizonRule {
        hours: MAIN_HOURS,
        segments: &[seg(0, 78, 1), seg(81, 180, 3)],
    },
];
const ICON_EU: &[HorizonRule] = &[
    HorizonRule {
        hours: SYNOPTIC,
        segments: &[seg(0, 78, 1), seg(81, 120, 3)],
    },
    HorizonRule {
        hours: RunHours::Every(3),
        segments: &[seg(0, 30, 1)],
    },
];
const ICON_D2: &[HorizonRule] = &[HorizonRule {
    hours: RunHours::Every(3),
    segments: &[seg(0, 48, 1)],
}];

const ARPEGE_EUROPE_BLOCKS: &[PackageBlock] = &[
    PackageBlock::new(0, 12),
    PackageBlock::new(13, 24),
    PackageBlock::new(25, 36),
    PackageBlock::new(37, 48),
    PackageBlock::new(49, 60),
    PackageBlock::new(61, 72),
    PackageBlock::new(73, 84),
    PackageBlock::new(85, 96),
    PackageBlock::new(97, 102),
];
const ARPEGE_WORLD_BLOCKS: &[PackageBlock] = &[
    PackageBlock::new(0, 24),
    PackageBlock::new(25, 48),
    PackageBlock::new(49, 72),
    PackageBlock::new(73, 102),
];

const SHORT_CUTOFF_OPER: &[(u32, &str)] = &[(6, "scda"), (18, "scda")];
const SHORT_CUTOFF_WAVE: &[(u32, &str)] = &[(6, "scwv"), (18, "scwv")];

const fn ranges(rules: &'static [HorizonRule]) -> StepTable {
    StepTable::Ranges {
        rules,
        second_flush: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn noaa(
    id: &'static str,
    resolution: &'static str,
    cadence_hours: u32,
    latency_hours: i64,
    payload_mb: u32,
    hosts: HostPair,
    ensemble_members: u32,
    steps: StepTable,
    pattern: &'static str,
) -> ProviderDomain {
    ProviderDomain {
        id,
        provider: Provider::Noaa,
        resolution,
        cadence: Cadence::Hours(cadence_hours),
        latency_hours,
        payload_mb,
        hosts,
        ensemble_members,
        steps,
        naming: Naming::Noaa {
            pattern,
            members: (ensemble_members > 0).then_some(GEFS_MEMBERS),
        },
        compression: None,
    }
}

fn ecmwf(
    id: &'static str,
    resolution: &'static str,
    payload_mb: u32,
    ensemble_members: u32,
    steps: &'static [HorizonRule],
    naming: Naming,
) -> ProviderDomain {
    ProviderDomain {
        id,
        provider: Provider::Ecmwf,
        resolution,
        cadence: Cadence::Hours(6),
        latency_hours: 7,
        payload_mb,
        hosts: HostPair {
            live: Cow::Borrowed(ECMWF_LIVE),
            archive: ecmwf_source_to_base_url("aws").map(Cow::Borrowed),
        },
        ensemble_members,
        steps: ranges(steps),
        naming,
        compression: None,
    }
}

fn ifs(
    model: &'static str,
    resol: &'static str,
    stream: &'static str,
    stream_overrides: &'static [(u32, &'static str)],
    type_slots: &'static [&'static str],
) -> Naming {
    Naming::Ecmwf {
        model,
        resol,
        stream,
        stream_overrides,
        type_slots,
    }
}

fn icon(
    id: &'static str,
    region: &'static str,
    grid: &'static str,
    resolution: &'static str,
    cadence_hours: u32,
    steps: &'static [HorizonRule],
) -> ProviderDomain {
    ProviderDomain {
        id,
        provider: Provider::Dwd,
        resolution,
        cadence: Cadence::Hours(cadence_hours),
        latency_hours: 4,
        payload_mb: 8,
        hosts: HostPair::live_only(DWD_OPENDATA),
        ensemble_members: 0,
        steps: ranges(steps),
        naming: Naming::Icon {
            path: id,
            region,
            grid,
        },
        compression: Some(Compression::Bzip2),
    }
}

fn arpege(
    id: &'static str,
    grid: &'static str,
    resolution: &'static str,
    blocks: &'static [PackageBlock],
) -> ProviderDomain {
    ProviderDomain {
        id,
        provider: Provider::MeteoFrance,
        resolution,
        cadence: Cadence::Hours(6),
        latency_hours: 2,
        payload_mb: 120,
        hosts: HostPair::live_only(METEOFRANCE_PNT),
        ensemble_members: 0,
        steps: StepTable::Blocks {
            hours: SYNOPTIC,
            blocks,
        },
        naming: Naming::Arpege {
            family: "arpege",
            grid,
        },
        compression: None,
    }
}

#[rustfmt::skip]
pub fn builtin_domains() -> Vec<ProviderDomain> {
    let gfs = || HostPair::new(NOMADS_GFS, AWS_GFS);
    let gefs = || HostPair::new(NOMADS_GEFS, AWS_GEFS);
    let hrrr = || HostPair::new(NOMADS_HRRR, AWS_HRRR);

    vec![
        noaa("gfs013", "0p13", 6, 4, 900, gfs(), 0, ranges(GFS_DET),
            "gfs.{yyyymmdd}/{hh}/atmos/gfs.t{hh}z.pgrb2.0p13.f{fff}"),
        noaa("gfs025", "0p25", 6, 4, 500, gfs(), 0, ranges(GFS_DET),
            "gfs.{yyyymmdd}/{hh}/atmos/gfs.t{hh}z.pgrb2.0p25.f{fff}"),
        noaa("gfswave025", "0p25", 6, 4, 20, gfs(), 0, ranges(GFS_DET),
            "gfs.{yyyymmdd}/{hh}/wave/gridded/gfswave.t{hh}z.global.0p25.f{fff}.grib2"),
        noaa("gfswave016", "0p16", 6, 4, 40, gfs(), 0, ranges(GFS_DET),
            "gfs.{yyyymmdd}/{hh}/wave/gridded/gfswave.t{hh}z.global.0p16.f{fff}.grib2"),
        noaa("gfs05_ens", "0p50", 6, 4, 60, gefs(), 31,
            StepTable::Ranges { rules: GEFS_05, second_flush: Some(GEFS_05_SECOND_FLUSH) },
            "gefs.{yyyymmdd}/{hh}/atmos/pgrb2ap5/{member}.t{hh}z.pgrb2a.0p50.f{fff}"),
        noaa("gfs025_ens", "0p25", 6, 4, 250, gefs(), 31, ranges(GEFS_025),
            "gefs.{yyyymmdd}/{hh}/atmos/pgrb2b25/{member}.t{hh}z.pgrb2b.0p25.f{fff}"),
        noaa("gfswave025_ens", "0p25", 6, 4, 20, gefs(), 31, ranges(GEFS_025),
            "gefs.{yyyymmdd}/{hh}/wave/gridded/{member}.t{hh}z.global.0p25.f{fff}.grib2"),
        noaa("nam_conus", "3km", 6, 2, 250, HostPair::new(NOMADS_NAM, AWS_NAM), 0, ranges(NAM),
            "nam.{yyyymmdd}/nam.t{hh}z.conusnest.hiresf{ff}.tm00.grib2"),
        noaa("hrrr_conus", "3km", 1, 2, 150, hrrr(), 0, ranges(HRRR),
            "hrrr.{yyyymmdd}/conus/hrrr.t{hh}z.wrfsfcf{ff}.grib2"),
        noaa("hrrr_conus_15min", "3km", 1, 2, 120, hrrr(), 0, ranges(HRRR_SUBHOURLY),
            "hrrr.{yyyymmdd}/conus/hrrr.t{hh}z.wrfsubhf{ff}.grib2"),
        ecmwf("ifs04", "0p4", 60, 0, IFS_SHORT,
            ifs("ifs", "0p4-beta", "oper", SHORT_CUTOFF_OPER, &["fc"])),
        ecmwf("ifs04_ensemble", "0p4", 1500, 51, IFS_FULL,
            ifs("ifs", "0p4-beta", "enfo", &[], &["ef"])),
        ecmwf("ifs025", "0p25", 120, 0, IFS_FULL,
            ifs("ifs", "0p25", "oper", SHORT_CUTOFF_OPER, &["fc"])),
        ecmwf("ifs025_ensemble", "0p25", 4000, 51, IFS_FULL,
            ifs("ifs", "0p25", "enfo", &[], &["ef"])),
        ecmwf("wam025", "0p25", 10, 0, IFS_FULL,
            ifs("ifs", "0p25", "wave", SHORT_CUTOFF_WAVE, &["fc"])),
        ecmwf("wam025_ensemble", "0p25", 300, 51, IFS_FULL,
            ifs("ifs", "0p25", "waef", &[], &["ef"])),
        ecmwf("aifs025", "0p25", 60, 0, AIFS,
            ifs("aifs-single", "0p25", "oper", &[], &["fc"])),
        ecmwf("aifs025_single", "0p25", 60, 0, AIFS,
            ifs("aifs-single", "0p25", "oper", &[], &["fc"])),
        ecmwf("aifs025_ensemble", "0p25", 1500, 51, AIFS,
            ifs("aifs-ens", "0p25", "enfo", &[], &["cf", "pf"])),
        icon("icon", "global", "icosahedral", "13km", 6, ICON_GLOBAL),
        icon("icon-eu", "europe", "regular-lat-lon", "7km", 3, ICON_EU),
        icon("icon-d2", "germany", "regular-lat-lon", "2km", 3, ICON_D2),
        arpege("arpege_europe", "01", "0p10", ARPEGE_EUROPE_BLOCKS),
        arpege("arpege_world", "025", "0p25", ARPEGE_WORLD_BLOCKS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{Level, LevelType};

    #[test]
    fn unknown_domain_is_reported() {
        let err = Catalog::builtin().get("fake_gfs").unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(ref id) if id == "fake_gfs"));
    }

    #[test]
    fn ids_are_unique() {
        let catalog = Catalog::builtin();
        let mut ids: Vec<_> = catalog.ids().collect();
        let n = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), n);
        assert_eq!(n, 24);
    }

    #[test]
    fn cadences_divide_the_day() {
        for d in Catalog::builtin().domains() {
            if let Cadence::Hours(h) = d.cadence {
                assert_eq!(24 % h, 0, "{}", d.id);
            }
        }
    }

    #[test]
    fn stream_overrides_follow_run_hour() {
        let catalog = Catalog::builtin();
        let ifs = catalog.get("ifs025").unwrap();
        assert_eq!(ifs.stream_for_hour(0), Some("oper"));
        assert_eq!(ifs.stream_for_hour(18), Some("scda"));
        let wam = catalog.get("wam025").unwrap();
        assert_eq!(wam.stream_for_hour(6), Some("scwv"));
        let ens = catalog.get("ifs025_ensemble").unwrap();
        assert_eq!(ens.stream_for_hour(6), Some("enfo"));
    }

    #[test]
    fn resolves_icon_variables_with_level_check() {
        let catalog = Catalog::builtin();
        let icon = catalog.get("icon").unwrap();
        let t = VariableSpec::at("t", Level::Pressure(850));
        assert_eq!(icon.resolve_variable(&t).unwrap().param, "t");
        let bad = VariableSpec::at("t_2m", Level::new(LevelType::Pressure, Some(850)).unwrap());
        assert!(matches!(
            icon.resolve_variable(&bad),
            Err(Error::UnknownVariable { .. })
        ));
        let gfs = catalog.get("gfs025").unwrap();
        assert!(gfs.resolve_variable(&VariableSpec::single("t_2m")).is_err());
        assert!(!gfs.has_variables());
    }

    #[test]
    fn config_overrides_latency_and_mirror() {
        let mut config = FetchConfig::default();
        config.latency_hours.insert("gfs025".into(), 6);
        config.ecmwf_archive = Some("google".into());
        let catalog = Catalog::with_config(&config).unwrap();
        assert_eq!(catalog.get("gfs025").unwrap().latency_hours, 6);
        assert_eq!(
            catalog.get("ifs025").unwrap().hosts.select(true),
            "https://storage.googleapis.com/ecmwf-open-data"
        );

        config.latency_hours.insert("nope".into(), 1);
        assert!(matches!(Catalog::with_config(&config), Err(Error::UnknownDomain(_))));
    }

    #[test]
    fn huge_latency_override_is_rejected() {
        let mut config = FetchConfig::default();
        config.latency_hours.insert("gfs025".into(), 9_223_372_036_854_775);
        assert!(matches!(Catalog::with_config(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn member_slots_by_layout() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.get("gfs05_ens").unwrap().member_slots(), 31);
        assert_eq!(catalog.get("ifs025_ensemble").unwrap().member_slots(), 1);
        assert_eq!(catalog.get("aifs025_ensemble").unwrap().member_slots(), 2);
        assert_eq!(catalog.get("icon").unwrap().member_slots(), 1);
        assert_eq!(GEFS_MEMBERS.render(0), "gec00");
        assert_eq!(GEFS_MEMBERS.render(7), "gep07");
    }
}
