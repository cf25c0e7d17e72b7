use std::fmt;

use chrono::Duration;

use crate::date::{Clock, yyyymmdd, yyyymmddhh};
use crate::domain::{Catalog, Naming, ProviderDomain};
use crate::error::{Error, Result};
use crate::run::RunSpec;
use crate::variable::{Level, VariableSpec};

pub const ECMWF_PATTERN: &str =
    "{url}/{yyyymmdd}/{H}z/{model}/{resol}/{stream}/{yyyymmddHHMMSS}-{step}h-{stream}-{type}.grib2";
pub const ECMWF_LOCAL_PATTERN: &str = "{domain}_{yyyymmdd}_{H}z_{step}h_{type}.grib2";
pub const NOAA_LOCAL_PATTERN: &str = "{domain}_{yyyymmddHH}_m{MM}_f{FFF}.grib2";
pub const ICON_PATTERN: &str = "{url}/{path}/grib/{H}/{param}/{file}{compression}";
pub const ICON_FILE_PATTERN: &str = "{path}_{region}_{grid}_{leveltype}_{yyyymmddHH}_{FFF}_{level}{PARAM}.grib2";
pub const ARPEGE_PATTERN: &str =
    "{url}/{iso}:00Z/{family}/{grid}/{package}/{family}__{grid}__{package}__{block}__{iso}:00Z.grib2";
pub const ARPEGE_LOCAL_PATTERN: &str = "{domain}_{yyyymmddHH}_{package}_{block}.grib2";

pub const DEFAULT_FRESHNESS_HOURS: i64 = 36;

/// One resolved unit of work. Pure value, owns no resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub run: RunSpec,
    pub step: u32,
    pub member: u32,
    pub variable: Option<VariableSpec>,
    /// Remote location, possibly carrying a compression suffix.
    pub url: String,
    /// Local, decompressed file name.
    pub filename: String,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.filename, self.url)
    }
}

fn fill(pattern: &str, vars: &[(&str, &str)]) -> String {
    let mut out = pattern.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Renders remote URLs and local file names for artifacts.
///
/// Host selection is evaluated per artifact against `clock`, so a long
/// running fetch switches to the archive once a run ages past the
/// freshness threshold.
pub struct UrlBuilder<'a> {
    catalog: &'a Catalog,
    clock: &'a dyn Clock,
    freshness: Duration,
    force_archive: bool,
}

impl<'a> UrlBuilder<'a> {
    pub fn new(catalog: &'a Catalog, clock: &'a dyn Clock) -> Self {
        Self {
            catalog,
            clock,
            freshness: Duration::hours(DEFAULT_FRESHNESS_HOURS),
            force_archive: false,
        }
    }

    pub fn freshness_threshold(mut self, hours: i64) -> Self {
        let saturated = if hours < 0 { Duration::MIN } else { Duration::MAX };
        self.freshness = Duration::try_hours(hours).unwrap_or(saturated);
        self
    }

    pub fn force_archive(mut self, force: bool) -> Self {
        self.force_archive = force;
        self
    }

    pub fn use_archive(&self, run: &RunSpec) -> bool {
        self.force_archive || run.age(self.clock.now()) > self.freshness
    }

    pub fn build(
        &self,
        domain: &str,
        run: &RunSpec,
        step: u32,
        member: u32,
        variable: Option<&VariableSpec>,
    ) -> Result<Artifact> {
        let domain = self.catalog.get(domain)?;
        self.build_for(domain, run, step, member, variable)
    }

    pub fn build_for(
        &self,
        domain: &ProviderDomain,
        run: &RunSpec,
        step: u32,
        member: u32,
        variable: Option<&VariableSpec>,
    ) -> Result<Artifact> {
        if run.domain() != domain.id {
            return Err(Error::InvalidRequest(format!(
                "run {run} does not belong to domain {}",
                domain.id
            )));
        }

        let host = domain.hosts.select(self.use_archive(run));

        let (url, filename) = match domain.naming {
            Naming::Noaa { pattern, members } => {
                if variable.is_some() {
                    return Err(self.no_variables(domain, variable));
                }
                let member_token = match members {
                    Some(tokens) => tokens.render(member),
                    None if member == 0 => String::new(),
                    None => return Err(no_member(domain, member)),
                };
                render_noaa(domain.id, host, pattern, run, step, member, &member_token)
            }
            Naming::Ecmwf {
                model,
                resol,
                type_slots,
                ..
            } => {
                if variable.is_some() {
                    return Err(self.no_variables(domain, variable));
                }
                let typ = type_slots
                    .get(member as usize)
                    .ok_or_else(|| no_member(domain, member))?;
                let stream = domain.stream_for_hour(run.hour()).unwrap_or("oper");
                render_ecmwf(domain.id, host, model, resol, stream, typ, run, step)
            }
            Naming::Icon { path, region, grid } => {
                if member != 0 {
                    return Err(no_member(domain, member));
                }
                let variable = require_variable(domain, variable)?;
                let entry = domain.resolve_variable(variable)?;
                let suffix = domain.compression.map(|c| c.suffix()).unwrap_or("");
                render_icon(
                    host,
                    path,
                    region,
                    grid,
                    entry.param,
                    &variable.level,
                    run,
                    step,
                    suffix,
                )
            }
            Naming::Arpege { family, grid } => {
                if member != 0 {
                    return Err(no_member(domain, member));
                }
                let variable = require_variable(domain, variable)?;
                let entry = domain.resolve_variable(variable)?;
                let block = domain
                    .package_blocks()
                    .iter()
                    .find(|b| b.start == step)
                    .ok_or_else(|| {
                        Error::InvalidRequest(format!(
                            "{} publishes time blocks, step {step} is not a block start",
                            domain.id
                        ))
                    })?;
                render_arpege(domain.id, host, family, grid, entry.param, &block.label(), run)
            }
        };

        Ok(Artifact {
            run: *run,
            step,
            member,
            variable: variable.cloned(),
            url,
            filename,
        })
    }

    fn no_variables(&self, domain: &ProviderDomain, variable: Option<&VariableSpec>) -> Error {
        Error::UnknownVariable {
            domain: domain.id.to_string(),
            variable: variable.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

fn no_member(domain: &ProviderDomain, member: u32) -> Error {
    Error::InvalidRequest(format!(
        "domain {} has no member {member} (slots: {})",
        domain.id,
        domain.member_slots()
    ))
}

fn require_variable<'v>(
    domain: &ProviderDomain,
    variable: Option<&'v VariableSpec>,
) -> Result<&'v VariableSpec> {
    variable.ok_or_else(|| {
        Error::InvalidRequest(format!(
            "domain {} publishes per-variable files, none given",
            domain.id
        ))
    })
}

fn render_noaa(
    domain: &str,
    host: &str,
    pattern: &str,
    run: &RunSpec,
    step: u32,
    member: u32,
    member_token: &str,
) -> (String, String) {
    let t = run.time();
    let ymd = yyyymmdd(&t);
    let hh = t.format("%H").to_string();
    let fff = format!("{step:03}");
    let ff = format!("{step:02}");

    let path = fill(
        pattern,
        &[
            ("yyyymmdd", &ymd),
            ("hh", &hh),
            ("fff", &fff),
            ("ff", &ff),
            ("member", member_token),
        ],
    );
    let filename = fill(
        NOAA_LOCAL_PATTERN,
        &[
            ("domain", domain),
            ("yyyymmddHH", &yyyymmddhh(&t)),
            ("MM", &format!("{member:02}")),
            ("FFF", &fff),
        ],
    );
    (format!("{host}/{path}"), filename)
}

#[allow(clippy::too_many_arguments)]
fn render_ecmwf(
    domain: &str,
    host: &str,
    model: &str,
    resol: &str,
    stream: &str,
    typ: &str,
    run: &RunSpec,
    step: u32,
) -> (String, String) {
    let t = run.time();
    let ymd = yyyymmdd(&t);
    let hh = t.format("%H").to_string();
    let step = step.to_string();

    let url = fill(
        ECMWF_PATTERN,
        &[
            ("url", host),
            ("yyyymmdd", &ymd),
            ("H", &hh),
            ("model", model),
            ("resol", resol),
            ("stream", stream),
            ("yyyymmddHHMMSS", &t.format("%Y%m%d%H%M%S").to_string()),
            ("step", &step),
            ("type", typ),
        ],
    );
    let filename = fill(
        ECMWF_LOCAL_PATTERN,
        &[
            ("domain", domain),
            ("yyyymmdd", &ymd),
            ("H", &hh),
            ("step", &step),
            ("type", typ),
        ],
    );
    (url, filename)
}

/// Leveled products carry the level value right before the variable token.
#[allow(clippy::too_many_arguments)]
fn render_icon(
    host: &str,
    path: &str,
    region: &str,
    grid: &str,
    param: &str,
    level: &Level,
    run: &RunSpec,
    step: u32,
    compression: &str,
) -> (String, String) {
    let t = run.time();
    let level_token = match level.value() {
        Some(v) => format!("{v}_"),
        None => String::new(),
    };

    let file = fill(
        ICON_FILE_PATTERN,
        &[
            ("path", path),
            ("region", region),
            ("grid", grid),
            ("leveltype", level.kind().as_str()),
            ("yyyymmddHH", &yyyymmddhh(&t)),
            ("FFF", &format!("{step:03}")),
            ("level", &level_token),
            ("PARAM", &param.to_ascii_uppercase()),
        ],
    );
    let url = fill(
        ICON_PATTERN,
        &[
            ("url", host),
            ("path", path),
            ("H", &t.format("%H").to_string()),
            ("param", param),
            ("file", &file),
            ("compression", compression),
        ],
    );
    (url, file)
}

fn render_arpege(
    domain: &str,
    host: &str,
    family: &str,
    grid: &str,
    package: &str,
    block: &str,
    run: &RunSpec,
) -> (String, String) {
    let t = run.time();
    let iso = t.format("%Y-%m-%dT%H:%M").to_string();

    let url = fill(
        ARPEGE_PATTERN,
        &[
            ("url", host),
            ("iso", &iso),
            ("family", family),
            ("grid", grid),
            ("package", package),
            ("block", block),
        ],
    );
    let filename = fill(
        ARPEGE_LOCAL_PATTERN,
        &[
            ("domain", domain),
            ("yyyymmddHH", &yyyymmddhh(&t)),
            ("package", package),
            ("block", block),
        ],
    );
    (url, filename)
}
