use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Vertical coordinate of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelType {
    Single,
    Pressure,
    Model,
}

impl LevelType {
    pub fn as_str(self) -> &'static str {
        match self {
            LevelType::Single => "single-level",
            LevelType::Pressure => "pressure-level",
            LevelType::Model => "model-level",
        }
    }
}

impl FromStr for LevelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-level" | "single" | "sl" | "surface" => Ok(LevelType::Single),
            "pressure-level" | "pressure" | "pl" => Ok(LevelType::Pressure),
            "model-level" | "model" | "ml" => Ok(LevelType::Model),
            other => Err(Error::InvalidRequest(format!("unknown level type: {other}"))),
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level descriptor. Leveled variants always carry their value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Single,
    Pressure(u32),
    Model(u32),
}

impl Level {
    /// A level value is required iff the type is not single-level.
    pub fn new(kind: LevelType, value: Option<u32>) -> Result<Self> {
        match (kind, value) {
            (LevelType::Single, None) => Ok(Level::Single),
            (LevelType::Single, Some(v)) => Err(Error::InvalidRequest(format!(
                "single-level products take no level value, got {v}"
            ))),
            (LevelType::Pressure, Some(v)) => Ok(Level::Pressure(v)),
            (LevelType::Model, Some(v)) => Ok(Level::Model(v)),
            (kind, None) => Err(Error::InvalidRequest(format!("{kind} requires a level value"))),
        }
    }

    pub fn kind(&self) -> LevelType {
        match self {
            Level::Single => LevelType::Single,
            Level::Pressure(_) => LevelType::Pressure,
            Level::Model(_) => LevelType::Model,
        }
    }

    pub fn value(&self) -> Option<u32> {
        match self {
            Level::Single => None,
            Level::Pressure(v) | Level::Model(v) => Some(*v),
        }
    }
}

/// A named physical quantity (or product package) plus its level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableSpec {
    pub name: String,
    pub level: Level,
}

impl VariableSpec {
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::Single,
        }
    }

    pub fn at(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// Split a comma separated list (`"t_2m, u_10m"` or `"[t, u]"`) and
    /// attach the same level to every entry.
    pub fn parse_list(s: &str, level: Level) -> Vec<VariableSpec> {
        let mut t = s.trim();
        if t.starts_with('[') && t.ends_with(']') && t.len() >= 2 {
            t = t[1..t.len() - 1].trim();
        }
        t.split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(|x| VariableSpec::at(x, level))
            .collect()
    }
}

impl fmt::Display for VariableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level.value() {
            Some(v) => write!(f, "{}@{}:{v}", self.name, self.level.kind()),
            None => f.write_str(&self.name),
        }
    }
}

/// Entry of a provider's variable catalogue.
#[derive(Debug, Clone, Copy)]
pub struct CatalogVariable {
    /// Token used in remote paths.
    pub param: &'static str,
    pub aliases: &'static [&'static str],
    pub levels: &'static [LevelType],
}

impl CatalogVariable {
    pub fn matches(&self, name: &str) -> bool {
        self.param.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn supports(&self, kind: LevelType) -> bool {
        self.levels.contains(&kind)
    }
}

const SL: &[LevelType] = &[LevelType::Single];
const PL_ML: &[LevelType] = &[LevelType::Pressure, LevelType::Model];
const PL: &[LevelType] = &[LevelType::Pressure];
const ML: &[LevelType] = &[LevelType::Model];

const fn var(
    param: &'static str,
    aliases: &'static [&'static str],
    levels: &'static [LevelType],
) -> CatalogVariable {
    CatalogVariable {
        param,
        aliases,
        levels,
    }
}

pub const ICON_VARIABLES: &[CatalogVariable] = &[
    var("t_2m", &["temperature_2m"], SL),
    var("td_2m", &["dew_point_2m"], SL),
    var("relhum_2m", &["relative_humidity_2m"], SL),
    var("u_10m", &["wind_u_component_10m"], SL),
    var("v_10m", &["wind_v_component_10m"], SL),
    var("vmax_10m", &["wind_gusts_10m"], SL),
    var("tot_prec", &["precipitation"], SL),
    var("pmsl", &["pressure_msl"], SL),
    var("ps", &["surface_pressure"], SL),
    var("clct", &["cloud_cover"], SL),
    var("asob_s", &["shortwave_radiation"], SL),
    var("t_g", &["ground_temperature"], SL),
    var("t", &["temperature"], PL_ML),
    var("u", &["wind_u_component"], PL_ML),
    var("v", &["wind_v_component"], PL_ML),
    var("fi", &["geopotential"], PL),
    var("relhum", &["relative_humidity"], PL),
    var("omega", &["vertical_velocity"], PL),
    var("p", &["pressure"], ML),
    var("qv", &["specific_humidity"], ML),
];

pub const ICON_DEFAULT_VARIABLES: &[&str] = &["t_2m", "u_10m", "v_10m", "tot_prec", "pmsl"];

/// ARPEGE packages behave like single-level "variables" of the domain.
pub const ARPEGE_PACKAGES: &[CatalogVariable] = &[
    var("SP1", &[], SL),
    var("SP2", &[], SL),
    var("SP3", &[], SL),
    var("HP1", &[], SL),
    var("HP2", &[], SL),
    var("IP1", &[], SL),
    var("IP2", &[], SL),
    var("IP3", &[], SL),
    var("IP4", &[], SL),
];

pub const ARPEGE_DEFAULT_PACKAGES: &[&str] = &["SP1", "SP2", "HP1", "IP1"];

pub fn lookup<'a>(catalog: &'a [CatalogVariable], name: &str) -> Option<&'a CatalogVariable> {
    catalog.iter().find(|v| v.matches(name.trim()))
}
