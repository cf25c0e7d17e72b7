use crate::domain::ProviderDomain;
use crate::error::{Error, Result};

/// Inclusive lead-time range `start..=end` with stride `by` (hours).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
    pub by: u32,
}

pub const fn seg(start: u32, end: u32, by: u32) -> Segment {
    Segment { start, end, by }
}

/// Which run hours a horizon rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunHours {
    Any,
    /// `hour % n == 0`
    Every(u32),
    Only(&'static [u32]),
}

impl RunHours {
    pub fn matches(self, hour: u32) -> bool {
        match self {
            RunHours::Any => true,
            RunHours::Every(n) => n != 0 && hour % n == 0,
            RunHours::Only(hours) => hours.contains(&hour),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HorizonRule {
    pub hours: RunHours,
    pub segments: &'static [Segment],
}

/// Contiguous lead-time block published as one file ("000H012H").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageBlock {
    pub start: u32,
    pub end: u32,
}

impl PackageBlock {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn label(&self) -> String {
        format!("{:03}H{:03}H", self.start, self.end)
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start..=self.end).contains(&hour)
    }
}

/// Publishing schedule of a domain.
///
/// Rules are tried in order; the first matching run hour wins.
#[derive(Debug, Clone, Copy)]
pub enum StepTable {
    Ranges {
        rules: &'static [HorizonRule],
        /// Late long-range publication, disjoint from the normal table.
        second_flush: Option<&'static [Segment]>,
    },
    Blocks {
        hours: RunHours,
        blocks: &'static [PackageBlock],
    },
}

impl StepTable {
    pub fn publishes(&self, run_hour: u32) -> bool {
        match self {
            StepTable::Ranges { rules, .. } => rules.iter().any(|r| r.hours.matches(run_hour)),
            StepTable::Blocks { hours, .. } => hours.matches(run_hour),
        }
    }

    pub fn has_second_flush(&self) -> bool {
        matches!(self, StepTable::Ranges { second_flush: Some(_), .. })
    }
}

/// Concatenate segments, dropping anything not strictly after the
/// previous value so seams never produce duplicates.
pub fn expand_segments(segments: &[Segment]) -> Vec<u32> {
    let mut out: Vec<u32> = Vec::new();
    for s in segments {
        if s.by == 0 {
            continue;
        }
        for step in (s.start..=s.end).step_by(s.by as usize) {
            if out.last().is_none_or(|&last| step > last) {
                out.push(step);
            }
        }
    }
    out
}

/// Lead times published for a run of `domain` at `run_hour`.
///
/// Block-packaged domains return block start hours.
pub fn enumerate_steps(
    domain: &ProviderDomain,
    run_hour: u32,
    second_flush: bool,
) -> Result<Vec<u32>> {
    let invalid_hour = || Error::InvalidRunHour {
        domain: domain.id.to_string(),
        hour: run_hour,
    };

    match domain.steps {
        StepTable::Ranges { rules, second_flush: flush } => {
            let rule = rules.iter().find(|r| r.hours.matches(run_hour)).ok_or_else(invalid_hour)?;
            if second_flush {
                let flush = flush.ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "domain {} has no second-flush publication",
                        domain.id
                    ))
                })?;
                return Ok(expand_segments(flush));
            }
            Ok(expand_segments(rule.segments))
        }
        StepTable::Blocks { hours, blocks } => {
            if second_flush {
                return Err(Error::InvalidRequest(format!(
                    "domain {} has no second-flush publication",
                    domain.id
                )));
            }
            if !hours.matches(run_hour) {
                return Err(invalid_hour());
            }
            Ok(expand_blocks(blocks))
        }
    }
}

fn expand_blocks(blocks: &[PackageBlock]) -> Vec<u32> {
    let mut out: Vec<u32> = Vec::with_capacity(blocks.len());
    for b in blocks {
        if out.last().is_none_or(|&last| b.start > last) {
            out.push(b.start);
        }
    }
    out
}

/// Apply a caller's horizon cap. Blocks are kept or dropped whole by start hour.
pub fn cap_steps(steps: Vec<u32>, max_forecast_hour: Option<u32>) -> Vec<u32> {
    match max_forecast_hour {
        Some(max) => steps.into_iter().filter(|s| *s <= max).collect(),
        None => steps,
    }
}

/// Member indices 0 (control) ..N, truncated by `cap`.
pub fn enumerate_members(domain: &ProviderDomain, cap: Option<usize>) -> Vec<u32> {
    let total = domain.member_slots();
    let n = match cap {
        Some(cap) => total.min(u32::try_from(cap).unwrap_or(u32::MAX)),
        None => total,
    };
    (0..n).collect()
}

/// Members outer, steps inner.
pub fn member_step_product(members: &[u32], steps: &[u32]) -> Vec<(u32, u32)> {
    members
        .iter()
        .flat_map(|&m| steps.iter().map(move |&s| (m, s)))
        .collect()
}
