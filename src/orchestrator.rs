//! Artifact fetch loop.
//!
//! Artifacts are produced in a fixed order (members outer, steps inner,
//! variables innermost). With one worker they are fetched in that order;
//! with more, a rayon pool pulls them in parallel and only the counters
//! are shared.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::FetchConfig;
use crate::date::Clock;
use crate::decompress::decompressor_for;
use crate::domain::{Catalog, ProviderDomain};
use crate::error::{FetchError, Result};
use crate::run::RunSpec;
use crate::steps::{cap_steps, enumerate_members, enumerate_steps, member_step_product};
use crate::store::{LocalStore, Published};
use crate::transport::Transport;
use crate::url_builder::{Artifact, UrlBuilder};
use crate::variable::VariableSpec;

/// Shared stop flag. Cancelling stops new requests; in-flight ones finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the caller wants fetched for one domain.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    /// Explicit run time; resolved from the clock when absent.
    pub run: Option<DateTime<Utc>>,
    pub max_forecast_hour: Option<u32>,
    pub max_members: Option<usize>,
    /// Empty means the domain's default selection.
    pub variables: Vec<VariableSpec>,
    pub second_flush: bool,
}

impl FetchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, time: DateTime<Utc>) -> Self {
        self.run = Some(time);
        self
    }

    pub fn max_forecast_hour(mut self, hour: u32) -> Self {
        self.max_forecast_hour = Some(hour);
        self
    }

    pub fn max_members(mut self, n: usize) -> Self {
        self.max_members = Some(n);
        self
    }

    pub fn variables(mut self, variables: Vec<VariableSpec>) -> Self {
        self.variables = variables;
        self
    }

    pub fn second_flush(mut self, on: bool) -> Self {
        self.second_flush = on;
        self
    }
}

/// Summary of one orchestrator run.
///
/// `skipped + attempted + not_started` covers every artifact and
/// `attempted == succeeded + failed`. A download that loses the publish
/// race to another writer counts as skipped. `not_found` is the subset
/// of `failed` that were 404s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub total: u64,
    pub attempted: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub not_found: u64,
    pub not_started: u64,
    pub bytes: u64,
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artifacts: {} downloaded, {} skipped, {} failed ({} not found), {} not started, {} bytes",
            self.total,
            self.succeeded,
            self.skipped,
            self.failed,
            self.not_found,
            self.not_started,
            self.bytes
        )
    }
}

#[derive(Default)]
struct Counters {
    attempted: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    not_found: AtomicU64,
    bytes: AtomicU64,
}

impl Counters {
    fn report(&self, total: u64) -> FetchReport {
        let attempted = self.attempted.load(Ordering::SeqCst);
        let skipped = self.skipped.load(Ordering::SeqCst);
        FetchReport {
            total,
            attempted,
            skipped,
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            not_found: self.not_found.load(Ordering::SeqCst),
            not_started: total.saturating_sub(attempted + skipped),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

enum Outcome {
    NotStarted,
    Skipped,
    Downloaded(u64),
    Failed { url: String, error: FetchError },
}

/// One unit of work. Its URL is rendered only when the request is about
/// to be issued, so host selection sees the clock at that moment.
#[derive(Debug, Clone)]
struct WorkItem {
    step: u32,
    member: u32,
    variable: Option<VariableSpec>,
}

/// State of a single `fetch`/`run` call, shared by its workers.
struct Batch<'b> {
    domain: &'b ProviderDomain,
    run: &'b RunSpec,
    store: &'b LocalStore,
    counters: Counters,
    started: Instant,
    /// Set once this batch's deadline has passed. Never outlives the batch.
    expired: AtomicBool,
}

pub struct Orchestrator<'a> {
    catalog: &'a Catalog,
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    config: &'a FetchConfig,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        transport: &'a dyn Transport,
        clock: &'a dyn Clock,
        config: &'a FetchConfig,
    ) -> Self {
        Self {
            catalog,
            transport,
            clock,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally controlled token, e.g. one tripped by a signal handler.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn builder(&self) -> UrlBuilder<'a> {
        UrlBuilder::new(self.catalog, self.clock)
            .freshness_threshold(self.config.freshness_threshold_hours)
            .force_archive(self.config.force_archive)
    }

    fn resolve(
        &self,
        domain: &ProviderDomain,
        plan: &FetchPlan,
    ) -> Result<(RunSpec, Vec<WorkItem>)> {
        let run = match plan.run {
            Some(time) => RunSpec::new(domain, time)?,
            None => RunSpec::latest(domain, self.clock.now())?,
        };

        let steps = cap_steps(
            enumerate_steps(domain, run.hour(), plan.second_flush)?,
            plan.max_forecast_hour,
        );
        let members = enumerate_members(domain, plan.max_members);
        let variables = if plan.variables.is_empty() {
            domain.default_variables()
        } else {
            plan.variables.clone()
        };

        let items = self.work_items(domain, &run, &steps, &members, &variables)?;
        Ok((run, items))
    }

    /// Members outer, steps inner, variables innermost. Every item is
    /// rendered once here so bad input fails before any network activity.
    fn work_items(
        &self,
        domain: &ProviderDomain,
        run: &RunSpec,
        steps: &[u32],
        members: &[u32],
        variables: &[VariableSpec],
    ) -> Result<Vec<WorkItem>> {
        for v in variables {
            domain.resolve_variable(v)?;
        }

        let mut items = Vec::with_capacity(members.len() * steps.len() * variables.len().max(1));
        for (member, step) in member_step_product(members, steps) {
            if variables.is_empty() {
                items.push(WorkItem { step, member, variable: None });
            } else {
                for v in variables {
                    items.push(WorkItem {
                        step,
                        member,
                        variable: Some(v.clone()),
                    });
                }
            }
        }

        let builder = self.builder();
        for item in &items {
            builder.build_for(domain, run, item.step, item.member, item.variable.as_ref())?;
        }
        Ok(items)
    }

    /// Resolve `plan` and render every artifact as it would be fetched now.
    /// Nothing is downloaded.
    pub fn plan(&self, domain: &str, plan: &FetchPlan) -> Result<(RunSpec, Vec<Artifact>)> {
        let domain = self.catalog.get(domain)?;
        let (run, items) = self.resolve(domain, plan)?;
        let builder = self.builder();
        let artifacts = items
            .iter()
            .map(|item| {
                builder.build_for(domain, &run, item.step, item.member, item.variable.as_ref())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((run, artifacts))
    }

    /// Resolve `plan` and fetch everything into `store`.
    pub fn fetch(&self, domain: &str, plan: &FetchPlan, store: &LocalStore) -> Result<FetchReport> {
        let domain = self.catalog.get(domain)?;
        let (run, items) = self.resolve(domain, plan)?;
        info!(domain = domain.id, run = %run, artifacts = items.len(), "resolved fetch plan");
        self.fetch_items(domain, &run, &items, store)
    }

    /// Fetch the Cartesian product of `steps x members x variables` for `run`.
    pub fn run(
        &self,
        domain: &str,
        run: &RunSpec,
        steps: &[u32],
        members: &[u32],
        variables: &[VariableSpec],
        store: &LocalStore,
    ) -> Result<FetchReport> {
        let domain = self.catalog.get(domain)?;
        let items = self.work_items(domain, run, steps, members, variables)?;
        self.fetch_items(domain, run, &items, store)
    }

    fn fetch_items(
        &self,
        domain: &ProviderDomain,
        run: &RunSpec,
        items: &[WorkItem],
        store: &LocalStore,
    ) -> Result<FetchReport> {
        let batch = Batch {
            domain,
            run,
            store,
            counters: Counters::default(),
            started: Instant::now(),
            expired: AtomicBool::new(false),
        };
        let total = items.len() as u64;

        let result = if self.config.workers <= 1 {
            items.iter().try_for_each(|item| self.fetch_and_count(&batch, item))
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .thread_name(|i| format!("nwp-fetch-{i}"))
                .build()?;
            pool.install(|| {
                items
                    .par_iter()
                    .try_for_each(|item| self.fetch_and_count(&batch, item))
            })
        };

        let report = batch.counters.report(total);
        match result {
            Ok(()) => {
                info!(domain = domain.id, "{report}");
                Ok(report)
            }
            Err(e) => {
                error!(domain = domain.id, error = %e, "aborting: {report}");
                Err(e)
            }
        }
    }

    fn fetch_and_count(&self, batch: &Batch<'_>, item: &WorkItem) -> Result<()> {
        let counters = &batch.counters;
        match self.fetch_one(batch, item)? {
            Outcome::NotStarted => {}
            Outcome::Skipped => {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Downloaded(bytes) => {
                counters.attempted.fetch_add(1, Ordering::SeqCst);
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
                counters.bytes.fetch_add(bytes, Ordering::SeqCst);
            }
            Outcome::Failed { url, error: e } => {
                counters.attempted.fetch_add(1, Ordering::SeqCst);
                counters.failed.fetch_add(1, Ordering::SeqCst);
                if e.is_not_found() {
                    counters.not_found.fetch_add(1, Ordering::SeqCst);
                    warn!(%url, "not published (yet)");
                } else {
                    error!(%url, error = %e, "fetch failed");
                }
            }
        }
        Ok(())
    }

    /// External cancellation or this batch's own deadline.
    fn stopped(&self, batch: &Batch<'_>) -> bool {
        if self.cancel.is_cancelled() || batch.expired.load(Ordering::SeqCst) {
            return true;
        }
        match self.config.deadline() {
            Some(limit) if batch.started.elapsed() >= limit => {
                if !batch.expired.swap(true, Ordering::SeqCst) {
                    warn!("deadline of {limit:?} reached, no new requests will be issued");
                }
                true
            }
            _ => false,
        }
    }

    fn fetch_one(&self, batch: &Batch<'_>, item: &WorkItem) -> Result<Outcome> {
        if self.stopped(batch) {
            return Ok(Outcome::NotStarted);
        }

        let domain = batch.domain;
        let artifact = self.builder().build_for(
            domain,
            batch.run,
            item.step,
            item.member,
            item.variable.as_ref(),
        )?;
        let failed = |error: FetchError| {
            Ok(Outcome::Failed {
                url: artifact.url.clone(),
                error,
            })
        };

        // Cooperative check; the no-clobber publish below settles races.
        if batch.store.contains(&artifact.filename) {
            debug!(file = %artifact.filename, "already present, skipping");
            return Ok(Outcome::Skipped);
        }

        let timeout = self.config.timeout_for(domain.payload_mb);
        debug!(file = %artifact.filename, url = %artifact.url, ?timeout, "requesting");
        let mut payload = match self.transport.fetch(&artifact.url, timeout) {
            Ok(p) => p,
            Err(e) => return failed(e),
        };

        let mut claim = batch.store.claim(&artifact.filename)?;
        let mut decoder = domain.compression.map(decompressor_for);
        let mut buf = vec![0u8; self.config.chunk_size];

        loop {
            let n = match payload.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return failed(FetchError::transport(&artifact.url, e)),
            };
            match decoder.as_mut() {
                Some(d) => match d.feed(&buf[..n]) {
                    Ok(out) => claim.write(&out)?,
                    Err(e) => return failed(e),
                },
                None => claim.write(&buf[..n])?,
            }
        }

        if let Some(d) = decoder.as_mut()
            && let Err(e) = d.finish()
        {
            return failed(e);
        }

        match claim.publish()? {
            Published::Written(bytes) => {
                info!(file = %artifact.filename, bytes, "downloaded");
                Ok(Outcome::Downloaded(bytes))
            }
            Published::AlreadyPresent => {
                debug!(file = %artifact.filename, "published concurrently by another writer");
                Ok(Outcome::Skipped)
            }
        }
    }
}
