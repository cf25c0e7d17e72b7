use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nwp_opendata::{
    CancelToken, Catalog, FetchConfig, FetchPlan, HttpTransport, Level, LevelType, LocalStore,
    Orchestrator, SystemClock, VariableSpec, parse_run_time,
};

#[derive(Parser)]
#[command(name = "nwp-fetch")]
#[command(about = "Download the latest (or a given) run of an NWP open-data feed.")]
struct CommandLine {
    /// Domain identifier, e.g. gfs025, ifs025, icon-eu, arpege_europe
    #[arg(required_unless_present = "list_domains")]
    domain: Option<String>,

    /// Directory the artifacts are written to
    #[arg(short, long, required_unless_present_any = ["list_domains", "dry_run"])]
    output_dir: Option<PathBuf>,

    /// Run time (YYYYMMDDHH or YYYY-MM-DDTHH); latest published run if omitted
    #[arg(long)]
    run: Option<String>,

    #[arg(long)]
    max_forecast_hour: Option<u32>,

    #[arg(long)]
    max_members: Option<usize>,

    /// Comma separated variables (ICON) or packages (ARPEGE)
    #[arg(long)]
    variables: Option<String>,

    #[arg(long, default_value = "single-level")]
    level_type: String,

    /// Level value for pressure or model level variables
    #[arg(long)]
    level: Option<u32>,

    /// Always use the archive host
    #[arg(long)]
    archive: bool,

    /// Include the extended second-flush horizon where published
    #[arg(long)]
    second_flush: bool,

    #[arg(long)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop issuing new requests after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Print the registered domains and exit
    #[arg(long)]
    list_domains: bool,

    /// Print url and file name pairs without downloading
    #[arg(long)]
    dry_run: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &CommandLine) -> anyhow::Result<FetchConfig> {
    let mut config = match &cli.config {
        Some(path) => FetchConfig::from_json_file(path)?,
        None => FetchConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if cli.deadline_secs.is_some() {
        config.deadline_secs = cli.deadline_secs;
    }
    config.force_archive |= cli.archive;
    config.validate()?;
    Ok(config)
}

fn build_plan(cli: &CommandLine) -> anyhow::Result<FetchPlan> {
    let mut plan = FetchPlan::new().second_flush(cli.second_flush);
    if let Some(text) = &cli.run {
        plan = plan.run(parse_run_time(text)?);
    }
    if let Some(hour) = cli.max_forecast_hour {
        plan = plan.max_forecast_hour(hour);
    }
    if let Some(n) = cli.max_members {
        plan = plan.max_members(n);
    }
    if let Some(list) = &cli.variables {
        let kind: LevelType = cli.level_type.parse()?;
        let level = Level::new(kind, cli.level)?;
        plan = plan.variables(VariableSpec::parse_list(list, level));
    }
    Ok(plan)
}

fn run(cli: CommandLine) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let catalog = Catalog::with_config(&config)?;

    if cli.list_domains {
        for domain in catalog.domains() {
            let provider = format!("{:?}", domain.provider);
            println!(
                "{:<18} {:<12} {:<6} {}",
                domain.id, provider, domain.resolution, domain.cadence
            );
        }
        return Ok(());
    }

    let domain = cli.domain.as_deref().context("a domain is required")?;
    let plan = build_plan(&cli)?;
    let transport = HttpTransport::new()?;
    let orch = Orchestrator::new(&catalog, &transport, &SystemClock, &config);

    if cli.dry_run {
        let (run, artifacts) = orch.plan(domain, &plan)?;
        eprintln!("{run}: {} artifacts", artifacts.len());
        for artifact in &artifacts {
            println!("{}\t{}", artifact.url, artifact.filename);
        }
        return Ok(());
    }

    let output_dir = cli.output_dir.as_ref().context("--output-dir is required")?;
    let store = LocalStore::open(output_dir)?;
    cancel_on_signal(orch.cancel_token())?;
    let report = orch.fetch(domain, &plan, &store)?;
    println!("{report}");
    Ok(())
}

/// Trip `token` on SIGINT/SIGTERM so in-flight downloads finish and their
/// temporary files are cleaned up instead of the process dying mid-write.
/// Handlers are registered before this returns.
fn cancel_on_signal(token: CancelToken) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start signal listener")?;
    let shutdown = {
        let _guard = rt.enter();
        match shutdown_signal() {
            Ok(fut) => fut,
            Err(e) => {
                warn!(error = %e, "could not register signal handlers, Ctrl+C will abort");
                return Ok(());
            }
        }
    };
    std::thread::Builder::new()
        .name("nwp-signal".into())
        .spawn(move || {
            rt.block_on(shutdown);
            warn!("interrupted, finishing in-flight downloads");
            token.cancel();
        })
        .context("cannot start signal listener")?;
    Ok(())
}

#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C"),
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    })
}

fn main() -> ExitCode {
    let cli = CommandLine::parse();
    init_logging();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sigint_trips_the_cancel_token() {
        let token = CancelToken::new();
        cancel_on_signal(token.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        for _ in 0..500 {
            if token.is_cancelled() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(token.is_cancelled());
    }
}
