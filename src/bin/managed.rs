use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fleet_managed::{
    actions::{ActionService, HttpAgentTransport, ResultStore},
    actors::{
        executor::{ActionRowSource, CheckExecutor, ExecutorHandle},
        fetcher::{ActiveChecks, ChecksFetcher, FetcherHandle},
        janitor::JanitorHandle,
        pusher::PusherHandle,
    },
    alerts::{AlertRegistry, AlertmanagerSink},
    checks::{CheckRunner, FuncRegistry, PrivateNetworks},
    config::{Config, read_config_file},
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Checks are usually not fetched yet when the first runs would start
const EXECUTOR_START_DELAY: Duration = Duration::from_secs(60);

const QUERY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log everything, including per-request traces
    #[arg(short, long)]
    verbose: bool,
}

fn init(args: &Args) {
    let level = if args.quiet {
        LevelFilter::WARN
    } else if args.verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };

    let filter = filter::Targets::new().with_targets(vec![("fleet_managed", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(&args);
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let networks = Arc::new(PrivateNetworks::new());
    let inventory = Arc::new(config.inventory.clone());

    let store = ResultStore::new();
    let transport = HttpAgentTransport::new(
        &config.inventory.agents,
        Duration::from_secs(config.actions.agent_timeout),
    )?;
    let actions = ActionService::new(inventory.clone(), Arc::new(transport), store.clone());
    let janitor = JanitorHandle::spawn(store, &config.actions);

    let checks = ActiveChecks::new();
    let fetcher = ChecksFetcher::new(&config.checks, checks.clone())?;
    let fetcher = FetcherHandle::spawn(fetcher, Duration::from_secs(config.checks.fetch_interval));

    let registry = AlertRegistry::new();
    let rows = ActionRowSource::new(
        actions,
        Duration::from_secs(config.actions.query_timeout),
        QUERY_POLL_INTERVAL,
    );
    let executor = CheckExecutor::new(
        checks,
        inventory,
        Arc::new(rows),
        CheckRunner::new(FuncRegistry::new(networks)),
        registry.clone(),
        config.intervals.clone(),
    );
    let executor = ExecutorHandle::spawn(executor, EXECUTOR_START_DELAY);
    // Query results only arrive through ActionService::report_completion,
    // which nothing in this binary feeds.
    warn!("no agent completion channel is wired in, check queries will time out");

    let pusher = match &config.alerting.alertmanager_url {
        Some(url) => {
            let sink = AlertmanagerSink::new(url, Duration::from_secs(config.alerting.timeout))?;
            Some(PusherHandle::spawn(
                registry,
                Arc::new(sink),
                Duration::from_secs(config.alerting.push_interval.max(1)),
            ))
        }
        None => {
            info!("no Alertmanager configured, alerts are not pushed");
            None
        }
    };

    info!(
        "managing {} services on {} agents",
        config.inventory.targets.len(),
        config.inventory.agents.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    let mut results = vec![
        fetcher.shutdown().await,
        executor.shutdown().await,
        janitor.shutdown().await,
    ];
    if let Some(pusher) = pusher {
        results.push(pusher.shutdown().await);
    }
    for result in results {
        if let Err(e) = result {
            error!("{e:#}");
        }
    }

    Ok(())
}
