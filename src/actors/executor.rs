//! CheckExecutorActor - Runs active checks against monitored services
//!
//! ## Message Flow
//!
//! ```text
//! interval tick (standard | rare | frequent)
//!     → active checks of that class
//!     → targets per service type (inventory)
//!     → rows per target (RowSource, a query action)
//!     → sandboxed evaluation (CheckRunner)
//!     → alerts of that class
//!     → AlertRegistry::set(alerts of every class)
//! ```
//!
//! The registry is replaced as a whole, so the last batch of every class
//! is kept and merged before each `set`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use crate::Target;
use crate::actions::{ActionService, Inventory};
use crate::alerts::{AlertRegistry, IdAlert, alert_ttl, to_alert};
use crate::checks::{Check, CheckRunner, Interval};
use crate::config::IntervalsConfig;

use super::fetcher::ActiveChecks;
use super::messages::{ExecutorCommand, RunSummary};

/// Source of the rows a check evaluates for one target
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn rows(&self, check: &Check, target: &Target) -> Result<Vec<Value>>;
}

/// Collects rows by running the check's query action on the target's agent
#[derive(Clone)]
pub struct ActionRowSource {
    actions: ActionService,
    deadline: Duration,
    poll_interval: Duration,
}

impl ActionRowSource {
    pub fn new(actions: ActionService, deadline: Duration, poll_interval: Duration) -> Self {
        Self {
            actions,
            deadline,
            poll_interval,
        }
    }
}

/// Query output is a JSON list of rows, or a single document.
fn parse_rows(output: &[u8]) -> Result<Vec<Value>> {
    match serde_json::from_slice(output).context("query output is not JSON")? {
        Value::Array(rows) => Ok(rows),
        doc @ Value::Object(_) => Ok(vec![doc]),
        other => bail!("unexpected query output {other}"),
    }
}

#[async_trait]
impl RowSource for ActionRowSource {
    #[instrument(skip_all, fields(check = %check.name, service_id = %target.service_id))]
    async fn rows(&self, check: &Check, target: &Target) -> Result<Vec<Value>> {
        let kind = check.check_type.action_kind(&check.query);
        let started = self
            .actions
            .start_action(&target.service_id, Some(&target.agent_id), kind)
            .await?;
        trace!(action_id = %started.action_id, "query action started");

        let deadline = Instant::now() + self.deadline;
        loop {
            let result = self.actions.get_action(&started.action_id).await?;
            if result.done {
                if !result.error.is_empty() {
                    bail!("query action failed: {}", result.error);
                }
                return parse_rows(&result.output);
            }

            if Instant::now() >= deadline {
                if let Err(e) = self.actions.cancel_action(&started.action_id).await {
                    warn!(action_id = %started.action_id, "failed to cancel query action: {e}");
                }
                bail!("query action did not finish within {:?}", self.deadline);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Evaluates the checks of one interval class and records their alerts
pub struct CheckExecutor {
    checks: ActiveChecks,
    inventory: Arc<dyn Inventory>,
    rows: Arc<dyn RowSource>,
    runner: CheckRunner,
    registry: AlertRegistry,
    intervals: IntervalsConfig,
    batches: HashMap<Interval, Vec<IdAlert>>,
}

impl CheckExecutor {
    pub fn new(
        checks: ActiveChecks,
        inventory: Arc<dyn Inventory>,
        rows: Arc<dyn RowSource>,
        runner: CheckRunner,
        registry: AlertRegistry,
        intervals: IntervalsConfig,
    ) -> Self {
        Self {
            checks,
            inventory,
            rows,
            runner,
            registry,
            intervals,
            batches: HashMap::new(),
        }
    }

    async fn gather(&self, check: &Check) -> Result<Vec<(Target, Vec<Value>)>> {
        let targets = self
            .inventory
            .targets(check.service_type())
            .await
            .map_err(|e| anyhow!("failed to list {} targets: {e:#}", check.service_type()))?;

        let gathered = join_all(targets.into_iter().map(|target| async move {
            let rows = self.rows.rows(check, &target).await;
            (target, rows)
        }))
        .await;

        Ok(gathered
            .into_iter()
            .filter_map(|(target, rows)| match rows {
                Ok(rows) => Some((target, rows)),
                Err(e) => {
                    warn!(check = %check.name, service_id = %target.service_id, "failed to collect rows: {e:#}");
                    None
                }
            })
            .collect())
    }

    /// Run every active check of the class and replace the live alerts.
    #[instrument(skip_all, fields(interval = interval.as_str()))]
    pub async fn run_interval(&mut self, interval: Interval) -> RunSummary {
        let checks = self.checks.by_interval(interval).await;
        let ttl = alert_ttl(self.intervals.resend_interval(interval));
        debug!("running {} checks", checks.len());

        let mut alerts = vec![];
        let mut results = 0;
        for check in &checks {
            let inputs = match self.gather(check).await {
                Ok(inputs) => inputs,
                Err(e) => {
                    warn!(check = %check.name, "skipping check: {e:#}");
                    continue;
                }
            };

            let found = self.runner.run_check(check, inputs).await;
            results += found.len();
            alerts.extend(found.iter().map(|r| to_alert(&self.registry, r, ttl)));
        }

        self.batches.insert(interval, alerts);
        let merged: Vec<IdAlert> = self.batches.values().flatten().cloned().collect();
        self.registry.set(merged).await;

        info!("{} checks produced {results} results", checks.len());
        RunSummary {
            checks: checks.len(),
            results,
        }
    }
}

/// Actor running one ticker per interval class
pub struct CheckExecutorActor {
    executor: CheckExecutor,
    command_rx: mpsc::Receiver<ExecutorCommand>,
    start_delay: Duration,
}

impl CheckExecutorActor {
    pub fn new(
        executor: CheckExecutor,
        command_rx: mpsc::Receiver<ExecutorCommand>,
        start_delay: Duration,
    ) -> Self {
        Self {
            executor,
            command_rx,
            start_delay,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting check executor");

        let start = Instant::now() + self.start_delay;
        let schedule = |interval: Interval| {
            let mut ticker = interval_at(start, self.executor.intervals.resend_interval(interval));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        };
        let mut standard = schedule(Interval::Standard);
        let mut rare = schedule(Interval::Rare);
        let mut frequent = schedule(Interval::Frequent);

        loop {
            tokio::select! {
                _ = standard.tick() => {
                    self.executor.run_interval(Interval::Standard).await;
                }

                _ = rare.tick() => {
                    self.executor.run_interval(Interval::Rare).await;
                }

                _ = frequent.tick() => {
                    self.executor.run_interval(Interval::Frequent).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ExecutorCommand::RunNow { interval, respond_to } => {
                            debug!("received RunNow command");
                            let summary = self.executor.run_interval(interval).await;
                            let _ = respond_to.send(summary);
                        }

                        ExecutorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("check executor stopped");
    }
}

/// Handle for controlling a CheckExecutorActor
#[derive(Clone)]
pub struct ExecutorHandle {
    sender: mpsc::Sender<ExecutorCommand>,
}

impl ExecutorHandle {
    /// Spawn the executor; the first scheduled runs happen after `start_delay`.
    pub fn spawn(executor: CheckExecutor, start_delay: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = CheckExecutorActor::new(executor, cmd_rx, start_delay);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run the checks of one class immediately.
    pub async fn run_now(&self, interval: Interval) -> Result<RunSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ExecutorCommand::RunNow {
                interval,
                respond_to: tx,
            })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ExecutorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
