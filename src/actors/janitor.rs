//! ResultJanitorActor - Bounds how long action results live
//!
//! Results that stay pending past `pending_timeout` are failed with
//! "action timed out"; finished results are dropped `retention` after
//! they completed. Pollers asking later get NotFound.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use crate::actions::ResultStore;
use crate::config::ActionsConfig;

use super::messages::{JanitorCommand, SweepStats};

pub struct ResultJanitorActor {
    store: ResultStore,
    command_rx: mpsc::Receiver<JanitorCommand>,
    pending_timeout: Duration,
    retention: Duration,
    sweep_interval: Duration,
}

impl ResultJanitorActor {
    pub fn new(store: ResultStore, command_rx: mpsc::Receiver<JanitorCommand>, config: &ActionsConfig) -> Self {
        Self {
            store,
            command_rx,
            pending_timeout: Duration::from_secs(config.pending_timeout),
            retention: Duration::from_secs(config.retention),
            sweep_interval: Duration::from_secs(config.sweep_interval.max(1)),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting result janitor");

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        JanitorCommand::SweepNow { respond_to } => {
                            let _ = respond_to.send(self.sweep().await);
                        }

                        JanitorCommand::Shutdown => {
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

        debug!("result janitor stopped");
    }

    async fn sweep(&self) -> SweepStats {
        let stats = SweepStats {
            expired: self.store.expire_pending(self.pending_timeout).await,
            purged: self.store.purge_finished(self.retention).await,
        };
        if stats != SweepStats::default() {
            info!(expired = stats.expired, purged = stats.purged, "swept action results");
        }
        stats
    }
}

#[derive(Clone)]
pub struct JanitorHandle {
    sender: mpsc::Sender<JanitorCommand>,
}

impl JanitorHandle {
    pub fn spawn(store: ResultStore, config: &ActionsConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = ResultJanitorActor::new(store, cmd_rx, config);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn sweep_now(&self) -> Result<SweepStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(JanitorCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(JanitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
