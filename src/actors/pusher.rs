//! AlertPusherActor - Pushes live alerts to the alert sink on a fixed cadence

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::alerts::{AlertRegistry, AlertSink};

use super::messages::PusherCommand;

pub struct AlertPusherActor {
    registry: AlertRegistry,
    sink: Arc<dyn AlertSink>,
    command_rx: mpsc::Receiver<PusherCommand>,
    interval_duration: Duration,
}

impl AlertPusherActor {
    pub fn new(
        registry: AlertRegistry,
        sink: Arc<dyn AlertSink>,
        command_rx: mpsc::Receiver<PusherCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            registry,
            sink,
            command_rx,
            interval_duration,
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting alert pusher");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.push().await {
                        error!("failed to push alerts: {e:#}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PusherCommand::PushNow { respond_to } => {
                            let _ = respond_to.send(self.push().await);
                        }

                        PusherCommand::Shutdown => {
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

        debug!("alert pusher stopped");
    }

    async fn push(&self) -> Result<usize> {
        let alerts = self.registry.collect().await;
        trace!("pushing {} alerts", alerts.len());
        self.sink.send(&alerts).await?;
        Ok(alerts.len())
    }
}

#[derive(Clone)]
pub struct PusherHandle {
    sender: mpsc::Sender<PusherCommand>,
}

impl PusherHandle {
    pub fn spawn(registry: AlertRegistry, sink: Arc<dyn AlertSink>, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = AlertPusherActor::new(registry, sink, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Push immediately and return the number of alerts sent.
    pub async fn push_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PusherCommand::PushNow { respond_to: tx })
            .await
            .context("failed to send PushNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PusherCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
