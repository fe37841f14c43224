//! ChecksFetcherActor - Keeps the active check set up to date
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → download bundle → exactly one signature? → verify → parse → swap ActiveChecks
//!     ↑                                    │ any failure
//!     │                                    ▼
//!     │                         log, keep previous checks
//!     └─── Commands (FetchNow, Shutdown)
//! ```
//!
//! The first tick fires immediately, so checks are fetched on start.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::checks::{Check, ChecksError, Interval, PublicKey, filter_checks, parse_checks, signature};
use crate::config::ChecksConfig;

use super::messages::FetcherCommand;

/// The currently active checks
///
/// Replaced as a whole; readers always see either the old or the new set.
#[derive(Debug, Clone, Default)]
pub struct ActiveChecks {
    checks: Arc<RwLock<Vec<Check>>>,
}

impl ActiveChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, checks: Vec<Check>) {
        *self.checks.write().await = checks;
    }

    pub async fn snapshot(&self) -> Vec<Check> {
        self.checks.read().await.clone()
    }

    pub async fn by_interval(&self, interval: Interval) -> Vec<Check> {
        filter_checks(&self.checks.read().await, interval)
    }

    pub async fn len(&self) -> usize {
        self.checks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Response of the checks service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAllChecksResponse {
    pub file: String,
    #[serde(default)]
    pub signatures: Vec<String>,
}

/// Downloads, verifies and parses check bundles
pub struct ChecksFetcher {
    client: reqwest::Client,
    endpoint: String,
    public_keys: Vec<PublicKey>,
    timeout: Duration,
    file: Option<PathBuf>,
    checks: ActiveChecks,
}

impl ChecksFetcher {
    pub fn new(config: &ChecksConfig, checks: ActiveChecks) -> Result<Self> {
        let public_keys = config
            .public_keys
            .iter()
            .map(|k| PublicKey::decode(k).with_context(|| format!("invalid checks public key {k:?}")))
            .collect::<Result<Vec<_>>>()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("fleet-managed/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build checks client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/check/GetAllChecks",
                config.url.trim_end_matches('/')
            ),
            public_keys,
            timeout: Duration::from_secs(config.timeout),
            file: config.file.clone(),
            checks,
        })
    }

    pub fn checks(&self) -> &ActiveChecks {
        &self.checks
    }

    /// One fetch cycle from the local file or the checks service.
    pub async fn fetch(&self) -> Result<usize, ChecksError> {
        match &self.file {
            Some(file) => self.load_local_checks(file).await,
            None => self.download_checks().await,
        }
    }

    /// Load an unsigned bundle from disk.
    #[instrument(skip(self))]
    pub async fn load_local_checks(&self, file: &Path) -> Result<usize, ChecksError> {
        let content = tokio::fs::read_to_string(file).await?;
        let checks = parse_checks(&content)?;
        let count = checks.len();
        self.checks.replace(checks).await;
        info!("loaded {count} checks from {}", file.display());
        Ok(count)
    }

    /// Download the signed bundle and make it active.
    ///
    /// The active checks are only replaced when the response carries exactly
    /// one signature that verifies, and the bundle parses completely.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn download_checks(&self) -> Result<usize, ChecksError> {
        debug!("downloading checks");

        let response = tokio::time::timeout(self.timeout, self.request())
            .await
            .map_err(|_| ChecksError::Transport(format!("timed out after {:?}", self.timeout)))??;

        if response.signatures.len() != 1 {
            return Err(ChecksError::Verification(format!(
                "expected exactly one signature, got {}",
                response.signatures.len()
            )));
        }
        signature::verify(
            response.file.as_bytes(),
            &self.public_keys,
            &response.signatures[0],
        )?;

        let checks = parse_checks(&response.file)?;
        let count = checks.len();
        self.checks.replace(checks).await;
        info!("downloaded {count} checks");
        Ok(count)
    }

    async fn request(&self) -> Result<GetAllChecksResponse, ChecksError> {
        let transport = |e: reqwest::Error| ChecksError::Transport(e.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ChecksError::Transport(format!(
                "checks service responded with status {}",
                response.status()
            )));
        }

        response.json().await.map_err(transport)
    }
}

/// Actor that runs the fetch loop
pub struct ChecksFetcherActor {
    fetcher: ChecksFetcher,
    command_rx: mpsc::Receiver<FetcherCommand>,
    interval_duration: Duration,
}

impl ChecksFetcherActor {
    pub fn new(
        fetcher: ChecksFetcher,
        command_rx: mpsc::Receiver<FetcherCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            fetcher,
            command_rx,
            interval_duration: interval_duration.max(Duration::from_secs(1)),
        }
    }

    /// Run until Shutdown or until every handle is dropped.
    ///
    /// Fetch failures are logged and retried on the next tick.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting checks fetcher");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.fetcher.fetch().await {
                        error!("failed to fetch checks: {e}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        FetcherCommand::FetchNow { respond_to } => {
                            debug!("received FetchNow command");
                            let result = self.fetcher.fetch().await.map_err(anyhow::Error::from);
                            let _ = respond_to.send(result);
                        }

                        FetcherCommand::Shutdown => {
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

        debug!("checks fetcher stopped");
    }
}

/// Handle for controlling a ChecksFetcherActor
#[derive(Clone)]
pub struct FetcherHandle {
    sender: mpsc::Sender<FetcherCommand>,
    checks: ActiveChecks,
}

impl FetcherHandle {
    pub fn spawn(fetcher: ChecksFetcher, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let checks = fetcher.checks().clone();

        let actor = ChecksFetcherActor::new(fetcher, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            checks,
        }
    }

    pub fn checks(&self) -> &ActiveChecks {
        &self.checks
    }

    /// Fetch immediately and return the number of active checks.
    pub async fn fetch_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FetcherCommand::FetchNow { respond_to: tx })
            .await
            .context("failed to send FetchNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(FetcherCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
