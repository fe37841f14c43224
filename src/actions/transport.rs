//! Dispatch of actions to remote pmm-agents
//!
//! One capability covers every action kind: the kind travels as a tagged
//! variant inside the request instead of one start method per kind.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use super::inventory::AgentInfo;
use super::kinds::{Action, ActionKind};

#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Hand the action to its agent. Returns once the agent accepted it.
    async fn start_action(&self, action: &Action) -> Result<()>;

    /// Ask the agent to stop a running action. Best effort.
    async fn stop_action(&self, action_id: &str, pmm_agent_id: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct StartActionRequest<'a> {
    action_id: &'a str,
    #[serde(flatten)]
    kind: &'a ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    dsn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct StopActionRequest<'a> {
    action_id: &'a str,
}

/// Transport posting JSON requests to each agent's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpAgentTransport {
    client: reqwest::Client,
    agents: HashMap<String, String>,
}

impl HttpAgentTransport {
    pub fn new(agents: &[AgentInfo], timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        let agents = agents
            .iter()
            .filter_map(|a| a.url.as_ref().map(|url| (a.id.clone(), url.trim_end_matches('/').to_string())))
            .collect();

        Ok(Self { client, agents })
    }

    fn agent_url(&self, pmm_agent_id: &str) -> Result<&str> {
        self.agents
            .get(pmm_agent_id)
            .map(String::as_str)
            .with_context(|| format!("pmm-agent {pmm_agent_id} has no known address"))
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    #[instrument(skip(self, action), fields(action_id = %action.id, kind = action.kind.name()))]
    async fn start_action(&self, action: &Action) -> Result<()> {
        let url = format!("{}/actions/start", self.agent_url(&action.pmm_agent_id)?);
        let args = match &action.kind {
            ActionKind::PtSummary(params) => Some(params.args()),
            _ => None,
        };
        let request = StartActionRequest {
            action_id: &action.id,
            kind: &action.kind,
            dsn: action.dsn.as_deref(),
            args,
        };

        trace!("dispatching action to {url}");
        self.post(&url, &request).await?;
        debug!("action accepted by {}", action.pmm_agent_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_action(&self, action_id: &str, pmm_agent_id: &str) -> Result<()> {
        let url = format!("{}/actions/stop", self.agent_url(pmm_agent_id)?);
        self.post(&url, &StopActionRequest { action_id }).await
    }
}
