//! Inventory lookups needed to resolve actions and check targets
//!
//! Persistence of nodes, services and agents lives outside this crate;
//! the [`Inventory`] trait is the seam it is reached through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ServiceType, Target};

use super::resolver::{Exporter, ExporterType};

/// pmm-agent running on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub node_id: String,
    /// Base URL the agent accepts actions on
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// pmm-agent ids running on the node
    async fn agents_for_node(&self, node_id: &str) -> anyhow::Result<Vec<String>>;

    /// pmm-agent ids that can reach the service
    async fn agents_for_service(&self, service_id: &str) -> anyhow::Result<Vec<String>>;

    /// The service as a check/action target, if it exists
    async fn service(&self, service_id: &str) -> anyhow::Result<Option<Target>>;

    /// Exporters of the given type run by the pmm-agent
    async fn exporters(
        &self,
        pmm_agent_id: &str,
        exporter_type: ExporterType,
    ) -> anyhow::Result<Vec<Exporter>>;

    /// All monitored services of the given type
    async fn targets(&self, service_type: ServiceType) -> anyhow::Result<Vec<Target>>;
}

/// Inventory loaded once from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticInventory {
    #[serde(default)]
    pub agents: Vec<AgentInfo>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub exporters: Vec<Exporter>,
}

impl StaticInventory {
    pub fn agent(&self, id: &str) -> Option<&AgentInfo> {
        self.agents.iter().find(|a| a.id == id)
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn agents_for_node(&self, node_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .agents
            .iter()
            .filter(|a| a.node_id == node_id)
            .map(|a| a.id.clone())
            .collect())
    }

    async fn agents_for_service(&self, service_id: &str) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .targets
            .iter()
            .filter(|t| t.service_id == service_id)
            .map(|t| t.agent_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn service(&self, service_id: &str) -> anyhow::Result<Option<Target>> {
        Ok(self
            .targets
            .iter()
            .find(|t| t.service_id == service_id)
            .cloned())
    }

    async fn exporters(
        &self,
        pmm_agent_id: &str,
        exporter_type: ExporterType,
    ) -> anyhow::Result<Vec<Exporter>> {
        Ok(self
            .exporters
            .iter()
            .filter(|e| e.pmm_agent_id == pmm_agent_id && e.exporter_type == exporter_type)
            .cloned()
            .collect())
    }

    async fn targets(&self, service_type: ServiceType) -> anyhow::Result<Vec<Target>> {
        Ok(self
            .targets
            .iter()
            .filter(|t| t.service_type == service_type)
            .cloned()
            .collect())
    }
}
