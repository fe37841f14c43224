// Shared builders for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fleet_managed::actions::inventory::AgentInfo;
use fleet_managed::actions::resolver::{Exporter, ExporterType};
use fleet_managed::actions::{
    Action, ActionService, AgentTransport, Completion, HttpAgentTransport, ResultStore,
    StaticInventory,
};
use fleet_managed::{DelimiterPair, ServiceType, Target};
use serde_json::Value;

pub const MYSQL_DSN: &str = "root:secret@tcp(db:3306)/";

pub fn target(service_id: &str, agent_id: &str) -> Target {
    Target {
        agent_id: agent_id.to_string(),
        service_id: service_id.to_string(),
        service_name: format!("{service_id}-name"),
        service_type: ServiceType::MySQL,
        labels: HashMap::from([("environment".to_string(), "prod".to_string())]),
        connection_string: "root@tcp(db:3306)/".to_string(),
        extra_files: HashMap::new(),
        tls_skip_verify: false,
        delimiter_pair: DelimiterPair::default(),
    }
}

pub fn agent(id: &str, node_id: &str, url: Option<String>) -> AgentInfo {
    AgentInfo {
        id: id.to_string(),
        node_id: node_id.to_string(),
        url,
    }
}

pub fn mysql_exporter(service_id: &str, pmm_agent_id: &str) -> Exporter {
    Exporter {
        agent_id: format!("mysqld-exporter-{service_id}"),
        pmm_agent_id: pmm_agent_id.to_string(),
        service_id: service_id.to_string(),
        exporter_type: ExporterType::MysqldExporter,
        dsn: MYSQL_DSN.to_string(),
    }
}

/// One node with one agent running one MySQL service and its exporter.
pub fn single_agent_inventory(agent_url: Option<String>) -> StaticInventory {
    StaticInventory {
        agents: vec![agent("pmm-agent-1", "node-1", agent_url)],
        targets: vec![target("svc-mysql", "pmm-agent-1")],
        exporters: vec![mysql_exporter("svc-mysql", "pmm-agent-1")],
    }
}

/// Action service talking HTTP to the agents listed in the inventory.
pub fn http_action_service(inventory: StaticInventory) -> ActionService {
    let transport = HttpAgentTransport::new(&inventory.agents, Duration::from_secs(2))
        .expect("failed to build transport");
    ActionService::new(Arc::new(inventory), Arc::new(transport), ResultStore::new())
}

/// In-process agent that answers every query action with fixed rows
pub struct AnsweringAgent {
    store: ResultStore,
    rows: HashMap<String, Value>,
}

impl AnsweringAgent {
    /// `rows` maps a service id to the JSON output its query returns;
    /// actions for any other service fail.
    pub fn new(store: ResultStore, rows: HashMap<String, Value>) -> Self {
        Self { store, rows }
    }
}

#[async_trait]
impl AgentTransport for AnsweringAgent {
    async fn start_action(&self, action: &Action) -> Result<()> {
        let completion = match self.rows.get(&action.owner_id) {
            Some(rows) => Completion::Output(serde_json::to_vec(rows)?),
            None => Completion::Error("connection refused".to_string()),
        };
        self.store.complete(&action.id, completion).await?;
        Ok(())
    }

    async fn stop_action(&self, _action_id: &str, _pmm_agent_id: &str) -> Result<()> {
        Ok(())
    }
}
