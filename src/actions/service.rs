//! Action lifecycle: create, prepare, start, poll and cancel

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::error::ActionError;
use super::inventory::Inventory;
use super::kinds::{Action, ActionKind, ActionState, OwnerKind};
use super::resolver::{ExporterType, resolve_agent, resolve_exporter};
use super::store::{ActionResult, Completion, ResultStore};
use super::transport::AgentTransport;

/// Reply to a successful start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAction {
    pub action_id: String,
    pub pmm_agent_id: String,
}

/// Entry point for dispatching actions and polling their results
#[derive(Clone)]
pub struct ActionService {
    inventory: Arc<dyn Inventory>,
    transport: Arc<dyn AgentTransport>,
    store: ResultStore,
}

impl ActionService {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        transport: Arc<dyn AgentTransport>,
        store: ResultStore,
    ) -> Self {
        Self {
            inventory,
            transport,
            store,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Allocate a new action. No I/O.
    pub fn create(
        &self,
        owner_id: &str,
        pmm_agent_id: Option<&str>,
        kind: ActionKind,
    ) -> Action {
        Action::new(owner_id, pmm_agent_id.unwrap_or_default(), kind)
    }

    /// Bind the action to exactly one agent, and to a DSN when the kind needs one.
    #[instrument(skip(self, action), fields(action_id = %action.id, kind = action.kind.name()))]
    pub async fn prepare(&self, action: &mut Action) -> Result<(), ActionError> {
        let candidates = match action.kind.owner() {
            OwnerKind::Node => self.inventory.agents_for_node(&action.owner_id).await,
            OwnerKind::Service => self.inventory.agents_for_service(&action.owner_id).await,
        }
        .map_err(|e| ActionError::Inventory(format!("{e:#}")))?;

        let pmm_agent_id = resolve_agent(&action.owner_id, &action.pmm_agent_id, &candidates)?;

        let dsn = if action.kind.requires_dsn() {
            Some(self.resolve_dsn(&action.owner_id, &pmm_agent_id).await?)
        } else {
            None
        };

        action.advance(ActionState::Prepared)?;
        action.pmm_agent_id = pmm_agent_id;
        action.dsn = dsn;
        debug!("action bound to {}", action.pmm_agent_id);
        Ok(())
    }

    async fn resolve_dsn(&self, service_id: &str, pmm_agent_id: &str) -> Result<String, ActionError> {
        let service = self
            .inventory
            .service(service_id)
            .await
            .map_err(|e| ActionError::Inventory(format!("{e:#}")))?
            .ok_or_else(|| ActionError::UnknownService(service_id.to_string()))?;

        let expected = ExporterType::for_service(service.service_type);
        let exporters = self
            .inventory
            .exporters(pmm_agent_id, expected)
            .await
            .map_err(|e| ActionError::Inventory(format!("{e:#}")))?;

        resolve_exporter(service_id, expected, &exporters).map(|e| e.dsn.clone())
    }

    /// Record a pending result and hand the action to its agent.
    ///
    /// Does not wait for the action to finish; poll with [`Self::get_action`].
    #[instrument(skip(self, action), fields(action_id = %action.id, kind = action.kind.name()))]
    pub async fn start(&self, action: &mut Action) -> Result<(), ActionError> {
        if action.state() != ActionState::Prepared {
            return Err(ActionError::InvalidTransition {
                from: action.state().as_str(),
                to: ActionState::Dispatched.as_str(),
            });
        }

        self.store
            .store(ActionResult::pending(&action.id, &action.pmm_agent_id))
            .await?;

        if let Err(e) = self.transport.start_action(action).await {
            let message = format!("{e:#}");
            warn!("failed to dispatch action: {message}");
            if let Err(e) = self
                .store
                .complete(&action.id, Completion::Error(message.clone()))
                .await
            {
                warn!("failed to record dispatch failure: {e}");
            }
            action.advance(ActionState::Failed)?;
            return Err(ActionError::Transport(message));
        }

        action.advance(ActionState::Dispatched)
    }

    /// Create, prepare and start an action in one go.
    pub async fn start_action(
        &self,
        owner_id: &str,
        pmm_agent_id: Option<&str>,
        kind: ActionKind,
    ) -> Result<StartedAction, ActionError> {
        let mut action = self.create(owner_id, pmm_agent_id, kind);
        self.prepare(&mut action).await?;
        self.start(&mut action).await?;

        Ok(StartedAction {
            action_id: action.id,
            pmm_agent_id: action.pmm_agent_id,
        })
    }

    pub async fn get_action(&self, action_id: &str) -> Result<ActionResult, ActionError> {
        self.store
            .load(action_id)
            .await
            .ok_or_else(|| ActionError::NotFound(action_id.to_string()))
    }

    /// Send a stop request to the agent running the action.
    ///
    /// Success only means the request was delivered; the stored result is
    /// left for the agent to finish.
    #[instrument(skip(self))]
    pub async fn cancel_action(&self, action_id: &str) -> Result<(), ActionError> {
        let result = self.get_action(action_id).await?;
        self.transport
            .stop_action(&result.id, &result.pmm_agent_id)
            .await
            .map_err(|e| ActionError::Transport(format!("{e:#}")))
    }

    /// Completion path used by the agent connection layer.
    pub async fn report_completion(
        &self,
        action_id: &str,
        completion: Completion,
    ) -> Result<(), ActionError> {
        self.store.complete(action_id, completion).await
    }
}
