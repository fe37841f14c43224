use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::util::{Clock, add_duration, system_clock};

/// An alert as pushed to the alert sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAlert {
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub ends_at: DateTime<Utc>,
}

/// An alert with the stable id it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAlert {
    pub id: String,
    pub alert: RegistryAlert,
}

/// Live alert table, replaced as a whole on every evaluation
///
/// There is no delete: an alert missing from the next [`set`](Self::set)
/// disappears immediately, and the sink resolves alerts whose `endsAt`
/// passes without a refresh.
#[derive(Clone)]
pub struct AlertRegistry {
    alerts: Arc<Mutex<HashMap<String, RegistryAlert>>>,
    clock: Clock,
}

impl std::fmt::Debug for AlertRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRegistry").finish_non_exhaustive()
    }
}

impl Default for AlertRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            alerts: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Stamp a new alert with `endsAt = now + ttl`.
    pub fn create_alert(
        &self,
        labels: HashMap<String, String>,
        annotations: HashMap<String, String>,
        ttl: Duration,
    ) -> RegistryAlert {
        RegistryAlert {
            labels,
            annotations,
            ends_at: add_duration((self.clock)(), ttl),
        }
    }

    /// Replace the whole table with `batch`. Later duplicates of an id win.
    pub async fn set(&self, batch: Vec<IdAlert>) {
        let table: HashMap<_, _> = batch
            .into_iter()
            .map(|IdAlert { id, alert }| (id, alert))
            .collect();

        let mut alerts = self.alerts.lock().await;
        debug!(previous = alerts.len(), current = table.len(), "replacing alerts");
        *alerts = table;
    }

    /// Unordered snapshot of the live alerts
    pub async fn collect(&self) -> Vec<RegistryAlert> {
        self.alerts.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.alerts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
