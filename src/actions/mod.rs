//! Dispatch of short-lived diagnostic actions to remote agents
//!
//! ## Flow
//!
//! ```text
//! StartAction → resolve agent (+ exporter DSN) → store pending result → agent transport
//!                                                        ↑
//! GetAction ─────────────── poll ────────────────────────┤
//!                                                        │
//! agent completion report ── whole-record overwrite ─────┘
//! ```
//!
//! Resolution failures happen before anything is stored or sent.

pub mod error;
pub mod inventory;
pub mod kinds;
pub mod resolver;
pub mod service;
pub mod store;
pub mod transport;

pub use error::{ActionError, ErrorCode};
pub use inventory::{Inventory, StaticInventory};
pub use kinds::{Action, ActionKind, ActionState};
pub use service::{ActionService, StartedAction};
pub use store::{ActionResult, Completion, ResultStore};
pub use transport::{AgentTransport, HttpAgentTransport};
