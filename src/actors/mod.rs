//! Long-running tasks of the management core
//!
//! Each actor runs as an independent tokio task, is controlled through an
//! mpsc command channel and answers queries over oneshot channels. Handles
//! are cheap to clone.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ChecksFetcher ──swap──▶ ActiveChecks ◀──read── CheckExecutor ──rows──▶ ActionService
//!                                                       │                      │
//!                                                       │ set()                ▼
//!                                                       ▼                 ResultStore ◀── ResultJanitor
//!                                                 AlertRegistry
//!                                                       │ collect()
//!                                                       ▼
//!                                                  AlertPusher ──▶ Alertmanager
//! ```
//!
//! ## Actor Types
//!
//! - **ChecksFetcherActor**: downloads and verifies signed checks
//! - **CheckExecutorActor**: evaluates checks per interval class
//! - **AlertPusherActor**: pushes live alerts to the sink
//! - **ResultJanitorActor**: times out and drops action results

pub mod executor;
pub mod fetcher;
pub mod janitor;
pub mod messages;
pub mod pusher;
