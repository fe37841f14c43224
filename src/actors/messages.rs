//! Message types for actor communication
//!
//! Every actor owns an mpsc command channel. Commands that need an answer
//! carry a oneshot sender for the reply.

use tokio::sync::oneshot;

use crate::checks::Interval;

/// Commands that can be sent to the ChecksFetcherActor
#[derive(Debug)]
pub enum FetcherCommand {
    /// Fetch immediately, bypassing the interval timer
    ///
    /// Replies with the number of active checks after the fetch.
    FetchNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    /// Stop the fetch loop
    Shutdown,
}

/// Commands that can be sent to the CheckExecutorActor
#[derive(Debug)]
pub enum ExecutorCommand {
    /// Run all checks of one interval class now
    RunNow {
        interval: Interval,
        respond_to: oneshot::Sender<RunSummary>,
    },

    /// Stop all interval tickers
    Shutdown,
}

/// Outcome of one run of an interval class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Checks of the class that were active
    pub checks: usize,

    /// Findings produced, which equals the alerts recorded for the class
    pub results: usize,
}

/// Commands that can be sent to the AlertPusherActor
#[derive(Debug)]
pub enum PusherCommand {
    /// Push the live alerts now; replies with the number pushed
    PushNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    Shutdown,
}

/// Commands that can be sent to the ResultJanitorActor
#[derive(Debug)]
pub enum JanitorCommand {
    SweepNow {
        respond_to: oneshot::Sender<SweepStats>,
    },

    Shutdown,
}

/// What one janitor sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Pending results failed with a timeout
    pub expired: usize,

    /// Finished results dropped after retention
    pub purged: usize,
}
