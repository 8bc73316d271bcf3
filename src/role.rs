//! Process role: which halves of the relay a process runs.
//!
//! `Role` is used as the `--role` CLI flag value. The listener and worker
//! only share the queue, so they can run in separate processes or together.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which loops the process starts.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Slack Socket Mode listener and HTTP intake; produces envelopes.
    Listener,
    /// Queue consumer running the intent pipeline; consumes envelopes.
    Worker,
    /// Both listener and worker in one process. Default.
    #[default]
    All,
}

impl Role {
    /// Whether this role receives Slack events and enqueues envelopes.
    #[must_use]
    pub fn runs_listener(self) -> bool {
        matches!(self, Self::Listener | Self::All)
    }

    /// Whether this role drains the queue.
    #[must_use]
    pub fn runs_worker(self) -> bool {
        matches!(self, Self::Worker | Self::All)
    }
}
