//! # Full-Sync Lifecycle
//!
//! Process-wide owner of the full-synchronization cycle: which job id is
//! currently admitting records, how many records were seeded, and where in
//! the READY -> SEEDING -> SEEDED -> SENDING -> SENT cycle the process is.
//! The manager is an explicitly constructed object handed to every component
//! that needs it; there is no ambient global.

mod full_sync_state_manager;

pub use full_sync_state_manager::FullSyncStateManager;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mode of the singleton full-sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FullSeedState {
    /// No cycle active; admission closed.
    Ready,
    /// Admission open; records join the current job.
    Seeding,
    /// Admission closed; waiting for the batcher to start dispatching.
    Seeded,
    /// The batcher is dispatching outgoing Sedex messages.
    Sending,
    /// All outgoing Sedex messages dispatched.
    Sent,
    Failed,
}

impl fmt::Display for FullSeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Seeding => write!(f, "SEEDING"),
            Self::Seeded => write!(f, "SEEDED"),
            Self::Sending => write!(f, "SENDING"),
            Self::Sent => write!(f, "SENT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for FullSeedState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(Self::Ready),
            "SEEDING" => Ok(Self::Seeding),
            "SEEDED" => Ok(Self::Seeded),
            "SENDING" => Ok(Self::Sending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid full sync state: {s}")),
        }
    }
}
