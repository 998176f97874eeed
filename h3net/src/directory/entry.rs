//! Directory entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ActorId;

/// Where an actor can be reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Address {
    /// Mailbox registered with this process's coordinator
    Local,
    /// Reachable through the transport binding at this address
    Remote(String),
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Local => write!(f, "local"),
            Address::Remote(addr) => write!(f, "{}", addr),
        }
    }
}

/// Reachability of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Joined,
    Unreachable,
    Left,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Joined => write!(f, "joined"),
            EntryStatus::Unreachable => write!(f, "unreachable"),
            EntryStatus::Left => write!(f, "left"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DirectoryEntry {
    pub actor: ActorId,
    pub address: Address,
    pub last_heartbeat: DateTime<Utc>,
    pub status: EntryStatus,
    /// Consecutive sweeps without a heartbeat
    pub missed: u32,
    #[serde(skip)]
    pub(crate) seen_since_sweep: bool,
}

impl DirectoryEntry {
    pub(crate) fn new(actor: ActorId, address: Address) -> Self {
        Self {
            actor,
            address,
            last_heartbeat: Utc::now(),
            status: EntryStatus::Joined,
            missed: 0,
            seen_since_sweep: true,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.status == EntryStatus::Joined
    }
}
