//! Directory state machine
//!
//! Owned by the coordinator task and mutated only from there. Readers get an
//! immutable [`DirectorySnapshot`] published after every change.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::entry::{Address, DirectoryEntry, EntryStatus};
use crate::domain::ActorId;
use crate::error::{NetError, NetResult};

/// Reachability change produced by a directory mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    BecameUnreachable(ActorId),
    Restored(ActorId),
}

/// Process-wide registry of actor addresses and liveness
#[derive(Debug)]
pub struct Directory {
    entries: HashMap<ActorId, DirectoryEntry>,
    miss_threshold: u32,
}

impl Directory {
    pub fn new(miss_threshold: u32) -> Self {
        debug!(miss_threshold, "Directory::new: called");
        Self {
            entries: HashMap::new(),
            miss_threshold: miss_threshold.max(1),
        }
    }

    /// Register an actor at `address`
    ///
    /// Joining again refreshes the address; an unreachable entry is restored.
    pub fn join(&mut self, actor: ActorId, address: Address) -> Option<Transition> {
        debug!(%actor, %address, "Directory::join: called");
        match self.entries.get_mut(&actor) {
            Some(entry) => {
                let was_unreachable = entry.status == EntryStatus::Unreachable;
                entry.address = address;
                entry.status = EntryStatus::Joined;
                entry.missed = 0;
                entry.seen_since_sweep = true;
                entry.last_heartbeat = Utc::now();
                was_unreachable.then(|| Transition::Restored(actor))
            }
            None => {
                info!(%actor, "Actor joined directory");
                self.entries.insert(actor.clone(), DirectoryEntry::new(actor, address));
                None
            }
        }
    }

    pub fn leave(&mut self, actor: &ActorId) -> NetResult<()> {
        debug!(%actor, "Directory::leave: called");
        let entry = self
            .entries
            .get_mut(actor)
            .ok_or_else(|| NetError::NotFound(format!("directory entry {}", actor)))?;
        entry.status = EntryStatus::Left;
        info!(%actor, "Actor left directory");
        Ok(())
    }

    /// Address of a joined actor; never a stale one
    pub fn resolve(&self, actor: &ActorId) -> NetResult<Address> {
        resolve_in(&self.entries, actor)
    }

    /// Record a heartbeat, restoring an unreachable entry
    pub fn heartbeat(&mut self, actor: &ActorId) -> NetResult<Option<Transition>> {
        let entry = self
            .entries
            .get_mut(actor)
            .ok_or_else(|| NetError::NotFound(format!("directory entry {}", actor)))?;
        if entry.status == EntryStatus::Left {
            return Err(NetError::Unreachable(actor.clone()));
        }

        entry.last_heartbeat = Utc::now();
        entry.missed = 0;
        entry.seen_since_sweep = true;

        if entry.status == EntryStatus::Unreachable {
            entry.status = EntryStatus::Joined;
            info!(%actor, "Actor reachable again");
            return Ok(Some(Transition::Restored(actor.clone())));
        }
        Ok(None)
    }

    /// Count one heartbeat interval
    ///
    /// Every joined entry that has not heartbeated since the previous sweep
    /// gets a miss; reaching the threshold makes it unreachable.
    pub fn sweep(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.status != EntryStatus::Joined {
                continue;
            }
            if entry.seen_since_sweep {
                entry.seen_since_sweep = false;
                entry.missed = 0;
                continue;
            }
            entry.missed += 1;
            if entry.missed >= self.miss_threshold {
                warn!(actor = %entry.actor, missed = entry.missed, "Actor missed heartbeats, marking unreachable");
                entry.status = EntryStatus::Unreachable;
                transitions.push(Transition::BecameUnreachable(entry.actor.clone()));
            }
        }
        transitions
    }

    pub fn entry(&self, actor: &ActorId) -> Option<&DirectoryEntry> {
        self.entries.get(actor)
    }

    pub fn is_joined(&self, actor: &ActorId) -> bool {
        self.entries.get(actor).is_some_and(|e| e.is_joined())
    }

    pub fn count_by_status(&self, status: EntryStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            entries: self.entries.clone(),
        }
    }
}

fn resolve_in(entries: &HashMap<ActorId, DirectoryEntry>, actor: &ActorId) -> NetResult<Address> {
    match entries.get(actor) {
        Some(entry) if entry.is_joined() => Ok(entry.address.clone()),
        _ => Err(NetError::Unreachable(actor.clone())),
    }
}

/// Immutable view of the directory at one point in time
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    entries: HashMap<ActorId, DirectoryEntry>,
}

impl DirectorySnapshot {
    pub fn resolve(&self, actor: &ActorId) -> NetResult<Address> {
        resolve_in(&self.entries, actor)
    }

    /// Address of a joined or unreachable actor, for liveness probes
    pub fn probe_address(&self, actor: &ActorId) -> NetResult<Address> {
        match self.entries.get(actor) {
            Some(entry) if entry.status != EntryStatus::Left => Ok(entry.address.clone()),
            _ => Err(NetError::Unreachable(actor.clone())),
        }
    }

    pub fn entry(&self, actor: &ActorId) -> Option<&DirectoryEntry> {
        self.entries.get(actor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
