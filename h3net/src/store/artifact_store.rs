//! Versioned, single-writer artifact store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{ActorId, Artifact, ArtifactUpdate};

/// How a remote artifact is merged into the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Higher version wins; on equal versions from different origins the
    /// lexicographically smaller origin wins
    #[default]
    HighestVersion,
    /// Only strictly newer versions are accepted
    StrictlyNewer,
}

/// Why a remote artifact was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Incoming version is older than (or the same write as) the current one
    StaleWrite { current: u64, incoming: u64 },
    /// Equal version from another origin that loses the tie-break
    TieBreakLost { winner: ActorId },
}

/// Result of applying a remote artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { version: u64 },
    Rejected(RejectReason),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Artifact store owned by exactly one actor
///
/// Versions strictly increase per name. Payloads are immutable `Bytes`, so a
/// stored version can be handed out without copying and without aliasing
/// risk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    owner: ActorId,
    artifacts: BTreeMap<String, Artifact>,
}

impl ArtifactStore {
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            artifacts: BTreeMap::new(),
        }
    }

    pub(crate) fn from_artifacts(owner: ActorId, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        Self {
            owner,
            artifacts: artifacts.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    /// Store a locally produced value under the next version for its name
    ///
    /// Always succeeds. Returns the stored artifact.
    pub fn put(&mut self, update: ArtifactUpdate) -> Artifact {
        let version = self.version_of(&update.name).map_or(1, |v| v + 1);
        debug!(owner = %self.owner, name = %update.name, version, "ArtifactStore::put: called");
        let artifact = Artifact::new(update.name, update.kind, update.payload, version, self.owner.clone());
        self.artifacts.insert(artifact.name.clone(), artifact.clone());
        artifact
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    pub fn version_of(&self, name: &str) -> Option<u64> {
        self.artifacts.get(name).map(|a| a.version)
    }

    /// Merge an artifact received from another actor
    ///
    /// Ordering is by version, never by timestamp, so clock skew between
    /// actors cannot reorder writes.
    pub fn apply_remote(&mut self, artifact: Artifact, policy: MergePolicy) -> ApplyOutcome {
        debug!(
            owner = %self.owner,
            name = %artifact.name,
            version = artifact.version,
            origin = %artifact.origin,
            ?policy,
            "ArtifactStore::apply_remote: called"
        );

        if let Some(current) = self.artifacts.get(&artifact.name) {
            let outcome = if artifact.version < current.version {
                Some(RejectReason::StaleWrite {
                    current: current.version,
                    incoming: artifact.version,
                })
            } else if artifact.version == current.version {
                if policy == MergePolicy::StrictlyNewer || artifact.origin == current.origin {
                    Some(RejectReason::StaleWrite {
                        current: current.version,
                        incoming: artifact.version,
                    })
                } else if current.origin < artifact.origin {
                    Some(RejectReason::TieBreakLost {
                        winner: current.origin.clone(),
                    })
                } else {
                    None
                }
            } else {
                None
            };

            if let Some(reason) = outcome {
                warn!(owner = %self.owner, name = %artifact.name, ?reason, "Rejected remote artifact");
                return ApplyOutcome::Rejected(reason);
            }
        }

        let version = artifact.version;
        self.artifacts.insert(artifact.name.clone(), artifact);
        ApplyOutcome::Applied { version }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
