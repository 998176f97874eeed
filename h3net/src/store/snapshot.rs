//! Optional on-disk snapshots of an artifact store

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::artifact_store::ArtifactStore;
use crate::domain::{ActorId, Artifact};
use crate::error::NetResult;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    owner: ActorId,
    #[serde(rename = "taken-at")]
    taken_at: DateTime<Utc>,
    artifacts: Vec<Artifact>,
}

impl ArtifactStore {
    /// Write every artifact (with its version and origin) to `path`
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> NetResult<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            owner: self.owner().clone(),
            taken_at: Utc::now(),
            artifacts: self.iter().cloned().collect(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;

        info!(owner = %self.owner(), path = %path.display(), count = snapshot.artifacts.len(), "Saved store snapshot");
        Ok(())
    }

    /// Rebuild a store for `owner` from a snapshot file
    ///
    /// Versions and origins are kept, so the restored store keeps rejecting
    /// writes that were already superseded before the snapshot.
    pub fn load_snapshot(owner: ActorId, path: impl AsRef<Path>) -> NetResult<Self> {
        let path = path.as_ref();
        let content = fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&content)?;

        info!(
            %owner,
            previous_owner = %snapshot.owner,
            path = %path.display(),
            count = snapshot.artifacts.len(),
            "Loaded store snapshot"
        );
        Ok(ArtifactStore::from_artifacts(owner, snapshot.artifacts))
    }
}
