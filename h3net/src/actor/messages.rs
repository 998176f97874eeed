//! Actor command messages

use std::path::PathBuf;

use tokio::sync::oneshot;

use super::state::ActorState;
use crate::domain::{Artifact, ArtifactUpdate, LinkId};
use crate::error::NetResult;
use crate::link::Link;
use crate::store::RejectReason;

/// What a local put did beyond storing the value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub name: String,
    pub version: u64,
    /// Push links the new version was sent over
    pub notified: usize,
    /// Sync links that confirmed receipt
    pub acknowledged: usize,
    /// Links that refused the new version, plus sync links that did not
    /// confirm in time or failed delivery; the local write stands either way
    pub unconfirmed: usize,
}

impl PutReceipt {
    /// True when no sync link is left unconfirmed
    pub fn fully_acknowledged(&self) -> bool {
        self.unconfirmed == 0
    }
}

/// Result of a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Applied { version: u64 },
    Rejected(RejectReason),
    NotFound,
}

/// Requests handled by the actor task
#[derive(Debug)]
pub enum ActorCommand {
    Start {
        reply_tx: oneshot::Sender<NetResult<()>>,
    },
    Stop {
        graceful: bool,
        reply_tx: oneshot::Sender<NetResult<ActorState>>,
    },
    Put {
        update: ArtifactUpdate,
        reply_tx: oneshot::Sender<NetResult<PutReceipt>>,
    },
    Get {
        name: String,
        reply_tx: oneshot::Sender<Option<Artifact>>,
    },
    Step {
        reply_tx: oneshot::Sender<NetResult<Vec<PutReceipt>>>,
    },
    Request {
        link_id: LinkId,
        name: String,
        reply_tx: oneshot::Sender<NetResult<PullOutcome>>,
    },
    Snapshot {
        path: PathBuf,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },
    Links {
        reply_tx: oneshot::Sender<Vec<Link>>,
    },
}
