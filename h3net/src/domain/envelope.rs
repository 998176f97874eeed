//! Mailbox messages

use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::id::{ActorId, LinkId};
use crate::error::NetResult;
use crate::link::Link;

/// Control signals exchanged between the coordinator and actors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum ControlSignal {
    /// A link touching the recipient was created
    LinkEstablished { link: Link },

    /// A link was torn down; forget it
    LinkBroken {
        #[serde(rename = "link-id")]
        link_id: LinkId,
    },

    /// Propagation over a link is paused
    LinkDegraded {
        #[serde(rename = "link-id")]
        link_id: LinkId,
    },

    /// A degraded link is active again
    LinkRestored {
        #[serde(rename = "link-id")]
        link_id: LinkId,
    },

    /// Liveness ping from a peer
    Heartbeat { from: ActorId },

    /// Ask the recipient to re-send its latest version of every name it shares over the link
    ResyncRequest {
        #[serde(rename = "link-id")]
        link_id: LinkId,
    },

    /// Consumer asks the producer for the current value of `name`
    PullRequest {
        #[serde(rename = "request-id")]
        request_id: String,
        name: String,
    },

    /// Producer's answer to a pull request; `None` means not found
    PullResponse {
        #[serde(rename = "request-id")]
        request_id: String,
        name: String,
        artifact: Option<Artifact>,
    },
}

impl ControlSignal {
    /// Signals that may be evicted from a full mailbox
    pub fn is_droppable(&self) -> bool {
        matches!(self, ControlSignal::Heartbeat { .. })
    }
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Body {
    Artifact(Artifact),
    Control(ControlSignal),
}

/// A message addressed to one actor
///
/// `sequence` is monotonic per (sender, recipient) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ActorId,
    pub recipient: ActorId,
    #[serde(rename = "link-id")]
    pub link_id: Option<LinkId>,
    pub sequence: u64,
    pub body: Body,
}

impl Envelope {
    pub fn artifact(sender: ActorId, recipient: ActorId, link_id: LinkId, sequence: u64, artifact: Artifact) -> Self {
        Self {
            sender,
            recipient,
            link_id: Some(link_id),
            sequence,
            body: Body::Artifact(artifact),
        }
    }

    pub fn control(
        sender: ActorId,
        recipient: ActorId,
        link_id: Option<LinkId>,
        sequence: u64,
        signal: ControlSignal,
    ) -> Self {
        Self {
            sender,
            recipient,
            link_id,
            sequence,
            body: Body::Control(signal),
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self.body, Body::Artifact(_))
    }

    /// Whether a full mailbox may evict this message
    pub fn is_droppable(&self) -> bool {
        match &self.body {
            Body::Artifact(_) => false,
            Body::Control(signal) => signal.is_droppable(),
        }
    }

    /// Encode for a transport binding
    pub fn encode(&self) -> NetResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode bytes received from a transport binding
    pub fn decode(bytes: &[u8]) -> NetResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
