//! Message types for the Coordinator

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::actor::ActorState;
use crate::directory::{Address, DirectoryEntry};
use crate::domain::{ActorId, Envelope, LinkId};
use crate::error::NetResult;
use crate::link::{Link, LinkSpec};
use crate::mailbox::Mailbox;

/// Lifecycle change reported by an actor and republished to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActorStatusEvent {
    pub actor: ActorId,
    pub state: ActorState,
    /// For `Stopped`: whether the mailbox was drained first
    pub graceful: bool,
    /// Messages discarded when the mailbox closed
    pub discarded: usize,
    /// For `Failed`: what went wrong
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl ActorStatusEvent {
    pub fn new(actor: ActorId, state: ActorState) -> Self {
        Self {
            actor,
            state,
            graceful: false,
            discarded: 0,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn stopped(actor: ActorId, graceful: bool, discarded: usize) -> Self {
        Self {
            graceful,
            discarded,
            ..Self::new(actor, ActorState::Stopped)
        }
    }

    pub fn failed(actor: ActorId, reason: impl Into<String>, discarded: usize) -> Self {
        Self {
            discarded,
            reason: Some(reason.into()),
            ..Self::new(actor, ActorState::Failed)
        }
    }
}

/// Final outcome of one message handed to a delivery lane
#[derive(Debug)]
pub struct DeliveryReport {
    pub sender: ActorId,
    pub recipient: ActorId,
    pub link_id: Option<LinkId>,
    pub sequence: u64,
    pub attempts: u32,
    pub delivered: bool,
    /// Discarded because its link stopped being active while queued
    pub dropped: bool,
}

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Register a local actor's mailbox and join it to the directory
    Register {
        actor: ActorId,
        mailbox: Arc<Mailbox>,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },

    /// Join an actor hosted elsewhere
    Join {
        actor: ActorId,
        address: Address,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },

    Leave {
        actor: ActorId,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },

    Resolve {
        actor: ActorId,
        reply_tx: oneshot::Sender<NetResult<Address>>,
    },

    Entry {
        actor: ActorId,
        reply_tx: oneshot::Sender<Option<DirectoryEntry>>,
    },

    Heartbeat {
        actor: ActorId,
        reply_tx: Option<oneshot::Sender<NetResult<()>>>,
    },

    /// Count one heartbeat interval against every joined actor
    Sweep {
        reply_tx: Option<oneshot::Sender<()>>,
    },

    Establish {
        spec: LinkSpec,
        reply_tx: oneshot::Sender<NetResult<Link>>,
    },

    Destroy {
        link_id: LinkId,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },

    GetLink {
        link_id: LinkId,
        reply_tx: oneshot::Sender<Option<Link>>,
    },

    ListLinks {
        reply_tx: oneshot::Sender<Vec<Link>>,
    },

    /// Hand an envelope to the delivery lane for its (sender, recipient) pair
    Route {
        envelope: Envelope,
        /// Answered once the envelope is queued or rejected
        accept_tx: Option<oneshot::Sender<NetResult<()>>>,
        /// Answered once delivery succeeded or was given up
        ack_tx: Option<oneshot::Sender<NetResult<()>>>,
    },

    /// Bytes received from a transport binding
    Ingest {
        bytes: Vec<u8>,
        reply_tx: oneshot::Sender<NetResult<()>>,
    },

    /// Lane finished with one envelope (internal)
    Delivery(DeliveryReport),

    /// Actor lifecycle change (internal)
    Status(ActorStatusEvent),

    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    Shutdown,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorMetrics {
    pub local_actors: usize,
    pub joined_actors: usize,
    pub unreachable_actors: usize,
    pub active_links: usize,
    pub degraded_links: usize,
    pub broken_links: usize,
    pub messages_routed: u64,
    pub messages_delivered: u64,
    pub delivery_retries: u64,
    pub delivery_failures: u64,
    /// Artifacts refused or dropped because their link was not active
    pub rejected_inactive: u64,
    /// Envelopes refused because their delivery lane was full
    pub lane_overflows: u64,
    pub resyncs_requested: u64,
}
