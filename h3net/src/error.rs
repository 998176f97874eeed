//! Error types for the actor network

use std::time::Duration;
use thiserror::Error;

use crate::actor::ActorState;
use crate::domain::{ActorId, LinkId};
use crate::link::LinkStatus;

/// Errors surfaced by network operations
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Stale write for {name}: incoming version {incoming} <= current {current}")]
    StaleWrite { name: String, incoming: u64, current: u64 },

    #[error("Mailbox of {actor} is full")]
    MailboxFull { actor: ActorId },

    #[error("Actor {0} is unreachable")]
    Unreachable(ActorId),

    #[error("Delivery to {recipient} failed after {attempts} attempts")]
    DeliveryFailed { recipient: ActorId, attempts: u32 },

    #[error("Actor {actor} failed: {reason}")]
    ActorFatal { actor: ActorId, reason: String },

    #[error("Link conflict: {producer} -> {consumer} already shares '{name}' over {existing}")]
    LinkConflict {
        producer: ActorId,
        consumer: ActorId,
        name: String,
        existing: LinkId,
    },

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Link {link_id} is {status}")]
    LinkInactive { link_id: LinkId, status: LinkStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Actor {actor} is {state}, not running")]
    NotRunning { actor: ActorId, state: ActorState },

    #[error("Invalid actor state transition from {from} to {to}")]
    InvalidTransition { from: ActorState, to: ActorState },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Channel closed")]
    ChannelClosed,
}

impl NetError {
    /// Check if the sender should back off and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetError::MailboxFull { .. } | NetError::Unreachable(_))
    }

    /// Check if this error is terminal for the actor that raised it
    pub fn is_fatal(&self) -> bool {
        matches!(self, NetError::ActorFatal { .. })
    }
}

/// Result alias for network operations
pub type NetResult<T> = Result<T, NetError>;
