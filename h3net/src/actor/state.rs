//! Actor lifecycle

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};

/// Lifecycle state of an actor
///
/// ```text
/// Created --start--> Running --stop--> Draining --> Stopped
///                       |
///                       +--fatal--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorState {
    Created,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl ActorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorState::Stopped | ActorState::Failed)
    }

    pub fn can_transition_to(&self, next: ActorState) -> bool {
        use ActorState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Stopped)
                | (Created, Failed)
                | (Running, Draining)
                | (Running, Stopped)
                | (Running, Failed)
                | (Draining, Stopped)
                | (Draining, Failed)
        )
    }

    /// Validate and return the next state
    pub fn transition(self, next: ActorState) -> NetResult<ActorState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(NetError::InvalidTransition { from: self, to: next })
        }
    }
}

impl std::fmt::Display for ActorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorState::Created => write!(f, "created"),
            ActorState::Running => write!(f, "running"),
            ActorState::Draining => write!(f, "draining"),
            ActorState::Stopped => write!(f, "stopped"),
            ActorState::Failed => write!(f, "failed"),
        }
    }
}
