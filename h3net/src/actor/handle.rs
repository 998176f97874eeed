//! ActorHandle - Client interface to a running actor

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::messages::{ActorCommand, PullOutcome, PutReceipt};
use super::state::ActorState;
use crate::domain::{ActorId, Artifact, ArtifactUpdate, LinkId};
use crate::error::{NetError, NetResult};
use crate::link::Link;

/// Cloneable handle to one actor
///
/// Dropping every handle stops the actor gracefully.
#[derive(Clone)]
pub struct ActorHandle {
    id: ActorId,
    tx: mpsc::Sender<ActorCommand>,
    state_rx: watch::Receiver<ActorState>,
    request_timeout: Duration,
}

impl ActorHandle {
    pub(crate) fn new(
        id: ActorId,
        tx: mpsc::Sender<ActorCommand>,
        state_rx: watch::Receiver<ActorState>,
        request_timeout: Duration,
    ) -> Self {
        debug!(%id, "ActorHandle::new: called");
        Self {
            id,
            tx,
            state_rx,
            request_timeout,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Current lifecycle state; still readable after the actor has exited
    pub fn state(&self) -> ActorState {
        *self.state_rx.borrow()
    }

    /// Wait until the actor reaches `state` or a terminal state
    pub async fn wait_for(&self, state: ActorState) -> ActorState {
        let mut rx = self.state_rx.clone();
        match rx.wait_for(|s| *s == state || s.is_terminal()).await {
            Ok(current) => *current,
            Err(_) => *self.state_rx.borrow(),
        }
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ActorCommand) -> NetResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> NetError {
        match self.state() {
            state if state.is_terminal() => NetError::NotRunning {
                actor: self.id.clone(),
                state,
            },
            _ => NetError::ChannelClosed,
        }
    }

    /// Created -> Running; runs the model's initialize hook
    pub async fn start(&self) -> NetResult<()> {
        debug!(actor = %self.id, "ActorHandle::start: called");
        self.ask(|reply_tx| ActorCommand::Start { reply_tx }).await?
    }

    /// Stop the actor; returns the final state
    ///
    /// Stopping an actor that already stopped or failed reports that state.
    pub async fn stop(&self, graceful: bool) -> NetResult<ActorState> {
        debug!(actor = %self.id, graceful, "ActorHandle::stop: called");
        match self.ask(|reply_tx| ActorCommand::Stop { graceful, reply_tx }).await {
            Ok(result) => result,
            Err(_) if self.state().is_terminal() => Ok(self.state()),
            Err(e) => Err(e),
        }
    }

    /// Store a new version locally and propagate it over push links
    pub async fn put(&self, update: ArtifactUpdate) -> NetResult<PutReceipt> {
        self.ask(|reply_tx| ActorCommand::Put { update, reply_tx }).await?
    }

    /// Read the actor's current value for `name`
    pub async fn get(&self, name: &str) -> NetResult<Option<Artifact>> {
        let name = name.to_string();
        self.ask(|reply_tx| ActorCommand::Get { name, reply_tx }).await
    }

    /// Version of `name` in the actor's store, if any
    pub async fn version_of(&self, name: &str) -> NetResult<Option<u64>> {
        Ok(self.get(name).await?.map(|a| a.version))
    }

    /// Run one model step and publish its updates
    pub async fn step(&self) -> NetResult<Vec<PutReceipt>> {
        self.ask(|reply_tx| ActorCommand::Step { reply_tx }).await?
    }

    /// Pull the producer's current value of `name` over a link
    pub async fn request(&self, link_id: LinkId, name: &str) -> NetResult<PullOutcome> {
        debug!(actor = %self.id, %link_id, %name, "ActorHandle::request: called");
        let name = name.to_string();
        let pending = self.ask(|reply_tx| ActorCommand::Request {
            link_id,
            name,
            reply_tx,
        });
        match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(result) => result?,
            Err(_) => Err(NetError::Timeout(self.request_timeout)),
        }
    }

    /// Save the actor's store to `path`
    pub async fn snapshot(&self, path: impl Into<PathBuf>) -> NetResult<()> {
        let path = path.into();
        self.ask(|reply_tx| ActorCommand::Snapshot { path, reply_tx }).await?
    }

    /// Links this actor has been told about
    pub async fn links(&self) -> NetResult<Vec<Link>> {
        self.ask(|reply_tx| ActorCommand::Links { reply_tx }).await
    }
}
