//! CoordinatorHandle - Client interface to the coordinator task

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use super::config::NetworkConfig;
use super::messages::{ActorStatusEvent, CoordRequest, CoordinatorMetrics};
use crate::directory::{Address, DirectoryEntry, DirectorySnapshot};
use crate::domain::{ActorId, Envelope, LinkId};
use crate::error::{NetError, NetResult};
use crate::link::{Link, LinkSpec, LinkStatus};
use crate::mailbox::Mailbox;

/// Handle for actors and callers to interact with the Coordinator
///
/// Cloneable; every operation is a message to the coordinator task, so
/// directory and link mutations are serialized there.
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// Identity used as sender of coordinator-originated control signals
    id: ActorId,

    config: Arc<NetworkConfig>,

    status_tx: broadcast::Sender<ActorStatusEvent>,

    directory_rx: watch::Receiver<Arc<DirectorySnapshot>>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<CoordRequest>,
        id: ActorId,
        config: Arc<NetworkConfig>,
        status_tx: broadcast::Sender<ActorStatusEvent>,
        directory_rx: watch::Receiver<Arc<DirectorySnapshot>>,
    ) -> Self {
        debug!(%id, "CoordinatorHandle::new: called");
        Self {
            tx,
            id,
            config,
            status_tx,
            directory_rx,
        }
    }

    /// Identity of the coordinator as a message sender
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    async fn request(&self, req: CoordRequest) -> NetResult<()> {
        self.tx.send(req).await.map_err(|_| NetError::ChannelClosed)
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> CoordRequest) -> NetResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(build(reply_tx)).await?;
        reply_rx.await.map_err(|_| NetError::ChannelClosed)
    }

    pub(crate) async fn register(&self, actor: ActorId, mailbox: Arc<Mailbox>) -> NetResult<()> {
        debug!(%actor, "CoordinatorHandle::register: called");
        self.ask(|reply_tx| CoordRequest::Register {
            actor,
            mailbox,
            reply_tx,
        })
        .await?
    }

    /// Add an actor hosted behind a transport binding
    pub async fn join(&self, actor: ActorId, address: Address) -> NetResult<()> {
        debug!(%actor, %address, "CoordinatorHandle::join: called");
        self.ask(|reply_tx| CoordRequest::Join {
            actor,
            address,
            reply_tx,
        })
        .await?
    }

    pub async fn leave(&self, actor: ActorId) -> NetResult<()> {
        debug!(%actor, "CoordinatorHandle::leave: called");
        self.ask(|reply_tx| CoordRequest::Leave { actor, reply_tx }).await?
    }

    pub async fn resolve(&self, actor: ActorId) -> NetResult<Address> {
        self.ask(|reply_tx| CoordRequest::Resolve { actor, reply_tx }).await?
    }

    pub async fn entry(&self, actor: ActorId) -> NetResult<Option<DirectoryEntry>> {
        self.ask(|reply_tx| CoordRequest::Entry { actor, reply_tx }).await
    }

    /// Latest published directory snapshot
    pub fn directory(&self) -> Arc<DirectorySnapshot> {
        self.directory_rx.borrow().clone()
    }

    /// Record a heartbeat and wait for the coordinator to process it
    pub async fn heartbeat(&self, actor: ActorId) -> NetResult<()> {
        self.ask(|reply_tx| CoordRequest::Heartbeat {
            actor,
            reply_tx: Some(reply_tx),
        })
        .await?
    }

    /// Record a heartbeat without waiting
    pub(crate) async fn heartbeat_nowait(&self, actor: ActorId) -> NetResult<()> {
        self.request(CoordRequest::Heartbeat { actor, reply_tx: None }).await
    }

    /// Count one heartbeat interval now
    pub async fn sweep(&self) -> NetResult<()> {
        self.ask(|reply_tx| CoordRequest::Sweep {
            reply_tx: Some(reply_tx),
        })
        .await
    }

    /// Create a link; returns once both local endpoints have been told about it
    pub async fn establish(&self, spec: LinkSpec) -> NetResult<Link> {
        debug!(a = %spec.endpoint_a, b = %spec.endpoint_b, "CoordinatorHandle::establish: called");
        self.ask(|reply_tx| CoordRequest::Establish { spec, reply_tx }).await?
    }

    pub async fn destroy_link(&self, link_id: LinkId) -> NetResult<()> {
        debug!(%link_id, "CoordinatorHandle::destroy_link: called");
        self.ask(|reply_tx| CoordRequest::Destroy { link_id, reply_tx }).await?
    }

    pub async fn link(&self, link_id: LinkId) -> NetResult<Option<Link>> {
        self.ask(|reply_tx| CoordRequest::GetLink { link_id, reply_tx }).await
    }

    pub async fn link_status(&self, link_id: LinkId) -> NetResult<LinkStatus> {
        let label = link_id.to_string();
        self.link(link_id)
            .await?
            .map(|link| link.status)
            .ok_or_else(|| NetError::NotFound(format!("link {}", label)))
    }

    pub async fn links(&self) -> NetResult<Vec<Link>> {
        self.ask(|reply_tx| CoordRequest::ListLinks { reply_tx }).await
    }

    /// Queue an envelope for delivery; errors if the coordinator rejects it
    pub async fn route(&self, envelope: Envelope) -> NetResult<()> {
        self.ask(|accept_tx| CoordRequest::Route {
            envelope,
            accept_tx: Some(accept_tx),
            ack_tx: None,
        })
        .await?
    }

    /// Route and wait until the recipient's mailbox or transport accepted it
    pub async fn deliver(&self, envelope: Envelope) -> NetResult<()> {
        self.send_with_ack(envelope)
            .await?
            .await
            .map_err(|_| NetError::ChannelClosed)?
    }

    /// Route without waiting for anything
    pub(crate) async fn send(&self, envelope: Envelope) -> NetResult<()> {
        self.request(CoordRequest::Route {
            envelope,
            accept_tx: None,
            ack_tx: None,
        })
        .await
    }

    /// Route and get a receiver that resolves on delivery or give-up
    pub(crate) async fn send_with_ack(&self, envelope: Envelope) -> NetResult<oneshot::Receiver<NetResult<()>>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.request(CoordRequest::Route {
            envelope,
            accept_tx: None,
            ack_tx: Some(ack_tx),
        })
        .await?;
        Ok(ack_rx)
    }

    /// Hand bytes received by a transport binding to the network
    pub async fn ingest(&self, bytes: Vec<u8>) -> NetResult<()> {
        self.ask(|reply_tx| CoordRequest::Ingest { bytes, reply_tx }).await?
    }

    pub(crate) async fn report_status(&self, event: ActorStatusEvent) -> NetResult<()> {
        debug!(actor = %event.actor, state = %event.state, "CoordinatorHandle::report_status: called");
        self.request(CoordRequest::Status(event)).await
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ActorStatusEvent> {
        self.status_tx.subscribe()
    }

    pub async fn metrics(&self) -> NetResult<CoordinatorMetrics> {
        self.ask(|reply_tx| CoordRequest::GetMetrics { reply_tx }).await
    }

    pub async fn shutdown(&self) -> NetResult<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.request(CoordRequest::Shutdown).await
    }
}
