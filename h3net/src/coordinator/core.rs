//! Main Coordinator task implementation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::NetworkConfig;
use super::handle::CoordinatorHandle;
use super::lane::{Delivery, Lane, LaneContext, LaneTarget, PausedLinks, PushError};
use super::messages::{ActorStatusEvent, CoordRequest, CoordinatorMetrics, DeliveryReport};
use super::retry::RetryPolicy;
use super::transport::Transport;
use crate::actor::ActorState;
use crate::directory::{Address, Directory, DirectorySnapshot, EntryStatus, Transition};
use crate::domain::{ActorId, ControlSignal, Envelope, LinkId};
use crate::error::{NetError, NetResult};
use crate::link::{Link, LinkSpec, LinkStatus, LinkTable};
use crate::mailbox::Mailbox;

const STATUS_BUFFER: usize = 256;

/// The Coordinator owns the directory and link table and routes every envelope
pub struct Coordinator {
    config: Arc<NetworkConfig>,
    id: ActorId,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    transport: Option<Arc<dyn Transport>>,
    status_tx: broadcast::Sender<ActorStatusEvent>,
    directory_tx: watch::Sender<Arc<DirectorySnapshot>>,
    directory_rx: watch::Receiver<Arc<DirectorySnapshot>>,
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: NetworkConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let (status_tx, _) = broadcast::channel(STATUS_BUFFER);
        let (directory_tx, directory_rx) = watch::channel(Arc::new(DirectorySnapshot::default()));
        let id = ActorId::generate("coordinator");
        info!(%id, "Coordinator created");
        Self {
            config: Arc::new(config),
            id,
            tx,
            rx,
            transport: None,
            status_tx,
            directory_tx,
            directory_rx,
        }
    }

    /// Create a Coordinator that reaches remote actors through `transport`
    pub fn with_transport(config: NetworkConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new(config)
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(
            self.tx.clone(),
            self.id.clone(),
            self.config.clone(),
            self.status_tx.clone(),
            self.directory_rx.clone(),
        )
    }

    /// Run on a new task and return a handle to it
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested.
    pub async fn run(mut self) {
        if let Some(interval) = self.config.heartbeat_interval() {
            let sweep_tx = self.tx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if sweep_tx.send(CoordRequest::Sweep { reply_tx: None }).await.is_err() {
                        break;
                    }
                }
            });
        }

        let (paused_tx, paused_rx) = watch::channel(PausedLinks::default());
        let lane_context = LaneContext {
            policy: RetryPolicy::from_config(&self.config),
            capacity: self.config.lane_capacity,
            directory: self.directory_rx.clone(),
            paused: paused_rx,
            coord_tx: self.tx.clone(),
        };

        let mut state = NetworkState {
            id: self.id.clone(),
            directory: Directory::new(self.config.heartbeat_miss_threshold),
            links: LinkTable::new(),
            mailboxes: HashMap::new(),
            lanes: HashMap::new(),
            control_seq: HashMap::new(),
            metrics: CoordinatorMetrics::default(),
            transport: self.transport.take(),
            lane_context,
            paused_tx,
            directory_tx: self.directory_tx,
            status_tx: self.status_tx,
            config: self.config.clone(),
        };

        info!(id = %state.id, "Coordinator started");

        while let Some(req) = self.rx.recv().await {
            match req {
                CoordRequest::Register {
                    actor,
                    mailbox,
                    reply_tx,
                } => {
                    let _ = reply_tx.send(state.register(actor, mailbox));
                }

                CoordRequest::Join {
                    actor,
                    address,
                    reply_tx,
                } => {
                    let _ = reply_tx.send(state.join(actor, address));
                }

                CoordRequest::Leave { actor, reply_tx } => {
                    let _ = reply_tx.send(state.leave(&actor));
                }

                CoordRequest::Resolve { actor, reply_tx } => {
                    let _ = reply_tx.send(state.directory.resolve(&actor));
                }

                CoordRequest::Entry { actor, reply_tx } => {
                    let _ = reply_tx.send(state.directory.entry(&actor).cloned());
                }

                CoordRequest::Heartbeat { actor, reply_tx } => {
                    let result = state.heartbeat(&actor);
                    if let Some(reply_tx) = reply_tx {
                        let _ = reply_tx.send(result);
                    } else if let Err(e) = result {
                        debug!(%actor, error = %e, "Ignoring heartbeat");
                    }
                }

                CoordRequest::Sweep { reply_tx } => {
                    state.sweep();
                    if let Some(reply_tx) = reply_tx {
                        let _ = reply_tx.send(());
                    }
                }

                CoordRequest::Establish { spec, reply_tx } => {
                    state.establish(spec, reply_tx);
                }

                CoordRequest::Destroy { link_id, reply_tx } => {
                    let _ = reply_tx.send(state.destroy(&link_id));
                }

                CoordRequest::GetLink { link_id, reply_tx } => {
                    let _ = reply_tx.send(state.links.get(&link_id).cloned());
                }

                CoordRequest::ListLinks { reply_tx } => {
                    let _ = reply_tx.send(state.links.all());
                }

                CoordRequest::Route {
                    envelope,
                    accept_tx,
                    ack_tx,
                } => {
                    let result = state.route(envelope, ack_tx);
                    if let Some(accept_tx) = accept_tx {
                        let _ = accept_tx.send(result);
                    }
                }

                CoordRequest::Ingest { bytes, reply_tx } => {
                    let _ = reply_tx.send(state.ingest(&bytes));
                }

                CoordRequest::Delivery(report) => {
                    state.on_delivery(report);
                }

                CoordRequest::Status(event) => {
                    state.on_status(event);
                }

                CoordRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(state.metrics());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

/// Everything the coordinator task owns
struct NetworkState {
    id: ActorId,
    config: Arc<NetworkConfig>,
    directory: Directory,
    links: LinkTable,
    mailboxes: HashMap<ActorId, Arc<Mailbox>>,
    lanes: HashMap<(ActorId, ActorId), Lane>,
    control_seq: HashMap<ActorId, u64>,
    metrics: CoordinatorMetrics,
    transport: Option<Arc<dyn Transport>>,
    lane_context: LaneContext,
    paused_tx: watch::Sender<PausedLinks>,
    directory_tx: watch::Sender<Arc<DirectorySnapshot>>,
    status_tx: broadcast::Sender<ActorStatusEvent>,
}

impl NetworkState {
    fn publish_directory(&self) {
        self.directory_tx.send_replace(Arc::new(self.directory.snapshot()));
    }

    /// Change a link's status and let the lanes know which links are paused
    fn set_link_status(&mut self, link_id: &LinkId, status: LinkStatus) {
        self.links.set_status(link_id, status);
        self.publish_paused();
    }

    fn publish_paused(&self) {
        self.paused_tx.send_replace(Arc::new(self.links.paused()));
    }

    fn register(&mut self, actor: ActorId, mailbox: Arc<Mailbox>) -> NetResult<()> {
        debug!(%actor, "Registering local actor");
        self.mailboxes.insert(actor.clone(), mailbox);
        self.directory.join(actor, Address::Local);
        self.publish_directory();
        Ok(())
    }

    fn join(&mut self, actor: ActorId, address: Address) -> NetResult<()> {
        if address == Address::Local && !self.mailboxes.contains_key(&actor) {
            return Err(NetError::NotFound(format!("local mailbox for {}", actor)));
        }
        let transition = self.directory.join(actor.clone(), address);
        self.publish_directory();
        if let Some(Transition::Restored(actor)) = transition {
            self.reactivate_links(&actor);
        }
        Ok(())
    }

    fn leave(&mut self, actor: &ActorId) -> NetResult<()> {
        self.directory.leave(actor)?;
        self.publish_directory();
        self.degrade_links_touching(actor);
        Ok(())
    }

    fn heartbeat(&mut self, actor: &ActorId) -> NetResult<()> {
        let transition = self.directory.heartbeat(actor)?;
        if transition.is_some() {
            self.publish_directory();
        }
        self.reactivate_links(actor);
        Ok(())
    }

    fn sweep(&mut self) {
        let transitions = self.directory.sweep();
        if transitions.is_empty() {
            return;
        }
        self.publish_directory();
        for transition in transitions {
            match transition {
                Transition::BecameUnreachable(actor) => self.degrade_links_touching(&actor),
                Transition::Restored(actor) => self.reactivate_links(&actor),
            }
        }
    }

    /// Pause every active link touching `actor` and tell the other endpoints
    fn degrade_links_touching(&mut self, actor: &ActorId) {
        let affected: Vec<(LinkId, Option<ActorId>)> = self
            .links
            .touching(actor)
            .into_iter()
            .filter(|l| l.is_active())
            .map(|l| (l.link_id.clone(), l.peer_of(actor).cloned()))
            .collect();

        for (link_id, peer) in affected {
            warn!(%link_id, %actor, "Link degraded");
            self.set_link_status(&link_id, LinkStatus::Degraded);
            if let Some(peer) = peer {
                self.send_control(peer, Some(link_id.clone()), ControlSignal::LinkDegraded { link_id }, None);
            }
        }
    }

    /// Reactivate degraded links touching `actor` whose endpoints are both
    /// joined, then ask each producer to resync
    fn reactivate_links(&mut self, actor: &ActorId) {
        if !self.directory.is_joined(actor) {
            return;
        }
        let restorable: Vec<Link> = self
            .links
            .touching(actor)
            .into_iter()
            .filter(|l| l.status == LinkStatus::Degraded)
            .filter(|l| l.peer_of(actor).is_some_and(|peer| self.directory.is_joined(peer)))
            .cloned()
            .collect();

        for link in restorable {
            info!(link_id = %link.link_id, "Link restored");
            self.set_link_status(&link.link_id, LinkStatus::Active);

            for endpoint in [&link.endpoint_a, &link.endpoint_b] {
                self.send_control(
                    endpoint.clone(),
                    Some(link.link_id.clone()),
                    ControlSignal::LinkRestored {
                        link_id: link.link_id.clone(),
                    },
                    None,
                );
            }
            for endpoint in [&link.endpoint_a, &link.endpoint_b] {
                if link.outbound_names(endpoint).is_some_and(|names| !names.is_empty()) {
                    self.metrics.resyncs_requested += 1;
                    self.send_control(
                        endpoint.clone(),
                        Some(link.link_id.clone()),
                        ControlSignal::ResyncRequest {
                            link_id: link.link_id.clone(),
                        },
                        None,
                    );
                }
            }
        }
    }

    fn establish(&mut self, spec: LinkSpec, reply_tx: oneshot::Sender<NetResult<Link>>) {
        for endpoint in [&spec.endpoint_a, &spec.endpoint_b] {
            let known = self
                .directory
                .entry(endpoint)
                .is_some_and(|e| e.status != EntryStatus::Left);
            if !known {
                let _ = reply_tx.send(Err(NetError::NotFound(format!("directory entry {}", endpoint))));
                return;
            }
        }

        let mut link = match self.links.establish(spec) {
            Ok(link) => link,
            Err(e) => {
                let _ = reply_tx.send(Err(e));
                return;
            }
        };

        if !self.directory.is_joined(&link.endpoint_a) || !self.directory.is_joined(&link.endpoint_b) {
            self.set_link_status(&link.link_id, LinkStatus::Degraded);
            link.status = LinkStatus::Degraded;
        }
        info!(link_id = %link.link_id, a = %link.endpoint_a, b = %link.endpoint_b, status = %link.status, "Link established");

        let mut acks = Vec::new();
        for endpoint in [link.endpoint_a.clone(), link.endpoint_b.clone()] {
            let (ack_tx, ack_rx) = oneshot::channel();
            self.send_control(
                endpoint,
                Some(link.link_id.clone()),
                ControlSignal::LinkEstablished { link: link.clone() },
                Some(ack_tx),
            );
            acks.push(ack_rx);
        }

        // Answer once both endpoints have the announcement queued
        let timeout = self.config.sync_timeout();
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, futures::future::join_all(acks)).await {
                Ok(results) => {
                    for result in results {
                        match result {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(link_id = %link.link_id, error = %e, "Link announcement not delivered"),
                            Err(_) => warn!(link_id = %link.link_id, "Link announcement dropped"),
                        }
                    }
                }
                Err(_) => warn!(link_id = %link.link_id, ?timeout, "Timed out announcing link"),
            }
            let _ = reply_tx.send(Ok(link));
        });
    }

    fn destroy(&mut self, link_id: &LinkId) -> NetResult<()> {
        let link = self
            .links
            .remove(link_id)
            .ok_or_else(|| NetError::NotFound(format!("link {}", link_id)))?;
        self.publish_paused();
        info!(%link_id, "Link destroyed");
        for endpoint in [link.endpoint_a, link.endpoint_b] {
            self.send_control(
                endpoint,
                Some(link_id.clone()),
                ControlSignal::LinkBroken {
                    link_id: link_id.clone(),
                },
                None,
            );
        }
        Ok(())
    }

    fn next_control_seq(&mut self, recipient: &ActorId) -> u64 {
        let seq = self.control_seq.entry(recipient.clone()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn send_control(
        &mut self,
        recipient: ActorId,
        link_id: Option<LinkId>,
        signal: ControlSignal,
        ack_tx: Option<oneshot::Sender<NetResult<()>>>,
    ) {
        let sequence = self.next_control_seq(&recipient);
        let envelope = Envelope::control(self.id.clone(), recipient, link_id, sequence, signal);
        if let Err(e) = self.route(envelope, ack_tx) {
            debug!(error = %e, "NetworkState::send_control: not routed");
        }
    }

    fn target_for(&self, recipient: &ActorId) -> Option<LaneTarget> {
        if let Some(mailbox) = self.mailboxes.get(recipient) {
            return Some(LaneTarget::Local(mailbox.clone()));
        }
        self.transport.as_ref().map(|t| LaneTarget::Remote(t.clone()))
    }

    /// Queue an envelope on its lane
    ///
    /// Errors are also sent through `ack_tx` so an acked sender always hears back.
    fn route(&mut self, envelope: Envelope, ack_tx: Option<oneshot::Sender<NetResult<()>>>) -> NetResult<()> {
        self.metrics.messages_routed += 1;

        if envelope.is_artifact()
            && let Some(link_id) = &envelope.link_id
            && let Some(link) = self.links.get(link_id)
            && !link.is_active()
        {
            self.metrics.rejected_inactive += 1;
            debug!(%link_id, status = %link.status, "Rejecting artifact on inactive link");
            let status = link.status;
            let link_id = link_id.clone();
            if let Some(ack_tx) = ack_tx {
                let _ = ack_tx.send(Err(NetError::LinkInactive {
                    link_id: link_id.clone(),
                    status,
                }));
            }
            return Err(NetError::LinkInactive { link_id, status });
        }

        let key = (envelope.sender.clone(), envelope.recipient.clone());
        let mut delivery = Delivery { envelope, ack_tx };

        // A lane whose worker is gone gets replaced once
        for _ in 0..2 {
            if !self.lanes.contains_key(&key) {
                let Some(target) = self.target_for(&key.1) else {
                    self.metrics.delivery_failures += 1;
                    if let Some(ack_tx) = delivery.ack_tx {
                        let _ = ack_tx.send(Err(NetError::Unreachable(key.1.clone())));
                    }
                    return Err(NetError::Unreachable(key.1));
                };
                let lane = Lane::spawn(key.1.clone(), target, self.lane_context.clone());
                self.lanes.insert(key.clone(), lane);
            }

            let Some(lane) = self.lanes.get(&key) else {
                break;
            };
            match lane.push(delivery) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(returned)) => {
                    self.metrics.lane_overflows += 1;
                    warn!(sender = %key.0, recipient = %key.1, "Delivery lane full");
                    if let Some(ack_tx) = returned.ack_tx {
                        let _ = ack_tx.send(Err(NetError::MailboxFull { actor: key.1.clone() }));
                    }
                    return Err(NetError::MailboxFull { actor: key.1 });
                }
                Err(PushError::Closed(returned)) => {
                    self.lanes.remove(&key);
                    delivery = returned;
                }
            }
        }

        error!(sender = %key.0, recipient = %key.1, "Delivery lane unavailable");
        if let Some(ack_tx) = delivery.ack_tx {
            let _ = ack_tx.send(Err(NetError::ChannelClosed));
        }
        Err(NetError::ChannelClosed)
    }

    /// Route bytes that arrived from a transport binding to a local actor
    fn ingest(&mut self, bytes: &[u8]) -> NetResult<()> {
        let envelope = Envelope::decode(bytes)?;
        debug!(sender = %envelope.sender, recipient = %envelope.recipient, seq = envelope.sequence, "Ingesting envelope");
        if !self.mailboxes.contains_key(&envelope.recipient) {
            return Err(NetError::NotFound(format!("local actor {}", envelope.recipient)));
        }

        // Traffic from an actor behind a transport is its liveness signal here
        let remote_sender = self
            .directory
            .entry(&envelope.sender)
            .is_some_and(|e| matches!(e.address, Address::Remote(_)));
        if remote_sender && let Err(e) = self.heartbeat(&envelope.sender) {
            debug!(sender = %envelope.sender, error = %e, "Ignoring remote heartbeat");
        }
        self.route(envelope, None)
    }

    fn on_delivery(&mut self, report: DeliveryReport) {
        if report.dropped {
            self.metrics.rejected_inactive += 1;
            return;
        }
        if report.delivered {
            self.metrics.messages_delivered += 1;
            self.metrics.delivery_retries += u64::from(report.attempts.saturating_sub(1));
            return;
        }

        self.metrics.delivery_failures += 1;
        let Some(link_id) = report.link_id else {
            return;
        };
        let Some(link) = self.links.get(&link_id) else {
            return;
        };
        if !link.is_active() {
            return;
        }

        warn!(
            %link_id,
            sender = %report.sender,
            recipient = %report.recipient,
            seq = report.sequence,
            attempts = report.attempts,
            "Retries exhausted, degrading link"
        );
        let endpoints = [link.endpoint_a.clone(), link.endpoint_b.clone()];
        self.set_link_status(&link_id, LinkStatus::Degraded);
        for endpoint in endpoints {
            self.send_control(
                endpoint,
                Some(link_id.clone()),
                ControlSignal::LinkDegraded {
                    link_id: link_id.clone(),
                },
                None,
            );
        }
    }

    fn on_status(&mut self, event: ActorStatusEvent) {
        info!(actor = %event.actor, state = %event.state, "Actor status changed");
        let _ = self.status_tx.send(event.clone());

        let actor = event.actor;
        match event.state {
            ActorState::Failed => {
                self.close_links_touching(&actor, LinkStatus::Broken);
                self.unregister(&actor);
            }
            ActorState::Stopped if event.graceful => {
                let link_ids: Vec<LinkId> = self.links.touching(&actor).iter().map(|l| l.link_id.clone()).collect();
                for link_id in link_ids {
                    if let Some(link) = self.links.remove(&link_id)
                        && let Some(peer) = link.peer_of(&actor)
                    {
                        self.send_control(peer.clone(), Some(link_id.clone()), ControlSignal::LinkBroken { link_id }, None);
                    }
                }
                self.publish_paused();
                self.unregister(&actor);
            }
            ActorState::Stopped => {
                self.close_links_touching(&actor, LinkStatus::Degraded);
                self.unregister(&actor);
            }
            ActorState::Created | ActorState::Running | ActorState::Draining => {}
        }
    }

    /// Move links touching `actor` to `status` and tell the other endpoints
    fn close_links_touching(&mut self, actor: &ActorId, status: LinkStatus) {
        let affected: Vec<(LinkId, Option<ActorId>)> = self
            .links
            .touching(actor)
            .into_iter()
            .filter(|l| l.status != LinkStatus::Broken && l.status != status)
            .map(|l| (l.link_id.clone(), l.peer_of(actor).cloned()))
            .collect();

        for (link_id, peer) in affected {
            self.set_link_status(&link_id, status);
            let Some(peer) = peer else { continue };
            let signal = match status {
                LinkStatus::Broken => ControlSignal::LinkBroken {
                    link_id: link_id.clone(),
                },
                LinkStatus::Degraded => ControlSignal::LinkDegraded {
                    link_id: link_id.clone(),
                },
                LinkStatus::Active => continue,
            };
            self.send_control(peer, Some(link_id), signal, None);
        }
    }

    fn unregister(&mut self, actor: &ActorId) {
        debug!(%actor, "Unregistering actor");
        self.mailboxes.remove(actor);
        self.lanes.retain(|(sender, recipient), _| sender != actor && recipient != actor);
        self.control_seq.remove(actor);
        if self.directory.leave(actor).is_ok() {
            self.publish_directory();
        }
    }

    fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            local_actors: self.mailboxes.len(),
            joined_actors: self.directory.count_by_status(EntryStatus::Joined),
            unreachable_actors: self.directory.count_by_status(EntryStatus::Unreachable),
            active_links: self.links.count_by_status(LinkStatus::Active),
            degraded_links: self.links.count_by_status(LinkStatus::Degraded),
            broken_links: self.links.count_by_status(LinkStatus::Broken),
            ..self.metrics.clone()
        }
    }
}
