//! The actor task: one mailbox, one store, one model unit

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::messages::{ActorCommand, PullOutcome, PutReceipt};
use super::model::ModelUnit;
use super::state::ActorState;
use crate::coordinator::{ActorStatusEvent, CoordinatorHandle, NetworkConfig};
use crate::domain::{ActorId, Artifact, ArtifactUpdate, Body, ControlSignal, Envelope, LinkId};
use crate::error::{NetError, NetResult};
use crate::link::{Consistency, Link, LinkMode, LinkStatus};
use crate::mailbox::Mailbox;
use crate::store::{ApplyOutcome, ArtifactStore};

/// Per-actor runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct ActorOptions {
    pub mailbox_capacity: usize,
    pub command_buffer: usize,
    /// How long a put waits for sync link acknowledgements
    pub sync_timeout: Duration,
    /// Heartbeat period; `None` leaves heartbeats to the caller
    pub heartbeat_interval: Option<Duration>,
    /// Run a model step on this period; `None` steps only on request
    pub step_interval: Option<Duration>,
}

impl ActorOptions {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity,
            command_buffer: config.command_buffer,
            sync_timeout: config.sync_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            step_interval: None,
        }
    }
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub(crate) struct ActorRuntime<M: ModelUnit> {
    id: ActorId,
    state: ActorState,
    state_tx: watch::Sender<ActorState>,
    store: ArtifactStore,
    mailbox: Arc<Mailbox>,
    model: M,
    links: HashMap<LinkId, Link>,
    outbound_seq: HashMap<ActorId, u64>,
    inbound_seq: HashMap<ActorId, u64>,
    pending_pulls: HashMap<String, oneshot::Sender<NetResult<PullOutcome>>>,
    coordinator: CoordinatorHandle,
    options: ActorOptions,
}

impl<M: ModelUnit> ActorRuntime<M> {
    pub fn new(
        store: ArtifactStore,
        mailbox: Arc<Mailbox>,
        model: M,
        coordinator: CoordinatorHandle,
        options: ActorOptions,
        state_tx: watch::Sender<ActorState>,
    ) -> Self {
        Self {
            id: store.owner().clone(),
            state: ActorState::Created,
            state_tx,
            store,
            mailbox,
            model,
            links: HashMap::new(),
            outbound_seq: HashMap::new(),
            inbound_seq: HashMap::new(),
            pending_pulls: HashMap::new(),
            coordinator,
            options,
        }
    }

    /// Process mailbox and commands until the actor stops or fails
    ///
    /// The mailbox is polled first so link announcements queued before a
    /// command are always seen by that command.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ActorCommand>) {
        info!(actor = %self.id, "Actor task started");
        let mailbox = self.mailbox.clone();
        let mut heartbeat = self.options.heartbeat_interval.map(ticker);
        let mut stepper = self.options.step_interval.map(ticker);

        while !self.state.is_terminal() {
            let running = self.state == ActorState::Running;
            tokio::select! {
                biased;

                envelope = mailbox.dequeue(), if running => match envelope {
                    Some(envelope) => self.handle_envelope(envelope).await,
                    None => {
                        warn!(actor = %self.id, "Mailbox closed while running");
                        self.stop(false).await;
                    }
                },

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!(actor = %self.id, "All handles dropped, stopping");
                        self.stop(true).await;
                    }
                },

                _ = tick(&mut heartbeat), if running => self.send_heartbeats().await,

                _ = tick(&mut stepper), if running => {
                    if let Err(e) = self.step().await {
                        warn!(actor = %self.id, error = %e, "Scheduled step failed");
                    }
                }
            }
        }

        info!(actor = %self.id, state = %self.state, "Actor task finished");
    }

    fn set_state(&mut self, next: ActorState) -> NetResult<()> {
        self.state = self.state.transition(next)?;
        self.state_tx.send_replace(next);
        Ok(())
    }

    fn ensure_running(&self) -> NetResult<()> {
        if self.state == ActorState::Running {
            Ok(())
        } else {
            Err(NetError::NotRunning {
                actor: self.id.clone(),
                state: self.state,
            })
        }
    }

    async fn report(&mut self, event: ActorStatusEvent) {
        if let Err(e) = self.coordinator.report_status(event).await {
            warn!(actor = %self.id, error = %e, "Failed to report status");
        }
    }

    async fn handle_command(&mut self, command: ActorCommand) {
        match command {
            ActorCommand::Start { reply_tx } => {
                let _ = reply_tx.send(self.start().await);
            }
            ActorCommand::Stop { graceful, reply_tx } => {
                self.stop(graceful).await;
                let _ = reply_tx.send(Ok(self.state));
            }
            ActorCommand::Put { update, reply_tx } => {
                let _ = reply_tx.send(self.put(update).await);
            }
            ActorCommand::Get { name, reply_tx } => {
                let _ = reply_tx.send(self.store.get(&name).cloned());
            }
            ActorCommand::Step { reply_tx } => {
                let _ = reply_tx.send(self.step().await);
            }
            ActorCommand::Request {
                link_id,
                name,
                reply_tx,
            } => {
                self.request(link_id, name, reply_tx).await;
            }
            ActorCommand::Snapshot { path, reply_tx } => {
                let _ = reply_tx.send(self.store.save_snapshot(path));
            }
            ActorCommand::Links { reply_tx } => {
                let mut links: Vec<Link> = self.links.values().cloned().collect();
                links.sort_by(|a, b| a.link_id.cmp(&b.link_id));
                let _ = reply_tx.send(links);
            }
        }
    }

    async fn start(&mut self) -> NetResult<()> {
        self.set_state(ActorState::Running)?;
        info!(actor = %self.id, "Actor running");
        self.report(ActorStatusEvent::new(self.id.clone(), ActorState::Running)).await;

        let updates = match self.model.initialize(&self.store).await {
            Ok(updates) => updates,
            Err(e) => return Err(self.fail(e.to_string()).await),
        };
        for update in updates {
            self.put(update).await?;
        }
        Ok(())
    }

    /// Stop the actor
    ///
    /// Graceful: finish everything already queued, then stop. Abrupt: the
    /// queue is discarded and counted.
    async fn stop(&mut self, graceful: bool) {
        if self.state.is_terminal() {
            return;
        }

        let mut discarded = 0;
        if graceful && self.state == ActorState::Running {
            if self.set_state(ActorState::Draining).is_ok() {
                self.report(ActorStatusEvent::new(self.id.clone(), ActorState::Draining)).await;
            }
            let pending = self.mailbox.close().await;
            debug!(actor = %self.id, count = pending.len(), "Draining mailbox");
            for envelope in pending {
                self.handle_envelope(envelope).await;
                if self.state.is_terminal() {
                    return;
                }
            }
        } else {
            discarded = self.mailbox.close().await.len();
        }

        self.pending_pulls.clear();
        if let Err(e) = self.set_state(ActorState::Stopped) {
            error!(actor = %self.id, error = %e, "Could not stop actor");
            return;
        }
        info!(actor = %self.id, graceful, discarded, "Actor stopped");
        self.report(ActorStatusEvent::stopped(self.id.clone(), graceful, discarded))
            .await;
    }

    /// Enter `Failed`, flush the mailbox and tell the coordinator
    async fn fail(&mut self, reason: String) -> NetError {
        error!(actor = %self.id, %reason, "Actor failed");
        if let Err(e) = self.set_state(ActorState::Failed) {
            warn!(actor = %self.id, error = %e, "Unexpected failure transition");
            self.state = ActorState::Failed;
            self.state_tx.send_replace(ActorState::Failed);
        }
        let discarded = self.mailbox.close().await.len();
        self.pending_pulls.clear();
        self.report(ActorStatusEvent::failed(self.id.clone(), reason.clone(), discarded))
            .await;
        NetError::ActorFatal {
            actor: self.id.clone(),
            reason,
        }
    }

    async fn put(&mut self, update: ArtifactUpdate) -> NetResult<PutReceipt> {
        self.ensure_running()?;
        let artifact = self.store.put(update);
        debug!(actor = %self.id, name = %artifact.name, version = artifact.version, "ActorRuntime::put: stored");
        Ok(self.propagate(&artifact, None, true).await)
    }

    async fn step(&mut self) -> NetResult<Vec<PutReceipt>> {
        self.ensure_running()?;
        let updates = match self.model.compute_step(&self.store).await {
            Ok(updates) => updates,
            Err(e) => return Err(self.fail(e.to_string()).await),
        };

        let mut receipts = Vec::with_capacity(updates.len());
        for update in updates {
            receipts.push(self.put(update).await?);
        }
        Ok(receipts)
    }

    fn envelope_to(&mut self, recipient: ActorId, link_id: Option<LinkId>, body: Body) -> Envelope {
        let seq = self.outbound_seq.entry(recipient.clone()).or_insert(0);
        *seq += 1;
        Envelope {
            sender: self.id.clone(),
            recipient,
            link_id,
            sequence: *seq,
            body,
        }
    }

    /// Send `artifact` over every active push link that produces its name
    ///
    /// With `wait`, sync links are awaited up to the sync timeout; on timeout
    /// the put carries on as if the links were async. Links the coordinator
    /// refuses are counted as unconfirmed.
    async fn propagate(&mut self, artifact: &Artifact, exclude: Option<&ActorId>, wait: bool) -> PutReceipt {
        let targets: Vec<(LinkId, ActorId, Consistency)> = self
            .links
            .values()
            .filter(|l| l.mode == LinkMode::Push && l.is_active() && l.produces(&self.id, &artifact.name))
            .filter_map(|l| l.peer_of(&self.id).map(|peer| (l.link_id.clone(), peer.clone(), l.consistency)))
            .filter(|(_, peer, _)| Some(peer) != exclude)
            .collect();

        let mut receipt = PutReceipt {
            name: artifact.name.clone(),
            version: artifact.version,
            notified: 0,
            acknowledged: 0,
            unconfirmed: 0,
        };

        let mut pending = Vec::new();
        for (link_id, peer, consistency) in targets {
            let envelope = self.envelope_to(peer, Some(link_id), Body::Artifact(artifact.clone()));
            receipt.notified += 1;
            let routed = if wait && consistency == Consistency::Sync {
                match self.coordinator.send_with_ack(envelope).await {
                    Ok(ack_rx) => {
                        pending.push(ack_rx);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            } else {
                self.coordinator.route(envelope).await
            };
            if let Err(e) = routed {
                warn!(actor = %self.id, name = %artifact.name, version = artifact.version, error = %e, "Artifact not routed");
                receipt.unconfirmed += 1;
            }
        }

        if !pending.is_empty() {
            let count = pending.len();
            let timeout = self.options.sync_timeout;
            match tokio::time::timeout(timeout, futures::future::join_all(pending)).await {
                Ok(results) => {
                    for result in results {
                        match result {
                            Ok(Ok(())) => receipt.acknowledged += 1,
                            Ok(Err(e)) => {
                                warn!(actor = %self.id, name = %artifact.name, error = %e, "Sync delivery failed");
                                receipt.unconfirmed += 1;
                            }
                            Err(_) => receipt.unconfirmed += 1,
                        }
                    }
                }
                Err(_) => {
                    warn!(
                        actor = %self.id,
                        name = %artifact.name,
                        version = artifact.version,
                        ?timeout,
                        "Sync acknowledgement timed out, continuing asynchronously"
                    );
                    receipt.unconfirmed += count;
                }
            }
        }

        receipt
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        let Envelope {
            sender,
            link_id,
            sequence,
            body,
            ..
        } = envelope;

        // Sequence 0 marks unsequenced, droppable signals
        let mut gap = false;
        if sequence > 0 {
            let last = self.inbound_seq.get(&sender).copied().unwrap_or(0);
            if sequence <= last {
                debug!(actor = %self.id, %sender, sequence, last, "Dropping duplicate message");
                return;
            }
            gap = sequence > last + 1;
            if gap {
                warn!(actor = %self.id, %sender, expected = last + 1, got = sequence, "Sequence gap");
            }
            self.inbound_seq.insert(sender.clone(), sequence);
        }

        match body {
            Body::Artifact(artifact) => {
                self.apply_remote(&sender, link_id.as_ref(), artifact).await;
            }
            Body::Control(signal) => self.handle_control(&sender, link_id.as_ref(), signal).await,
        }

        if gap && let Some(link_id) = link_id {
            self.request_resync(&sender, link_id).await;
        }
    }

    /// Ask a link peer to re-send its latest versions after a gap
    async fn request_resync(&mut self, sender: &ActorId, link_id: LinkId) {
        let is_peer = self
            .links
            .get(&link_id)
            .is_some_and(|l| l.peer_of(&self.id) == Some(sender));
        if !is_peer {
            return;
        }
        info!(actor = %self.id, %sender, %link_id, "Requesting resync");
        let envelope = self.envelope_to(
            sender.clone(),
            Some(link_id.clone()),
            Body::Control(ControlSignal::ResyncRequest { link_id }),
        );
        if let Err(e) = self.coordinator.send(envelope).await {
            warn!(actor = %self.id, error = %e, "Failed to request resync");
        }
    }

    async fn apply_remote(&mut self, sender: &ActorId, link_id: Option<&LinkId>, artifact: Artifact) -> ApplyOutcome {
        let policy = link_id
            .and_then(|id| self.links.get(id))
            .map(|l| l.merge)
            .unwrap_or_default();
        let name = artifact.name.clone();
        let outcome = self.store.apply_remote(artifact, policy);

        if outcome.is_applied() {
            debug!(actor = %self.id, %name, %sender, "ActorRuntime::apply_remote: applied");
            if let Some(stored) = self.store.get(&name).cloned() {
                let relayed = self.propagate(&stored, Some(sender), false).await;
                if relayed.unconfirmed > 0 {
                    warn!(actor = %self.id, %name, refused = relayed.unconfirmed, "Relay incomplete");
                }
            }
        }
        outcome
    }

    async fn handle_control(&mut self, sender: &ActorId, link_id: Option<&LinkId>, signal: ControlSignal) {
        match signal {
            ControlSignal::LinkEstablished { link } => {
                info!(actor = %self.id, link_id = %link.link_id, status = %link.status, "Link established");
                let link_id = link.link_id.clone();
                self.links.insert(link_id.clone(), link);
                // A new consumer starts from the producer's current values
                self.resync(&link_id).await;
            }
            ControlSignal::LinkBroken { link_id } => {
                if self.links.remove(&link_id).is_some() {
                    info!(actor = %self.id, %link_id, "Link broken");
                }
            }
            ControlSignal::LinkDegraded { link_id } => {
                if let Some(link) = self.links.get_mut(&link_id) {
                    warn!(actor = %self.id, %link_id, "Link degraded");
                    link.status = LinkStatus::Degraded;
                }
            }
            ControlSignal::LinkRestored { link_id } => {
                if let Some(link) = self.links.get_mut(&link_id) {
                    info!(actor = %self.id, %link_id, "Link restored");
                    link.status = LinkStatus::Active;
                }
            }
            ControlSignal::Heartbeat { from } => {
                debug!(actor = %self.id, %from, "Peer heartbeat");
            }
            ControlSignal::ResyncRequest { link_id } => {
                self.resync(&link_id).await;
            }
            ControlSignal::PullRequest { request_id, name } => {
                self.answer_pull(sender, link_id, request_id, name).await;
            }
            ControlSignal::PullResponse {
                request_id,
                name,
                artifact,
            } => {
                self.complete_pull(sender, link_id, request_id, name, artifact).await;
            }
        }
    }

    /// Re-send the latest version of every name this actor pushes over the link
    async fn resync(&mut self, link_id: &LinkId) {
        let Some(link) = self.links.get(link_id) else {
            debug!(actor = %self.id, %link_id, "Resync for unknown link");
            return;
        };
        if link.mode != LinkMode::Push || !link.is_active() {
            return;
        }
        let Some(peer) = link.peer_of(&self.id).cloned() else {
            return;
        };
        let artifacts: Vec<Artifact> = link
            .outbound_names(&self.id)
            .into_iter()
            .flatten()
            .filter_map(|name| self.store.get(name).cloned())
            .collect();
        if artifacts.is_empty() {
            return;
        }

        info!(actor = %self.id, %link_id, %peer, count = artifacts.len(), "Resyncing link");
        for artifact in artifacts {
            let envelope = self.envelope_to(peer.clone(), Some(link_id.clone()), Body::Artifact(artifact));
            if let Err(e) = self.coordinator.send(envelope).await {
                warn!(actor = %self.id, error = %e, "Resync aborted");
                break;
            }
        }
    }

    async fn request(&mut self, link_id: LinkId, name: String, reply_tx: oneshot::Sender<NetResult<PullOutcome>>) {
        if let Err(e) = self.ensure_running() {
            let _ = reply_tx.send(Err(e));
            return;
        }
        let Some(link) = self.links.get(&link_id) else {
            let _ = reply_tx.send(Err(NetError::NotFound(format!("link {}", link_id))));
            return;
        };
        if !link.is_active() {
            let _ = reply_tx.send(Err(NetError::LinkInactive {
                link_id,
                status: link.status,
            }));
            return;
        }
        if !link.inbound_names(&self.id).is_some_and(|names| names.contains(&name)) {
            let _ = reply_tx.send(Err(NetError::NotFound(format!("{} on link {}", name, link_id))));
            return;
        }
        let Some(peer) = link.peer_of(&self.id).cloned() else {
            let _ = reply_tx.send(Err(NetError::InvalidLink(format!("{} is not an endpoint", self.id))));
            return;
        };

        // Callers that gave up leave closed senders behind
        self.pending_pulls.retain(|_, tx| !tx.is_closed());

        let request_id = uuid::Uuid::now_v7().to_string();
        debug!(actor = %self.id, %peer, %name, %request_id, "ActorRuntime::request: called");
        let envelope = self.envelope_to(
            peer,
            Some(link_id),
            Body::Control(ControlSignal::PullRequest {
                request_id: request_id.clone(),
                name,
            }),
        );
        match self.coordinator.route(envelope).await {
            Ok(()) => {
                self.pending_pulls.insert(request_id, reply_tx);
            }
            Err(e) => {
                let _ = reply_tx.send(Err(e));
            }
        }
    }

    async fn answer_pull(&mut self, sender: &ActorId, link_id: Option<&LinkId>, request_id: String, name: String) {
        let artifact = link_id
            .and_then(|id| self.links.get(id))
            .filter(|l| l.produces(&self.id, &name) && l.peer_of(&self.id) == Some(sender))
            .and_then(|_| self.store.get(&name).cloned());
        debug!(actor = %self.id, %sender, %name, found = artifact.is_some(), "Answering pull request");

        let envelope = self.envelope_to(
            sender.clone(),
            link_id.cloned(),
            Body::Control(ControlSignal::PullResponse {
                request_id,
                name,
                artifact,
            }),
        );
        if let Err(e) = self.coordinator.send(envelope).await {
            warn!(actor = %self.id, error = %e, "Failed to answer pull request");
        }
    }

    async fn complete_pull(
        &mut self,
        sender: &ActorId,
        link_id: Option<&LinkId>,
        request_id: String,
        name: String,
        artifact: Option<Artifact>,
    ) {
        let outcome = match artifact {
            Some(artifact) => match self.apply_remote(sender, link_id, artifact).await {
                ApplyOutcome::Applied { version } => PullOutcome::Applied { version },
                ApplyOutcome::Rejected(reason) => PullOutcome::Rejected(reason),
            },
            None => PullOutcome::NotFound,
        };

        match self.pending_pulls.remove(&request_id) {
            Some(reply_tx) => {
                let _ = reply_tx.send(Ok(outcome));
            }
            None => debug!(actor = %self.id, %name, %request_id, "Pull response without a waiting request"),
        }
    }

    /// Tell the directory this actor is alive and ping link peers
    ///
    /// Peers over degraded links are pinged too, since a coordinator hosting
    /// a peer elsewhere learns about this actor only from its traffic.
    async fn send_heartbeats(&mut self) {
        if let Err(e) = self.coordinator.heartbeat_nowait(self.id.clone()).await {
            warn!(actor = %self.id, error = %e, "Failed to send heartbeat");
            return;
        }

        let peers: BTreeSet<ActorId> = self
            .links
            .values()
            .filter(|l| l.status != LinkStatus::Broken)
            .filter_map(|l| l.peer_of(&self.id).cloned())
            .collect();
        for peer in peers {
            let envelope = Envelope::control(
                self.id.clone(),
                peer,
                None,
                0,
                ControlSignal::Heartbeat { from: self.id.clone() },
            );
            if let Err(e) = self.coordinator.send(envelope).await {
                debug!(actor = %self.id, error = %e, "Heartbeat not routed");
            }
        }
    }
}
