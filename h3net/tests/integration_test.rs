//! Integration tests for h3net
//!
//! These tests run real actors against a real coordinator and check
//! end-to-end propagation, liveness handling and lifecycle behavior.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use h3net::coordinator::{ChannelTransport, Coordinator, CoordinatorHandle, NetworkConfig};
use h3net::{
    ActorBuilder, ActorHandle, ActorId, ActorState, Address, EntryStatus, ArtifactStore, ArtifactUpdate, Consistency, Envelope, LinkMode,
    LinkSpec, LinkStatus, ModelError, ModelUnit, NetError, Passive, PullOutcome,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(3);

async fn spawn_running(coordinator: &CoordinatorHandle, name: &str) -> ActorHandle {
    let actor = ActorBuilder::new(name, Passive)
        .spawn(coordinator)
        .await
        .expect("Failed to spawn actor");
    actor.start().await.expect("Failed to start actor");
    actor
}

/// Poll until `actor` holds `name` at `version`
async fn wait_for_version(actor: &ActorHandle, name: &str, version: u64) {
    let reached = tokio::time::timeout(WAIT, async {
        loop {
            if actor.version_of(name).await.unwrap() == Some(version) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "{} never reached {} v{}", actor.id(), name, version);
}

/// Poll until the actor's own view of a link has `status`
async fn wait_for_link_view(actor: &ActorHandle, status: LinkStatus) {
    let reached = tokio::time::timeout(WAIT, async {
        loop {
            if actor.links().await.unwrap().iter().any(|l| l.status == status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "{} never saw a {} link", actor.id(), status);
}

fn payload(actor_value: &str) -> ArtifactUpdate {
    ArtifactUpdate::parameter("W", actor_value.as_bytes().to_vec())
}

// =============================================================================
// Propagation Tests
// =============================================================================

#[tokio::test]
async fn test_push_async_propagation() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();

    let first = producer.put(payload("w1")).await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(first.notified, 1);
    let second = producer.put(payload("w2")).await.unwrap();
    assert_eq!(second.version, 2);

    wait_for_version(&consumer, "W", 2).await;
    let artifact = consumer.get("W").await.unwrap().unwrap();
    assert_eq!(artifact.payload.as_ref(), b"w2");
    assert_eq!(&artifact.origin, producer.id());
}

#[tokio::test]
async fn test_new_link_receives_current_values() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    producer.put(payload("w1")).await.unwrap();
    producer.put(payload("w2")).await.unwrap();
    producer.put(ArtifactUpdate::layer("hidden", vec![0u8; 4])).await.unwrap();

    coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();

    wait_for_version(&consumer, "W", 2).await;
    assert!(consumer.get("hidden").await.unwrap().is_none());
}

#[tokio::test]
async fn test_per_pair_order_is_preserved() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();

    for i in 1..=50 {
        producer.put(payload(&format!("w{}", i))).await.unwrap();
    }

    wait_for_version(&consumer, "W", 50).await;
    let artifact = consumer.get("W").await.unwrap().unwrap();
    assert_eq!(artifact.payload.as_ref(), b"w50");

    let metrics = coordinator.metrics().await.unwrap();
    assert_eq!(metrics.delivery_failures, 0);
}

#[tokio::test]
async fn test_relay_through_intermediate_actor() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let root = spawn_running(&coordinator, "root").await;
    let middle = spawn_running(&coordinator, "middle").await;
    let leaf = spawn_running(&coordinator, "leaf").await;

    coordinator
        .establish(LinkSpec::new(root.id().clone(), middle.id().clone(), ["W"]))
        .await
        .unwrap();
    coordinator
        .establish(LinkSpec::new(middle.id().clone(), leaf.id().clone(), ["W"]))
        .await
        .unwrap();

    root.put(payload("w1")).await.unwrap();

    wait_for_version(&leaf, "W", 1).await;
    let artifact = leaf.get("W").await.unwrap().unwrap();
    assert_eq!(&artifact.origin, root.id());
}

#[tokio::test]
async fn test_replayed_artifact_is_ignored() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    producer.put(payload("w1")).await.unwrap();
    wait_for_version(&consumer, "W", 1).await;
    let original = consumer.get("W").await.unwrap().unwrap();

    // Same version from the same origin with a different payload
    let mut forged = original.clone();
    forged.payload = bytes::Bytes::from_static(b"forged");
    let replay = Envelope::artifact(
        "replayer".into(),
        consumer.id().clone(),
        link.link_id.clone(),
        1,
        forged,
    );
    coordinator.deliver(replay.clone()).await.unwrap();
    coordinator.deliver(replay).await.unwrap();

    // Queued messages are handled before the next command
    let current = consumer.get("W").await.unwrap().unwrap();
    assert_eq!(current, original);

    producer.put(payload("w2")).await.unwrap();
    wait_for_version(&consumer, "W", 2).await;
    assert_eq!(consumer.get("W").await.unwrap().unwrap().payload.as_ref(), b"w2");
}

#[tokio::test]
async fn test_stale_remote_write_keeps_newer_value() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    producer.put(payload("w1")).await.unwrap();
    let v1 = producer.get("W").await.unwrap().unwrap();
    producer.put(payload("w2")).await.unwrap();
    wait_for_version(&consumer, "W", 2).await;

    let late = Envelope::artifact("replayer".into(), consumer.id().clone(), link.link_id, 1, v1);
    coordinator.deliver(late).await.unwrap();

    let current = consumer.get("W").await.unwrap().unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.payload.as_ref(), b"w2");
}

// =============================================================================
// Consistency Tests
// =============================================================================

#[tokio::test]
async fn test_sync_put_is_acknowledged() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    coordinator
        .establish(
            LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]).consistency(Consistency::Sync),
        )
        .await
        .unwrap();

    let receipt = producer.put(payload("w1")).await.unwrap();
    assert_eq!(receipt.notified, 1);
    assert_eq!(receipt.acknowledged, 1);
    assert!(receipt.fully_acknowledged());
}

#[tokio::test]
async fn test_sync_put_times_out_but_succeeds() {
    let config = NetworkConfig {
        sync_timeout_ms: 20,
        retry_base_ms: 50,
        ..NetworkConfig::manual()
    };
    let (coordinator, _task) = Coordinator::new(config).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    // Never started, so the link announcement fills its mailbox
    let consumer = ActorBuilder::new("consumer", Passive)
        .mailbox_capacity(1)
        .spawn(&coordinator)
        .await
        .unwrap();

    coordinator
        .establish(
            LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]).consistency(Consistency::Sync),
        )
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Active).await;

    let receipt = producer.put(payload("w1")).await.unwrap();
    assert_eq!(receipt.version, 1);
    assert_eq!(receipt.acknowledged, 0);
    assert_eq!(receipt.unconfirmed, 1);
    assert_eq!(producer.version_of("W").await.unwrap(), Some(1));
}

// =============================================================================
// Pull Tests
// =============================================================================

#[tokio::test]
async fn test_pull_link_fetches_on_request() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W", "b"]).mode(LinkMode::Pull))
        .await
        .unwrap();
    wait_for_link_view(&consumer, LinkStatus::Active).await;

    let receipt = producer.put(payload("w1")).await.unwrap();
    assert_eq!(receipt.notified, 0);
    assert!(consumer.get("W").await.unwrap().is_none());

    let outcome = consumer.request(link.link_id.clone(), "W").await.unwrap();
    assert_eq!(outcome, PullOutcome::Applied { version: 1 });
    assert_eq!(consumer.get("W").await.unwrap().unwrap().payload.as_ref(), b"w1");

    // Shared but never written
    let outcome = consumer.request(link.link_id.clone(), "b").await.unwrap();
    assert_eq!(outcome, PullOutcome::NotFound);

    // Not shared over this link at all
    let err = consumer.request(link.link_id, "hidden").await.unwrap_err();
    assert!(matches!(err, NetError::NotFound(_)));
}

#[tokio::test]
async fn test_pull_unknown_link() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let consumer = spawn_running(&coordinator, "consumer").await;

    let err = consumer.request("link-missing".into(), "W").await.unwrap_err();
    assert!(matches!(err, NetError::NotFound(_)));
}

// =============================================================================
// Liveness Tests
// =============================================================================

#[tokio::test]
async fn test_full_mailbox_exhausts_retries_and_degrades_link() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = ActorBuilder::new("consumer", Passive)
        .mailbox_capacity(1)
        .spawn(&coordinator)
        .await
        .unwrap();

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Active).await;

    producer.put(payload("w1")).await.unwrap();
    wait_for_link_view(&producer, LinkStatus::Degraded).await;

    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Degraded);
    let metrics = coordinator.metrics().await.unwrap();
    assert!(metrics.delivery_failures >= 1);
    assert_eq!(metrics.degraded_links, 1);

    // Paused links are skipped by later puts
    let receipt = producer.put(payload("w2")).await.unwrap();
    assert_eq!(receipt.notified, 0);
}

#[tokio::test]
async fn test_missed_heartbeats_then_resync() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    producer.put(payload("w1")).await.unwrap();
    wait_for_version(&consumer, "W", 1).await;

    // The consumer stays silent for three intervals
    coordinator.sweep().await.unwrap();
    for _ in 0..3 {
        coordinator.heartbeat(producer.id().clone()).await.unwrap();
        coordinator.sweep().await.unwrap();
    }
    assert_eq!(coordinator.link_status(link.link_id.clone()).await.unwrap(), LinkStatus::Degraded);
    wait_for_link_view(&producer, LinkStatus::Degraded).await;

    // Writes continue locally while the link is paused
    let receipt = producer.put(payload("w2")).await.unwrap();
    assert_eq!(receipt.notified, 0);
    producer.put(payload("w3")).await.unwrap();
    assert_eq!(consumer.version_of("W").await.unwrap(), Some(1));

    // The consumer comes back; the producer resends its latest version
    coordinator.heartbeat(consumer.id().clone()).await.unwrap();
    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Active);
    wait_for_version(&consumer, "W", 3).await;
    assert_eq!(consumer.get("W").await.unwrap().unwrap().payload.as_ref(), b"w3");

    let metrics = coordinator.metrics().await.unwrap();
    assert_eq!(metrics.resyncs_requested, 1);
}

#[tokio::test]
async fn test_lost_message_recovered_by_resync() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = ActorBuilder::new("consumer", Passive)
        .mailbox_capacity(1)
        .spawn(&coordinator)
        .await
        .unwrap();

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Active).await;

    // The consumer is not draining yet, so this delivery is given up
    producer.put(payload("w1")).await.unwrap();
    wait_for_link_view(&producer, LinkStatus::Degraded).await;

    consumer.start().await.unwrap();
    coordinator.heartbeat(consumer.id().clone()).await.unwrap();
    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Active);

    wait_for_version(&consumer, "W", 1).await;
    assert_eq!(consumer.get("W").await.unwrap().unwrap().payload.as_ref(), b"w1");
}

#[tokio::test]
async fn test_automatic_heartbeats_keep_links_active() {
    let config = NetworkConfig {
        heartbeat_interval_ms: 20,
        ..NetworkConfig::manual()
    };
    let (coordinator, _task) = Coordinator::new(config).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Active);
    let metrics = coordinator.metrics().await.unwrap();
    assert_eq!(metrics.unreachable_actors, 0);
    assert_eq!(metrics.joined_actors, 2);
}

#[tokio::test]
async fn test_degraded_link_drops_queued_artifacts() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    // Never started, so the link announcement fills its mailbox
    let consumer = ActorBuilder::new("consumer", Passive)
        .mailbox_capacity(1)
        .spawn(&coordinator)
        .await
        .unwrap();

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Active).await;

    for i in 1..=10 {
        let receipt = producer.put(payload(&format!("w{}", i))).await.unwrap();
        assert_eq!(receipt.version, i);
    }
    wait_for_link_view(&producer, LinkStatus::Degraded).await;

    // Only the first artifact is retried; the rest are discarded once the link pauses
    let settled = tokio::time::timeout(WAIT, async {
        loop {
            let metrics = coordinator.metrics().await.unwrap();
            if metrics.rejected_inactive >= 9 {
                return metrics;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queued artifacts were never dropped");

    assert_eq!(settled.rejected_inactive, 9);
    assert!(settled.delivery_failures <= 2, "failures: {}", settled.delivery_failures);
    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Degraded);
    assert_eq!(producer.version_of("W").await.unwrap(), Some(10));
}

#[tokio::test]
async fn test_full_lane_refuses_without_losing_local_write() {
    let config = NetworkConfig {
        lane_capacity: 2,
        retry_base_ms: 200,
        ..NetworkConfig::manual()
    };
    let (coordinator, _task) = Coordinator::new(config).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = ActorBuilder::new("consumer", Passive)
        .mailbox_capacity(1)
        .spawn(&coordinator)
        .await
        .unwrap();

    coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Active).await;

    // At most one in flight plus two queued
    let mut refused = 0;
    for i in 1..=5 {
        let receipt = producer.put(payload(&format!("w{}", i))).await.unwrap();
        assert_eq!(receipt.version, i);
        assert_eq!(receipt.notified, 1);
        refused += receipt.unconfirmed;
    }
    assert!(refused >= 2, "refused: {}", refused);

    let metrics = coordinator.metrics().await.unwrap();
    assert_eq!(metrics.lane_overflows, refused as u64);
    assert_eq!(producer.version_of("W").await.unwrap(), Some(5));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

/// Model state that may move between threads but not be shared
struct Counting {
    steps: std::cell::Cell<u32>,
}

#[async_trait]
impl ModelUnit for Counting {
    async fn compute_step(&mut self, _store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        self.steps.set(self.steps.get() + 1);
        Ok(vec![ArtifactUpdate::prediction("count", self.steps.get().to_le_bytes().to_vec())])
    }
}

#[tokio::test]
async fn test_send_only_model_runs_and_reports() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let mut status_rx = coordinator.subscribe_status();
    let actor = ActorBuilder::new("counter", Counting { steps: std::cell::Cell::new(0) })
        .spawn(&coordinator)
        .await
        .unwrap();
    actor.start().await.unwrap();

    let receipts = actor.step().await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(actor.version_of("count").await.unwrap(), Some(1));

    let event = tokio::time::timeout(WAIT, status_rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.state, ActorState::Running);
}

struct Exploding;

#[async_trait]
impl ModelUnit for Exploding {
    async fn compute_step(&mut self, _store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        Err(ModelError::Compute("loss is NaN".to_string()))
    }
}

#[tokio::test]
async fn test_failed_actor_breaks_its_links() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = ActorBuilder::new("consumer", Exploding).spawn(&coordinator).await.unwrap();
    consumer.start().await.unwrap();

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    let mut status_rx = coordinator.subscribe_status();

    let err = consumer.step().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(consumer.wait_for(ActorState::Failed).await, ActorState::Failed);

    let event = tokio::time::timeout(WAIT, status_rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.state, ActorState::Failed);
    assert_eq!(event.reason.as_deref(), Some("Computation failed: loss is NaN"));

    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Broken);
    assert!(consumer.put(payload("w1")).await.is_err());

    // The producer is told and stops sharing
    let reached = tokio::time::timeout(WAIT, async {
        while !producer.links().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok());
    let receipt = producer.put(payload("w1")).await.unwrap();
    assert_eq!(receipt.notified, 0);
}

#[tokio::test]
async fn test_graceful_stop_removes_links() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    producer.put(payload("w1")).await.unwrap();

    assert_eq!(consumer.stop(true).await.unwrap(), ActorState::Stopped);
    assert_eq!(consumer.state(), ActorState::Stopped);

    let reached = tokio::time::timeout(WAIT, async {
        while !coordinator.links().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "links should be removed after a graceful stop");
    assert!(coordinator.resolve(consumer.id().clone()).await.is_err());

    // Stopping again reports the final state
    assert_eq!(consumer.stop(true).await.unwrap(), ActorState::Stopped);
}

#[tokio::test]
async fn test_abrupt_stop_degrades_links() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let producer = spawn_running(&coordinator, "producer").await;
    let consumer = spawn_running(&coordinator, "consumer").await;

    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    let mut status_rx = coordinator.subscribe_status();

    assert_eq!(consumer.stop(false).await.unwrap(), ActorState::Stopped);

    let event = tokio::time::timeout(WAIT, status_rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.state, ActorState::Stopped);
    assert!(!event.graceful);

    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Degraded);
    wait_for_link_view(&producer, LinkStatus::Degraded).await;
}

#[tokio::test]
async fn test_put_before_start_is_rejected() {
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();
    let actor = ActorBuilder::new("idle", Passive).spawn(&coordinator).await.unwrap();

    let err = actor.put(payload("w1")).await.unwrap_err();
    assert!(matches!(err, NetError::NotRunning { state: ActorState::Created, .. }));
}

#[tokio::test]
async fn test_snapshot_restore() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("trainer.json");
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();

    let original = spawn_running(&coordinator, "trainer").await;
    original.put(payload("w1")).await.unwrap();
    original.put(payload("w2")).await.unwrap();
    original.put(ArtifactUpdate::parameter("b", b"b1".to_vec())).await.unwrap();
    original.snapshot(&path).await.unwrap();
    original.stop(true).await.unwrap();

    let restored = ActorBuilder::new("trainer", Passive)
        .restore_from(&path)
        .spawn(&coordinator)
        .await
        .unwrap();
    restored.start().await.unwrap();
    assert_ne!(restored.id(), original.id());

    let w = restored.get("W").await.unwrap().unwrap();
    assert_eq!(w.version, 2);
    assert_eq!(w.payload.as_ref(), b"w2");
    assert_eq!(restored.version_of("b").await.unwrap(), Some(1));

    let receipt = restored.put(payload("w3")).await.unwrap();
    assert_eq!(receipt.version, 3);
}

#[tokio::test]
async fn test_restore_from_missing_snapshot_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (coordinator, _task) = Coordinator::new(NetworkConfig::manual()).spawn();

    let result = ActorBuilder::new("trainer", Passive)
        .restore_from(temp_dir.path().join("missing.json"))
        .spawn(&coordinator)
        .await;
    assert!(matches!(result, Err(NetError::Snapshot(_))));
}

// =============================================================================
// Transport Tests
// =============================================================================

#[tokio::test]
async fn test_two_coordinators_over_channel_transport() {
    let transport = ChannelTransport::new(64);
    let node_a_rx = transport.bind("node-a").await;
    let node_b_rx = transport.bind("node-b").await;

    let (coord_a, _task_a) = Coordinator::with_transport(NetworkConfig::manual(), Arc::new(transport.clone())).spawn();
    let (coord_b, _task_b) = Coordinator::with_transport(NetworkConfig::manual(), Arc::new(transport.clone())).spawn();
    let _pump_a = ChannelTransport::pump(node_a_rx, coord_a.clone());
    let _pump_b = ChannelTransport::pump(node_b_rx, coord_b.clone());

    let producer = spawn_running(&coord_a, "producer").await;
    let consumer = spawn_running(&coord_b, "consumer").await;

    coord_a
        .join(consumer.id().clone(), Address::Remote("node-b".to_string()))
        .await
        .unwrap();
    coord_b
        .join(producer.id().clone(), Address::Remote("node-a".to_string()))
        .await
        .unwrap();

    let push = coord_a
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&consumer, LinkStatus::Active).await;

    producer.put(payload("w1")).await.unwrap();
    wait_for_version(&consumer, "W", 1).await;

    // Pull in the other direction crosses the transport both ways
    coord_a.destroy_link(push.link_id).await.unwrap();
    let pull = coord_a
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["b"]).mode(LinkMode::Pull))
        .await
        .unwrap();
    producer.put(ArtifactUpdate::parameter("b", b"b1".to_vec())).await.unwrap();

    let reached = tokio::time::timeout(WAIT, async {
        loop {
            if consumer.links().await.unwrap().iter().any(|l| l.link_id == pull.link_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok());

    let outcome = consumer.request(pull.link_id, "b").await.unwrap();
    assert_eq!(outcome, PullOutcome::Applied { version: 1 });

    let metrics = coord_b.metrics().await.unwrap();
    assert_eq!(metrics.local_actors, 1);
    assert_eq!(metrics.joined_actors, 2);
}

#[tokio::test]
async fn test_unbound_remote_address_fails_delivery() {
    let transport = ChannelTransport::new(8);
    let (coordinator, _task) = Coordinator::with_transport(NetworkConfig::manual(), Arc::new(transport)).spawn();
    let producer = spawn_running(&coordinator, "producer").await;

    let ghost = ActorId::generate("ghost");
    coordinator
        .join(ghost.clone(), Address::Remote("nowhere".to_string()))
        .await
        .unwrap();

    // The announcement itself cannot be delivered
    let link = coordinator
        .establish(LinkSpec::new(producer.id().clone(), ghost, ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&producer, LinkStatus::Degraded).await;

    assert_eq!(coordinator.link_status(link.link_id).await.unwrap(), LinkStatus::Degraded);
    let metrics = coordinator.metrics().await.unwrap();
    assert!(metrics.delivery_failures >= 1);
}

#[tokio::test]
async fn test_remote_links_stay_active_with_heartbeats() {
    let config = NetworkConfig {
        heartbeat_interval_ms: 20,
        ..NetworkConfig::manual()
    };
    let transport = ChannelTransport::new(256);
    let node_a_rx = transport.bind("node-a").await;
    let node_b_rx = transport.bind("node-b").await;

    let (coord_a, _task_a) = Coordinator::with_transport(config.clone(), Arc::new(transport.clone())).spawn();
    let (coord_b, _task_b) = Coordinator::with_transport(config, Arc::new(transport.clone())).spawn();
    let _pump_a = ChannelTransport::pump(node_a_rx, coord_a.clone());
    let _pump_b = ChannelTransport::pump(node_b_rx, coord_b.clone());

    let producer = spawn_running(&coord_a, "producer").await;
    let consumer = spawn_running(&coord_b, "consumer").await;
    coord_a
        .join(consumer.id().clone(), Address::Remote("node-b".to_string()))
        .await
        .unwrap();
    coord_b
        .join(producer.id().clone(), Address::Remote("node-a".to_string()))
        .await
        .unwrap();

    let link = coord_a
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    wait_for_link_view(&consumer, LinkStatus::Active).await;

    // Well past three sweeps
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(coord_a.link_status(link.link_id).await.unwrap(), LinkStatus::Active);
    let remote = coord_a.entry(consumer.id().clone()).await.unwrap().unwrap();
    assert_eq!(remote.status, EntryStatus::Joined);
    let remote = coord_b.entry(producer.id().clone()).await.unwrap().unwrap();
    assert_eq!(remote.status, EntryStatus::Joined);

    let receipt = producer.put(payload("w1")).await.unwrap();
    assert_eq!(receipt.notified, 1);
    wait_for_version(&consumer, "W", 1).await;
}

#[tokio::test]
async fn test_remote_link_recovers_after_partition() {
    let config = NetworkConfig {
        heartbeat_interval_ms: 20,
        ..NetworkConfig::manual()
    };
    let transport = ChannelTransport::new(256);
    let node_a_rx = transport.bind("node-a").await;
    let node_b_rx = transport.bind("node-b").await;

    let (coord_a, _task_a) = Coordinator::with_transport(config.clone(), Arc::new(transport.clone())).spawn();
    let (coord_b, _task_b) = Coordinator::with_transport(config, Arc::new(transport.clone())).spawn();
    let _pump_a = ChannelTransport::pump(node_a_rx, coord_a.clone());
    let _pump_b = ChannelTransport::pump(node_b_rx, coord_b.clone());

    let producer = spawn_running(&coord_a, "producer").await;
    let consumer = spawn_running(&coord_b, "consumer").await;
    coord_a
        .join(consumer.id().clone(), Address::Remote("node-b".to_string()))
        .await
        .unwrap();
    coord_b
        .join(producer.id().clone(), Address::Remote("node-a".to_string()))
        .await
        .unwrap();

    let link = coord_a
        .establish(LinkSpec::new(producer.id().clone(), consumer.id().clone(), ["W"]))
        .await
        .unwrap();
    producer.put(payload("w1")).await.unwrap();
    wait_for_version(&consumer, "W", 1).await;

    // node-b stops receiving; the next push exhausts its retries
    assert!(transport.unbind("node-b").await);
    producer.put(payload("w2")).await.unwrap();
    let failed = tokio::time::timeout(WAIT, async {
        while coord_a.metrics().await.unwrap().delivery_failures == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(failed.is_ok(), "delivery to the unbound node never failed");

    // Pings from both sides resume once node-b listens again
    let node_b_rx = transport.bind("node-b").await;
    let _pump_b = ChannelTransport::pump(node_b_rx, coord_b.clone());
    wait_for_version(&consumer, "W", 2).await;

    let recovered = tokio::time::timeout(WAIT, async {
        loop {
            let status = coord_a.link_status(link.link_id.clone()).await.unwrap();
            let entry = coord_b.entry(producer.id().clone()).await.unwrap().unwrap();
            if status == LinkStatus::Active && entry.status == EntryStatus::Joined {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(recovered.is_ok(), "link or remote entry never recovered");
}
