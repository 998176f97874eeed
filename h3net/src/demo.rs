//! Demonstration network
//!
//! A trainer actor fits `y = w*x + b` by minibatch gradient descent and pushes
//! `W` and `b` to predictor actors, which publish a prediction for a fixed
//! probe input after every step.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use eyre::{Context, Result, eyre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::actor::{ActorBuilder, ActorHandle, DataFeed, ModelError, ModelUnit, VecFeed};
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorMetrics};
use crate::domain::{Artifact, ArtifactUpdate};
use crate::link::LinkSpec;
use crate::store::ArtifactStore;

pub const WEIGHT: &str = "W";
pub const BIAS: &str = "b";
pub const PREDICTION: &str = "prediction";

const TRUE_WEIGHT: f64 = 3.0;
const TRUE_BIAS: f64 = 1.0;
const LEARNING_RATE: f64 = 0.1;
const PROBE_X: f64 = 0.5;
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn encode_f64(value: f64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

pub fn decode_f64(artifact: &Artifact) -> Result<f64, ModelError> {
    let bytes: [u8; 8] = artifact
        .payload
        .as_ref()
        .try_into()
        .map_err(|_| ModelError::Malformed {
            name: artifact.name.clone(),
            reason: format!("expected 8 bytes, got {}", artifact.payload.len()),
        })?;
    Ok(f64::from_le_bytes(bytes))
}

/// Generate noisy samples of the target line
pub fn generate_samples(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x: f64 = rng.random_range(-1.0..1.0);
            let noise: f64 = rng.random_range(-0.05..0.05);
            (x, TRUE_WEIGHT * x + TRUE_BIAS + noise)
        })
        .collect()
}

/// Minibatch gradient descent over a data feed
pub struct LinearTrainer<F: DataFeed<Batch = Vec<(f64, f64)>>> {
    feed: F,
    learning_rate: f64,
    epoch: u32,
}

impl<F: DataFeed<Batch = Vec<(f64, f64)>>> LinearTrainer<F> {
    pub fn new(feed: F, learning_rate: f64) -> Self {
        Self {
            feed,
            learning_rate,
            epoch: 0,
        }
    }

    fn current(store: &ArtifactStore, name: &str) -> Result<f64, ModelError> {
        let artifact = store.get(name).ok_or_else(|| ModelError::MissingInput(name.to_string()))?;
        decode_f64(artifact)
    }
}

#[async_trait]
impl<F> ModelUnit for LinearTrainer<F>
where
    F: DataFeed<Batch = Vec<(f64, f64)>> + 'static,
{
    async fn initialize(&mut self, store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        self.feed.reset();
        // Restored stores keep their parameters
        if store.get(WEIGHT).is_some() && store.get(BIAS).is_some() {
            return Ok(Vec::new());
        }
        Ok(vec![
            ArtifactUpdate::parameter(WEIGHT, encode_f64(0.0)),
            ArtifactUpdate::parameter(BIAS, encode_f64(0.0)),
        ])
    }

    async fn compute_step(&mut self, store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        let batch = match self.feed.next_batch() {
            Some(batch) => batch,
            None => {
                self.epoch += 1;
                debug!(epoch = self.epoch, "LinearTrainer::compute_step: epoch finished");
                self.feed.reset();
                self.feed.next_batch().ok_or_else(|| ModelError::Compute("empty data feed".to_string()))?
            }
        };

        let w = Self::current(store, WEIGHT)?;
        let b = Self::current(store, BIAS)?;

        let n = batch.len() as f64;
        let (grad_w, grad_b) = batch.iter().fold((0.0, 0.0), |(gw, gb), (x, y)| {
            let err = w * x + b - y;
            (gw + err * x, gb + err)
        });
        let w = w - self.learning_rate * 2.0 * grad_w / n;
        let b = b - self.learning_rate * 2.0 * grad_b / n;
        if !w.is_finite() || !b.is_finite() {
            return Err(ModelError::Compute(format!("parameters diverged (w={}, b={})", w, b)));
        }

        Ok(vec![
            ArtifactUpdate::parameter(WEIGHT, encode_f64(w)),
            ArtifactUpdate::parameter(BIAS, encode_f64(b)),
        ])
    }
}

/// Publishes `w*probe + b` from whatever parameters it has received
pub struct Predictor {
    probe: f64,
    last_inputs: Option<(u64, u64)>,
}

impl Predictor {
    pub fn new(probe: f64) -> Self {
        Self {
            probe,
            last_inputs: None,
        }
    }
}

#[async_trait]
impl ModelUnit for Predictor {
    async fn compute_step(&mut self, store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        let (Some(w), Some(b)) = (store.get(WEIGHT), store.get(BIAS)) else {
            return Ok(Vec::new());
        };
        // Nothing new since the last prediction
        let inputs = (w.version, b.version);
        if self.last_inputs == Some(inputs) {
            return Ok(Vec::new());
        }
        self.last_inputs = Some(inputs);

        let prediction = decode_f64(w)? * self.probe + decode_f64(b)?;
        Ok(vec![ArtifactUpdate::prediction(PREDICTION, encode_f64(prediction))])
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsumerReport {
    pub actor: String,
    pub weight_version: u64,
    pub prediction: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DemoReport {
    pub seed: u64,
    pub steps: u32,
    pub weight: f64,
    pub bias: f64,
    pub weight_version: u64,
    pub probe: f64,
    pub consumers: Vec<ConsumerReport>,
    pub snapshot: Option<PathBuf>,
    pub metrics: CoordinatorMetrics,
}

async fn read_f64(handle: &ActorHandle, name: &str) -> Result<Option<f64>> {
    match handle.get(name).await? {
        Some(artifact) => Ok(Some(decode_f64(&artifact)?)),
        None => Ok(None),
    }
}

/// Wait until every consumer holds at least the given versions
async fn await_convergence(consumers: &[ActorHandle], targets: &[(&str, u64)]) -> Result<()> {
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    for consumer in consumers {
        for (name, version) in targets {
            while consumer.version_of(name).await? < Some(*version) {
                if tokio::time::Instant::now() >= deadline {
                    return Err(eyre!("{} did not receive {} v{} in time", consumer.id(), name, version));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
    Ok(())
}

/// Build the network, train, and report what each actor ended up with
pub async fn run_demo(config: &Config) -> Result<DemoReport> {
    let demo = &config.demo;
    let seed = demo.seed.unwrap_or_else(rand::random);
    info!(seed, consumers = demo.consumers, epochs = demo.epochs, "Starting demo network");

    let (coordinator, coordinator_task) = Coordinator::new(config.network.clone()).spawn();

    let samples = generate_samples(demo.samples.max(1), seed);
    let feed = VecFeed::new(samples, demo.batch_size);
    let batches_per_epoch = feed.len().div_ceil(demo.batch_size.max(1)) as u32;

    let trainer = ActorBuilder::new("trainer", LinearTrainer::new(feed, LEARNING_RATE))
        .spawn(&coordinator)
        .await
        .context("Failed to spawn trainer")?;
    trainer.start().await?;

    let mut consumers = Vec::with_capacity(demo.consumers);
    for i in 0..demo.consumers {
        let consumer = ActorBuilder::new(format!("predictor-{}", i), Predictor::new(PROBE_X))
            .spawn(&coordinator)
            .await
            .context("Failed to spawn predictor")?;
        consumer.start().await?;
        coordinator
            .establish(
                LinkSpec::new(trainer.id().clone(), consumer.id().clone(), [WEIGHT, BIAS]).consistency(demo.consistency),
            )
            .await?;
        consumers.push(consumer);
    }

    let steps = demo.epochs * batches_per_epoch;
    for step in 0..steps {
        trainer.step().await.context(format!("Trainer step {} failed", step))?;
        for consumer in &consumers {
            consumer.step().await?;
        }
    }

    let weight_version = trainer
        .version_of(WEIGHT)
        .await?
        .ok_or_else(|| eyre!("trainer has no {}", WEIGHT))?;
    let bias_version = trainer.version_of(BIAS).await?.unwrap_or(0);
    await_convergence(&consumers, &[(WEIGHT, weight_version), (BIAS, bias_version)]).await?;

    let mut reports = Vec::with_capacity(consumers.len());
    for consumer in &consumers {
        consumer.step().await?;
        reports.push(ConsumerReport {
            actor: consumer.id().to_string(),
            weight_version: consumer.version_of(WEIGHT).await?.unwrap_or(0),
            prediction: read_f64(consumer, PREDICTION).await?,
        });
    }

    let snapshot = match &demo.snapshot_dir {
        Some(dir) => {
            let path = dir.join(format!("{}.json", trainer.id()));
            trainer.snapshot(&path).await?;
            Some(path)
        }
        None => None,
    };

    let report = DemoReport {
        seed,
        steps,
        weight: read_f64(&trainer, WEIGHT).await?.unwrap_or_default(),
        bias: read_f64(&trainer, BIAS).await?.unwrap_or_default(),
        weight_version,
        probe: PROBE_X,
        consumers: reports,
        snapshot,
        metrics: coordinator.metrics().await?,
    };

    for consumer in &consumers {
        consumer.stop(true).await?;
    }
    trainer.stop(true).await?;
    coordinator.shutdown().await?;
    coordinator_task.await.context("Coordinator task panicked")?;

    info!(weight = report.weight, bias = report.bias, "Demo finished");
    Ok(report)
}
