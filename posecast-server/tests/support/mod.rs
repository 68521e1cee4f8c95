#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use posecast_config::{
    Config, ConfigMetadata, ConflictPolicy, ModelsConfig, RedisConfig,
    ServiceConfig, StreamConfig,
};
use posecast_core::{
    EstimatorFactory, Frame, FrameSource, MemoryBlobStore, PoseError,
    PoseEstimator, RawHuman, RawKeypoint, SourceError, SourceOpener,
};
use posecast_model::Resolution;
use posecast_server::{
    PoseService,
    transport::{MemoryBus, MessageBus, MessageStream},
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const SERVICE: &str = "tf-pose";
pub const RESULTS: &str = "tf-pose/pose";
pub const STATUS: &str = "tf-pose/status";
pub const HEALTH: &str = "tf-pose/health";
pub const ERRORS: &str = "error";

pub fn config(policy: ConflictPolicy) -> Config {
    Config {
        service: ServiceConfig {
            name: SERVICE.into(),
            error_channel: ERRORS.into(),
            health_marker: true,
        },
        redis: RedisConfig {
            url: "redis://unused".into(),
        },
        stream: StreamConfig {
            blob_ttl: Duration::from_secs(60),
            conflict_policy: policy,
            stop_grace: Duration::from_secs(2),
            inference_timeout: Duration::from_secs(2),
            min_body_parts: 0,
        },
        models: ModelsConfig {
            dir: "./models".into(),
            allowed: vec!["cmu".into(), "mobilenet_thin".into(), "broken".into()],
            default_resolution: Resolution::DEFAULT,
        },
        metadata: ConfigMetadata::default(),
    }
}

/// Counts sources handed out and how many are alive at once.
#[derive(Debug, Default)]
pub struct Probe {
    pub opened: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl Probe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

/// Hands out [`TaggedSource`]s. The n-th opened source paints its frames
/// with red channel `n`, which [`TagEstimator`] reports back as the nose `x`.
#[derive(Debug, Clone)]
pub struct FakeOpener {
    pub probe: Arc<Probe>,
    /// `None` streams forever.
    pub frames: Option<usize>,
    pub frame_delay: Duration,
}

impl FakeOpener {
    pub fn endless(frame_delay: Duration) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            frames: None,
            frame_delay,
        }
    }
}

impl SourceOpener for FakeOpener {
    fn open(
        &self,
        identifier: &str,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        if identifier == "missing" {
            return Err(SourceError::NotFound(identifier.to_string()));
        }
        let tag = self.probe.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(TaggedSource {
            tag: tag as u8,
            remaining: self.frames,
            delay: self.frame_delay,
            probe: Arc::clone(&self.probe),
        }))
    }
}

pub struct TaggedSource {
    tag: u8,
    remaining: Option<usize>,
    delay: Duration,
    probe: Arc<Probe>,
}

impl FrameSource for TaggedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        std::thread::sleep(self.delay);
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        Ok(Some(Frame::filled(4, 4, [self.tag, 0, 0])))
    }

    fn describe(&self) -> String {
        format!("tagged source {}", self.tag)
    }
}

impl Drop for TaggedSource {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    pub infer_delay: Duration,
}

impl EstimatorFactory for FakeFactory {
    fn load(
        &self,
        model: &str,
        _resolution: Resolution,
    ) -> Result<Box<dyn PoseEstimator>, PoseError> {
        if model == "broken" {
            return Err(PoseError::ModelNotFound(
                format!("./models/{model}.onnx").into(),
            ));
        }
        Ok(Box::new(TagEstimator {
            delay: self.infer_delay,
        }))
    }
}

/// Reports one human whose nose `x` is the frame's red channel / 100.
pub struct TagEstimator {
    pub delay: Duration,
}

impl PoseEstimator for TagEstimator {
    fn infer(
        &mut self,
        frame: &Frame,
        _target: Resolution,
        _upsample: f32,
    ) -> Result<Vec<RawHuman>, PoseError> {
        std::thread::sleep(self.delay);
        let tag = frame.as_rgb().first().copied().unwrap_or(0);
        Ok(vec![RawHuman {
            keypoints: vec![
                RawKeypoint {
                    part: 1,
                    x: 0.5,
                    y: 0.4,
                    score: 0.8,
                },
                RawKeypoint {
                    part: 0,
                    x: f32::from(tag) / 100.0,
                    y: 0.25,
                    score: 0.9,
                },
            ],
        }])
    }
}

/// A [`PoseService`] running on in-memory transport and blob store.
pub struct Harness {
    pub bus: Arc<MemoryBus>,
    pub blobs: Arc<MemoryBlobStore>,
    pub probe: Arc<Probe>,
    pub shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Harness {
    pub async fn start(
        config: Config,
        opener: FakeOpener,
        factory: FakeFactory,
    ) -> Result<Self> {
        let bus = Arc::new(MemoryBus::default());
        let blobs = Arc::new(MemoryBlobStore::new());
        let probe = Arc::clone(&opener.probe);
        let service = PoseService::new(
            &config,
            bus.clone(),
            blobs.clone(),
            Arc::new(opener),
            Arc::new(factory),
        );

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let _ = service.run(token).await;
        });

        // The health marker goes out right after the command subscription.
        tokio::time::timeout(Duration::from_secs(5), async {
            while bus.retained(HEALTH).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .context("service did not come up")?;

        Ok(Self {
            bus,
            blobs,
            probe,
            shutdown,
            task,
        })
    }

    pub async fn listen(&self, channels: &[&str]) -> Result<MessageStream> {
        let channels: Vec<String> =
            channels.iter().map(|channel| channel.to_string()).collect();
        Ok(self.bus.subscribe(&channels).await?)
    }

    pub async fn send(&self, command: Value) -> Result<()> {
        self.bus
            .publish(SERVICE, serde_json::to_vec(&command)?)
            .await?;
        Ok(())
    }

    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .context("service did not shut down")??;
        Ok(())
    }
}

pub async fn next_json(stream: &mut MessageStream) -> Result<(String, Value)> {
    let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .context("timed out waiting for a message")?
        .ok_or_else(|| anyhow!("message stream closed"))?;
    let value = serde_json::from_slice(&message.payload)
        .with_context(|| format!("invalid json on {}", message.channel))?;
    Ok((message.channel, value))
}

/// Waits for the next status event in `state`, skipping others.
pub async fn wait_state(
    stream: &mut MessageStream,
    state: &str,
) -> Result<Value> {
    loop {
        let (_, event) = next_json(stream).await?;
        if event["state"] == state {
            return Ok(event);
        }
    }
}

/// Consumes whatever is already queued on `stream`.
pub async fn drain(stream: &mut MessageStream) -> usize {
    let mut drained = 0;
    while let Ok(Some(_)) =
        tokio::time::timeout(Duration::from_millis(100), stream.next()).await
    {
        drained += 1;
    }
    drained
}

/// The source tag carried by a frame message.
pub fn tag_of(message: &Value) -> Option<u8> {
    let nose = message["humans"][0]
        .as_array()?
        .iter()
        .find(|keypoint| keypoint["index"] == 0)?;
    let x = nose["x"].as_f64()?;
    Some((x * 100.0).round() as u8)
}

pub fn start_command(reply_to: &str) -> Value {
    serde_json::json!({
        "method": "start",
        "params": {
            "camera": "0",
            "model": "cmu",
            "resize": "432x368",
            "resize_out_ratio": 4.0
        },
        "replyTo": reply_to
    })
}
