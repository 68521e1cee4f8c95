//! Wires the transport, dispatcher and controller into a running service.

use futures::StreamExt;
use posecast_config::{Config, ServiceConfig};
use posecast_core::{BlobStore, EstimatorFactory, SourceOpener};
use posecast_model::HealthStatus;
use std::{fmt, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    rpc::Dispatcher,
    stream::{ControllerSettings, FramePublisher, JobController},
    transport::{MessageBus, TransportError},
};

pub struct PoseService {
    service: ServiceConfig,
    stop_grace: Duration,
    bus: Arc<dyn MessageBus>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for PoseService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseService")
            .field("service", &self.service)
            .field("stop_grace", &self.stop_grace)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl PoseService {
    pub fn new(
        config: &Config,
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
        sources: Arc<dyn SourceOpener>,
        estimators: Arc<dyn EstimatorFactory>,
    ) -> Self {
        let publisher = FramePublisher::new(
            Arc::clone(&bus),
            blobs,
            config.service.result_channel(),
            config.stream.blob_ttl,
        );
        let controller = JobController::new(
            ControllerSettings::from_config(config),
            Arc::clone(&bus),
            publisher,
            sources,
            estimators,
        );
        let dispatcher = Dispatcher::new(
            &config.service,
            config.models.clone(),
            controller,
            Arc::clone(&bus),
        );

        Self {
            service: config.service.clone(),
            stop_grace: config.stream.stop_grace,
            bus,
            dispatcher,
        }
    }

    pub fn controller(&self) -> &JobController {
        self.dispatcher.controller()
    }

    /// Serves commands until `shutdown` fires or the command stream ends,
    /// then stops the running job and marks the service unhealthy.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let command_channel = self.service.command_channel();
        let mut commands = self
            .bus
            .subscribe(std::slice::from_ref(&command_channel))
            .await?;
        info!(channel = %command_channel, "listening for commands");

        self.mark(HealthStatus::Healthy).await;

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                message = commands.next() => message,
            };
            let Some(message) = message else {
                warn!(channel = %command_channel, "command stream closed");
                break;
            };

            if let Err(err) = self.dispatcher.handle(&message.payload).await {
                warn!(error = %err, "failed to publish response");
            }
        }

        self.dispatcher.controller().shutdown(self.stop_grace).await;
        self.mark(HealthStatus::Unhealthy).await;
        Ok(())
    }

    async fn mark(&self, status: HealthStatus) {
        if !self.service.health_marker {
            return;
        }
        let channel = self.service.health_channel();
        let payload = status.as_str().as_bytes().to_vec();
        match self.bus.publish_retained(&channel, payload).await {
            Ok(()) => {
                info!(channel = %channel, status = status.as_str(), "health marker published")
            }
            Err(err) => {
                warn!(channel = %channel, error = %err, "failed to publish health marker")
            }
        }
    }
}
