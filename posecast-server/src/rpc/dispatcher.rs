use posecast_config::{ModelsConfig, ServiceConfig, has_wildcard};
use posecast_model::{API_VERSION, ERROR_CODE, ResponseEnvelope};
use serde_json::{Value, json};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

use super::{
    error::{ErrorKind, RpcError},
    params::{EnvelopeHeader, decode_command, parse_object, parse_start},
};
use crate::{
    stream::JobController,
    transport::{MessageBus, TransportError},
};

/// A response and the channel it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub channel: String,
    pub envelope: ResponseEnvelope,
}

/// Turns inbound command messages into controller calls and replies.
///
/// Every message yields exactly one reply. Replies to failures raised while
/// a handler runs, or to envelopes that could not be read, go to the error
/// channel and never to the caller-supplied `replyTo`.
#[derive(Clone)]
pub struct Dispatcher {
    service_name: String,
    error_channel: String,
    models: ModelsConfig,
    controller: JobController,
    bus: Arc<dyn MessageBus>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("service_name", &self.service_name)
            .field("error_channel", &self.error_channel)
            .field("models", &self.models.allowed)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        service: &ServiceConfig,
        models: ModelsConfig,
        controller: JobController,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            service_name: service.name.clone(),
            error_channel: service.error_channel.clone(),
            models,
            controller,
            bus,
        }
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    /// Handles one raw message and publishes its reply.
    pub async fn handle(&self, raw: &[u8]) -> Result<(), TransportError> {
        let reply = self.respond(raw).await;
        let (channel, payload) = self.encode(reply);
        self.bus.publish(&channel, payload).await
    }

    /// Serializes a reply. A reply that cannot be serialized is replaced by
    /// a fixed error envelope on the error channel.
    fn encode(&self, reply: Reply) -> (String, Vec<u8>) {
        match serde_json::to_vec(&reply.envelope) {
            Ok(payload) => (reply.channel, payload),
            Err(err) => {
                warn!(
                    error = %err,
                    channel = %reply.channel,
                    "failed to serialize response"
                );
                (self.error_channel.clone(), self.serialization_failure(&err))
            }
        }
    }

    fn serialization_failure(&self, err: &serde_json::Error) -> Vec<u8> {
        json!({
            "error": {
                "code": ERROR_CODE,
                "message": format!("Failed to serialize response: {err}"),
                "serviceName": self.service_name,
            },
            "apiVersion": API_VERSION,
            "serviceName": self.service_name,
        })
        .to_string()
        .into_bytes()
    }

    /// Computes the reply for one raw message without publishing it.
    pub async fn respond(&self, raw: &[u8]) -> Reply {
        let object = match parse_object(raw) {
            Ok(object) => object,
            Err(err) => return self.failure(err, EnvelopeHeader::default()),
        };
        let header = EnvelopeHeader::read(&object);

        let result = match decode_command(object) {
            Ok(command) => {
                debug!(method = %command.method, "dispatching command");
                self.execute(&command.method, &command.params).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(data) => Reply {
                channel: self.reply_channel(header.reply_to.as_deref()),
                envelope: ResponseEnvelope::data(&self.service_name, data)
                    .with_context(header.context),
            },
            Err(err) => self.failure(err, header),
        }
    }

    async fn execute(
        &self,
        method: &str,
        params: &serde_json::Map<String, Value>,
    ) -> Result<Value, RpcError> {
        match method {
            "start" => {
                let request = parse_start(params, &self.models)?;
                let stream_id = self.controller.start(request).await?;
                Ok(json!({ "streamId": stream_id }))
            }
            "stop" => {
                if self.controller.stop().await.is_none() {
                    debug!("stop requested with no running stream");
                }
                Ok(json!({ "status": "stopped" }))
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }

    fn failure(&self, err: RpcError, header: EnvelopeHeader) -> Reply {
        let channel = if err.replies_to_caller() {
            self.reply_channel(header.reply_to.as_deref())
        } else {
            self.error_channel.clone()
        };

        match err.kind() {
            ErrorKind::Runtime => {
                warn!(error = %err, channel = %channel, "command failed")
            }
            ErrorKind::Malformed => {
                info!(error = %err, "discarding unreadable command")
            }
            _ => debug!(error = %err, channel = %channel, "command rejected"),
        }

        Reply {
            channel,
            envelope: ResponseEnvelope::error(
                &self.service_name,
                err.to_string(),
            )
            .with_context(header.context),
        }
    }

    /// The caller's `replyTo` when it names a single concrete channel,
    /// otherwise the error channel.
    fn reply_channel(&self, reply_to: Option<&str>) -> String {
        match reply_to.map(str::trim) {
            Some(channel) if !channel.is_empty() && !has_wildcard(channel) => {
                channel.to_string()
            }
            _ => self.error_channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        stream::{ControllerSettings, FramePublisher},
        transport::MemoryBus,
    };
    use futures::StreamExt;
    use posecast_config::ConflictPolicy;
    use posecast_core::{
        EstimatorFactory, FrameSource, MemoryBlobStore, PoseError,
        PoseEstimator, SourceError, SourceOpener,
    };
    use posecast_model::Resolution;
    use std::time::Duration;

    #[derive(Debug)]
    struct Unavailable;

    impl SourceOpener for Unavailable {
        fn open(
            &self,
            identifier: &str,
        ) -> Result<Box<dyn FrameSource>, SourceError> {
            Err(SourceError::NotFound(identifier.to_string()))
        }
    }

    #[derive(Debug)]
    struct NoModels;

    impl EstimatorFactory for NoModels {
        fn load(
            &self,
            model: &str,
            _resolution: Resolution,
        ) -> Result<Box<dyn PoseEstimator>, PoseError> {
            Err(PoseError::Backend(format!("no backend for {model}")))
        }
    }

    fn dispatcher() -> Dispatcher {
        let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::default());
        let publisher = FramePublisher::new(
            bus.clone(),
            Arc::new(MemoryBlobStore::new()),
            "tf-pose/pose",
            Duration::from_secs(60),
        );
        let controller = JobController::new(
            ControllerSettings {
                conflict_policy: ConflictPolicy::Reject,
                stop_grace: Duration::from_secs(1),
                inference_timeout: Duration::from_secs(1),
                min_body_parts: 0,
                status_channel: "tf-pose/status".into(),
            },
            bus.clone(),
            publisher,
            Arc::new(Unavailable),
            Arc::new(NoModels),
        );
        Dispatcher::new(
            &ServiceConfig {
                name: "tf-pose".into(),
                error_channel: "error".into(),
                health_marker: false,
            },
            ModelsConfig {
                dir: "./models".into(),
                allowed: vec!["cmu".into()],
                default_resolution: Resolution::DEFAULT,
            },
            controller,
            bus,
        )
    }

    fn message(reply: &Reply) -> String {
        reply.envelope.error_ref().unwrap().message.clone()
    }

    #[tokio::test]
    async fn stop_without_job_is_acknowledged() {
        let reply = dispatcher()
            .respond(br#"{"method":"stop","replyTo":"client/1"}"#)
            .await;
        assert_eq!(reply.channel, "client/1");
        assert_eq!(
            reply.envelope.data_ref(),
            Some(&json!({"status": "stopped"}))
        );
        assert_eq!(reply.envelope.api_version, "beta");
        assert_eq!(reply.envelope.service_name, "tf-pose");
    }

    #[tokio::test]
    async fn unknown_method_replies_to_caller() {
        let reply = dispatcher()
            .respond(br#"{"method":"pause","params":{},"replyTo":"client/1"}"#)
            .await;
        assert_eq!(reply.channel, "client/1");
        assert_eq!(message(&reply), "Unknown method 'pause'");
    }

    #[tokio::test]
    async fn start_with_no_params_lists_all_required() {
        let reply = dispatcher()
            .respond(br#"{"method":"start","replyTo":"client/1"}"#)
            .await;
        assert_eq!(reply.channel, "client/1");
        assert_eq!(
            message(&reply),
            "Missing required param(s): 'camera, model, resize_out_ratio'"
        );
    }

    #[tokio::test]
    async fn runtime_failure_goes_to_error_channel() {
        let reply = dispatcher()
            .respond(
                br#"{"method":"start","replyTo":"client/1",
                     "params":{"camera":"nope","model":"cmu","resize_out_ratio":4}}"#,
            )
            .await;
        assert_eq!(reply.channel, "error");
        assert!(message(&reply).contains("nope"));
        assert_eq!(reply.envelope.error_ref().unwrap().code, 1);
    }

    #[tokio::test]
    async fn unreadable_payload_goes_to_error_channel() {
        let reply = dispatcher().respond(b"not json").await;
        assert_eq!(reply.channel, "error");
        assert!(message(&reply).starts_with("Malformed command"));
        assert!(reply.envelope.context.is_none());
    }

    #[tokio::test]
    async fn wildcard_and_missing_reply_to_fall_back() {
        let dispatcher = dispatcher();
        for raw in [
            &br#"{"method":"stop","replyTo":"clients/*"}"#[..],
            &br#"{"method":"stop","replyTo":"a/#"}"#[..],
            &br#"{"method":"stop","replyTo":"  "}"#[..],
            &br#"{"method":"stop"}"#[..],
        ] {
            assert_eq!(dispatcher.respond(raw).await.channel, "error");
        }
    }

    #[test]
    fn unserializable_reply_falls_back_to_error_envelope() {
        let dispatcher = dispatcher();
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        let payload = dispatcher.serialization_failure(&err);

        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["error"]["code"], 1);
        assert_eq!(value["error"]["serviceName"], "tf-pose");
        assert!(
            value["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Failed to serialize response")
        );
        assert_eq!(value["apiVersion"], "beta");
        assert!(value.get("data").is_none());
    }

    #[tokio::test]
    async fn handle_publishes_exactly_one_reply() {
        let dispatcher = dispatcher();
        let mut replies = dispatcher
            .bus
            .subscribe(&["client/1".into(), "error".into()])
            .await
            .unwrap();

        dispatcher
            .handle(br#"{"method":"stop","replyTo":"client/1"}"#)
            .await
            .unwrap();

        let message = replies.next().await.unwrap();
        assert_eq!(message.channel, "client/1");
        let late =
            tokio::time::timeout(Duration::from_millis(100), replies.next())
                .await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn context_is_echoed_on_success_and_failure() {
        let dispatcher = dispatcher();
        let reply = dispatcher
            .respond(br#"{"method":"stop","replyTo":"r","context":{"id":7}}"#)
            .await;
        assert_eq!(reply.envelope.context, Some(json!({"id": 7})));

        let reply = dispatcher
            .respond(br#"{"method":"jump","replyTo":"r","context":"abc"}"#)
            .await;
        assert_eq!(reply.envelope.context, Some(json!("abc")));

        let reply = dispatcher
            .respond(br#"{"method":"stop","replyTo":"r","context":null}"#)
            .await;
        assert!(reply.envelope.context.is_none());
    }
}
