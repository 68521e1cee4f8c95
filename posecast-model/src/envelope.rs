//! Command and response envelopes exchanged on the RPC channels.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version string stamped on every response.
pub const API_VERSION: &str = "beta";

/// The single error code used on the wire. Error kinds are distinguished by
/// their message only.
pub const ERROR_CODE: i32 = 1;

/// Inbound command, as published by a client on the command channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl CommandEnvelope {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
            reply_to: None,
            context: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Payload of a response; exactly one of `data` or `error` is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseBody {
    Data(Value),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    pub service_name: String,
}

/// Outbound reply published to the resolved `replyTo` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(flatten)]
    pub body: ResponseBody,
    pub api_version: String,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ResponseEnvelope {
    pub fn data(service_name: &str, data: Value) -> Self {
        Self {
            body: ResponseBody::Data(data),
            api_version: API_VERSION.to_string(),
            service_name: service_name.to_string(),
            context: None,
        }
    }

    pub fn error(service_name: &str, message: impl Into<String>) -> Self {
        Self {
            body: ResponseBody::Error(ErrorBody {
                code: ERROR_CODE,
                message: message.into(),
                service_name: service_name.to_string(),
            }),
            api_version: API_VERSION.to_string(),
            service_name: service_name.to_string(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<Value>) -> Self {
        self.context = context;
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ResponseBody::Error(_))
    }

    pub fn data_ref(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Data(value) => Some(value),
            ResponseBody::Error(_) => None,
        }
    }

    pub fn error_ref(&self) -> Option<&ErrorBody> {
        match &self.body {
            ResponseBody::Data(_) => None,
            ResponseBody::Error(error) => Some(error),
        }
    }
}
