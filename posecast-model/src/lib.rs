//! Core data model definitions shared across posecast crates.
//!
//! Everything in here is a wire type: it is what travels over the command,
//! response, result and status channels, or what sits in the blob cache.
#![allow(missing_docs)]

pub mod envelope;
pub mod error;
pub mod ids;
pub mod pose;
pub mod resolution;
pub mod status;

pub use envelope::{
    API_VERSION, CommandEnvelope, ERROR_CODE, ErrorBody, ResponseBody,
    ResponseEnvelope,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{BlobKey, StreamId};
pub use pose::{BodyPart, FrameMessage, Human, Keypoint};
pub use resolution::Resolution;
pub use status::{HealthStatus, StreamState, StreamStatusEvent};
