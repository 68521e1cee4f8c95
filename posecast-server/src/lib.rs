//! # Posecast Server
//!
//! Remote-controlled pose estimation over a pub/sub transport.
//!
//! Clients publish `start`/`stop` commands on the service channel. The
//! dispatcher validates them and drives a [`stream::JobController`] that
//! owns at most one streaming job. A running job pulls frames from its
//! source, estimates poses on a blocking thread, caches each encoded frame
//! in the blob store and publishes a small message referencing it on the
//! result channel.
#![allow(missing_docs)]

pub mod batch;
pub mod rpc;
pub mod service;
pub mod stream;
pub mod transport;

pub use service::PoseService;
