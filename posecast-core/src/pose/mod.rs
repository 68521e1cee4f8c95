//! Pose source adapter.
//!
//! The estimator itself is a black box behind [`PoseEstimator`]; what comes
//! out of it is cleaned up by [`PoseAdapter`] before it reaches the wire.

mod adapter;
pub mod coco;
#[cfg(feature = "onnx")]
mod onnx;

pub use adapter::{PoseAdapter, normalize};
#[cfg(feature = "onnx")]
pub use onnx::OnnxPoseEstimator;

use posecast_model::Resolution;
use std::{fmt, path::PathBuf};

use crate::{error::PoseError, source::Frame};

/// A keypoint as reported by a backend, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawKeypoint {
    pub part: usize,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHuman {
    pub keypoints: Vec<RawKeypoint>,
}

/// Synchronous inference backend. Implementations may hold large native
/// sessions and are driven from a blocking thread.
pub trait PoseEstimator: Send {
    fn infer(
        &mut self,
        frame: &Frame,
        target: Resolution,
        upsample: f32,
    ) -> Result<Vec<RawHuman>, PoseError>;
}

/// Loads an estimator for a model name.
pub trait EstimatorFactory: Send + Sync + fmt::Debug {
    fn load(
        &self,
        model: &str,
        resolution: Resolution,
    ) -> Result<Box<dyn PoseEstimator>, PoseError>;
}

/// Resolves `<dir>/<model>.onnx` and loads it with the ONNX backend.
#[derive(Debug, Clone)]
pub struct ModelDirFactory {
    dir: PathBuf,
}

impl ModelDirFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model_path(&self, model: &str) -> PathBuf {
        self.dir.join(format!("{model}.onnx"))
    }
}

impl EstimatorFactory for ModelDirFactory {
    fn load(
        &self,
        model: &str,
        resolution: Resolution,
    ) -> Result<Box<dyn PoseEstimator>, PoseError> {
        let path = self.model_path(model);
        if !path.is_file() {
            return Err(PoseError::ModelNotFound(path));
        }
        tracing::info!(model, %resolution, path = %path.display(), "loading pose model");
        load_backend(path)
    }
}

#[cfg(feature = "onnx")]
fn load_backend(path: PathBuf) -> Result<Box<dyn PoseEstimator>, PoseError> {
    Ok(Box::new(OnnxPoseEstimator::load(&path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_backend(path: PathBuf) -> Result<Box<dyn PoseEstimator>, PoseError> {
    Err(PoseError::Backend(format!(
        "cannot load {}: built without the `onnx` feature",
        path.display()
    )))
}
