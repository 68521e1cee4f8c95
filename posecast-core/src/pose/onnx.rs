use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use posecast_model::Resolution;
use std::{
    fmt,
    path::{Path, PathBuf},
};

use super::{
    PoseEstimator, RawHuman,
    coco::{COCO_KEYPOINTS, human_from_coco},
};
use crate::{error::PoseError, source::Frame};

/// Single-pose keypoint regressor run through ONNX Runtime.
///
/// Expects an NHWC float input in the 0-255 range and a `[1, 1, 17, 3]`
/// output of `(y, x, score)` triplets. The frame is resized to the target
/// resolution before inference; the upsample factor has no meaning for this
/// model family and is ignored.
pub struct OnnxPoseEstimator {
    session: Session,
    input_name: String,
    output_name: String,
    path: PathBuf,
}

impl fmt::Debug for OnnxPoseEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxPoseEstimator")
            .field("path", &self.path)
            .field("input", &self.input_name)
            .field("output", &self.output_name)
            .finish()
    }
}

impl OnnxPoseEstimator {
    pub fn load(path: &Path) -> Result<Self, PoseError> {
        let session = Session::builder()
            .map_err(|err| load_error(path, err))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|err| load_error(path, err))?
            .commit_from_file(path)
            .map_err(|err| load_error(path, err))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| PoseError::Backend("model has no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| PoseError::Backend("model has no outputs".into()))?;

        Ok(Self {
            session,
            input_name,
            output_name,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn preprocess(
        frame: &Frame,
        target: Resolution,
    ) -> Result<Array4<f32>, PoseError> {
        if target.is_unspecified() {
            return Err(PoseError::InvalidFrame(format!(
                "target resolution {target} is empty"
            )));
        }
        let view = frame
            .view()
            .map_err(|err| PoseError::InvalidFrame(err.to_string()))?;
        let resized =
            imageops::resize(&view, target.width, target.height, FilterType::Triangle);

        let (width, height) = (target.width as usize, target.height as usize);
        let mut tensor = Array4::<f32>::zeros((1, height, width, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, y as usize, x as usize, channel]] =
                    pixel.0[channel] as f32;
            }
        }
        Ok(tensor)
    }
}

fn load_error(path: &Path, err: impl fmt::Display) -> PoseError {
    PoseError::Backend(format!("failed to load {}: {err}", path.display()))
}

fn inference_error(err: impl fmt::Display) -> PoseError {
    PoseError::Inference(err.to_string())
}

impl PoseEstimator for OnnxPoseEstimator {
    fn infer(
        &mut self,
        frame: &Frame,
        target: Resolution,
        _upsample: f32,
    ) -> Result<Vec<RawHuman>, PoseError> {
        let input = Self::preprocess(frame, target)?;
        let input_tensor = Tensor::from_array(input).map_err(inference_error)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(inference_error)?;

        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .map_err(inference_error)?;

        let values: Vec<f32> = output.iter().copied().collect();
        if values.len() < COCO_KEYPOINTS * 3 {
            return Err(PoseError::Inference(format!(
                "expected {} output values, got {}",
                COCO_KEYPOINTS * 3,
                values.len()
            )));
        }
        let triplets: Vec<[f32; 3]> = values
            .chunks_exact(3)
            .take(COCO_KEYPOINTS)
            .map(|chunk| [chunk[0], chunk[1], chunk[2]])
            .collect();

        Ok(human_from_coco(&triplets).into_iter().collect())
    }
}
