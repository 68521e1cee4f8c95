use posecast_model::{BodyPart, Human, Keypoint, Resolution};
use std::fmt;

use super::{PoseEstimator, RawHuman};
use crate::{error::PoseError, source::Frame};

/// Wraps an estimator and turns its raw output into wire-ready humans.
pub struct PoseAdapter {
    estimator: Box<dyn PoseEstimator>,
    min_body_parts: usize,
}

impl fmt::Debug for PoseAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseAdapter")
            .field("min_body_parts", &self.min_body_parts)
            .finish_non_exhaustive()
    }
}

impl PoseAdapter {
    pub fn new(estimator: Box<dyn PoseEstimator>) -> Self {
        Self {
            estimator,
            min_body_parts: 0,
        }
    }

    /// Humans with fewer detected parts are dropped. `0` keeps everyone.
    pub fn with_min_body_parts(mut self, min_body_parts: usize) -> Self {
        self.min_body_parts = min_body_parts;
        self
    }

    pub fn infer(
        &mut self,
        frame: &Frame,
        target: Resolution,
        upsample: f32,
    ) -> Result<Vec<Human>, PoseError> {
        let raw = self.estimator.infer(frame, target, upsample)?;
        Ok(normalize(raw, self.min_body_parts))
    }
}

/// Validates and orders raw estimator output.
///
/// Non-finite values and unknown part indices are dropped, coordinates are
/// clamped into `[0, 1]`, each part keeps its highest scoring keypoint and
/// keypoints come out sorted by part index. Humans left with no parts, or
/// fewer than `min_body_parts`, are removed.
pub fn normalize(raw: Vec<RawHuman>, min_body_parts: usize) -> Vec<Human> {
    raw.into_iter()
        .filter_map(|human| {
            let mut slots: [Option<Keypoint>; BodyPart::COUNT] =
                [None; BodyPart::COUNT];

            for keypoint in human.keypoints {
                if !(keypoint.x.is_finite()
                    && keypoint.y.is_finite()
                    && keypoint.score.is_finite())
                {
                    continue;
                }
                let Some(part) = BodyPart::from_index(keypoint.part) else {
                    continue;
                };
                let candidate = Keypoint::new(
                    part,
                    keypoint.x.clamp(0.0, 1.0),
                    keypoint.y.clamp(0.0, 1.0),
                    keypoint.score,
                )
                .rounded();

                let slot = &mut slots[part.index()];
                let replace = slot
                    .map_or(true, |existing| existing.score < candidate.score);
                if replace {
                    *slot = Some(candidate);
                }
            }

            let keypoints: Vec<Keypoint> = slots.into_iter().flatten().collect();
            let count = keypoints.len();
            (count > 0 && count >= min_body_parts)
                .then(|| Human::new(keypoints))
        })
        .collect()
}
