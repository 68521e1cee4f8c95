//! Mapping from the 17-keypoint COCO layout used by single-pose regressors
//! to the 18-part layout on the wire.

use posecast_model::BodyPart;

use super::{RawHuman, RawKeypoint};

pub const COCO_KEYPOINTS: usize = 17;

/// Keypoints below this confidence are treated as not detected.
pub const DETECTION_THRESHOLD: f32 = 0.2;

/// Target part for each COCO keypoint index.
const COCO_TO_PART: [BodyPart; COCO_KEYPOINTS] = [
    BodyPart::Nose,
    BodyPart::LeftEye,
    BodyPart::RightEye,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

/// Builds one human from `(y, x, score)` triplets in COCO order.
///
/// The neck is synthesized as the midpoint of both shoulders when both were
/// detected. Returns `None` when nothing cleared the threshold.
pub fn human_from_coco(triplets: &[[f32; 3]]) -> Option<RawHuman> {
    let mut keypoints: Vec<RawKeypoint> = triplets
        .iter()
        .zip(COCO_TO_PART.iter())
        .filter(|([_, _, score], _)| *score >= DETECTION_THRESHOLD)
        .map(|([y, x, score], part)| RawKeypoint {
            part: part.index(),
            x: *x,
            y: *y,
            score: *score,
        })
        .collect();

    let find = |keypoints: &[RawKeypoint], part: BodyPart| {
        keypoints.iter().find(|k| k.part == part.index()).copied()
    };
    if let (Some(right), Some(left)) = (
        find(&keypoints, BodyPart::RightShoulder),
        find(&keypoints, BodyPart::LeftShoulder),
    ) {
        keypoints.push(RawKeypoint {
            part: BodyPart::Neck.index(),
            x: (right.x + left.x) / 2.0,
            y: (right.y + left.y) / 2.0,
            score: right.score.min(left.score),
        });
    }

    if keypoints.is_empty() {
        None
    } else {
        Some(RawHuman { keypoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplets(score: f32) -> Vec<[f32; 3]> {
        (0..COCO_KEYPOINTS)
            .map(|i| [i as f32 / 100.0, i as f32 / 50.0, score])
            .collect()
    }

    #[test]
    fn all_parts_plus_neck_when_confident() {
        let human = human_from_coco(&triplets(0.9)).unwrap();
        assert_eq!(human.keypoints.len(), BodyPart::COUNT);

        let neck = human
            .keypoints
            .iter()
            .find(|k| k.part == BodyPart::Neck.index())
            .unwrap();
        // COCO 5 and 6 are the shoulders.
        assert!((neck.y - 0.055).abs() < 1e-6);
        assert!((neck.x - 0.11).abs() < 1e-6);
    }

    #[test]
    fn coco_indices_land_on_wire_parts() {
        let human = human_from_coco(&triplets(0.9)).unwrap();
        let left_eye = human
            .keypoints
            .iter()
            .find(|k| k.part == BodyPart::LeftEye.index())
            .unwrap();
        assert_eq!(left_eye.y, 0.01);
        assert_eq!(left_eye.x, 0.02);
    }

    #[test]
    fn low_confidence_yields_no_human() {
        assert!(human_from_coco(&triplets(0.05)).is_none());
    }

    #[test]
    fn neck_needs_both_shoulders() {
        let mut values = triplets(0.9);
        values[6][2] = 0.0;
        let human = human_from_coco(&values).unwrap();
        assert!(
            human
                .keypoints
                .iter()
                .all(|k| k.part != BodyPart::Neck.index())
        );
    }
}
