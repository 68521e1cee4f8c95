use serde::{Deserialize, Serialize};

use crate::{error::ModelError, ids::BlobKey};

/// The 18 canonical COCO body parts, in the index order pose networks emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BodyPart {
    Nose = 0,
    Neck = 1,
    RightShoulder = 2,
    RightElbow = 3,
    RightWrist = 4,
    LeftShoulder = 5,
    LeftElbow = 6,
    LeftWrist = 7,
    RightHip = 8,
    RightKnee = 9,
    RightAnkle = 10,
    LeftHip = 11,
    LeftKnee = 12,
    LeftAnkle = 13,
    RightEye = 14,
    LeftEye = 15,
    RightEar = 16,
    LeftEar = 17,
}

impl BodyPart {
    pub const COUNT: usize = 18;

    pub const ALL: [BodyPart; Self::COUNT] = [
        BodyPart::Nose,
        BodyPart::Neck,
        BodyPart::RightShoulder,
        BodyPart::RightElbow,
        BodyPart::RightWrist,
        BodyPart::LeftShoulder,
        BodyPart::LeftElbow,
        BodyPart::LeftWrist,
        BodyPart::RightHip,
        BodyPart::RightKnee,
        BodyPart::RightAnkle,
        BodyPart::LeftHip,
        BodyPart::LeftKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightEye,
        BodyPart::LeftEye,
        BodyPart::RightEar,
        BodyPart::LeftEar,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for BodyPart {
    type Error = ModelError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(ModelError::UnknownBodyPart(index))
    }
}

/// One detected body part. `x` and `y` are normalized to the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub index: u8,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Keypoint {
    pub fn new(part: BodyPart, x: f32, y: f32, score: f32) -> Self {
        Self {
            index: part as u8,
            x,
            y,
            score,
        }
    }

    pub fn part(&self) -> Option<BodyPart> {
        BodyPart::from_index(self.index as usize)
    }

    /// Rounds coordinates and score to three decimals for the wire.
    pub fn rounded(self) -> Self {
        Self {
            index: self.index,
            x: round3(self.x),
            y: round3(self.y),
            score: round3(self.score),
        }
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// A single person: keypoints ordered by body-part index, one per part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Human {
    pub keypoints: Vec<Keypoint>,
}

impl Human {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn part_count(&self) -> usize {
        self.keypoints.len()
    }

    pub fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints
            .iter()
            .find(|keypoint| keypoint.index == part as u8)
    }

    /// Flat `[x, y, score]` triplets for all 18 parts, `-1` where a part was
    /// not detected.
    pub fn packed_row(&self) -> [f32; BodyPart::COUNT * 3] {
        let mut row = [-1.0; BodyPart::COUNT * 3];
        for keypoint in &self.keypoints {
            let base = keypoint.index as usize * 3;
            if base + 2 < row.len() {
                let rounded = keypoint.rounded();
                row[base] = rounded.x;
                row[base + 1] = rounded.y;
                row[base + 2] = rounded.score;
            }
        }
        row
    }
}

/// Message emitted on the result channel for every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    pub humans: Vec<Human>,
    pub image: BlobKey,
}
