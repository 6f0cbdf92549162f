//! Recognition vocabulary shared across the workspace.

use serde::{Deserialize, Serialize};

use crate::student::StudentId;

/// Label reported for a face no enrolled student explains.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Fixed-length face embedding produced by the recognition backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to another descriptor. Lower means more alike.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a captured frame, before matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub descriptor: Descriptor,
    pub bounding_box: BoundingBox,
}

/// Reference descriptors for one enrolled student. A student enrolled
/// from several reference captures carries several descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledDescriptors {
    pub label: StudentId,
    pub descriptors: Vec<Descriptor>,
}

/// Outcome of matching a single detected face against the enrolled set.
///
/// `label` is either a normalized student key or [`UNKNOWN_LABEL`];
/// `is_unknown` tells them apart without a string comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: String,
    pub is_unknown: bool,
    pub bounding_box: BoundingBox,
}

impl MatchResult {
    pub fn known(student: StudentId, bounding_box: BoundingBox) -> Self {
        Self {
            label: student.into(),
            is_unknown: false,
            bounding_box,
        }
    }

    pub fn unknown(bounding_box: BoundingBox) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            is_unknown: true,
            bounding_box,
        }
    }
}
