//! Best-match search over the enrolled descriptor gallery.

use crate::student::StudentId;
use crate::types::{Descriptor, Detection, LabeledDescriptors, MatchResult};

/// Default Euclidean distance threshold for a positive match. Faces whose
/// best mean distance lands above this are reported unknown.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Best candidate for one probe descriptor: the winning label when it
/// landed within threshold, and the mean distance that won.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub label: Option<StudentId>,
    pub distance: f32,
}

/// Nearest-set matcher over mean Euclidean distance.
///
/// A set's score is the mean distance from the probe to all of its
/// descriptors, so a student enrolled from several reference captures is
/// not undone by one outlier capture. Every enrolled set is scored on
/// every probe; there is no early exit.
#[derive(Debug, Clone, Copy)]
pub struct NearestMatcher {
    pub distance_threshold: f32,
}

impl Default for NearestMatcher {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl NearestMatcher {
    pub fn new(distance_threshold: f32) -> Self {
        Self { distance_threshold }
    }

    /// Score the probe against every enrolled set and return the best.
    ///
    /// An empty gallery, or one with only empty descriptor sets, yields
    /// `label: None` with an infinite distance.
    pub fn find_best_match(
        &self,
        probe: &Descriptor,
        gallery: &[LabeledDescriptors],
    ) -> FaceMatch {
        let mut best_distance = f32::INFINITY;
        let mut best: Option<&StudentId> = None;

        for set in gallery {
            if set.descriptors.is_empty() {
                continue;
            }
            let total: f32 = set
                .descriptors
                .iter()
                .map(|reference| probe.euclidean_distance(reference))
                .sum();
            let mean = total / set.descriptors.len() as f32;
            if mean < best_distance {
                best_distance = mean;
                best = Some(&set.label);
            }
        }

        match best {
            Some(label) if best_distance <= self.distance_threshold => FaceMatch {
                label: Some(label.clone()),
                distance: best_distance,
            },
            _ => FaceMatch {
                label: None,
                distance: best_distance,
            },
        }
    }

    /// Turn raw detections into per-face match results against the
    /// gallery, in detection order.
    pub fn match_detections(
        &self,
        detections: &[Detection],
        gallery: &[LabeledDescriptors],
    ) -> Vec<MatchResult> {
        detections
            .iter()
            .map(|detection| {
                let best = self.find_best_match(&detection.descriptor, gallery);
                match best.label {
                    Some(student) => MatchResult::known(student, detection.bounding_box.clone()),
                    None => MatchResult::unknown(detection.bounding_box.clone()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn set(label: &str, descriptors: Vec<Vec<f32>>) -> LabeledDescriptors {
        LabeledDescriptors {
            label: StudentId::normalize(label).unwrap(),
            descriptors: descriptors.into_iter().map(Descriptor::new).collect(),
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            x: 1.0,
            y: 2.0,
            width: 32.0,
            height: 32.0,
            confidence: 0.95,
        }
    }

    #[test]
    fn test_nearest_set_wins_within_threshold() {
        let gallery = vec![
            set("Ana Silva", vec![vec![1.0, 0.0]]),
            set("Bruno Reis", vec![vec![0.0, 1.0]]),
        ];
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![0.9, 0.0]), &gallery);
        assert_eq!(best.label.unwrap().as_str(), "ANA SILVA");
        assert!(best.distance < 0.2);
    }

    #[test]
    fn test_distance_above_threshold_is_unknown() {
        let gallery = vec![set("Ana Silva", vec![vec![1.0, 0.0]])];
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![-1.0, 0.0]), &gallery);
        assert!(best.label.is_none());
        assert!((best.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![1.0]), &[]);
        assert!(best.label.is_none());
        assert_eq!(best.distance, f32::INFINITY);
    }

    #[test]
    fn test_empty_descriptor_sets_are_skipped() {
        let gallery = vec![set("Ana Silva", vec![]), set("Bruno Reis", vec![vec![0.0, 0.0]])];
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![0.1, 0.0]), &gallery);
        assert_eq!(best.label.unwrap().as_str(), "BRUNO REIS");
    }

    #[test]
    fn test_every_set_is_scored() {
        // The best candidate sits last; an early exit would miss it.
        let gallery = vec![
            set("Ana Silva", vec![vec![0.5, 0.0]]),
            set("Bruno Reis", vec![vec![0.3, 0.0]]),
            set("Carla Souza", vec![vec![0.05, 0.0]]),
        ];
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![0.0, 0.0]), &gallery);
        assert_eq!(best.label.unwrap().as_str(), "CARLA SOUZA");
    }

    #[test]
    fn test_mean_distance_over_multiple_references() {
        // Mean of 0.2 and 0.4 is 0.3, beating the single 0.35 reference.
        let gallery = vec![
            set("Ana Silva", vec![vec![0.2, 0.0], vec![-0.4, 0.0]]),
            set("Bruno Reis", vec![vec![0.35, 0.0]]),
        ];
        let matcher = NearestMatcher::default();
        let best = matcher.find_best_match(&Descriptor::new(vec![0.0, 0.0]), &gallery);
        assert_eq!(best.label.unwrap().as_str(), "ANA SILVA");
        assert!((best.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_match_detections_maps_each_face() {
        let gallery = vec![set("Ana Silva", vec![vec![1.0, 0.0]])];
        let detections = vec![
            Detection {
                descriptor: Descriptor::new(vec![1.0, 0.05]),
                bounding_box: bbox(),
            },
            Detection {
                descriptor: Descriptor::new(vec![-5.0, 0.0]),
                bounding_box: bbox(),
            },
        ];
        let results = NearestMatcher::default().match_detections(&detections, &gallery);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "ANA SILVA");
        assert!(!results[0].is_unknown);
        assert!(results[1].is_unknown);
    }

    #[test]
    fn test_custom_threshold_is_honored() {
        let gallery = vec![set("Ana Silva", vec![vec![1.0, 0.0]])];
        let probe = Descriptor::new(vec![0.5, 0.0]);
        assert!(NearestMatcher::new(0.6).find_best_match(&probe, &gallery).label.is_some());
        assert!(NearestMatcher::new(0.4).find_best_match(&probe, &gallery).label.is_none());
    }
}
