//! The recognition seam: everything the roll-call session needs from a
//! face engine, and a scripted implementation for tests and demos.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use chamada_core::{
    Descriptor, Detection, LabeledDescriptors, MatchResult, NearestMatcher, StudentId,
};

use crate::capture::Frame;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("recognition backend error: {0}")]
    Backend(String),
    #[error("not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Interface to the face engine behind the session.
///
/// `load` must succeed before `enroll` or `match_faces` is called; the
/// session enforces that ordering. Implementations may wrap an ONNX
/// pipeline, an out-of-process extractor, or canned fixtures — the
/// session does not care which.
///
/// No `Send` bound on the futures: the session runs everything on one
/// cooperative thread.
#[allow(async_fn_in_trait)]
pub trait Recognizer {
    /// Load models or archives. Failure here is terminal for the session.
    async fn load(&mut self) -> Result<(), RecognizerError>;

    /// Extract a descriptor from one enrollment reference capture.
    ///
    /// `Ok(None)` means no face was found in the reference; the caller
    /// decides whether that fails the student's enrollment.
    async fn enroll(
        &mut self,
        student: &StudentId,
        reference: &Frame,
    ) -> Result<Option<Descriptor>, RecognizerError>;

    /// Detect faces in a captured frame and match them against the
    /// enrolled gallery. Zero results is a normal outcome, not an error.
    async fn match_faces(
        &mut self,
        frame: &Frame,
        gallery: &[LabeledDescriptors],
        distance_threshold: f32,
    ) -> Result<Vec<MatchResult>, RecognizerError>;
}

/// Deterministic recognizer for tests and demos.
///
/// Enrollment descriptors come from a canned reference table, and each
/// `match_faces` call pops the next scripted detection list and matches
/// it with [`NearestMatcher`], the same way a live backend would.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    references: HashMap<StudentId, Descriptor>,
    frames: VecDeque<Vec<Detection>>,
    fail_load: Option<String>,
    loaded: bool,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructor for a recognizer whose `load` fails.
    pub fn failing_load(message: &str) -> Self {
        Self {
            fail_load: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Canned reference descriptor for a student; `enroll` returns it for
    /// any reference frame. Blank names are ignored.
    pub fn with_reference(mut self, name: &str, descriptor: Descriptor) -> Self {
        if let Some(id) = StudentId::normalize(name) {
            self.references.insert(id, descriptor);
        }
        self
    }

    /// Queue the detections one future `match_faces` call will see.
    /// Calls beyond the queue see an empty frame.
    pub fn push_frame(&mut self, detections: Vec<Detection>) {
        self.frames.push_back(detections);
    }
}

impl Recognizer for ScriptedRecognizer {
    async fn load(&mut self) -> Result<(), RecognizerError> {
        if let Some(message) = &self.fail_load {
            return Err(RecognizerError::ModelLoad(message.clone()));
        }
        self.loaded = true;
        Ok(())
    }

    async fn enroll(
        &mut self,
        student: &StudentId,
        _reference: &Frame,
    ) -> Result<Option<Descriptor>, RecognizerError> {
        if !self.loaded {
            return Err(RecognizerError::Backend("enroll before load".to_string()));
        }
        Ok(self.references.get(student).cloned())
    }

    async fn match_faces(
        &mut self,
        _frame: &Frame,
        gallery: &[LabeledDescriptors],
        distance_threshold: f32,
    ) -> Result<Vec<MatchResult>, RecognizerError> {
        if !self.loaded {
            return Err(RecognizerError::Backend("match before load".to_string()));
        }
        let detections = self.frames.pop_front().unwrap_or_default();
        Ok(NearestMatcher::new(distance_threshold).match_detections(&detections, gallery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamada_core::BoundingBox;

    fn frame() -> Frame {
        Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            origin: None,
        }
    }

    fn detection(values: Vec<f32>) -> Detection {
        Detection {
            descriptor: Descriptor::new(values),
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 16.0,
                height: 16.0,
                confidence: 0.9,
            },
        }
    }

    #[tokio::test]
    async fn test_scripted_enroll_returns_canned_descriptor() {
        let mut recognizer =
            ScriptedRecognizer::new().with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]));
        recognizer.load().await.unwrap();

        let ana = StudentId::normalize("Ana Silva").unwrap();
        let descriptor = recognizer.enroll(&ana, &frame()).await.unwrap();
        assert_eq!(descriptor, Some(Descriptor::new(vec![1.0, 0.0])));

        let bruno = StudentId::normalize("Bruno Reis").unwrap();
        assert_eq!(recognizer.enroll(&bruno, &frame()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scripted_match_pops_queued_frames() {
        let mut recognizer = ScriptedRecognizer::new();
        recognizer.push_frame(vec![detection(vec![1.0, 0.0])]);
        recognizer.load().await.unwrap();

        let gallery = vec![LabeledDescriptors {
            label: StudentId::normalize("Ana Silva").unwrap(),
            descriptors: vec![Descriptor::new(vec![1.0, 0.0])],
        }];

        let first = recognizer.match_faces(&frame(), &gallery, 0.6).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, "ANA SILVA");

        // Queue exhausted: empty frame.
        let second = recognizer.match_faces(&frame(), &gallery, 0.6).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_failing_load() {
        let mut recognizer = ScriptedRecognizer::failing_load("model file missing");
        let err = recognizer.load().await.unwrap_err();
        assert!(matches!(err, RecognizerError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_use_before_load_is_an_error() {
        let mut recognizer = ScriptedRecognizer::new();
        let ana = StudentId::normalize("Ana Silva").unwrap();
        assert!(recognizer.enroll(&ana, &frame()).await.is_err());
        assert!(recognizer.match_faces(&frame(), &[], 0.6).await.is_err());
    }
}
