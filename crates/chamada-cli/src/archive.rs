//! Descriptor-archive recognition backend.
//!
//! Detection and descriptor extraction run out of process — any pipeline
//! able to emit JSON works — and this backend replays its output. Two
//! artifacts are involved:
//!
//! * a gallery file with the enrolled reference descriptors:
//!   `[{"label": "Ana Silva", "descriptors": [[...], ...]}, ...]`
//! * a per-capture sidecar `<image>.faces.json` holding the faces found
//!   in that capture:
//!   `{"faces": [{"box": {...}, "descriptor": [...]}, ...]}`

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tracing::{debug, warn};

use chamada_core::{
    BoundingBox, Descriptor, Detection, LabeledDescriptors, MatchResult, NearestMatcher, StudentId,
};
use chamada_session::capture::Frame;
use chamada_session::recognizer::{Recognizer, RecognizerError};

/// One gallery-file entry, label not yet normalized.
#[derive(Debug, Deserialize)]
struct GalleryEntry {
    label: String,
    descriptors: Vec<Vec<f32>>,
}

/// Read and normalize a gallery file.
pub fn load_gallery(path: &Path) -> anyhow::Result<Vec<LabeledDescriptors>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gallery {}", path.display()))?;
    parse_gallery(&raw).with_context(|| format!("failed to parse gallery {}", path.display()))
}

/// Parse gallery JSON. Entries whose label is blank after normalization
/// are dropped with a warning rather than failing the whole file.
pub fn parse_gallery(raw: &str) -> anyhow::Result<Vec<LabeledDescriptors>> {
    let entries: Vec<GalleryEntry> = serde_json::from_str(raw)?;
    let mut gallery = Vec::new();
    for entry in entries {
        let Some(label) = StudentId::normalize(&entry.label) else {
            warn!("gallery entry with a blank label; dropped");
            continue;
        };
        gallery.push(LabeledDescriptors {
            label,
            descriptors: entry.descriptors.into_iter().map(Descriptor::new).collect(),
        });
    }
    Ok(gallery)
}

/// Per-capture sidecar: the extraction pipeline's output for one image.
#[derive(Debug, Deserialize)]
struct FaceSidecar {
    faces: Vec<SidecarFace>,
}

#[derive(Debug, Deserialize)]
struct SidecarFace {
    #[serde(rename = "box")]
    bounding_box: BoundingBox,
    descriptor: Vec<f32>,
}

fn parse_sidecar(raw: &str, path: &Path) -> Result<Vec<Detection>, RecognizerError> {
    let sidecar: FaceSidecar = serde_json::from_str(raw)
        .map_err(|err| RecognizerError::Backend(format!("bad face sidecar {}: {err}", path.display())))?;
    Ok(sidecar
        .faces
        .into_iter()
        .map(|face| Detection {
            descriptor: Descriptor::new(face.descriptor),
            bounding_box: face.bounding_box,
        })
        .collect())
}

/// Recognizer that replays descriptor archives.
///
/// `enroll` is unsupported: enrolled descriptors come from the gallery
/// file through `Session::prepare_from_gallery`. A capture without a
/// sidecar is an error — silently treating it as face-free would hide a
/// broken extraction run.
#[derive(Debug, Default)]
pub struct ArchiveRecognizer {
    loaded: bool,
}

impl ArchiveRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn sidecar_path(origin: &str) -> PathBuf {
        PathBuf::from(format!("{origin}.faces.json"))
    }
}

impl Recognizer for ArchiveRecognizer {
    async fn load(&mut self) -> Result<(), RecognizerError> {
        self.loaded = true;
        Ok(())
    }

    async fn enroll(
        &mut self,
        _student: &StudentId,
        _reference: &Frame,
    ) -> Result<Option<Descriptor>, RecognizerError> {
        Err(RecognizerError::Unsupported(
            "archive descriptors are precomputed; load a gallery file instead",
        ))
    }

    async fn match_faces(
        &mut self,
        frame: &Frame,
        gallery: &[LabeledDescriptors],
        distance_threshold: f32,
    ) -> Result<Vec<MatchResult>, RecognizerError> {
        if !self.loaded {
            return Err(RecognizerError::Backend("match before load".to_string()));
        }
        let Some(origin) = frame.origin.as_deref() else {
            return Err(RecognizerError::Backend(
                "frame has no origin; cannot locate its face sidecar".to_string(),
            ));
        };

        let path = Self::sidecar_path(origin);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
            RecognizerError::Backend(format!("no face sidecar at {}: {err}", path.display()))
        })?;
        let detections = parse_sidecar(&raw, &path)?;

        debug!(capture = origin, faces = detections.len(), "sidecar loaded");
        Ok(NearestMatcher::new(distance_threshold).match_detections(&detections, gallery))
    }
}
