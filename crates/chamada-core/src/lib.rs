//! chamada-core — roll-call domain logic.
//!
//! Everything in this crate is synchronous, deterministic state and
//! arithmetic: the attendance roster, descriptor matching, the fold that
//! reconciles match results into the roster, and report rendering. Face
//! detection and descriptor extraction live behind the session crate's
//! recognizer seam; this crate never touches a camera, a file or a model.

pub mod matcher;
pub mod reconcile;
pub mod report;
pub mod roster;
pub mod student;
pub mod types;

pub use matcher::{FaceMatch, NearestMatcher, DEFAULT_MATCH_THRESHOLD};
pub use reconcile::{reconcile, ReconcileOutcome, StatusTransition};
pub use report::{render_report, ReportLabels};
pub use roster::{AttendanceStatus, Roster, RosterError};
pub use student::{Student, StudentId};
pub use types::{
    BoundingBox, Descriptor, Detection, LabeledDescriptors, MatchResult, UNKNOWN_LABEL,
};
