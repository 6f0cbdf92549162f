//! chamada-session — roll-call orchestration over a pluggable recognizer.
//!
//! [`Session`] owns the roster, the enrolled gallery and the report
//! buffer, and talks to the face engine through the [`Recognizer`] seam.
//! The live capture loop in [`capture`] paces it from a [`FrameSource`];
//! rendering surfaces subscribe to [`events`] instead of reaching into
//! session state.

pub mod capture;
pub mod events;
pub mod recognizer;
pub mod session;

pub use capture::{run_live, CaptureError, Frame, FrameSource, LiveStats, ReplaySource};
pub use events::{
    EnrollmentCompletedEvent, EventCallback, EventCollector, ReportRefreshedEvent, SessionEvent,
    StatusCause, StatusChangedEvent,
};
pub use recognizer::{Recognizer, RecognizerError, ScriptedRecognizer};
pub use session::{
    EnrollmentFailure, EnrollmentFailureReason, EnrollmentReport, RecognizeOutcome,
    ReferenceCapture, Session, SessionError, SessionOptions,
};
