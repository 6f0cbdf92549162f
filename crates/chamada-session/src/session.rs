//! The roll-call session: one roster, one recognizer, one report buffer.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{info, warn};

use chamada_core::{
    reconcile, render_report, AttendanceStatus, Descriptor, LabeledDescriptors, MatchResult,
    ReconcileOutcome, ReportLabels, Roster, RosterError, Student, StudentId,
    DEFAULT_MATCH_THRESHOLD,
};

use crate::capture::Frame;
use crate::events::{
    EnrollmentCompletedEvent, EventCallback, ReportRefreshedEvent, SessionEvent, StatusCause,
    StatusChangedEvent,
};
use crate::recognizer::{Recognizer, RecognizerError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("recognition requested before models and enrollment are ready")]
    RecognitionUnavailable,
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Report strings and date format.
    pub labels: ReportLabels,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            labels: ReportLabels::default(),
        }
    }
}

/// One enrollment reference: a display name plus a captured reference
/// frame. Several captures may name the same student.
#[derive(Debug, Clone)]
pub struct ReferenceCapture {
    pub name: String,
    pub frame: Frame,
}

/// Why a student could not be enrolled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentFailureReason {
    #[error("no reference capture provided")]
    MissingReference,
    #[error("no face found in any reference capture")]
    NoFaceInReference,
    #[error("recognizer failed: {0}")]
    Backend(String),
}

/// A student excluded from the matchable set. The student stays on the
/// roster and can still be toggled manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentFailure {
    pub student: StudentId,
    pub reason: EnrollmentFailureReason,
}

/// How enrollment went: matchable count plus per-student failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentReport {
    pub enrolled: usize,
    pub failures: Vec<EnrollmentFailure>,
}

impl EnrollmentReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Everything one recognition cycle produced.
#[derive(Debug, Clone)]
pub struct RecognizeOutcome {
    /// Per-face results in detection order, boxes included. Unknown faces
    /// appear here for annotation; they caused no state change.
    pub results: Vec<MatchResult>,
    /// What reconciliation did to the roster.
    pub reconciliation: ReconcileOutcome,
}

/// A roll-call session.
///
/// Owns the roster, the recognizer, the enrolled gallery and the report
/// buffer. All state is in memory; dropping the session discards the
/// roll. Recognition requests are serialized through `&mut self`, so two
/// cycles can never interleave.
pub struct Session<R> {
    recognizer: R,
    roster: Roster,
    options: SessionOptions,
    gallery: Vec<LabeledDescriptors>,
    enrollment: Option<EnrollmentReport>,
    report_buffer: String,
    subscribers: Vec<EventCallback>,
}

impl<R: Recognizer> Session<R> {
    /// Build a session over a roster. The report buffer is rendered
    /// immediately, so the all-absent roll is visible before any
    /// recognition has run.
    pub fn new(recognizer: R, roster: Roster, options: SessionOptions) -> Self {
        let report_buffer = render_report(Local::now().date_naive(), &roster, &options.labels);
        Self {
            recognizer,
            roster,
            options,
            gallery: Vec::new(),
            enrollment: None,
            report_buffer,
            subscribers: Vec::new(),
        }
    }

    /// Subscribe to session events. Callbacks run synchronously at the
    /// mutation site, after the mutation has fully applied.
    pub fn subscribe(&mut self, callback: EventCallback) {
        self.subscribers.push(callback);
    }

    fn emit(&mut self, event: SessionEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    /// True once models are loaded and enrollment has completed.
    pub fn is_ready(&self) -> bool {
        self.enrollment.is_some()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Students with at least one usable descriptor.
    pub fn matchable_count(&self) -> usize {
        self.gallery.len()
    }

    pub fn enrollment(&self) -> Option<&EnrollmentReport> {
        self.enrollment.as_ref()
    }

    /// The copy-area text: always the latest rendered report.
    pub fn report(&self) -> &str {
        &self.report_buffer
    }

    /// Render the roll for a specific date. The buffer always uses the
    /// current local date; this is for archival output and tests.
    pub fn render_report_at(&self, date: NaiveDate) -> String {
        render_report(date, &self.roster, &self.options.labels)
    }

    fn refresh_report(&mut self) {
        let report = render_report(Local::now().date_naive(), &self.roster, &self.options.labels);
        self.report_buffer = report.clone();
        self.emit(SessionEvent::ReportRefreshed(ReportRefreshedEvent { report }));
    }

    async fn load_models(&mut self) -> Result<(), SessionError> {
        self.recognizer.load().await?;
        info!("recognizer loaded");
        self.emit(SessionEvent::ModelsLoaded);
        Ok(())
    }

    fn finish_enrollment(&mut self, gallery: Vec<LabeledDescriptors>, report: EnrollmentReport) {
        if gallery.is_empty() {
            warn!("no student could be enrolled; every face will match as unknown");
        }
        info!(
            enrolled = report.enrolled,
            failed = report.failed(),
            "enrollment complete"
        );
        let event = EnrollmentCompletedEvent {
            enrolled: report.enrolled,
            failed: report.failed(),
        };
        self.gallery = gallery;
        self.enrollment = Some(report);
        self.emit(SessionEvent::EnrollmentCompleted(event));
    }

    /// Load the recognizer, then enroll every roster student from the
    /// given reference captures.
    ///
    /// Load failure is terminal: the session stays not-ready. Per-student
    /// failures are not — the student is excluded from the matchable set,
    /// stays `Absent`, and can still be toggled manually. Reference
    /// captures for names not on the roster are ignored with a warning.
    pub async fn prepare(
        &mut self,
        references: Vec<ReferenceCapture>,
    ) -> Result<EnrollmentReport, SessionError> {
        self.load_models().await?;

        let mut by_student: HashMap<StudentId, Vec<Frame>> = HashMap::new();
        for reference in references {
            match StudentId::normalize(&reference.name) {
                Some(id) => by_student.entry(id).or_default().push(reference.frame),
                None => warn!("reference capture with a blank name; ignored"),
            }
        }

        let students: Vec<Student> = self.roster.students().cloned().collect();
        let mut report = EnrollmentReport::default();
        let mut gallery = Vec::new();

        for student in &students {
            let frames = by_student.remove(&student.id).unwrap_or_default();
            if frames.is_empty() {
                warn!(student = %student.id, "no reference capture; student stays absent unless toggled");
                report.failures.push(EnrollmentFailure {
                    student: student.id.clone(),
                    reason: EnrollmentFailureReason::MissingReference,
                });
                continue;
            }

            let mut descriptors = Vec::new();
            let mut backend_error: Option<String> = None;
            for frame in &frames {
                match self.recognizer.enroll(&student.id, frame).await {
                    Ok(Some(descriptor)) => descriptors.push(descriptor),
                    Ok(None) => {
                        warn!(student = %student.id, "no face found in reference capture");
                    }
                    Err(err) => {
                        warn!(student = %student.id, error = %err, "reference enrollment failed");
                        backend_error = Some(err.to_string());
                    }
                }
            }

            if descriptors.is_empty() {
                let reason = match backend_error {
                    Some(message) => EnrollmentFailureReason::Backend(message),
                    None => EnrollmentFailureReason::NoFaceInReference,
                };
                report.failures.push(EnrollmentFailure {
                    student: student.id.clone(),
                    reason,
                });
                continue;
            }

            gallery.push(LabeledDescriptors {
                label: student.id.clone(),
                descriptors,
            });
        }

        for id in by_student.keys() {
            warn!(label = %id, "reference capture for a name not on the roster; ignored");
        }

        report.enrolled = gallery.len();
        self.finish_enrollment(gallery, report.clone());
        Ok(report)
    }

    /// Load the recognizer, then adopt a pre-extracted gallery instead of
    /// enrolling from reference captures. Backends whose descriptors come
    /// from an out-of-process pipeline use this path.
    ///
    /// Off-roster labels are dropped with a warning; roster students with
    /// no descriptors in the gallery count as enrollment failures.
    pub async fn prepare_from_gallery(
        &mut self,
        gallery: Vec<LabeledDescriptors>,
    ) -> Result<EnrollmentReport, SessionError> {
        self.load_models().await?;

        let mut by_label: HashMap<StudentId, Vec<Descriptor>> = HashMap::new();
        for set in gallery {
            if self.roster.get_status(set.label.as_str()).is_err() {
                warn!(label = %set.label, "gallery label is not on the roster; dropped");
                continue;
            }
            by_label.entry(set.label).or_default().extend(set.descriptors);
        }

        let students: Vec<Student> = self.roster.students().cloned().collect();
        let mut report = EnrollmentReport::default();
        let mut kept = Vec::new();

        for student in &students {
            match by_label.remove(&student.id) {
                Some(descriptors) if !descriptors.is_empty() => {
                    kept.push(LabeledDescriptors {
                        label: student.id.clone(),
                        descriptors,
                    });
                }
                _ => {
                    warn!(student = %student.id, "no descriptors in gallery; student stays absent unless toggled");
                    report.failures.push(EnrollmentFailure {
                        student: student.id.clone(),
                        reason: EnrollmentFailureReason::MissingReference,
                    });
                }
            }
        }

        report.enrolled = kept.len();
        self.finish_enrollment(kept, report.clone());
        Ok(report)
    }

    /// Run one recognition cycle: match the frame's faces, fold the
    /// results into the roster, refresh the report exactly once.
    pub async fn recognize(&mut self, frame: &Frame) -> Result<RecognizeOutcome, SessionError> {
        if !self.is_ready() {
            return Err(SessionError::RecognitionUnavailable);
        }

        let results = self
            .recognizer
            .match_faces(frame, &self.gallery, self.options.match_threshold)
            .await?;

        // Everything from here on is synchronous, so no subscriber can
        // observe a half-reconciled batch.
        let reconciliation = reconcile(&mut self.roster, &results);

        for transition in &reconciliation.transitions {
            self.emit(SessionEvent::StatusChanged(StatusChangedEvent {
                student: transition.student.clone(),
                previous: transition.previous,
                status: AttendanceStatus::Present,
                cause: StatusCause::Recognition,
            }));
        }

        self.refresh_report();

        Ok(RecognizeOutcome {
            results,
            reconciliation,
        })
    }

    /// Manual toggle: advance one student a step through
    /// absent → present → excused → absent. Returns the new status.
    ///
    /// Works whether or not recognition is ready; a manual roll call
    /// needs no models.
    pub fn toggle(&mut self, name: &str) -> Result<AttendanceStatus, SessionError> {
        let student = self.roster.find(name)?.clone();
        let previous = self.roster.get_status(student.id.as_str())?;
        let status = self.roster.cycle_status(student.id.as_str())?;
        info!(student = %student.id, from = ?previous, to = ?status, "manual toggle");

        self.emit(SessionEvent::StatusChanged(StatusChangedEvent {
            student: student.id,
            previous,
            status,
            cause: StatusCause::Manual,
        }));
        self.refresh_report();
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::events::EventCollector;
    use crate::recognizer::ScriptedRecognizer;
    use chamada_core::{BoundingBox, Detection};

    fn test_frame() -> Frame {
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

    fn reference(name: &str) -> ReferenceCapture {
        ReferenceCapture {
            name: name.to_string(),
            frame: test_frame(),
        }
    }

    fn collect_events(session: &mut Session<ScriptedRecognizer>) -> Rc<RefCell<EventCollector>> {
        let collector = Rc::new(RefCell::new(EventCollector::new()));
        let sink = Rc::clone(&collector);
        session.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));
        collector
    }

    #[tokio::test]
    async fn test_recognized_student_appears_present_in_report() {
        let mut recognizer =
            ScriptedRecognizer::new().with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]));
        recognizer.push_frame(vec![detection(vec![1.0, 0.05])]);
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(recognizer, roster, SessionOptions::default());

        session.prepare(vec![reference("Ana Silva")]).await.unwrap();
        let outcome = session.recognize(&test_frame()).await.unwrap();

        assert_eq!(outcome.reconciliation.transitions.len(), 1);
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            session.render_report_at(date),
            "Date: 03/01/2024\nAna Silva - Present\n"
        );
        assert!(session.report().contains("Ana Silva - Present"));
    }

    #[tokio::test]
    async fn test_report_buffer_exists_before_any_recognition() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        assert!(session.report().starts_with("Date: "));
        assert!(session.report().contains("Ana Silva - Absent"));
    }

    #[tokio::test]
    async fn test_recognize_before_prepare_is_unavailable() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        let err = session.recognize(&test_frame()).await.unwrap_err();
        assert!(matches!(err, SessionError::RecognitionUnavailable));
    }

    #[tokio::test]
    async fn test_load_failure_is_terminal() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(
            ScriptedRecognizer::failing_load("model file missing"),
            roster,
            SessionOptions::default(),
        );

        let err = session.prepare(vec![reference("Ana Silva")]).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Recognizer(RecognizerError::ModelLoad(_))
        ));
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn test_enrollment_failure_excludes_student_only() {
        let recognizer =
            ScriptedRecognizer::new().with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]));
        let roster = Roster::new(["Ana Silva", "Bruno Reis"]).unwrap();
        let mut session = Session::new(recognizer, roster, SessionOptions::default());

        let report = session.prepare(vec![reference("Ana Silva")]).await.unwrap();

        assert_eq!(report.enrolled, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].student.as_str(), "BRUNO REIS");
        assert_eq!(
            report.failures[0].reason,
            EnrollmentFailureReason::MissingReference
        );
        assert_eq!(session.matchable_count(), 1);
        assert!(session.is_ready());
        // The failed student still has a roster line.
        assert!(session.report().contains("Bruno Reis - Absent"));
    }

    #[tokio::test]
    async fn test_reference_without_face_fails_enrollment() {
        // No canned descriptor for Ana: enroll yields no face.
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());

        let report = session.prepare(vec![reference("Ana Silva")]).await.unwrap();
        assert_eq!(report.enrolled, 0);
        assert_eq!(
            report.failures[0].reason,
            EnrollmentFailureReason::NoFaceInReference
        );
        // Still ready: recognition runs, everything matches as unknown.
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_exactly_one_report_refresh_per_batch() {
        let mut recognizer = ScriptedRecognizer::new()
            .with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]))
            .with_reference("Bruno Reis", Descriptor::new(vec![0.0, 1.0]));
        recognizer.push_frame(vec![
            detection(vec![1.0, 0.05]),
            detection(vec![0.05, 1.0]),
            detection(vec![8.0, 8.0]),
        ]);
        recognizer.push_frame(vec![]);
        let roster = Roster::new(["Ana Silva", "Bruno Reis"]).unwrap();
        let mut session = Session::new(recognizer, roster, SessionOptions::default());

        session
            .prepare(vec![reference("Ana Silva"), reference("Bruno Reis")])
            .await
            .unwrap();
        let collector = collect_events(&mut session);

        // Two students and one stranger in one frame: one refresh.
        session.recognize(&test_frame()).await.unwrap();
        assert_eq!(collector.borrow().report_refreshes().len(), 1);
        assert_eq!(collector.borrow().status_changes().len(), 2);

        // Empty frame: nothing changes, the refresh still happens.
        session.recognize(&test_frame()).await.unwrap();
        assert_eq!(collector.borrow().report_refreshes().len(), 2);
        assert_eq!(collector.borrow().status_changes().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_matches_emit_one_status_change() {
        let mut recognizer =
            ScriptedRecognizer::new().with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]));
        recognizer.push_frame(vec![
            detection(vec![1.0, 0.05]),
            detection(vec![1.0, -0.05]),
        ]);
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(recognizer, roster, SessionOptions::default());
        session.prepare(vec![reference("Ana Silva")]).await.unwrap();
        let collector = collect_events(&mut session);

        let outcome = session.recognize(&test_frame()).await.unwrap();

        assert_eq!(outcome.reconciliation.transitions.len(), 1);
        assert_eq!(outcome.reconciliation.already_present, 1);
        let events = collector.borrow();
        let changes = events.status_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].cause, StatusCause::Recognition);
        assert_eq!(changes[0].previous, AttendanceStatus::Absent);
        assert_eq!(changes[0].status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_unknown_faces_leave_roster_untouched() {
        let mut recognizer =
            ScriptedRecognizer::new().with_reference("Ana Silva", Descriptor::new(vec![1.0, 0.0]));
        recognizer.push_frame(vec![detection(vec![9.0, 9.0])]);
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(recognizer, roster, SessionOptions::default());
        session.prepare(vec![reference("Ana Silva")]).await.unwrap();
        let collector = collect_events(&mut session);

        let outcome = session.recognize(&test_frame()).await.unwrap();

        assert_eq!(outcome.reconciliation.unknown_faces, 1);
        assert!(collector.borrow().status_changes().is_empty());
        assert_eq!(collector.borrow().report_refreshes().len(), 1);
        assert_eq!(
            session.roster().get_status("Ana Silva").unwrap(),
            AttendanceStatus::Absent
        );
    }

    #[tokio::test]
    async fn test_toggle_cycles_and_notifies() {
        let roster = Roster::new(["Ana Silva", "Bruno Reis"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        let collector = collect_events(&mut session);

        assert_eq!(session.toggle("ana silva").unwrap(), AttendanceStatus::Present);
        assert_eq!(session.toggle("Ana Silva").unwrap(), AttendanceStatus::Excused);
        assert_eq!(session.toggle("ANA SILVA").unwrap(), AttendanceStatus::Absent);

        let events = collector.borrow();
        let changes = events.status_changes();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.cause == StatusCause::Manual));
        assert_eq!(events.report_refreshes().len(), 3);
        // The other student never moved.
        assert_eq!(
            session.roster().get_status("Bruno Reis").unwrap(),
            AttendanceStatus::Absent
        );
    }

    #[tokio::test]
    async fn test_toggle_unknown_student_errors() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        let err = session.toggle("Dora Lima").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Roster(RosterError::UnknownStudent { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_from_gallery_filters_and_reports() {
        let roster = Roster::new(["Ana Silva", "Bruno Reis"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        let collector = collect_events(&mut session);

        let gallery = vec![
            LabeledDescriptors {
                label: StudentId::normalize("ana silva").unwrap(),
                descriptors: vec![Descriptor::new(vec![1.0, 0.0])],
            },
            LabeledDescriptors {
                label: StudentId::normalize("Dora Lima").unwrap(),
                descriptors: vec![Descriptor::new(vec![0.0, 1.0])],
            },
        ];
        let report = session.prepare_from_gallery(gallery).await.unwrap();

        assert_eq!(report.enrolled, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].student.as_str(), "BRUNO REIS");
        assert_eq!(session.matchable_count(), 1);

        let events = collector.borrow();
        assert_eq!(events.events()[0], SessionEvent::ModelsLoaded);
        assert_eq!(
            events.events()[1],
            SessionEvent::EnrollmentCompleted(EnrollmentCompletedEvent {
                enrolled: 1,
                failed: 1
            })
        );
    }

    #[tokio::test]
    async fn test_gallery_descriptors_merge_per_student() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut recognizer = ScriptedRecognizer::new();
        // Probe sits close to the second reference only.
        recognizer.push_frame(vec![detection(vec![0.0, 1.0])]);
        let mut session = Session::new(recognizer, roster, SessionOptions::default());

        let gallery = vec![
            LabeledDescriptors {
                label: StudentId::normalize("Ana Silva").unwrap(),
                descriptors: vec![Descriptor::new(vec![0.0, 0.6])],
            },
            LabeledDescriptors {
                label: StudentId::normalize("ANA SILVA").unwrap(),
                descriptors: vec![Descriptor::new(vec![0.0, 1.0])],
            },
        ];
        let report = session.prepare_from_gallery(gallery).await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(session.matchable_count(), 1);

        let outcome = session.recognize(&test_frame()).await.unwrap();
        assert_eq!(outcome.results[0].label, "ANA SILVA");
    }

    #[tokio::test]
    async fn test_toggle_works_without_prepare() {
        let roster = Roster::new(["Ana Silva"]).unwrap();
        let mut session = Session::new(ScriptedRecognizer::new(), roster, SessionOptions::default());
        assert!(!session.is_ready());
        assert_eq!(session.toggle("Ana Silva").unwrap(), AttendanceStatus::Present);
        assert!(session.report().contains("Ana Silva - Present"));
    }
}
