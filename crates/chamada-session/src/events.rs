//! Session change notifications.
//!
//! The session never renders anything itself; surfaces that care (status
//! line, report view, tests) subscribe and react. Callbacks run
//! synchronously at the mutation site on the session's single cooperative
//! thread, after the mutation has fully applied, so a subscriber always
//! observes a completely reconciled batch.

use chamada_core::{AttendanceStatus, StudentId};

/// Why a student's status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCause {
    /// A recognition match marked the student present.
    Recognition,
    /// The manual toggle cycle.
    Manual,
}

/// Enrollment finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentCompletedEvent {
    /// Students with at least one usable descriptor.
    pub enrolled: usize,
    /// Students excluded from the matchable set.
    pub failed: usize,
}

/// A student's status changed. Emitted once per actual change; a match
/// for an already-present student emits nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChangedEvent {
    pub student: StudentId,
    pub previous: AttendanceStatus,
    pub status: AttendanceStatus,
    pub cause: StatusCause,
}

/// The report buffer was regenerated. Emitted exactly once per
/// reconciliation batch or manual toggle, even when nothing changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRefreshedEvent {
    pub report: String,
}

/// Events emitted by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The recognizer finished loading.
    ModelsLoaded,
    EnrollmentCompleted(EnrollmentCompletedEvent),
    StatusChanged(StatusChangedEvent),
    ReportRefreshed(ReportRefreshedEvent),
}

/// Subscriber callback. No `Send` bound: the session runs on a single
/// cooperative thread and callbacks fire on it.
pub type EventCallback = Box<dyn FnMut(&SessionEvent)>;

/// Collects events for assertions in tests.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<SessionEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// All status changes, in emission order.
    pub fn status_changes(&self) -> Vec<&StatusChangedEvent> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::StatusChanged(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    /// All report refreshes, in emission order.
    pub fn report_refreshes(&self) -> Vec<&ReportRefreshedEvent> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::ReportRefreshed(refresh) => Some(refresh),
                _ => None,
            })
            .collect()
    }
}
