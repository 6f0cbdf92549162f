//! Fold one frame's match results into the roster.

use tracing::warn;

use crate::roster::{AttendanceStatus, Roster};
use crate::student::StudentId;
use crate::types::MatchResult;

/// One student newly marked present by reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub student: StudentId,
    pub previous: AttendanceStatus,
}

/// What one reconciliation batch did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Students whose status actually changed to `Present`.
    pub transitions: Vec<StatusTransition>,
    /// Recognized students that were already `Present`.
    pub already_present: usize,
    /// Faces the matcher could not attribute to any enrolled student.
    pub unknown_faces: usize,
    /// Labels that are neither the unknown sentinel nor on the roster.
    pub off_roster_labels: usize,
}

impl ReconcileOutcome {
    /// True when the batch changed at least one status.
    pub fn changed(&self) -> bool {
        !self.transitions.is_empty()
    }
}

/// Apply one batch of match results to the roster.
///
/// Every non-unknown result marks its student `Present`. The operation is
/// idempotent, so duplicate results for one student and the order of
/// results within a batch make no difference to the final state. Unknown
/// faces never touch the roster. A label that is not on the roster is
/// logged and skipped; the rest of the batch still applies.
///
/// Runs synchronously to completion, so no other task can observe a
/// half-applied batch.
pub fn reconcile(roster: &mut Roster, results: &[MatchResult]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for result in results {
        if result.is_unknown {
            outcome.unknown_faces += 1;
            continue;
        }

        let Some(student) = StudentId::normalize(&result.label) else {
            warn!("match result carries a blank label; skipping");
            outcome.off_roster_labels += 1;
            continue;
        };

        match roster.set_status(student.as_str(), AttendanceStatus::Present) {
            Ok(Some(previous)) => {
                outcome.transitions.push(StatusTransition { student, previous });
            }
            Ok(None) => outcome.already_present += 1,
            Err(err) => {
                warn!(label = %student, error = %err, "recognized label is not on the roster; skipping");
                outcome.off_roster_labels += 1;
            }
        }
    }

    outcome
}
