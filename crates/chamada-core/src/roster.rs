//! Attendance roster — the authoritative per-student status store.
//!
//! Built once from the configured name list. Every configured student has
//! exactly one status at all times; there is no "unset" state. Only two
//! actors mutate it: reconciliation marks matched students present, and
//! the manual toggle steps a student through the cycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::student::{Student, StudentId};

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("duplicate student after normalization: {name}")]
    DuplicateStudent { name: String },
    #[error("unknown student: {name}")]
    UnknownStudent { name: String },
    #[error("student name is empty after trimming")]
    EmptyName,
}

/// Three-state attendance status. `Absent` is the seed value for every
/// student when the roster is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[default]
    Absent,
    Present,
    Excused,
}

impl AttendanceStatus {
    /// One step of the manual toggle cycle:
    /// absent → present → excused → absent.
    pub fn cycle(self) -> Self {
        match self {
            AttendanceStatus::Absent => AttendanceStatus::Present,
            AttendanceStatus::Present => AttendanceStatus::Excused,
            AttendanceStatus::Excused => AttendanceStatus::Absent,
        }
    }
}

/// Ordered roster with a total student → status mapping.
///
/// Iteration order is always the configured order, so reports come out
/// the same way the roll was written down.
#[derive(Debug, Clone)]
pub struct Roster {
    students: Vec<Student>,
    status: HashMap<StudentId, AttendanceStatus>,
}

impl Roster {
    /// Build a roster from configured display names, seeding every student
    /// `Absent`.
    ///
    /// Names that collide after normalization are rejected rather than
    /// silently merged, since two students would otherwise share one
    /// attendance slot.
    pub fn new<I, S>(names: I) -> Result<Self, RosterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut students = Vec::new();
        let mut status = HashMap::new();

        for name in names {
            let display_name: String = name.into();
            let id = StudentId::normalize(&display_name).ok_or(RosterError::EmptyName)?;
            if status.insert(id.clone(), AttendanceStatus::Absent).is_some() {
                return Err(RosterError::DuplicateStudent { name: display_name });
            }
            students.push(Student { id, display_name });
        }

        Ok(Self { students, status })
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Configured students, in configured order.
    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.iter()
    }

    /// `(student, status)` pairs, in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&Student, AttendanceStatus)> {
        self.students.iter().map(|s| (s, self.status[&s.id]))
    }

    fn normalized(&self, name: &str) -> Result<StudentId, RosterError> {
        StudentId::normalize(name).ok_or_else(|| RosterError::UnknownStudent {
            name: name.to_string(),
        })
    }

    /// Look up a configured student by any spelling of their name.
    pub fn find(&self, name: &str) -> Result<&Student, RosterError> {
        let id = self.normalized(name)?;
        self.students
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| RosterError::UnknownStudent {
                name: name.to_string(),
            })
    }

    pub fn get_status(&self, name: &str) -> Result<AttendanceStatus, RosterError> {
        let id = self.normalized(name)?;
        self.status
            .get(&id)
            .copied()
            .ok_or_else(|| RosterError::UnknownStudent {
                name: name.to_string(),
            })
    }

    /// Set a student's status.
    ///
    /// Idempotent: `Ok(None)` means the student already had `status` and
    /// nothing changed; `Ok(Some(previous))` reports an actual change.
    /// Callers decide whether "no change" is worth an event.
    pub fn set_status(
        &mut self,
        name: &str,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceStatus>, RosterError> {
        let id = self.normalized(name)?;
        match self.status.get_mut(&id) {
            Some(slot) if *slot == status => Ok(None),
            Some(slot) => Ok(Some(std::mem::replace(slot, status))),
            None => Err(RosterError::UnknownStudent {
                name: name.to_string(),
            }),
        }
    }

    /// Advance a student one step through the toggle cycle and return the
    /// new status.
    pub fn cycle_status(&mut self, name: &str) -> Result<AttendanceStatus, RosterError> {
        let id = self.normalized(name)?;
        match self.status.get_mut(&id) {
            Some(slot) => {
                *slot = slot.cycle();
                Ok(*slot)
            }
            None => Err(RosterError::UnknownStudent {
                name: name.to_string(),
            }),
        }
    }

    /// Read-only snapshot in configured order: `(display name, status)`.
    /// Reflects every mutation made before the call.
    pub fn snapshot(&self) -> Vec<(String, AttendanceStatus)> {
        self.students
            .iter()
            .map(|s| (s.display_name.clone(), self.status[&s.id]))
            .collect()
    }
}
