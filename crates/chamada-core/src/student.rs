//! Student identity — normalized keys for roster and gallery lookups.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Normalized student key: the configured name trimmed and uppercased.
///
/// Every lookup in the roster and every gallery label goes through this
/// type, and the only way to build one is [`StudentId::normalize`], so a
/// raw, differently-cased name can never leak into a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Normalize a raw name: trim surrounding whitespace, then uppercase.
    ///
    /// Returns `None` when nothing remains after trimming. Normalization
    /// is idempotent, so an already-normalized key maps to itself.
    pub fn normalize(raw: &str) -> Option<StudentId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(StudentId(trimmed.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<StudentId> for String {
    fn from(id: StudentId) -> String {
        id.0
    }
}

// Deserialization must not bypass normalization: gallery files written by
// hand routinely carry mixed-case labels.
impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        StudentId::normalize(&raw)
            .ok_or_else(|| serde::de::Error::custom("student name is empty after trimming"))
    }
}

/// A configured student: the normalized key plus the display name exactly
/// as configured, which is what reports print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub display_name: String,
}
