//! Plain-text attendance report rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::roster::{AttendanceStatus, Roster};

/// Localized strings and date format for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLabels {
    pub date_prefix: String,
    pub present: String,
    pub absent: String,
    pub excused: String,
    /// chrono format string for the date line.
    pub date_format: String,
}

impl Default for ReportLabels {
    fn default() -> Self {
        Self {
            date_prefix: "Date".to_string(),
            present: "Present".to_string(),
            absent: "Absent".to_string(),
            excused: "Excused".to_string(),
            date_format: "%m/%d/%Y".to_string(),
        }
    }
}

impl ReportLabels {
    /// Brazilian Portuguese label set.
    pub fn pt_br() -> Self {
        Self {
            date_prefix: "Data".to_string(),
            present: "Presente".to_string(),
            absent: "Faltou".to_string(),
            excused: "Justificado".to_string(),
            date_format: "%d/%m/%Y".to_string(),
        }
    }

    pub fn status_text(&self, status: AttendanceStatus) -> &str {
        match status {
            AttendanceStatus::Present => &self.present,
            AttendanceStatus::Absent => &self.absent,
            AttendanceStatus::Excused => &self.excused,
        }
    }
}

/// Render the dated roll: one date line, then one `name - status` line per
/// student in configured order. Every line ends with `\n`, so the output
/// pastes cleanly into a spreadsheet or chat message.
///
/// Rendering is pure: the same roster state, date and labels always
/// produce byte-identical output.
pub fn render_report(date: NaiveDate, roster: &Roster, labels: &ReportLabels) -> String {
    let mut out = format!(
        "{}: {}\n",
        labels.date_prefix,
        date.format(&labels.date_format)
    );
    for (student, status) in roster.iter() {
        out.push_str(&student.display_name);
        out.push_str(" - ");
        out.push_str(labels.status_text(status));
        out.push('\n');
    }
    out
}
