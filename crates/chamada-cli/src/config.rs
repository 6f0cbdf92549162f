//! Roster and matching configuration: a TOML file plus `CHAMADA_*`
//! environment overrides.

use std::path::Path;

use anyhow::{bail, Context as _};
use serde::Deserialize;

use chamada_core::{ReportLabels, Roster, DEFAULT_MATCH_THRESHOLD};

/// Default capture interval for live mode, in milliseconds.
const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 2000;

/// `roster.toml` contents.
#[derive(Debug, Deserialize)]
pub struct RosterFile {
    /// Student display names, in roll order.
    pub students: Vec<String>,
    #[serde(default)]
    pub labels: Option<LabelsSection>,
    #[serde(default)]
    pub matching: Option<MatchingSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelsSection {
    /// `"en"` (default) or `"pt-br"`. Individual fields below override
    /// whichever preset is picked.
    pub preset: Option<String>,
    pub date_prefix: Option<String>,
    pub present: Option<String>,
    pub absent: Option<String>,
    pub excused: Option<String>,
    pub date_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchingSection {
    pub threshold: Option<f32>,
}

/// Resolved configuration for one run.
#[derive(Debug)]
pub struct Config {
    pub roster: Roster,
    pub labels: ReportLabels,
    pub match_threshold: f32,
    pub capture_interval_ms: u64,
}

impl Config {
    /// Read and parse the roster file, then apply env overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster file {}", path.display()))?;
        let file: RosterFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse roster file {}", path.display()))?;
        let mut config = Self::from_file(file)?;
        config.apply_env();
        Ok(config)
    }

    /// Resolve a parsed roster file. Does not touch the environment, so
    /// tests stay deterministic.
    pub fn from_file(file: RosterFile) -> anyhow::Result<Self> {
        if file.students.is_empty() {
            bail!("roster file lists no students");
        }
        let roster = Roster::new(file.students)?;
        let labels = resolve_labels(file.labels.as_ref())?;
        let match_threshold = file
            .matching
            .and_then(|m| m.threshold)
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);
        if !(match_threshold > 0.0) {
            bail!("matching.threshold must be positive");
        }

        Ok(Self {
            roster,
            labels,
            match_threshold,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
        })
    }

    fn apply_env(&mut self) {
        self.match_threshold = env_f32("CHAMADA_MATCH_THRESHOLD", self.match_threshold);
        self.capture_interval_ms = env_u64("CHAMADA_CAPTURE_INTERVAL_MS", self.capture_interval_ms);
    }
}

fn resolve_labels(section: Option<&LabelsSection>) -> anyhow::Result<ReportLabels> {
    let Some(section) = section else {
        return Ok(ReportLabels::default());
    };

    let mut labels = match section.preset.as_deref() {
        None | Some("en") => ReportLabels::default(),
        Some("pt-br") => ReportLabels::pt_br(),
        Some(other) => bail!("unknown label preset {other:?} (expected \"en\" or \"pt-br\")"),
    };
    if let Some(v) = &section.date_prefix {
        labels.date_prefix = v.clone();
    }
    if let Some(v) = &section.present {
        labels.present = v.clone();
    }
    if let Some(v) = &section.absent {
        labels.absent = v.clone();
    }
    if let Some(v) = &section.excused {
        labels.excused = v.clone();
    }
    if let Some(v) = &section.date_format {
        labels.date_format = v.clone();
    }
    Ok(labels)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
