use serde::{Deserialize, Serialize};

/// A file the reconnaissance decided matters for the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFile {
    pub path: String,
    /// Short note on why this file matters.
    pub note: String,
    pub confidence: f64,
}

/// Candidate program entry point discovered by filename convention or
/// promoted by the Reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub path: String,
    pub confidence: f64,
}

/// One executed phase, kept for the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub note: String,
}

/// Why the session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    Cancelled,
    SessionCeilingReached,
}

/// Append-only accumulator shared by all exploration phases.
///
/// Phases may append entries and raise the confidence score; nothing is
/// ever deleted. The architecture hypothesis is the one overwritable
/// field (last writer wins). After the final phase the whole structure
/// is handed to external collaborators read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub query: String,
    key_files: Vec<KeyFile>,
    tech_tags: Vec<String>,
    entry_points: Vec<EntryPoint>,
    hypothesis: Option<String>,
    confidence: f64,
    phase_log: Vec<PhaseRecord>,
    termination: Option<TerminationReason>,
}

impl Findings {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            key_files: Vec::new(),
            tech_tags: Vec::new(),
            entry_points: Vec::new(),
            hypothesis: None,
            confidence: 0.0,
            phase_log: Vec::new(),
            termination: None,
        }
    }

    /// Append a key file. Duplicate paths are ignored (first writer
    /// wins) so the set semantics hold without deletions.
    pub fn add_key_file(
        &mut self,
        path: impl Into<String>,
        note: impl Into<String>,
        confidence: f64,
    ) -> bool {
        let path = path.into();
        if self.key_files.iter().any(|k| k.path == path) {
            return false;
        }
        self.key_files.push(KeyFile {
            path,
            note: note.into(),
            confidence: clamp01(confidence),
        });
        true
    }

    /// Append a tech-stack tag. Repeats are kept: recurrence across
    /// phases is the ranking signal the compressor uses.
    pub fn add_tech_tag(&mut self, tag: impl Into<String>) {
        self.tech_tags.push(tag.into());
    }

    pub fn add_entry_point(&mut self, path: impl Into<String>, confidence: f64) {
        self.entry_points.push(EntryPoint {
            path: path.into(),
            confidence: clamp01(confidence),
        });
    }

    /// Replace the architecture hypothesis. Last writer wins.
    pub fn set_hypothesis(&mut self, text: impl Into<String>) {
        self.hypothesis = Some(text.into());
    }

    /// Raise the confidence score. Values below the current score are
    /// ignored so the score is monotone within a session.
    pub fn raise_confidence(&mut self, value: f64) {
        let value = clamp01(value);
        if value > self.confidence {
            self.confidence = value;
        }
    }

    pub fn record_phase(
        &mut self,
        phase: impl Into<String>,
        duration_ms: u64,
        note: impl Into<String>,
    ) {
        self.phase_log.push(PhaseRecord {
            phase: phase.into(),
            duration_ms,
            note: note.into(),
        });
    }

    pub fn set_termination(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
    }

    pub fn key_files(&self) -> &[KeyFile] {
        &self.key_files
    }

    pub fn tech_tags(&self) -> &[String] {
        &self.tech_tags
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn hypothesis(&self) -> Option<&str> {
        self.hypothesis.as_deref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn phase_log(&self) -> &[PhaseRecord] {
        &self.phase_log
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn is_empty(&self) -> bool {
        self.key_files.is_empty()
            && self.tech_tags.is_empty()
            && self.entry_points.is_empty()
            && self.hypothesis.is_none()
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
