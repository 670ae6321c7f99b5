use serde::{Deserialize, Serialize};

use scout_protocol::{EntryPoint, Findings, KeyFile};

/// Caps and floors for the compressor. The floors are guarantees: the
/// confidence score and at least `min_key_files` key files survive any
/// amount of size pressure.
#[derive(Debug, Clone, Copy)]
pub struct CompressorConfig {
    pub max_tech_tags: usize,
    pub max_entry_points: usize,
    pub max_hypothesis_chars: usize,
    pub min_key_files: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_tech_tags: 12,
            max_entry_points: 10,
            max_hypothesis_chars: 480,
            min_key_files: 3,
        }
    }
}

/// Bounded digest of a [`Findings`] accumulator, fed back into
/// Reasoner prompts so sequential phases do not grow context without
/// bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedSummary {
    pub query: String,
    pub key_files: Vec<KeyFile>,
    pub tech_tags: Vec<String>,
    pub entry_points: Vec<EntryPoint>,
    pub hypothesis: Option<String>,
    pub confidence: f64,
}

impl CompressedSummary {
    /// Approximate rendered size, the quantity the size hint bounds.
    pub fn rendered_len(&self) -> usize {
        let mut len = self.query.len();
        for key_file in &self.key_files {
            len += key_file.path.len() + key_file.note.len() + 8;
        }
        for tag in &self.tech_tags {
            len += tag.len() + 2;
        }
        for entry in &self.entry_points {
            len += entry.path.len() + 8;
        }
        len += self.hypothesis.as_deref().map_or(0, str::len);
        len + 16
    }

    /// Re-wrap as a `Findings` value, e.g. to hand a pruned view to a
    /// downstream stage. Compressing the result again is a no-op.
    pub fn into_findings(self) -> Findings {
        let mut findings = Findings::new(self.query);
        for key_file in self.key_files {
            findings.add_key_file(key_file.path, key_file.note, key_file.confidence);
        }
        for tag in self.tech_tags {
            findings.add_tech_tag(tag);
        }
        for entry in self.entry_points {
            findings.add_entry_point(entry.path, entry.confidence);
        }
        if let Some(hypothesis) = self.hypothesis {
            findings.set_hypothesis(hypothesis);
        }
        findings.raise_confidence(self.confidence);
        findings
    }

    /// Deterministic plain-text block for Reasoner prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("query: {}\n", self.query));
        out.push_str(&format!("confidence: {:.2}\n", self.confidence));
        if !self.tech_tags.is_empty() {
            out.push_str(&format!("stack: {}\n", self.tech_tags.join(", ")));
        }
        if !self.key_files.is_empty() {
            out.push_str("key files:\n");
            for key_file in &self.key_files {
                out.push_str(&format!("  {} ({})\n", key_file.path, key_file.note));
            }
        }
        if !self.entry_points.is_empty() {
            out.push_str(&format!(
                "entry points: {}\n",
                self.entry_points
                    .iter()
                    .map(|e| e.path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if let Some(hypothesis) = &self.hypothesis {
            out.push_str(&format!("architecture: {hypothesis}\n"));
        }
        out
    }
}

/// Deterministic, idempotent findings compressor.
///
/// Dedupes by path, caps tags and entry points by recurrence rank,
/// trims the hypothesis at a sentence boundary, and under remaining
/// size pressure drops the lowest-confidence candidates first.
#[derive(Debug, Clone, Default)]
pub struct ContextCompressor {
    config: CompressorConfig,
}

impl ContextCompressor {
    pub fn new(config: CompressorConfig) -> Self {
        Self { config }
    }

    pub fn compress(&self, findings: &Findings, target_chars: usize) -> CompressedSummary {
        let mut key_files: Vec<KeyFile> = Vec::new();
        for key_file in findings.key_files() {
            if !key_files.iter().any(|k| k.path == key_file.path) {
                key_files.push(key_file.clone());
            }
        }
        key_files.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.path.cmp(&b.path))
        });

        let tech_tags = rank_by_recurrence(findings.tech_tags(), self.config.max_tech_tags);

        let mut entry_points: Vec<EntryPoint> = Vec::new();
        for entry in findings.entry_points() {
            match entry_points.iter_mut().find(|e| e.path == entry.path) {
                Some(existing) => {
                    if entry.confidence > existing.confidence {
                        existing.confidence = entry.confidence;
                    }
                }
                None => entry_points.push(entry.clone()),
            }
        }
        entry_points.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.path.cmp(&b.path))
        });
        entry_points.truncate(self.config.max_entry_points);

        let hypothesis = findings
            .hypothesis()
            .map(|text| truncate_at_sentence(text, self.config.max_hypothesis_chars));

        let mut summary = CompressedSummary {
            query: findings.query.clone(),
            key_files,
            tech_tags,
            entry_points,
            hypothesis,
            confidence: findings.confidence(),
        };

        // Size pressure: entry points go first (lowest confidence
        // last in the sorted vec), then key files down to the floor.
        while summary.rendered_len() > target_chars && !summary.entry_points.is_empty() {
            summary.entry_points.pop();
        }
        while summary.rendered_len() > target_chars
            && summary.key_files.len() > self.config.min_key_files
        {
            summary.key_files.pop();
        }

        summary
    }
}

/// Dedupe preserving first appearance, rank by recurrence count; the
/// stable sort keeps first-seen order on ties, which is what makes a
/// second compression pass a fixpoint.
fn rank_by_recurrence(tags: &[String], cap: usize) -> Vec<String> {
    let mut distinct: Vec<(String, usize)> = Vec::new();
    for tag in tags {
        match distinct.iter_mut().find(|(t, _)| t == tag) {
            Some((_, count)) => *count += 1,
            None => distinct.push((tag.clone(), 1)),
        }
    }
    distinct.sort_by(|a, b| b.1.cmp(&a.1));
    distinct.truncate(cap);
    distinct.into_iter().map(|(tag, _)| tag).collect()
}

/// Truncate to at most `max` chars, cutting at a sentence boundary
/// when one exists and never mid-word. Text already within the limit
/// comes back unchanged.
fn truncate_at_sentence(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max).collect();
    if let Some(boundary) = prefix.rfind(['.', '!', '?']) {
        return prefix[..=boundary].trim_end().to_string();
    }
    match prefix.rfind(char::is_whitespace) {
        Some(space) => prefix[..space].trim_end().to_string(),
        None => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_findings() -> Findings {
        let mut findings = Findings::new("how does auth work");
        findings.add_key_file("src/auth.py", "login flow", 0.9);
        findings.add_key_file("src/models.py", "user model", 0.6);
        findings.add_key_file("README.md", "project overview", 0.4);
        findings.add_tech_tag("lang:python");
        findings.add_tech_tag("docker");
        findings.add_tech_tag("lang:python");
        findings.add_entry_point("src/main.py", 0.8);
        findings.add_entry_point("manage.py", 0.5);
        findings.set_hypothesis("A Django-style web service. Auth lives in src.");
        findings.raise_confidence(0.7);
        findings
    }

    #[test]
    fn compress_is_idempotent() {
        let compressor = ContextCompressor::default();
        for target in [64usize, 160, 4096] {
            let once = compressor.compress(&sample_findings(), target);
            let twice = compressor.compress(&once.clone().into_findings(), target);
            assert_eq!(once, twice, "target {target}");
        }
    }

    #[test]
    fn recurrent_tags_rank_first() {
        let compressor = ContextCompressor::default();
        let summary = compressor.compress(&sample_findings(), 4096);
        assert_eq!(summary.tech_tags, vec!["lang:python", "docker"]);
    }

    #[test]
    fn entry_points_drop_before_key_files() {
        let compressor = ContextCompressor::default();
        let full = compressor.compress(&sample_findings(), 4096);
        let tight = compressor.compress(&sample_findings(), full.rendered_len() - 10);
        assert!(tight.entry_points.len() < full.entry_points.len());
        assert_eq!(tight.key_files.len(), full.key_files.len());
    }

    #[test]
    fn key_files_never_drop_below_floor() {
        let compressor = ContextCompressor::default();
        let summary = compressor.compress(&sample_findings(), 1);
        assert_eq!(summary.key_files.len(), 3);
        assert_eq!(summary.confidence, 0.7);
        assert!(summary.entry_points.is_empty());
    }

    #[test]
    fn hypothesis_truncates_at_sentence_boundary() {
        let compressor = ContextCompressor::new(CompressorConfig {
            max_hypothesis_chars: 30,
            ..CompressorConfig::default()
        });
        let summary = compressor.compress(&sample_findings(), 4096);
        assert_eq!(summary.hypothesis.as_deref(), Some("A Django-style web service."));
    }

    #[test]
    fn truncation_never_splits_words() {
        let text = "one_long_identifier another_long_identifier third";
        let cut = truncate_at_sentence(text, 28);
        assert_eq!(cut, "one_long_identifier");
    }

    #[test]
    fn key_files_rank_by_confidence() {
        let compressor = ContextCompressor::default();
        let summary = compressor.compress(&sample_findings(), 4096);
        let paths: Vec<&str> = summary.key_files.iter().map(|k| k.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth.py", "src/models.py", "README.md"]);
    }
}
