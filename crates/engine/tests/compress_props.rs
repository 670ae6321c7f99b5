use proptest::prelude::*;
use scout_engine::ContextCompressor;
use scout_protocol::Findings;

#[derive(Debug, Clone)]
struct FindingsSpec {
    key_files: Vec<(String, String, f64)>,
    tags: Vec<String>,
    entry_points: Vec<(String, f64)>,
    hypothesis: Option<String>,
    confidence: f64,
}

fn findings_spec() -> impl Strategy<Value = FindingsSpec> {
    let path = "[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.(rs|py|md)";
    let note = "[a-z ]{0,24}";
    let tag = "[a-z]{2,10}";
    (
        prop::collection::vec((path, note, 0.0f64..=1.0), 0..12),
        prop::collection::vec(tag, 0..16),
        prop::collection::vec((path, 0.0f64..=1.0), 0..8),
        prop::option::of("[A-Za-z ,]{0,80}(\\.[A-Za-z ,]{0,80}){0,3}"),
        0.0f64..=1.0,
    )
        .prop_map(
            |(key_files, tags, entry_points, hypothesis, confidence)| FindingsSpec {
                key_files,
                tags,
                entry_points,
                hypothesis,
                confidence,
            },
        )
}

fn build_findings(spec: &FindingsSpec) -> Findings {
    let mut findings = Findings::new("generated query");
    for (path, note, confidence) in &spec.key_files {
        findings.add_key_file(path.clone(), note.clone(), *confidence);
    }
    for tag in &spec.tags {
        findings.add_tech_tag(tag.clone());
    }
    for (path, confidence) in &spec.entry_points {
        findings.add_entry_point(path.clone(), *confidence);
    }
    if let Some(hypothesis) = &spec.hypothesis {
        findings.set_hypothesis(hypothesis.clone());
    }
    findings.raise_confidence(spec.confidence);
    findings
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// compress(compress(F)) == compress(F) for arbitrary findings and
    /// size hints.
    #[test]
    fn compress_is_idempotent(spec in findings_spec(), target in 16usize..4096) {
        let compressor = ContextCompressor::default();
        let findings = build_findings(&spec);

        let once = compressor.compress(&findings, target);
        let twice = compressor.compress(&once.clone().into_findings(), target);
        prop_assert_eq!(once, twice);
    }

    /// The confidence score and the key-file floor survive any size
    /// pressure.
    #[test]
    fn floors_survive_size_pressure(spec in findings_spec()) {
        let compressor = ContextCompressor::default();
        let findings = build_findings(&spec);
        let summary = compressor.compress(&findings, 1);

        prop_assert_eq!(summary.confidence, findings.confidence());
        let distinct: std::collections::BTreeSet<&str> =
            findings.key_files().iter().map(|k| k.path.as_str()).collect();
        prop_assert!(summary.key_files.len() >= distinct.len().min(3));
    }

    /// A truncated hypothesis never ends mid-word.
    #[test]
    fn hypothesis_never_cut_mid_word(
        text in "[A-Za-z]{1,12}( [A-Za-z]{1,12}){0,40}",
    ) {
        let compressor = ContextCompressor::default();
        let mut findings = Findings::new("q");
        findings.set_hypothesis(text.clone());
        let summary = compressor.compress(&findings, 4096);

        if let Some(kept) = summary.hypothesis {
            prop_assert!(kept.len() <= text.len());
            if kept.len() < text.len() {
                // The cut landed on a word boundary of the original.
                prop_assert!(text.as_bytes()[kept.len()] == b' ' || kept.is_empty()
                    || text[kept.len()..].starts_with(' '));
            }
        }
    }
}
