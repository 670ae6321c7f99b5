use std::sync::Arc;

use regex::RegexBuilder;
use scout_indexer::FileIndex;
use scout_protocol::{BudgetTracker, Findings, OperationKind, ReasonerPrompt};
use scout_speculation::{SpeculationQuery, SpeculativeResolver};
use tokio::sync::Semaphore;

use crate::compress::ContextCompressor;
use crate::reasoner::{consult, Reasoner, ReasonerOutcome};
use crate::session::CancelHandle;

/// Shared read-only context for one phase execution. Findings is
/// passed separately because the executing phase holds the exclusive
/// append right.
pub(crate) struct PhaseCtx {
    pub index: Arc<FileIndex>,
    pub tracker: Arc<BudgetTracker>,
    pub resolver: SpeculativeResolver,
    pub compressor: ContextCompressor,
    pub cancel: CancelHandle,
    /// Size hint handed to the compressor at phase boundaries.
    pub summary_target_chars: usize,
}

/// Filenames that conventionally mark an entry point, most telling
/// first.
const ENTRY_POINT_NAMES: &[&str] = &[
    "main.rs",
    "main.go",
    "main.py",
    "app.py",
    "manage.py",
    "index.js",
    "index.ts",
    "server.js",
    "app.js",
    "main.js",
    "lib.rs",
    "mod.rs",
    "Program.cs",
    "Application.java",
    "index.html",
];

/// Marker files that identify a stack without opening anything.
const TECH_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust:cargo"),
    ("package.json", "node"),
    ("pyproject.toml", "python:pyproject"),
    ("requirements.txt", "python:pip"),
    ("setup.py", "python:setuptools"),
    ("go.mod", "go:modules"),
    ("pom.xml", "java:maven"),
    ("build.gradle", "java:gradle"),
    ("Gemfile", "ruby:bundler"),
    ("composer.json", "php:composer"),
    ("Dockerfile", "docker"),
    ("docker-compose.yml", "docker-compose"),
    ("Makefile", "make"),
    ("CMakeLists.txt", "cmake"),
    ("tsconfig.json", "typescript"),
];

/// What a directory name conventionally means.
const DIR_PURPOSES: &[(&str, &str)] = &[
    ("src", "source code"),
    ("lib", "library code"),
    ("app", "application code"),
    ("apps", "multiple applications"),
    ("packages", "monorepo packages"),
    ("crates", "workspace crates"),
    ("cmd", "command entry points"),
    ("api", "API endpoints"),
    ("services", "business services"),
    ("core", "core domain logic"),
    ("models", "data models"),
    ("views", "view logic"),
    ("controllers", "request handlers"),
    ("components", "UI components"),
    ("tests", "test suite"),
    ("test", "test suite"),
    ("spec", "test suite"),
    ("docs", "documentation"),
    ("examples", "usage examples"),
    ("scripts", "tooling scripts"),
    ("config", "configuration"),
    ("migrations", "database migrations"),
    ("benches", "benchmarks"),
];

const MANIFEST_KEY_FILES: &[&str] = &[
    "README.md",
    "ARCHITECTURE.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "composer.json",
];

const MAX_ENTRY_POINTS_SCANNED: usize = 20;
const MAX_SUGGESTIONS_PER_REPLY: usize = 5;
const MAX_DEEP_DIVE_ITERATIONS: usize = 3;
const DEEP_DIVE_STOP_CONFIDENCE: f64 = 0.8;
const SCAN_WORKERS: usize = 4;
const MAX_SCAN_CANDIDATES: usize = 8;

/// Phase 1: orientation without reading a single file. Languages,
/// stack markers, entry-point candidates and the top-level layout all
/// come straight out of the index.
pub(crate) fn lightning_scan(ctx: &PhaseCtx, findings: &mut Findings) -> String {
    let total = ctx.index.total_files();
    if total == 0 {
        return "empty tree".to_string();
    }

    let mut languages: Vec<_> = ctx.index.language_histogram().iter().collect();
    languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    for (language, _count) in languages.iter().take(3) {
        findings.add_tech_tag(format!("lang:{language}"));
    }

    for (marker, tag) in TECH_MARKERS {
        if !ctx.index.by_basename(marker).is_empty() {
            findings.add_tech_tag(*tag);
        }
    }

    let mut entry_candidates = 0usize;
    'names: for name in ENTRY_POINT_NAMES {
        for record in ctx.index.by_basename(name).into_iter().take(3) {
            let depth = record.path.matches('/').count() as f64;
            findings.add_entry_point(&record.path, (0.9 - 0.15 * depth).max(0.3));
            entry_candidates += 1;
            if entry_candidates >= MAX_ENTRY_POINTS_SCANNED {
                break 'names;
            }
        }
    }

    let top_level: Vec<&str> = ctx
        .index
        .children_of("")
        .iter()
        .filter(|p| ctx.index.is_dir(p))
        .map(String::as_str)
        .collect();
    let dominant = languages
        .first()
        .map(|(language, _)| language.as_str())
        .unwrap_or("unknown");
    findings.set_hypothesis(format!(
        "{total} files, mostly {dominant}. Top-level directories: {}.",
        if top_level.is_empty() {
            "none".to_string()
        } else {
            top_level.join(", ")
        }
    ));
    findings.raise_confidence(0.2);

    format!(
        "{total} files, {} languages, {entry_candidates} entry candidates",
        ctx.index.language_histogram().len()
    )
}

/// Phase 2: architecture and conventions. Directory purposes and key
/// manifests come from the index; one optional Reasoner call refines
/// the picture and may name files speculation has to chase.
pub(crate) async fn structural_mapping(
    ctx: &PhaseCtx,
    findings: &mut Findings,
    reasoner: &dyn Reasoner,
) -> String {
    let mut purposes: Vec<(String, &str)> = Vec::new();
    for child in ctx.index.children_of("") {
        if !ctx.index.is_dir(child) {
            continue;
        }
        let name = child.rsplit('/').next().unwrap_or(child);
        if let Some(&(_, purpose)) = DIR_PURPOSES.iter().find(|(n, _)| n == &name) {
            purposes.push((child.clone(), purpose));
        }
    }

    if purposes.iter().any(|(_, p)| *p == "test suite") {
        findings.add_tech_tag("tests:present");
    }
    if purposes.iter().any(|(_, p)| *p == "documentation") {
        findings.add_tech_tag("docs:present");
    }

    for name in MANIFEST_KEY_FILES {
        if let Some(record) = ctx.index.by_basename(name).first() {
            let note = if name.ends_with(".md") {
                "documentation"
            } else {
                "build manifest"
            };
            findings.add_key_file(&record.path, note, 0.7);
        }
    }

    let mut hypothesis = String::new();
    if !purposes.is_empty() {
        let layout: Vec<String> = purposes
            .iter()
            .map(|(dir, purpose)| format!("{dir} holds {purpose}"))
            .collect();
        hypothesis.push_str(&format!("Layout: {}. ", layout.join("; ")));
    }
    if let Some(previous) = findings.hypothesis() {
        hypothesis.push_str(previous);
    }
    if !hypothesis.is_empty() {
        findings.set_hypothesis(hypothesis.trim_end().to_string());
    }
    findings.raise_confidence(0.4);

    let consulted = if ctx.cancel.is_cancelled() || ctx.tracker.exhausted() {
        "skipped"
    } else if consult_once(ctx, findings, reasoner, "structural_mapping").await {
        "consulted"
    } else {
        "degraded"
    };

    format!("{} purposeful directories, reasoner {consulted}", purposes.len())
}

/// Phase 3: query-focused exploration. Resolves the query itself,
/// scans the strongest candidates for query terms on a bounded worker
/// pool, then iterates Reasoner suggestions until confidence, budget
/// or the iteration cap says stop.
pub(crate) async fn query_deep_dive(
    ctx: &PhaseCtx,
    findings: &mut Findings,
    reasoner: &dyn Reasoner,
) -> String {
    let direct = ctx.resolver.resolve(
        &SpeculationQuery::new(&findings.query),
        &ctx.index,
        &ctx.tracker,
    );
    let best_direct = direct.first().map(|r| r.confidence).unwrap_or(0.0);
    for result in direct.into_iter().take(3) {
        findings.add_key_file(result.path, "query match", result.confidence * 0.9);
    }
    if best_direct >= 0.85 {
        findings.raise_confidence(0.75);
    } else if best_direct > 0.0 {
        findings.raise_confidence(0.55);
    }

    let scanned = scan_candidates_for_terms(ctx, findings).await;
    for (path, hits) in scanned {
        findings.add_key_file(path, format!("mentions query terms x{hits}"), 0.5);
    }

    let mut iterations = 0usize;
    let mut degraded = false;
    while iterations < MAX_DEEP_DIVE_ITERATIONS {
        if ctx.cancel.is_cancelled()
            || ctx.tracker.exhausted()
            || findings.confidence() >= DEEP_DIVE_STOP_CONFIDENCE
        {
            break;
        }
        iterations += 1;
        if !consult_once(ctx, findings, reasoner, "query_deep_dive").await {
            // Index-only fallback: promote conventional entry points.
            let entries: Vec<(String, f64)> = findings
                .entry_points()
                .iter()
                .take(3)
                .map(|e| (e.path.clone(), e.confidence))
                .collect();
            for (path, confidence) in entries {
                findings.add_key_file(path, "entry point heuristic", confidence * 0.6);
            }
            degraded = true;
            break;
        }
    }

    format!(
        "{iterations} reasoner iterations{}",
        if degraded { ", degraded to heuristics" } else { "" }
    )
}

/// Phase 4: always runs, even under cancellation, so the caller gets
/// a usable partial result instead of none.
pub(crate) fn synthesis(ctx: &PhaseCtx, findings: &mut Findings) -> String {
    let summary = ctx
        .compressor
        .compress(findings, ctx.summary_target_chars);
    if !summary.key_files.is_empty() {
        findings.raise_confidence(0.35);
    }
    format!(
        "compressed to {} chars: {} key files, {} tags, {} entry points",
        summary.rendered_len(),
        summary.key_files.len(),
        summary.tech_tags.len(),
        summary.entry_points.len()
    )
}

/// One Reasoner consultation: build the compressed prompt, call with a
/// timeout derived from the remaining phase budget, feed suggestions
/// back through speculation. Returns false when the phase should fall
/// back to index-only heuristics.
async fn consult_once(
    ctx: &PhaseCtx,
    findings: &mut Findings,
    reasoner: &dyn Reasoner,
    phase: &str,
) -> bool {
    let prompt = ReasonerPrompt {
        query: findings.query.clone(),
        phase: phase.to_string(),
        findings_summary: ctx
            .compressor
            .compress(findings, ctx.summary_target_chars)
            .to_prompt_text(),
    };
    let timeout = ctx.tracker.remaining().wall_clock;
    ctx.tracker.charge(OperationKind::ReasonerCall, 1);

    match consult(reasoner, &prompt, timeout).await {
        ReasonerOutcome::Suggestion(reply) => {
            let mut resolved = 0usize;
            for suggestion in reply.suggestions.iter().take(MAX_SUGGESTIONS_PER_REPLY) {
                let results = ctx.resolver.resolve(
                    &SpeculationQuery::new(suggestion),
                    &ctx.index,
                    &ctx.tracker,
                );
                if let Some(top) = results.first() {
                    let note = reply
                        .rationale
                        .clone()
                        .unwrap_or_else(|| "reasoner suggestion".to_string());
                    findings.add_key_file(
                        top.path.clone(),
                        note,
                        top.confidence * reply.confidence.max(0.5),
                    );
                    resolved += 1;
                }
            }
            let bumped = (findings.confidence() + 0.1 + 0.2 * reply.confidence).min(0.9);
            findings.raise_confidence(bumped);
            log::debug!(
                "reasoner suggested {} references, {} resolved",
                reply.suggestions.len(),
                resolved
            );
            true
        }
        ReasonerOutcome::Timeout | ReasonerOutcome::Malformed => false,
    }
}

/// Scan the strongest candidate files for query terms, overlapping IO
/// on a bounded worker pool. Workers share the index read-only; every
/// scheduled file is charged against the phase read quota first.
async fn scan_candidates_for_terms(ctx: &PhaseCtx, findings: &Findings) -> Vec<(String, usize)> {
    let tokens = query_tokens(&findings.query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let alternation = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(pattern) = RegexBuilder::new(&alternation).case_insensitive(true).build() else {
        return Vec::new();
    };

    let mut candidates: Vec<String> = Vec::new();
    for entry in findings.entry_points() {
        if !candidates.contains(&entry.path) {
            candidates.push(entry.path.clone());
        }
    }
    for key_file in findings.key_files() {
        if !candidates.contains(&key_file.path) {
            candidates.push(key_file.path.clone());
        }
    }
    candidates.truncate(MAX_SCAN_CANDIDATES);

    let semaphore = Arc::new(Semaphore::new(SCAN_WORKERS));
    let mut handles = Vec::new();
    for path in candidates {
        if ctx.tracker.exhausted() {
            break;
        }
        ctx.tracker.charge(OperationKind::ContentScan, 1);
        // The semaphore is never closed; acquire failures are not expected.
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("scan semaphore closed"));
        let index = Arc::clone(&ctx.index);
        let regex = pattern.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let content = index.read_cached(&path).ok()?;
            let hits = regex.find_iter(&content).count();
            (hits > 0).then_some((path, hits))
        }));
    }

    let mut matches = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(hit)) => matches.push(hit),
            Ok(None) => {}
            Err(e) => log::warn!("scan worker failed: {e}"),
        }
    }
    matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    matches
}

const QUERY_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "when", "where", "which", "how", "why",
    "who", "does", "are", "was", "were", "has", "have", "from", "into", "file", "files", "code",
];

fn query_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in query.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if token.len() < 3 {
            continue;
        }
        let lowered = token.to_ascii_lowercase();
        if QUERY_STOPWORDS.contains(&lowered.as_str()) {
            continue;
        }
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            tokens.push(token.to_string());
        }
        if tokens.len() == 5 {
            break;
        }
    }
    tokens
}
