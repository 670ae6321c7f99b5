use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured prompt handed to the external Reasoner: the compressed
/// findings so far, the user query, and the current phase name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerPrompt {
    pub query: String,
    pub phase: String,
    pub findings_summary: String,
}

/// Validated Reasoner response.
///
/// The raw payload is untrusted, duck-typed JSON. Validation is lenient
/// by design: a missing or mistyped field degrades to its empty value,
/// never to an error, so a half-broken reply still contributes whatever
/// it got right. Raw untyped data never flows past this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerReply {
    /// Suggested file references. May name paths that are not in the
    /// index; the engine routes those through speculation.
    pub suggestions: Vec<String>,
    pub rationale: Option<String>,
    /// Reasoner's own confidence estimate, clamped to [0,1].
    pub confidence: f64,
}

impl ReasonerReply {
    /// Validate a raw JSON payload. Returns `None` only when the value
    /// is not an object at all.
    pub fn from_json_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let suggestions = object
            .get("suggestions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let rationale = object
            .get("rationale")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let confidence = object
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Some(Self {
            suggestions,
            rationale,
            confidence,
        })
    }

    /// Parse a textual Reasoner response. Tolerates a JSON object
    /// wrapped in a markdown code fence, which reasoning models emit
    /// even when asked not to.
    pub fn from_text(raw: &str) -> Option<Self> {
        let candidate = extract_fenced_block(raw).unwrap_or(raw).trim();
        let value: Value = serde_json::from_str(candidate).ok()?;
        Self::from_json_value(&value)
    }

    pub fn has_suggestions(&self) -> bool {
        !self.suggestions.is_empty()
    }
}

fn extract_fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}
