use std::time::Duration;

use async_trait::async_trait;
use scout_protocol::{ReasonerPrompt, ReasonerReply};

/// External natural-language collaborator. Implementations return the
/// raw structured payload; validation and timeout handling live on
/// this side of the boundary, so implementations stay thin.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn propose(&self, prompt: &ReasonerPrompt) -> anyhow::Result<serde_json::Value>;
}

/// Classified result of one Reasoner consultation. There is no error
/// variant on purpose: every failure mode degrades to a value the
/// phases can absorb.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonerOutcome {
    Suggestion(ReasonerReply),
    Timeout,
    Malformed,
}

/// Issue one Reasoner call with a hard timeout. A timeout means "no
/// suggestion", never an error; a transport error or an unvalidatable
/// payload is malformed.
pub async fn consult(
    reasoner: &dyn Reasoner,
    prompt: &ReasonerPrompt,
    timeout: Duration,
) -> ReasonerOutcome {
    if timeout.is_zero() {
        return ReasonerOutcome::Timeout;
    }
    match tokio::time::timeout(timeout, reasoner.propose(prompt)).await {
        Err(_) => {
            log::debug!("reasoner timed out after {timeout:?} in phase {}", prompt.phase);
            ReasonerOutcome::Timeout
        }
        Ok(Err(e)) => {
            log::warn!("reasoner call failed: {e:#}");
            ReasonerOutcome::Malformed
        }
        Ok(Ok(value)) => match ReasonerReply::from_json_value(&value) {
            Some(reply) => ReasonerOutcome::Suggestion(reply),
            None => {
                log::warn!("reasoner returned a non-object payload");
                ReasonerOutcome::Malformed
            }
        },
    }
}

/// A Reasoner that never answers. Sessions run index-only heuristics
/// end to end with it, which is also the degraded mode every phase
/// must survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReasoner;

#[async_trait]
impl Reasoner for NullReasoner {
    async fn propose(&self, _prompt: &ReasonerPrompt) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("no reasoner configured")
    }
}
