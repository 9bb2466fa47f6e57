//! The model gateway: a uniform `complete` contract over pluggable model
//! providers, selected by tier.
//!
//! Generalizes the original single hardcoded client into an explicit
//! registry, the way the teacher turns one checker into a `Checker` trait
//! plus `build_checker_registry()`. A provider is available only when its
//! credentials and SDK are both present; selection simply skips whichever
//! providers are not.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use serde::Deserialize;

use crate::types::{DiagnosisReport, Severity};

/// A capability tier a trace can be escalated to. Tier 1 (pattern
/// matching) has no gateway provider — it is handled entirely by
/// [`crate::patterns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Fast hosted model, used for the default (non-flagged) path.
    Tier2,
    /// Mid-capability hosted model, used under the `haiku` flag.
    Tier3,
    /// Deep-reasoning hosted model, used under the `deep` flag.
    Tier4,
}

impl ModelTier {
    pub fn as_u8(self) -> u8 {
        match self {
            ModelTier::Tier2 => 2,
            ModelTier::Tier3 => 3,
            ModelTier::Tier4 => 4,
        }
    }
}

/// Additional context fed into the prompt, in the fixed order the user
/// template injects them.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub raw_trace: String,
    pub source_block: Option<String>,
    pub vcs_block: Option<String>,
    pub project_block: Option<String>,
    pub memory_block: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are a diagnostic assistant. Given a stack trace and whatever \
surrounding context is available, identify the root cause and propose a fix. Respond with a \
single JSON object with exactly these keys: error_type, error_message, root_cause, \
suggested_fix, severity (one of low, medium, high, critical), architecture_notes.";

const DEEP_SYSTEM_PROMPT: &str = "You are a senior diagnostic assistant performing a deep \
analysis. Given a stack trace and all available surrounding context, identify the root cause, \
propose a concrete fix, and note any architectural concerns the failure suggests. Respond with \
a single JSON object with exactly these keys: error_type, error_message, root_cause, \
suggested_fix, severity (one of low, medium, high, critical), architecture_notes.";

/// Build the user-facing prompt body, injecting each context block in the
/// fixed order: trace, source, vcs, project, memory. Absent blocks are
/// skipped entirely rather than emitted empty.
pub fn build_user_prompt(ctx: &PromptContext) -> String {
    let mut parts = vec![format!("## Trace\n{}", ctx.raw_trace)];
    if let Some(block) = &ctx.source_block {
        parts.push(format!("## Source context\n{block}"));
    }
    if let Some(block) = &ctx.vcs_block {
        parts.push(format!("## Version control context\n{block}"));
    }
    if let Some(block) = &ctx.project_block {
        parts.push(format!("## Project profile\n{block}"));
    }
    if let Some(block) = &ctx.memory_block {
        parts.push(format!("## Similar past diagnoses\n{block}"));
    }
    parts.join("\n\n")
}

pub fn system_prompt_for(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Tier4 => DEEP_SYSTEM_PROMPT,
        ModelTier::Tier2 | ModelTier::Tier3 => SYSTEM_PROMPT,
    }
}

/// A pluggable model backend. Implementations wrap a concrete hosted
/// provider's SDK/HTTP client.
pub trait Provider: Send + Sync {
    /// Stable identifier surfaced on the resulting [`DiagnosisReport::model`].
    fn model_id(&self) -> &str;

    /// Whether this provider's credentials and SDK are both present.
    fn is_available(&self) -> bool;

    /// Run one completion. `max_tokens` bounds the response length.
    fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> Result<String, String>;
}

/// Maps each [`ModelTier`] to the provider that serves it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<u8, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tier: ModelTier, provider: Arc<dyn Provider>) {
        self.providers.insert(tier.as_u8(), provider);
    }

    pub fn get(&self, tier: ModelTier) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&tier.as_u8()).filter(|p| p.is_available())
    }
}

/// Fields the provider's JSON response must carry; this is the authoritative
/// contract parsed out of (and potentially fenced-code-wrapped) model output.
#[derive(Debug, Deserialize)]
struct ModelResponse {
    error_type: String,
    error_message: String,
    root_cause: String,
    suggested_fix: String,
    severity: String,
    #[serde(default)]
    architecture_notes: Option<String>,
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric());
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_severity(s: &str) -> Severity {
    match s.to_lowercase().as_str() {
        "high" => Severity::High,
        "critical" => Severity::Critical,
        "low" => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Run `tier`'s provider and turn its response (or failure) into a report.
///
/// A JSON parse failure produces a sentinel report: tier is retained,
/// severity is forced to low, and the message carries an error marker —
/// it is not propagated as an error, since a gateway miss is a normal
/// cascade step, not a crash.
pub fn complete_at_tier(
    registry: &ProviderRegistry,
    tier: ModelTier,
    ctx: &PromptContext,
    max_tokens: u32,
) -> Option<DiagnosisReport> {
    let provider = registry.get(tier)?;
    let system_prompt = system_prompt_for(tier);
    let user_prompt = build_user_prompt(ctx);

    let raw = match provider.complete(system_prompt, &user_prompt, max_tokens) {
        Ok(r) => r,
        Err(e) => {
            warn!("model provider {} failed at tier {}: {e}", provider.model_id(), tier.as_u8());
            return None;
        }
    };

    let cleaned = strip_fences(&raw);
    match serde_json::from_str::<ModelResponse>(cleaned) {
        Ok(parsed) => Some(DiagnosisReport {
            error_type: parsed.error_type,
            error_message: parsed.error_message,
            file: None,
            line: None,
            symbol: None,
            root_cause: parsed.root_cause,
            suggested_fix: parsed.suggested_fix,
            severity: parse_severity(&parsed.severity),
            tier: tier.as_u8(),
            model: Some(provider.model_id().to_owned()),
            architecture_notes: parsed.architecture_notes,
            vcs_summary: None,
        }),
        Err(e) => Some(DiagnosisReport {
            error_type: "GatewayParseError".to_owned(),
            error_message: format!("model response was not valid JSON: {e}"),
            file: None,
            line: None,
            symbol: None,
            root_cause: "The model response could not be parsed".to_owned(),
            suggested_fix: "Retry, or fall back to an earlier tier".to_owned(),
            severity: Severity::Low,
            tier: tier.as_u8(),
            model: Some(provider.model_id().to_owned()),
            architecture_notes: None,
            vcs_summary: None,
        }),
    }
}

/// Confidence assigned to a stored memory entry, monotone non-decreasing
/// in tier: a deeper model's diagnosis is trusted more than a shallower one.
pub fn confidence_for_tier(tier: u8) -> f64 {
    match tier {
        0 => 0.0,
        1 => 0.5,
        2 => 0.6,
        3 => 0.75,
        4 => 0.9,
        _ => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        id: String,
        available: bool,
        response: String,
    }

    impl Provider for StubProvider {
        fn model_id(&self) -> &str {
            &self.id
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn complete(&self, _system_prompt: &str, _user_prompt: &str, _max_tokens: u32) -> Result<String, String> {
            Ok(self.response.clone())
        }
    }

    #[test]
    fn unavailable_provider_is_skipped() {
        let mut registry = ProviderRegistry::new();
        registry.register(ModelTier::Tier2, Arc::new(StubProvider { id: "tier2-fast".into(), available: false, response: String::new() }));
        assert!(registry.get(ModelTier::Tier2).is_none());
    }

    #[test]
    fn strip_fences_removes_markdown_wrapper() {
        let wrapped = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(wrapped), "{\"a\": 1}");
    }

    #[test]
    fn complete_at_tier_parses_valid_response() {
        let mut registry = ProviderRegistry::new();
        let body = r#"{"error_type": "KeyError", "error_message": "missing key", "root_cause": "c", "suggested_fix": "f", "severity": "medium"}"#;
        registry.register(ModelTier::Tier3, Arc::new(StubProvider { id: "tier3-standard".into(), available: true, response: body.into() }));
        let report = complete_at_tier(&registry, ModelTier::Tier3, &PromptContext::default(), 512).unwrap();
        assert_eq!(report.tier, 3);
        assert_eq!(report.severity, Severity::Medium);
    }

    #[test]
    fn complete_at_tier_produces_sentinel_on_bad_json() {
        let mut registry = ProviderRegistry::new();
        registry.register(ModelTier::Tier2, Arc::new(StubProvider { id: "tier2-fast".into(), available: true, response: "not json".into() }));
        let report = complete_at_tier(&registry, ModelTier::Tier2, &PromptContext::default(), 512).unwrap();
        assert_eq!(report.severity, Severity::Low);
        assert_eq!(report.tier, 2);
    }

    #[test]
    fn confidence_is_monotone_in_tier() {
        assert!(confidence_for_tier(2) < confidence_for_tier(3));
        assert!(confidence_for_tier(3) < confidence_for_tier(4));
    }

    #[test]
    fn prompt_blocks_are_ordered_and_skip_absent() {
        let ctx = PromptContext { raw_trace: "trace".into(), vcs_block: Some("vcs".into()), ..Default::default() };
        let prompt = build_user_prompt(&ctx);
        assert!(prompt.find("Trace").unwrap() < prompt.find("Version control").unwrap());
        assert!(!prompt.contains("Source context"));
    }
}
