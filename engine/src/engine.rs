//! Analyzer orchestrator — the main entry point for diagnosing a trace.
//!
//! Coordinates language detection, frame extraction, side-context
//! collection (source windows, VCS, project profile, memory recall), and
//! the cascading-tier escalation to pattern matching or a model provider.
//!
//! Every per-trace dispatch in batch mode is wrapped in `catch_unwind` so a
//! panic analyzing one trace emits an error report instead of aborting the
//! whole batch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use log::warn;
use rayon::prelude::*;

use crate::batch::extract_tracebacks;
use crate::chain::parse_exception_chain;
use crate::config::AnalyzerConfig;
use crate::frames::extract_frames;
use crate::gateway::{complete_at_tier, confidence_for_tier, ModelTier, PromptContext, ProviderRegistry};
use crate::language::detect_language;
use crate::memory::MemoryStore;
use crate::normalize::{fingerprint, snippet};
use crate::patterns::match_pattern;
use crate::project::get_project_profile;
use crate::report::{with_vcs_summary, BatchResult, ChainResult};
use crate::source_window::SourceWindowReader;
use crate::types::{ChainLink, DiagnosisReport, Frame, LanguageTag, ProjectProfile, VcsContext};
use crate::vcs::context_for_frame;

/// Flags controlling one diagnosis run.
#[derive(Debug, Clone, Default)]
pub struct DiagnoseFlags {
    /// Escalate straight to the deep (tier 4) model.
    pub deep: bool,
    /// Escalate to the mid-capability (tier 3) model.
    pub haiku: bool,
    /// Project root to profile, if any.
    pub project_root: Option<String>,
    /// Whether to consult and record to the memory store.
    pub use_memory: bool,
    /// Skip version-control context collection entirely.
    pub skip_vcs: bool,
    /// Optional repo identifier, threaded through to memory recall/record.
    pub repo_id: Option<String>,
}

/// The analyzer: owns the config, model provider registry, optional memory
/// store, and the per-invocation source-line cache.
pub struct Analyzer {
    config: AnalyzerConfig,
    registry: ProviderRegistry,
    memory: Option<MemoryStore>,
    source_reader: SourceWindowReader,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, registry: ProviderRegistry, memory: Option<MemoryStore>) -> Self {
        Self { config, registry, memory, source_reader: SourceWindowReader::new() }
    }

    /// Diagnose a single trace. Implements the cascading-tier algorithm:
    /// deep model, then mid model, then pattern match, then the default
    /// model tier, then a tier-0 fallback — the first branch that produces
    /// a report wins.
    pub fn diagnose(&self, raw: &str, flags: &DiagnoseFlags) -> DiagnosisReport {
        let report = self.diagnose_inner(raw, flags);
        self.source_reader.clear();
        report
    }

    fn diagnose_inner(&self, raw: &str, flags: &DiagnoseFlags) -> DiagnosisReport {
        let language = detect_language(raw);
        let error_line = extract_error_line(raw, language);
        let (error_type, error_message) = split_error_line(error_line);
        let frames = extract_frames(raw, language);
        let innermost = frames.last();

        let project_profile = flags.project_root.as_ref().map(|root| get_project_profile(Path::new(root)));
        let vcs_contexts = self.collect_vcs_contexts(&frames, flags);
        let memory_matches = if flags.use_memory {
            self.memory.as_ref().map(|m| m.recall(&snippet(raw), flags.repo_id.as_deref(), 3)).unwrap_or_default()
        } else {
            Vec::new()
        };

        let ctx = PromptContext {
            raw_trace: raw.to_owned(),
            source_block: self.build_source_block(&frames),
            vcs_block: build_vcs_block(&vcs_contexts),
            project_block: project_profile.as_ref().map(format_project_profile),
            memory_block: (!memory_matches.is_empty()).then(|| format_memory_recall(&memory_matches)),
        };

        let mut report = if flags.deep {
            complete_at_tier(&self.registry, ModelTier::Tier4, &ctx, 2048)
        } else if flags.haiku {
            complete_at_tier(&self.registry, ModelTier::Tier3, &ctx, 1024)
        } else {
            None
        };

        if report.is_none() && !flags.deep && !flags.haiku {
            let match_text = pattern_match_text(raw, error_line, language);
            report = match_pattern(match_text, language).map(|m| DiagnosisReport {
                error_type: error_type.clone(),
                error_message: error_message.clone(),
                file: innermost.map(|f| f.file_path.clone()),
                line: innermost.map(|f| f.line_number),
                symbol: innermost.and_then(|f| f.symbol.clone()),
                root_cause: m.root_cause,
                suggested_fix: m.suggested_fix,
                severity: m.severity,
                tier: 1,
                model: None,
                architecture_notes: None,
                vcs_summary: None,
            });
        }

        if report.is_none() && !flags.deep && !flags.haiku {
            report = complete_at_tier(&self.registry, ModelTier::Tier2, &ctx, 768);
        }

        let mut report = report.unwrap_or_else(|| DiagnosisReport::unrecognized(&error_type, &error_message));
        if report.file.is_none() {
            report.file = innermost.map(|f| f.file_path.clone());
            report.line = innermost.map(|f| f.line_number);
            report.symbol = innermost.and_then(|f| f.symbol.clone());
        }
        if report.error_type.is_empty() {
            report.error_type = error_type.clone();
        }
        if report.error_message.is_empty() {
            report.error_message = error_message.clone();
        }

        report = with_vcs_summary(report, vcs_contexts.first());

        if flags.use_memory && (2..=4).contains(&report.tier) {
            if let Some(store) = &self.memory {
                let fp = fingerprint(raw);
                let confidence = confidence_for_tier(report.tier);
                store.record(
                    &language.to_string(),
                    &fp,
                    &snippet(raw),
                    report.severity,
                    report.tier,
                    &report.root_cause,
                    &report.suggested_fix,
                    confidence,
                    false,
                    flags.repo_id.as_deref(),
                );
            }
        }

        report
    }

    fn build_source_block(&self, frames: &[Frame]) -> Option<String> {
        let innermost: Vec<&Frame> = frames.iter().rev().take(3).collect();
        if innermost.is_empty() {
            return None;
        }
        let mut block = String::new();
        for frame in innermost {
            let window = self.source_reader.read_default(&frame.file_path, frame.line_number);
            if !window.exists {
                continue;
            }
            block.push_str(&format!("{}:{}\n", window.file_path, window.error_line));
            for (idx, line) in window.lines.iter().enumerate() {
                block.push_str(&format!("{}: {line}\n", window.start_line + idx as u32));
            }
            block.push('\n');
        }
        (!block.is_empty()).then_some(block)
    }

    fn collect_vcs_contexts(&self, frames: &[Frame], flags: &DiagnoseFlags) -> Vec<VcsContext> {
        if flags.skip_vcs || !self.config.vcs_enabled {
            return Vec::new();
        }
        frames
            .iter()
            .rev()
            .filter(|f| is_local_path(&f.file_path))
            .take(3)
            .map(context_for_frame)
            .collect()
    }

    /// Split `raw` via the chain splitter and diagnose each link
    /// independently, exposing the root-cause (first) and final (last) links.
    pub fn diagnose_chain(&self, raw: &str, flags: &DiagnoseFlags) -> ChainResult {
        let links: Vec<ChainLink> = parse_exception_chain(raw);
        let reports = links.iter().map(|link| self.diagnose(&link.trace_text, flags)).collect();
        ChainResult { reports }
    }

    /// Extract independent traces from `blob` and diagnose each in
    /// parallel, aggregating a severity rollup. A panic analyzing any one
    /// trace is caught and surfaces as a tier-0 error report rather than
    /// aborting the batch.
    pub fn diagnose_batch(&self, blob: &str, flags: &DiagnoseFlags) -> BatchResult {
        let traces = extract_tracebacks(blob);
        let reports: Vec<DiagnosisReport> = traces
            .par_iter()
            .map(|trace| {
                catch_unwind(AssertUnwindSafe(|| self.diagnose(trace, flags))).unwrap_or_else(|_| {
                    warn!("panic while diagnosing a batch trace; emitting error report");
                    DiagnosisReport::unrecognized("InternalError", "analysis panicked for this trace")
                })
            })
            .collect();
        BatchResult::new(reports)
    }
}

/// The canonical error line: last non-empty line for python/node/rust,
/// first matching candidate line for go/jvm/solidity.
fn extract_error_line(raw: &str, language: LanguageTag) -> &str {
    match language {
        LanguageTag::Go => raw.lines().find(|l| l.trim_start().starts_with("panic:")).unwrap_or_default(),
        LanguageTag::Jvm => raw
            .lines()
            .find(|l| l.contains("Exception") || l.contains("Error"))
            .unwrap_or_default(),
        LanguageTag::Solidity => raw.lines().find(|l| l.to_lowercase().contains("revert") || l.contains("Error")).unwrap_or_default(),
        _ => raw.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default(),
    }
}

fn split_error_line(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((kind, rest)) => (kind.trim().to_owned(), rest.trim().to_owned()),
        None => (line.trim().to_owned(), String::new()),
    }
}

/// Text the pattern matcher runs against: whole trace for languages whose
/// signature tables key on structural tokens spread across the trace,
/// error line alone for python/node.
fn pattern_match_text<'a>(raw: &'a str, error_line: &'a str, language: LanguageTag) -> &'a str {
    match language {
        LanguageTag::Python | LanguageTag::Node => error_line,
        _ => raw,
    }
}

fn is_local_path(path: &str) -> bool {
    !path.contains("site-packages") && !path.contains("/lib/python") && !path.contains("node_modules")
}

fn build_vcs_block(contexts: &[VcsContext]) -> Option<String> {
    if contexts.is_empty() {
        return None;
    }
    let mut block = String::new();
    for ctx in contexts {
        if let Some(blame) = &ctx.blame {
            block.push_str(&format!(
                "{}:{} — {} ({}): {}\n",
                ctx.frame.file_path, ctx.frame.line_number, blame.author, blame.summary, blame.content.trim()
            ));
        } else if let Some(err) = &ctx.error {
            block.push_str(&format!("{}: {err}\n", ctx.frame.file_path));
        }
    }
    (!block.is_empty()).then_some(block)
}

fn format_project_profile(profile: &ProjectProfile) -> String {
    format!(
        "root: {}\nlanguages: {}\nframeworks: {}\npackage manager: {}",
        profile.name,
        profile.languages.join(", "),
        profile.frameworks.join(", "),
        profile.package_manager.clone().unwrap_or_else(|| "unknown".to_owned()),
    )
}

fn format_memory_recall(entries: &[crate::types::MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("- [{}] {} (confidence {:.2})", e.language, e.root_cause, e.confidence))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalyzerConfig::default(), ProviderRegistry::new(), None)
    }

    #[test]
    fn falls_back_to_pattern_match_without_model_providers() {
        let raw = "Traceback (most recent call last):\n  File \"app.py\", line 3, in f\nKeyError: 'user_id'";
        let report = analyzer().diagnose(raw, &DiagnoseFlags::default());
        assert_eq!(report.tier, 1);
        assert!(report.root_cause.contains("user_id"));
    }

    #[test]
    fn tier_zero_fallback_when_nothing_matches() {
        let raw = "Traceback (most recent call last):\n  File \"app.py\", line 3, in f\nTotallyMadeUpError: nope";
        let report = analyzer().diagnose(raw, &DiagnoseFlags::default());
        assert_eq!(report.tier, 0);
    }

    #[test]
    fn chain_diagnosis_exposes_root_and_final() {
        let raw = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\nKeyError: 'x'\n\nThe above exception was the direct cause of the following exception:\n\nTraceback (most recent call last):\n  File \"a.py\", line 5, in g\nZeroDivisionError: division by zero";
        let result = analyzer().diagnose_chain(raw, &DiagnoseFlags::default());
        assert_eq!(result.reports.len(), 2);
        assert!(result.root_cause().unwrap().root_cause.contains('x'));
        assert!(result.final_exception().unwrap().root_cause.to_lowercase().contains("zero"));
    }

    #[test]
    fn batch_diagnosis_tallies_severity() {
        let blob = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\nKeyError: 'x'\n\nTraceback (most recent call last):\n  File \"b.py\", line 2, in g\nModuleNotFoundError: No module named 'nope'\n";
        let result = analyzer().diagnose_batch(blob, &DiagnoseFlags::default());
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.severity_counts.medium + result.severity_counts.high, 2);
    }

    #[test]
    fn extract_error_line_uses_last_line_for_python() {
        let raw = "Traceback (most recent call last):\n  File \"a.py\", line 1\nKeyError: 'x'";
        assert_eq!(extract_error_line(raw, LanguageTag::Python), "KeyError: 'x'");
    }

    #[test]
    fn extract_error_line_finds_panic_token_for_go() {
        let raw = "some noise\npanic: boom\ngoroutine 1 [running]:";
        assert_eq!(extract_error_line(raw, LanguageTag::Go), "panic: boom");
    }
}
