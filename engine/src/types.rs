//! Core type definitions for the diagnosis engine.
//!
//! These types form the data model described in the system specification:
//! a [`LanguageTag`] classifies a trace, a [`Frame`] pinpoints a location
//! within it, and the various context types ([`SourceWindow`], [`VcsContext`],
//! [`ProjectProfile`]) feed a [`DiagnosisReport`] — the immutable result of
//! running the pipeline end to end.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// The runtime a trace was emitted by.
///
/// Assigned by weighted signature scoring in the language detector. Ties
/// are broken in the declared order of this enum.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    Python,
    Node,
    Rust,
    Go,
    Jvm,
    Solidity,
    #[default]
    Unknown,
}

impl LanguageTag {
    /// Declared tie-break order used by the detector (§4.B).
    pub const DETECTION_ORDER: [LanguageTag; 6] = [
        LanguageTag::Python,
        LanguageTag::Node,
        LanguageTag::Rust,
        LanguageTag::Go,
        LanguageTag::Jvm,
        LanguageTag::Solidity,
    ];
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Node => write!(f, "node"),
            Self::Rust => write!(f, "rust"),
            Self::Go => write!(f, "go"),
            Self::Jvm => write!(f, "jvm"),
            Self::Solidity => write!(f, "solidity"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Diagnosis severity, ordered from least to most urgent.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A file/line (and optionally symbol) location extracted from a trace.
///
/// `line_number` is 1-based. `file_path` may be absolute, relative, or a
/// pseudo-path (package-internal frames never map to a readable file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub file_path: String,
    pub line_number: u32,
    pub symbol: Option<String>,
}

/// A bounded, immutable window of source lines around an error location.
#[pyclass(get_all)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWindow {
    pub file_path: String,
    pub error_line: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub lines: Vec<String>,
    pub exists: bool,
}

impl SourceWindow {
    /// An empty window for a file that could not be read.
    pub fn absent(file_path: &str, error_line: u32) -> Self {
        Self {
            file_path: file_path.to_owned(),
            error_line,
            start_line: error_line,
            end_line: error_line,
            lines: Vec::new(),
            exists: false,
        }
    }
}

/// `git blame --porcelain` result for a single line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameRecord {
    pub commit: String,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub line: u32,
    pub content: String,
    pub summary: String,
    /// Whether `timestamp` is within 7 days of the moment this was computed.
    pub is_recent: bool,
}

/// A capped diff hunk from a commit touching the area around an error line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub commit: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Raw unified-diff hunk text, capped at 20 lines.
    pub hunk_text: String,
    pub path: String,
}

/// Version-control context for a single local frame.
///
/// Either `error` is populated, or `blame`/`diffs`/`repo_root` are — never
/// a meaningful mix of both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsContext {
    pub frame: Frame,
    pub blame: Option<BlameRecord>,
    pub diffs: Vec<DiffHunk>,
    pub repo_root: Option<String>,
    pub error: Option<String>,
}

impl VcsContext {
    pub fn unavailable(frame: Frame, error: impl Into<String>) -> Self {
        Self {
            frame,
            blame: None,
            diffs: Vec::new(),
            repo_root: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn has_context(&self) -> bool {
        self.blame.is_some() || !self.diffs.is_empty()
    }
}

/// Language/framework/dependency intelligence for a project root.
///
/// A value object, cached per absolute root by the project profiler.
#[pyclass(get_all)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub root: String,
    pub name: String,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub deps: HashMap<String, String>,
    pub dev_deps: HashMap<String, String>,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
    pub structure: HashMap<String, String>,
    pub runtime: Option<String>,
    pub package_manager: Option<String>,
}

/// The relationship of a [`ChainLink`] to the link that precedes it.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRelationship {
    Root,
    DirectCause,
    ImplicitContext,
    CausedBy,
}

impl std::fmt::Display for ChainRelationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::DirectCause => write!(f, "direct_cause"),
            Self::ImplicitContext => write!(f, "implicit_context"),
            Self::CausedBy => write!(f, "caused_by"),
        }
    }
}

/// One exception in a chained traceback, in source order.
#[pyclass(get_all)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    pub trace_text: String,
    pub relationship: ChainRelationship,
    pub index: u32,
}

/// The immutable result of diagnosing a single trace.
///
/// `tier` is 0 (no diagnosis), 1 (pattern match), or 2..4 (model tiers in
/// order of capability). A tier-0 report always carries `severity: Medium`
/// per invariant 1.
#[pyclass(get_all)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub error_type: String,
    pub error_message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub symbol: Option<String>,
    pub root_cause: String,
    pub suggested_fix: String,
    pub severity: Severity,
    pub tier: u8,
    pub model: Option<String>,
    pub architecture_notes: Option<String>,
    pub vcs_summary: Option<String>,
}

#[pymethods]
impl DiagnosisReport {
    /// Serialize this report to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a `PyErr` if serialization fails (should not happen for valid data).
    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            pyo3::exceptions::PyValueError::new_err(format!("JSON serialization failed: {e}"))
        })
    }

    fn __repr__(&self) -> String {
        format!(
            "DiagnosisReport(error_type={:?}, severity={}, tier={}, file={:?}, line={:?})",
            self.error_type, self.severity, self.tier, self.file, self.line,
        )
    }
}

impl DiagnosisReport {
    /// A tier-0 report: no backend was able to produce a diagnosis.
    pub fn unrecognized(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            file: None,
            line: None,
            symbol: None,
            root_cause: "No pattern match and no model backend available".to_owned(),
            suggested_fix:
                "Configure a model provider (credentials/SDK) for deeper analysis, or extend the pattern table"
                    .to_owned(),
            severity: Severity::Medium,
            tier: 0,
            model: None,
            architecture_notes: None,
            vcs_summary: None,
        }
    }
}

/// A persisted prior diagnosis, recalled by fuzzy fingerprint match.
#[pyclass(get_all)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub language: String,
    /// 256-bit fingerprint, hex-encoded. Unique across the store.
    pub fingerprint: String,
    /// First 500 bytes of the canonical form.
    pub snippet: String,
    pub severity: Severity,
    pub tier: u8,
    pub root_cause: String,
    pub suggested_fix: String,
    pub confidence: f64,
    pub success: bool,
    pub repo_id: Option<String>,
}

/// Aggregate statistics over a repo's (or the whole store's) memory entries.
#[pyclass(get_all)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoStats {
    pub total_analyses: u32,
    pub avg_confidence: f64,
    pub successful_fixes: u32,
    pub severities: Vec<String>,
    pub success_rate: f64,
}
