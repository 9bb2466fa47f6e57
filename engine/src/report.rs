//! Report assembly: collapses verbose intermediate context (VCS detail, in
//! particular) into the compact fields [`DiagnosisReport`] actually
//! serializes, and aggregates per-trace reports for chain and batch runs.

use chrono::Utc;

use crate::types::{DiagnosisReport, Severity, VcsContext};

/// Build the compact `vcs_summary` string: short hash, author, age in
/// days, and a count of recent commits touching the line range. `None`
/// when there is nothing to summarize.
pub fn summarize_vcs(ctx: &VcsContext) -> Option<String> {
    let blame = ctx.blame.as_ref()?;
    let short_hash = blame.commit.chars().take(7).collect::<String>();
    let age_days = (Utc::now() - blame.timestamp).num_days().max(0);
    Some(format!(
        "{short_hash} by {} ({age_days}d ago); {} recent commit(s) nearby",
        blame.author,
        ctx.diffs.len(),
    ))
}

/// Attach a `vcs_summary` derived from `ctx` to `report`, returning the
/// updated report. A no-context `VcsContext` leaves the field unset.
pub fn with_vcs_summary(mut report: DiagnosisReport, ctx: Option<&VcsContext>) -> DiagnosisReport {
    report.vcs_summary = ctx.and_then(summarize_vcs);
    report
}

/// Counts of each severity across a set of reports (chain links or batch
/// traces).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SeverityCounts {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl SeverityCounts {
    pub fn tally(reports: &[DiagnosisReport]) -> Self {
        let mut counts = Self::default();
        for report in reports {
            match report.severity {
                Severity::Low => counts.low += 1,
                Severity::Medium => counts.medium += 1,
                Severity::High => counts.high += 1,
                Severity::Critical => counts.critical += 1,
            }
        }
        counts
    }
}

/// Result of diagnosing a chained traceback: each link's report, in order,
/// plus pointers to the root-cause and final links.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainResult {
    pub reports: Vec<DiagnosisReport>,
}

impl ChainResult {
    pub fn root_cause(&self) -> Option<&DiagnosisReport> {
        self.reports.first()
    }

    pub fn final_exception(&self) -> Option<&DiagnosisReport> {
        self.reports.last()
    }
}

/// Result of diagnosing a batch blob: one report per extracted trace, plus
/// a severity rollup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResult {
    pub reports: Vec<DiagnosisReport>,
    pub severity_counts: SeverityCounts,
}

impl BatchResult {
    pub fn new(reports: Vec<DiagnosisReport>) -> Self {
        let severity_counts = SeverityCounts::tally(&reports);
        Self { reports, severity_counts }
    }
}

/// Serialize any JSON-serializable report shape to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlameRecord, Frame};
    use chrono::Duration;

    fn sample_report(severity: Severity) -> DiagnosisReport {
        DiagnosisReport {
            error_type: "KeyError".into(),
            error_message: "'x'".into(),
            file: None,
            line: None,
            symbol: None,
            root_cause: "c".into(),
            suggested_fix: "f".into(),
            severity,
            tier: 1,
            model: None,
            architecture_notes: None,
            vcs_summary: None,
        }
    }

    #[test]
    fn summarize_vcs_formats_age_and_author() {
        let ctx = VcsContext {
            frame: Frame { file_path: "a.py".into(), line_number: 1, symbol: None },
            blame: Some(BlameRecord {
                commit: "abcdef1234567890".into(),
                author: "Jane".into(),
                email: "jane@example.com".into(),
                timestamp: Utc::now() - Duration::days(3),
                line: 1,
                content: "x = 1".into(),
                summary: "init".into(),
                is_recent: true,
            }),
            diffs: vec![],
            repo_root: Some("/repo".into()),
            error: None,
        };
        let summary = summarize_vcs(&ctx).unwrap();
        assert!(summary.contains("abcdef1"));
        assert!(summary.contains("Jane"));
        assert!(summary.contains("3d ago"));
    }

    #[test]
    fn summarize_vcs_none_without_blame() {
        let ctx = VcsContext::unavailable(Frame { file_path: "a.py".into(), line_number: 1, symbol: None }, "err");
        assert!(summarize_vcs(&ctx).is_none());
    }

    #[test]
    fn severity_counts_tally_correctly() {
        let reports = vec![sample_report(Severity::Low), sample_report(Severity::Low), sample_report(Severity::Critical)];
        let counts = SeverityCounts::tally(&reports);
        assert_eq!(counts.low, 2);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.medium, 0);
    }

    #[test]
    fn chain_result_exposes_root_and_final() {
        let chain = ChainResult { reports: vec![sample_report(Severity::Medium), sample_report(Severity::High)] };
        assert_eq!(chain.root_cause().unwrap().severity, Severity::Medium);
        assert_eq!(chain.final_exception().unwrap().severity, Severity::High);
    }

    #[test]
    fn batch_result_json_roundtrips() {
        let batch = BatchResult::new(vec![sample_report(Severity::Low)]);
        let json = to_json(&batch).unwrap();
        assert!(json.contains("\"low\""));
    }
}
