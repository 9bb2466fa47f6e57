//! Extracts independent trace strings from an arbitrary blob (a log file).
//!
//! This is content extraction only — it performs no diagnosis. Python
//! traceback headers are preferred as anchors; chained exceptions between
//! two anchors are kept together as one block. When no Python anchors are
//! found, Node and Rust panic starts are tried in that order.

use lazy_static::lazy_static;
use regex::Regex;

use crate::chain::is_chained_traceback;

lazy_static! {
    static ref PY_TB_START: Regex = Regex::new(r"(?m)^Traceback \(most recent call last\):$").unwrap();
    static ref NODE_ERROR_START: Regex = Regex::new(r"(?m)^\w*Error: .+\n\s+at\s").unwrap();
    static ref RUST_PANIC_START: Regex = Regex::new(r"(?m)^thread '.*' panicked at").unwrap();
    static ref ERROR_LINE: Regex = Regex::new(r"^\s*(\w+(?:Error|Exception|Warning)\b.*|panic: .*)").unwrap();
    static ref TRACEBACK_BODY_LINE: Regex = Regex::new(r#"^\s*(File "|at |\d+:\s+0x|\t)"#).unwrap();
}

/// Extract an ordered list of independent trace strings from `blob`.
pub fn extract_tracebacks(blob: &str) -> Vec<String> {
    let python_starts: Vec<usize> = PY_TB_START.find_iter(blob).map(|m| m.start()).collect();
    if !python_starts.is_empty() {
        return extract_python_blocks(blob, &python_starts);
    }

    if let Some(m) = NODE_ERROR_START.find(blob) {
        return extract_generic_blocks(blob, &[m.start()], &NODE_ERROR_START);
    }
    let rust_starts: Vec<usize> = RUST_PANIC_START.find_iter(blob).map(|m| m.start()).collect();
    if !rust_starts.is_empty() {
        return extract_generic_blocks(blob, &rust_starts, &RUST_PANIC_START);
    }

    Vec::new()
}

fn extract_python_blocks(blob: &str, starts: &[usize]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < starts.len() {
        let block_start = starts[i];
        let mut block_end_idx = i;
        // Merge forward while the gap between this anchor and the next contains a chain separator.
        while block_end_idx + 1 < starts.len() {
            let gap = &blob[starts[block_end_idx]..starts[block_end_idx + 1]];
            if is_chained_traceback(gap) {
                block_end_idx += 1;
            } else {
                break;
            }
        }
        let end = if block_end_idx + 1 < starts.len() { starts[block_end_idx + 1] } else { blob.len() };
        let raw_block = &blob[block_start..end];
        let trimmed = trim_trailing_noise(raw_block);
        if !trimmed.is_empty() {
            blocks.push(trimmed);
        }
        i = block_end_idx + 1;
    }
    blocks
}

fn extract_generic_blocks(blob: &str, starts: &[usize], _anchor: &Regex) -> Vec<String> {
    let mut blocks = Vec::new();
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(blob.len());
        let trimmed = trim_trailing_noise(&blob[start..end]);
        if !trimmed.is_empty() {
            blocks.push(trimmed);
        }
    }
    blocks
}

/// Right-trim a block to the last line that looks like a traceback body
/// line or an error line, dropping trailing unrelated log noise.
fn trim_trailing_noise(block: &str) -> String {
    let lines: Vec<&str> = block.lines().collect();
    let mut last_relevant = None;
    for (idx, line) in lines.iter().enumerate() {
        if TRACEBACK_BODY_LINE.is_match(line) || ERROR_LINE.is_match(line) {
            last_relevant = Some(idx);
        }
    }
    match last_relevant {
        Some(idx) => lines[..=idx].join("\n").trim().to_owned(),
        None => block.trim().to_owned(),
    }
}

/// Aggregate result of analyzing an entire batch: per-trace reports plus
/// a rollup of how many of each severity were produced. The analyzer
/// orchestrator (§4.L) populates `reports`; this module only produces the
/// `traces` list that feeds it.
#[derive(Debug, Clone, Default)]
pub struct BatchExtraction {
    pub traces: Vec<String>,
}

pub fn extract_batch(blob: &str) -> BatchExtraction {
    BatchExtraction { traces: extract_tracebacks(blob) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_two_independent_python_tracebacks() {
        let blob = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\nKeyError: 'x'\n\nTraceback (most recent call last):\n  File \"b.py\", line 2, in g\nValueError: y\n";
        let traces = extract_tracebacks(blob);
        assert_eq!(traces.len(), 2);
        assert!(traces[0].contains("KeyError"));
        assert!(traces[1].contains("ValueError"));
    }

    #[test]
    fn keeps_chained_traceback_as_one_block() {
        let blob = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\nKeyError: 'x'\n\nThe above exception was the direct cause of the following exception:\n\nTraceback (most recent call last):\n  File \"a.py\", line 5, in g\nRuntimeError: wrapped\n";
        let traces = extract_tracebacks(blob);
        assert_eq!(traces.len(), 1);
        assert!(traces[0].contains("KeyError"));
        assert!(traces[0].contains("RuntimeError"));
    }

    #[test]
    fn falls_back_to_rust_panic_start() {
        let blob = "some log noise\nthread 'main' panicked at 'boom', src/main.rs:1:1\nnote: run with `RUST_BACKTRACE=1`\n";
        let traces = extract_tracebacks(blob);
        assert_eq!(traces.len(), 1);
        assert!(traces[0].contains("panicked"));
    }

    #[test]
    fn trims_trailing_unrelated_log_lines() {
        let block = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\nKeyError: 'x'\n2026-01-01 00:00:00 INFO server started\n";
        let trimmed = trim_trailing_noise(block);
        assert!(!trimmed.contains("server started"));
    }

    #[test]
    fn no_anchors_yields_empty() {
        assert!(extract_tracebacks("just a plain log line, nothing to see").is_empty());
    }
}
