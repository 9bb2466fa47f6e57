//! Splits a chained traceback into its constituent [`ChainLink`]s.
//!
//! Python's `raise ... from ...` and bare re-raise inside an `except` block
//! both print a chain separator sentence between tracebacks; Node and Rust
//! print a `Caused by:` line instead. Each separator marks the boundary
//! between one exception's text and the next, and determines the
//! relationship of the segment that follows it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{ChainLink, ChainRelationship};

lazy_static! {
    static ref PY_DIRECT_CAUSE: Regex =
        Regex::new(r"(?m)^The above exception was the direct cause of the following exception:$").unwrap();
    static ref PY_IMPLICIT_CONTEXT: Regex = Regex::new(
        r"(?m)^During handling of the above exception, another exception occurred:$"
    )
    .unwrap();
    static ref NODE_CAUSED_BY: Regex = Regex::new(r"(?m)^Caused by: ").unwrap();
    static ref RUST_CAUSED_BY: Regex = Regex::new(r"(?m)^Caused by:\s*$").unwrap();
}

struct Separator {
    start: usize,
    end: usize,
    relationship: ChainRelationship,
}

fn find_separators(raw: &str) -> Vec<Separator> {
    let mut seps: Vec<Separator> = Vec::new();
    for m in PY_DIRECT_CAUSE.find_iter(raw) {
        seps.push(Separator { start: m.start(), end: m.end(), relationship: ChainRelationship::DirectCause });
    }
    for m in PY_IMPLICIT_CONTEXT.find_iter(raw) {
        seps.push(Separator { start: m.start(), end: m.end(), relationship: ChainRelationship::ImplicitContext });
    }
    for m in NODE_CAUSED_BY.find_iter(raw) {
        seps.push(Separator { start: m.start(), end: m.start(), relationship: ChainRelationship::CausedBy });
    }
    for m in RUST_CAUSED_BY.find_iter(raw) {
        seps.push(Separator { start: m.start(), end: m.end(), relationship: ChainRelationship::CausedBy });
    }
    seps.sort_by_key(|s| s.start);
    seps
}

/// Split `raw` into chain links in source order. A trace with no
/// separators is returned as a single root link.
pub fn parse_exception_chain(raw: &str) -> Vec<ChainLink> {
    let separators = find_separators(raw);
    if separators.is_empty() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![ChainLink { trace_text: trimmed.to_owned(), relationship: ChainRelationship::Root, index: 0 }];
    }

    let mut links = Vec::new();
    let mut cursor = 0usize;
    let mut next_relationship = ChainRelationship::Root;

    for sep in &separators {
        let segment = raw[cursor..sep.start].trim();
        if !segment.is_empty() {
            links.push(ChainLink { trace_text: segment.to_owned(), relationship: next_relationship, index: links.len() as u32 });
        }
        cursor = sep.end;
        next_relationship = sep.relationship;
    }

    let tail = raw[cursor..].trim();
    if !tail.is_empty() {
        links.push(ChainLink { trace_text: tail.to_owned(), relationship: next_relationship, index: links.len() as u32 });
    }

    links
}

/// Whether `raw` contains any recognized chain separator.
pub fn is_chained_traceback(raw: &str) -> bool {
    !find_separators(raw).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_trace_is_one_root_link() {
        let raw = "Traceback (most recent call last):\n  File \"a.py\", line 1\nValueError: x";
        let links = parse_exception_chain(raw);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].relationship, ChainRelationship::Root);
        assert!(!is_chained_traceback(raw));
    }

    #[test]
    fn direct_cause_splits_into_two_links() {
        let raw = "Traceback (most recent call last):\n  File \"a.py\", line 1\nKeyError: 'x'\n\nThe above exception was the direct cause of the following exception:\n\nTraceback (most recent call last):\n  File \"a.py\", line 5\nRuntimeError: wrapped";
        let links = parse_exception_chain(raw);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].relationship, ChainRelationship::Root);
        assert_eq!(links[1].relationship, ChainRelationship::DirectCause);
        assert!(is_chained_traceback(raw));
    }

    #[test]
    fn implicit_context_is_detected() {
        let raw = "Traceback (most recent call last):\nValueError: x\n\nDuring handling of the above exception, another exception occurred:\n\nTraceback (most recent call last):\nTypeError: y";
        let links = parse_exception_chain(raw);
        assert_eq!(links[1].relationship, ChainRelationship::ImplicitContext);
    }

    #[test]
    fn node_caused_by_splits() {
        let raw = "Error: outer failure\n    at foo (/app/a.js:1:1)\nCaused by: Error: inner failure\n    at bar (/app/b.js:2:2)";
        let links = parse_exception_chain(raw);
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].relationship, ChainRelationship::CausedBy);
    }

    #[test]
    fn empty_input_yields_no_links() {
        assert!(parse_exception_chain("   \n  ").is_empty());
    }
}
