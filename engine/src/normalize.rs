//! Canonicalization and fingerprinting of raw traceback text.
//!
//! Before a trace is matched, chained, or stored, it is reduced to a
//! canonical form: the ordered, de-duplicated list of `basename:line`
//! tokens found anywhere in the raw text, joined with newlines. All
//! surrounding prose (exception messages, absolute path prefixes, stack
//! frame decoration) is discarded, so that two tracebacks touching the
//! same call sites hash identically regardless of wording or checkout
//! path. The fingerprint is a SHA-256 digest of that canonical form, used
//! both to dedupe identical traces within a batch and as the lookup key
//! in the memory store.

use std::collections::HashSet;

use regex::Regex;
use sha2::{Digest, Sha256};

use lazy_static::lazy_static;

lazy_static! {
    /// Matches a `File "path", line N` (Python) or `path:N` (generic) reference.
    static ref FILE_LINE_RE: Regex = Regex::new(
        r#"(?:File "([^"]+)", line (\d+))|(?:([^\s":]+\.[a-zA-Z]+):(\d+))"#
    )
    .expect("FILE_LINE_RE is a valid pattern");
}

/// Length, in bytes, of the snippet kept alongside a fingerprint for
/// display purposes (memory recall previews, duplicate summaries).
pub const SNIPPET_LEN: usize = 500;

/// Reduce `raw` to its canonical form: the ordered, de-duplicated list of
/// `basename:line` tokens it references, one per line, first occurrence
/// order preserved.
pub fn canonicalize(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for caps in FILE_LINE_RE.captures_iter(raw) {
        let token = if let (Some(path), Some(line)) = (caps.get(1), caps.get(2)) {
            format!("{}:{}", basename(path.as_str()), line.as_str())
        } else if let (Some(path), Some(line)) = (caps.get(3), caps.get(4)) {
            format!("{}:{}", basename(path.as_str()), line.as_str())
        } else {
            continue;
        };

        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }

    tokens.join("\n")
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// SHA-256 fingerprint of the canonical form, hex-encoded.
///
/// Two raw traces that differ only in absolute path prefixes or
/// surrounding prose, but reference the same ordered call sites, yield
/// the same fingerprint; this is the dedup and memory-lookup key
/// throughout the pipeline.
pub fn fingerprint(raw: &str) -> String {
    let canonical = canonicalize(raw);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// First [`SNIPPET_LEN`] bytes of the canonical form, truncated on a char
/// boundary so it never splits a multi-byte UTF-8 sequence.
pub fn snippet(raw: &str) -> String {
    let canonical = canonicalize(raw);
    if canonical.len() <= SNIPPET_LEN {
        return canonical;
    }
    let mut end = SNIPPET_LEN;
    while !canonical.is_char_boundary(end) {
        end -= 1;
    }
    canonical[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_python_path_prefix() {
        let raw = r#"File "/home/alice/project/app/views.py", line 42, in handler"#;
        assert_eq!(canonicalize(raw), "views.py:42");
    }

    #[test]
    fn canonicalize_strips_generic_path_prefix() {
        let raw = "at /usr/src/app/src/lib.rs:88:5";
        assert_eq!(canonicalize(raw), "lib.rs:88");
    }

    #[test]
    fn canonicalize_dedups_repeated_tokens_preserving_first_occurrence() {
        let raw = r#"File "/a/views.py", line 42, in handler
File "/b/utils.py", line 7, in helper
File "/c/views.py", line 42, in handler"#;
        assert_eq!(canonicalize(raw), "views.py:42\nutils.py:7");
    }

    #[test]
    fn canonicalize_ignores_text_with_no_file_line_tokens() {
        assert_eq!(canonicalize("ZeroDivisionError: division by zero"), "");
    }

    #[test]
    fn fingerprint_is_stable_across_absolute_path_prefixes() {
        let a = r#"File "/home/alice/app/views.py", line 42, in handler
KeyError: 'user_id'"#;
        let b = r#"File "/var/ci/workspace/app/views.py", line 42, in handler
KeyError: 'user_id'"#;
        assert_eq!(fingerprint(a), fingerprint(b));
    }

    #[test]
    fn fingerprint_is_stable_across_differing_surrounding_prose() {
        let a = r#"Traceback (most recent call last):
  File "/home/alice/app/views.py", line 42, in handler
    raise KeyError('user_id')
KeyError: 'user_id'"#;
        let b = r#"File "/var/ci/app/views.py", line 42, in handler"#;
        assert_eq!(fingerprint(a), fingerprint(b));
    }

    #[test]
    fn fingerprint_differs_when_line_number_differs() {
        let a = r#"File "/home/alice/app/views.py", line 42, in handler"#;
        let b = r#"File "/home/alice/app/views.py", line 43, in handler"#;
        assert_ne!(fingerprint(a), fingerprint(b));
    }

    #[test]
    fn fingerprint_is_sixty_four_hex_chars() {
        let fp = fingerprint("ZeroDivisionError: division by zero");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn snippet_truncates_to_snippet_len() {
        let raw = (0..200)
            .map(|n| format!(r#"File "/home/alice/app/module_{n}.py", line {n}, in f"#))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(canonicalize(&raw).len() > SNIPPET_LEN);
        assert_eq!(snippet(&raw).len(), SNIPPET_LEN);
    }

    #[test]
    fn snippet_preserves_short_input() {
        let raw = r#"File "/home/alice/app/views.py", line 42, in handler"#;
        assert_eq!(snippet(raw), "views.py:42");
    }
}
