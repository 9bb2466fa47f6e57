//! Per-language stack frame extraction.
//!
//! Each language gets its own small parser producing [`Frame`] values in a
//! language-appropriate order (innermost-first or innermost-last — see the
//! per-language notes below). When the language is [`LanguageTag::Unknown`],
//! all parsers are tried in [`LanguageTag::DETECTION_ORDER`] and the first
//! non-empty result wins.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Frame, LanguageTag};

lazy_static! {
    static ref PYTHON_FRAME_RE: Regex =
        Regex::new(r#"File "([^"]+)", line (\d+), in (\S+)"#).unwrap();
    static ref NODE_FRAME_NAMED_RE: Regex =
        Regex::new(r"at (\S+) \((.+):(\d+):(\d+)\)").unwrap();
    static ref NODE_FRAME_ANON_RE: Regex = Regex::new(r"at (.+):(\d+):(\d+)").unwrap();
    static ref RUST_FRAME_RE: Regex = Regex::new(r"((?:[\w./\\-]+)\.rs):(\d+)").unwrap();
    static ref GO_FRAME_RE: Regex = Regex::new(r"\t((?:[\w./\\-]+)\.go):(\d+)").unwrap();
    static ref JVM_FRAME_RE: Regex =
        Regex::new(r"at ([\w.$]+)\(([\w$]+\.(?:java|kt)):(\d+)\)").unwrap();
    static ref SOLIDITY_FRAME_RE: Regex = Regex::new(r"--> ((?:[\w./\\-]+)\.sol):(\d+)").unwrap();
}

/// Extract frames for a trace already known to be `language`.
///
/// Frame ordering matches the convention of the language itself: Python
/// and Rust list innermost last (as the interpreter/panic handler does);
/// Node, Go, and JVM list innermost first.
pub fn extract_frames(raw: &str, language: LanguageTag) -> Vec<Frame> {
    match language {
        LanguageTag::Python => extract_python(raw),
        LanguageTag::Node => extract_node(raw),
        LanguageTag::Rust => extract_rust(raw),
        LanguageTag::Go => extract_go(raw),
        LanguageTag::Jvm => extract_jvm(raw),
        LanguageTag::Solidity => extract_solidity(raw),
        LanguageTag::Unknown => LanguageTag::DETECTION_ORDER
            .iter()
            .map(|&lang| extract_frames(raw, lang))
            .find(|frames| !frames.is_empty())
            .unwrap_or_default(),
    }
}

fn parse_line(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn extract_python(raw: &str) -> Vec<Frame> {
    PYTHON_FRAME_RE
        .captures_iter(raw)
        .filter_map(|c| {
            let line = parse_line(&c[2])?;
            Some(Frame {
                file_path: c[1].to_owned(),
                line_number: line,
                symbol: Some(c[3].to_owned()),
            })
        })
        .collect()
}

fn extract_node(raw: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("at ") {
            continue;
        }
        if let Some(c) = NODE_FRAME_NAMED_RE.captures(trimmed) {
            let path = &c[2];
            if path.starts_with("node:") || path.starts_with('<') {
                continue;
            }
            if let Some(ln) = parse_line(&c[3]) {
                frames.push(Frame {
                    file_path: path.to_owned(),
                    line_number: ln,
                    symbol: Some(c[1].to_owned()),
                });
            }
        } else if let Some(c) = NODE_FRAME_ANON_RE.captures(trimmed) {
            let path = &c[1];
            if path.starts_with("node:") || path.starts_with('<') {
                continue;
            }
            if let Some(ln) = parse_line(&c[2]) {
                frames.push(Frame {
                    file_path: path.to_owned(),
                    line_number: ln,
                    symbol: None,
                });
            }
        }
    }
    frames
}

fn extract_rust(raw: &str) -> Vec<Frame> {
    RUST_FRAME_RE
        .captures_iter(raw)
        .filter_map(|c| {
            let path = &c[1];
            if path.contains("/rustc/") || path.contains("library/std") {
                return None;
            }
            let line = parse_line(&c[2])?;
            Some(Frame { file_path: path.to_owned(), line_number: line, symbol: None })
        })
        .collect()
}

fn extract_go(raw: &str) -> Vec<Frame> {
    GO_FRAME_RE
        .captures_iter(raw)
        .filter_map(|c| {
            let path = &c[1];
            if path.contains("/go/src/") {
                return None;
            }
            let line = parse_line(&c[2])?;
            Some(Frame { file_path: path.to_owned(), line_number: line, symbol: None })
        })
        .collect()
}

fn extract_jvm(raw: &str) -> Vec<Frame> {
    JVM_FRAME_RE
        .captures_iter(raw)
        .filter_map(|c| {
            let line = parse_line(&c[3])?;
            Some(Frame {
                file_path: c[2].to_owned(),
                line_number: line,
                symbol: Some(c[1].to_owned()),
            })
        })
        .collect()
}

fn extract_solidity(raw: &str) -> Vec<Frame> {
    SOLIDITY_FRAME_RE
        .captures_iter(raw)
        .filter_map(|c| {
            let line = parse_line(&c[2])?;
            Some(Frame { file_path: c[1].to_owned(), line_number: line, symbol: None })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_frames_in_source_order_innermost_last() {
        let raw = r#"Traceback (most recent call last):
  File "app.py", line 10, in main
    handler()
  File "handlers.py", line 42, in handler
    raise KeyError('x')
KeyError: 'x'"#;
        let frames = extract_frames(raw, LanguageTag::Python);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].file_path, "app.py");
        assert_eq!(frames[1].file_path, "handlers.py");
        assert_eq!(frames[1].line_number, 42);
        assert_eq!(frames[1].symbol.as_deref(), Some("handler"));
    }

    #[test]
    fn node_frames_skip_internal_and_anonymous() {
        let raw = "TypeError: oops\n    at foo (/app/index.js:5:3)\n    at node:internal/process/task_queues:95:5\n    at <anonymous>";
        let frames = extract_frames(raw, LanguageTag::Node);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file_path, "/app/index.js");
        assert_eq!(frames[0].symbol.as_deref(), Some("foo"));
    }

    #[test]
    fn rust_frames_drop_stdlib_paths() {
        let raw = "thread 'main' panicked at 'oops', src/main.rs:10:5\n   0: core::panicking::panic\n             at /rustc/abc/library/std/src/panic.rs:1\n   1: myapp::run\n             at src/main.rs:10";
        let frames = extract_frames(raw, LanguageTag::Rust);
        assert!(frames.iter().all(|f| f.file_path == "src/main.rs"));
        assert!(!frames.is_empty());
    }

    #[test]
    fn go_frames_drop_goroot() {
        let raw = "panic: boom\n\ngoroutine 1 [running]:\nmain.main()\n\t/app/main.go:10 +0x1a\nruntime.gopanic()\n\t/usr/local/go/src/runtime/panic.go:838 +0x207";
        let frames = extract_frames(raw, LanguageTag::Go);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file_path, "/app/main.go");
    }

    #[test]
    fn jvm_frames_innermost_first() {
        let raw = "Exception in thread \"main\" java.lang.NullPointerException\n\tat com.example.Main.run(Main.java:7)\n\tat com.example.Main.main(Main.java:3)";
        let frames = extract_frames(raw, LanguageTag::Jvm);
        assert_eq!(frames[0].line_number, 7);
        assert_eq!(frames[1].line_number, 3);
    }

    #[test]
    fn solidity_single_frame() {
        let raw = "Error: VM Exception while processing transaction: reverted\n  --> contracts/Token.sol:42";
        let frames = extract_frames(raw, LanguageTag::Solidity);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file_path, "contracts/Token.sol");
        assert_eq!(frames[0].line_number, 42);
    }

    #[test]
    fn unknown_language_falls_back_to_first_matching_parser() {
        let raw = r#"File "a.py", line 1, in f"#;
        let frames = extract_frames(raw, LanguageTag::Unknown);
        assert_eq!(frames.len(), 1);
    }
}
