//! Language detection by weighted signature scoring.
//!
//! Each [`LanguageTag`] has a small set of regexes that, when matched
//! against a raw trace, contribute a fixed weight to that language's
//! score. The highest-scoring language wins; ties are broken by
//! [`LanguageTag::DETECTION_ORDER`]. A trace that matches nothing scores
//! zero everywhere and is tagged [`LanguageTag::Unknown`].

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::LanguageTag;

struct Signature {
    pattern: Regex,
    weight: u32,
}

lazy_static! {
    static ref PYTHON_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"Traceback \(most recent call last\):").unwrap(), weight: 10 },
        Signature { pattern: Regex::new(r#"File "[^"]+", line \d+"#).unwrap(), weight: 8 },
        Signature { pattern: Regex::new(r"^\w*(Error|Exception|Warning): ").unwrap(), weight: 3 },
    ];
    static ref NODE_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"^\s*at \S+ \(.+:\d+:\d+\)").unwrap(), weight: 8 },
        Signature { pattern: Regex::new(r"^(TypeError|RangeError|ReferenceError|SyntaxError)\b").unwrap(), weight: 6 },
        Signature { pattern: Regex::new(r"node:internal/").unwrap(), weight: 7 },
        Signature { pattern: Regex::new(r"UnhandledPromiseRejection").unwrap(), weight: 9 },
    ];
    static ref RUST_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"thread '[^']+' panicked at").unwrap(), weight: 10 },
        Signature { pattern: Regex::new(r"note: run with `RUST_BACKTRACE=1`").unwrap(), weight: 9 },
        Signature { pattern: Regex::new(r"^\s*\d+:\s+0x[0-9a-f]+").unwrap(), weight: 4 },
    ];
    static ref GO_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"^panic: ").unwrap(), weight: 9 },
        Signature { pattern: Regex::new(r"^goroutine \d+ \[[^\]]+\]:").unwrap(), weight: 10 },
        Signature { pattern: Regex::new(r"\.go:\d+ \+0x[0-9a-f]+").unwrap(), weight: 6 },
    ];
    static ref JVM_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"^Exception in thread").unwrap(), weight: 10 },
        Signature { pattern: Regex::new(r"^\s*at [\w.$]+\([\w.]+\.java:\d+\)").unwrap(), weight: 9 },
        Signature { pattern: Regex::new(r"^Caused by: ").unwrap(), weight: 5 },
        Signature { pattern: Regex::new(r"\.(java|kt):\d+\)").unwrap(), weight: 4 },
    ];
    static ref SOLIDITY_SIGNATURES: Vec<Signature> = vec![
        Signature { pattern: Regex::new(r"revert(ed)?\b").unwrap(), weight: 6 },
        Signature { pattern: Regex::new(r"\.sol:\d+").unwrap(), weight: 9 },
        Signature { pattern: Regex::new(r"VM Exception while processing transaction").unwrap(), weight: 10 },
    ];
}

fn score(signatures: &[Signature], raw: &str) -> u32 {
    signatures
        .iter()
        .filter(|sig| sig.pattern.is_match(raw))
        .map(|sig| sig.weight)
        .sum()
}

/// Classify `raw` into the language whose signatures best match it.
///
/// Returns [`LanguageTag::Unknown`] when no signature matches at all.
pub fn detect_language(raw: &str) -> LanguageTag {
    let scores: Vec<(LanguageTag, u32)> = vec![
        (LanguageTag::Python, score(&PYTHON_SIGNATURES, raw)),
        (LanguageTag::Node, score(&NODE_SIGNATURES, raw)),
        (LanguageTag::Rust, score(&RUST_SIGNATURES, raw)),
        (LanguageTag::Go, score(&GO_SIGNATURES, raw)),
        (LanguageTag::Jvm, score(&JVM_SIGNATURES, raw)),
        (LanguageTag::Solidity, score(&SOLIDITY_SIGNATURES, raw)),
    ];

    let best = LanguageTag::DETECTION_ORDER
        .iter()
        .filter_map(|tag| scores.iter().find(|(t, _)| t == tag).copied())
        .max_by_key(|(_, s)| *s);

    match best {
        Some((tag, s)) if s > 0 => tag,
        _ => LanguageTag::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_python_traceback() {
        let raw = "Traceback (most recent call last):\n  File \"app.py\", line 10, in <module>\nKeyError: 'x'";
        assert_eq!(detect_language(raw), LanguageTag::Python);
    }

    #[test]
    fn detects_node_stack() {
        let raw = "TypeError: Cannot read properties of undefined\n    at Object.<anonymous> (/app/index.js:5:3)";
        assert_eq!(detect_language(raw), LanguageTag::Node);
    }

    #[test]
    fn detects_rust_panic() {
        let raw = "thread 'main' panicked at 'index out of bounds', src/main.rs:4:5\nnote: run with `RUST_BACKTRACE=1` environment variable to display a backtrace";
        assert_eq!(detect_language(raw), LanguageTag::Rust);
    }

    #[test]
    fn detects_go_panic() {
        let raw = "panic: runtime error: invalid memory address\n\ngoroutine 1 [running]:\nmain.main()\n\t/app/main.go:10 +0x1a";
        assert_eq!(detect_language(raw), LanguageTag::Go);
    }

    #[test]
    fn detects_jvm_exception() {
        let raw = "Exception in thread \"main\" java.lang.NullPointerException\n\tat com.example.Main.main(Main.java:7)";
        assert_eq!(detect_language(raw), LanguageTag::Jvm);
    }

    #[test]
    fn detects_solidity_revert() {
        let raw = "Error: VM Exception while processing transaction: reverted with reason string 'insufficient balance' at Contract.sol:42";
        assert_eq!(detect_language(raw), LanguageTag::Solidity);
    }

    #[test]
    fn unknown_for_plain_text() {
        assert_eq!(detect_language("nothing interesting here"), LanguageTag::Unknown);
    }

    #[test]
    fn python_outscores_generic_noise() {
        let raw = "Traceback (most recent call last):\n  File \"app.py\", line 1, in <module>\nValueError: bad";
        assert_eq!(detect_language(raw), LanguageTag::Python);
    }
}
