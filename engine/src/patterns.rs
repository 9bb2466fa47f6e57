//! The pattern matcher: curated regex rules per language, each mapping to a
//! templated root cause, suggested fix, and fixed severity.
//!
//! Generalized from a single Python-only rule table into one table per
//! language. Node and Rust have no dedicated table of their own and fall
//! through to the Python table, which also serves unconditionally as the
//! last-resort fallback for any language.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{LanguageTag, Severity};

/// One curated rule: a regex and templates referencing its capture groups
/// as `{m1}`..`{mN}`.
pub struct Pattern {
    pub regex: Regex,
    pub root_cause_template: &'static str,
    pub suggested_fix_template: &'static str,
    pub severity: Severity,
}

fn substitute(template: &str, caps: &regex::Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut key = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                key.push(c2);
            }
            if let Some(rest) = key.strip_prefix('m') {
                if let Ok(idx) = rest.parse::<usize>() {
                    out.push_str(caps.get(idx).map_or("", |m| m.as_str()));
                    continue;
                }
            }
            out.push('{');
            out.push_str(&key);
            out.push('}');
        } else {
            out.push(c);
        }
    }
    out
}

lazy_static! {
    static ref PYTHON_PATTERNS: Vec<Pattern> = vec![
        Pattern {
            regex: Regex::new(r"KeyError: '([^']+)'").unwrap(),
            root_cause_template: "Dictionary access with a missing key '{m1}'",
            suggested_fix_template: "Use .get('{m1}', default) or check `'{m1}' in dict` before indexing",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"AttributeError: '(\w+)' object has no attribute '(\w+)'").unwrap(),
            root_cause_template: "Code called `.{m2}` on a `{m1}` instance that does not define it",
            suggested_fix_template: "Check the object's type before calling `{m2}`, or fix the attribute name",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"TypeError: (\w+)\(\) missing \d+ required positional argument").unwrap(),
            root_cause_template: "Call to `{m1}` is missing required arguments",
            suggested_fix_template: "Pass all required positional arguments to `{m1}`",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"ZeroDivisionError").unwrap(),
            root_cause_template: "Division or modulo by zero",
            suggested_fix_template: "Guard the divisor with a zero check before dividing",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"ModuleNotFoundError: No module named '([^']+)'").unwrap(),
            root_cause_template: "Module '{m1}' is not installed or not on the import path",
            suggested_fix_template: "Install '{m1}' or correct the import path / virtualenv",
            severity: Severity::High,
        },
        Pattern {
            regex: Regex::new(r"ConnectionRefusedError|ConnectionError").unwrap(),
            root_cause_template: "The remote service refused or reset the connection",
            suggested_fix_template: "Verify the target service is running and reachable, and add retry/backoff",
            severity: Severity::High,
        },
        Pattern {
            regex: Regex::new(r"RecursionError").unwrap(),
            root_cause_template: "Function recursion exceeded the interpreter's call-stack limit",
            suggested_fix_template: "Add a base case or convert the recursive call into an iterative loop",
            severity: Severity::High,
        },
    ];
    static ref GO_PATTERNS: Vec<Pattern> = vec![
        Pattern {
            regex: Regex::new(r"invalid memory address or nil pointer dereference").unwrap(),
            root_cause_template: "A nil pointer or interface was dereferenced",
            suggested_fix_template: "Add a nil check before dereferencing the value",
            severity: Severity::High,
        },
        Pattern {
            regex: Regex::new(r"index out of range \[(\d+)\]").unwrap(),
            root_cause_template: "Slice or array index {m1} is out of bounds",
            suggested_fix_template: "Bound-check the index against len() before accessing it",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"concurrent map (read and )?write").unwrap(),
            root_cause_template: "A map was accessed from multiple goroutines without synchronization",
            suggested_fix_template: "Guard the map with a sync.RWMutex or use sync.Map",
            severity: Severity::High,
        },
        Pattern {
            regex: Regex::new(r"integer divide by zero").unwrap(),
            root_cause_template: "Integer division or modulo by zero",
            suggested_fix_template: "Guard the divisor with a zero check before dividing",
            severity: Severity::Critical,
        },
    ];
    static ref JVM_PATTERNS: Vec<Pattern> = vec![
        Pattern {
            regex: Regex::new(r"java\.lang\.NullPointerException").unwrap(),
            root_cause_template: "A null reference was dereferenced",
            suggested_fix_template: "Add a null check, or use Optional to make the absence explicit",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"java\.lang\.ClassCastException: (\S+) cannot be cast to (\S+)").unwrap(),
            root_cause_template: "An instance of {m1} was cast to incompatible type {m2}",
            suggested_fix_template: "Check the runtime type with instanceof before casting",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"java\.lang\.OutOfMemoryError").unwrap(),
            root_cause_template: "The JVM heap was exhausted",
            suggested_fix_template: "Profile memory usage and increase -Xmx, or fix a retention leak",
            severity: Severity::Critical,
        },
    ];
    static ref SOLIDITY_PATTERNS: Vec<Pattern> = vec![
        Pattern {
            regex: Regex::new(r"revert(ed)? with reason string '([^']+)'").unwrap(),
            root_cause_template: "Transaction reverted: {m2}",
            suggested_fix_template: "Satisfy the require/revert condition before sending the transaction",
            severity: Severity::Medium,
        },
        Pattern {
            regex: Regex::new(r"out of gas").unwrap(),
            root_cause_template: "The transaction ran out of gas",
            suggested_fix_template: "Increase the gas limit or reduce the work done in the call",
            severity: Severity::High,
        },
    ];
}

fn table_for(language: LanguageTag) -> &'static [Pattern] {
    match language {
        LanguageTag::Go => &GO_PATTERNS,
        LanguageTag::Jvm => &JVM_PATTERNS,
        LanguageTag::Solidity => &SOLIDITY_PATTERNS,
        _ => &PYTHON_PATTERNS,
    }
}

/// A matched pattern's rendered templates and fixed severity.
pub struct PatternMatch {
    pub root_cause: String,
    pub suggested_fix: String,
    pub severity: Severity,
}

/// Try each pattern for `language` in declaration order against `text`.
///
/// Node and Rust have no dedicated table and fall through directly to the
/// Python table; the Python table is also retried as a last resort when
/// a language-specific table exists but misses.
pub fn match_pattern(text: &str, language: LanguageTag) -> Option<PatternMatch> {
    let primary = table_for(language);
    if let Some(m) = try_table(primary, text) {
        return Some(m);
    }
    if !std::ptr::eq(primary, PYTHON_PATTERNS.as_slice()) {
        return try_table(&PYTHON_PATTERNS, text);
    }
    None
}

fn try_table(table: &[Pattern], text: &str) -> Option<PatternMatch> {
    table.iter().find_map(|pattern| {
        pattern.regex.captures(text).map(|caps| PatternMatch {
            root_cause: substitute(pattern.root_cause_template, &caps),
            suggested_fix: substitute(pattern.suggested_fix_template, &caps),
            severity: pattern.severity,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_python_key_error_with_substitution() {
        let m = match_pattern("KeyError: 'user_id'", LanguageTag::Python).unwrap();
        assert!(m.root_cause.contains("'user_id'"));
        assert_eq!(m.severity, Severity::Medium);
    }

    #[test]
    fn node_falls_through_to_python_table() {
        let m = match_pattern("KeyError: 'x'", LanguageTag::Node).unwrap();
        assert!(m.root_cause.contains("'x'"));
    }

    #[test]
    fn go_matches_its_own_table_before_python_fallback() {
        let m = match_pattern("panic: runtime error: index out of range [5]", LanguageTag::Go).unwrap();
        assert!(m.root_cause.contains('5'));
    }

    #[test]
    fn go_divide_by_zero_is_critical() {
        let m = match_pattern("panic: runtime error: integer divide by zero", LanguageTag::Go).unwrap();
        assert_eq!(m.severity, Severity::Critical);
    }

    #[test]
    fn jvm_critical_severity_fixed() {
        let m = match_pattern("java.lang.OutOfMemoryError: Java heap space", LanguageTag::Jvm).unwrap();
        assert_eq!(m.severity, Severity::Critical);
    }

    #[test]
    fn no_match_returns_none() {
        assert!(match_pattern("totally unrelated text", LanguageTag::Python).is_none());
    }

    #[test]
    fn solidity_revert_reason_substituted() {
        let m = match_pattern("reverted with reason string 'insufficient balance'", LanguageTag::Solidity).unwrap();
        assert!(m.root_cause.contains("insufficient balance"));
    }
}
