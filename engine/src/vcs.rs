//! Version-control context: blame and recent history for a local frame.
//!
//! All git invocations run through [`run_git`], which enforces a timeout by
//! running the child on a worker thread and giving up on it if it outlives
//! the deadline — git itself is not killed, but its output is ignored and
//! the call site treats it exactly like any other git failure.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{BlameRecord, DiffHunk, Frame, VcsContext};

/// How many commits of recent history are considered.
const HISTORY_DEPTH: usize = 3;
/// Line-range padding, in lines, around the error line for the history query.
const HISTORY_LINE_PADDING: u32 = 5;
/// Hard cap on hunk body lines kept in a [`DiffHunk`].
const HUNK_LINE_CAP: usize = 20;
/// A blame record is "recent" if its commit is within this many days.
const RECENCY_WINDOW_DAYS: i64 = 7;

lazy_static! {
    static ref HUNK_HEADER_RE: Regex =
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap();
}

fn run_git(args: &[&str], cwd: &Path, timeout: Duration) -> Result<Output, String> {
    let (tx, rx) = mpsc::channel();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let cwd = cwd.to_path_buf();
    thread::spawn(move || {
        let result = Command::new("git")
            .args(&args)
            .current_dir(&cwd)
            .output()
            .map_err(|e| e.to_string());
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(format!("git command timed out after {:?}", timeout)),
    }
}

/// Locate the repository root containing `path`, if any.
pub fn find_repo_root(path: &Path) -> Option<String> {
    let dir = if path.is_dir() { path } else { path.parent()? };
    let output = run_git(&["rev-parse", "--show-toplevel"], dir, Duration::from_secs(5)).ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_owned())
}

/// Build VCS context for one local frame: blame of its exact line plus up
/// to [`HISTORY_DEPTH`] recent commits touching the surrounding range.
pub fn context_for_frame(frame: &Frame) -> VcsContext {
    let path = Path::new(&frame.file_path);
    let Some(root) = find_repo_root(path) else {
        return VcsContext::unavailable(frame.clone(), "Not in a git repository");
    };

    let blame = blame_line(&root, &frame.file_path, frame.line_number);
    let diffs = recent_diffs(&root, &frame.file_path, frame.line_number);

    VcsContext { frame: frame.clone(), blame, diffs, repo_root: Some(root), error: None }
}

fn blame_line(root: &str, file: &str, line: u32) -> Option<BlameRecord> {
    let range = format!("{line},{line}");
    let output = run_git(
        &["blame", "--porcelain", "-L", &range, "--", file],
        Path::new(root),
        Duration::from_secs(10),
    )
    .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    parse_porcelain_blame(&text, line)
}

fn parse_porcelain_blame(text: &str, line: u32) -> Option<BlameRecord> {
    let mut commit = String::new();
    let mut author = String::new();
    let mut email = String::new();
    let mut timestamp = None;
    let mut summary = String::new();
    let mut content = String::new();

    for raw_line in text.lines() {
        if let Some(rest) = raw_line.strip_prefix("author ") {
            if !raw_line.starts_with("author-") {
                author = rest.to_owned();
            }
        } else if let Some(rest) = raw_line.strip_prefix("author-mail ") {
            email = rest.trim_matches(['<', '>']).to_owned();
        } else if let Some(rest) = raw_line.strip_prefix("author-time ") {
            if let Ok(epoch) = rest.trim().parse::<i64>() {
                timestamp = DateTime::from_timestamp(epoch, 0);
            }
        } else if let Some(rest) = raw_line.strip_prefix("summary ") {
            summary = rest.to_owned();
        } else if raw_line.starts_with('\t') {
            content = raw_line[1..].to_owned();
        } else if commit.is_empty() {
            if let Some(hash) = raw_line.split_whitespace().next() {
                if hash.len() >= 7 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    commit = hash.to_owned();
                }
            }
        }
    }

    let timestamp = timestamp?;
    let is_recent = (Utc::now() - timestamp).num_days() <= RECENCY_WINDOW_DAYS;
    Some(BlameRecord { commit, author, email, timestamp, line, content, summary, is_recent })
}

fn recent_diffs(root: &str, file: &str, line: u32) -> Vec<DiffHunk> {
    let start = line.saturating_sub(HISTORY_LINE_PADDING).max(1);
    let end = line.saturating_add(HISTORY_LINE_PADDING);
    let range = format!("-L{start},{end}:{file}");

    let output = run_git(
        &["log", &range, "--format=%H|%an|%aI|%s", "--no-patch", &format!("-n{HISTORY_DEPTH}")],
        Path::new(root),
        Duration::from_secs(10),
    );

    let commits = match output {
        Ok(out) if out.status.success() => Some(parse_log_commits(&out, file)),
        _ => None,
    };
    let commits = commits.unwrap_or_else(|| fallback_file_log(root, file));

    commits
        .into_iter()
        .map(|mut hunk| {
            hunk.hunk_text = extract_relevant_hunk(root, &hunk.commit, file, line);
            hunk
        })
        .collect()
}

fn parse_log_commits(output: &Output, file: &str) -> Vec<DiffHunk> {
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '|');
            let commit = parts.next()?.to_owned();
            let author = parts.next()?.to_owned();
            let ts = parts.next()?;
            let message = parts.next().unwrap_or_default().to_owned();
            let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
            Some(DiffHunk { commit, author, timestamp, message, hunk_text: String::new(), path: file.to_owned() })
        })
        .take(HISTORY_DEPTH)
        .collect()
}

fn fallback_file_log(root: &str, file: &str) -> Vec<DiffHunk> {
    let output = run_git(
        &["log", &format!("-n{HISTORY_DEPTH}"), "--format=%H|%an|%aI|%s", "--", file],
        Path::new(root),
        Duration::from_secs(10),
    );
    match output {
        Ok(out) if out.status.success() => parse_log_commits(&out, file),
        _ => Vec::new(),
    }
}

/// Run `git diff <commit>~1 <commit> -- <file>` and return the hunk (header
/// + capped body) whose new-side range overlaps the target line's padded
/// window, or an empty string if no hunk touches it.
fn extract_relevant_hunk(root: &str, commit: &str, file: &str, line: u32) -> String {
    let parent_ref = format!("{commit}~1");
    let output = run_git(
        &["diff", &parent_ref, commit, "--", file],
        Path::new(root),
        Duration::from_secs(10),
    );
    let Ok(output) = output else {
        return String::new();
    };
    if !output.status.success() {
        return String::new();
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let window_start = line.saturating_sub(HISTORY_LINE_PADDING).max(1);
    let window_end = line.saturating_add(HISTORY_LINE_PADDING);

    find_overlapping_hunk(&text, window_start, window_end).map(|h| cap_hunk(&h)).unwrap_or_default()
}

/// Split a unified diff into hunks and return the first one whose new-side
/// line range `[new_start, new_start + new_count)` overlaps `[start, end]`.
fn find_overlapping_hunk(diff_text: &str, start: u32, end: u32) -> Option<String> {
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut hunk_start_idx = None;
    let mut hunks: Vec<(usize, usize)> = Vec::new();

    for (idx, text_line) in lines.iter().enumerate() {
        if text_line.starts_with("@@ ") {
            if let Some(prev) = hunk_start_idx.take() {
                hunks.push((prev, idx));
            }
            hunk_start_idx = Some(idx);
        }
    }
    if let Some(prev) = hunk_start_idx {
        hunks.push((prev, lines.len()));
    }

    for (hunk_start, hunk_end) in hunks {
        let header = lines[hunk_start];
        let Some(caps) = HUNK_HEADER_RE.captures(header) else { continue };
        let Some(new_start) = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok()) else { continue };
        let new_count: u32 = caps.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
        let new_end = new_start + new_count.max(1);

        if new_start <= end && new_end >= start {
            return Some(lines[hunk_start..hunk_end].join("\n"));
        }
    }
    None
}

/// Trim a raw unified-diff hunk's body to [`HUNK_LINE_CAP`] lines, keeping
/// the `@@ ... @@` header.
pub fn cap_hunk(hunk_text: &str) -> String {
    let mut lines = hunk_text.lines();
    let header = lines.next().unwrap_or_default();
    let body: Vec<&str> = lines.take(HUNK_LINE_CAP).collect();
    if body.is_empty() {
        header.to_owned()
    } else {
        format!("{header}\n{}", body.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hunk_header_regex_matches() {
        let caps = HUNK_HEADER_RE.captures("@@ -10,5 +12,7 @@ fn main() {").unwrap();
        assert_eq!(&caps[1], "10");
        assert_eq!(&caps[2], "5");
        assert_eq!(&caps[3], "12");
        assert_eq!(&caps[4], "7");
    }

    #[test]
    fn find_overlapping_hunk_matches_by_new_range() {
        let diff = "diff --git a/x.py b/x.py\n--- a/x.py\n+++ b/x.py\n@@ -1,3 +1,3 @@\n-old\n+new\n context\n@@ -50,2 +50,2 @@\n-foo\n+bar\n";
        let found = find_overlapping_hunk(diff, 1, 6).unwrap();
        assert!(found.starts_with("@@ -1,3 +1,3 @@"));
    }

    #[test]
    fn find_overlapping_hunk_returns_none_when_out_of_range() {
        let diff = "@@ -50,2 +50,2 @@\n-foo\n+bar\n";
        assert!(find_overlapping_hunk(diff, 1, 6).is_none());
    }

    #[test]
    fn cap_hunk_truncates_long_body() {
        let mut hunk = String::from("@@ -1,30 +1,30 @@\n");
        for i in 0..30 {
            hunk.push_str(&format!("+line {i}\n"));
        }
        let capped = cap_hunk(&hunk);
        assert_eq!(capped.lines().count(), HUNK_LINE_CAP + 1);
    }

    #[test]
    fn parse_porcelain_blame_extracts_fields() {
        let text = "abcdef1234567890 1 1 1\nauthor Jane Doe\nauthor-mail <jane@example.com>\nauthor-time 1700000000\nauthor-tz +0000\nsummary Fix the thing\nfilename x.py\n\tdef f(): pass\n";
        let record = parse_porcelain_blame(text, 1).unwrap();
        assert_eq!(record.author, "Jane Doe");
        assert_eq!(record.email, "jane@example.com");
        assert_eq!(record.summary, "Fix the thing");
        assert_eq!(record.content, "def f(): pass");
    }

    #[test]
    fn vcs_context_outside_repo_has_error() {
        let frame = Frame { file_path: "/tmp/does-not-exist-xyz.py".into(), line_number: 1, symbol: None };
        let ctx = context_for_frame(&frame);
        assert!(ctx.error.is_some());
        assert!(!ctx.has_context());
    }
}
