//! Parsers for git plumbing output.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::VcsError;
use crate::models::CommitEntry;

/// Separator emitted before each commit SHA by [`LAST_COMMIT_FORMAT`].
pub const COMMIT_MARKER: char = '\u{1}';

/// `--format` for the name-only log used to find last-touching commits.
pub const LAST_COMMIT_FORMAT: &str = "--format=%x01%H";

/// `--format` for per-file history: `<sha>\t<committer date, strict ISO>`.
pub const HISTORY_FORMAT: &str = "--format=%H%x09%cI";

/// A blob entry from `git ls-tree -r -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBlob {
    pub path: String,
    pub blob_sha: String,
}

/// Parse NUL-terminated `git ls-tree -r -z` output, keeping blobs only.
///
/// Each record is `<mode> SP <type> SP <object> TAB <path>`. Submodule
/// (`commit`) entries are skipped.
pub fn parse_ls_tree(output: &str) -> Result<Vec<TreeBlob>, VcsError> {
    let mut blobs = Vec::new();
    for record in output.split('\0').filter(|r| !r.is_empty()) {
        let (meta, path) = record
            .split_once('\t')
            .ok_or_else(|| VcsError::ParseError(format!("malformed ls-tree record: {record}")))?;
        let mut fields = meta.split_whitespace();
        let (_mode, kind, sha) = match (fields.next(), fields.next(), fields.next()) {
            (Some(mode), Some(kind), Some(sha)) => (mode, kind, sha),
            _ => {
                return Err(VcsError::ParseError(format!(
                    "malformed ls-tree header: {meta}"
                )))
            }
        };
        if kind != "blob" {
            debug!(path, kind, "skipping non-blob tree entry");
            continue;
        }
        blobs.push(TreeBlob {
            path: path.to_string(),
            blob_sha: sha.to_string(),
        });
    }
    Ok(blobs)
}

/// Parse `git log -z --name-only` output produced with [`LAST_COMMIT_FORMAT`].
///
/// Paths are NUL-terminated and never C-quoted. A commit header is
/// `<marker><sha>` followed by a newline and the first path of that commit.
/// The log is newest first, so the first commit listed for a path is the
/// last one that touched it.
pub fn parse_last_commits(output: &str) -> HashMap<String, String> {
    let mut last_commits = HashMap::new();
    let mut current: Option<&str> = None;
    for token in output.split('\0') {
        let mut rest = token;
        if let Some(idx) = rest.find(COMMIT_MARKER) {
            let header = &rest[idx + COMMIT_MARKER.len_utf8()..];
            let (sha, first_path) = header.split_once('\n').unwrap_or((header, ""));
            current = Some(sha.trim());
            rest = first_path;
        }
        let path = rest.strip_prefix('\n').unwrap_or(rest);
        if path.is_empty() {
            continue;
        }
        match current {
            Some(sha) => {
                last_commits
                    .entry(path.to_string())
                    .or_insert_with(|| sha.to_string());
            }
            None => warn!(path, "path listed before any commit header"),
        }
    }
    last_commits
}

/// Parse per-file history produced with [`HISTORY_FORMAT`].
pub fn parse_commit_log(output: &str) -> Result<Vec<CommitEntry>, VcsError> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (sha, date) = line
                .split_once('\t')
                .ok_or_else(|| VcsError::ParseError(format!("malformed log line: {line}")))?;
            let date = DateTime::parse_from_rfc3339(date.trim())
                .map_err(|e| VcsError::ParseError(format!("bad commit date '{date}': {e}")))?
                .with_timezone(&Utc);
            Ok(CommitEntry::new(sha.trim(), date))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_tree() {
        let output = "100644 blob aaa111\tsrc/a.ts\0\
                      160000 commit bbb222\tvendor/lib\0\
                      100755 blob ccc333\tscripts/run me.sh\0";
        let blobs = parse_ls_tree(output).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].path, "src/a.ts");
        assert_eq!(blobs[0].blob_sha, "aaa111");
        assert_eq!(blobs[1].path, "scripts/run me.sh");
    }

    #[test]
    fn test_parse_ls_tree_malformed() {
        assert!(matches!(
            parse_ls_tree("garbage\0"),
            Err(VcsError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_last_commits_keeps_newest() {
        let output = "\u{1}c3\nsrc/a.ts\0\0\u{1}c2\nsrc/b.ts\0src/a.ts\0\0\u{1}c1\nREADME.md\0";
        let map = parse_last_commits(output);
        assert_eq!(map.get("src/a.ts").map(String::as_str), Some("c3"));
        assert_eq!(map.get("src/b.ts").map(String::as_str), Some("c2"));
        assert_eq!(map.get("README.md").map(String::as_str), Some("c1"));
    }

    #[test]
    fn test_parse_last_commits_keeps_special_names_raw() {
        let output = "\u{1}c2\nwe\"ird.txt\0tab\there.txt\0\0\u{1}c1\nback\\slash.txt\0";
        let map = parse_last_commits(output);
        assert_eq!(map.get("we\"ird.txt").map(String::as_str), Some("c2"));
        assert_eq!(map.get("tab\there.txt").map(String::as_str), Some("c2"));
        assert_eq!(map.get("back\\slash.txt").map(String::as_str), Some("c1"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_parse_last_commits_empty_commit() {
        // a commit with no paths (e.g. a merge) just moves the cursor
        let output = "\u{1}c3\n\0\u{1}c2\na.ts\0";
        let map = parse_last_commits(output);
        assert_eq!(map.get("a.ts").map(String::as_str), Some("c2"));
    }

    #[test]
    fn test_parse_commit_log() {
        let output = "h2\t2024-03-02T10:00:00+01:00\nh1\t2024-03-01T09:00:00Z\n";
        let log = parse_commit_log(output).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sha, "h2");
        assert_eq!(log[0].date.to_rfc3339(), "2024-03-02T09:00:00+00:00");
        assert!(parse_commit_log("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_commit_log_bad_date() {
        assert!(parse_commit_log("h1\tyesterday\n").is_err());
    }
}
