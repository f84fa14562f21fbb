//! Locating transcript files on disk.
//!
//! Claude writes `<root>/<project-dir>/<session-id>.jsonl`, where the project
//! dir is derived from the working directory. Codex writes
//! `<root>/YYYY/MM/DD/rollout-*.jsonl` and records its working directory in
//! the first (`session_meta`) line.

use crate::agent::Provider;
use crate::config::SESSION_META_PREFIX_BYTES;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Codex day directories consulted by the periodic project scan.
pub const SCAN_LOOKBACK_DAYS: usize = 2;
/// Codex day directories consulted when resyncing or discovering.
pub const SEARCH_LOOKBACK_DAYS: usize = 7;

/// Claude's project directory name for a working directory: every character
/// other than an ASCII letter, digit or `-` becomes `-`.
pub fn project_dir_name(workdir: &Path) -> String {
    workdir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

pub fn claude_project_dir(root: &Path, workdir: &Path) -> PathBuf {
    root.join(project_dir_name(workdir))
}

/// The transcript a claude session started with `--session-id` will write.
pub fn claude_transcript_path(root: &Path, workdir: &Path, session_id: &str) -> PathBuf {
    claude_project_dir(root, workdir).join(format!("{}.jsonl", session_id))
}

/// Transcripts under `root` that belong to `workdir`.
///
/// For codex only the `lookback_days` most recent day directories are
/// searched. Unreadable directories yield nothing rather than an error.
pub fn list_transcripts(
    root: &Path,
    provider: Provider,
    workdir: &Path,
    lookback_days: usize,
) -> Vec<PathBuf> {
    match provider {
        Provider::Claude => jsonl_files(&claude_project_dir(root, workdir)),
        Provider::Codex => codex_day_dirs(root, lookback_days)
            .iter()
            .flat_map(|dir| jsonl_files(dir))
            .filter(|path| is_rollout(path) && session_cwd_matches(path, workdir))
            .collect(),
    }
}

/// Most recently modified of `paths`.
pub fn newest(paths: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    paths
        .into_iter()
        .filter_map(|path| modified(&path).map(|mtime| (mtime, path)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Sort oldest first by modification time.
pub fn sort_by_mtime(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|path| modified(path));
}

pub fn modified(path: &Path) -> Option<DateTime<Utc>> {
    let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}

fn is_rollout(path: &Path) -> bool {
    Provider::infer_from_path(path) == Provider::Codex
}

fn jsonl_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

/// Numeric subdirectories of `dir`, newest (largest) first.
fn numeric_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let number = entry.file_name().to_str()?.parse::<u32>().ok()?;
            Some((number, entry.path()))
        })
        .collect();
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    dirs.into_iter().map(|(_, path)| path).collect()
}

/// The `limit` most recent `YYYY/MM/DD` directories under `root`.
pub fn codex_day_dirs(root: &Path, limit: usize) -> Vec<PathBuf> {
    let mut days = Vec::new();
    for year in numeric_subdirs(root) {
        for month in numeric_subdirs(&year) {
            for day in numeric_subdirs(&month) {
                if days.len() == limit {
                    return days;
                }
                days.push(day);
            }
        }
    }
    days
}

/// Whether a codex transcript's `session_meta` names `workdir` as its cwd.
/// Only the first [`SESSION_META_PREFIX_BYTES`] are read.
pub fn session_cwd_matches(path: &Path, workdir: &Path) -> bool {
    match session_cwd(path) {
        Some(cwd) => Path::new(&cwd) == workdir,
        None => false,
    }
}

fn session_cwd(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut prefix = Vec::with_capacity(SESSION_META_PREFIX_BYTES);
    file.take(SESSION_META_PREFIX_BYTES as u64)
        .read_to_end(&mut prefix)
        .ok()?;
    let newline = prefix.iter().position(|b| *b == b'\n');
    let first_line = &prefix[..newline.unwrap_or(prefix.len())];

    match serde_json::from_slice::<Value>(first_line) {
        Ok(record) => {
            if record.get("type").and_then(Value::as_str) != Some("session_meta") {
                return None;
            }
            record.get("payload")?.get("cwd")?.as_str().map(str::to_string)
        }
        // instructions embedded in session_meta can run past the prefix
        Err(_) if newline.is_none() => cwd_from_truncated(first_line),
        Err(e) => {
            debug!("No session metadata in {}: {}", path.display(), e);
            None
        }
    }
}

/// Pull `cwd` out of a `session_meta` line cut short by the prefix limit.
fn cwd_from_truncated(line: &[u8]) -> Option<String> {
    if !string_values(line, "type").iter().any(|value| value == "session_meta") {
        return None;
    }
    string_values(line, "cwd").into_iter().next()
}

/// Every string value stored under `"key"` in a possibly incomplete JSON
/// text. Escaped quotes inside other strings never match.
fn string_values(line: &[u8], key: &str) -> Vec<String> {
    let needle = format!("\"{}\"", key);
    let needle = needle.as_bytes();
    let mut values = Vec::new();
    let mut from = 0;
    while let Some(pos) = line[from..].windows(needle.len()).position(|w| w == needle) {
        let start = from + pos;
        from = start + needle.len();
        if start > 0 && line[start - 1] == b'\\' {
            continue;
        }
        let Some(rest) = line[from..].trim_ascii_start().strip_prefix(b":") else {
            continue;
        };
        let mut de = serde_json::Deserializer::from_slice(rest.trim_ascii_start());
        if let Ok(value) = String::deserialize(&mut de) {
            values.push(value);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rollout(root: &Path, day: &str, name: &str, cwd: &str) -> PathBuf {
        let dir = root.join(day);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let meta = serde_json::json!({"type": "session_meta", "payload": {"id": name, "cwd": cwd}});
        std::fs::write(&path, format!("{}\n", meta)).unwrap();
        path
    }

    #[test]
    fn project_dir_name_replaces_separators() {
        assert_eq!(project_dir_name(Path::new("/home/me/my_app.v2")), "-home-me-my-app-v2");
        assert_eq!(project_dir_name(Path::new("/srv/app-1")), "-srv-app-1");
    }

    #[test]
    fn claude_transcripts_listed_per_project() {
        let root = TempDir::new().unwrap();
        let workdir = Path::new("/work/app");
        let expected = claude_transcript_path(root.path(), workdir, "abc");
        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
        std::fs::write(&expected, "").unwrap();
        std::fs::write(expected.with_file_name("notes.txt"), "").unwrap();

        let other = claude_transcript_path(root.path(), Path::new("/work/other"), "def");
        std::fs::create_dir_all(other.parent().unwrap()).unwrap();
        std::fs::write(&other, "").unwrap();

        assert_eq!(list_transcripts(root.path(), Provider::Claude, workdir, 0), vec![expected]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("absent");
        assert!(list_transcripts(&missing, Provider::Claude, Path::new("/w"), 2).is_empty());
        assert!(list_transcripts(&missing, Provider::Codex, Path::new("/w"), 2).is_empty());
    }

    #[test]
    fn codex_filtered_by_cwd_and_recency() {
        let root = TempDir::new().unwrap();
        let recent = rollout(root.path(), "2026/10/16", "rollout-b.jsonl", "/work/app");
        rollout(root.path(), "2026/10/16", "rollout-c.jsonl", "/work/other");
        let yesterday = rollout(root.path(), "2026/10/15", "rollout-a.jsonl", "/work/app");
        rollout(root.path(), "2026/09/30", "rollout-old.jsonl", "/work/app");

        let found = list_transcripts(root.path(), Provider::Codex, Path::new("/work/app"), 2);
        assert_eq!(found, vec![recent, yesterday]);

        let wider = list_transcripts(root.path(), Provider::Codex, Path::new("/work/app"), 7);
        assert_eq!(wider.len(), 3);
    }

    #[test]
    fn day_dirs_ordered_newest_first() {
        let root = TempDir::new().unwrap();
        for day in ["2025/12/31", "2026/01/02", "2026/01/10", "2026/02/01"] {
            std::fs::create_dir_all(root.path().join(day)).unwrap();
        }
        let days = codex_day_dirs(root.path(), 3);
        assert_eq!(
            days,
            vec![
                root.path().join("2026/02/01"),
                root.path().join("2026/01/10"),
                root.path().join("2026/01/02"),
            ]
        );
    }

    #[test]
    fn session_meta_must_be_first_line() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("rollout-x.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"event_msg\",\"payload\":{}}\n{\"type\":\"session_meta\",\"payload\":{\"cwd\":\"/w\"}}\n",
        )
        .unwrap();
        assert!(!session_cwd_matches(&path, Path::new("/w")));
    }

    #[test]
    fn oversized_session_meta_still_matched() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("rollout-big.jsonl");
        let instructions = "a".repeat(SESSION_META_PREFIX_BYTES + 4000);
        // written by hand: key order matters once the line is cut
        let meta = format!(
            r#"{{"timestamp":"2026-10-16T09:00:00Z","type":"session_meta","payload":{{"id":"x","cwd":"/work/app","instructions":"{}"}}}}"#,
            instructions
        );
        std::fs::write(&path, format!("{}\n", meta)).unwrap();

        assert!(session_cwd_matches(&path, Path::new("/work/app")));
        assert!(!session_cwd_matches(&path, Path::new("/work/other")));
    }

    #[test]
    fn truncated_line_needs_session_meta_type() {
        let line = br#"{"type":"event_msg","payload":{"cwd":"/w","text":"aaaa"#;
        assert_eq!(cwd_from_truncated(line), None);

        let quoted = br#"{"type":"session_meta","payload":{"instructions":"say \"cwd\": \"/x\"","cwd":"/w","more":"aa"#;
        assert_eq!(cwd_from_truncated(quoted), Some("/w".to_string()));
    }
}
