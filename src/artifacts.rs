//! Artifact discovery and path containment.
//!
//! Tool output is a loosely specified external contract: tools announce the
//! files they produced in lines shaped `<Label>: <path>`. This module owns
//! that marker grammar and the two containment policies — discovery-time
//! (tool root only) and serve-time (job sandbox or tool root). Candidates
//! that fail containment are dropped silently; a misbehaving tool must not
//! surface errors to clients.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Marker grammar v1: `<Label>: <path>` with three known label families.
/// Extend the alternation when tools grow new families.
fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(Markdown|Word doc|Research data saved)\s*:\s*(.+)$").expect("marker regex")
    })
}

/// Parses a log line for a produced-file mention. Returns the display label
/// and the raw path text.
pub fn parse_marker(line: &str) -> Option<(&'static str, &str)> {
    let caps = marker().captures(line)?;
    let label = match caps.get(1)?.as_str() {
        "Markdown" => "Markdown",
        "Word doc" => "Word",
        "Research data saved" => "Research JSON",
        _ => "File",
    };
    Some((label, caps.get(2)?.as_str().trim()))
}

/// Resolves a path a tool claims to have written. Relative candidates are
/// joined onto the tool root. Returns `None` unless the canonicalized path
/// stays inside the root and is an existing regular file.
pub fn resolve_tool_artifact(tool_root: &Path, raw: &str) -> Option<PathBuf> {
    let candidate = Path::new(raw.trim());
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        tool_root.join(candidate)
    };
    let resolved = joined.canonicalize().ok()?;
    let root = tool_root.canonicalize().ok()?;
    if !resolved.starts_with(&root) {
        return None;
    }
    if !resolved.is_file() {
        return None;
    }
    Some(resolved)
}

/// Serve-time check: stored artifact paths are re-validated, never trusted.
/// The canonicalized path must sit under the job's sandbox directory or the
/// owning tool's root.
pub fn allowed_for_job(sandbox_dir: &Path, tool_root: Option<&Path>, path: &Path) -> bool {
    let resolved = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => return false,
    };
    let mut roots = Vec::new();
    if let Ok(root) = sandbox_dir.canonicalize() {
        roots.push(root);
    }
    if let Some(root) = tool_root.and_then(|r| r.canonicalize().ok()) {
        roots.push(root);
    }
    roots.iter().any(|root| resolved.starts_with(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn marker_labels_map_to_families() {
        assert_eq!(
            parse_marker("Markdown: report.md"),
            Some(("Markdown", "report.md"))
        );
        assert_eq!(
            parse_marker("Word doc : out/brief.docx"),
            Some(("Word", "out/brief.docx"))
        );
        assert_eq!(
            parse_marker("Research data saved: /data/research.json"),
            Some(("Research JSON", "/data/research.json"))
        );
    }

    #[test]
    fn marker_matches_mid_line() {
        assert_eq!(
            parse_marker("[12:30:01] Markdown: report.md"),
            Some(("Markdown", "report.md"))
        );
    }

    #[test]
    fn ordinary_lines_have_no_marker() {
        assert_eq!(parse_marker("crunching numbers..."), None);
        assert_eq!(parse_marker("Markdown report written"), None);
    }

    #[test]
    fn relative_candidate_inside_root_resolves() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("report.md"), "# hi").unwrap();
        let resolved = resolve_tool_artifact(root.path(), "report.md").unwrap();
        assert!(resolved.ends_with("report.md"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn absolute_candidate_inside_root_resolves() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("report.md");
        fs::write(&file, "# hi").unwrap();
        assert!(resolve_tool_artifact(root.path(), file.to_str().unwrap()).is_some());
    }

    #[test]
    fn traversal_out_of_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("tool");
        fs::create_dir(&root).unwrap();
        fs::write(tmp.path().join("outside.md"), "nope").unwrap();
        assert!(resolve_tool_artifact(&root, "../outside.md").is_none());
    }

    #[test]
    fn symlink_escape_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("tool");
        fs::create_dir(&root).unwrap();
        fs::write(tmp.path().join("outside.md"), "nope").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("outside.md"), root.join("link.md")).unwrap();
        assert!(resolve_tool_artifact(&root, "link.md").is_none());
    }

    #[test]
    fn directories_and_missing_files_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("subdir")).unwrap();
        assert!(resolve_tool_artifact(root.path(), "subdir").is_none());
        assert!(resolve_tool_artifact(root.path(), "missing.md").is_none());
    }

    #[test]
    fn serve_time_roots_are_sandbox_and_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = tmp.path().join("sandbox");
        let tool = tmp.path().join("tool");
        fs::create_dir_all(&sandbox).unwrap();
        fs::create_dir_all(&tool).unwrap();
        fs::write(sandbox.join("a.md"), "a").unwrap();
        fs::write(tool.join("b.md"), "b").unwrap();
        fs::write(tmp.path().join("c.md"), "c").unwrap();

        assert!(allowed_for_job(&sandbox, Some(&tool), &sandbox.join("a.md")));
        assert!(allowed_for_job(&sandbox, Some(&tool), &tool.join("b.md")));
        assert!(!allowed_for_job(&sandbox, Some(&tool), &tmp.path().join("c.md")));
        assert!(!allowed_for_job(&sandbox, None, &tool.join("b.md")));
    }
}
