//! Path resolution confined to a configured root directory.
//!
//! All untrusted relative paths go through [`safe_join`] before any
//! filesystem access. Containment is checked on path segments, never on raw
//! string prefixes, and symlinks are resolved on both the root and the
//! target so a link pointing outside the root cannot smuggle reads or
//! writes past the boundary. Symlinks created after resolution completes
//! are out of scope.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid path")]
    InvalidPath,
    #[error("path escapes root")]
    PathEscape,
    #[error("resolve path: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalize user input into a slash-separated, rooted-relative path.
///
/// Backslashes become forward slashes, a leading `./` is stripped, and
/// `..` segments are collapsed lexically as if rooted at `/`, so the result
/// can never climb above the joining point. Empty input, `.` and `/` all
/// normalize to the empty string (the root itself).
pub fn normalize_rel_path(input: &str) -> String {
    let cleaned = input.trim().replace('\\', "/");
    let cleaned = cleaned.strip_prefix("./").unwrap_or(&cleaned);
    if cleaned == "." || cleaned == "/" {
        return String::new();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in cleaned.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn within_root(root: &Path, target: &Path) -> bool {
    // Component-wise comparison: "/root-evil" does not live under "/root".
    target == root || target.starts_with(root)
}

fn symlink_aware(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Join `rel` under `root` and refuse any result outside `root`,
/// including escapes through symlinks.
///
/// For paths that do not exist yet (upload destinations), the parent
/// directory is canonicalized and contain-checked instead, since the leaf
/// itself cannot be resolved.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, SandboxError> {
    if rel.contains('\0') {
        return Err(SandboxError::InvalidPath);
    }
    let normalized = normalize_rel_path(rel);
    let root_abs = lexical_absolute(root)?;
    let mut joined = root_abs.clone();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
        joined.push(segment);
    }
    let joined_abs = lexical_absolute(&joined)?;
    if !within_root(&root_abs, &joined_abs) {
        return Err(SandboxError::PathEscape);
    }

    let root_real = symlink_aware(&root_abs);
    if joined_abs.exists() {
        let target_real = symlink_aware(&joined_abs);
        if !within_root(&root_real, &target_real) {
            return Err(SandboxError::PathEscape);
        }
    } else {
        let parent = joined_abs.parent().ok_or(SandboxError::PathEscape)?;
        let parent_real = symlink_aware(parent);
        if !within_root(&root_real, &parent_real) {
            return Err(SandboxError::PathEscape);
        }
    }
    Ok(joined_abs)
}

/// Relative slash-separated path of `absolute` under `root`, if contained.
pub fn rel_path_from_root(root: &Path, absolute: &Path) -> Option<String> {
    let root_abs = lexical_absolute(root).ok()?;
    let abs = lexical_absolute(absolute).ok()?;
    let rel = abs.strip_prefix(&root_abs).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Absolute form of `path` with `.` and `..` resolved lexically,
/// without touching the filesystem beyond the current directory lookup.
fn lexical_absolute(path: &Path) -> Result<PathBuf, SandboxError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_traversal() {
        assert_eq!(normalize_rel_path("a/b/../c"), "a/c");
        assert_eq!(normalize_rel_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize_rel_path("./docs/readme.md"), "docs/readme.md");
        assert_eq!(normalize_rel_path("docs\\sub\\file"), "docs/sub/file");
        assert_eq!(normalize_rel_path(""), "");
        assert_eq!(normalize_rel_path("."), "");
        assert_eq!(normalize_rel_path("/"), "");
        assert_eq!(normalize_rel_path("//a///b/"), "a/b");
    }

    #[test]
    fn safe_join_blocks_traversal() {
        let root = tempfile::tempdir().expect("tempdir");
        let joined = safe_join(root.path(), "../../etc/passwd").expect("normalized under root");
        assert!(joined.starts_with(root.path().canonicalize().unwrap_or_else(|_| root.path().to_path_buf())) || joined.starts_with(root.path()));
    }

    #[test]
    fn safe_join_rejects_nul_bytes() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            safe_join(root.path(), "a\0b"),
            Err(SandboxError::InvalidPath)
        ));
    }

    #[test]
    fn traversal_to_sibling_collapses_inside_root() {
        // ".." collapses lexically before the join, so a sibling directory
        // whose name shares the root as a string prefix stays unreachable.
        let root = tempfile::tempdir().expect("tempdir");
        let sibling = root.path().with_file_name(format!(
            "{}-evil",
            root.path().file_name().unwrap().to_string_lossy()
        ));
        std::fs::create_dir_all(&sibling).expect("sibling dir");
        let rel = format!("../{}", sibling.file_name().unwrap().to_string_lossy());
        let joined = safe_join(root.path(), &rel).expect("collapsed under root");
        assert!(within_root(root.path(), &joined));
        let _ = std::fs::remove_dir_all(sibling);
    }

    #[test]
    fn safe_join_rejects_symlink_escape() {
        let root = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        let link = root.path().join("link");
        if std::os::unix::fs::symlink(outside.path(), &link).is_err() {
            return;
        }
        std::fs::write(outside.path().join("secret.txt"), b"secret").expect("write");
        assert!(matches!(
            safe_join(root.path(), "link/secret.txt"),
            Err(SandboxError::PathEscape)
        ));
    }

    #[test]
    fn safe_join_allows_new_leaf_under_existing_parent() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(root.path().join("uploads")).expect("mkdir");
        let joined = safe_join(root.path(), "uploads/new-file.bin").expect("contained");
        assert!(joined.ends_with("uploads/new-file.bin"));
    }

    #[test]
    fn rel_path_round_trip() {
        let root = tempfile::tempdir().expect("tempdir");
        let abs = safe_join(root.path(), "docs/guide.md").expect("join");
        assert_eq!(
            rel_path_from_root(root.path(), &abs).as_deref(),
            Some("docs/guide.md")
        );
    }
}
