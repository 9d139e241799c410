//! Glob expansion relative to a base directory.
//!
//! Patterns use `/` separators and standard glob syntax (`*`, `?`, `**`,
//! `[abc]`, `{a,b}`). `*` never crosses a directory boundary; `**/`
//! matches zero or more directories, so `**/*.json` also matches
//! `a.json` at the root.
//!
//! Each match carries a *mapped* relative path: the path relative to the
//! pattern's literal leading directories. `content/**/*.css` matching
//! `content/site/main.css` maps to `site/main.css`.

use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

/// Errors from glob expansion.
#[derive(Debug, thiserror::Error)]
pub enum GlobError {
    /// The pattern is not valid glob syntax.
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying parse error.
        source: globset::Error,
    },

    /// Walking the directory tree failed.
    #[error("Failed to walk {path}: {source}")]
    Walk {
        /// Directory being walked.
        path: String,
        /// Underlying walk error.
        source: walkdir::Error,
    },
}

/// A file matched by a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the pattern's literal leading directories, with
    /// `/` separators.
    pub mapped_relative_path: String,
}

/// Escapes glob metacharacters so `s` matches literally.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '{' | '}' | '!') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Expands `pattern` against `base`.
///
/// Matches are returned in a stable order (directory walk sorted by file
/// name), so the same tree always yields the same sequence. A pattern
/// that matches nothing yields an empty list.
///
/// # Errors
///
/// Returns [`GlobError::Pattern`] for invalid syntax, or
/// [`GlobError::Walk`] if the tree cannot be read.
pub fn expand(base: &Path, pattern: &str) -> Result<Vec<MatchedFile>, GlobError> {
    let normalized = normalize_pattern(pattern);
    let matcher = GlobBuilder::new(&normalized)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| GlobError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })?
        .compile_matcher();

    let literal_root = literal_prefix(&normalized);
    let walk_root = base.join(&literal_root);
    if !walk_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(&walk_root).sort_by_file_name() {
        let entry = entry.map_err(|e| GlobError::Walk {
            path: walk_root.display().to_string(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        let relative = to_slash_path(relative);
        if !matcher.is_match(&relative) {
            continue;
        }

        let mapped_relative_path = entry
            .path()
            .strip_prefix(&walk_root)
            .map_or_else(|_| relative.clone(), to_slash_path);

        matches.push(MatchedFile {
            path: entry.path().to_path_buf(),
            mapped_relative_path,
        });
    }

    Ok(matches)
}

/// Converts separators to `/` and drops a leading `./`.
fn normalize_pattern(pattern: &str) -> String {
    let pattern = pattern.trim();
    let pattern = if std::path::MAIN_SEPARATOR == '\\' {
        pattern.replace('\\', "/")
    } else {
        pattern.to_string()
    };
    pattern
        .strip_prefix("./")
        .map_or_else(|| pattern.clone(), str::to_string)
}

/// Leading directory segments of `pattern` that contain no glob
/// metacharacters. The final segment is never included.
fn literal_prefix(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut prefix = PathBuf::new();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if segment.is_empty() || segment.contains(['*', '?', '[', ']', '{', '}', '\\']) {
            break;
        }
        prefix.push(segment);
    }
    prefix
}

/// Joins path components with `/`.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
