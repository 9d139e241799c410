//! In-place variable substitution in staged files.
//!
//! Tokens of the form `#{Name}` are replaced with the value of `Name`.
//! Tokens naming an unknown variable are left as they are.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::glob::{self, GlobError};

/// Matches `#{Name}` tokens.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{([^{}\r\n]+)\}").expect("valid regex"));

/// Errors from variable substitution.
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    /// A substitution pattern could not be expanded.
    #[error(transparent)]
    Glob(#[from] GlobError),

    /// A matched file could not be read or written.
    #[error("Failed to substitute variables in {path}: {source}")]
    Io {
        /// File being rewritten.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Rewrites staged files in place.
pub trait SubstituteInFiles: Send + Sync {
    /// Runs substitution on every file under `base` matched by any of
    /// `patterns`, returning the number of files rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`SubstitutionError`] if a pattern is invalid or a file
    /// cannot be rewritten.
    fn substitute(&self, base: &Path, patterns: &[String]) -> Result<usize, SubstitutionError>;
}

/// Replaces `#{Name}` tokens from a fixed variable set.
#[derive(Debug, Clone, Default)]
pub struct TemplateSubstitutor {
    variables: BTreeMap<String, String>,
}

impl TemplateSubstitutor {
    /// Creates a substitutor over `variables`.
    #[must_use]
    pub const fn new(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }

    /// Replaces known tokens in `text`. Returns `None` when nothing
    /// changed.
    #[must_use]
    pub fn render(&self, text: &str) -> Option<String> {
        let mut changed = false;
        let rendered = TOKEN.replace_all(text, |caps: &Captures<'_>| {
            self.variables.get(caps[1].trim()).map_or_else(
                || caps[0].to_string(),
                |value| {
                    changed = true;
                    value.clone()
                },
            )
        });
        changed.then(|| rendered.into_owned())
    }
}

impl SubstituteInFiles for TemplateSubstitutor {
    fn substitute(&self, base: &Path, patterns: &[String]) -> Result<usize, SubstitutionError> {
        let mut rewritten = 0;
        for pattern in patterns {
            let matches = glob::expand(base, pattern)?;
            if matches.is_empty() {
                log::debug!("Substitution pattern '{pattern}' matched no files");
            }
            for file in matches {
                let text = std::fs::read_to_string(&file.path).map_err(|e| SubstitutionError::Io {
                    path: file.path.display().to_string(),
                    source: e,
                })?;
                let Some(rendered) = self.render(&text) else {
                    continue;
                };
                std::fs::write(&file.path, rendered).map_err(|e| SubstitutionError::Io {
                    path: file.path.display().to_string(),
                    source: e,
                })?;
                log::info!("Performed variable substitution on {}", file.path.display());
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substitutor() -> TemplateSubstitutor {
        let mut variables = BTreeMap::new();
        variables.insert("Environment".to_string(), "production".to_string());
        variables.insert("Port".to_string(), "8080".to_string());
        TemplateSubstitutor::new(variables)
    }

    #[test]
    fn renders_known_tokens_and_keeps_unknown() {
        let rendered = substitutor()
            .render("env=#{Environment} port=#{ Port } other=#{Missing}")
            .unwrap();
        assert_eq!(rendered, "env=production port=8080 other=#{Missing}");
    }

    #[test]
    fn render_without_tokens_is_unchanged() {
        assert!(substitutor().render("plain text #{Missing}").is_none());
    }

    #[test]
    fn substitutes_matched_files_in_place() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("config")).unwrap();
        std::fs::write(tmp.path().join("config/app.json"), "{\"env\":\"#{Environment}\"}").unwrap();
        std::fs::write(tmp.path().join("config/static.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("index.html"), "#{Environment}").unwrap();

        let rewritten = substitutor()
            .substitute(tmp.path(), &["config/*.json".to_string()])
            .unwrap();

        assert_eq!(rewritten, 1);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("config/app.json")).unwrap(),
            "{\"env\":\"production\"}"
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("index.html")).unwrap(),
            "#{Environment}"
        );
    }
}
