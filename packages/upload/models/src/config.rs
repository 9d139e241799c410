//! Deployment configuration loaded from TOML.
//!
//! ```toml
//! bucket = "artifacts"
//! package = "/deploy/app.1.2.3.zip"
//! target_mode = "MultiFileGlob"
//!
//! [package_identity]
//! id = "app"
//! version = "1.2.3"
//! original_path = "app.1.2.3.zip"
//!
//! [[file_globs]]
//! pattern = "**/*.json"
//! bucket_key_prefix = "config/"
//! tags = { team = "platform" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::TargetSetMode;

/// Canned ACL values the store is known to accept.
pub const CANNED_ACLS: &[&str] = &[
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "aws-exec-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
    "log-delivery-write",
];

/// Whether `value` is one of [`CANNED_ACLS`].
#[must_use]
pub fn is_known_canned_acl(value: &str) -> bool {
    CANNED_ACLS.contains(&value.trim())
}

/// Errors loading a deployment file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read deployment config {path}: {source}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`DeploymentConfig`].
    #[error("Invalid deployment config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete configuration for one deployment run.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Destination bucket. Must be non-blank.
    #[serde(default)]
    pub bucket: String,
    /// Path to the artifact file.
    #[serde(default)]
    pub package: PathBuf,
    /// Directory the package is extracted into. Defaults to the current
    /// working directory.
    #[serde(default)]
    pub staging_directory: Option<PathBuf>,
    /// Raw target mode. See [`DeploymentConfig::mode`].
    #[serde(default)]
    pub target_mode: Option<String>,
    /// Whether content digests can be computed and compared.
    #[serde(default = "default_true")]
    pub content_digest: bool,
    /// Package id/version used to derive the whole-package key.
    #[serde(default)]
    pub package_identity: PackageIdentity,
    /// Options for [`TargetSetMode::EntirePackage`].
    #[serde(default)]
    pub entire_package: PackageOptions,
    /// Selections for [`TargetSetMode::SingleFile`].
    #[serde(default)]
    pub single_files: Vec<SingleFileSelection>,
    /// Selections for [`TargetSetMode::MultiFileGlob`].
    #[serde(default)]
    pub file_globs: Vec<MultiFileSelection>,
    /// Values for `#{Name}` substitution.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Object store connection settings.
    #[serde(default)]
    pub store: StoreConfig,
}

const fn default_true() -> bool {
    true
}

impl DeploymentConfig {
    /// Parses a deployment config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a deployment config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// The active target mode.
    ///
    /// Absent or unrecognised values fall back to
    /// [`TargetSetMode::EntirePackage`].
    #[must_use]
    pub fn mode(&self) -> TargetSetMode {
        self.target_mode
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .and_then(|m| m.parse().ok())
            .unwrap_or_default()
    }

    /// Whether the configured mode string was present but unrecognised.
    #[must_use]
    pub fn has_unknown_mode(&self) -> bool {
        self.target_mode
            .as_deref()
            .map(str::trim)
            .is_some_and(|m| !m.is_empty() && m.parse::<TargetSetMode>().is_err())
    }

    /// The bucket name with surrounding whitespace removed.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        self.bucket.trim()
    }
}

/// Identity of the deployed package.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageIdentity {
    /// Package id (e.g. `"app"`).
    #[serde(default)]
    pub id: String,
    /// Package version (e.g. `"1.2.3"`).
    #[serde(default)]
    pub version: String,
    /// Path the package was originally fetched from; only its extension
    /// is used.
    #[serde(default)]
    pub original_path: Option<String>,
}

/// How the remote key for a selection is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "behaviour", rename_all = "snake_case")]
pub enum BucketKeyBehaviour {
    /// Use the natural key (relative path or package filename).
    #[default]
    Filename,
    /// Prepend a prefix to the natural key.
    FilenameWithCustomPrefix {
        /// Prefix, used verbatim (include a trailing `/` for folders).
        prefix: String,
    },
    /// Use an explicit key.
    Custom {
        /// The key.
        key: String,
    },
}

/// Properties every kind of selection carries onto its targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TargetProperties {
    /// Storage class (e.g. `"STANDARD_IA"`).
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Canned ACL (e.g. `"bucket-owner-full-control"`).
    #[serde(default)]
    pub canned_acl: Option<String>,
    /// Headers and user metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Object tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Options for uploading the package file itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageOptions {
    /// Key behaviour; the natural key is `{id}.{version}{extension}`.
    #[serde(default)]
    pub bucket_key: BucketKeyBehaviour,
    /// Shared target properties.
    #[serde(flatten)]
    pub properties: TargetProperties,
}

/// One explicitly named file inside the extracted package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SingleFileSelection {
    /// Path relative to the staging directory.
    pub path: String,
    /// Key behaviour; the natural key is the relative path.
    #[serde(default)]
    pub bucket_key: BucketKeyBehaviour,
    /// Substitute `#{Name}` variables into the file before upload.
    #[serde(default)]
    pub perform_variable_substitution: bool,
    /// Shared target properties.
    #[serde(flatten)]
    pub properties: TargetProperties,
}

/// A glob over the extracted package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MultiFileSelection {
    /// Glob relative to the staging directory (e.g. `"**/*.json"`).
    pub pattern: String,
    /// Prefix prepended to each matched file's relative path.
    #[serde(default)]
    pub bucket_key_prefix: Option<String>,
    /// Newline-separated globs of files to run substitution on.
    #[serde(default)]
    pub variable_substitution_patterns: Option<String>,
    /// Shared target properties.
    #[serde(flatten)]
    pub properties: TargetProperties,
}

impl MultiFileSelection {
    /// Substitution globs, one per non-blank line.
    #[must_use]
    pub fn substitution_patterns(&self) -> Vec<String> {
        self.variable_substitution_patterns
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Object store connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Region override; otherwise taken from the environment.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_defaults_to_entire_package() {
        let config = DeploymentConfig::from_toml_str(
            r#"
            bucket = " artifacts "
            package = "/deploy/app.1.2.3.zip"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode(), TargetSetMode::EntirePackage);
        assert_eq!(config.bucket_name(), "artifacts");
        assert!(config.content_digest);
        assert_eq!(config.entire_package.bucket_key, BucketKeyBehaviour::Filename);
    }

    #[test]
    fn unknown_mode_falls_back() {
        let config = DeploymentConfig::from_toml_str(
            r#"
            bucket = "b"
            target_mode = "Everything"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode(), TargetSetMode::EntirePackage);
        assert!(config.has_unknown_mode());
    }

    #[test]
    fn parses_selections_with_properties() {
        let config = DeploymentConfig::from_toml_str(
            r#"
            bucket = "b"
            package = "pkg.zip"
            target_mode = "MultiFileGlob"

            [[file_globs]]
            pattern = "**/*.json"
            bucket_key_prefix = "config/"
            variable_substitution_patterns = "a.json\n\n  b/*.json \n"
            storage_class = "STANDARD_IA"
            metadata = { "Content-Type" = "application/json" }
            tags = { team = "platform" }

            [[single_files]]
            path = "web.config"
            perform_variable_substitution = true
            bucket_key = { behaviour = "custom", key = "site/web.config" }
            "#,
        )
        .unwrap();

        assert_eq!(config.mode(), TargetSetMode::MultiFileGlob);
        let glob = &config.file_globs[0];
        assert_eq!(glob.substitution_patterns(), vec!["a.json", "b/*.json"]);
        assert_eq!(glob.properties.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(glob.properties.tags.get("team").map(String::as_str), Some("platform"));

        let single = &config.single_files[0];
        assert!(single.perform_variable_substitution);
        assert_eq!(
            single.bucket_key,
            BucketKeyBehaviour::Custom {
                key: "site/web.config".to_string()
            }
        );
    }

    #[test]
    fn known_canned_acls() {
        assert!(is_known_canned_acl("private"));
        assert!(is_known_canned_acl(" bucket-owner-full-control "));
        assert!(!is_known_canned_acl("everyone"));
    }
}
