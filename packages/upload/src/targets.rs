//! Expansion of the deployment configuration into upload targets.
//!
//! The configured [`TargetSetMode`] picks one resolver path. Every path
//! normalizes to [`UploadTarget`], so nothing downstream needs to know
//! which mode produced a target. Variable substitution runs before a
//! target's content digest is computed.

use std::path::{Path, PathBuf};

use s3_deploy_models::config::{
    DeploymentConfig, MultiFileSelection, PackageOptions, SingleFileSelection, TargetProperties,
};
use s3_deploy_models::{ObjectFailurePolicy, TargetSetMode, UploadTarget};

use crate::bucket_key;
use crate::digest::compute_file_digest;
use crate::glob;
use crate::substitution::SubstituteInFiles;
use crate::UploadError;

/// One configured thing to resolve, tagged by kind.
#[derive(Debug, Clone, Copy)]
pub enum TargetSpec<'a> {
    /// The package file itself.
    EntirePackage(&'a PackageOptions),
    /// One named file from the extracted package.
    SingleFile(&'a SingleFileSelection),
    /// Every file matching a glob over the extracted package.
    MultiFileGlob(&'a MultiFileSelection),
}

/// Builds the ordered target list for a run.
pub struct TargetSetResolver<'a> {
    config: &'a DeploymentConfig,
    package: &'a Path,
    staging_dir: &'a Path,
    substitutor: &'a dyn SubstituteInFiles,
}

impl<'a> TargetSetResolver<'a> {
    /// Creates a resolver for `config`, with `package` as the artifact
    /// file and `staging_dir` holding its extracted contents.
    #[must_use]
    pub fn new(
        config: &'a DeploymentConfig,
        package: &'a Path,
        staging_dir: &'a Path,
        substitutor: &'a dyn SubstituteInFiles,
    ) -> Self {
        Self {
            config,
            package,
            staging_dir,
            substitutor,
        }
    }

    /// The configured specs for the active mode, in configuration order.
    #[must_use]
    pub fn specs(&self) -> Vec<TargetSpec<'a>> {
        match self.config.mode() {
            TargetSetMode::EntirePackage => {
                vec![TargetSpec::EntirePackage(&self.config.entire_package)]
            }
            TargetSetMode::SingleFile => self
                .config
                .single_files
                .iter()
                .map(TargetSpec::SingleFile)
                .collect(),
            TargetSetMode::MultiFileGlob => self
                .config
                .file_globs
                .iter()
                .map(TargetSpec::MultiFileGlob)
                .collect(),
        }
    }

    /// Resolves every configured selection into targets.
    ///
    /// A glob that matches nothing contributes no targets and is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::FileNotFound`] for a missing named file,
    /// [`UploadError::Configuration`] for blank paths, patterns, or keys,
    /// and propagates glob, substitution, and I/O failures.
    pub async fn resolve(&self) -> Result<Vec<UploadTarget>, UploadError> {
        check_selections(self.config)?;

        let mut targets = Vec::new();
        for spec in self.specs() {
            match spec {
                TargetSpec::EntirePackage(options) => {
                    targets.push(self.package_target(options).await?);
                }
                TargetSpec::SingleFile(selection) => {
                    targets.push(self.single_file_target(selection).await?);
                }
                TargetSpec::MultiFileGlob(selection) => {
                    targets.extend(self.glob_targets(selection).await?);
                }
            }
        }
        Ok(targets)
    }

    async fn package_target(&self, options: &PackageOptions) -> Result<UploadTarget, UploadError> {
        let filename = bucket_key::package_filename(&self.config.package_identity, self.package);
        let key = bucket_key::resolve(&filename, &options.bucket_key)?;

        self.build_target(
            self.package.to_path_buf(),
            key,
            "entire package".to_string(),
            &options.properties,
            ObjectFailurePolicy::Abort,
        )
        .await
    }

    async fn single_file_target(
        &self,
        selection: &SingleFileSelection,
    ) -> Result<UploadTarget, UploadError> {
        let relative = normalize_relative(&selection.path);
        let path = self.staging_dir.join(&relative);
        if !path.is_file() {
            return Err(UploadError::FileNotFound {
                path: selection.path.clone(),
            });
        }

        if selection.perform_variable_substitution {
            self.substitutor
                .substitute(self.staging_dir, &[glob::escape(&relative)])?;
        }

        let key = bucket_key::resolve(&relative, &selection.bucket_key)?;
        let description = path.display().to_string();

        self.build_target(
            path,
            key,
            description,
            &selection.properties,
            ObjectFailurePolicy::Abort,
        )
        .await
    }

    async fn glob_targets(
        &self,
        selection: &MultiFileSelection,
    ) -> Result<Vec<UploadTarget>, UploadError> {
        let pattern = selection.pattern.trim();
        let files = glob::expand(self.staging_dir, pattern)?;
        if files.is_empty() {
            log::info!(
                "The glob pattern '{pattern}' didn't match any files. Nothing was uploaded to the bucket."
            );
            return Ok(Vec::new());
        }

        log::info!("Glob pattern '{pattern}' matched {} files", files.len());

        let substitution_patterns = selection.substitution_patterns();
        if !substitution_patterns.is_empty() {
            self.substitutor
                .substitute(self.staging_dir, &substitution_patterns)?;
        }

        let mut targets = Vec::with_capacity(files.len());
        for file in files {
            let key = bucket_key::resolve_prefixed(
                &file.mapped_relative_path,
                selection.bucket_key_prefix.as_deref(),
            )?;
            let description = file.path.display().to_string();
            targets.push(
                self.build_target(
                    file.path,
                    key,
                    description,
                    &selection.properties,
                    ObjectFailurePolicy::Warn,
                )
                .await?,
            );
        }
        Ok(targets)
    }

    async fn build_target(
        &self,
        local_path: PathBuf,
        remote_key: String,
        description: String,
        properties: &TargetProperties,
        on_object_failure: ObjectFailurePolicy,
    ) -> Result<UploadTarget, UploadError> {
        let content_digest = if self.config.content_digest {
            Some(
                compute_file_digest(&local_path)
                    .await
                    .map_err(|e| UploadError::Io {
                        path: local_path.display().to_string(),
                        source: e,
                    })?,
            )
        } else {
            None
        };

        Ok(UploadTarget {
            local_path,
            remote_key,
            description,
            storage_class: properties.storage_class.clone(),
            canned_acl: properties.canned_acl.clone(),
            metadata: properties.metadata.clone(),
            tags: properties.tags.clone(),
            content_digest,
            on_object_failure,
        })
    }
}

/// Rejects a selection mode with nothing selected, and blank selection
/// paths or patterns.
///
/// # Errors
///
/// Returns [`UploadError::Configuration`] naming the first problem.
pub fn check_selections(config: &DeploymentConfig) -> Result<(), UploadError> {
    match config.mode() {
        TargetSetMode::EntirePackage => Ok(()),
        TargetSetMode::SingleFile => {
            if config.single_files.is_empty() {
                return Err(UploadError::Configuration {
                    message: "No single file selections were specified".to_string(),
                });
            }
            if config
                .single_files
                .iter()
                .any(|s| normalize_relative(&s.path).is_empty())
            {
                return Err(UploadError::Configuration {
                    message: "The single file selection path may not be blank".to_string(),
                });
            }
            Ok(())
        }
        TargetSetMode::MultiFileGlob => {
            if config.file_globs.is_empty() {
                return Err(UploadError::Configuration {
                    message: "No multi file selections were specified".to_string(),
                });
            }
            if config.file_globs.iter().any(|g| g.pattern.trim().is_empty()) {
                return Err(UploadError::Configuration {
                    message: "The multi file selection pattern may not be blank".to_string(),
                });
            }
            Ok(())
        }
    }
}

/// Trims, converts separators to `/`, and drops a leading `./`.
fn normalize_relative(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use s3_deploy_models::config::BucketKeyBehaviour;

    use super::*;
    use crate::digest::digest_bytes;
    use crate::substitution::{SubstitutionError, TemplateSubstitutor};

    /// Records substitution calls without touching files.
    #[derive(Default)]
    struct RecordingSubstitutor {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl SubstituteInFiles for RecordingSubstitutor {
        fn substitute(&self, _base: &Path, patterns: &[String]) -> Result<usize, SubstitutionError> {
            self.calls.lock().unwrap().push(patterns.to_vec());
            Ok(0)
        }
    }

    fn config(text: &str) -> DeploymentConfig {
        DeploymentConfig::from_toml_str(text).unwrap()
    }

    fn staging() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("config")).unwrap();
        std::fs::write(tmp.path().join("a.json"), "{\"env\":\"#{Environment}\"}").unwrap();
        std::fs::write(tmp.path().join("b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("config/app.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("web.config"), "<configuration/>").unwrap();
        tmp
    }

    #[tokio::test]
    async fn entire_package_yields_one_target_keyed_by_identity() {
        let tmp = tempfile::TempDir::new().unwrap();
        let package = tmp.path().join("download.zip");
        std::fs::write(&package, b"PK").unwrap();
        let config = config(
            r#"
            bucket = "artifacts"
            [package_identity]
            id = "app"
            version = "1.2.3"
            original_path = "app.1.2.3.zip"
            [entire_package]
            storage_class = "STANDARD_IA"
            tags = { team = "platform" }
            "#,
        );
        let substitutor = RecordingSubstitutor::default();
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        let targets = resolver.resolve().await.unwrap();
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.remote_key, "app.1.2.3.zip");
        assert_eq!(target.local_path, package);
        assert_eq!(target.description, "entire package");
        assert_eq!(target.storage_class.as_deref(), Some("STANDARD_IA"));
        assert!(target.has_tags());
        assert_eq!(target.content_digest, Some(digest_bytes(b"PK")));
        assert_eq!(target.on_object_failure, ObjectFailurePolicy::Abort);
    }

    #[tokio::test]
    async fn explicit_package_key_overrides_identity() {
        let tmp = tempfile::TempDir::new().unwrap();
        let package = tmp.path().join("app.zip");
        std::fs::write(&package, b"PK").unwrap();
        let mut config = config("bucket = \"b\"\ncontent_digest = false");
        config.package_identity.id = "app".to_string();
        config.package_identity.version = "2.0.0".to_string();
        config.entire_package.bucket_key = BucketKeyBehaviour::Custom {
            key: "latest/app.zip".to_string(),
        };
        let substitutor = RecordingSubstitutor::default();
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        let targets = resolver.resolve().await.unwrap();
        assert_eq!(targets[0].remote_key, "latest/app.zip");
        assert_eq!(targets[0].content_digest, None);
    }

    #[tokio::test]
    async fn missing_single_file_is_not_found() {
        let tmp = staging();
        let config = config(
            r#"
            bucket = "b"
            target_mode = "SingleFile"
            [[single_files]]
            path = "missing.json"
            "#,
        );
        let substitutor = RecordingSubstitutor::default();
        let package = tmp.path().join("pkg.zip");
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, UploadError::FileNotFound { ref path } if path == "missing.json"));
    }

    #[tokio::test]
    async fn single_file_is_substituted_before_digest() {
        let tmp = staging();
        let config = config(
            r#"
            bucket = "b"
            target_mode = "SingleFile"
            [variables]
            Environment = "production"
            [[single_files]]
            path = "./a.json"
            perform_variable_substitution = true
            "#,
        );
        let substitutor = TemplateSubstitutor::new(config.variables.clone());
        let package = tmp.path().join("pkg.zip");
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        let targets = resolver.resolve().await.unwrap();
        assert_eq!(targets[0].remote_key, "a.json");
        assert_eq!(
            targets[0].content_digest,
            Some(digest_bytes(b"{\"env\":\"production\"}"))
        );
    }

    #[tokio::test]
    async fn glob_targets_follow_match_order_with_prefix() {
        let tmp = staging();
        let config = config(
            r#"
            bucket = "b"
            target_mode = "MultiFileGlob"
            [[file_globs]]
            pattern = "**/*.json"
            bucket_key_prefix = "release/"
            variable_substitution_patterns = "a.json\nconfig/*.json"
            metadata = { "Content-Type" = "application/json" }
            "#,
        );
        let substitutor = RecordingSubstitutor::default();
        let package = tmp.path().join("pkg.zip");
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        let targets = resolver.resolve().await.unwrap();
        let keys: Vec<&str> = targets.iter().map(|t| t.remote_key.as_str()).collect();
        assert_eq!(keys, vec!["release/a.json", "release/b.json", "release/config/app.json"]);
        assert!(targets
            .iter()
            .all(|t| t.on_object_failure == ObjectFailurePolicy::Warn));
        assert_eq!(
            targets[0].metadata,
            BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
        );
        assert_eq!(
            *substitutor.calls.lock().unwrap(),
            vec![vec!["a.json".to_string(), "config/*.json".to_string()]]
        );
    }

    #[tokio::test]
    async fn glob_without_matches_is_empty_not_error() {
        let tmp = staging();
        let config = config(
            r#"
            bucket = "b"
            target_mode = "MultiFileGlob"
            [[file_globs]]
            pattern = "**/*.xml"
            variable_substitution_patterns = "*.xml"
            "#,
        );
        let substitutor = RecordingSubstitutor::default();
        let package = tmp.path().join("pkg.zip");
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        assert!(resolver.resolve().await.unwrap().is_empty());
        assert!(substitutor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_glob_pattern_is_configuration_error() {
        let tmp = staging();
        let config = config(
            r#"
            bucket = "b"
            target_mode = "MultiFileGlob"
            [[file_globs]]
            pattern = "  "
            "#,
        );
        let substitutor = RecordingSubstitutor::default();
        let package = tmp.path().join("pkg.zip");
        let resolver = TargetSetResolver::new(&config, &package, tmp.path(), &substitutor);

        assert!(matches!(
            resolver.resolve().await,
            Err(UploadError::Configuration { .. })
        ));
    }

    #[test]
    fn selection_mode_without_selections_is_rejected() {
        let single = config("bucket = \"b\"\ntarget_mode = \"SingleFile\"");
        let glob = config("bucket = \"b\"\ntarget_mode = \"MultiFileGlob\"");

        assert!(matches!(
            check_selections(&single),
            Err(UploadError::Configuration { ref message }) if message.contains("single file")
        ));
        assert!(matches!(
            check_selections(&glob),
            Err(UploadError::Configuration { ref message }) if message.contains("multi file")
        ));
        assert!(check_selections(&config("bucket = \"b\"")).is_ok());
    }

    #[test]
    fn blank_single_file_path_is_rejected() {
        let config = config(
            r#"
            bucket = "b"
            target_mode = "SingleFile"
            [[single_files]]
            path = "a.json"
            [[single_files]]
            path = " ./ "
            "#,
        );
        assert!(matches!(
            check_selections(&config),
            Err(UploadError::Configuration { .. })
        ));
    }
}
