//! The top-level deployment run.
//!
//! A run validates its preconditions, extracts the package when files
//! are selected from it, ensures the bucket exists, resolves targets, and
//! then uploads them strictly one after another. Output bindings are
//! published at the end, including when a fatal failure cut the run
//! short.

use std::path::PathBuf;

use s3_deploy_models::config::DeploymentConfig;
use s3_deploy_models::{
    ObjectFailurePolicy, TargetSetMode, UploadOutcome, UploadStats, UploadTarget,
};

use crate::archive::{ArchiveExtractor, PackageExtractor};
use crate::classify::{classify, FailureCategory};
use crate::executor::UploadExecutor;
use crate::idempotency::IdempotencyChecker;
use crate::output::{self, OutputSink};
use crate::store::{ObjectStore, RemoteError};
use crate::substitution::{SubstituteInFiles, TemplateSubstitutor};
use crate::targets::{check_selections, TargetSetResolver};
use crate::UploadError;

/// Everything that happened in a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// One outcome per target, in processing order.
    pub outcomes: Vec<UploadOutcome>,
    pub stats: UploadStats,
}

/// Drives one deployment run against an [`ObjectStore`].
pub struct UploadOrchestrator<'a> {
    config: DeploymentConfig,
    store: &'a dyn ObjectStore,
    extractor: Box<dyn PackageExtractor + 'a>,
    substitutor: Box<dyn SubstituteInFiles + 'a>,
}

impl<'a> UploadOrchestrator<'a> {
    /// Creates an orchestrator that extracts with [`ArchiveExtractor`] and
    /// substitutes from `config.variables`.
    #[must_use]
    pub fn new(config: DeploymentConfig, store: &'a dyn ObjectStore) -> Self {
        let substitutor = TemplateSubstitutor::new(config.variables.clone());
        Self {
            config,
            store,
            extractor: Box::new(ArchiveExtractor),
            substitutor: Box::new(substitutor),
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: impl PackageExtractor + 'a) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    #[must_use]
    pub fn with_substitutor(mut self, substitutor: impl SubstituteInFiles + 'a) -> Self {
        self.substitutor = Box::new(substitutor);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Checks everything that can be checked without contacting the store.
    ///
    /// Returns the bucket name and the staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Configuration`] for a blank bucket, a
    /// missing package, or a missing or blank file selection, and [`UploadError::Io`] if the working directory
    /// cannot be determined.
    pub fn preflight(&self) -> Result<(&str, PathBuf), UploadError> {
        let package = &self.config.package;
        if package.as_os_str().is_empty() {
            return Err(UploadError::Configuration {
                message: "No package file was specified".to_string(),
            });
        }
        if !package.is_file() {
            return Err(UploadError::Configuration {
                message: format!("Could not find package file: {}", package.display()),
            });
        }

        let bucket = self.config.bucket_name();
        if bucket.is_empty() {
            return Err(UploadError::Configuration {
                message: "The bucket name may not be blank".to_string(),
            });
        }

        check_selections(&self.config)?;

        let staging_dir = match &self.config.staging_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| UploadError::Io {
                path: ".".to_string(),
                source: e,
            })?,
        };

        if self.config.has_unknown_mode() {
            log::warn!(
                "Unrecognised target mode '{}'; uploading the entire package",
                self.config.target_mode.as_deref().unwrap_or_default()
            );
        }

        Ok((bucket, staging_dir))
    }

    /// Runs the deployment, publishing output bindings to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal failure. Tolerated per-object failures are
    /// reported as warned outcomes instead.
    pub async fn run(&self, sink: &mut dyn OutputSink) -> Result<UploadReport, UploadError> {
        let (bucket, staging_dir) = self.preflight()?;
        let mode = self.config.mode();

        if mode != TargetSetMode::EntirePackage {
            let entries = self.extractor.extract(&self.config.package, &staging_dir)?;
            log::debug!("Extracted {entries} entries into {}", staging_dir.display());
        }

        self.ensure_bucket(bucket).await?;

        let checker = IdempotencyChecker::new(self.config.content_digest);
        if !checker.digest_supported() {
            log::info!(
                "MD5 hashes are not supported in executing environment. Files will always be uploaded."
            );
        }

        let targets = TargetSetResolver::new(
            &self.config,
            &self.config.package,
            &staging_dir,
            self.substitutor.as_ref(),
        )
        .resolve()
        .await?;

        let (outcomes, failure) = self.upload_all(bucket, checker, targets).await;

        let emitted = output::emit(sink, &self.config.package, &outcomes);
        if let Some(error) = failure {
            return Err(error);
        }
        emitted.map_err(UploadError::Output)?;

        let stats = UploadStats::from_outcomes(&outcomes);
        log::info!("Upload finished: {stats}");

        Ok(UploadReport { outcomes, stats })
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), UploadError> {
        let exists = self
            .store
            .bucket_exists(bucket)
            .await
            .map_err(|e| bucket_error(bucket, e))?;

        if exists {
            log::info!("Bucket {bucket} exists in region. Skipping creation.");
            return Ok(());
        }

        log::info!("Creating {bucket}.");
        self.store
            .create_bucket(bucket)
            .await
            .map_err(|e| bucket_error(bucket, e))
    }

    /// Uploads targets in order until one fails fatally.
    async fn upload_all(
        &self,
        bucket: &str,
        checker: IdempotencyChecker,
        targets: Vec<UploadTarget>,
    ) -> (Vec<UploadOutcome>, Option<UploadError>) {
        let executor = UploadExecutor::new(self.store, bucket, checker);
        let mut outcomes = Vec::with_capacity(targets.len());

        for target in targets {
            let error = match executor.execute(&target).await {
                Ok(outcome) => {
                    outcomes.push(outcome);
                    continue;
                }
                Err(error) => error,
            };

            if let RemoteError::Transport {
                body: Some(body), ..
            } = &error
            {
                log::warn!("An exception was thrown while contacting the AWS API.\n{body}");
            }

            let failure = classify(error, &target, bucket);
            log::debug!(
                "{} failure for key {} ({:?} policy)",
                failure.category,
                target.remote_key,
                target.on_object_failure
            );
            match (failure.category, target.on_object_failure) {
                (FailureCategory::Warn, ObjectFailurePolicy::Warn) => {
                    log::warn!("{}", failure.message);
                    outcomes.push(UploadOutcome::warned(target, failure.message));
                }
                _ => return (outcomes, Some(failure.into_error(bucket))),
            }
        }

        (outcomes, None)
    }
}

fn bucket_error(bucket: &str, error: RemoteError) -> UploadError {
    if error.is_access_denied() {
        return UploadError::Permission {
            message: format!(
                "The credentials used do not have the required permissions to create or access bucket {bucket}. Ensure they have s3:ListBucket and s3:CreateBucket."
            ),
            source: error,
        };
    }

    if let RemoteError::Transport { body, .. } = &error {
        let message = body.as_deref().filter(|b| !b.trim().is_empty()).map_or_else(
            || "An exception was thrown while contacting the AWS API.".to_string(),
            |body| format!("An exception was thrown while contacting the AWS API.\n{body}"),
        );
        log::warn!("{message}");
        return UploadError::Transport {
            message,
            source: error,
        };
    }

    UploadError::BucketCreation {
        bucket: bucket.to_string(),
        source: error,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::archive::ArchiveError;
    use crate::memory::{MemoryStore, StoreCall};
    use crate::output::{CollectedOutputs, FILE_NAME, FILE_PATH};

    /// Extractor that counts calls and does nothing.
    #[derive(Default)]
    struct CountingExtractor {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl PackageExtractor for &CountingExtractor {
        fn extract(&self, _: &Path, _: &Path) -> Result<u64, ArchiveError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(0)
        }
    }

    fn config(dir: &Path) -> DeploymentConfig {
        let package = dir.join("app.1.2.3.zip");
        std::fs::write(&package, b"package").unwrap();
        let mut config = DeploymentConfig::from_toml_str("bucket = \"artifacts\"").unwrap();
        config.package = package;
        config.staging_directory = Some(dir.join("staging"));
        config
    }

    #[tokio::test]
    async fn blank_bucket_fails_before_any_remote_call() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.bucket = "  ".to_string();
        let store = MemoryStore::new();

        let err = UploadOrchestrator::new(config, &store)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Configuration { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_package_fails_before_any_remote_call() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.package = tmp.path().join("missing.zip");
        let store = MemoryStore::new();

        let err = UploadOrchestrator::new(config, &store)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Configuration { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_single_file_path_fails_before_any_remote_call() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.target_mode = Some("SingleFile".to_string());
        config.single_files = DeploymentConfig::from_toml_str("[[single_files]]\npath = \"  \"")
            .unwrap()
            .single_files;
        let store = MemoryStore::new();
        let extractor = CountingExtractor::default();

        let err = UploadOrchestrator::new(config, &store)
            .with_extractor(&extractor)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Configuration { .. }));
        assert!(store.calls().is_empty());
        assert!(!store.has_bucket("artifacts"));
        assert_eq!(
            extractor.calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn blank_glob_pattern_fails_before_any_remote_call() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.target_mode = Some("MultiFileGlob".to_string());
        config.file_globs = DeploymentConfig::from_toml_str("[[file_globs]]\npattern = \"\"")
            .unwrap()
            .file_globs;
        let store = MemoryStore::new();

        let err = UploadOrchestrator::new(config, &store)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Configuration { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn selection_mode_without_selections_fails_before_any_remote_call() {
        for mode in ["SingleFile", "MultiFileGlob"] {
            let tmp = tempfile::TempDir::new().unwrap();
            let mut config = config(tmp.path());
            config.target_mode = Some(mode.to_string());
            let store = MemoryStore::new();

            let err = UploadOrchestrator::new(config, &store)
                .run(&mut CollectedOutputs::new())
                .await
                .unwrap_err();

            assert!(matches!(err, UploadError::Configuration { .. }), "{mode}");
            assert!(store.calls().is_empty(), "{mode}");
        }
    }

    #[tokio::test]
    async fn entire_package_mode_does_not_extract() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new();
        let extractor = CountingExtractor::default();

        UploadOrchestrator::new(config(tmp.path()), &store)
            .with_extractor(&extractor)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap();

        assert_eq!(
            extractor.calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn selection_mode_extracts_before_resolving() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.target_mode = Some("MultiFileGlob".to_string());
        config.file_globs = DeploymentConfig::from_toml_str("[[file_globs]]\npattern = \"**/*.json\"")
            .unwrap()
            .file_globs;
        let store = MemoryStore::new();
        let extractor = CountingExtractor::default();

        let report = UploadOrchestrator::new(config, &store)
            .with_extractor(&extractor)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap();

        assert_eq!(
            extractor.calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn access_denied_on_bucket_check_is_a_permission_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new().failing_bucket(RemoteError::Service {
            code: "AccessDenied".to_string(),
            status: 403,
            message: "denied".to_string(),
        });

        let err = UploadOrchestrator::new(config(tmp.path()), &store)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        match err {
            UploadError::Permission { message, .. } => assert!(message.contains("artifacts")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.calls(), vec![StoreCall::BucketExists("artifacts".to_string())]);
    }

    #[tokio::test]
    async fn other_bucket_failures_are_bucket_creation_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new().failing_bucket(RemoteError::Service {
            code: "BucketAlreadyExists".to_string(),
            status: 409,
            message: "taken".to_string(),
        });

        let err = UploadOrchestrator::new(config(tmp.path()), &store)
            .run(&mut CollectedOutputs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::BucketCreation { bucket, .. } if bucket == "artifacts"));
    }

    #[tokio::test]
    async fn abort_policy_escalates_allow_listed_failures() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new().failing_put(
            "app.1.2.3.zip",
            RemoteError::Service {
                code: "InvalidTag".to_string(),
                status: 400,
                message: "bad tag".to_string(),
            },
        );
        let mut outputs = CollectedOutputs::new();

        let err = UploadOrchestrator::new(config(tmp.path()), &store)
            .run(&mut outputs)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::FileUpload { .. }));
        assert_eq!(outputs.get(FILE_NAME), Some("app.1.2.3.zip"));
    }

    #[tokio::test]
    async fn unversioned_uploads_publish_no_per_key_outputs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut outputs = CollectedOutputs::new();

        let report = UploadOrchestrator::new(config(tmp.path()), &store)
            .run(&mut outputs)
            .await
            .unwrap();

        assert_eq!(report.stats.uploaded, 1);
        let names: Vec<_> = outputs.entries().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec![FILE_NAME, FILE_PATH]);
    }
}
