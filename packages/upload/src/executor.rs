//! Performing a single upload.

use s3_deploy_models::{UploadOutcome, UploadTarget};

use crate::idempotency::IdempotencyChecker;
use crate::store::{ObjectStore, PutObjectRequest, RemoteError};

/// Uploads one target at a time to a bucket.
pub struct UploadExecutor<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    checker: IdempotencyChecker,
}

impl<'a> UploadExecutor<'a> {
    /// Creates an executor writing to `bucket` through `store`.
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str, checker: IdempotencyChecker) -> Self {
        Self {
            store,
            bucket,
            checker,
        }
    }

    /// Uploads `target` unless an identical object is already in place.
    ///
    /// Returns an outcome with `performed = false` when the upload was
    /// skipped, or `performed = true` with the version id assigned by a
    /// versioned bucket.
    ///
    /// # Errors
    ///
    /// Returns the raw [`RemoteError`] of the metadata lookup or the put,
    /// or [`RemoteError::InvalidRequest`] if the metadata cannot be sent,
    /// for the caller to classify.
    pub async fn execute(&self, target: &UploadTarget) -> Result<UploadOutcome, RemoteError> {
        log::info!(
            "Attempting to upload {} to bucket {} with key {}.",
            target.description,
            self.bucket,
            target.remote_key
        );

        if !self.checker.check(self.store, self.bucket, target).await? {
            log::debug!(
                "Object key {} exists for bucket {} with same content hash and metadata. Skipping upload.",
                target.remote_key,
                self.bucket
            );
            return Ok(UploadOutcome::up_to_date(target.clone()));
        }

        let request = PutObjectRequest::for_target(self.bucket, target);
        request.validate()?;

        let response = self.store.put_object(&request).await?;

        match &response.version_id {
            Some(version) => log::info!("  uploaded {} (version {version})", target.remote_key),
            None => log::info!("  uploaded {}", target.remote_key),
        }

        Ok(UploadOutcome::uploaded(target.clone(), response.version_id))
    }
}
