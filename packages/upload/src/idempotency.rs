//! Skipping uploads of objects that are already in place.
//!
//! An object is considered already uploaded when the remote digest equals
//! the local digest and every metadata entry that would be written is
//! already present with the same value.

use s3_deploy_models::headers::tracked_key;
use s3_deploy_models::{RemoteObjectState, UploadTarget};

use crate::store::{ObjectStore, RemoteError};

/// Decides whether a target needs to be written.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyChecker {
    digest_supported: bool,
}

impl IdempotencyChecker {
    /// Creates a checker. Without digest support every target is
    /// uploaded.
    #[must_use]
    pub const fn new(digest_supported: bool) -> Self {
        Self { digest_supported }
    }

    /// Whether digest comparison is available.
    #[must_use]
    pub const fn digest_supported(&self) -> bool {
        self.digest_supported
    }

    /// Compares `target` with the remote state.
    #[must_use]
    pub fn should_upload(&self, target: &UploadTarget, remote: &RemoteObjectState) -> bool {
        if !self.digest_supported || !remote.exists {
            return true;
        }

        let (Some(local), Some(remote_digest)) = (target.content_digest, remote.content_digest)
        else {
            return true;
        };

        local != remote_digest || metadata_differs(target, remote)
    }

    /// Fetches the remote state for `target` and compares.
    ///
    /// A "not found" answer means the object does not exist yet.
    ///
    /// # Errors
    ///
    /// Propagates every other [`RemoteError`] unchanged.
    pub async fn check(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        target: &UploadTarget,
    ) -> Result<bool, RemoteError> {
        if !self.digest_supported {
            return Ok(true);
        }

        let remote = match store.get_object_metadata(bucket, &target.remote_key).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => RemoteObjectState::missing(),
            Err(e) => return Err(e),
        };

        Ok(self.should_upload(target, &remote))
    }
}

fn metadata_differs(target: &UploadTarget, remote: &RemoteObjectState) -> bool {
    target
        .metadata
        .iter()
        .any(|(key, value)| {
            remote
                .metadata
                .get(&tracked_key(key))
                .is_none_or(|current| current.trim() != value.trim())
        })
}
