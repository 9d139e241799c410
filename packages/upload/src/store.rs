//! The object store boundary.
//!
//! [`ObjectStore`] is the only way the orchestrator talks to the remote
//! service. Implementations translate their provider's failures into the
//! closed [`RemoteError`] type at this boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use s3_deploy_models::headers::ObjectMetadata;
use s3_deploy_models::{ContentDigest, RemoteObjectState, UploadTarget};

/// A failed call to the object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with an error code.
    #[error("{code} (HTTP {status}): {message}")]
    Service {
        /// Provider error code (e.g. `"AccessDenied"`).
        code: String,
        /// HTTP status of the response.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The call never produced a service answer (timeout, DNS, a response
    /// that could not be parsed).
    #[error("{message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// Raw response body, when one was received.
        body: Option<String>,
    },

    /// The request was rejected before it was sent, e.g. metadata that is
    /// not a valid HTTP header value.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the failure.
        message: String,
    },
}

impl RemoteError {
    /// Provider error code, for service errors.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            Self::Transport { .. } | Self::InvalidRequest { .. } => None,
        }
    }

    /// Whether the service reported that the key or bucket does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Service { code, status, .. } => {
                *status == 404 || matches!(code.as_str(), "NotFound" | "NoSuchKey" | "NoSuchBucket")
            }
            Self::Transport { .. } | Self::InvalidRequest { .. } => false,
        }
    }

    /// Whether the service refused the call for lack of permission.
    ///
    /// `HEAD` responses have no body, so a bare 403 counts as well.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::Service { code, status, .. } => {
                code == "AccessDenied" || (*status == 403 && matches!(code.as_str(), "" | "Forbidden"))
            }
            Self::Transport { .. } | Self::InvalidRequest { .. } => false,
        }
    }
}

/// Everything needed to write one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// File to read the body from.
    pub local_path: PathBuf,
    /// Storage class, if requested.
    pub storage_class: Option<String>,
    /// Canned ACL, if requested.
    pub canned_acl: Option<String>,
    /// Headers and user metadata.
    pub metadata: ObjectMetadata,
    /// Object tags.
    pub tags: BTreeMap<String, String>,
    /// Digest the store should verify the body against.
    pub content_md5: Option<ContentDigest>,
}

impl PutObjectRequest {
    /// Builds the request for `target` in `bucket`.
    #[must_use]
    pub fn for_target(bucket: &str, target: &UploadTarget) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: target.remote_key.clone(),
            local_path: target.local_path.clone(),
            storage_class: trimmed(target.storage_class.as_deref()),
            canned_acl: trimmed(target.canned_acl.as_deref()),
            metadata: ObjectMetadata::partition(&target.metadata),
            tags: target.tags.clone(),
            content_md5: target.content_digest,
        }
    }

    /// Checks that every metadata key and value can be sent as an HTTP
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidRequest`] naming the first offending
    /// entry.
    pub fn validate(&self) -> Result<(), RemoteError> {
        let headers = self
            .metadata
            .headers
            .iter()
            .map(|(header, value)| (header.as_ref(), value.as_str()));
        let user = self
            .metadata
            .user
            .iter()
            .map(|(key, value)| (key.trim(), value.as_str()));

        for (key, value) in headers.chain(user) {
            if !is_header_name(key) || !is_header_value(value) {
                return Err(RemoteError::InvalidRequest {
                    message: format!("metadata '{key}' = '{value}' is not a valid HTTP header"),
                });
            }
        }
        Ok(())
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Metadata entries that cannot be sent as HTTP headers.
#[must_use]
pub fn invalid_metadata_entries(metadata: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    metadata
        .iter()
        .filter(|(key, value)| !is_header_name(key.trim()) || !is_header_value(value))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

/// RFC 7230 `token`.
fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}

/// Visible US-ASCII, space, and horizontal tab.
fn is_header_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b == b'\t' || (b' '..=b'~').contains(&b))
}

/// Response to a successful put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectResponse {
    /// Version identifier, when the bucket is versioned.
    pub version_id: Option<String>,
}

/// Remote object store operations used by the deploy step.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether `bucket` exists and is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] for any failure other than "not found".
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError>;

    /// Creates `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the bucket cannot be created.
    async fn create_bucket(&self, bucket: &str) -> Result<(), RemoteError>;

    /// Fetches the current state of `key`.
    ///
    /// A missing object is reported as an error for which
    /// [`RemoteError::is_not_found`] holds.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on failure, including "not found".
    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RemoteObjectState, RemoteError>;

    /// Writes one object.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the store rejects the object.
    async fn put_object(&self, request: &PutObjectRequest) -> Result<PutObjectResponse, RemoteError>;
}
