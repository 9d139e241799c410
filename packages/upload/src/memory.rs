//! In-memory [`ObjectStore`].
//!
//! Backs `--dry-run` (targets are resolved and "uploaded" to an empty
//! store, so nothing leaves the machine) and the crate's tests. Failures
//! can be injected per key, and every call is recorded in order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use s3_deploy_models::headers::tracked_key;
use s3_deploy_models::RemoteObjectState;

use crate::digest::compute_file_digest;
use crate::store::{ObjectStore, PutObjectRequest, PutObjectResponse, RemoteError};

/// A call made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    BucketExists(String),
    CreateBucket(String),
    GetObjectMetadata { bucket: String, key: String },
    PutObject { bucket: String, key: String },
}

/// An object held by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object state as reported by metadata lookups.
    pub state: RemoteObjectState,
    /// The last request that wrote the object.
    pub request: Option<PutObjectRequest>,
    /// Version assigned by a versioned store.
    pub version_id: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), StoredObject>,
    put_failures: BTreeMap<String, RemoteError>,
    head_failures: BTreeMap<String, RemoteError>,
    bucket_failure: Option<RemoteError>,
    calls: Vec<StoreCall>,
    next_version: u64,
}

/// An object store that lives in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    versioned: bool,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// An unversioned store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that assigns version ids (`v1`, `v2`, ...) to every put.
    #[must_use]
    pub fn versioned() -> Self {
        Self {
            versioned: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an existing bucket.
    #[must_use]
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.lock().buckets.insert(bucket.to_string());
        self
    }

    /// Adds an existing object.
    #[must_use]
    pub fn with_object(self, bucket: &str, key: &str, state: RemoteObjectState) -> Self {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                state,
                request: None,
                version_id: None,
            },
        );
        self
    }

    /// Makes every put to `key` fail with `error`.
    #[must_use]
    pub fn failing_put(self, key: &str, error: RemoteError) -> Self {
        self.lock().put_failures.insert(key.to_string(), error);
        self
    }

    /// Makes every metadata lookup of `key` fail with `error`.
    #[must_use]
    pub fn failing_head(self, key: &str, error: RemoteError) -> Self {
        self.lock().head_failures.insert(key.to_string(), error);
        self
    }

    /// Makes bucket existence checks and creation fail with `error`.
    #[must_use]
    pub fn failing_bucket(self, error: RemoteError) -> Self {
        self.lock().bucket_failure = Some(error);
        self
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Keys of every put attempted so far, in order.
    #[must_use]
    pub fn put_keys(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::PutObject { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `bucket` exists.
    #[must_use]
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().buckets.contains(bucket)
    }

    /// The object at `key`, if any.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::BucketExists(bucket.to_string()));
        if let Some(error) = &state.bucket_failure {
            return Err(error.clone());
        }
        Ok(state.buckets.contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::CreateBucket(bucket.to_string()));
        if let Some(error) = &state.bucket_failure {
            return Err(error.clone());
        }
        state.buckets.insert(bucket.to_string());
        Ok(())
    }

    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RemoteObjectState, RemoteError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::GetObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if let Some(error) = state.head_failures.get(key) {
            return Err(error.clone());
        }
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.state.clone())
            .ok_or_else(|| RemoteError::Service {
                code: "NotFound".to_string(),
                status: 404,
                message: format!("{key} does not exist"),
            })
    }

    async fn put_object(&self, request: &PutObjectRequest) -> Result<PutObjectResponse, RemoteError> {
        {
            let mut state = self.lock();
            state.calls.push(StoreCall::PutObject {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
            });
            if let Some(error) = state.put_failures.get(&request.key) {
                return Err(error.clone());
            }
        }

        let digest = match request.content_md5 {
            Some(digest) => digest,
            None => compute_file_digest(&request.local_path)
                .await
                .map_err(|e| RemoteError::Transport {
                    message: format!("failed to read {}: {e}", request.local_path.display()),
                    body: None,
                })?,
        };

        let metadata = request
            .metadata
            .headers
            .iter()
            .map(|(header, value)| (header.as_ref().to_string(), value.trim().to_string()))
            .chain(
                request
                    .metadata
                    .user
                    .iter()
                    .map(|(key, value)| (tracked_key(key), value.trim().to_string())),
            )
            .collect();

        let mut state = self.lock();
        let version_id = self.versioned.then(|| {
            state.next_version += 1;
            format!("v{}", state.next_version)
        });
        state.objects.insert(
            (request.bucket.clone(), request.key.clone()),
            StoredObject {
                state: RemoteObjectState {
                    exists: true,
                    content_digest: Some(digest),
                    metadata,
                },
                request: Some(request.clone()),
                version_id: version_id.clone(),
            },
        );

        Ok(PutObjectResponse { version_id })
    }
}
