#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the S3 deploy step.
//!
//! Every way of selecting files for upload (the entire package, one named
//! file, or a glob over the extracted package) normalizes to an
//! [`UploadTarget`]. Attempting a target yields an [`UploadOutcome`].

pub mod config;
pub mod headers;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which resolver path builds the target list for a run.
///
/// Exactly one mode is active per deployment.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TargetSetMode {
    /// Upload the package file itself as one object.
    #[default]
    EntirePackage,
    /// Upload explicitly named files from the extracted package.
    SingleFile,
    /// Upload every file matching a glob over the extracted package.
    MultiFileGlob,
}

/// What happens when the store rejects a single object with one of the
/// known per-object error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFailurePolicy {
    /// Log a warning, record the target as skipped, and keep going.
    Warn,
    /// Fail the whole deployment.
    Abort,
}

/// MD5 digest of an object's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering, as used in single-part `ETag`s.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an `ETag` into a digest.
    ///
    /// Returns `None` for multipart `ETag`s (`"abc123-5"`) and anything
    /// else that is not a bare 32-character hex MD5.
    #[must_use]
    pub fn from_etag(etag: &str) -> Option<Self> {
        let clean = etag.trim().trim_matches('"');
        if clean.len() != 32 || clean.contains('-') {
            return None;
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(clean, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One local file mapped to one remote object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Absolute path of the file to upload.
    pub local_path: PathBuf,
    /// Remote object key.
    pub remote_key: String,
    /// Human-readable description used in log lines (e.g. `"entire package"`).
    pub description: String,
    /// Storage class to request, if any.
    pub storage_class: Option<String>,
    /// Canned ACL to apply, if any.
    pub canned_acl: Option<String>,
    /// Object metadata (standard headers and user metadata).
    pub metadata: BTreeMap<String, String>,
    /// Object tags.
    pub tags: BTreeMap<String, String>,
    /// Content digest of the local file, computed after substitution.
    /// `None` when digest comparison is unsupported.
    pub content_digest: Option<ContentDigest>,
    /// How allow-listed per-object failures are handled for this target.
    pub on_object_failure: ObjectFailurePolicy,
}

impl UploadTarget {
    /// Whether the target carries any tags.
    #[must_use]
    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// Snapshot of the remote object at a key, fetched right before deciding
/// whether to upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObjectState {
    /// Whether an object exists at the key.
    pub exists: bool,
    /// Content digest derived from the `ETag`, when it is a plain MD5.
    pub content_digest: Option<ContentDigest>,
    /// Standard headers and user metadata, keyed by
    /// [`headers::tracked_key`].
    pub metadata: BTreeMap<String, String>,
}

impl RemoteObjectState {
    /// State for a key that has no object.
    #[must_use]
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Why a target was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An identical object already exists at the key.
    UpToDate,
    /// The store rejected the object with a tolerated per-object error.
    Warned {
        /// The warning that was logged.
        message: String,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => f.write_str("object already up to date"),
            Self::Warned { message } => write!(f, "skipped with warning: {message}"),
        }
    }
}

/// Result of attempting one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The target that was attempted.
    pub target: UploadTarget,
    /// Whether the object was written.
    pub performed: bool,
    /// Version identifier returned by a versioned bucket.
    pub remote_version: Option<String>,
    /// Set when `performed` is `false`.
    pub skipped_reason: Option<SkipReason>,
}

impl UploadOutcome {
    /// Outcome for a written object.
    #[must_use]
    pub const fn uploaded(target: UploadTarget, remote_version: Option<String>) -> Self {
        Self {
            target,
            performed: true,
            remote_version,
            skipped_reason: None,
        }
    }

    /// Outcome for an object that already matched.
    #[must_use]
    pub const fn up_to_date(target: UploadTarget) -> Self {
        Self {
            target,
            performed: false,
            remote_version: None,
            skipped_reason: Some(SkipReason::UpToDate),
        }
    }

    /// Outcome for an object skipped after a tolerated failure.
    #[must_use]
    pub const fn warned(target: UploadTarget, message: String) -> Self {
        Self {
            target,
            performed: false,
            remote_version: None,
            skipped_reason: Some(SkipReason::Warned { message }),
        }
    }

    /// Whether the target was skipped after a warning.
    #[must_use]
    pub const fn is_warned(&self) -> bool {
        matches!(self.skipped_reason, Some(SkipReason::Warned { .. }))
    }
}

/// Per-run counts of what happened to each target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    /// Objects written.
    pub uploaded: u64,
    /// Objects skipped because the remote already matched.
    pub up_to_date: u64,
    /// Objects skipped after a tolerated per-object failure.
    pub warned: u64,
}

impl UploadStats {
    /// Tallies a list of outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match &outcome.skipped_reason {
                None => stats.uploaded += 1,
                Some(SkipReason::UpToDate) => stats.up_to_date += 1,
                Some(SkipReason::Warned { .. }) => stats.warned += 1,
            }
        }
        stats
    }

    /// Total number of targets attempted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.uploaded + self.up_to_date + self.warned
    }
}

impl std::fmt::Display for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped (up to date), {} skipped with warnings",
            self.uploaded, self.up_to_date, self.warned
        )
    }
}
