//! Run-level error taxonomy.

use crate::archive::ArchiveError;
use crate::glob::GlobError;
use crate::store::RemoteError;
use crate::substitution::SubstitutionError;

/// Errors that abort a deployment run.
///
/// Per-object warnings never surface here; they are recorded on the
/// target's outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Invalid or missing configuration, raised before any remote call.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// An explicitly named file is missing from the package.
    #[error("The file {path} could not be found in the package.")]
    FileNotFound {
        /// Path relative to the staging directory.
        path: String,
    },

    /// The store refused an operation for lack of permission.
    #[error("{message}")]
    Permission {
        /// Operator-facing explanation, including required permissions.
        message: String,
        /// The store's answer.
        source: RemoteError,
    },

    /// A single object could not be uploaded and the failure is fatal for
    /// the run.
    #[error("{message}")]
    FileUpload {
        /// Operator-facing explanation.
        message: String,
        /// The underlying failure.
        source: RemoteError,
    },

    /// The store failed with an error code that is not explicitly handled.
    #[error("An unrecognized {code} error was thrown while uploading to bucket {bucket}")]
    UnknownRemote {
        /// Provider error code.
        code: String,
        /// Destination bucket.
        bucket: String,
        /// The underlying failure.
        source: RemoteError,
    },

    /// The store could not be reached or answered unintelligibly.
    #[error("{message}")]
    Transport {
        /// Operator-facing explanation.
        message: String,
        /// The underlying failure.
        source: RemoteError,
    },

    /// The destination bucket could not be checked or created.
    #[error("Failed to ensure bucket {bucket} exists: {source}")]
    BucketCreation {
        /// Destination bucket.
        bucket: String,
        /// The underlying failure.
        source: RemoteError,
    },

    /// The package could not be extracted.
    #[error(transparent)]
    Extraction(#[from] ArchiveError),

    /// Variable substitution failed.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    /// A selection glob could not be expanded.
    #[error(transparent)]
    Glob(#[from] GlobError),

    /// Local file I/O failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Output bindings could not be written.
    #[error("Failed to write output bindings: {0}")]
    Output(std::io::Error),
}
