#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deploys package artifacts to an object store.
//!
//! [`UploadOrchestrator`] drives a run: it resolves the configured files
//! into [`UploadTarget`](s3_deploy_models::UploadTarget)s, skips those
//! whose content and metadata already match the remote object, uploads
//! the rest in order through an [`ObjectStore`], and sorts every failure
//! into "warn and continue" or "abort the run".

pub mod archive;
pub mod bucket_key;
pub mod classify;
pub mod digest;
mod error;
pub mod executor;
pub mod glob;
pub mod idempotency;
pub mod memory;
pub mod orchestrator;
pub mod output;
pub mod store;
pub mod substitution;
pub mod targets;

pub use error::UploadError;
pub use orchestrator::{UploadOrchestrator, UploadReport};
pub use store::{ObjectStore, PutObjectRequest, PutObjectResponse, RemoteError};
