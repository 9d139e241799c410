//! Turning store failures into run decisions.
//!
//! Every [`RemoteError`] raised while uploading one object is sorted into
//! one of three categories. `Warn` failures only concern that object and
//! the run may continue past them, depending on the target's
//! [`ObjectFailurePolicy`](s3_deploy_models::ObjectFailurePolicy).
//! `Fatal` and `Unknown` failures end the run.

use s3_deploy_models::config::is_known_canned_acl;
use s3_deploy_models::UploadTarget;
use strum_macros::Display;

use crate::store::{invalid_metadata_entries, RemoteError};
use crate::UploadError;

const METADATA_DOCS: &str = "https://docs.aws.amazon.com/AmazonS3/latest/userguide/UsingMetadata.html";

/// How a failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FailureCategory {
    /// The run must stop.
    Fatal,
    /// Only the current object is affected.
    Warn,
    /// Not explicitly handled; treated as fatal.
    Unknown,
}

/// A classified per-object failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub category: FailureCategory,
    /// Operator-facing explanation.
    pub message: String,
    pub cause: RemoteError,
}

type MessageFn = fn(&UploadTarget, &RemoteError) -> String;

/// Error codes that only affect the object being uploaded.
const WARN_CODES: &[(&str, MessageFn)] = &[
    ("RequestIsNotMultiPartContent", failed_upload),
    ("UnexpectedContent", failed_upload),
    ("MetadataTooLarge", failed_upload),
    ("MaxMessageLengthExceeded", failed_upload),
    ("KeyTooLongError", failed_upload),
    ("SignatureDoesNotMatch", failed_upload),
    ("InvalidStorageClass", failed_upload),
    ("InvalidArgument", invalid_argument),
    ("InvalidTag", failed_upload),
];

fn remote_message(error: &RemoteError) -> &str {
    match error {
        RemoteError::Service { message, .. }
        | RemoteError::Transport { message, .. }
        | RemoteError::InvalidRequest { message } => message,
    }
}

fn failed_upload(target: &UploadTarget, error: &RemoteError) -> String {
    format!(
        "Failed to upload file {}. {}",
        target.local_path.display(),
        remote_message(error)
    )
}

/// The store gives no dedicated code for a bad canned ACL, so an
/// unrecognised one is called out as the likely cause.
fn invalid_argument(target: &UploadTarget, _: &RemoteError) -> String {
    let message = format!(
        "Failed to upload {}. An invalid argument was provided.",
        target.local_path.display()
    );
    match target
        .canned_acl
        .as_deref()
        .map(str::trim)
        .filter(|acl| !acl.is_empty() && !is_known_canned_acl(acl))
    {
        Some(acl) => format!(
            "{message} This is possibly due to the value specified for the canned ACL ({acl})."
        ),
        None => message,
    }
}

/// Required permissions for uploading `target`.
fn required_permissions(target: &UploadTarget) -> Vec<&'static str> {
    let mut permissions = vec!["s3:PutObject"];
    if target.has_tags() {
        permissions.extend(["s3:PutObjectTagging", "s3:PutObjectVersionTagging"]);
    }
    permissions
}

/// Message for an access-denied answer while uploading `target`.
#[must_use]
pub fn access_denied_message(target: &UploadTarget, bucket: &str) -> String {
    format!(
        "The credentials were not allowed to upload {} to bucket {bucket}. Ensure they have the following permissions: {}",
        target.remote_key,
        required_permissions(target).join(", ")
    )
}

fn invalid_metadata_message(target: &UploadTarget) -> String {
    let mut offending = invalid_metadata_entries(&target.metadata);
    if offending.is_empty() {
        offending = target
            .metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
    }
    let entries = offending
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "The metadata for {} could not be sent. Metadata keys and values must be valid HTTP header text ({entries}). See {METADATA_DOCS}",
        target.remote_key
    )
}

fn transport_message(error: &RemoteError) -> String {
    match error {
        RemoteError::Transport {
            body: Some(body), ..
        } if !body.trim().is_empty() => {
            format!("An exception was thrown while contacting the AWS API.\n{body}")
        }
        _ => "An exception was thrown while contacting the AWS API.".to_string(),
    }
}

/// Sorts a failure raised while uploading `target` to `bucket`.
#[must_use]
pub fn classify(error: RemoteError, target: &UploadTarget, bucket: &str) -> ClassifiedFailure {
    let (category, message) = match &error {
        RemoteError::InvalidRequest { .. } => {
            (FailureCategory::Fatal, invalid_metadata_message(target))
        }
        RemoteError::Transport { .. } => (FailureCategory::Fatal, transport_message(&error)),
        RemoteError::Service { .. } if error.is_access_denied() => {
            (FailureCategory::Fatal, access_denied_message(target, bucket))
        }
        RemoteError::Service { code, .. } => WARN_CODES
            .iter()
            .find(|(known, _)| *known == code.as_str())
            .map_or_else(
                || {
                    (
                        FailureCategory::Unknown,
                        format!(
                            "An unrecognized {code} error was thrown while uploading to bucket {bucket}"
                        ),
                    )
                },
                |(_, message)| (FailureCategory::Warn, message(target, &error)),
            ),
    };

    ClassifiedFailure {
        category,
        message,
        cause: error,
    }
}

impl ClassifiedFailure {
    /// The run-level error for this failure.
    #[must_use]
    pub fn into_error(self, bucket: &str) -> UploadError {
        let Self {
            category,
            message,
            cause,
        } = self;

        match category {
            FailureCategory::Unknown => UploadError::UnknownRemote {
                code: cause.code().unwrap_or_default().to_string(),
                bucket: bucket.to_string(),
                source: cause,
            },
            FailureCategory::Fatal if matches!(cause, RemoteError::Transport { .. }) => {
                UploadError::Transport {
                    message,
                    source: cause,
                }
            }
            FailureCategory::Fatal if cause.is_access_denied() => UploadError::Permission {
                message,
                source: cause,
            },
            FailureCategory::Fatal | FailureCategory::Warn => UploadError::FileUpload {
                message,
                source: cause,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use s3_deploy_models::ObjectFailurePolicy;

    use super::*;

    fn target() -> UploadTarget {
        UploadTarget {
            local_path: PathBuf::from("/staging/a.json"),
            remote_key: "a.json".to_string(),
            description: "a.json".to_string(),
            storage_class: None,
            canned_acl: None,
            metadata: BTreeMap::new(),
            tags: BTreeMap::new(),
            content_digest: None,
            on_object_failure: ObjectFailurePolicy::Warn,
        }
    }

    fn service(code: &str, status: u16) -> RemoteError {
        RemoteError::Service {
            code: code.to_string(),
            status,
            message: "rejected".to_string(),
        }
    }

    #[test]
    fn access_denied_without_tags_names_put_object_only() {
        let failure = classify(service("AccessDenied", 403), &target(), "artifacts");
        assert_eq!(failure.category, FailureCategory::Fatal);
        assert!(failure.message.contains("s3:PutObject"));
        assert!(failure.message.contains("artifacts"));
        assert!(!failure.message.contains("Tagging"));
        assert!(matches!(
            failure.into_error("artifacts"),
            UploadError::Permission { .. }
        ));
    }

    #[test]
    fn access_denied_with_tags_names_tagging_permissions() {
        let mut target = target();
        target.tags.insert("team".to_string(), "platform".to_string());
        let failure = classify(service("AccessDenied", 403), &target, "artifacts");
        assert!(failure.message.contains("s3:PutObjectTagging"));
        assert!(failure.message.contains("s3:PutObjectVersionTagging"));
    }

    #[test]
    fn allow_listed_codes_warn() {
        for code in [
            "RequestIsNotMultiPartContent",
            "UnexpectedContent",
            "MetadataTooLarge",
            "MaxMessageLengthExceeded",
            "KeyTooLongError",
            "SignatureDoesNotMatch",
            "InvalidStorageClass",
            "InvalidArgument",
            "InvalidTag",
        ] {
            let failure = classify(service(code, 400), &target(), "b");
            assert_eq!(failure.category, FailureCategory::Warn, "{code}");
            assert!(failure.message.contains("a.json"), "{code}");
        }
    }

    #[test]
    fn invalid_argument_hints_at_unknown_canned_acl() {
        let mut target = target();
        target.canned_acl = Some("everyone-can-write".to_string());
        let failure = classify(service("InvalidArgument", 400), &target, "b");
        assert!(failure.message.contains("everyone-can-write"));

        target.canned_acl = Some("public-read".to_string());
        let failure = classify(service("InvalidArgument", 400), &target, "b");
        assert!(!failure.message.contains("canned ACL"));
    }

    #[test]
    fn unrecognised_code_is_unknown() {
        let failure = classify(service("SlowDown", 503), &target(), "artifacts");
        assert_eq!(failure.category, FailureCategory::Unknown);
        assert_eq!(
            failure.message,
            "An unrecognized SlowDown error was thrown while uploading to bucket artifacts"
        );
        assert!(matches!(
            failure.into_error("artifacts"),
            UploadError::UnknownRemote { code, .. } if code == "SlowDown"
        ));
    }

    #[test]
    fn transport_failure_includes_response_body() {
        let error = RemoteError::Transport {
            message: "unparseable response".to_string(),
            body: Some("<html>proxy error</html>".to_string()),
        };
        let failure = classify(error, &target(), "b");
        assert_eq!(failure.category, FailureCategory::Fatal);
        assert!(failure.message.contains("contacting the AWS API"));
        assert!(failure.message.contains("<html>proxy error</html>"));
        assert!(matches!(
            failure.into_error("b"),
            UploadError::Transport { .. }
        ));
    }

    #[test]
    fn invalid_metadata_lists_offending_pairs_and_docs() {
        let mut target = target();
        target
            .metadata
            .insert("Owner".to_string(), "release".to_string());
        target
            .metadata
            .insert("Note".to_string(), "caf\u{e9}".to_string());
        let error = RemoteError::InvalidRequest {
            message: "bad header".to_string(),
        };
        let failure = classify(error, &target, "b");
        assert_eq!(failure.category, FailureCategory::Fatal);
        assert!(failure.message.contains("Note: caf\u{e9}"));
        assert!(!failure.message.contains("Owner"));
        assert!(failure.message.contains(METADATA_DOCS));
        assert!(matches!(
            failure.into_error("b"),
            UploadError::FileUpload { .. }
        ));
    }

    #[test]
    fn categories_display_in_lowercase() {
        assert_eq!(FailureCategory::Fatal.to_string(), "fatal");
        assert_eq!(FailureCategory::Warn.to_string(), "warn");
        assert_eq!(FailureCategory::Unknown.to_string(), "unknown");
    }
}
