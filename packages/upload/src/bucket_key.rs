//! Remote key resolution.

use std::path::Path;

use s3_deploy_models::config::{BucketKeyBehaviour, PackageIdentity};

use crate::UploadError;

/// Computes the remote key for a file.
///
/// `default_key` is the natural key (relative path or normalized package
/// filename). A non-blank [`BucketKeyBehaviour::Custom`] key wins over
/// it; a prefix behaviour is prepended to it.
///
/// # Errors
///
/// Returns [`UploadError::Configuration`] if the resulting key is blank.
pub fn resolve(default_key: &str, behaviour: &BucketKeyBehaviour) -> Result<String, UploadError> {
    let key = match behaviour {
        BucketKeyBehaviour::Custom { key } if !key.trim().is_empty() => key.trim().to_string(),
        BucketKeyBehaviour::Custom { .. } | BucketKeyBehaviour::Filename => {
            default_key.trim().to_string()
        }
        BucketKeyBehaviour::FilenameWithCustomPrefix { prefix } => {
            format!("{prefix}{}", default_key.trim()).trim().to_string()
        }
    };

    if key.is_empty() {
        return Err(UploadError::Configuration {
            message: format!("The bucket key resolved for '{default_key}' is blank"),
        });
    }

    Ok(key)
}

/// Key for a file matched by a glob selection: the optional prefix
/// followed by the mapped relative path.
///
/// # Errors
///
/// Returns [`UploadError::Configuration`] if the resulting key is blank.
pub fn resolve_prefixed(relative_path: &str, prefix: Option<&str>) -> Result<String, UploadError> {
    let behaviour = prefix.map_or(BucketKeyBehaviour::Filename, |prefix| {
        BucketKeyBehaviour::FilenameWithCustomPrefix {
            prefix: prefix.to_string(),
        }
    });
    resolve(relative_path, &behaviour)
}

/// Normalized package filename: `{id}.{version}{extension}`, where the
/// extension is the last extension of the package's original path.
///
/// Without a package id the package's own file name is used.
#[must_use]
pub fn package_filename(identity: &PackageIdentity, package: &Path) -> String {
    if identity.id.trim().is_empty() {
        return package
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    let original = identity
        .original_path
        .as_deref()
        .map_or(package, Path::new);
    let extension = original
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    format!("{}.{}{extension}", identity.id.trim(), identity.version.trim())
}
