//! Package extraction into the staging directory.
//!
//! File-selection modes upload files from inside the package, so the
//! package is unpacked first. Supported formats are picked by file name:
//! `.zip`/`.nupkg`/`.jar`, `.tar`, `.tar.gz`/`.tgz`, and
//! `.tar.zst`/`.tzst`.

use std::path::Path;

/// Errors from package extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Package file not found.
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// The file name does not identify a supported archive format.
    #[error("Unsupported package format: {0}")]
    UnsupportedFormat(String),

    /// I/O error during extraction.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The zip archive is corrupt or unreadable.
    #[error("Invalid zip archive {path}: {source}")]
    Zip {
        /// Archive path.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
}

/// Unpacks a package into a staging directory.
pub trait PackageExtractor: Send + Sync {
    /// Extracts `package` into `staging_dir`, returning the number of
    /// top-level entries now in the staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the package cannot be extracted.
    fn extract(&self, package: &Path, staging_dir: &Path) -> Result<u64, ArchiveError>;
}

/// Archive formats recognised by [`ArchiveExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarZst,
}

impl ArchiveFormat {
    /// Detects the format from a file name.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") || name.ends_with(".nupkg") || name.ends_with(".jar") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extracts zip and tar-family packages from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveExtractor;

impl PackageExtractor for ArchiveExtractor {
    fn extract(&self, package: &Path, staging_dir: &Path) -> Result<u64, ArchiveError> {
        if !package.exists() {
            return Err(ArchiveError::PackageNotFound(package.display().to_string()));
        }

        let format = ArchiveFormat::detect(package)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(package.display().to_string()))?;

        log::info!(
            "Extracting {} -> {}",
            package.display(),
            staging_dir.display()
        );

        std::fs::create_dir_all(staging_dir).map_err(|e| io_error(staging_dir, e))?;

        let file = std::fs::File::open(package).map_err(|e| io_error(package, e))?;

        match format {
            ArchiveFormat::Zip => {
                let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip {
                    path: package.display().to_string(),
                    source: e,
                })?;
                archive
                    .extract(staging_dir)
                    .map_err(|e| ArchiveError::Zip {
                        path: package.display().to_string(),
                        source: e,
                    })?;
            }
            ArchiveFormat::Tar => {
                tar::Archive::new(file)
                    .unpack(staging_dir)
                    .map_err(|e| io_error(staging_dir, e))?;
            }
            ArchiveFormat::TarGz => {
                let decoder = flate2::read::GzDecoder::new(file);
                tar::Archive::new(decoder)
                    .unpack(staging_dir)
                    .map_err(|e| io_error(staging_dir, e))?;
            }
            ArchiveFormat::TarZst => {
                let decoder = zstd::Decoder::new(file).map_err(|e| io_error(package, e))?;
                tar::Archive::new(decoder)
                    .unpack(staging_dir)
                    .map_err(|e| io_error(staging_dir, e))?;
            }
        }

        let count = std::fs::read_dir(staging_dir)
            .map_err(|e| io_error(staging_dir, e))?
            .count() as u64;

        log::info!("  extracted {count} entries");

        Ok(count)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.display().to_string(),
        source,
    }
}
