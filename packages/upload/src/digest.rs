//! Content digests of local files.

use std::path::Path;

use s3_deploy_models::ContentDigest;

/// Read buffer size for hashing.
const CHUNK_SIZE: usize = 256 * 1024;

/// Computes the MD5 digest of a local file on a blocking thread.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub async fn compute_file_digest(path: &Path) -> Result<ContentDigest, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_file_digest_sync(&path))
        .await
        .map_err(std::io::Error::other)?
}

/// Synchronous MD5 computation (runs in blocking thread).
fn compute_file_digest_sync(path: &Path) -> Result<ContentDigest, std::io::Error> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(ContentDigest::new(context.finalize().0))
}

/// MD5 of an in-memory buffer.
#[must_use]
pub fn digest_bytes(data: &[u8]) -> ContentDigest {
    let mut context = md5::Context::new();
    context.consume(data);
    ContentDigest::new(context.finalize().0)
}
