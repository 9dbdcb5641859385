//! SHA-256 digests of files.
//!
//! Used to report finished artifacts and to detect non-binary files whose
//! content differs between architecture-specific source trees.

use crate::{
    bail,
    bundler::error::{ErrorExt, Result},
};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hex-encoded SHA-256 of a finished artifact file.
///
/// Artifacts are always single files (zip, dmg or pkg); anything else is
/// an error.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading metadata for hashing", path)?;
    if !metadata.is_file() {
        bail!("Cannot hash {}: not a regular file", path.display());
    }

    let mut hasher = Sha256::new();
    hash_file_into(path, &mut hasher).await?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Blocking variant of [`calculate_sha256`] for use inside
/// `spawn_blocking` traversals.
pub fn calculate_file_sha256_blocking(file_path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(file_path).fs_context("opening file for hashing", file_path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .fs_context("reading file for hash calculation", file_path)?;
    Ok(format!("{:x}", hasher.finalize()))
}

async fn hash_file_into(path: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(())
}
