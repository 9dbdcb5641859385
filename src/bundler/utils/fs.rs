//! File system utilities for bundling.
//!
//! Provides file operations with automatic directory creation,
//! symlink preservation, and path-aware error reporting.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{io, path::Path};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }

    // create_dir_all is already idempotent - succeeds even if dir exists
    fs::create_dir_all(path)
        .await
        .fs_context("failed to create directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("failed to remove directory", path),
    }
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("failed to remove file", path),
    }
}

/// Makes a symbolic link.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Makes a symbolic link.
#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Permission bits travel with the content, so executables stay executable.
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::GenericError(format!("{from:?} does not exist")));
    }
    if !from.is_file() {
        return Err(Error::GenericError(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("failed to create directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("failed to copy", from)?;
    Ok(())
}

/// Recursively copies a directory from one path to another, creating any
/// parent directories of the destination path as necessary.
///
/// Preserves symlinks on platforms that support them.
/// Fails if the source path is not a directory or doesn't exist.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::GenericError(format!("{from:?} does not exist")));
    }
    if !from.is_dir() {
        return Err(Error::GenericError(format!("{from:?} is not a Directory")));
    }

    let from = from.to_path_buf();
    let to = to.to_path_buf();

    // Offload blocking work to dedicated thread pool
    tokio::task::spawn_blocking(move || -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).fs_context("failed to create directory", parent)?;
        }

        for entry in walkdir::WalkDir::new(&from) {
            let entry = entry?;
            let rel_path = entry.path().strip_prefix(&from)?;
            let dest_path = to.join(rel_path);

            if entry.file_type().is_symlink() {
                let target = std::fs::read_link(entry.path())
                    .fs_context("failed to read link", entry.path())?;
                symlink(&target, &dest_path).fs_context("failed to create link", &dest_path)?;
            } else if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest_path)
                    .fs_context("failed to create directory", &dest_path)?;
            } else {
                std::fs::copy(entry.path(), &dest_path)
                    .fs_context("failed to copy", entry.path())?;
            }
        }

        Ok(())
    })
    .await
    .map_err(|e| Error::GenericError(format!("Directory copy task panicked: {}", e)))?
}
