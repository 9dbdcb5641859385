//! Merging per-architecture dependency trees into one universal tree.
//!
//! Shared libraries are combined with `lipo`; every other file is taken
//! from the first source that has it.

use super::{classify::is_shared_library, lipo::Lipo, tools::ToolRunner};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    utils::{checksum::calculate_file_sha256_blocking, fs, parallel::for_each_bounded},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

/// What a merge produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Relative paths copied from their first source.
    pub copied: BTreeSet<PathBuf>,
    /// Relative paths produced by `lipo -create`.
    pub merged: BTreeSet<PathBuf>,
}

/// Merges `sources` (one tree per architecture, in priority order) into
/// `destination`.
///
/// `destination` is removed and recreated first, so a destination that
/// overlaps a source is rejected before anything is touched. Shared
/// libraries present in any source are fat-merged; everything else is
/// copied from the first source containing it, permission bits included.
/// Symbolic links are recreated, never followed. If no shared library
/// exists in any source, `lipo` is never invoked.
pub async fn merge_dependency_trees<R: ToolRunner>(
    lipo: &Lipo<R>,
    destination: &Path,
    sources: &[PathBuf],
) -> Result<MergeSummary> {
    reject_overlap(destination, sources)?;
    fs::create_dir_all(destination, true).await?;

    let overlay = {
        let destination = destination.to_path_buf();
        let sources = sources.to_vec();
        tokio::task::spawn_blocking(move || overlay_sources(&destination, &sources))
            .await
            .map_err(|e| Error::GenericError(format!("Merge task panicked: {e}")))??
    };

    if overlay.libraries.is_empty() {
        log::info!("No libraries require merging.");
    } else {
        log::info!("Merging {} libraries...", overlay.libraries.len());
        let destination = destination.to_path_buf();
        let sources = sources.to_vec();
        for_each_bounded(overlay.libraries.iter().cloned().collect(), |relative_path| {
            let lipo = lipo.clone();
            let destination = destination.clone();
            let sources = sources.clone();
            async move { lipo.merge(&relative_path, &destination, &sources).await }
        })
        .await?;
    }

    Ok(MergeSummary {
        copied: overlay.copied.into_keys().collect(),
        merged: overlay.libraries,
    })
}

fn reject_overlap(destination: &Path, sources: &[PathBuf]) -> Result<()> {
    let resolved_destination = resolve(destination)?;
    for source in sources {
        let resolved_source = resolve(source)?;
        if resolved_destination.starts_with(&resolved_source)
            || resolved_source.starts_with(&resolved_destination)
        {
            return Err(Error::MergeOverlap {
                destination: destination.to_path_buf(),
                source: source.clone(),
            });
        }
    }
    Ok(())
}

/// Absolute form of `path` with links resolved as far as the path exists.
fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path).fs_context("failed to resolve path", path)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(resolve(parent)?.join(name)),
        _ => Ok(absolute),
    }
}

struct Overlay {
    /// Copied path → digest of the copied content.
    copied: BTreeMap<PathBuf, String>,
    libraries: BTreeSet<PathBuf>,
}

/// First pass: lay down directories and non-library files, collecting the
/// shared libraries for the fat-merge pass.
fn overlay_sources(destination: &Path, sources: &[PathBuf]) -> Result<Overlay> {
    let mut overlay = Overlay {
        copied: BTreeMap::new(),
        libraries: BTreeSet::new(),
    };

    for source in sources {
        let label = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        log::debug!("Merging {}...", label);

        let walker = walkdir::WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            let relative_path = entry.path().strip_prefix(source)?.to_path_buf();
            let target = destination.join(&relative_path);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                std::fs::create_dir_all(&target)
                    .fs_context("failed to create directory", &target)?;
                continue;
            }

            if overlay.libraries.contains(&relative_path) {
                continue;
            }

            if file_type.is_file() && is_shared_library(&relative_path) {
                if overlay.copied.contains_key(&relative_path) {
                    log::warn!(
                        "{} is a library in {} but was already copied from an earlier source; keeping the copy.",
                        relative_path.display(),
                        label
                    );
                } else {
                    overlay.libraries.insert(relative_path);
                }
                continue;
            }

            let digest = entry_digest(entry.path(), file_type.is_symlink())?;
            match overlay.copied.get(&relative_path) {
                Some(first) => {
                    if *first != digest && !is_expected_difference(&relative_path) {
                        log::warn!(
                            "{} has different content between sources; ignoring {} version.",
                            relative_path.display(),
                            label
                        );
                    }
                }
                None => {
                    copy_entry(entry.path(), &target, file_type.is_symlink())?;
                    overlay.copied.insert(relative_path, digest);
                }
            }
        }
    }

    Ok(overlay)
}

/// Bytecode caches and package metadata legitimately differ per platform.
fn is_expected_difference(relative_path: &Path) -> bool {
    let in_pycache = relative_path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|name| name == "__pycache__");
    let in_distinfo = relative_path
        .components()
        .next()
        .and_then(|first| Path::new(first.as_os_str()).extension().map(|e| e == "dist-info"))
        .unwrap_or(false);
    in_pycache || in_distinfo
}

fn entry_digest(path: &Path, is_symlink: bool) -> Result<String> {
    if is_symlink {
        let target = std::fs::read_link(path).fs_context("failed to read link", path)?;
        Ok(format!("link:{}", target.display()))
    } else {
        calculate_file_sha256_blocking(path)
    }
}

fn copy_entry(from: &Path, to: &Path, is_symlink: bool) -> Result<()> {
    if is_symlink {
        let target = std::fs::read_link(from).fs_context("failed to read link", from)?;
        fs::symlink(&target, to).fs_context("failed to create link", to)?;
    } else {
        // std::fs::copy carries the permission bits across.
        std::fs::copy(from, to).fs_context("failed to copy", from)?;
    }
    Ok(())
}
