//! `lipo` wrapper: fat binary creation, architecture inspection and thinning.

use super::tools::{Invocation, ToolRunner};
use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

const NON_FAT_PREFIX: &str = "Non-fat file: ";
const FAT_PREFIX: &str = "Architectures in the fat file: ";

/// Architectures reported by `lipo -info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Architectures {
    /// A thin binary with exactly one slice.
    Thin(String),
    /// A fat binary; slices in the order lipo reported them.
    Fat(Vec<String>),
}

impl Architectures {
    /// Parses `lipo -info` stdout. Returns `None` for any other shape.
    pub fn parse(output: &str) -> Option<Self> {
        let output = output.trim();
        if output.starts_with(NON_FAT_PREFIX) {
            let arch = output.rsplit_once(" is architecture: ")?.1.trim();
            if arch.is_empty() || arch.contains(char::is_whitespace) {
                return None;
            }
            Some(Self::Thin(arch.to_string()))
        } else if output.starts_with(FAT_PREFIX) {
            // The path itself may contain ':' so split on the last one.
            let archs: Vec<String> = output
                .rsplit_once(':')?
                .1
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if archs.is_empty() {
                return None;
            }
            Some(Self::Fat(archs))
        } else {
            None
        }
    }

    pub fn contains(&self, arch: &str) -> bool {
        match self {
            Self::Thin(a) => a == arch,
            Self::Fat(archs) => archs.iter().any(|a| a == arch),
        }
    }
}

/// Drives the `lipo` tool through a [`ToolRunner`].
pub struct Lipo<R> {
    runner: Arc<R>,
}

impl<R> Clone for Lipo<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: ToolRunner> Lipo<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Combines the copies of `relative_path` found under `sources` into
    /// one fat file at `destination/relative_path`.
    ///
    /// Sources that lack the file are skipped, so a library shipped for only
    /// some architectures still merges; a single input yields a copy.
    pub async fn merge(
        &self,
        relative_path: &Path,
        destination: &Path,
        sources: &[PathBuf],
    ) -> Result<()> {
        log::debug!("Creating fat library {}", relative_path.display());

        let output = destination.join(relative_path);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("failed to create directory", parent)?;
        }

        let inputs: Vec<PathBuf> = sources
            .iter()
            .map(|source| source.join(relative_path))
            .filter(|candidate| candidate.is_file())
            .collect();

        let invocation = Invocation::new("lipo")
            .arg("-create")
            .arg("-output")
            .arg(&output)
            .args(&inputs);

        let result = self.runner.run(&invocation).await?;
        if !result.is_success() {
            log::debug!("lipo -create failed: {}", result.stderr.trim());
            return Err(Error::FatMerge {
                path: relative_path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Reports the architectures contained in `path`.
    pub async fn info(&self, path: &Path) -> Result<Architectures> {
        let invocation = Invocation::new("lipo").arg("-info").arg(path);
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            return Err(Error::ArchitectureInspection {
                path: path.to_path_buf(),
            });
        }
        Architectures::parse(&output.stdout).ok_or_else(|| Error::UnparseableArchitectures {
            path: path.to_path_buf(),
        })
    }

    /// Extracts the `arch` slice of `input` into `output`.
    pub async fn thin(&self, arch: &str, input: &Path, output: &Path) -> Result<()> {
        let invocation = Invocation::new("lipo")
            .arg("-thin")
            .arg(arch)
            .arg("-output")
            .arg(output)
            .arg(input);
        let result = self.runner.run(&invocation).await?;
        if !result.is_success() {
            return Err(Error::Thin {
                path: input.to_path_buf(),
            });
        }
        Ok(())
    }
}
