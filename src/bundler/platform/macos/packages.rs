//! Discovery of installed third-party packages and their native content.
//!
//! Each installed package leaves a `<name>-<version>.dist-info` directory
//! behind. Its `WHEEL` file says whether the package is pure and which
//! platform tag it was built for; `METADATA` carries the canonical name and
//! version.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// What kind of code a package ships.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageKind {
    /// Interpreted code only; identical for every architecture.
    Pure,
    /// Native code already built for every architecture.
    Universal,
    /// Native code for a single architecture.
    ArchitectureSpecific,
}

/// One package found in a dependency tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    /// The package's `.dist-info` directory.
    pub root: PathBuf,
    /// Platform tag, e.g. `cp312-cp312-macosx_11_0_arm64`.
    pub tag: String,
    pub kind: PackageKind,
}

impl InstalledPackage {
    pub fn is_binary(&self) -> bool {
        self.kind != PackageKind::Pure
    }
}

/// Scans every `*.dist-info` directory under `tree_root`.
///
/// Tags ending in `universal_suffix` mark a binary package as
/// [`PackageKind::Universal`]; without a suffix every binary package is
/// reported as architecture specific.
pub fn scan_installed_packages(
    tree_root: &Path,
    universal_suffix: Option<&str>,
) -> Result<Vec<InstalledPackage>> {
    let root = tree_root.to_str().ok_or_else(|| {
        Error::GenericError(format!(
            "Invalid dependency tree path (contains non-UTF8 characters): {}",
            tree_root.display()
        ))
    })?;
    // The root is literal text; only the suffix is a pattern.
    let pattern = Path::new(&glob::Pattern::escape(root))
        .join("**")
        .join("*.dist-info");

    let entries = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| Error::GenericError(format!("Invalid dist-info pattern: {e}")))?;

    let mut packages = Vec::new();
    for entry in entries {
        let distinfo = entry.map_err(|e| Error::GenericError(e.to_string()))?;
        if !distinfo.is_dir() {
            continue;
        }

        let wheel = read_headers(&distinfo.join("WHEEL"))?;
        let is_purelib = header(&wheel, "Root-Is-Purelib").is_some_and(|v| v == "true");
        let tag = header(&wheel, "Tag").unwrap_or_default().to_string();

        let kind = if is_purelib || tag.ends_with("-any") {
            PackageKind::Pure
        } else if universal_suffix.is_some_and(|suffix| tag.ends_with(suffix)) {
            PackageKind::Universal
        } else {
            PackageKind::ArchitectureSpecific
        };

        let metadata = read_headers(&distinfo.join("METADATA"))?;
        let name = header(&metadata, "Name")
            .ok_or_else(|| missing_header(&distinfo, "Name"))?
            .to_string();
        let version = header(&metadata, "Version")
            .ok_or_else(|| missing_header(&distinfo, "Version"))?
            .to_string();

        packages.push(InstalledPackage {
            name,
            version,
            root: distinfo,
            tag,
            kind,
        });
    }

    Ok(packages)
}

/// Returns `(name, version)` for every package that still needs
/// architecture-aware handling.
///
/// Pure packages are never reported. Packages whose tag ends in
/// `universal_suffix` are left out; when no suffix is given they are kept,
/// since the caller did not ask to tell universal packages apart.
pub fn find_binary_packages(
    tree_root: &Path,
    universal_suffix: Option<&str>,
) -> Result<BTreeSet<(String, String)>> {
    Ok(scan_installed_packages(tree_root, universal_suffix)?
        .into_iter()
        .filter(|package| package.kind == PackageKind::ArchitectureSpecific)
        .map(|package| (package.name, package.version))
        .collect())
}

fn missing_header(distinfo: &Path, name: &str) -> Error {
    Error::GenericError(format!(
        "{} has no {} in its METADATA",
        distinfo.display(),
        name
    ))
}

/// Parses an RFC 822 style header block, stopping at the first blank line.
fn read_headers(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path).fs_context("failed to read", path)?;
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            // Continuation of the previous header's value.
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(headers)
}

/// First value for `name`; header names are case-insensitive.
fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    pub fn create_installed_package(
        tree: &Path,
        name: &str,
        version: &str,
        tag: &str,
        is_purelib: bool,
    ) {
        let distinfo = tree.join(format!("{name}-{version}.dist-info"));
        std::fs::create_dir_all(&distinfo).unwrap();
        std::fs::write(
            distinfo.join("WHEEL"),
            format!(
                "Wheel-Version: 1.0\nGenerator: test\nRoot-Is-Purelib: {is_purelib}\nTag: {tag}\n"
            ),
        )
        .unwrap();
        std::fs::write(
            distinfo.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n\nLong description\nName: bogus\n"),
        )
        .unwrap();
    }
}
