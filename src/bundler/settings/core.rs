//! Core Settings struct and implementations.

use super::{BundleSettings, DmgSettings, MacOsSettings, PackageSettings};
use crate::bundler::platform::PackagingFormat;
use std::path::{Path, PathBuf};

/// Main settings for a release.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder).
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_macos::bundler::{PackageSettings, PackagingFormat, SettingsBuilder};
///
/// # fn example() -> kodegen_bundler_macos::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .project_directory(".")
///     .package_settings(PackageSettings {
///         product_name: "First App".into(),
///         version: "0.0.1".into(),
///     })
///     .build()?;
/// assert!(settings.distribution_path(PackagingFormat::Dmg).ends_with("First App-0.0.1.dmg"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    package: PackageSettings,
    bundle_settings: BundleSettings,

    /// Directory holding `Cargo.toml`. Relative paths in the bundle
    /// metadata resolve against it.
    project_directory: PathBuf,

    /// Where distribution artifacts are written.
    dist_directory: PathBuf,
}

impl Settings {
    pub(super) fn new(
        package: PackageSettings,
        bundle_settings: BundleSettings,
        project_directory: PathBuf,
        dist_directory: PathBuf,
    ) -> Self {
        Self {
            package,
            bundle_settings,
            project_directory,
            dist_directory,
        }
    }

    /// Returns the product name.
    pub fn product_name(&self) -> &str {
        &self.package.product_name
    }

    /// Returns the version string.
    pub fn version_string(&self) -> &str {
        &self.package.version
    }

    pub fn macos(&self) -> &MacOsSettings {
        &self.bundle_settings.macos
    }

    /// Mutable access for command line overrides.
    pub fn macos_mut(&mut self) -> &mut MacOsSettings {
        &mut self.bundle_settings.macos
    }

    pub fn dmg(&self) -> &DmgSettings {
        &self.bundle_settings.dmg
    }

    pub fn project_directory(&self) -> &Path {
        &self.project_directory
    }

    pub fn dist_directory(&self) -> &Path {
        &self.dist_directory
    }

    /// Reverse-DNS identifier, derived from the product name when the
    /// manifest has none.
    pub fn bundle_identifier(&self) -> String {
        self.bundle_settings.identifier.clone().unwrap_or_else(|| {
            let slug: String = self
                .product_name()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '-'
                    }
                })
                .collect();
            format!("com.example.{slug}")
        })
    }

    /// Format requested by configuration, falling back to pkg for console
    /// apps and dmg otherwise.
    pub fn packaging_format(&self) -> PackagingFormat {
        self.macos().packaging_format.unwrap_or(if self.macos().console_app {
            PackagingFormat::Pkg
        } else {
            PackagingFormat::Dmg
        })
    }

    /// `<dist>/<product>-<version>.<ext>`
    pub fn distribution_path(&self, format: PackagingFormat) -> PathBuf {
        self.dist_directory.join(format!(
            "{}-{}.{}",
            self.product_name(),
            self.version_string(),
            format.extension()
        ))
    }

    pub fn volume_name(&self) -> String {
        self.dmg()
            .volume_name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.product_name(), self.version_string()))
    }

    pub fn license_path(&self) -> PathBuf {
        self.project_directory.join(&self.macos().license_file)
    }

    pub fn entitlements_path(&self) -> Option<PathBuf> {
        self.macos()
            .entitlements
            .as_ref()
            .map(|path| self.project_directory.join(path))
    }
}
