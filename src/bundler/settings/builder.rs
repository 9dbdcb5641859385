//! Builder for constructing Settings.

use super::{BundleSettings, PackageSettings, Settings};
use std::path::{Path, PathBuf};

/// Builder for constructing [`Settings`].
///
/// # See Also
///
/// - [`Settings`] - The built settings struct
#[derive(Default)]
pub struct SettingsBuilder {
    project_directory: Option<PathBuf>,
    dist_directory: Option<PathBuf>,
    package_settings: Option<PackageSettings>,
    bundle_settings: BundleSettings,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the directory holding `Cargo.toml`.
    ///
    /// Default: the current directory
    pub fn project_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets where distribution artifacts are written.
    ///
    /// Default: `<project directory>/dist`
    pub fn dist_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dist_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets package metadata.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn package_settings(mut self, settings: PackageSettings) -> Self {
        self.package_settings = Some(settings);
        self
    }

    /// Sets bundle configuration.
    ///
    /// Default: Empty [`BundleSettings`]
    pub fn bundle_settings(mut self, settings: BundleSettings) -> Self {
        self.bundle_settings = settings;
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `package_settings` is missing or names no product.
    pub fn build(self) -> crate::bundler::Result<Settings> {
        use crate::bundler::error::Context;

        let package = self
            .package_settings
            .context("package_settings is required")?;
        if package.product_name.is_empty() {
            crate::bail!("package_settings.product_name must not be empty");
        }

        let project_directory = self.project_directory.unwrap_or_else(|| PathBuf::from("."));
        let dist_directory = self
            .dist_directory
            .unwrap_or_else(|| project_directory.join("dist"));

        Ok(Settings::new(
            package,
            self.bundle_settings,
            project_directory,
            dist_directory,
        ))
    }
}
