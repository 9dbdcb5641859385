//! Release settings from a single Cargo.toml

use crate::bundler::{BundleSettings, PackageSettings, Settings, SettingsBuilder};
use crate::error::{BundlerError, CliError, Result};
use std::path::{Path, PathBuf};

/// Package metadata extracted from Cargo.toml
pub struct PackageMetadata {
    /// Package name from Cargo.toml
    pub name: String,

    /// Package version from Cargo.toml (e.g., "0.1.0")
    pub version: String,
}

/// Complete manifest data from Cargo.toml
pub struct CargoManifest {
    /// Package metadata ([package] section)
    pub metadata: PackageMetadata,

    /// Bundle settings ([package.metadata.bundle] section)
    pub bundle_settings: BundleSettings,

    /// Directory containing the manifest.
    pub project_directory: PathBuf,
}

impl CargoManifest {
    /// Assembles release [`Settings`], writing artifacts to `dist_directory`
    /// or `<project>/dist`.
    pub fn into_settings(self, dist_directory: Option<&Path>) -> Result<Settings> {
        let product_name = self
            .bundle_settings
            .product_name
            .clone()
            .unwrap_or_else(|| self.metadata.name.clone());
        let mut builder = SettingsBuilder::new()
            .project_directory(&self.project_directory)
            .package_settings(PackageSettings {
                product_name,
                version: self.metadata.version,
            })
            .bundle_settings(self.bundle_settings);
        if let Some(dist) = dist_directory {
            builder = builder.dist_directory(dist);
        }
        Ok(builder.build()?)
    }
}

/// Load complete manifest from Cargo.toml (single read + parse)
pub fn load_manifest(cargo_toml_path: &Path) -> Result<CargoManifest> {
    let manifest = std::fs::read_to_string(cargo_toml_path).map_err(|e| {
        BundlerError::Cli(CliError::ExecutionFailed {
            command: "read_cargo_toml".to_string(),
            reason: format!("Failed to read {}: {}", cargo_toml_path.display(), e),
        })
    })?;

    let toml_value: toml::Value = toml::from_str(&manifest)?;

    let package = toml_value.get("package").ok_or_else(|| {
        BundlerError::Cli(CliError::InvalidArguments {
            reason: "No [package] section in Cargo.toml".to_string(),
        })
    })?;

    let metadata = PackageMetadata {
        name: required_str(package, "name")?,

        version: required_str(package, "version")?,
    };

    let project_directory = match cargo_toml_path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => PathBuf::from("."),
        Some(dir) => dir.to_path_buf(),
        None => {
            return Err(BundlerError::Cli(CliError::InvalidArguments {
                reason: "Invalid Cargo.toml path".to_string(),
            }));
        }
    };

    Ok(CargoManifest {
        metadata,
        bundle_settings: parse_bundle_settings(&toml_value)?,
        project_directory,
    })
}

fn required_str(package: &toml::Value, key: &str) -> Result<String> {
    package
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            BundlerError::Cli(CliError::InvalidArguments {
                reason: format!("Missing '{key}' in [package]"),
            })
        })
}

/// Parse bundle settings from [package.metadata.bundle] section
fn parse_bundle_settings(toml_value: &toml::Value) -> Result<BundleSettings> {
    match toml_value
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("bundle"))
    {
        Some(bundle) => Ok(bundle.clone().try_into()?),
        None => Ok(BundleSettings::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::PackagingFormat;

    fn write_manifest(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Cargo.toml");
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn reads_package_and_bundle_tables() {
        let (tmp, path) = write_manifest(
            r#"
            [package]
            name = "first-app"
            version = "0.0.1"
            license = "MIT"

            [package.metadata.bundle]
            product_name = "First App"
            identifier = "com.example.first"

            [package.metadata.bundle.macos]
            signing_identity = "Developer ID Application: Jane Developer (DEADBEEF)"
            packaging_format = "zip"
            entitlements = "Entitlements.plist"

            [package.metadata.bundle.dmg]
            volume_name = "First"
            "#,
        );

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.metadata.version, "0.0.1");
        let settings = manifest.into_settings(None).unwrap();

        assert_eq!(settings.product_name(), "First App");
        assert_eq!(settings.packaging_format(), PackagingFormat::Zip);
        assert_eq!(settings.bundle_identifier(), "com.example.first");
        assert_eq!(settings.volume_name(), "First");
        assert_eq!(
            settings.entitlements_path().unwrap(),
            tmp.path().join("Entitlements.plist")
        );
        assert_eq!(settings.dist_directory(), tmp.path().join("dist"));
    }

    #[test]
    fn missing_bundle_table_uses_defaults() {
        let (_tmp, path) = write_manifest(
            r#"
            [package]
            name = "tool"
            version = "1.2.3"
            "#,
        );
        let settings = load_manifest(&path).unwrap().into_settings(None).unwrap();
        assert_eq!(settings.product_name(), "tool");
        assert_eq!(settings.packaging_format(), PackagingFormat::Dmg);
        assert!(settings.macos().sign_installer);
    }

    #[test]
    fn missing_version_is_reported() {
        let (_tmp, path) = write_manifest("[package]\nname = \"tool\"\n");
        let err = load_manifest(&path).err().unwrap();
        assert!(err.to_string().contains("Missing 'version'"));
    }

    #[test]
    fn unknown_format_is_a_toml_error() {
        let (_tmp, path) = write_manifest(
            r#"
            [package]
            name = "tool"
            version = "1.2.3"

            [package.metadata.bundle.macos]
            packaging_format = "msi"
            "#,
        );
        assert!(matches!(load_manifest(&path), Err(BundlerError::Toml(_))));
    }
}
