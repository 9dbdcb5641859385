//! Bundle configuration.

use super::{DmgSettings, MacOsSettings};

/// Bundle configuration from `[package.metadata.bundle]`.
///
/// # Configuration
///
/// ```toml
/// [package.metadata.bundle]
/// product_name = "Example App"
/// identifier = "com.example.app"
///
/// [package.metadata.bundle.macos]
/// signing_identity = "Developer ID Application: Example Inc. (TEAMID)"
/// ```
///
/// # See Also
///
/// - [`MacOsSettings`] - signing, notarization and packaging configuration
/// - [`DmgSettings`] - DMG disk image configuration
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BundleSettings {
    /// User-facing product name, e.g. "First App".
    ///
    /// Default: None (the package name)
    #[serde(default)]
    pub product_name: Option<String>,

    /// Bundle identifier in reverse domain notation.
    ///
    /// Example: "com.example.app", "ai.kodegen.app"
    ///
    /// Default: None
    #[serde(default)]
    pub identifier: Option<String>,

    /// macOS-specific settings.
    #[serde(default)]
    pub macos: MacOsSettings,

    /// DMG-specific settings.
    #[serde(default)]
    pub dmg: DmgSettings,
}
