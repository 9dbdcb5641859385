//! macOS platform-specific settings.

use crate::bundler::platform::PackagingFormat;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_license_file() -> PathBuf {
    PathBuf::from("LICENSE")
}

fn default_profile_prefix() -> String {
    "kodegen-macos".to_string()
}

/// Signing, notarization and packaging configuration.
///
/// # Configuration
///
/// Add to `Cargo.toml`:
///
/// ```toml
/// [package.metadata.bundle.macos]
/// signing_identity = "Developer ID Application: Your Name (TEAMID)"
/// entitlements = "entitlements.plist"
/// packaging_format = "dmg"
///
/// [package.metadata.bundle.macos.notarization]
/// poll_interval_secs = 10
/// ```
///
/// # See Also
///
/// - [`DmgSettings`] - DMG disk image configuration
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct MacOsSettings {
    /// Code signing identity: a 40 hex digit checksum, or (part of) a name.
    ///
    /// Example: "Developer ID Application: Your Name (TEAMID)"
    ///
    /// Default: None (choose interactively)
    pub signing_identity: Option<String>,

    /// Sign with the ad-hoc identity. The result runs locally but cannot be
    /// notarized or redistributed.
    ///
    /// Default: false
    pub adhoc_sign: bool,

    /// Path to entitlements.plist, relative to the manifest.
    ///
    /// Applied only to the outermost bundle.
    ///
    /// Default: None
    pub entitlements: Option<PathBuf>,

    /// Installer signing identity for pkg output.
    ///
    /// Default: None (choose interactively)
    pub installer_identity: Option<String>,

    /// Sign pkg installers. Ignored for other formats.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub sign_installer: bool,

    /// Notarize the artifact.
    ///
    /// Default: None (on for real identities, off for ad-hoc)
    pub notarize: Option<bool>,

    /// Distribution format.
    ///
    /// Default: None (dmg, or pkg for console apps)
    pub packaging_format: Option<PackagingFormat>,

    /// License file bundled into pkg installers, relative to the manifest.
    ///
    /// Default: "LICENSE"
    #[serde(default = "default_license_file")]
    pub license_file: PathBuf,

    /// Command line tool rather than a GUI app. Console apps are only
    /// distributed as pkg installers.
    ///
    /// Default: false
    pub console_app: bool,

    /// Keychain profile name prefix for notary credentials; the team id is
    /// appended.
    ///
    /// Default: "kodegen-macos"
    #[serde(default = "default_profile_prefix")]
    pub keychain_profile_prefix: String,

    /// Notarization polling.
    pub notarization: NotarizationSettings,
}

impl Default for MacOsSettings {
    fn default() -> Self {
        Self {
            signing_identity: None,
            adhoc_sign: false,
            entitlements: None,
            installer_identity: None,
            sign_installer: true,
            notarize: None,
            packaging_format: None,
            license_file: default_license_file(),
            console_app: false,
            keychain_profile_prefix: default_profile_prefix(),
            notarization: NotarizationSettings::default(),
        }
    }
}

/// How long to wait for a notarization verdict.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct NotarizationSettings {
    /// Seconds between status checks.
    ///
    /// Default: 10
    pub poll_interval_secs: u64,

    /// Status checks before giving up.
    ///
    /// Default: 360 (one hour at the default interval)
    pub max_poll_attempts: u32,
}

impl Default for NotarizationSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_poll_attempts: 360,
        }
    }
}

/// macOS DMG disk image configuration.
///
/// ```toml
/// [package.metadata.bundle.dmg]
/// volume_name = "First App"
/// ```
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct DmgSettings {
    /// Name of the mounted volume.
    ///
    /// Default: None ("<product> <version>")
    #[serde(default)]
    pub volume_name: Option<String>,
}
