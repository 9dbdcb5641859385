//! macOS release pipeline: universal merge, thinning, signing, notarization
//! and packaging.
//!
//! The [`Packager`] drives a whole release from [`Settings`]; the stages in
//! [`platform::macos`] can also be used on their own.

pub mod builder;
pub mod error;
pub mod platform;
pub mod settings;
pub mod utils;

use std::path::PathBuf;

pub use builder::{Packager, packaging_tools, verify_tools};
pub use error::{Error, ErrorCategory, Result};
pub use platform::PackagingFormat;
pub use settings::{
    Arch, BundleSettings, DmgSettings, MacOsSettings, NotarizationSettings, PackageSettings,
    Settings, SettingsBuilder,
};

/// A distribution artifact produced by [`Packager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundledArtifact {
    pub format: PackagingFormat,
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded SHA-256 of the file.
    pub checksum: String,
}
