//! Package metadata and configuration.

/// Package metadata, mapped from the `Cargo.toml` `[package]` section.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_macos::bundler::PackageSettings;
///
/// let settings = PackageSettings {
///     product_name: "First App".into(),
///     version: "0.0.1".into(),
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct PackageSettings {
    /// Product name displayed to users.
    ///
    /// Names the distribution artifacts: `<product>-<version>.dmg`.
    pub product_name: String,

    /// Version string, e.g. "1.0.0".
    pub version: String,
}
