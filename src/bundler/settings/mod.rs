//! Configuration structures for release operations.
//!
//! Package metadata, macOS signing/packaging settings, and the builder that
//! assembles them.

mod arch;
mod builder;
mod bundle;
mod core;
mod macos;
mod package;

pub use arch::Arch;
pub use builder::SettingsBuilder;
pub use bundle::BundleSettings;
pub use core::Settings;
pub use macos::{DmgSettings, MacOsSettings, NotarizationSettings};
pub use package::PackageSettings;
