//! Platform-specific packaging.

pub mod macos;

use std::{fmt, str::FromStr};

/// Distribution artifact a signed app bundle is packaged into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingFormat {
    /// `ditto` zip of the stapled bundle.
    Zip,
    /// Drag-to-install disk image.
    Dmg,
    /// Installer package.
    Pkg,
}

impl PackagingFormat {
    pub const ALL: [PackagingFormat; 3] = [Self::Zip, Self::Dmg, Self::Pkg];

    /// Distribution file suffix, including the bundle's own `.app` for zips.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "app.zip",
            Self::Dmg => "dmg",
            Self::Pkg => "pkg",
        }
    }
}

impl fmt::Display for PackagingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zip => "zip",
            Self::Dmg => "dmg",
            Self::Pkg => "pkg",
        })
    }
}

impl FromStr for PackagingFormat {
    type Err = crate::bundler::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "dmg" => Ok(Self::Dmg),
            "pkg" => Ok(Self::Pkg),
            other => Err(crate::bundler::Error::InvalidPackagingFormat(format!(
                "Unknown packaging format {other:?}; expected one of zip, dmg, pkg"
            ))),
        }
    }
}
