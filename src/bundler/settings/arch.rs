//! CPU architecture types and utilities.

use std::{fmt, str::FromStr};

/// CPU architecture of a Mach-O slice.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_macos::bundler::Arch;
///
/// let arch: Arch = "aarch64".parse().unwrap();
/// assert_eq!(arch.lipo_name(), "arm64");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86_64 / AMD64 (64-bit) - Intel Macs
    X86_64,
    /// AArch64 / ARM64 (64-bit) - Apple Silicon
    #[serde(alias = "arm64")]
    AArch64,
}

impl Arch {
    /// The name `lipo` uses for this architecture's slice.
    pub fn lipo_name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::AArch64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lipo_name())
    }
}

impl FromStr for Arch {
    type Err = crate::bundler::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "arm64" | "aarch64" => Ok(Arch::AArch64),
            other => Err(crate::bundler::Error::GenericError(format!(
                "Unknown architecture {other:?}; expected x86_64 or arm64"
            ))),
        }
    }
}
