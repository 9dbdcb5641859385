//! Command line argument parsing and validation.

use crate::bundler::{Arch, PackagingFormat};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// macOS release tooling for Rust applications
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_macos",
    version,
    about = "Universal binary merging, code signing and notarization for macOS app bundles",
    long_about = "Merges per-architecture dependency trees into universal ones, signs app bundles \
inside-out, and packages them as notarized zip, dmg or pkg artifacts.

Usage:
  kodegen_bundler_macos merge --output build/universal build/x86_64 build/arm64
  kodegen_bundler_macos sign 'build/First App.app' --adhoc-sign
  kodegen_bundler_macos package 'build/First App.app' --format dmg"
)]
pub struct Args {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt; fail where a choice or credentials would be needed
    #[arg(long, global = true)]
    pub no_input: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List installed packages that ship architecture-specific binaries
    Packages {
        /// Dependency tree to scan
        tree: PathBuf,

        /// Platform tag suffix of packages that are already universal
        #[arg(long, default_value = "universal2")]
        universal_suffix: String,
    },

    /// Merge per-architecture dependency trees into one universal tree
    Merge {
        /// Destination tree; replaced if it exists
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Source trees, in precedence order
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,
    },

    /// Strip every universal library in a tree down to one architecture
    Thin {
        tree: PathBuf,

        /// Architecture to keep (x86_64 or arm64)
        #[arg(long)]
        arch: Arch,
    },

    /// Sign an app bundle and everything inside it
    Sign {
        bundle: PathBuf,

        #[command(flatten)]
        identity: IdentityArgs,

        /// Entitlements applied to the outermost bundle
        #[arg(long, value_name = "PATH")]
        entitlements: Option<PathBuf>,
    },

    /// Sign, package and notarize an app bundle
    Package {
        bundle: PathBuf,

        /// Manifest holding [package.metadata.bundle]
        #[arg(long, default_value = "Cargo.toml", value_name = "PATH")]
        manifest: PathBuf,

        #[arg(long)]
        format: Option<PackagingFormat>,

        /// Where the artifact is written [default: <manifest dir>/dist]
        #[arg(long, value_name = "DIR")]
        dist_dir: Option<PathBuf>,

        #[command(flatten)]
        identity: IdentityArgs,

        /// Skip notarization
        #[arg(long)]
        no_notarize: bool,

        /// Installer signing identity (pkg only)
        #[arg(long, conflicts_with = "no_sign_installer")]
        installer_identity: Option<String>,

        /// Leave the pkg installer unsigned
        #[arg(long)]
        no_sign_installer: bool,

        /// Wait on an earlier notarization submission instead of submitting
        #[arg(long, value_name = "SUBMISSION_ID")]
        resume: Option<String>,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct IdentityArgs {
    /// Signing identity: the 40 digit hex checksum, or the identity's name
    #[arg(long, conflicts_with = "adhoc_sign")]
    pub identity: Option<String>,

    /// Sign with the ad-hoc identity. The app will only run on this machine
    #[arg(long)]
    pub adhoc_sign: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
