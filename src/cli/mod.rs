//! Command line interface for the macOS release tooling.

mod args;
pub mod commands;

pub use args::{Args, Command, IdentityArgs};

use crate::error::Result;
use commands::PackageCommand;

/// Main CLI entry point
pub async fn run(args: Args) -> Result<i32> {
    let input_enabled = !args.no_input;

    match args.command {
        Command::Packages {
            tree,
            universal_suffix,
        } => commands::packages(&tree, &universal_suffix)?,
        Command::Merge { output, sources } => commands::merge(&output, &sources).await?,
        Command::Thin { tree, arch } => commands::thin(&tree, arch).await?,
        Command::Sign {
            bundle,
            identity,
            entitlements,
        } => commands::sign(&bundle, &identity, entitlements.as_deref(), input_enabled).await?,
        Command::Package {
            bundle,
            manifest,
            format,
            dist_dir,
            identity,
            no_notarize,
            installer_identity,
            no_sign_installer,
            resume,
        } => {
            commands::package(
                PackageCommand {
                    bundle,
                    manifest,
                    format,
                    dist_dir,
                    identity,
                    no_notarize,
                    installer_identity,
                    no_sign_installer,
                    resume,
                },
                input_enabled,
            )
            .await?
        }
    }

    Ok(0)
}
