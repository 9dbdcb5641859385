//! Command execution for each subcommand.

use crate::bundler::{
    Arch, Packager, packaging_tools, verify_tools,
    platform::macos::{
        identity::{IdentityResolver, SigningIdentity, prompt_for},
        lipo::Lipo,
        merge::merge_dependency_trees,
        packages::{PackageKind, scan_installed_packages},
        sign::CodeSigner,
        thin::thin_tree,
        tools::SystemToolRunner,
    },
};
use crate::cli::args::IdentityArgs;
use crate::error::Result;
use crate::metadata::load_manifest;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Options of the `package` subcommand.
#[derive(Debug)]
pub struct PackageCommand {
    pub bundle: PathBuf,
    pub manifest: PathBuf,
    pub format: Option<crate::bundler::PackagingFormat>,
    pub dist_dir: Option<PathBuf>,
    pub identity: IdentityArgs,
    pub no_notarize: bool,
    pub installer_identity: Option<String>,
    pub no_sign_installer: bool,
    pub resume: Option<String>,
}

/// Prints every binary package in `tree`, marking the universal ones.
pub fn packages(tree: &Path, universal_suffix: &str) -> Result<()> {
    let mut packages = scan_installed_packages(tree, Some(universal_suffix))?;
    packages.retain(|package| package.is_binary());
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    if packages.is_empty() {
        println!("No binary packages found in {}", tree.display());
        return Ok(());
    }
    for package in packages {
        let universal = if package.kind == PackageKind::Universal {
            " (universal)"
        } else {
            ""
        };
        println!("{} {} [{}]{}", package.name, package.version, package.tag, universal);
    }
    Ok(())
}

pub async fn merge(output: &Path, sources: &[PathBuf]) -> Result<()> {
    let lipo = Lipo::new(Arc::new(SystemToolRunner));
    let summary = merge_dependency_trees(&lipo, output, sources).await?;
    println!(
        "Merged {} libraries and copied {} files into {}",
        summary.merged.len(),
        summary.copied.len(),
        output.display()
    );
    Ok(())
}

pub async fn thin(tree: &Path, arch: Arch) -> Result<()> {
    let lipo = Lipo::new(Arc::new(SystemToolRunner));
    let thinned = thin_tree(&lipo, tree, arch.lipo_name()).await?;
    println!("Thinned {} libraries to {}", thinned.len(), arch);
    Ok(())
}

pub async fn sign(
    bundle: &Path,
    identity: &IdentityArgs,
    entitlements: Option<&Path>,
    input_enabled: bool,
) -> Result<()> {
    let runner = Arc::new(SystemToolRunner);
    let chosen = if identity.adhoc_sign {
        verify_tools(&["codesign"])?;
        SigningIdentity::Adhoc
    } else {
        verify_tools(&["codesign", "security"])?;
        IdentityResolver::new(Arc::clone(&runner), prompt_for(input_enabled))
            .select_identity(identity.identity.as_deref(), true)
            .await?
    };
    CodeSigner::new(runner)
        .sign_bundle(bundle, &chosen, entitlements)
        .await?;
    Ok(())
}

pub async fn package(command: PackageCommand, input_enabled: bool) -> Result<()> {
    let mut settings =
        load_manifest(&command.manifest)?.into_settings(command.dist_dir.as_deref())?;

    let macos = settings.macos_mut();
    if let Some(format) = command.format {
        macos.packaging_format = Some(format);
    }
    if command.identity.adhoc_sign {
        macos.adhoc_sign = true;
    }
    if let Some(identity) = command.identity.identity {
        macos.signing_identity = Some(identity);
        macos.adhoc_sign = false;
    }
    if command.no_notarize {
        macos.notarize = Some(false);
    }
    if let Some(identity) = command.installer_identity {
        macos.installer_identity = Some(identity);
    }
    if command.no_sign_installer {
        macos.sign_installer = false;
    }

    let notarize = command.resume.is_some() || settings.macos().notarize != Some(false);
    verify_tools(&packaging_tools(settings.packaging_format(), notarize))?;

    let packager = Packager::new(settings, Arc::new(SystemToolRunner), prompt_for(input_enabled))
        .with_input(input_enabled);
    let artifact = packager
        .package(&command.bundle, command.resume.as_deref())
        .await?;

    println!("{}", artifact.path.display());
    println!("  size: {} bytes", artifact.size);
    println!("  sha256: {}", artifact.checksum);
    Ok(())
}
