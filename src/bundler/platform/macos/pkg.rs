//! macOS installer package creation.
//!
//! The bundle is copied into a clean `installer/root` beside it so the
//! component plist can mark it non-relocatable, then `pkgbuild` produces the
//! component package and `productbuild` wraps it in a product archive.

use super::{
    identity::SigningIdentity,
    tools::{Invocation, ToolRunner},
};
use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::fs,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What the installer needs to know about the product.
#[derive(Clone, Debug)]
pub struct PkgOptions {
    pub product_name: String,
    pub version: String,
    /// Reverse-DNS identifier used in `Distribution.xml`.
    pub identifier: String,
    pub license_file: PathBuf,
    /// Console apps install under `/Library/<product>` and run the
    /// installer scripts.
    pub console_app: bool,
}

/// One entry of `components.plist`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ComponentEntry {
    bundle_has_strict_identifier: bool,
    bundle_is_relocatable: bool,
    bundle_is_version_checked: bool,
    bundle_overwrite_action: &'static str,
    root_relative_bundle_path: String,
}

/// Builds the installer for `app_bundle` at `pkg_path`.
///
/// The installer is signed when `installer_identity` is given.
pub async fn package_pkg<R: ToolRunner>(
    runner: &R,
    app_bundle: &Path,
    pkg_path: &Path,
    options: &PkgOptions,
    installer_identity: Option<&SigningIdentity>,
) -> Result<()> {
    log::info!("Building PKG {}...", pkg_path.display());

    if !options.license_file.is_file() {
        let dir = options
            .license_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        return Err(Error::MissingLicense { path: dir });
    }

    let bundle_dir = app_bundle
        .parent()
        .context("Invalid app bundle path")?;
    let bundle_name = app_bundle
        .file_name()
        .context("Invalid app bundle path")?
        .to_string_lossy()
        .into_owned();
    let app_name = app_bundle
        .file_stem()
        .context("Invalid app bundle path")?
        .to_string_lossy()
        .into_owned();
    let installer = bundle_dir.join("installer");

    log::debug!("Installing license...");
    fs::copy_file(&options.license_file, &installer.join("resources/LICENSE")).await?;

    log::debug!("Copying app into products folder...");
    let installed_app = installer.join("root").join(&bundle_name);
    fs::remove_dir_all(&installed_app).await?;
    fs::copy_dir(app_bundle, &installed_app).await?;

    let components_plist = installer.join("components.plist");
    write_components_plist(&components_plist, &bundle_name)?;

    let install_location = if options.console_app {
        format!("/Library/{}", options.product_name)
    } else {
        "/Applications".to_string()
    };

    let packages = installer.join("packages");
    fs::create_dir_all(&packages, true).await?;
    let component_pkg = packages.join(format!("{app_name}.pkg"));

    let mut pkgbuild = Invocation::new("pkgbuild")
        .arg("--root")
        .arg(installer.join("root"))
        .arg("--component-plist")
        .arg(&components_plist)
        .arg("--install-location")
        .arg(&install_location);
    if options.console_app {
        let scripts = installer.join("scripts");
        fs::create_dir_all(&scripts, false).await?;
        pkgbuild = pkgbuild.arg("--scripts").arg(scripts);
    }
    pkgbuild = pkgbuild.arg(&component_pkg);
    runner.run(&pkgbuild).await?.check(&pkgbuild)?;

    let distribution = installer.join("Distribution.xml");
    if !distribution.exists() {
        let xml = distribution_xml(options, &format!("{app_name}.pkg"));
        tokio::fs::write(&distribution, xml)
            .await
            .fs_context("failed to write", &distribution)?;
    }

    fs::remove_file(pkg_path).await?;
    if let Some(parent) = pkg_path.parent() {
        fs::create_dir_all(parent, false).await?;
    }

    let mut productbuild = Invocation::new("productbuild")
        .arg("--distribution")
        .arg(&distribution)
        .arg("--package-path")
        .arg(&packages)
        .arg("--resources")
        .arg(installer.join("resources"));
    if let Some(identity) = installer_identity {
        productbuild = productbuild.arg("--sign").arg(identity.id());
    }
    productbuild = productbuild.arg(pkg_path);
    runner.run(&productbuild).await?.check(&productbuild)?;

    log::info!("✓ Created PKG: {}", pkg_path.display());
    Ok(())
}

fn write_components_plist(path: &Path, bundle_name: &str) -> Result<()> {
    let components = vec![ComponentEntry {
        bundle_has_strict_identifier: true,
        bundle_is_relocatable: false,
        bundle_is_version_checked: true,
        bundle_overwrite_action: "upgrade",
        root_relative_bundle_path: bundle_name.to_string(),
    }];
    plist::to_file_xml(path, &components)?;
    Ok(())
}

/// Minimal product archive description referencing the component package.
fn distribution_xml(options: &PkgOptions, component_pkg: &str) -> String {
    let auth = if options.console_app { "root" } else { "none" };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<installer-gui-script minSpecVersion="2">
    <title>{title}</title>
    <license file="LICENSE"/>
    <options customize="never" require-scripts="false" rootVolumeOnly="true"/>
    <choices-outline>
        <line choice="default">
            <line choice="{identifier}"/>
        </line>
    </choices-outline>
    <choice id="default"/>
    <choice id="{identifier}" visible="false">
        <pkg-ref id="{identifier}"/>
    </choice>
    <pkg-ref id="{identifier}" version="{version}" onConclusion="none" auth="{auth}">{component_pkg}</pkg-ref>
</installer-gui-script>
"#,
        title = options.product_name,
        identifier = options.identifier,
        version = options.version,
    )
}
