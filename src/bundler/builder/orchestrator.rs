//! Release orchestration: sign, package, notarize.
//!
//! This module provides the [`Packager`] that takes a built app bundle to a
//! stapled distribution artifact in the configured format.

use crate::{
    bail,
    bundler::{
        BundledArtifact, Error, PackagingFormat, Result, Settings,
        error::ErrorExt,
        platform::macos::{
            archive::ditto_archive,
            dmg::package_dmg,
            identity::{IdentityPrompt, IdentityResolver, SigningIdentity},
            notarize::{Notarizer, RetryPolicy},
            pkg::{PkgOptions, package_pkg},
            sign::CodeSigner,
            tools::ToolRunner,
        },
        utils::{checksum::calculate_sha256, fs},
    },
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Main release orchestrator.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_macos::bundler::{
///     Packager, Settings,
///     platform::macos::{identity::StdinPrompt, tools::SystemToolRunner},
/// };
/// use std::{path::Path, sync::Arc};
///
/// # async fn example(settings: Settings) -> kodegen_bundler_macos::bundler::Result<()> {
/// let packager = Packager::new(settings, Arc::new(SystemToolRunner), StdinPrompt);
/// let artifact = packager.package(Path::new("build/First App.app"), None).await?;
/// println!("Created: {} ({} bytes)", artifact.path.display(), artifact.size);
/// println!("SHA256: {}", artifact.checksum);
/// # Ok(())
/// # }
/// ```
pub struct Packager<R, P> {
    settings: Settings,
    runner: Arc<R>,
    identities: IdentityResolver<R, P>,
    input_enabled: bool,
}

impl<R, P> std::fmt::Debug for Packager<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("settings", &self.settings)
            .field("input_enabled", &self.input_enabled)
            .finish()
    }
}

impl<R: ToolRunner, P: IdentityPrompt> Packager<R, P> {
    pub fn new(settings: Settings, runner: Arc<R>, prompt: P) -> Self {
        Self {
            identities: IdentityResolver::new(Arc::clone(&runner), prompt),
            settings,
            runner,
            input_enabled: true,
        }
    }

    /// Whether notary credentials may be collected interactively.
    pub fn with_input(mut self, enabled: bool) -> Self {
        self.input_enabled = enabled;
        self
    }

    /// Returns a reference to the release settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn notarizer(&self) -> Notarizer<R> {
        let polling = &self.settings.macos().notarization;
        Notarizer::new(Arc::clone(&self.runner))
            .with_retry_policy(RetryPolicy {
                max_attempts: polling.max_poll_attempts,
                delay: Duration::from_secs(polling.poll_interval_secs),
            })
            .with_profile_prefix(self.settings.macos().keychain_profile_prefix.clone())
            .with_input(self.input_enabled)
    }

    /// The format to produce, validated against the app kind.
    pub fn packaging_format(&self) -> Result<PackagingFormat> {
        let format = self.settings.packaging_format();
        if self.settings.macos().console_app && format != PackagingFormat::Pkg {
            return Err(Error::InvalidPackagingFormat(
                "macOS console apps must be distributed in PKG format.".to_string(),
            ));
        }
        Ok(format)
    }

    /// Picks the application identity: ad-hoc when configured, otherwise
    /// the configured override or an interactive choice.
    pub async fn select_identity(&self, allow_adhoc: bool) -> Result<SigningIdentity> {
        let macos = self.settings.macos();
        if macos.adhoc_sign && allow_adhoc {
            return Ok(SigningIdentity::Adhoc);
        }
        self.identities
            .select_identity(macos.signing_identity.as_deref(), allow_adhoc)
            .await
    }

    /// Decides whether to notarize with `identity`.
    ///
    /// Defaults to on for keychain identities and off for ad-hoc; asking to
    /// notarize an ad-hoc signature is an error.
    pub fn should_notarize(&self, identity: &SigningIdentity) -> Result<bool> {
        match (identity.is_adhoc(), self.settings.macos().notarize) {
            (true, Some(true)) => Err(Error::AdhocNotarization),
            (true, _) => Ok(false),
            (false, requested) => Ok(requested.unwrap_or(true)),
        }
    }

    async fn select_installer_identity(
        &self,
        identity: &SigningIdentity,
    ) -> Result<Option<SigningIdentity>> {
        let macos = self.settings.macos();
        if !macos.sign_installer || identity.is_adhoc() {
            return Ok(None);
        }
        self.identities
            .select_installer_identity(macos.installer_identity.as_deref(), identity)
            .await
            .map(Some)
    }

    /// Signs `bundle` with the configured entitlements.
    pub async fn sign(&self, bundle: &Path, identity: &SigningIdentity) -> Result<()> {
        if identity.is_adhoc() {
            log::warn!(
                "Signing {} with an ad-hoc identity. The app will run on this computer \
                 but cannot be distributed to others.",
                bundle.display()
            );
        }
        let entitlements = self.settings.entitlements_path();
        CodeSigner::new(Arc::clone(&self.runner))
            .sign_bundle(bundle, identity, entitlements.as_deref())
            .await?;
        Ok(())
    }

    /// Signs `bundle`, packages it and notarizes the result.
    ///
    /// With `resume`, signing and packaging are skipped and the run waits on
    /// the given earlier submission instead.
    pub async fn package(&self, bundle: &Path, resume: Option<&str>) -> Result<BundledArtifact> {
        let format = self.packaging_format()?;
        let dist_path = self.settings.distribution_path(format);
        fs::create_dir_all(self.settings.dist_directory(), false).await?;

        match resume {
            Some(submission_id) => self.resume(bundle, format, &dist_path, submission_id).await?,
            None => self.build(bundle, format, &dist_path).await?,
        }

        artifact(format, dist_path).await
    }

    async fn build(&self, bundle: &Path, format: PackagingFormat, dist_path: &Path) -> Result<()> {
        if !bundle.is_dir() {
            bail!("App bundle {} does not exist", bundle.display());
        }

        let identity = self.select_identity(true).await?;
        let notarize = self.should_notarize(&identity)?;
        self.sign(bundle, &identity).await?;

        match format {
            PackagingFormat::Zip => {
                if notarize {
                    log::info!("Notarizing {}...", bundle.display());
                    self.notarizer().notarize(bundle, &identity).await?;
                }
                self.archive(bundle, dist_path).await?;
            }
            PackagingFormat::Dmg => {
                package_dmg(
                    &self.runner,
                    bundle,
                    dist_path,
                    &self.settings.volume_name(),
                    &identity,
                )
                .await?;
                if notarize {
                    log::info!("Notarizing {}...", dist_path.display());
                    self.notarizer().notarize(dist_path, &identity).await?;
                }
            }
            PackagingFormat::Pkg => {
                let installer_identity = self.select_installer_identity(&identity).await?;
                package_pkg(
                    self.runner.as_ref(),
                    bundle,
                    dist_path,
                    &self.pkg_options(),
                    installer_identity.as_ref(),
                )
                .await?;
                if notarize {
                    let installer_identity = installer_identity.ok_or_else(|| {
                        Error::InvalidPackagingFormat(
                            "Notarizing a PKG requires a signed installer.".to_string(),
                        )
                    })?;
                    log::info!("Notarizing {}...", dist_path.display());
                    self.notarizer()
                        .notarize(dist_path, &installer_identity)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn resume(
        &self,
        bundle: &Path,
        format: PackagingFormat,
        dist_path: &Path,
        submission_id: &str,
    ) -> Result<()> {
        let identity = self.select_identity(false).await?;
        match format {
            PackagingFormat::Zip => {
                fs::remove_file(dist_path).await?;
                self.notarizer()
                    .resume(bundle, &identity, submission_id)
                    .await?;
                self.archive(bundle, dist_path).await?;
            }
            PackagingFormat::Dmg => {
                self.notarizer()
                    .resume(dist_path, &identity, submission_id)
                    .await?;
            }
            PackagingFormat::Pkg => {
                let installer_identity = self
                    .identities
                    .select_installer_identity(
                        self.settings.macos().installer_identity.as_deref(),
                        &identity,
                    )
                    .await?;
                self.notarizer()
                    .resume(dist_path, &installer_identity, submission_id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn archive(&self, bundle: &Path, dist_path: &Path) -> Result<()> {
        log::info!("Archiving {}...", dist_path.display());
        ditto_archive(self.runner.as_ref(), bundle, dist_path).await?;
        log::info!("✓ Created {}", dist_path.display());
        Ok(())
    }

    fn pkg_options(&self) -> PkgOptions {
        PkgOptions {
            product_name: self.settings.product_name().to_string(),
            version: self.settings.version_string().to_string(),
            identifier: self.settings.bundle_identifier(),
            license_file: self.settings.license_path(),
            console_app: self.settings.macos().console_app,
        }
    }
}

async fn artifact(format: PackagingFormat, path: PathBuf) -> Result<BundledArtifact> {
    let size = tokio::fs::metadata(&path)
        .await
        .fs_context("reading artifact metadata", &path)?
        .len();
    let checksum = calculate_sha256(&path).await?;
    Ok(BundledArtifact {
        format,
        path,
        size,
        checksum,
    })
}
