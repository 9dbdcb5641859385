//! macOS DMG disk image creator.
//!
//! Creates drag-to-install DMG files using the native hdiutil tool, then
//! signs the image itself with the application identity.

mod creation;

pub use creation::create_dmg;

use super::{identity::SigningIdentity, sign::CodeSigner, tools::ToolRunner};
use crate::bundler::error::Result;
use std::{path::Path, sync::Arc};

/// Builds the disk image for `app_bundle` and signs it.
///
/// The image carries no entitlements; only the bundle inside it does.
pub async fn package_dmg<R: ToolRunner>(
    runner: &Arc<R>,
    app_bundle: &Path,
    dmg_path: &Path,
    volume_name: &str,
    identity: &SigningIdentity,
) -> Result<()> {
    create_dmg(runner.as_ref(), app_bundle, dmg_path, volume_name).await?;
    CodeSigner::new(Arc::clone(runner))
        .sign_file(dmg_path, identity, None)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{identity::test_support::app_identity, tools::fake::FakeRunner};
    use super::*;

    #[tokio::test]
    async fn image_is_signed_after_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("First App.app");
        std::fs::create_dir_all(app.join("Contents")).unwrap();
        let dmg = tmp.path().join("First App-0.0.1.dmg");

        let runner = Arc::new(FakeRunner::new());
        package_dmg(&runner, &app, &dmg, "First App 0.0.1", &app_identity())
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program(), "hdiutil");
        assert_eq!(calls[1].program(), "codesign");
        let sign_args = calls[1].args_lossy();
        assert_eq!(sign_args[0], dmg.display().to_string());
        assert!(!sign_args.iter().any(|a| a == "--entitlements"));
        assert!(sign_args.iter().any(|a| a == "runtime"));
    }
}
