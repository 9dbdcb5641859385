//! Disk image creation with hdiutil.
//!
//! The image is built from a staging directory holding a copy of the bundle
//! and an `Applications` symlink for drag-to-install.

use super::super::tools::{Invocation, ToolRunner};
use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::fs,
};
use std::path::Path;

/// Creates a compressed (UDZO) disk image of `app_bundle` at `dmg_path`.
///
/// Any previous image at `dmg_path` is removed first. The staging directory
/// is a tempdir and is cleaned up when this returns.
pub async fn create_dmg<R: ToolRunner>(
    runner: &R,
    app_bundle: &Path,
    dmg_path: &Path,
    volume_name: &str,
) -> Result<()> {
    fs::remove_file(dmg_path).await?;
    if let Some(parent) = dmg_path.parent() {
        fs::create_dir_all(parent, false).await?;
    }

    let temp_dir = tempfile::tempdir().map_err(|e| {
        Error::GenericError(format!(
            "Failed to create temporary directory for DMG contents: {e}"
        ))
    })?;
    let staging_path = temp_dir.path();

    let app_name = app_bundle
        .file_name()
        .ok_or_else(|| Error::GenericError("Invalid app bundle path".into()))?;
    let staged_app = staging_path.join(app_name);

    log::debug!("Copying .app to staging: {}", staged_app.display());
    fs::copy_dir(app_bundle, &staged_app)
        .await
        .with_context(|| {
            format!(
                "copying .app bundle to staging directory: {}",
                staged_app.display()
            )
        })?;

    let applications_link = staging_path.join("Applications");
    fs::symlink(Path::new("/Applications"), &applications_link)
        .fs_context("creating Applications symlink", &applications_link)?;

    log::info!("Creating DMG {}...", dmg_path.display());
    let invocation = Invocation::new("hdiutil")
        .args(["create", "-volname", volume_name, "-srcfolder"])
        .arg(staging_path)
        .args(["-ov", "-format", "UDZO"])
        .arg(dmg_path);
    runner.run(&invocation).await?.check(&invocation)?;

    log::info!("✓ Created DMG: {}", dmg_path.display());

    drop(temp_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::super::tools::{ToolOutput, fake::FakeRunner};
    use super::*;
    use std::path::PathBuf;

    fn app_fixture(root: &Path) -> PathBuf {
        let app = root.join("First App.app");
        std::fs::create_dir_all(app.join("Contents/MacOS")).unwrap();
        std::fs::write(app.join("Contents/MacOS/First App"), "binary").unwrap();
        app
    }

    /// Value following `flag` in the invocation.
    fn flag_value(invocation: &Invocation, flag: &str) -> PathBuf {
        let args = invocation.arguments();
        let at = args.iter().position(|a| a == flag).unwrap();
        PathBuf::from(&args[at + 1])
    }

    #[tokio::test]
    async fn stages_bundle_and_applications_link() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app_fixture(tmp.path());
        let dmg = tmp.path().join("dist/First App-0.0.1.dmg");

        let runner = FakeRunner::with_handler(|invocation| {
            let staging = flag_value(invocation, "-srcfolder");
            assert!(staging.join("First App.app/Contents/MacOS/First App").is_file());
            assert_eq!(
                std::fs::read_link(staging.join("Applications")).unwrap(),
                Path::new("/Applications")
            );
            let dmg = invocation.arguments().last().unwrap();
            std::fs::write(dmg, "image").unwrap();
            Ok(ToolOutput::success(""))
        });

        create_dmg(&runner, &app, &dmg, "First App 0.0.1").await.unwrap();

        assert!(dmg.is_file());
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let args = calls[0].args_lossy();
        assert_eq!(&args[..3], ["create", "-volname", "First App 0.0.1"]);
        assert_eq!(&args[5..8], ["-ov", "-format", "UDZO"]);
    }

    #[tokio::test]
    async fn stale_image_is_removed_before_hdiutil() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app_fixture(tmp.path());
        let dmg = tmp.path().join("First App-0.0.1.dmg");
        std::fs::write(&dmg, "stale").unwrap();

        let runner = FakeRunner::new();
        create_dmg(&runner, &app, &dmg, "First App").await.unwrap();

        assert!(!dmg.exists());
    }

    #[tokio::test]
    async fn hdiutil_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app_fixture(tmp.path());
        let runner = FakeRunner::new();
        runner.push(ToolOutput::failure(1, "hdiutil: create failed - Resource busy"));

        let err = create_dmg(&runner, &app, &tmp.path().join("a.dmg"), "A")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Resource busy"));
    }
}
