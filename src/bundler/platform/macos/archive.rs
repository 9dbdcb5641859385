//! Zip archives of app bundles via `ditto`.
//!
//! Signed bundles must keep their extended attributes and symlinks inside
//! the archive, so the zip is always produced by `ditto`.

use super::tools::{Invocation, ToolRunner};
use crate::bundler::error::Result;
use std::path::Path;

/// Archives `bundle` into `destination`, keeping the bundle directory itself
/// as the archive's top-level entry.
pub async fn ditto_archive<R: ToolRunner>(
    runner: &R,
    bundle: &Path,
    destination: &Path,
) -> Result<()> {
    let invocation = Invocation::new("ditto")
        .args(["-c", "-k", "--sequesterRsrc", "--keepParent"])
        .arg(bundle)
        .arg(destination);
    runner.run(&invocation).await?.check(&invocation)?;
    Ok(())
}
