//! External tool detection and availability checking.
//!
//! Every stage shells out to Xcode command line tools. Lookups are cached so
//! repeated stages do not re-scan `PATH`.

use crate::bundler::{
    error::{Error, Result},
    platform::PackagingFormat,
};
use std::{collections::HashMap, path::PathBuf, sync::LazyLock};

/// Every tool any stage may run.
pub const KNOWN_TOOLS: [&str; 8] = [
    "lipo",
    "codesign",
    "security",
    "xcrun",
    "ditto",
    "hdiutil",
    "pkgbuild",
    "productbuild",
];

/// Resolved location of each known tool, `None` when it is not on `PATH`.
static TOOL_PATHS: LazyLock<HashMap<&'static str, Option<PathBuf>>> = LazyLock::new(|| {
    KNOWN_TOOLS
        .iter()
        .map(|&tool| {
            let path = match which::which(tool) {
                Ok(path) => {
                    log::debug!("Found {} at: {}", tool, path.display());
                    Some(path)
                }
                Err(e) => {
                    log::debug!("{} not found in PATH: {}", tool, e);
                    None
                }
            };
            (tool, path)
        })
        .collect()
});

/// Location of `tool`, looked up once per process.
pub fn tool_path(tool: &str) -> Option<PathBuf> {
    match TOOL_PATHS.get(tool) {
        Some(path) => path.clone(),
        None => which::which(tool).ok(),
    }
}

/// Fails with [`Error::ToolNotFound`] naming the first missing tool.
pub fn verify_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if tool_path(tool).is_none() {
            return Err(Error::ToolNotFound {
                tool: tool.to_string(),
            });
        }
    }
    Ok(())
}

/// Tools a `package` run needs for `format`.
pub fn packaging_tools(format: PackagingFormat, notarize: bool) -> Vec<&'static str> {
    let mut tools = vec!["codesign", "security"];
    match format {
        PackagingFormat::Zip => tools.push("ditto"),
        PackagingFormat::Dmg => tools.push("hdiutil"),
        PackagingFormat::Pkg => tools.extend(["pkgbuild", "productbuild"]),
    }
    if notarize {
        tools.push("xcrun");
    }
    tools
}
