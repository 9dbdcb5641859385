//! Code signing of application bundles.
//!
//! Signing works from the inside out: every Mach-O object, framework and
//! nested app is signed before the container that holds it, and the outer
//! bundle is signed last with the project's entitlements.
//!
//! [`plan_signing`] flattens the bundle into batches by nesting height. A
//! leaf object has height 0; a container sits one above the tallest target
//! inside it. Batches are signed in height order with a barrier between them,
//! and targets within a batch are signed concurrently.

use super::{
    classify::{EntryKind, classify},
    identity::SigningIdentity,
    tools::{Invocation, ToolRunner},
};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    utils::parallel::for_each_bounded,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// `codesign` stderr fragments meaning the object needs no signature.
const NOT_SIGNABLE: &[&str] = &[
    // Matches the Mach-O magic but isn't a Mach-O binary.
    "unsupported format for signature",
    // A `.framework` directory that isn't a real framework.
    "bundle format unrecognized, invalid, or unsuitable",
];

/// One object to pass to `codesign`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignTarget {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Only the outer bundle carries entitlements.
    pub entitlements: Option<PathBuf>,
}

/// Ordered signing work for one bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SigningPlan {
    /// Batches in signing order; the last one holds only the outer bundle.
    pub batches: Vec<Vec<SignTarget>>,
}

impl SigningPlan {
    /// Every target in the order its batch is signed.
    pub fn targets(&self) -> impl Iterator<Item = &SignTarget> {
        self.batches.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Walks `bundle` (without following symlinks) and orders its signable
/// content children-first.
pub fn plan_signing(bundle: &Path, entitlements: Option<&Path>) -> Result<SigningPlan> {
    let mut found: Vec<(usize, SignTarget)> = Vec::new();
    collect(bundle, &mut found)?;

    let mut batches: Vec<Vec<SignTarget>> = Vec::new();
    for (height, target) in found {
        if batches.len() <= height {
            batches.resize_with(height + 1, Vec::new);
        }
        batches[height].push(target);
    }

    batches.push(vec![SignTarget {
        path: bundle.to_path_buf(),
        kind: classify(bundle)?,
        entitlements: entitlements.map(Path::to_path_buf),
    }]);

    Ok(SigningPlan { batches })
}

/// Records every signable target below `dir`; returns the height of the
/// tallest one, or `None` if there were none.
fn collect(dir: &Path, found: &mut Vec<(usize, SignTarget)>) -> Result<Option<usize>> {
    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
        .fs_context("failed to read directory", dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .fs_context("failed to read directory", dir)?;
    children.sort();

    let mut tallest: Option<usize> = None;
    for child in children {
        let kind = classify(&child)?;
        let height = match kind {
            EntryKind::Directory => collect(&child, found)?,
            EntryKind::AppBundle | EntryKind::Framework => {
                let height = collect(&child, found)?.map_or(0, |h| h + 1);
                found.push((height, target(child, kind)));
                Some(height)
            }
            EntryKind::MachOBinary => {
                found.push((0, target(child, kind)));
                Some(0)
            }
            EntryKind::Other => None,
        };
        tallest = tallest.max(height);
    }
    Ok(tallest)
}

fn target(path: PathBuf, kind: EntryKind) -> SignTarget {
    SignTarget {
        path,
        kind,
        entitlements: None,
    }
}

/// Whether `codesign` actually signed the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignOutcome {
    Signed,
    NotRequired,
}

/// Drives `codesign` through a [`ToolRunner`].
pub struct CodeSigner<R> {
    runner: Arc<R>,
}

impl<R> Clone for CodeSigner<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: ToolRunner> CodeSigner<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Signs one object, replacing any existing signature.
    ///
    /// Real identities get the hardened runtime; the ad-hoc identity does not.
    pub async fn sign_file(
        &self,
        path: &Path,
        identity: &SigningIdentity,
        entitlements: Option<&Path>,
    ) -> Result<SignOutcome> {
        let mut invocation = Invocation::new("codesign")
            .arg(path)
            .arg("--sign")
            .arg(identity.id())
            .arg("--force");
        if let Some(entitlements) = entitlements {
            invocation = invocation.arg("--entitlements").arg(entitlements);
        }
        if !identity.is_adhoc() {
            invocation = invocation.arg("--options").arg("runtime");
        }

        log::debug!("Signing {}", path.display());
        let output = self.runner.run(&invocation).await?;
        if output.is_success() {
            return Ok(SignOutcome::Signed);
        }

        if NOT_SIGNABLE.iter().any(|msg| output.stderr.contains(msg)) {
            log::debug!("... {} does not require a signature", path.display());
            return Ok(SignOutcome::NotRequired);
        }

        log::debug!("codesign failed: {}", output.stderr.trim());
        Err(Error::Signing {
            path: path.to_path_buf(),
        })
    }

    /// Signs `bundle` and everything signable inside it.
    pub async fn sign_bundle(
        &self,
        bundle: &Path,
        identity: &SigningIdentity,
        entitlements: Option<&Path>,
    ) -> Result<SigningPlan> {
        log::info!("Signing {} with {}...", bundle.display(), identity.name());

        let plan = {
            let bundle = bundle.to_path_buf();
            let entitlements = entitlements.map(Path::to_path_buf);
            tokio::task::spawn_blocking(move || plan_signing(&bundle, entitlements.as_deref()))
                .await
                .map_err(|e| Error::GenericError(format!("Signing plan task panicked: {e}")))??
        };

        for batch in &plan.batches {
            for_each_bounded(batch.clone(), |target| {
                let signer = self.clone();
                let identity = identity.clone();
                async move {
                    signer
                        .sign_file(&target.path, &identity, target.entitlements.as_deref())
                        .await
                        .map(|_| ())
                }
            })
            .await?;
        }

        log::info!("✓ Signed {} ({} objects)", bundle.display(), plan.len());
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        classify::test_support::write_macho,
        identity::test_support::app_identity,
        tools::{ToolOutput, fake::FakeRunner},
    };
    use super::*;
    use std::collections::HashSet;

    /// Outer.app
    ///   Contents/MacOS/outer                       (Mach-O)
    ///   Contents/Resources/data.txt                (not signable)
    ///   Contents/Resources/lib/libfoo.dylib        (Mach-O)
    ///   Contents/Frameworks/Lib.framework/Lib      (Mach-O)
    ///   Contents/Resources/Inner.app/Contents/MacOS/inner
    ///   Contents/Resources/Inner.app/Contents/Resources/Deep.app/Contents/MacOS/deep
    fn nested_bundle() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("Outer.app");
        let contents = app.join("Contents");
        write_macho(&contents.join("MacOS/outer"));
        std::fs::create_dir_all(contents.join("Resources")).unwrap();
        std::fs::write(contents.join("Resources/data.txt"), "data").unwrap();
        write_macho(&contents.join("Resources/lib/libfoo.dylib"));
        write_macho(&contents.join("Frameworks/Lib.framework/Lib"));
        let inner = contents.join("Resources/Inner.app");
        write_macho(&inner.join("Contents/MacOS/inner"));
        write_macho(&inner.join("Contents/Resources/Deep.app/Contents/MacOS/deep"));
        (tmp, app)
    }

    fn position(lines: &[String], needle: &Path) -> usize {
        let rendered = needle.display().to_string();
        lines
            .iter()
            .position(|line| line.starts_with(&format!("codesign {rendered} ")))
            .unwrap_or_else(|| panic!("{rendered} was not signed"))
    }

    #[test]
    fn plan_orders_children_before_containers() {
        let (_tmp, app) = nested_bundle();
        let plan = plan_signing(&app, None).unwrap();
        let order: Vec<&Path> = plan.targets().map(|t| t.path.as_path()).collect();
        let at = |p: &Path| order.iter().position(|o| *o == p).unwrap();

        let inner = app.join("Contents/Resources/Inner.app");
        let deep = inner.join("Contents/Resources/Deep.app");

        assert!(at(&deep.join("Contents/MacOS/deep")) < at(&deep));
        assert!(at(&deep) < at(&inner));
        assert!(at(&inner.join("Contents/MacOS/inner")) < at(&inner));
        assert!(at(&app.join("Contents/Frameworks/Lib.framework/Lib"))
            < at(&app.join("Contents/Frameworks/Lib.framework")));
        assert_eq!(*order.last().unwrap(), app.as_path());
        assert!(!order.contains(&app.join("Contents/Resources/data.txt").as_path()));
    }

    #[test]
    fn plan_has_no_duplicates_and_only_bundle_has_entitlements() {
        let (tmp, app) = nested_bundle();
        let entitlements = tmp.path().join("Entitlements.plist");
        let plan = plan_signing(&app, Some(&entitlements)).unwrap();

        let unique: HashSet<&Path> = plan.targets().map(|t| t.path.as_path()).collect();
        assert_eq!(unique.len(), plan.len());
        // 5 leaves + framework + 2 nested apps + outer bundle
        assert_eq!(plan.len(), 9);

        let with_entitlements: Vec<&SignTarget> =
            plan.targets().filter(|t| t.entitlements.is_some()).collect();
        assert_eq!(with_entitlements.len(), 1);
        assert_eq!(with_entitlements[0].path, app);
    }

    #[test]
    fn heights_group_batches() {
        let (_tmp, app) = nested_bundle();
        let plan = plan_signing(&app, None).unwrap();
        // leaves, Deep.app + Lib.framework, Inner.app, Outer.app
        assert_eq!(plan.batches.len(), 4);
        assert_eq!(plan.batches[3].len(), 1);
        assert_eq!(plan.batches[2][0].path, app.join("Contents/Resources/Inner.app"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_signed() {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("Linked.app");
        write_macho(&app.join("Contents/Frameworks/Lib.framework/Versions/A/Lib"));
        std::os::unix::fs::symlink(
            "Versions/A/Lib",
            app.join("Contents/Frameworks/Lib.framework/Lib"),
        )
        .unwrap();

        let plan = plan_signing(&app, None).unwrap();
        assert!(
            plan.targets()
                .all(|t| t.path != app.join("Contents/Frameworks/Lib.framework/Lib"))
        );
        assert_eq!(plan.len(), 3);
    }

    #[tokio::test]
    async fn every_call_for_a_descendant_precedes_its_container() {
        let (_tmp, app) = nested_bundle();
        let runner = Arc::new(FakeRunner::new());
        CodeSigner::new(runner.clone())
            .sign_bundle(&app, &app_identity(), None)
            .await
            .unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 9);
        let inner = app.join("Contents/Resources/Inner.app");
        let deep = inner.join("Contents/Resources/Deep.app");
        assert!(position(&lines, &deep.join("Contents/MacOS/deep")) < position(&lines, &deep));
        assert!(position(&lines, &deep) < position(&lines, &inner));
        assert!(position(&lines, &inner) < position(&lines, &app));
        assert_eq!(position(&lines, &app), lines.len() - 1);
    }

    #[tokio::test]
    async fn real_identity_uses_hardened_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let entitlements = tmp.path().join("Entitlements.plist");
        CodeSigner::new(runner.clone())
            .sign_file(tmp.path(), &app_identity(), Some(&entitlements))
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![format!(
                "codesign {} --sign {} --force --entitlements {} --options runtime",
                tmp.path().display(),
                app_identity().id(),
                entitlements.display()
            )]
        );
    }

    #[tokio::test]
    async fn adhoc_identity_omits_runtime() {
        let runner = Arc::new(FakeRunner::new());
        CodeSigner::new(runner.clone())
            .sign_file(Path::new("/tmp/thing"), &SigningIdentity::Adhoc, None)
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["codesign /tmp/thing --sign - --force"]
        );
    }

    #[tokio::test]
    async fn tolerated_failures_are_not_errors() {
        let runner = Arc::new(FakeRunner::new());
        runner.push(ToolOutput::failure(
            1,
            "/tmp/thing: unsupported format for signature",
        ));
        runner.push(ToolOutput::failure(
            1,
            "/tmp/Fake.framework: bundle format unrecognized, invalid, or unsuitable",
        ));
        let signer = CodeSigner::new(runner);
        let identity = app_identity();

        let first = signer.sign_file(Path::new("/tmp/thing"), &identity, None).await;
        let second = signer
            .sign_file(Path::new("/tmp/Fake.framework"), &identity, None)
            .await;
        assert_eq!(first.unwrap(), SignOutcome::NotRequired);
        assert_eq!(second.unwrap(), SignOutcome::NotRequired);
    }

    #[tokio::test]
    async fn other_failures_name_the_path() {
        let runner = Arc::new(FakeRunner::new());
        runner.push(ToolOutput::failure(1, "something went wrong"));
        let err = CodeSigner::new(runner)
            .sign_file(Path::new("/tmp/thing"), &app_identity(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to code sign /tmp/thing.");
    }

    #[tokio::test]
    async fn failure_stops_before_container_is_signed() {
        let (_tmp, app) = nested_bundle();
        let deep_exec = app.join("Contents/Resources/Inner.app/Contents/Resources/Deep.app/Contents/MacOS/deep");
        let failing = deep_exec.clone();
        let runner = Arc::new(FakeRunner::with_handler(move |invocation| {
            if invocation.arguments()[0].as_os_str() == failing.as_os_str() {
                Ok(ToolOutput::failure(1, "boom"))
            } else {
                Ok(ToolOutput::success(""))
            }
        }));

        let err = CodeSigner::new(runner.clone())
            .sign_bundle(&app, &app_identity(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Signing { ref path } if *path == deep_exec));
        let lines = runner.command_lines();
        assert!(
            lines
                .iter()
                .all(|line| !line.starts_with(&format!("codesign {} ", app.display())))
        );
    }
}
