//! Reducing the fat libraries of a dependency tree to one architecture.

use super::{
    classify::is_shared_library,
    lipo::{Architectures, Lipo},
    tools::ToolRunner,
};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    utils::parallel::for_each_bounded,
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Thins every shared library under `tree_root` to `arch`.
///
/// Single-architecture libraries are left alone, whichever architecture they
/// hold. A fat library that lacks `arch` fails with
/// [`Error::MissingSlice`]. Returns the libraries that were rewritten.
pub async fn thin_tree<R: ToolRunner>(
    lipo: &Lipo<R>,
    tree_root: &Path,
    arch: &str,
) -> Result<Vec<PathBuf>> {
    let libraries = find_shared_libraries(tree_root)?;
    if libraries.is_empty() {
        log::info!("No libraries require thinning.");
        return Ok(Vec::new());
    }

    log::info!("Thinning {} libraries to {}...", libraries.len(), arch);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for_each_bounded(libraries, |library| {
        let lipo = lipo.clone();
        let arch = arch.to_string();
        let tx = tx.clone();
        async move {
            if thin_library(&lipo, &library, &arch).await? {
                // The receiver outlives every task.
                let _ = tx.send(library);
            }
            Ok(())
        }
    })
    .await?;
    drop(tx);

    let mut thinned = Vec::new();
    while let Some(library) = rx.recv().await {
        thinned.push(library);
    }
    thinned.sort();
    Ok(thinned)
}

/// Returns `true` when the library was rewritten.
async fn thin_library<R: ToolRunner>(lipo: &Lipo<R>, library: &Path, arch: &str) -> Result<bool> {
    match lipo.info(library).await? {
        Architectures::Thin(found) => {
            if found != arch {
                log::debug!(
                    "{} only contains {}; leaving it untouched",
                    library.display(),
                    found
                );
            }
            Ok(false)
        }
        Architectures::Fat(archs) if archs.iter().any(|a| a == arch) => {
            log::debug!("Thinning {} to {}", library.display(), arch);
            let thin_path = sibling_with_suffix(library, arch);
            lipo.thin(arch, library, &thin_path).await?;
            tokio::fs::rename(&thin_path, library)
                .await
                .fs_context("failed to replace library with thin copy", library)?;
            Ok(true)
        }
        Architectures::Fat(_) => Err(Error::MissingSlice {
            path: library.to_path_buf(),
            arch: arch.to_string(),
        }),
    }
}

/// `lib.so` → `lib.so.arm64`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn find_shared_libraries(tree_root: &Path) -> Result<Vec<PathBuf>> {
    let mut libraries = Vec::new();
    for entry in walkdir::WalkDir::new(tree_root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && is_shared_library(entry.path()) {
            libraries.push(entry.into_path());
        }
    }
    Ok(libraries)
}

#[cfg(test)]
mod tests {
    use super::super::tools::{
        ToolOutput,
        fake::{FakeRunner, fake_lipo, read_slices, write_slices},
    };
    use super::*;
    use std::sync::Arc;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg/.dylibs")).unwrap();
        write_slices(&tmp.path().join("pkg/native.so"), ["x86_64", "arm64"]);
        write_slices(&tmp.path().join("pkg/.dylibs/libz.dylib"), ["arm64", "x86_64"]);
        std::fs::write(tmp.path().join("pkg/__init__.py"), "").unwrap();
        tmp
    }

    #[tokio::test]
    async fn fat_libraries_are_reduced_to_the_requested_slice() {
        let tmp = fixture();
        let lipo = Lipo::new(Arc::new(FakeRunner::with_handler(fake_lipo)));

        let thinned = thin_tree(&lipo, tmp.path(), "arm64").await.unwrap();

        assert_eq!(thinned.len(), 2);
        assert_eq!(read_slices(&tmp.path().join("pkg/native.so")), vec!["arm64"]);
        assert_eq!(read_slices(&tmp.path().join("pkg/.dylibs/libz.dylib")), vec!["arm64"]);
        assert!(!tmp.path().join("pkg/native.so.arm64").exists());

        // Thinned output now reports exactly one architecture.
        let archs = lipo.info(&tmp.path().join("pkg/native.so")).await.unwrap();
        assert_eq!(archs, Architectures::Thin("arm64".into()));
    }

    #[tokio::test]
    async fn missing_slice_names_file_and_arch() {
        let tmp = fixture();
        let lipo = Lipo::new(Arc::new(FakeRunner::with_handler(fake_lipo)));

        let err = thin_tree(&lipo, tmp.path(), "ppc").await.unwrap_err();

        match err {
            Error::MissingSlice { path, arch } => {
                assert_eq!(arch, "ppc");
                assert!(is_shared_library(&path));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn single_architecture_libraries_are_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        write_slices(&tmp.path().join("match.so"), ["arm64"]);
        write_slices(&tmp.path().join("other.so"), ["x86_64"]);
        let runner = Arc::new(FakeRunner::with_handler(fake_lipo));

        let thinned = thin_tree(&Lipo::new(runner.clone()), tmp.path(), "arm64")
            .await
            .unwrap();

        assert!(thinned.is_empty());
        assert_eq!(read_slices(&tmp.path().join("other.so")), vec!["x86_64"]);
        assert!(runner.command_lines().iter().all(|c| c.starts_with("lipo -info")));
    }

    #[tokio::test]
    async fn unparseable_inspection_output_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("weird.so"), "").unwrap();
        let runner = Arc::new(FakeRunner::new());
        runner.push(ToolOutput::success("Hello world"));

        let err = thin_tree(&Lipo::new(runner), tmp.path(), "arm64")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnparseableArchitectures { .. }));
    }

    #[tokio::test]
    async fn tree_without_libraries_runs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.py"), "print('hi')").unwrap();
        let runner = Arc::new(FakeRunner::new());

        let thinned = thin_tree(&Lipo::new(runner.clone()), tmp.path(), "arm64")
            .await
            .unwrap();
        assert!(thinned.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn thin_output_sits_beside_the_original() {
        assert_eq!(
            sibling_with_suffix(Path::new("/t/lib.so"), "arm64"),
            PathBuf::from("/t/lib.so.arm64")
        );
    }
}
