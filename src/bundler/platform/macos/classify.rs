//! Filesystem entry classification shared by signing, merging and thinning.
//!
//! Precedence, first match wins:
//! 1. symbolic links are [`EntryKind::Other`] and never followed
//! 2. directories named `*.app` are [`EntryKind::AppBundle`]
//! 3. directories named `*.framework` are [`EntryKind::Framework`]
//! 4. any other directory is [`EntryKind::Directory`]
//! 5. a file that is executable, or whose suffix is `.dylib`, `.so`, `.o` or
//!    empty, is [`EntryKind::MachOBinary`] if it starts with a Mach-O magic
//! 6. everything else is [`EntryKind::Other`]

use crate::bundler::error::{ErrorExt, Result};
use goblin::mach::{
    fat::FAT_MAGIC,
    header::{MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64},
};
use std::{fs, io::Read, path::Path};

/// Suffixes of native shared-library artifacts.
pub const SHARED_LIBRARY_SUFFIXES: &[&str] = &["so", "dylib"];

/// Suffixes that may hold Mach-O code even without the executable bit.
const BINARY_SUFFIXES: &[&str] = &["dylib", "so", "o"];

const FAT_CIGAM: u32 = FAT_MAGIC.swap_bytes();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    AppBundle,
    Framework,
    MachOBinary,
    Other,
}

/// Classifies the entry at `path` without following symlinks.
pub fn classify(path: &Path) -> Result<EntryKind> {
    let metadata = fs::symlink_metadata(path).fs_context("failed to stat", path)?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        return Ok(EntryKind::Other);
    }

    if file_type.is_dir() {
        return Ok(match extension(path).as_deref() {
            Some("app") => EntryKind::AppBundle,
            Some("framework") => EntryKind::Framework,
            _ => EntryKind::Directory,
        });
    }

    if !file_type.is_file() {
        return Ok(EntryKind::Other);
    }

    let candidate = is_executable(&metadata)
        || match extension(path) {
            None => true,
            Some(ext) => BINARY_SUFFIXES.contains(&ext.as_str()),
        };

    if candidate && has_mach_o_magic(path)? {
        Ok(EntryKind::MachOBinary)
    } else {
        Ok(EntryKind::Other)
    }
}

/// Whether `path` names a native shared library by its suffix.
pub fn is_shared_library(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SHARED_LIBRARY_SUFFIXES.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Reads the first four bytes and compares them against every Mach-O and
/// fat-header magic in either byte order.
fn has_mach_o_magic(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path).fs_context("failed to open", path)?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e).fs_context("failed to read", path),
    }
    let value = u32::from_be_bytes(magic);
    Ok(matches!(
        value,
        MH_MAGIC | MH_CIGAM | MH_MAGIC_64 | MH_CIGAM_64 | FAT_MAGIC | FAT_CIGAM
    ))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn directories_by_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["Nested.app", "Lib.framework", "plain"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        assert_eq!(classify(&tmp.path().join("Nested.app")).unwrap(), EntryKind::AppBundle);
        assert_eq!(classify(&tmp.path().join("Lib.framework")).unwrap(), EntryKind::Framework);
        assert_eq!(classify(&tmp.path().join("plain")).unwrap(), EntryKind::Directory);
    }

    #[test]
    fn mach_o_requires_magic() {
        let tmp = tempfile::tempdir().unwrap();
        write_macho(&tmp.path().join("libfoo.dylib"));
        write_macho(&tmp.path().join("helper"));
        fs::write(tmp.path().join("fake.so"), b"not a binary").unwrap();
        fs::write(tmp.path().join("empty.so"), b"").unwrap();

        assert_eq!(classify(&tmp.path().join("libfoo.dylib")).unwrap(), EntryKind::MachOBinary);
        assert_eq!(classify(&tmp.path().join("helper")).unwrap(), EntryKind::MachOBinary);
        assert_eq!(classify(&tmp.path().join("fake.so")).unwrap(), EntryKind::Other);
        assert_eq!(classify(&tmp.path().join("empty.so")).unwrap(), EntryKind::Other);
    }

    #[test]
    fn non_binary_suffix_without_exec_bit_is_not_sniffed() {
        let tmp = tempfile::tempdir().unwrap();
        write_macho(&tmp.path().join("data.txt"));
        assert_eq!(classify(&tmp.path().join("data.txt")).unwrap(), EntryKind::Other);
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_enables_sniffing() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tool.bin");
        write_macho(&path);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(classify(&path).unwrap(), EntryKind::MachOBinary);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_never_signable() {
        let tmp = tempfile::tempdir().unwrap();
        write_macho(&tmp.path().join("libreal.dylib"));
        std::os::unix::fs::symlink("libreal.dylib", tmp.path().join("liblink.dylib")).unwrap();
        assert_eq!(classify(&tmp.path().join("liblink.dylib")).unwrap(), EntryKind::Other);
    }

    #[test]
    fn shared_library_suffixes() {
        assert!(is_shared_library(Path::new("pkg/_speedups.cpython-312-darwin.so")));
        assert!(is_shared_library(Path::new("lib/libjpeg.dylib")));
        assert!(!is_shared_library(Path::new("pkg/__init__.py")));
        assert!(!is_shared_library(Path::new("bin/tool")));
    }
}
