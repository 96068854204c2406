//! Archive extraction with path-traversal protection.
//!
//! Both formats reject entries that would land outside the destination
//! (absolute paths, `..` components).

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use super::error::AssetError;

/// Archive formats recognised by URL/file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`, creating it if needed.
pub fn extract(kind: ArchiveKind, archive: &Path, dest: &Path) -> Result<(), AssetError> {
    fs::create_dir_all(dest)?;
    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
        ArchiveKind::Zip => extract_zip(archive, dest),
    }
}

/// Join `entry` onto `dest`, refusing anything that escapes it.
fn safe_join(dest: &Path, entry: &Path) -> Result<PathBuf, AssetError> {
    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AssetError::UnsafeArchivePath(entry.display().to_string()));
            }
        }
    }
    Ok(out)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), AssetError> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let target = safe_join(dest, &entry_path)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&target)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Ok(mode) = entry.header().mode() {
                        fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                    }
                }
            }
            // Links and special files are not part of server bundles
            _ => {}
        }
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), AssetError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| AssetError::Extract {
        path: archive.to_path_buf(),
        message: e.to_string(),
    })?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| AssetError::Extract {
            path: archive.to_path_buf(),
            message: e.to_string(),
        })?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| AssetError::UnsafeArchivePath(name.clone()))?;
        let target = safe_join(dest, &relative)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_archives::{write_tar_gz, write_zip};
    use super::*;

    #[test]
    fn detects_kind_from_suffix() {
        assert_eq!(ArchiveKind::from_name("x.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_name("x.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_name("x.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_name("llama-server"), None);
    }

    #[test]
    fn extracts_tar_gz_with_nested_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bundle.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("mlx-server", b"#!/bin/sh\n", 0o755),
                ("mlx-env/bin/python", b"py", 0o644),
            ],
        );

        let out = temp.path().join("out");
        extract(ArchiveKind::TarGz, &archive, &out).unwrap();
        assert_eq!(fs::read(out.join("mlx-server")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(fs::read(out.join("mlx-env/bin/python")).unwrap(), b"py");
    }

    #[test]
    fn extracts_zip() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("ngrok.zip");
        write_zip(&archive, &[("ngrok", b"binary")]);

        let out = temp.path().join("out");
        extract(ArchiveKind::Zip, &archive, &out).unwrap();
        assert_eq!(fs::read(out.join("ngrok")).unwrap(), b"binary");
    }

    #[test]
    fn zip_slip_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../escaped", b"pwned")]);

        let out = temp.path().join("out");
        let err = extract(ArchiveKind::Zip, &archive, &out).unwrap_err();
        assert!(matches!(err, AssetError::UnsafeArchivePath(_)));
        assert!(!temp.path().join("escaped").exists());
    }

    #[test]
    fn safe_join_rejects_parent_components() {
        let dest = Path::new("/data/backends/llama");
        assert!(safe_join(dest, Path::new("bin/../../x")).is_err());
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
        assert_eq!(
            safe_join(dest, Path::new("./bin/llama-server")).unwrap(),
            dest.join("bin/llama-server")
        );
    }
}
