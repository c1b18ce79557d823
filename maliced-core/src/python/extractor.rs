//! Archive extraction for downloaded runtime packages.
//!
//! This module handles extracting zip and tar.gz archives and setting
//! executable permissions on Unix systems. Tar links are recreated only when
//! their target stays inside the destination.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path};
use tracing::{debug, info, warn};

use super::platform::ArchiveFormat;

// ============================================================================
// Archive Extraction
// ============================================================================

/// Extracts an archive to a destination directory.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or an entry cannot be written.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path, format: ArchiveFormat) -> Result<()> {
    info!(
        "Extracting {:?} archive {} to {}",
        format,
        archive_path.display(),
        dest_dir.display()
    );

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
    }
}

// ============================================================================
// ZIP Extraction
// ============================================================================

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open zip: {}", archive_path.display()))?;

    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                debug!("Skipping unsafe path in zip");
                continue;
            }
        };

        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;

            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            set_unix_permissions(&dest_path, entry.unix_mode())?;
        }
    }

    debug!("ZIP extraction complete");
    Ok(())
}

// ============================================================================
// TAR.GZ Extraction
// ============================================================================

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open tar.gz: {}", archive_path.display()))?;

    let reader = BufReader::new(file);
    let decoder = flate2::read::GzDecoder::new(reader);
    extract_tar(decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let dest_dir_canonical = dest_dir
        .canonicalize()
        .unwrap_or_else(|_| dest_dir.to_path_buf());

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();
        let path = entry.path()?.into_owned();

        if path.is_absolute()
            || path
                .components()
                .any(|c| c == Component::ParentDir)
        {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);

        let dest_canonical = if dest_path.exists() {
            dest_path.canonicalize()?
        } else if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
            let parent_canonical = parent.canonicalize()?;
            parent_canonical.join(dest_path.file_name().unwrap_or_default())
        } else {
            dest_path.clone()
        };

        if !dest_canonical.starts_with(&dest_dir_canonical) {
            warn!(
                "Skipping path that escapes dest_dir: {:?} -> {:?}",
                path, dest_canonical
            );
            continue;
        }

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry.link_name()?.map(|t| t.into_owned());
            let inside = target
                .as_deref()
                .is_some_and(|t| link_stays_inside(&path, t, entry_type.is_symlink()));
            if !inside {
                warn!("Skipping link that escapes dest_dir: {:?} -> {:?}", path, target);
                continue;
            }

            // The interpreter in standalone builds is `bin/python3 -> python3.12`.
            entry
                .unpack_in(dest_dir)
                .with_context(|| format!("Failed to create link: {}", dest_path.display()))?;
        } else if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;
            io::copy(&mut entry, &mut outfile)?;
            outfile.flush()?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_unix_permissions(&dest_path, Some(mode))?;
                }
            }
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

/// Whether a link target resolves inside the extraction root.
///
/// Symlink targets are relative to the link's directory, hardlink targets
/// to the archive root.
fn link_stays_inside(entry_path: &Path, target: &Path, symlink: bool) -> bool {
    let mut depth = if symlink {
        entry_path
            .parent()
            .map(|p| {
                p.components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .count()
            })
            .unwrap_or(0)
    } else {
        0
    };

    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

// ============================================================================
// Layout Fix-up
// ============================================================================

/// Moves a nested runtime up into `root`.
///
/// Standalone builds unpack into a single `python/` folder. If
/// `root/<exec_relpath>` is missing but some direct subdirectory contains
/// it, that subdirectory's entries are moved into `root`. Returns whether
/// anything was moved.
pub fn hoist_nested_root(root: &Path, exec_relpath: &Path) -> Result<bool> {
    if root.join(exec_relpath).exists() {
        return Ok(false);
    }

    for entry in fs::read_dir(root)? {
        let nested = entry?.path();
        if !nested.is_dir() || !nested.join(exec_relpath).exists() {
            continue;
        }

        debug!("Found runtime in subdirectory, relocating from {}", nested.display());

        for child in fs::read_dir(&nested)? {
            let source = child?.path();
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = root.join(name);
            if dest.exists() {
                continue;
            }
            fs::rename(&source, &dest).with_context(|| {
                format!("Failed to move {} to {}", source.display(), dest.display())
            })?;
        }

        if let Err(e) = fs::remove_dir(&nested) {
            debug!("Leaving {} in place: {}", nested.display(), e);
        }
        return Ok(true);
    }

    Ok(false)
}

// ============================================================================
// Unix Permissions
// ============================================================================

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        if mode & 0o111 != 0 {
            let permissions = fs::Permissions::from_mode(mode | 0o755);
            fs::set_permissions(path, permissions)
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_zip_simple() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("python-embed.zip");
        let extract_dir = temp_dir.path().join("python");

        write_zip(
            &archive_path,
            &[
                ("python.exe", b"MZ"),
                ("python312._pth", b"python312.zip\n.\n#import site\n"),
                ("Lib/site-packages/README.txt", b"readme"),
            ],
        );

        extract_archive(&archive_path, &extract_dir, ArchiveFormat::Zip).unwrap();

        assert!(extract_dir.join("python.exe").exists());
        assert!(extract_dir.join("Lib/site-packages/README.txt").exists());
        let pth = fs::read_to_string(extract_dir.join("python312._pth")).unwrap();
        assert!(pth.contains("#import site"));
    }

    #[test]
    fn test_extract_corrupt_zip_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("broken.zip");
        fs::write(&archive_path, b"definitely not a zip").unwrap();

        let result = extract_archive(&archive_path, temp_dir.path(), ArchiveFormat::Zip);
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_tar_gz_and_hoist() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("runtime.tar.gz");
        let extract_dir = temp_dir.path().join("python");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let data = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_path("python/bin/python3").unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        extract_archive(&archive_path, &extract_dir, ArchiveFormat::TarGz).unwrap();
        assert!(extract_dir.join("python/bin/python3").exists());

        let moved = hoist_nested_root(&extract_dir, Path::new("bin/python3")).unwrap();
        assert!(moved);
        assert!(extract_dir.join("bin/python3").exists());
        assert!(!extract_dir.join("python").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(extract_dir.join("bin/python3"))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_keeps_interpreter_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("install_only.tar.gz");
        let extract_dir = temp_dir.path().join("python");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            // Link first, the way standalone tarballs list `bin/`.
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder
                .append_link(&mut link, "python/bin/python3", "python3.12")
                .unwrap();

            let data = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_path("python/bin/python3.12").unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        extract_archive(&archive_path, &extract_dir, ArchiveFormat::TarGz).unwrap();

        let link = extract_dir.join("python/bin/python3");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("python3.12"));

        assert!(hoist_nested_root(&extract_dir, Path::new("bin/python3")).unwrap());
        assert!(extract_dir.join("bin/python3").is_file());
    }

    #[test]
    fn test_link_stays_inside() {
        let entry = Path::new("python/bin/python3");
        assert!(link_stays_inside(entry, Path::new("python3.12"), true));
        assert!(link_stays_inside(entry, Path::new("../lib/libpython3.12.so"), true));
        assert!(link_stays_inside(entry, Path::new("../../README"), true));
        assert!(!link_stays_inside(entry, Path::new("../../../etc/passwd"), true));
        assert!(!link_stays_inside(entry, Path::new("/usr/bin/python3"), true));
        assert!(!link_stays_inside(Path::new("./top"), Path::new("../x"), true));

        assert!(link_stays_inside(entry, Path::new("python/bin/python3.12"), false));
        assert!(!link_stays_inside(entry, Path::new("../outside"), false));
    }

    #[test]
    fn test_hoist_is_noop_when_runtime_at_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("python.exe"), b"MZ").unwrap();
        fs::create_dir(temp_dir.path().join("Lib")).unwrap();

        let moved = hoist_nested_root(temp_dir.path(), Path::new("python.exe")).unwrap();
        assert!(!moved);
        assert!(temp_dir.path().join("Lib").exists());
    }

    #[test]
    fn test_hoist_keeps_nested_dir_with_conflicting_entries() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("python");
        fs::create_dir_all(nested.join("bin")).unwrap();
        fs::write(nested.join("bin").join("python3"), b"#!").unwrap();
        fs::write(nested.join("LICENSE"), b"nested").unwrap();
        fs::write(temp_dir.path().join("LICENSE"), b"root").unwrap();

        let moved = hoist_nested_root(temp_dir.path(), Path::new("bin/python3")).unwrap();
        assert!(moved);
        assert!(temp_dir.path().join("bin").join("python3").is_file());
        assert_eq!(fs::read(temp_dir.path().join("LICENSE")).unwrap(), b"root");
        assert!(nested.join("LICENSE").exists());
    }

    #[test]
    fn test_tar_symlink_escape_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("malicious.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");
        let escape_target = temp_dir.path().join("escaped_file.txt");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_path("escape_link").unwrap();
            header.set_size(0);
            header.set_mode(0o777);
            header.set_cksum();

            builder
                .append_link(&mut header, "escape_link", "../escaped_file.txt")
                .unwrap();

            let data = b"This should NOT appear outside extraction dir!";
            let mut file_header = tar::Header::new_gnu();
            file_header.set_path("escape_link").unwrap();
            file_header.set_size(data.len() as u64);
            file_header.set_mode(0o644);
            file_header.set_cksum();

            builder.append(&file_header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        extract_archive(&archive_path, &extract_dir, ArchiveFormat::TarGz).unwrap();

        assert!(!escape_target.exists());
        assert!(extract_dir.exists());
    }
}
