//! Placement of bundles and the generated config into an EFI root.
//!
//! Layout: `EFI/OC/{config.plist, Kexts/, ACPI/}`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::discover::DiscoveredBundle;
use crate::error::AssetError;

pub const CONFIG_FILE: &str = "config.plist";

pub fn oc_dir(efi_root: &Path) -> PathBuf {
    efi_root.join("EFI").join("OC")
}

pub fn kexts_dir(efi_root: &Path) -> PathBuf {
    oc_dir(efi_root).join("Kexts")
}

pub fn acpi_dir(efi_root: &Path) -> PathBuf {
    oc_dir(efi_root).join("ACPI")
}

pub fn config_path(efi_root: &Path) -> PathBuf {
    oc_dir(efi_root).join(CONFIG_FILE)
}

fn stage_err(path: &Path) -> impl Fn(io::Error) -> AssetError + '_ {
    move |source| AssetError::Stage {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the OpenCore directory skeleton.
pub fn prepare_layout(efi_root: &Path) -> Result<(), AssetError> {
    for dir in [kexts_dir(efi_root), acpi_dir(efi_root)] {
        fs::create_dir_all(&dir).map_err(stage_err(&dir))?;
    }
    Ok(())
}

/// Copy each bundle to `EFI/OC/Kexts/<canonical name>`, replacing any
/// existing directory of that name. Returns the destinations.
pub fn stage(efi_root: &Path, bundles: &[DiscoveredBundle]) -> Result<Vec<PathBuf>, AssetError> {
    prepare_layout(efi_root)?;
    let kexts = kexts_dir(efi_root);

    let mut staged = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let dest = kexts.join(&bundle.canonical_name);
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(stage_err(&dest))?;
        }
        copy_dir_recursive(&bundle.source, &dest).map_err(stage_err(&dest))?;
        info!(from = %bundle.source.display(), to = %dest.display(), "staged bundle");
        staged.push(dest);
    }
    Ok(staged)
}

/// Write `EFI/OC/config.plist`.
pub fn install_config(efi_root: &Path, xml: &str) -> Result<PathBuf, AssetError> {
    prepare_layout(efi_root)?;
    let path = config_path(efi_root);
    fs::write(&path, xml).map_err(stage_err(&path))?;
    Ok(path)
}

/// Names of the bundles currently staged, sorted.
pub fn staged_bundles(efi_root: &Path) -> io::Result<Vec<String>> {
    let dir = kexts_dir(efi_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Copy a directory tree. The target is FAT32, which has no links: a
/// symlink to a file is copied as that file, and a symlink to a directory is
/// skipped so link cycles cannot recurse.
fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest_path = dst.join(rel);
        let kind = entry.file_type();

        if kind.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if kind.is_file() {
            fs::copy(entry.path(), &dest_path)?;
        } else if kind.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {
                    fs::copy(entry.path(), &dest_path)?;
                }
                _ => debug!(link = %entry.path().display(), "skipping symlink"),
            }
        }
    }
    Ok(())
}
