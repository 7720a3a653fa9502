//! Archive expansion through the host's `unzip` and `tar`.
//!
//! Extraction merges into the destination: files at the same relative path
//! are overwritten, files absent from the archive are left alone.

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::ArchiveError;
use crate::process::Cmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
    TarBz2,
    Tar,
}

impl ArchiveFormat {
    /// Detect the format from the file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Host tool that handles this format.
    pub fn tool(&self) -> &'static str {
        match self {
            Self::Zip => "unzip",
            _ => "tar",
        }
    }

    fn tar_flags(&self) -> &'static str {
        match self {
            Self::TarGz => "xzf",
            Self::TarXz => "xJf",
            Self::TarBz2 => "xjf",
            _ => "xf",
        }
    }
}

/// Expand `archive` into `dest`, creating `dest` if needed.
pub fn expand(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    if !archive.is_file() {
        return Err(ArchiveError::Missing(archive.to_path_buf()));
    }
    let format = ArchiveFormat::detect(archive)
        .ok_or_else(|| ArchiveError::UnsupportedFormat(archive.to_path_buf()))?;

    fs::create_dir_all(dest).map_err(|source| ArchiveError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let cmd = match format {
        // -o: overwrite without prompting, -q: quiet
        ArchiveFormat::Zip => Cmd::new("unzip")
            .args(["-o", "-q"])
            .arg_path(archive)
            .arg("-d")
            .arg_path(dest),
        _ => Cmd::new("tar")
            .arg(format.tar_flags())
            .arg_path(archive)
            .arg("-C")
            .arg_path(dest),
    };

    debug!(archive = %archive.display(), dest = %dest.display(), ?format, "expanding archive");
    cmd.run().map_err(|e| ArchiveError::Tool {
        archive: archive.to_path_buf(),
        reason: format!("{:#}", e),
    })?;
    Ok(())
}
