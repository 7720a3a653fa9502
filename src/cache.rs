//! Download cache - filename-keyed files with SHA-256 digests.
//!
//! The cache directory is shared and unlocked. A file counts as cached when
//! it exists with a non-zero size; nothing else is checked.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A file present in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    pub size: u64,
    /// Lower-case hex SHA-256 of the contents.
    pub sha256: String,
    /// False when the file was already present and no request was made.
    pub downloaded: bool,
}

impl CachedFile {
    /// Describe a file already on disk.
    pub fn inspect(path: &Path, downloaded: bool) -> io::Result<Self> {
        let size = fs::metadata(path)?.len();
        let sha256 = sha256_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size,
            sha256,
            downloaded,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// True if `path` exists and is non-empty.
pub fn is_cached(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// SHA-256 of a file, streamed in fixed-size chunks.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Remove a file, ignoring "not found".
pub fn discard(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Cache subdirectory layout.
pub fn downloads_dir(cache_root: &Path) -> PathBuf {
    cache_root.join("downloads")
}

pub fn extract_dir(cache_root: &Path, repo: &str) -> PathBuf {
    cache_root.join("extracted").join(repo.replace('/', "__"))
}

pub fn output_dir(cache_root: &Path) -> PathBuf {
    cache_root.join("output")
}
