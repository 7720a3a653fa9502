//! Bundle discovery in extracted release archives.
//!
//! Walks an extraction root for `.kext` directories and decides which of them
//! to stage and under what name. Nothing is copied here.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::catalog::{self, AssetSpec};
use crate::error::DiscoveryError;

/// Bundles this deep or deeper are ignored unless whitelisted as plugins.
pub const MAX_BUNDLE_DEPTH: usize = 4;

pub const BUNDLE_EXTENSION: &str = "kext";

/// Resource-fork directory macOS adds to zip files.
pub const METADATA_DIR: &str = "__MACOSX";

const DEBUG_DIR: &str = "debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// The repository's main bundle, renamed to its canonical name.
    Primary,
    /// A whitelisted sibling of a multi-plugin primary, name unchanged.
    Plugin,
    /// Any bundle of a repository missing from the catalog.
    Unlisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBundle {
    pub source: PathBuf,
    pub repo: String,
    /// Directory name to use under `EFI/OC/Kexts`.
    pub canonical_name: String,
    /// Path components below the extraction root (`Lilu.kext` is 1).
    pub depth: usize,
    pub kind: BundleKind,
}

/// A bundle directory found on disk, before classification.
#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    name: String,
    depth: usize,
    debug_build: bool,
}

/// Discover the bundles `repo` contributes from `root`.
pub fn discover(root: &Path, repo: &str) -> Result<Vec<DiscoveredBundle>, DiscoveryError> {
    discover_with(root, repo, catalog::by_repo(repo))
}

/// Discover with an explicit catalog entry (or none).
pub fn discover_with(
    root: &Path,
    repo: &str,
    spec: Option<&AssetSpec>,
) -> Result<Vec<DiscoveredBundle>, DiscoveryError> {
    let candidates = prefer_release_builds(find_candidates(root)?);

    let bundles = match spec {
        Some(spec) => classify_catalogued(&candidates, repo, spec),
        None => classify_unlisted(&candidates, repo),
    };

    if bundles.is_empty() {
        return Err(DiscoveryError::Empty {
            repo: repo.to_string(),
            root: root.to_path_buf(),
        });
    }
    Ok(bundles)
}

fn find_candidates(root: &Path) -> Result<Vec<Candidate>, DiscoveryError> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| DiscoveryError::Walk {
            root: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name == METADATA_DIR {
            walker.skip_current_dir();
            continue;
        }

        let is_bundle = Path::new(&name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(BUNDLE_EXTENSION));
        if is_bundle {
            let debug_build = entry
                .path()
                .strip_prefix(root)
                .map(|rel| {
                    rel.components()
                        .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(DEBUG_DIR))
                })
                .unwrap_or(false);
            found.push(Candidate {
                path: entry.path().to_path_buf(),
                name,
                depth: entry.depth(),
                debug_build,
            });
            // bundles nest their own plugins; those are not ours to stage
            walker.skip_current_dir();
        }
    }
    Ok(found)
}

/// Drop debug builds that have a release twin of the same name.
fn prefer_release_builds(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let release_names: HashSet<String> = candidates
        .iter()
        .filter(|c| !c.debug_build)
        .map(|c| c.name.clone())
        .collect();

    candidates
        .into_iter()
        .filter(|c| !c.debug_build || !release_names.contains(&c.name))
        .collect()
}

fn shallowest<'a, P>(candidates: &'a [Candidate], predicate: P) -> Option<&'a Candidate>
where
    P: Fn(&Candidate) -> bool,
{
    candidates
        .iter()
        .filter(|c| predicate(*c))
        .min_by_key(|c| c.depth)
}

fn classify_catalogued(candidates: &[Candidate], repo: &str, spec: &AssetSpec) -> Vec<DiscoveredBundle> {
    let mut bundles = Vec::new();

    match shallowest(candidates, |c| c.depth < MAX_BUNDLE_DEPTH && c.name.starts_with(spec.bundle_prefix)) {
        Some(primary) => bundles.push(DiscoveredBundle {
            source: primary.path.clone(),
            repo: repo.to_string(),
            canonical_name: spec.canonical_name.to_string(),
            depth: primary.depth,
            kind: BundleKind::Primary,
        }),
        None => warn!(repo, prefix = spec.bundle_prefix, "primary bundle not found"),
    }

    for plugin in spec.plugins {
        // whitelisted plugins are exempt from the depth limit
        match shallowest(candidates, |c| c.name == *plugin) {
            Some(found) => bundles.push(DiscoveredBundle {
                source: found.path.clone(),
                repo: repo.to_string(),
                canonical_name: found.name.clone(),
                depth: found.depth,
                kind: BundleKind::Plugin,
            }),
            None => debug!(repo, plugin, "plugin not present in archive"),
        }
    }
    bundles
}

fn classify_unlisted(candidates: &[Candidate], repo: &str) -> Vec<DiscoveredBundle> {
    let mut eligible: Vec<&Candidate> = candidates.iter().filter(|c| c.depth < MAX_BUNDLE_DEPTH).collect();
    eligible.sort_by_key(|c| c.depth);

    let mut seen = HashSet::new();
    eligible
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .map(|c| DiscoveredBundle {
            source: c.path.clone(),
            repo: repo.to_string(),
            canonical_name: c.name.clone(),
            depth: c.depth,
            kind: BundleKind::Unlisted,
        })
        .collect()
}
