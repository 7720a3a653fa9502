//! Error taxonomy.
//!
//! Every core operation returns one of these typed errors so the caller can
//! decide whether a failure is terminal (serialization), terminal to one
//! stage only (provisioning) or merely a warning (a single asset).

use std::path::PathBuf;
use thiserror::Error;

use crate::disk::ProvisionStage;

/// Failures resolving the latest release asset of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("repository {repo} not found or has no published release (HTTP 404)")]
    NotFound { repo: String },

    #[error("latest release of {repo} has no assets")]
    NoAssetsInRelease { repo: String },

    #[error("no asset of {repo} matches '{pattern}' (available: {})", .available.join(", "))]
    PatternMismatch {
        repo: String,
        pattern: String,
        available: Vec<String>,
    },

    #[error("release API rate limit exceeded (HTTP {status}); set GITHUB_TOKEN or wait for the limit to reset")]
    RateLimited { status: u16 },

    #[error("invalid asset pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("release lookup for {repo} failed: {reason}")]
    Network { repo: String, reason: String },
}

/// Failures fetching a file into the cache.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("GET {url} returned an empty body")]
    Empty { url: String },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures expanding a downloaded archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to create {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extracting {} failed: {reason}", .archive.display())]
    Tool { archive: PathBuf, reason: String },
}

/// Failures classifying extracted bundles.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no bundle for {repo} found under {}", .root.display())]
    Empty { repo: String, root: PathBuf },

    #[error("failed to walk {}: {reason}", .root.display())]
    Walk { root: PathBuf, reason: String },
}

/// Failures of the asset pipeline, one variant per stage.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("failed to place {}: {source}", .path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures turning a value tree into (or out of) property-list XML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    #[error("malformed plist at byte {offset}: {reason}")]
    Parse { offset: usize, reason: String },
}

/// Failures of the destructive provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("destructive action on {device} was not confirmed")]
    ConfirmationDeclined { device: String },

    #[error("disk operation failed at {stage}: {cause}")]
    DiskOperation { stage: ProvisionStage, cause: String },
}

/// Failure running an external helper utility.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UtilityError {
    #[error("{tool} is not installed at {}", .path.display())]
    Missing { tool: String, path: PathBuf },

    #[error("{tool} failed: {reason}")]
    Failed { tool: String, reason: String },

    #[error("{tool} produced unparsable output: {reason}")]
    Unparsable { tool: String, reason: String },
}
