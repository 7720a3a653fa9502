//! Kext acquisition: resolve the latest release, download it into the cache,
//! expand it and pick out the bundles to stage.
//!
//! Assets are processed one at a time. A failing asset is recorded and the
//! run moves on to the next one.

pub mod catalog;
pub mod discover;
pub mod download;
pub mod extract;
pub mod resolve;
pub mod stage;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cache::{self, CachedFile};
use crate::config::Config;
use crate::error::AssetError;

pub use catalog::{AssetSpec, CATALOG};
pub use discover::{discover, BundleKind, DiscoveredBundle};
pub use download::Downloader;
pub use extract::expand;
pub use resolve::{AssetResolver, ReleaseAsset};

/// Everything produced for one catalog entry.
#[derive(Debug, Clone)]
pub struct AcquiredAsset {
    pub spec: &'static AssetSpec,
    pub release: ReleaseAsset,
    pub file: CachedFile,
    pub extracted_to: PathBuf,
    pub bundles: Vec<DiscoveredBundle>,
}

#[derive(Debug, Default)]
pub struct AcquireOutcome {
    pub acquired: Vec<AcquiredAsset>,
    pub failures: Vec<(&'static AssetSpec, AssetError)>,
}

impl AcquireOutcome {
    pub fn bundles(&self) -> impl Iterator<Item = &DiscoveredBundle> {
        self.acquired.iter().flat_map(|a| a.bundles.iter())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The resolve → download → extract → discover chain.
#[derive(Debug, Clone)]
pub struct Pipeline {
    resolver: AssetResolver,
    downloader: Downloader,
    cache_root: PathBuf,
}

impl Pipeline {
    pub fn new(resolver: AssetResolver, downloader: Downloader, cache_root: &Path) -> Self {
        Self {
            resolver,
            downloader,
            cache_root: cache_root.to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(
            AssetResolver::from_config(config)?,
            Downloader::new(config.download_timeout)?,
            &config.cache_dir,
        ))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Acquire a single catalog entry.
    pub async fn acquire(&self, spec: &'static AssetSpec) -> Result<AcquiredAsset, AssetError> {
        let release = self
            .resolver
            .resolve(spec.repo, spec.pattern, spec.fallback_pattern)
            .await?;

        let dest = cache::downloads_dir(&self.cache_root).join(&release.file_name);
        let file = self.downloader.fetch(&release.url, &dest).await?;

        let extracted_to = cache::extract_dir(&self.cache_root, spec.repo);
        extract::expand(&file.path, &extracted_to)?;

        let bundles = discover::discover_with(&extracted_to, spec.repo, Some(spec))?;
        info!(
            kext = spec.name,
            bundles = bundles.len(),
            cached = !file.downloaded,
            "acquired"
        );

        Ok(AcquiredAsset {
            spec,
            release,
            file,
            extracted_to,
            bundles,
        })
    }

    /// Acquire each entry in order, collecting failures instead of stopping.
    pub async fn acquire_all(&self, specs: &[&'static AssetSpec]) -> AcquireOutcome {
        let mut outcome = AcquireOutcome::default();
        for &spec in specs {
            match self.acquire(spec).await {
                Ok(asset) => outcome.acquired.push(asset),
                Err(e) => {
                    warn!(kext = spec.name, error = %e, "skipping asset");
                    outcome.failures.push((spec, e));
                }
            }
        }
        outcome
    }
}

/// Current-thread runtime for the sequential network work.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}
