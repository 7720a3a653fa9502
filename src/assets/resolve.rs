//! Latest-release asset lookup on GitHub.
//!
//! One request per repository, bounded by a timeout, never retried.

use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ResolveError;

pub const USER_AGENT: &str = concat!("efistage/", env!("CARGO_PKG_VERSION"));

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A release asset chosen for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub repo: String,
    /// The pattern that matched (the fallback when the primary did not).
    pub pattern: String,
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<RemoteAsset>,
}

/// Asset entry as returned by the releases API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAsset {
    pub name: String,
    pub browser_download_url: String,
}

fn compile(pattern: &str) -> Result<Pattern, ResolveError> {
    Pattern::new(pattern).map_err(|e| ResolveError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

/// Pick the first asset whose name matches `pattern`, case-insensitively, in
/// the order given. If none does and a fallback is given, the fallback is
/// tried against the same list.
pub fn select_asset(
    repo: &str,
    assets: &[RemoteAsset],
    pattern: &str,
    fallback: Option<&str>,
) -> Result<ReleaseAsset, ResolveError> {
    let primary = compile(pattern)?;
    let fallback = fallback.map(|f| compile(f).map(|p| (f, p))).transpose()?;

    if assets.is_empty() {
        return Err(ResolveError::NoAssetsInRelease {
            repo: repo.to_string(),
        });
    }

    let candidates = std::iter::once((pattern, primary)).chain(fallback);
    for (source, compiled) in candidates {
        if let Some(asset) = assets.iter().find(|a| compiled.matches_with(&a.name, MATCH_OPTIONS)) {
            return Ok(ReleaseAsset {
                repo: repo.to_string(),
                pattern: source.to_string(),
                url: asset.browser_download_url.clone(),
                file_name: asset.name.clone(),
            });
        }
        debug!(repo, pattern = source, "no asset matched");
    }

    Err(ResolveError::PatternMismatch {
        repo: repo.to_string(),
        pattern: pattern.to_string(),
        available: assets.iter().map(|a| a.name.clone()).collect(),
    })
}

/// Client for `GET /repos/{repo}/releases/latest`.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl AssetResolver {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(&config.github_api_url, config.github_token.clone(), config.resolve_timeout)
    }

    /// Asset list of the latest release, in API order.
    pub async fn latest_assets(&self, repo: &str) -> Result<Vec<RemoteAsset>, ResolveError> {
        let url = format!("{}/repos/{}/releases/latest", self.api_url, repo);
        let network = |reason: String| ResolveError::Network {
            repo: repo.to_string(),
            reason,
        };

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| network(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            403 | 429 => return Err(ResolveError::RateLimited { status: status.as_u16() }),
            404 => {
                return Err(ResolveError::NotFound {
                    repo: repo.to_string(),
                })
            }
            _ if !status.is_success() => return Err(network(format!("HTTP {}", status))),
            _ => {}
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| network(format!("invalid release JSON: {}", e)))?;

        debug!(
            repo,
            tag = release.tag_name.as_deref().unwrap_or("?"),
            assets = release.assets.len(),
            "fetched latest release"
        );
        Ok(release.assets)
    }

    /// Resolve the download URL of the asset matching `pattern` (or
    /// `fallback`) in the latest release of `repo`.
    pub async fn resolve(
        &self,
        repo: &str,
        pattern: &str,
        fallback: Option<&str>,
    ) -> Result<ReleaseAsset, ResolveError> {
        // reject bad patterns before spending a request
        compile(pattern)?;
        if let Some(f) = fallback {
            compile(f)?;
        }

        let assets = self.latest_assets(repo).await?;
        let asset = select_asset(repo, &assets, pattern, fallback)?;
        info!(repo, asset = %asset.file_name, "resolved release asset");
        Ok(asset)
    }
}
