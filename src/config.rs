//! Configuration management for efistage.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process;
use crate::serial::SERIAL_TOOL;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 15;

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Downloads, extracted archives and generated output live here.
    pub cache_dir: PathBuf,
    /// Release API base URL, without trailing slash.
    pub github_api_url: String,
    /// Optional token sent as a bearer credential.
    pub github_token: Option<String>,
    /// Serial utility location.
    pub macserial_path: PathBuf,
    pub resolve_timeout: Duration,
    pub download_timeout: Duration,
    /// Upper bound on waiting for a new partition's device node.
    pub ready_timeout: Duration,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut vars = HashMap::new();

        if let Ok(iter) = dotenvy::from_path_iter(base_dir.join(".env")) {
            for (key, value) in iter.flatten() {
                vars.insert(key, value);
            }
        }

        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }

        Self::from_vars(&vars, base_dir)
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>, base_dir: &Path) -> Self {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let cache_dir = get("EFISTAGE_CACHE_DIR")
            .map(|s| absolutize(base_dir, s))
            .unwrap_or_else(|| default_cache_dir(base_dir));

        let github_api_url = get("GITHUB_API_URL")
            .unwrap_or(DEFAULT_GITHUB_API_URL)
            .trim_end_matches('/')
            .to_string();

        let github_token = get("GITHUB_TOKEN").map(str::to_string);

        let macserial_path = get("MACSERIAL_PATH")
            .map(|s| absolutize(base_dir, s))
            .or_else(|| process::find_tool(SERIAL_TOOL))
            .unwrap_or_else(|| cache_dir.join("tools").join(SERIAL_TOOL));

        let secs = |key: &str, default: u64| {
            Duration::from_secs(get(key).and_then(|v| v.parse().ok()).unwrap_or(default))
        };

        Self {
            github_api_url,
            github_token,
            macserial_path,
            resolve_timeout: secs("RESOLVE_TIMEOUT_SECS", DEFAULT_RESOLVE_TIMEOUT_SECS),
            download_timeout: secs("DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ready_timeout: secs("READY_TIMEOUT_SECS", DEFAULT_READY_TIMEOUT_SECS),
            cache_dir,
        }
    }

    pub fn has_macserial(&self) -> bool {
        self.macserial_path.is_file()
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  EFISTAGE_CACHE_DIR: {}", self.cache_dir.display());
        println!("  GITHUB_API_URL: {}", self.github_api_url);
        println!(
            "  GITHUB_TOKEN: {}",
            if self.github_token.is_some() { "set" } else { "not set (60 requests/hour)" }
        );
        println!("  MACSERIAL_PATH: {}", self.macserial_path.display());
        println!("  RESOLVE_TIMEOUT_SECS: {}", self.resolve_timeout.as_secs());
        println!("  DOWNLOAD_TIMEOUT_SECS: {}", self.download_timeout.as_secs());
        println!("  READY_TIMEOUT_SECS: {}", self.ready_timeout.as_secs());
        if self.has_macserial() {
            println!("  macserial: FOUND");
        } else {
            println!("  macserial: NOT FOUND (placeholder serials will be written)");
        }
    }
}

fn absolutize(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn default_cache_dir(base_dir: &Path) -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("efistage"))
        .unwrap_or_else(|| base_dir.join(".efistage-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new(), Path::new("/work"));
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert!(config.github_token.is_none());
        assert_eq!(config.resolve_timeout, Duration::from_secs(15));
        assert_eq!(config.download_timeout, Duration::from_secs(30));
        assert_eq!(config.ready_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let config = Config::from_vars(
            &vars(&[("EFISTAGE_CACHE_DIR", "cache"), ("MACSERIAL_PATH", "bin/macserial")]),
            Path::new("/work"),
        );
        assert_eq!(config.cache_dir, PathBuf::from("/work/cache"));
        assert_eq!(config.macserial_path, PathBuf::from("/work/bin/macserial"));
    }

    #[test]
    fn test_api_url_trailing_slash_and_bad_timeout() {
        let config = Config::from_vars(
            &vars(&[
                ("GITHUB_API_URL", "http://127.0.0.1:8080/"),
                ("RESOLVE_TIMEOUT_SECS", "soon"),
                ("DOWNLOAD_TIMEOUT_SECS", "5"),
            ]),
            Path::new("/work"),
        );
        assert_eq!(config.github_api_url, "http://127.0.0.1:8080");
        assert_eq!(config.resolve_timeout, Duration::from_secs(15));
        assert_eq!(config.download_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_token_is_unset() {
        let config = Config::from_vars(&vars(&[("GITHUB_TOKEN", "  ")]), Path::new("/work"));
        assert!(config.github_token.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides_dotenv_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".env"),
            "# local settings\nREADY_TIMEOUT_SECS=7\nDOWNLOAD_TIMEOUT_SECS=9\n",
        )
        .unwrap();

        std::env::set_var("DOWNLOAD_TIMEOUT_SECS", "11");
        let config = Config::load(dir.path());
        std::env::remove_var("DOWNLOAD_TIMEOUT_SECS");

        assert_eq!(config.ready_timeout, Duration::from_secs(7));
        assert_eq!(config.download_timeout, Duration::from_secs(11));
    }

    #[test]
    #[serial]
    fn test_missing_dotenv_is_fine() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path());
        assert!(!config.github_api_url.is_empty());
    }
}
