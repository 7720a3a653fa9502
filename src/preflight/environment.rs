//! Environment checks: cache directory, privileges, API credentials.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::process::Cmd;

use super::types::CheckResult;

pub fn check_environment(config: &Config) -> Vec<CheckResult> {
    vec![
        check_writable("cache dir writable", &config.cache_dir),
        check_root(),
        check_token(config),
    ]
}

/// Create `dir` if needed and prove a file can be written into it.
pub fn check_writable(name: &str, dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(name, &format!("Cannot create {}: {}", dir.display(), e));
    }
    let marker = dir.join(".preflight-test");
    match fs::write(&marker, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            CheckResult::pass_with(name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

/// Partitioning needs root; everything else does not.
fn check_root() -> CheckResult {
    let uid = Cmd::new("id")
        .arg("-u")
        .allow_fail()
        .run()
        .ok()
        .filter(|r| r.success())
        .map(|r| r.stdout_trimmed().to_string());

    match uid.as_deref() {
        Some("0") => CheckResult::pass("root privileges"),
        Some(_) => CheckResult::warn(
            "root privileges",
            "Not running as root. `provision` and `build --device` will fail.",
        ),
        None => CheckResult::skip("root privileges", "Could not determine user id"),
    }
}

fn check_token(config: &Config) -> CheckResult {
    if config.github_token.is_some() {
        CheckResult::pass("GITHUB_TOKEN")
    } else {
        CheckResult::warn(
            "GITHUB_TOKEN",
            "Not set. Unauthenticated release lookups are limited to 60 requests/hour.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;
    use tempfile::TempDir;

    #[test]
    fn test_writable_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/cache");
        let result = check_writable("cache", &target);
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(target.is_dir());
        assert!(!target.join(".preflight-test").exists());
    }

    #[test]
    fn test_unwritable_path_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a-file");
        fs::write(&file, "x").unwrap();
        let result = check_writable("cache", &file.join("sub"));
        assert_eq!(result.status, CheckStatus::Fail);
    }
}
