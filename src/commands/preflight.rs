//! Preflight command.

use anyhow::Result;

use efistage::config::Config;
use efistage::preflight::{self, CheckStatus};

/// Check the host. Without `strict`, failures are listed but not fatal:
/// `config` and a local `build` still work without the disk tools.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    if strict {
        return preflight::run_preflight_or_fail(config);
    }

    let report = preflight::run_preflight(config);
    report.print();

    let failed: Vec<&str> = report
        .checks
        .iter()
        .filter(|c| c.status == CheckStatus::Fail)
        .map(|c| c.name.as_str())
        .collect();
    if !failed.is_empty() {
        println!("Not ready to write a device (failed: {}).", failed.join(", "));
        println!("Use --strict to exit non-zero.");
    }
    Ok(())
}
