//! Bounded readiness polling.
//!
//! After a partition is created the kernel and udev need a moment before the
//! new device node appears. Callers poll a check until it reports ready or the
//! deadline passes; there is no fixed sleep.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::debug;

use crate::process::{self, Cmd};

/// Delay between checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Call `check` until it returns true or `timeout` elapses.
///
/// The check always runs at least once. Returns the time waited on success.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> Option<Duration>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if check() {
            return Some(start.elapsed());
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return None;
        }
        thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Wait until a block device node exists.
///
/// Runs `udevadm settle` first when available so the common case needs no
/// polling at all. Settle and poll share the one `timeout`.
pub fn wait_until_ready(node: &Path, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    if process::tool_exists("udevadm") {
        // a failed settle leaves the decision to the node poll below
        let _ = Cmd::new("udevadm")
            .args(["settle", &format!("--timeout={}", timeout.as_secs().max(1))])
            .allow_fail()
            .run();
    }

    let remaining = timeout.saturating_sub(started.elapsed());
    match poll_until(remaining, POLL_INTERVAL, || node.exists()) {
        Some(waited) => {
            debug!(node = %node.display(), ?waited, "device node ready");
            Ok(())
        }
        None => bail!(
            "{} did not appear within {}s",
            node.display(),
            timeout.as_secs_f32()
        ),
    }
}
