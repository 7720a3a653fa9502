//! Host tool availability checks.

use std::path::Path;

use crate::process;

use super::types::CheckResult;

/// `(tool, package, purpose)` for tools without which a command cannot run.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("lsblk", "util-linux", "Required to list block devices"),
    ("wipefs", "util-linux", "Required to clear old signatures"),
    ("sgdisk", "gdisk", "Required to write the GPT"),
    ("mkfs.vfat", "dosfstools", "Required to format the EFI partition"),
    ("mkfs.exfat", "exfatprogs", "Required to format the data partition"),
    ("unzip", "unzip", "Required to expand kext releases"),
    ("tar", "tar", "Required to expand tarball releases"),
    ("mount", "util-linux", "Required to mount the EFI partition during build"),
    ("umount", "util-linux", "Required to unmount the EFI partition after build"),
];

const OPTIONAL_TOOLS: &[(&str, &str, &str)] = &[(
    "udevadm",
    "systemd-udev",
    "Speeds up waiting for new partitions",
)];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let mut results: Vec<CheckResult> = REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose, true))
        .collect();

    results.extend(
        OPTIONAL_TOOLS
            .iter()
            .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose, false)),
    );
    results
}

/// The serial utility is optional: without it the config carries sentinel values.
pub fn check_serial_utility(path: &Path) -> CheckResult {
    if path.is_file() {
        CheckResult::pass_with("macserial", &path.display().to_string())
    } else {
        CheckResult::warn(
            "macserial",
            &format!(
                "Not found at {}. Generated configs will carry placeholder serials. Set MACSERIAL_PATH.",
                path.display()
            ),
        )
    }
}

fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::find_tool(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
