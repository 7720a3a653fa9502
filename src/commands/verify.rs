//! Verify command - checks a config.plist and, if present, its staged kexts.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use efistage::assets::stage;
use efistage::opencore;
use efistage::plist::{self, ConfigNode};

/// Sections OpenCore refuses to boot without.
const REQUIRED_SECTIONS: &[&str] = &[
    "ACPI",
    "Booter",
    "DeviceProperties",
    "Kernel",
    "Misc",
    "NVRAM",
    "PlatformInfo",
    "UEFI",
];

/// Problems found in a parsed config. Empty means it looks usable.
pub fn check_tree(tree: &ConfigNode, staged: Option<&[String]>) -> Vec<String> {
    let mut problems = Vec::new();

    let Some(root) = tree.as_dict() else {
        return vec![format!("root is a {}, expected dict", tree.kind())];
    };
    for section in REQUIRED_SECTIONS {
        if !root.contains_key(section) {
            problems.push(format!("missing section {}", section));
        }
    }

    let bundles = opencore::referenced_bundles(tree);
    if let Some(staged) = staged {
        for bundle in &bundles {
            if !staged.contains(bundle) {
                problems.push(format!("{} is referenced but not staged", bundle));
            }
        }
    }
    problems
}

/// Execute the verify command.
///
/// `path` may be a config.plist or an EFI root containing `EFI/OC/config.plist`.
pub fn cmd_verify(path: &Path) -> Result<()> {
    let (config_path, efi_root) = if path.is_dir() {
        (stage::config_path(path), Some(path))
    } else {
        (path.to_path_buf(), None)
    };

    let xml = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let tree = plist::parse(&xml).with_context(|| format!("{} is not a valid plist", config_path.display()))?;

    let staged = match efi_root {
        Some(root) => Some(stage::staged_bundles(root)?),
        None => None,
    };
    let problems = check_tree(&tree, staged.as_deref());

    println!("Verifying {}:", config_path.display());
    println!("  kexts referenced: {}", opencore::referenced_bundles(&tree).join(", "));
    if let Some(staged) = &staged {
        println!("  kexts staged:     {}", staged.join(", "));
    }

    if !problems.is_empty() {
        for problem in &problems {
            println!("  ✗ {}", problem);
        }
        bail!("{} problem(s) found", problems.len());
    }
    println!("  ✓ OK");
    Ok(())
}
