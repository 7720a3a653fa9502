//! Known kernel extensions and where their releases live.

/// Asset pattern used unless a catalog entry says otherwise.
pub const DEFAULT_PATTERN: &str = "*RELEASE.zip";

/// One downloadable kext release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetSpec {
    /// Short name, also the key into the kernel-extension table.
    pub name: &'static str,
    /// `owner/repo` on GitHub.
    pub repo: &'static str,
    pub pattern: &'static str,
    pub fallback_pattern: Option<&'static str>,
    /// The primary bundle is the shallowest `.kext` whose name starts with this.
    pub bundle_prefix: &'static str,
    /// Destination directory name for the primary bundle.
    pub canonical_name: &'static str,
    /// Sibling bundles shipped in the same archive that are staged as-is.
    pub plugins: &'static [&'static str],
}

impl AssetSpec {
    pub fn is_multi_plugin(&self) -> bool {
        !self.plugins.is_empty()
    }
}

const fn acidanthera(name: &'static str, repo: &'static str, canonical_name: &'static str) -> AssetSpec {
    AssetSpec {
        name,
        repo,
        pattern: DEFAULT_PATTERN,
        fallback_pattern: None,
        bundle_prefix: name,
        canonical_name,
        plugins: &[],
    }
}

pub const CATALOG: &[AssetSpec] = &[
    acidanthera("Lilu", "acidanthera/Lilu", "Lilu.kext"),
    AssetSpec {
        plugins: &["SMCProcessor.kext", "SMCSuperIO.kext", "SMCBatteryManager.kext"],
        ..acidanthera("VirtualSMC", "acidanthera/VirtualSMC", "VirtualSMC.kext")
    },
    acidanthera("WhateverGreen", "acidanthera/WhateverGreen", "WhateverGreen.kext"),
    acidanthera("AppleALC", "acidanthera/AppleALC", "AppleALC.kext"),
    acidanthera("NVMeFix", "acidanthera/NVMeFix", "NVMeFix.kext"),
    acidanthera("IntelMausi", "acidanthera/IntelMausi", "IntelMausi.kext"),
    AssetSpec {
        fallback_pattern: Some("*.zip"),
        ..acidanthera("RealtekRTL8111", "Mieze/RTL8111_driver_for_OS_X", "RealtekRTL8111.kext")
    },
    AssetSpec {
        fallback_pattern: Some("*.zip"),
        ..acidanthera("LucyRTL8125Ethernet", "Mieze/LucyRTL8125Ethernet", "LucyRTL8125Ethernet.kext")
    },
];

/// Look up an entry by repository.
pub fn by_repo(repo: &str) -> Option<&'static AssetSpec> {
    CATALOG.iter().find(|spec| spec.repo.eq_ignore_ascii_case(repo))
}

/// Look up an entry by kext name, case-insensitively.
pub fn by_name(name: &str) -> Option<&'static AssetSpec> {
    let name = name.strip_suffix(".kext").unwrap_or(name);
    CATALOG.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Resolve a list of names, reporting the ones that are unknown.
pub fn select<'a>(names: &[&'a str]) -> (Vec<&'static AssetSpec>, Vec<&'a str>) {
    let mut found = Vec::new();
    let mut unknown = Vec::new();
    for &name in names {
        match by_name(name) {
            Some(spec) if !found.contains(&spec) => found.push(spec),
            Some(_) => {}
            None => unknown.push(name),
        }
    }
    (found, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        for (i, a) in CATALOG.iter().enumerate() {
            for b in &CATALOG[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.repo, b.repo);
            }
        }
    }

    #[test]
    fn test_canonical_names_are_bundles() {
        for spec in CATALOG {
            assert!(spec.canonical_name.ends_with(".kext"), "{}", spec.name);
            assert!(spec.canonical_name.starts_with(spec.bundle_prefix));
        }
    }

    #[test]
    fn test_virtualsmc_is_the_multi_plugin_entry() {
        let multi: Vec<_> = CATALOG.iter().filter(|s| s.is_multi_plugin()).map(|s| s.name).collect();
        assert_eq!(multi, ["VirtualSMC"]);
    }

    #[test]
    fn test_realtek_has_fallback() {
        let spec = by_repo("Mieze/RTL8111_driver_for_OS_X").unwrap();
        assert_eq!(spec.name, "RealtekRTL8111");
        assert_eq!(spec.fallback_pattern, Some("*.zip"));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(by_name("lilu").map(|s| s.repo), Some("acidanthera/Lilu"));
        assert_eq!(by_name("AppleALC.kext").map(|s| s.name), Some("AppleALC"));
        assert!(by_name("USBInjectAll").is_none());
    }

    #[test]
    fn test_select_dedupes_and_reports_unknown() {
        let (found, unknown) = select(&["Lilu", "lilu", "Bogus", "NVMeFix"]);
        let names: Vec<_> = found.iter().map(|s| s.name).collect();
        assert_eq!(names, ["Lilu", "NVMeFix"]);
        assert_eq!(unknown, ["Bogus"]);
    }
}
