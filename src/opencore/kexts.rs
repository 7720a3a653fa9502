//! `Kernel/Add` entries for known kernel extensions.

use crate::assets::catalog::{self, AssetSpec};
use crate::dict;
use crate::plist::{ConfigNode, Dict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KextInfo {
    pub name: &'static str,
    pub comment: &'static str,
    /// Catalog entry whose release archive carries this bundle.
    pub shipped_by: &'static str,
}

impl KextInfo {
    pub fn bundle_path(&self) -> String {
        format!("{}.kext", self.name)
    }

    pub fn executable_path(&self) -> String {
        format!("Contents/MacOS/{}", self.name)
    }
}

const fn kext(name: &'static str, comment: &'static str) -> KextInfo {
    KextInfo {
        name,
        comment,
        shipped_by: name,
    }
}

pub const KEXTS: &[KextInfo] = &[
    kext("Lilu", "Core kext patching library"),
    kext("VirtualSMC", "Advanced SMC emulator"),
    kext("WhateverGreen", "Graphics card patching (Intel, AMD, NVIDIA)"),
    kext("AppleALC", "Audio patching for unsupported codecs"),
    kext("RealtekRTL8111", "Realtek Gigabit Ethernet (RTL8111/8168)"),
    kext("LucyRTL8125Ethernet", "Realtek 2.5Gb Ethernet (RTL8125)"),
    kext("IntelMausi", "Intel Ethernet LAN kext (most common Intel NICs)"),
    KextInfo {
        shipped_by: "VirtualSMC",
        ..kext("SMCProcessor", "VirtualSMC plugin for CPU temperature monitoring")
    },
    KextInfo {
        shipped_by: "VirtualSMC",
        ..kext("SMCSuperIO", "VirtualSMC plugin for fan speed monitoring")
    },
    kext("NVMeFix", "NVMe power management and compatibility fixes"),
];

/// Kexts that must lead `Kernel/Add`, in this order.
pub const LOAD_FIRST: &[&str] = &["Lilu", "VirtualSMC"];

pub fn info(name: &str) -> Option<&'static KextInfo> {
    KEXTS.iter().find(|k| k.name == name)
}

/// Properties shared by every `Kernel/Add` entry.
fn common_properties() -> Dict {
    dict! {
        "Arch" => "Any",
        "Enabled" => true,
        "MaxKernel" => "",
        "MinKernel" => "",
        "PlistPath" => "Contents/Info.plist",
    }
}

/// A complete `Kernel/Add` entry, with the comment optionally replaced.
pub fn entry_with_comment(kext: &KextInfo, comment: Option<String>) -> ConfigNode {
    let mut entry = dict! {
        "BundlePath" => kext.bundle_path(),
        "Comment" => comment.unwrap_or_else(|| kext.comment.to_string()),
        "ExecutablePath" => kext.executable_path(),
    };
    for (key, value) in common_properties() {
        entry.insert(key, value);
    }
    ConfigNode::Dict(entry)
}

/// `Kernel/Add` entry for a known kext, or `None` if the name is unknown.
pub fn entry(name: &str) -> Option<ConfigNode> {
    info(name).map(|k| entry_with_comment(k, None))
}

/// Bundle paths listed under `Kernel/Add`, in order.
pub fn referenced_bundles(tree: &ConfigNode) -> Vec<String> {
    tree.pointer("Kernel/Add")
        .and_then(ConfigNode::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|e| e.as_dict()?.get("BundlePath")?.as_str())
        .map(str::to_string)
        .collect()
}

/// Catalog entries needed to supply every bundle `tree` loads.
///
/// Returns the entries in load order plus any bundle paths that no catalog
/// entry provides.
pub fn required_assets(tree: &ConfigNode) -> (Vec<&'static AssetSpec>, Vec<String>) {
    let mut specs: Vec<&'static AssetSpec> = Vec::new();
    let mut unknown = Vec::new();

    for bundle in referenced_bundles(tree) {
        let name = bundle.strip_suffix(".kext").unwrap_or(&bundle);
        let shipped_by = info(name).map(|k| k.shipped_by).unwrap_or(name);
        match catalog::by_name(shipped_by) {
            Some(spec) if !specs.contains(&spec) => specs.push(spec),
            Some(_) => {}
            None => unknown.push(bundle.clone()),
        }
    }
    (specs, unknown)
}
