//! Per-subsystem config fragments.
//!
//! Each function returns a partial tree that the builder merges into the
//! skeleton. Fragments only contain the keys they contribute.

use tracing::{debug, info};

use super::kexts;
use super::profile::{
    HardwareProfile, VENDOR_AMD, VENDOR_INTEL, VENDOR_NVIDIA, VENDOR_REALTEK,
};
use crate::dict;
use crate::plist::value::BOOT_ARGS_KEY;
use crate::plist::{ConfigNode, Dict};

/// NVRAM namespace holding `boot-args`.
pub const APPLE_BOOT_GUID: &str = "7C436110-AB2A-4BBB-A880-FE41995C9F82";
/// NVRAM namespace for OpenCore picker variables.
pub const APPLE_VENDOR_GUID: &str = "4D1EDE05-38C7-4A6A-9CC6-4BCCA8B38C14";

pub const IGPU_PATH: &str = "PciRoot(0x0)/Pci(0x2,0x0)";
pub const AUDIO_PATH: &str = "PciRoot(0x0)/Pci(0x1F,0x3)";

/// Desktop GT1 iGPUs of 12th to 14th gen parts that take the `0B00A000` framebuffer.
const INTEL_GT1_DESKTOP_IDS: &[u16] = &[
    0x4680, 0x4690, 0xA780, 0x46A0, 0x4682, 0x4692, 0xA782, 0xA788, 0x46A2, 0x468B, 0x469B, 0xA78B,
];

const IG_PLATFORM_ID: [u8; 4] = [0x0B, 0x00, 0xA0, 0x00];
const FRAMEBUFFER_PATCH_ENABLE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];
const FRAMEBUFFER_STOLENMEM: [u8; 4] = [0x00, 0x00, 0x00, 0x04];

const SSDTS: &[(&str, &str)] = &[
    ("SSDT-PLUG-ALT.aml", "SSDT-PLUG-ALT - CPU Power Management"),
    (
        "SSDT-EC-USBX-DESKTOP.aml",
        "SSDT-EC-USBX-DESKTOP - Embedded Controller and USBX Fix",
    ),
    (
        "SSDT-AWAC-DISABLE.aml",
        "SSDT-AWAC-DISABLE - Disable AWAC, use system RTC",
    ),
    ("SSDT-RHUB.aml", "SSDT-RHUB - USB Reset"),
];

/// `NVRAM/Add/<boot guid>/boot-args` fragment.
pub fn boot_args(words: &[String]) -> ConfigNode {
    let mut sorted: Vec<&str> = words.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    ConfigNode::from(dict! {
        "NVRAM" => dict! {
            "Add" => dict! {
                APPLE_BOOT_GUID => dict! { BOOT_ARGS_KEY => sorted.join(" ") },
            },
        },
    })
}

fn kernel_add(entries: Vec<ConfigNode>) -> ConfigNode {
    ConfigNode::from(dict! { "Kernel" => dict! { "Add" => entries } })
}

fn device_properties(path: &str, props: Dict) -> ConfigNode {
    ConfigNode::from(dict! {
        "DeviceProperties" => dict! { "Add" => dict! { path => props } },
    })
}

/// SSDTs, SMC plugins and power-management quirks.
pub fn cpu(profile: &HardwareProfile) -> ConfigNode {
    let mut acpi_add = Vec::new();
    let mut kernel = Vec::new();

    if profile.cpu.is_modern_intel_desktop() {
        info!(cpu = %profile.cpu.brand, "modern Intel desktop, adding SSDTs and SMC plugins");
        for (path, comment) in SSDTS {
            acpi_add.push(ConfigNode::from(dict! {
                "Comment" => *comment,
                "Enabled" => true,
                "Path" => *path,
            }));
        }
        kernel.extend(["SMCProcessor", "SMCSuperIO"].into_iter().filter_map(kexts::entry));
    } else {
        debug!(cpu = %profile.cpu.brand, "no CPU-specific SSDTs");
    }
    kernel.extend(kexts::entry("NVMeFix"));

    ConfigNode::from(dict! {
        "ACPI" => dict! { "Add" => acpi_add },
        "Kernel" => dict! {
            "Add" => kernel,
            "Emulate" => dict! {
                "Cpuid1Data" => ConfigNode::data(&[]),
                "Cpuid1Mask" => ConfigNode::data(&[]),
            },
            "Quirks" => dict! {
                "AppleCpuPmCfgLock" => false,
                "AppleXcpmCfgLock" => true,
                "DummyPowerManagement" => false,
                "ProvideCurrentCpuInfo" => true,
            },
        },
    })
}

fn is_supported_igpu(profile: &HardwareProfile, device_id: u16) -> bool {
    profile.cpu.is_intel()
        && profile.cpu.generation().is_some_and(|g| (12..=14).contains(&g))
        && INTEL_GT1_DESKTOP_IDS.contains(&device_id)
}

/// Framebuffer properties, display boot-args and WhateverGreen.
pub fn gpu(profile: &HardwareProfile) -> ConfigNode {
    let mut tree = ConfigNode::empty_dict();
    let mut words = Vec::new();
    let mut configured = false;

    // decided up front so an iGPU listed after the dGPU still counts
    let igpu = profile
        .gpus
        .iter()
        .find(|g| g.vendor_id == VENDOR_INTEL && is_supported_igpu(profile, g.device_id));

    if let Some(igpu) = igpu {
        let [lo, hi] = igpu.device_id.to_le_bytes();
        tree.merge(device_properties(
            IGPU_PATH,
            dict! {
                "AAPL,ig-platform-id" => ConfigNode::data(&IG_PLATFORM_ID),
                "device-id" => ConfigNode::data(&[lo, hi, 0x00, 0x00]),
                "framebuffer-patch-enable" => ConfigNode::data(&FRAMEBUFFER_PATCH_ENABLE),
                "framebuffer-stolenmem" => ConfigNode::data(&FRAMEBUFFER_STOLENMEM),
            },
        ));
        words.push("agdpmod=pikera".to_string());
        configured = true;
        info!(gpu = %igpu.name, device_id = %format!("{:04X}", igpu.device_id), "configured iGPU");
    }

    for gpu in &profile.gpus {
        match gpu.vendor_id {
            VENDOR_NVIDIA => {
                configured = true;
                if igpu.is_some() {
                    words.push("-wegnoegpu".to_string());
                }
                info!(gpu = %gpu.name, "NVIDIA dGPU is unsupported, leaving it disabled");
            }
            VENDOR_AMD => {
                configured = true;
                words.push("agdpmod=pikera".to_string());
                info!(gpu = %gpu.name, "configured AMD dGPU");
            }
            VENDOR_INTEL => {}
            other => debug!(gpu = %gpu.name, vendor = %format!("{:04X}", other), "unknown GPU vendor"),
        }
    }

    if configured {
        tree.merge(kernel_add(kexts::entry("WhateverGreen").into_iter().collect()));
    }
    if !words.is_empty() {
        tree.merge(boot_args(&words));
    }
    tree
}

/// AppleALC with a layout id for the first Realtek codec.
pub fn audio(profile: &HardwareProfile) -> ConfigNode {
    let Some(codec) = profile.audio.iter().find(|a| a.vendor_id == VENDOR_REALTEK) else {
        debug!("no Realtek codec, skipping AppleALC");
        return ConfigNode::empty_dict();
    };

    let mut tree = device_properties(
        AUDIO_PATH,
        dict! { "layout-id" => ConfigNode::data(&codec.layout_id.to_le_bytes()) },
    );
    tree.merge(boot_args(&[format!("alcid={}", codec.layout_id)]));
    tree.merge(kernel_add(kexts::entry("AppleALC").into_iter().collect()));
    info!(codec = %codec.name, layout_id = codec.layout_id, "configured audio");
    tree
}

/// Kext for a NIC, if one is known.
pub fn ethernet_kext(vendor_id: u16, device_id: u16) -> Option<&'static str> {
    match (vendor_id, device_id) {
        (VENDOR_REALTEK, 0x8168 | 0x8111) => Some("RealtekRTL8111"),
        (VENDOR_REALTEK, 0x8125) => Some("LucyRTL8125Ethernet"),
        (VENDOR_INTEL, _) => Some("IntelMausi"),
        _ => None,
    }
}

/// One NIC kext per kind, commented with the controller it serves.
pub fn ethernet(profile: &HardwareProfile) -> ConfigNode {
    let mut entries = Vec::new();
    let mut added: Vec<&str> = Vec::new();

    for nic in &profile.ethernet {
        let Some(name) = ethernet_kext(nic.vendor_id, nic.device_id) else {
            debug!(nic = %nic.name, "no kext for this controller");
            continue;
        };
        if added.contains(&name) {
            continue;
        }
        if let Some(info) = kexts::info(name) {
            let comment = format!(
                "{} for {} (VID:{:04X} DID:{:04X})",
                info.comment, nic.name, nic.vendor_id, nic.device_id
            );
            entries.push(kexts::entry_with_comment(info, Some(comment)));
            added.push(name);
        }
    }

    if entries.is_empty() {
        ConfigNode::empty_dict()
    } else {
        kernel_add(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opencore::profile::{builtin, AudioDevice, CpuInfo, PciDevice};

    fn boot_args_of(tree: &ConfigNode) -> Option<&str> {
        tree.pointer(&format!("NVRAM/Add/{}/boot-args", APPLE_BOOT_GUID))
            .and_then(ConfigNode::as_str)
    }

    fn bundles(tree: &ConfigNode) -> Vec<String> {
        kexts::referenced_bundles(tree)
    }

    #[test]
    fn test_cpu_modern_intel() {
        let profile = builtin("alder-lake-desktop").unwrap();
        let tree = cpu(&profile);
        let ssdts = tree.pointer("ACPI/Add").and_then(ConfigNode::as_list).unwrap();
        assert_eq!(ssdts.len(), 4);
        assert_eq!(
            bundles(&tree),
            ["SMCProcessor.kext", "SMCSuperIO.kext", "NVMeFix.kext"]
        );
        assert_eq!(
            tree.pointer("Kernel/Quirks/AppleXcpmCfgLock").and_then(ConfigNode::as_bool),
            Some(true)
        );
        assert_eq!(
            tree.pointer("Kernel/Emulate/Cpuid1Data").and_then(ConfigNode::as_bytes),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_cpu_other_gets_only_nvmefix() {
        let profile = builtin("generic").unwrap();
        let tree = cpu(&profile);
        assert!(tree.pointer("ACPI/Add").and_then(ConfigNode::as_list).unwrap().is_empty());
        assert_eq!(bundles(&tree), ["NVMeFix.kext"]);
    }

    #[test]
    fn test_igpu_with_nvidia() {
        let profile = builtin("alder-lake-desktop").unwrap();
        let tree = gpu(&profile);

        let props = tree
            .pointer("DeviceProperties/Add")
            .and_then(ConfigNode::as_dict)
            .and_then(|d| d.get(IGPU_PATH))
            .unwrap();
        let device_id = props.as_dict().unwrap().get("device-id").unwrap();
        assert_eq!(device_id.as_bytes(), Some(vec![0x80, 0x46, 0x00, 0x00]));
        let platform = props.as_dict().unwrap().get("AAPL,ig-platform-id").unwrap();
        assert_eq!(platform.as_bytes(), Some(IG_PLATFORM_ID.to_vec()));

        assert_eq!(boot_args_of(&tree), Some("-wegnoegpu agdpmod=pikera"));
        assert_eq!(bundles(&tree), ["WhateverGreen.kext"]);
    }

    #[test]
    fn test_nvidia_listed_before_igpu_still_disabled() {
        let mut profile = builtin("alder-lake-desktop").unwrap();
        profile.gpus.reverse();
        assert_eq!(boot_args_of(&gpu(&profile)), Some("-wegnoegpu agdpmod=pikera"));
    }

    #[test]
    fn test_nvidia_alone_adds_no_boot_args() {
        let mut profile = builtin("generic").unwrap();
        profile.gpus = vec![PciDevice::new("GTX 970", VENDOR_NVIDIA, 0x13C2)];
        let tree = gpu(&profile);
        assert_eq!(boot_args_of(&tree), None);
        assert_eq!(bundles(&tree), ["WhateverGreen.kext"]);
    }

    #[test]
    fn test_igpu_ignored_on_older_cpu() {
        let mut profile = builtin("generic").unwrap();
        profile.cpu = CpuInfo::new("Intel(R) Core(TM) i9-9900K CPU @ 3.60GHz");
        profile.gpus = vec![PciDevice::new("UHD 630", VENDOR_INTEL, 0x3E98)];
        let tree = gpu(&profile);
        assert!(tree.pointer("DeviceProperties").is_none());
        assert!(bundles(&tree).is_empty());
    }

    #[test]
    fn test_amd_dgpu() {
        let profile = builtin("coffee-lake-desktop").unwrap();
        let tree = gpu(&profile);
        assert_eq!(boot_args_of(&tree), Some("agdpmod=pikera"));
        assert_eq!(bundles(&tree), ["WhateverGreen.kext"]);
    }

    #[test]
    fn test_audio_layout() {
        let mut profile = builtin("generic").unwrap();
        profile.audio = vec![AudioDevice {
            name: "ALC1220".to_string(),
            vendor_id: VENDOR_REALTEK,
            device_id: 0x1220,
            layout_id: 7,
        }];
        let tree = audio(&profile);
        let layout = tree
            .pointer("DeviceProperties/Add")
            .and_then(ConfigNode::as_dict)
            .and_then(|d| d.get(AUDIO_PATH))
            .and_then(|p| p.as_dict()?.get("layout-id"))
            .and_then(ConfigNode::as_bytes);
        assert_eq!(layout, Some(vec![7, 0, 0, 0]));
        assert_eq!(boot_args_of(&tree), Some("alcid=7"));
        assert_eq!(bundles(&tree), ["AppleALC.kext"]);
    }

    #[test]
    fn test_no_audio_is_empty() {
        let profile = builtin("generic").unwrap();
        assert_eq!(audio(&profile), ConfigNode::empty_dict());
    }

    #[test]
    fn test_ethernet_kext_selection() {
        assert_eq!(ethernet_kext(VENDOR_REALTEK, 0x8168), Some("RealtekRTL8111"));
        assert_eq!(ethernet_kext(VENDOR_REALTEK, 0x8111), Some("RealtekRTL8111"));
        assert_eq!(ethernet_kext(VENDOR_REALTEK, 0x8125), Some("LucyRTL8125Ethernet"));
        assert_eq!(ethernet_kext(VENDOR_INTEL, 0x15B8), Some("IntelMausi"));
        assert_eq!(ethernet_kext(0x14E4, 0x1686), None);
    }

    #[test]
    fn test_ethernet_deduplicates_and_comments() {
        let mut profile = builtin("generic").unwrap();
        profile.ethernet = vec![
            PciDevice::new("Realtek PCIe GbE", VENDOR_REALTEK, 0x8168),
            PciDevice::new("Second Realtek", VENDOR_REALTEK, 0x8111),
        ];
        let tree = ethernet(&profile);
        let entries = tree.pointer("Kernel/Add").and_then(ConfigNode::as_list).unwrap();
        assert_eq!(entries.len(), 1);
        let comment = entries[0].as_dict().unwrap().get("Comment").and_then(ConfigNode::as_str);
        assert_eq!(
            comment,
            Some("Realtek Gigabit Ethernet (RTL8111/8168) for Realtek PCIe GbE (VID:10EC DID:8168)")
        );
    }
}
