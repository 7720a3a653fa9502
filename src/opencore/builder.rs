//! Assembly of the complete OpenCore configuration.
//!
//! The skeleton carries every top-level section with conservative defaults.
//! Hardware fragments, the profile's own boot-args and finally its raw
//! overrides are merged over it in that order.

use chrono::{DateTime, Utc};
use tracing::info;

use super::kexts::{self, LOAD_FIRST};
use super::parts::{self, APPLE_BOOT_GUID, APPLE_VENDOR_GUID};
use super::profile::HardwareProfile;
use crate::assets::catalog::AssetSpec;
use crate::dict;
use crate::error::SerializeError;
use crate::plist::value::{union_boot_args, BOOT_ARGS_KEY};
use crate::plist::{self, ConfigNode, Dict};
use crate::serial::PlatformIdentity;

/// Boot arguments every generated config starts with.
pub const DEFAULT_BOOT_ARGS: &str = "-v keepsyms=1 debug=0x100";

/// Informational section recording how the file was produced.
pub const GENERATED_KEY: &str = "#Generated";

pub const UEFI_DRIVERS: &[&str] = &["OpenRuntime.efi", "HfsPlus.efi", "OpenCanopy.efi"];

fn generated(profile: &HardwareProfile, identity: &PlatformIdentity, now: DateTime<Utc>) -> Dict {
    dict! {
        "Tool" => concat!("efistage ", env!("CARGO_PKG_VERSION")),
        "Profile" => profile.name.as_str(),
        "Date" => ConfigNode::date(now),
        "IdentitySource" => format!("{:?}", identity.source),
    }
}

fn acpi() -> Dict {
    dict! {
        "Add" => ConfigNode::empty_list(),
        "Delete" => ConfigNode::empty_list(),
        "Patch" => ConfigNode::empty_list(),
        "Quirks" => dict! {
            "FadtEnableReset" => false,
            "NormalizeHeaders" => false,
            "RebaseRegions" => false,
            "ResetHwSig" => false,
            "ResetLogoStatus" => true,
            "SyncTableIds" => false,
        },
    }
}

fn booter() -> Dict {
    dict! {
        "MmioWhitelist" => ConfigNode::empty_list(),
        "Patch" => ConfigNode::empty_list(),
        "Quirks" => dict! {
            "AvoidRuntimeDefrag" => true,
            "DevirtualiseMmio" => true,
            "EnableSafeModeSlide" => true,
            "EnableWriteUnprotector" => false,
            "ProtectUefiServices" => true,
            "ProvideCustomSlide" => true,
            "RebuildAppleMemoryMap" => true,
            "ResizeAppleGpuBars" => -1,
            "SetupVirtualMap" => true,
            "SyncRuntimePermissions" => true,
        },
    }
}

fn kernel() -> Dict {
    let load_first: Vec<ConfigNode> = LOAD_FIRST.iter().filter_map(|name| kexts::entry(name)).collect();
    dict! {
        "Add" => load_first,
        "Block" => ConfigNode::empty_list(),
        "Emulate" => ConfigNode::empty_dict(),
        "Force" => ConfigNode::empty_list(),
        "Patch" => ConfigNode::empty_list(),
        "Quirks" => dict! {
            "DisableIoMapper" => true,
            "DisableLinkeditJettison" => true,
            "PanicNoKextDump" => true,
            "PowerTimeoutKernelPanic" => true,
            "XhciPortLimit" => false,
        },
        "Scheme" => dict! {
            "FuzzyMatch" => true,
            "KernelArch" => "x86_64",
            "KernelCache" => "Auto",
        },
    }
}

fn misc() -> Dict {
    dict! {
        "Boot" => dict! {
            "HideAuxiliary" => true,
            "PickerAttributes" => 17,
            "PickerMode" => "External",
            "PollAppleHotKeys" => true,
            "ShowPicker" => true,
            "Timeout" => 5,
        },
        "Debug" => dict! {
            "AppleDebug" => true,
            "ApplePanic" => true,
            "DisableWatchDog" => true,
            "Target" => 3,
        },
        "Security" => dict! {
            "AllowSetDefault" => true,
            "ExposeSensitiveData" => 6,
            "ScanPolicy" => 0,
            "SecureBootModel" => "Disabled",
            "Vault" => "Optional",
        },
    }
}

fn nvram() -> Dict {
    dict! {
        "Add" => dict! {
            APPLE_VENDOR_GUID => dict! {
                "DefaultBackgroundColor" => ConfigNode::data(&[0, 0, 0, 0]),
            },
            APPLE_BOOT_GUID => dict! {
                BOOT_ARGS_KEY => union_boot_args(DEFAULT_BOOT_ARGS, ""),
                "csr-active-config" => ConfigNode::data(&[0, 0, 0, 0]),
                "prev-lang:kbd" => ConfigNode::data(b"en-US:0"),
            },
        },
        "Delete" => dict! {
            APPLE_VENDOR_GUID => vec![ConfigNode::from("DefaultBackgroundColor")],
            APPLE_BOOT_GUID => vec![
                ConfigNode::from(BOOT_ARGS_KEY),
                ConfigNode::from("csr-active-config"),
                ConfigNode::from("prev-lang:kbd"),
            ],
        },
        "WriteFlash" => true,
    }
}

fn platform_info(profile: &HardwareProfile, identity: &PlatformIdentity) -> Dict {
    dict! {
        "Automatic" => true,
        "Generic" => dict! {
            "MLB" => identity.board_serial.as_str(),
            "ProcessorType" => 0,
            "ROM" => ConfigNode::data(&identity.rom),
            "SpoofVendor" => true,
            "SystemProductName" => profile.smbios.as_str(),
            "SystemSerialNumber" => identity.serial_number.as_str(),
            "SystemUUID" => identity.system_uuid.as_str(),
        },
        "UpdateDataHub" => true,
        "UpdateNVRAM" => true,
        "UpdateSMBIOS" => true,
        "UpdateSMBIOSMode" => "Create",
    }
}

fn uefi() -> Dict {
    let drivers: Vec<ConfigNode> = UEFI_DRIVERS
        .iter()
        .map(|path| {
            ConfigNode::from(dict! {
                "Arguments" => "",
                "Comment" => "",
                "Enabled" => true,
                "LoadEarly" => false,
                "Path" => *path,
            })
        })
        .collect();
    dict! {
        "ConnectDrivers" => true,
        "Drivers" => drivers,
        "Quirks" => dict! {
            "ReleaseUsbOwnership" => true,
            "RequestBootVarRouting" => true,
            "UnblockFsConnect" => false,
        },
    }
}

/// Every top-level section with its defaults, before any hardware fragment.
pub fn skeleton(profile: &HardwareProfile, identity: &PlatformIdentity, now: DateTime<Utc>) -> ConfigNode {
    ConfigNode::from(dict! {
        GENERATED_KEY => generated(profile, identity, now),
        "ACPI" => acpi(),
        "Booter" => booter(),
        "DeviceProperties" => dict! {
            "Add" => ConfigNode::empty_dict(),
            "Delete" => ConfigNode::empty_dict(),
        },
        "Kernel" => kernel(),
        "Misc" => misc(),
        "NVRAM" => nvram(),
        "PlatformInfo" => platform_info(profile, identity),
        "UEFI" => uefi(),
    })
}

/// Move the kexts named in [`LOAD_FIRST`] to the front of `Kernel/Add`,
/// keeping the relative order of everything else.
pub fn order_kernel_add(tree: &mut ConfigNode) {
    let Some(ConfigNode::List(entries)) = tree
        .as_dict_mut()
        .and_then(|d| d.get_mut("Kernel"))
        .and_then(ConfigNode::as_dict_mut)
        .and_then(|k| k.get_mut("Add"))
    else {
        return;
    };

    let rank = |entry: &ConfigNode| {
        let bundle = entry
            .as_dict()
            .and_then(|d| d.get("BundlePath"))
            .and_then(ConfigNode::as_str)
            .unwrap_or_default();
        LOAD_FIRST
            .iter()
            .position(|name| bundle.strip_suffix(".kext") == Some(*name))
            .unwrap_or(LOAD_FIRST.len())
    };
    entries.sort_by_key(rank);
}

/// Merge everything the profile contributes into `tree`: hardware
/// fragments, extra boot-args and raw overrides, then fix the kext order.
pub fn apply_profile(tree: &mut ConfigNode, profile: &HardwareProfile) -> Result<(), SerializeError> {
    for fragment in [
        parts::cpu(profile),
        parts::gpu(profile),
        parts::audio(profile),
        parts::ethernet(profile),
    ] {
        tree.merge(fragment);
    }

    if !profile.boot_args.is_empty() {
        tree.merge(parts::boot_args(&profile.boot_args));
    }

    if let Some(overrides) = &profile.overrides {
        let node = ConfigNode::try_from(overrides.clone())?;
        if node.as_dict().is_none() {
            return Err(SerializeError::UnsupportedValueKind(format!(
                "profile overrides must be a dict, got {}",
                node.kind()
            )));
        }
        tree.merge(node);
    }

    order_kernel_add(tree);
    Ok(())
}

/// Build the complete configuration tree for a profile.
pub fn build_config(
    profile: &HardwareProfile,
    identity: &PlatformIdentity,
    now: DateTime<Utc>,
) -> Result<ConfigNode, SerializeError> {
    let mut tree = skeleton(profile, identity, now);
    apply_profile(&mut tree, profile)?;

    info!(
        profile = %profile.name,
        kexts = kexts::referenced_bundles(&tree).len(),
        "built config"
    );
    Ok(tree)
}

/// Catalog entries a profile's config loads, without generating an identity.
///
/// Also returns bundle paths no catalog entry provides.
pub fn required_kexts(
    profile: &HardwareProfile,
) -> Result<(Vec<&'static AssetSpec>, Vec<String>), SerializeError> {
    let mut tree = ConfigNode::from(dict! { "Kernel" => kernel() });
    apply_profile(&mut tree, profile)?;
    Ok(kexts::required_assets(&tree))
}

/// Build and serialize in one step.
pub fn render(
    profile: &HardwareProfile,
    identity: &PlatformIdentity,
    now: DateTime<Utc>,
) -> Result<String, SerializeError> {
    build_config(profile, identity, now).map(|tree| plist::serialize(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opencore::profile::builtin;
    use crate::serial::IdentitySource;
    use chrono::TimeZone;

    fn identity() -> PlatformIdentity {
        PlatformIdentity {
            serial_number: "C02XXXXXXXXX".to_string(),
            board_serial: "C02000000000000AA".to_string(),
            system_uuid: "2A5E3C8F-0B1D-4E6A-9F7C-1D2E3F4A5B6C".to_string(),
            rom: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            source: IdentitySource::Generated,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn boot_args(tree: &ConfigNode) -> &str {
        tree.pointer(&format!("NVRAM/Add/{}/boot-args", APPLE_BOOT_GUID))
            .and_then(ConfigNode::as_str)
            .unwrap()
    }

    #[test]
    fn test_alder_lake_config() {
        let profile = builtin("alder-lake-desktop").unwrap();
        let tree = build_config(&profile, &identity(), now()).unwrap();

        assert_eq!(
            kexts::referenced_bundles(&tree),
            [
                "Lilu.kext",
                "VirtualSMC.kext",
                "SMCProcessor.kext",
                "SMCSuperIO.kext",
                "NVMeFix.kext",
                "WhateverGreen.kext",
                "AppleALC.kext",
                "RealtekRTL8111.kext",
            ]
        );
        assert_eq!(
            boot_args(&tree),
            "-v -wegnoegpu agdpmod=pikera alcid=11 debug=0x100 keepsyms=1"
        );
        assert_eq!(
            tree.pointer("PlatformInfo/Generic/SystemProductName").and_then(ConfigNode::as_str),
            Some("iMac20,2")
        );
        assert_eq!(
            tree.pointer("PlatformInfo/Generic/ROM").and_then(ConfigNode::as_bytes),
            Some(vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
        );
        assert_eq!(tree.pointer("ACPI/Add").and_then(ConfigNode::as_list).map(<[_]>::len), Some(4));
    }

    #[test]
    fn test_top_level_sections() {
        let profile = builtin("generic").unwrap();
        let tree = build_config(&profile, &identity(), now()).unwrap();
        let keys: Vec<_> = tree.as_dict().unwrap().keys().collect();
        assert_eq!(
            keys,
            [
                GENERATED_KEY,
                "ACPI",
                "Booter",
                "DeviceProperties",
                "Kernel",
                "Misc",
                "NVRAM",
                "PlatformInfo",
                "UEFI"
            ]
        );
        assert_eq!(boot_args(&tree), "-v debug=0x100 keepsyms=1");
        let drivers = tree.pointer("UEFI/Drivers").and_then(ConfigNode::as_list).unwrap();
        assert_eq!(drivers.len(), UEFI_DRIVERS.len());
    }

    #[test]
    fn test_profile_boot_args_and_overrides() {
        let mut profile = builtin("generic").unwrap();
        profile.boot_args = vec!["-v".to_string(), "-no_compat_check".to_string()];
        profile.overrides = Some(serde_json::json!({
            "Misc": {"Boot": {"Timeout": 0}},
            "Kernel": {"Add": [{"BundlePath": "Lilu.kext"}, {"BundlePath": "USBMap.kext"}]}
        }));
        let tree = build_config(&profile, &identity(), now()).unwrap();

        assert_eq!(boot_args(&tree), "-no_compat_check -v debug=0x100 keepsyms=1");
        assert_eq!(tree.pointer("Misc/Boot/Timeout").and_then(ConfigNode::as_integer), Some(0));
        let bundles = kexts::referenced_bundles(&tree);
        assert_eq!(bundles.iter().filter(|b| *b == "Lilu.kext").count(), 1);
        assert_eq!(bundles.last().map(String::as_str), Some("USBMap.kext"));
    }

    #[test]
    fn test_null_override_is_fatal() {
        let mut profile = builtin("generic").unwrap();
        profile.overrides = Some(serde_json::json!({"Misc": {"Boot": {"Timeout": null}}}));
        let err = build_config(&profile, &identity(), now()).unwrap_err();
        assert!(matches!(err, SerializeError::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_non_dict_override_rejected() {
        let mut profile = builtin("generic").unwrap();
        profile.overrides = Some(serde_json::json!([1, 2]));
        assert!(build_config(&profile, &identity(), now()).is_err());
    }

    #[test]
    fn test_order_kernel_add_is_stable() {
        let entry = |name: &str| ConfigNode::from(dict! { "BundlePath" => format!("{}.kext", name) });
        let mut tree = ConfigNode::from(dict! {
            "Kernel" => dict! {
                "Add" => vec![entry("AppleALC"), entry("VirtualSMC"), entry("NVMeFix"), entry("Lilu")],
            },
        });
        order_kernel_add(&mut tree);
        assert_eq!(
            kexts::referenced_bundles(&tree),
            ["Lilu.kext", "VirtualSMC.kext", "AppleALC.kext", "NVMeFix.kext"]
        );
    }

    #[test]
    fn test_required_kexts_for_profile() {
        let profile = builtin("coffee-lake-desktop").unwrap();
        let (specs, unknown) = required_kexts(&profile).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name).collect();
        assert_eq!(names, ["Lilu", "VirtualSMC", "NVMeFix", "WhateverGreen", "IntelMausi"]);
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_render_round_trips() {
        let profile = builtin("alder-lake-desktop").unwrap();
        let tree = build_config(&profile, &identity(), now()).unwrap();
        let xml = render(&profile, &identity(), now()).unwrap();
        assert_eq!(plist::parse(&xml).unwrap(), tree);
    }
}
