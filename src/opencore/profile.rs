//! Hardware profiles: the inputs the config builder reads.
//!
//! A few named profiles are built in. Custom ones are loaded from JSON with
//! the same shape; PCI ids are written as hex strings (`"8086"`, `"0x8086"`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;

pub const VENDOR_INTEL: u16 = 0x8086;
pub const VENDOR_NVIDIA: u16 = 0x10DE;
pub const VENDOR_AMD: u16 = 0x1002;
pub const VENDOR_REALTEK: u16 = 0x10EC;

pub const DEFAULT_LAYOUT_ID: u32 = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// SMBIOS model, e.g. `iMac20,2`.
    pub smbios: String,
    pub cpu: CpuInfo,
    #[serde(default)]
    pub gpus: Vec<PciDevice>,
    #[serde(default)]
    pub audio: Vec<AudioDevice>,
    #[serde(default)]
    pub ethernet: Vec<PciDevice>,
    /// Extra boot arguments, unioned into NVRAM.
    #[serde(default)]
    pub boot_args: Vec<String>,
    /// Raw subtree merged over the generated config last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// Marketing brand string as reported by the CPU.
    pub brand: String,
}

impl CpuInfo {
    pub fn new(brand: &str) -> Self {
        Self {
            brand: brand.to_string(),
        }
    }

    pub fn is_intel(&self) -> bool {
        self.brand.to_ascii_lowercase().contains("intel")
    }

    /// Core generation, from an `Nth Gen` prefix or an `iX-NNNNN` model number.
    pub fn generation(&self) -> Option<u32> {
        let lower = self.brand.to_ascii_lowercase();

        if let Some(idx) = lower.find("th gen") {
            let digits: String = lower[..idx]
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            if let Ok(gen) = digits.parse() {
                return Some(gen);
            }
        }

        // i7-12700K -> 12, i9-9900K -> 9
        for tier in ["i3-", "i5-", "i7-", "i9-"] {
            if let Some(idx) = lower.find(tier) {
                let model: String = lower[idx + tier.len()..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                return match model.len() {
                    5 => model[..2].parse().ok(),
                    4 => model[..1].parse().ok(),
                    _ => None,
                };
            }
        }
        None
    }

    /// Intel Core/Pentium/Celeron from 8th gen onwards.
    ///
    /// A bare `Intel(R) Core(TM) iN-` brand is not enough on its own: the
    /// generation must also be known and at least 8, so a Haswell
    /// `i7-4790K` does not get the SSDT-PLUG-ALT/AWAC tables.
    pub fn is_modern_intel_desktop(&self) -> bool {
        let lower = self.brand.to_ascii_lowercase();
        let family = ["core", "pentium", "celeron"].iter().any(|f| lower.contains(f));
        self.is_intel() && family && self.generation().is_some_and(|g| g >= 8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciDevice {
    pub name: String,
    #[serde(with = "hex_id")]
    pub vendor_id: u16,
    #[serde(with = "hex_id")]
    pub device_id: u16,
}

impl PciDevice {
    pub fn new(name: &str, vendor_id: u16, device_id: u16) -> Self {
        Self {
            name: name.to_string(),
            vendor_id,
            device_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub name: String,
    /// Codec vendor.
    #[serde(with = "hex_id")]
    pub vendor_id: u16,
    #[serde(with = "hex_id")]
    pub device_id: u16,
    #[serde(default = "default_layout_id")]
    pub layout_id: u32,
}

fn default_layout_id() -> u32 {
    DEFAULT_LAYOUT_ID
}

mod hex_id {
    use super::*;

    pub fn serialize<S: Serializer>(id: &u16, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:04X}", id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u16, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u16),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(s) => {
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                u16::from_str_radix(digits, 16)
                    .map_err(|_| serde::de::Error::custom(format!("invalid PCI id: {:?}", s)))
            }
        }
    }
}

/// Names of the built-in profiles.
pub const BUILTIN_PROFILES: &[&str] = &["alder-lake-desktop", "coffee-lake-desktop", "generic"];

pub fn builtin(name: &str) -> Option<HardwareProfile> {
    let profile = match name {
        "alder-lake-desktop" => HardwareProfile {
            name: name.to_string(),
            description: "12th gen Intel desktop, UHD 770 iGPU, GTX 970, ALC897, RTL8111".to_string(),
            smbios: "iMac20,2".to_string(),
            cpu: CpuInfo::new("12th Gen Intel(R) Core(TM) i7-12700K"),
            gpus: vec![
                PciDevice::new("Intel(R) UHD Graphics 770", VENDOR_INTEL, 0x4680),
                PciDevice::new("NVIDIA GeForce GTX 970", VENDOR_NVIDIA, 0x13C2),
            ],
            audio: vec![AudioDevice {
                name: "Realtek High Definition Audio".to_string(),
                vendor_id: VENDOR_REALTEK,
                device_id: 0x0897,
                layout_id: DEFAULT_LAYOUT_ID,
            }],
            ethernet: vec![PciDevice::new(
                "Realtek PCIe GbE Family Controller",
                VENDOR_REALTEK,
                0x8168,
            )],
            boot_args: Vec::new(),
            overrides: None,
        },
        "coffee-lake-desktop" => HardwareProfile {
            name: name.to_string(),
            description: "9th gen Intel desktop, AMD dGPU, Intel I219-V".to_string(),
            smbios: "iMac19,1".to_string(),
            cpu: CpuInfo::new("Intel(R) Core(TM) i9-9900K CPU @ 3.60GHz"),
            gpus: vec![PciDevice::new("AMD Radeon RX 580", VENDOR_AMD, 0x67DF)],
            audio: Vec::new(),
            ethernet: vec![PciDevice::new(
                "Intel(R) Ethernet Connection I219-V",
                VENDOR_INTEL,
                0x15B8,
            )],
            boot_args: Vec::new(),
            overrides: None,
        },
        "generic" => HardwareProfile {
            name: name.to_string(),
            description: "Minimal config, no device-specific patches".to_string(),
            smbios: "iMacPro1,1".to_string(),
            cpu: CpuInfo::new("Unknown"),
            gpus: Vec::new(),
            audio: Vec::new(),
            ethernet: Vec::new(),
            boot_args: Vec::new(),
            overrides: None,
        },
        _ => return None,
    };
    Some(profile)
}

/// Load a profile from a JSON file.
pub fn load_file(path: &Path) -> Result<HardwareProfile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    let profile: HardwareProfile = serde_json::from_str(&text)
        .with_context(|| format!("Invalid profile {}", path.display()))?;
    if profile.smbios.trim().is_empty() {
        bail!("Profile {} has an empty smbios model", path.display());
    }
    Ok(profile)
}

/// Resolve a built-in name or a path to a JSON profile.
pub fn resolve(name_or_path: &str) -> Result<HardwareProfile> {
    if let Some(profile) = builtin(name_or_path) {
        return Ok(profile);
    }
    let path = Path::new(name_or_path);
    if path.is_file() {
        return load_file(path);
    }
    bail!(
        "Unknown profile '{}'. Built-in profiles: {}",
        name_or_path,
        BUILTIN_PROFILES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generation_from_brand() {
        let cases = [
            ("12th Gen Intel(R) Core(TM) i7-12700K", Some(12)),
            ("13th Gen Intel(R) Core(TM) i5-13600K", Some(13)),
            ("Intel(R) Core(TM) i9-9900K CPU @ 3.60GHz", Some(9)),
            ("Intel(R) Core(TM) i7-10700 CPU @ 2.90GHz", Some(10)),
            ("AMD Ryzen 7 5800X 8-Core Processor", None),
            ("Unknown", None),
        ];
        for (brand, expected) in cases {
            assert_eq!(CpuInfo::new(brand).generation(), expected, "{}", brand);
        }
    }

    #[test]
    fn test_modern_intel_desktop() {
        assert!(CpuInfo::new("12th Gen Intel(R) Core(TM) i7-12700K").is_modern_intel_desktop());
        assert!(!CpuInfo::new("Intel(R) Core(TM) i7-4790K CPU @ 4.00GHz").is_modern_intel_desktop());
        assert!(!CpuInfo::new("AMD Ryzen 9 7950X").is_modern_intel_desktop());
    }

    #[test]
    fn test_core_brand_prefix_needs_known_generation() {
        assert!(CpuInfo::new("Intel(R) Core(TM) i5-9600K CPU @ 3.70GHz").is_modern_intel_desktop());
        assert!(!CpuInfo::new("Intel(R) Core(TM) i5-2500K CPU @ 3.30GHz").is_modern_intel_desktop());
        assert!(!CpuInfo::new("Intel(R) Core(TM) i7 CPU 920 @ 2.67GHz").is_modern_intel_desktop());
    }

    #[test]
    fn test_builtins_resolve() {
        for name in BUILTIN_PROFILES {
            let profile = builtin(name).unwrap();
            assert_eq!(profile.name, *name);
            assert!(!profile.smbios.is_empty());
        }
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_load_json_profile_with_hex_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rig.json");
        fs::write(
            &path,
            r#"{
                "name": "rig",
                "smbios": "iMac20,1",
                "cpu": {"brand": "Intel(R) Core(TM) i5-10400"},
                "gpus": [{"name": "UHD 630", "vendor_id": "0x8086", "device_id": "9BC8"}],
                "audio": [{"name": "ALC892", "vendor_id": "10ec", "device_id": 2194}],
                "overrides": {"Misc": {"Boot": {"Timeout": 5}}}
            }"#,
        )
        .unwrap();

        let profile = resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(profile.gpus[0].vendor_id, VENDOR_INTEL);
        assert_eq!(profile.gpus[0].device_id, 0x9BC8);
        assert_eq!(profile.audio[0].vendor_id, VENDOR_REALTEK);
        assert_eq!(profile.audio[0].layout_id, DEFAULT_LAYOUT_ID);
        assert!(profile.ethernet.is_empty());
        assert!(profile.overrides.is_some());
    }

    #[test]
    fn test_bad_pci_id_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"name":"bad","smbios":"iMac20,1","cpu":{"brand":"x"},
                "gpus":[{"name":"g","vendor_id":"zzzz","device_id":"1"}]}"#,
        )
        .unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn test_unknown_profile_lists_builtins() {
        let err = resolve("no-such-profile").unwrap_err();
        assert!(err.to_string().contains("alder-lake-desktop"));
    }
}
