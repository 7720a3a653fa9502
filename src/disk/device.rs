//! Block device enumeration from `lsblk --json --bytes`.

use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::process::Cmd;

/// Mount points that mark a device as backing the running system.
pub const SYSTEM_MOUNTS: &[&str] = &["/", "/boot", "/boot/efi", "[SWAP]"];

/// Columns requested from lsblk. `MOUNTPOINT` (singular) exists on every
/// util-linux release; newer ones also emit `mountpoints`.
const LSBLK_COLUMNS: &str = "NAME,MAJ:MIN,PATH,MODEL,SIZE,TRAN,RM,TYPE,MOUNTPOINT";

/// A whole-disk block device as seen at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Kernel name (`sdb`, `nvme0n1`).
    pub id: String,
    /// Kernel `major:minor` device number (`8:16`). This is the numeric
    /// identifier an operator re-types to confirm wiping a non-removable disk.
    pub dev_number: String,
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub bus_type: String,
    pub removable: bool,
    /// Mount points of the disk and all of its partitions.
    pub mount_points: Vec<String>,
}

impl BlockDevice {
    /// Device node of partition `number`.
    ///
    /// Kernel names ending in a digit (`nvme0n1`, `mmcblk0`, `loop0`) take a
    /// `p` separator.
    pub fn partition_path(&self, number: u32) -> PathBuf {
        let base = self.path.to_string_lossy();
        if base.ends_with(|c: char| c.is_ascii_digit()) {
            PathBuf::from(format!("{}p{}", base, number))
        } else {
            PathBuf::from(format!("{}{}", base, number))
        }
    }

    /// System mount points backed by this device.
    pub fn system_mounts(&self) -> Vec<&str> {
        self.mount_points
            .iter()
            .map(String::as_str)
            .filter(|m| SYSTEM_MOUNTS.contains(m))
            .collect()
    }

    pub fn backs_system(&self) -> bool {
        !self.system_mounts().is_empty()
    }

    pub fn is_mounted(&self) -> bool {
        !self.mount_points.is_empty()
    }

    pub fn size_human(&self) -> String {
        human_size(self.size_bytes)
    }
}

/// Binary-unit size, one decimal.
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkNode>,
}

#[derive(Debug, Deserialize)]
struct LsblkNode {
    name: String,
    #[serde(rename = "maj:min", default)]
    maj_min: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    rm: Option<Value>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    mountpoints: Option<Vec<Option<String>>>,
    #[serde(default)]
    children: Vec<LsblkNode>,
}

impl LsblkNode {
    fn collect_mounts(&self, out: &mut Vec<String>) {
        let mut push = |m: &str| {
            if !m.is_empty() && !out.iter().any(|existing| existing == m) {
                out.push(m.to_string());
            }
        };
        if let Some(ref m) = self.mountpoint {
            push(m);
        }
        for m in self.mountpoints.iter().flatten().flatten() {
            push(m);
        }
        for child in &self.children {
            child.collect_mounts(out);
        }
    }
}

/// Parse lsblk JSON into whole-disk devices.
///
/// Handles both the old string encoding (`"rm": "1"`, `"size": "123"`) and
/// the newer typed one (`"rm": true`, `"size": 123`).
pub fn parse_lsblk(json: &str) -> Result<Vec<BlockDevice>, serde_json::Error> {
    let output: LsblkOutput = serde_json::from_str(json)?;

    Ok(output
        .blockdevices
        .into_iter()
        .filter(|node| node.kind.as_deref().unwrap_or("disk") == "disk")
        .map(|node| {
            let mut mount_points = Vec::new();
            node.collect_mounts(&mut mount_points);
            BlockDevice {
                path: node
                    .path
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(format!("/dev/{}", node.name))),
                display_name: node
                    .model
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or("(unknown model)")
                    .to_string(),
                size_bytes: node.size.as_ref().and_then(value_as_u64).unwrap_or(0),
                bus_type: node.tran.clone().unwrap_or_default(),
                removable: node.rm.as_ref().map(value_as_bool).unwrap_or(false),
                mount_points,
                dev_number: node.maj_min.as_deref().map(str::trim).unwrap_or_default().to_string(),
                id: node.name,
            }
        })
        .collect())
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_u64() == Some(1),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

/// Enumerate whole disks on this host.
pub fn list_devices() -> anyhow::Result<Vec<BlockDevice>> {
    let result = Cmd::new("lsblk")
        .args(["--json", "--bytes", "--output", LSBLK_COLUMNS])
        .error_msg("lsblk failed to enumerate block devices")
        .run()?;
    Ok(parse_lsblk(&result.stdout)?)
}

/// Devices that may be offered as provisioning targets: non-empty and not
/// backing the running system. Removable devices sort first.
pub fn candidate_devices(devices: &[BlockDevice]) -> Vec<&BlockDevice> {
    let mut candidates: Vec<&BlockDevice> = devices
        .iter()
        .filter(|d| d.size_bytes > 0 && !d.backs_system())
        .collect();
    candidates.sort_by_key(|d| !d.removable);
    candidates
}

/// Find a device by kernel name or node path.
pub fn find_device<'a>(devices: &'a [BlockDevice], wanted: &str) -> Option<&'a BlockDevice> {
    let name = wanted.strip_prefix("/dev/").unwrap_or(wanted);
    devices.iter().find(|d| d.id == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: &str = r#"{
       "blockdevices": [
          {"name":"nvme0n1", "maj:min":"259:0", "path":"/dev/nvme0n1", "model":"Samsung SSD 980", "size":1000204886016,
           "tran":"nvme", "rm":false, "type":"disk", "mountpoint":null, "mountpoints":[null],
           "children": [
              {"name":"nvme0n1p1", "path":"/dev/nvme0n1p1", "model":null, "size":536870912,
               "tran":"nvme", "rm":false, "type":"part", "mountpoint":"/boot/efi", "mountpoints":["/boot/efi"]},
              {"name":"nvme0n1p2", "path":"/dev/nvme0n1p2", "model":null, "size":999666991104,
               "tran":"nvme", "rm":false, "type":"part", "mountpoint":"/", "mountpoints":["/"]}
           ]},
          {"name":"sdb", "maj:min":"8:16", "path":"/dev/sdb", "model":"SanDisk Ultra  ", "size":15938355200,
           "tran":"usb", "rm":true, "type":"disk", "mountpoint":null, "mountpoints":[null]},
          {"name":"sr0", "path":"/dev/sr0", "model":"DVD", "size":1073741312,
           "tran":"sata", "rm":true, "type":"rom", "mountpoint":null}
       ]
    }"#;

    const LEGACY: &str = r#"{
       "blockdevices": [
          {"name":"sdc", "maj:min":" 8:32", "model":"External HDD", "size":"500107862016", "tran":"usb", "rm":"0",
           "type":"disk", "mountpoint":null,
           "children": [
              {"name":"sdc1", "model":null, "size":"500106813440", "tran":null, "rm":"0",
               "type":"part", "mountpoint":"/media/backup"}
           ]}
       ]
    }"#;

    #[test]
    fn test_parse_modern_lsblk() {
        let devices = parse_lsblk(MODERN).unwrap();
        assert_eq!(devices.len(), 2, "rom drives are skipped");

        let nvme = &devices[0];
        assert_eq!(nvme.id, "nvme0n1");
        assert_eq!(nvme.dev_number, "259:0");
        assert!(!nvme.removable);
        assert_eq!(nvme.mount_points, ["/boot/efi", "/"]);
        assert!(nvme.backs_system());

        let usb = &devices[1];
        assert_eq!(usb.display_name, "SanDisk Ultra");
        assert_eq!(usb.size_bytes, 15_938_355_200);
        assert_eq!(usb.bus_type, "usb");
        assert_eq!(usb.dev_number, "8:16");
        assert!(usb.removable);
        assert!(!usb.is_mounted());
    }

    #[test]
    fn test_parse_legacy_string_encoding() {
        let devices = parse_lsblk(LEGACY).unwrap();
        let sdc = &devices[0];
        assert_eq!(sdc.path, PathBuf::from("/dev/sdc"));
        assert_eq!(sdc.dev_number, "8:32");
        assert_eq!(sdc.size_bytes, 500_107_862_016);
        assert!(!sdc.removable);
        assert_eq!(sdc.mount_points, ["/media/backup"]);
        assert!(!sdc.backs_system());
    }

    #[test]
    fn test_partition_paths() {
        let devices = parse_lsblk(MODERN).unwrap();
        assert_eq!(devices[0].partition_path(1), PathBuf::from("/dev/nvme0n1p1"));
        assert_eq!(devices[1].partition_path(2), PathBuf::from("/dev/sdb2"));
    }

    #[test]
    fn test_candidates_exclude_system_disk() {
        let devices = parse_lsblk(MODERN).unwrap();
        let candidates = candidate_devices(&devices);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "sdb");
    }

    #[test]
    fn test_find_device_by_name_or_path() {
        let devices = parse_lsblk(MODERN).unwrap();
        assert_eq!(find_device(&devices, "/dev/sdb").map(|d| d.id.as_str()), Some("sdb"));
        assert_eq!(find_device(&devices, "sdb").map(|d| d.id.as_str()), Some("sdb"));
        assert!(find_device(&devices, "sdz").is_none());
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(536_870_912), "512.0 MiB");
        assert_eq!(human_size(16 * 1024 * 1024 * 1024), "16.0 GiB");
    }
}
