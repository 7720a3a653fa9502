//! Disk mutation primitives.
//!
//! [`DiskOps`] is the seam between the provisioning state machine and the host
//! tools. Each method performs exactly one attempt.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use super::device::BlockDevice;
use super::plan::{Filesystem, PartitionSpec};
use super::ready;
use crate::process::Cmd;

pub trait DiskOps {
    /// Remove every filesystem, RAID and partition-table signature.
    fn wipe_signatures(&mut self, device: &BlockDevice) -> Result<()>;

    /// Destroy any GPT/MBR structures and write a fresh, empty GPT.
    fn write_gpt(&mut self, device: &BlockDevice) -> Result<()>;

    fn create_partition(&mut self, device: &BlockDevice, number: u32, spec: &PartitionSpec) -> Result<()>;

    /// Block until `node` is usable or `timeout` passes.
    fn wait_until_ready(&mut self, node: &Path, timeout: Duration) -> Result<()>;

    fn format(&mut self, node: &Path, spec: &PartitionSpec) -> Result<()>;
}

/// Real implementation backed by util-linux, gdisk, dosfstools and exfatprogs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDiskOps;

/// Host tools [`SystemDiskOps`] needs.
pub const REQUIRED_TOOLS: &[&str] = &["lsblk", "wipefs", "sgdisk", "mkfs.vfat", "mkfs.exfat"];

impl DiskOps for SystemDiskOps {
    fn wipe_signatures(&mut self, device: &BlockDevice) -> Result<()> {
        Cmd::new("wipefs")
            .arg("--all")
            .arg_path(&device.path)
            .error_msg(format!("wipefs could not clear {}", device.path.display()))
            .run()?;
        Ok(())
    }

    fn write_gpt(&mut self, device: &BlockDevice) -> Result<()> {
        Cmd::new("sgdisk")
            .arg("--zap-all")
            .arg_path(&device.path)
            .error_msg(format!("sgdisk --zap-all failed on {}", device.path.display()))
            .run()?;
        Cmd::new("sgdisk")
            .arg("--clear")
            .arg_path(&device.path)
            .error_msg(format!("sgdisk --clear failed on {}", device.path.display()))
            .run()?;
        Ok(())
    }

    fn create_partition(&mut self, device: &BlockDevice, number: u32, spec: &PartitionSpec) -> Result<()> {
        Cmd::new("sgdisk")
            .args(["--new", &spec.sgdisk_new_arg(number)])
            .args(["--typecode", &format!("{}:{}", number, spec.type_code)])
            .args(["--change-name", &format!("{}:{}", number, spec.label)])
            .arg_path(&device.path)
            .error_msg(format!(
                "sgdisk could not create partition {} on {}",
                number,
                device.path.display()
            ))
            .run()?;
        Ok(())
    }

    fn wait_until_ready(&mut self, node: &Path, timeout: Duration) -> Result<()> {
        ready::wait_until_ready(node, timeout)
    }

    fn format(&mut self, node: &Path, spec: &PartitionSpec) -> Result<()> {
        let cmd = match spec.filesystem {
            Filesystem::Fat32 => Cmd::new("mkfs.vfat").args(["-F", "32", "-n", &spec.label]),
            Filesystem::ExFat => Cmd::new("mkfs.exfat").args(["-L", &spec.label]),
        };
        cmd.arg_path(node)
            .error_msg(format!("formatting {} as {} failed", node.display(), spec.filesystem))
            .run()?;
        Ok(())
    }
}
