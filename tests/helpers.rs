//! Shared test utilities for efistage tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use tempfile::TempDir;

use efistage::disk::{BlockDevice, DiskOps, PartitionSpec};
use efistage::process::Cmd;

/// Test environment with a temporary cache and EFI root.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Cache root (downloads/, extracted/, output/)
    pub cache: PathBuf,
    /// Destination EFI root
    pub efi_root: PathBuf,
    /// Scratch area for building fixture archives
    pub work: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let cache = base.join("cache");
        let efi_root = base.join("efi");
        let work = base.join("work");
        for dir in [&cache, &efi_root, &work] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            cache,
            efi_root,
            work,
        }
    }
}

/// Create `<root>/<rel>` as a minimal kext bundle.
pub fn create_bundle(root: &Path, rel: &str) -> PathBuf {
    let bundle = root.join(rel);
    let contents = bundle.join("Contents");
    fs::create_dir_all(contents.join("MacOS")).expect("Failed to create bundle dirs");
    fs::write(contents.join("Info.plist"), "<plist version=\"1.0\"><dict/></plist>\n")
        .expect("Failed to write Info.plist");
    let exe = Path::new(rel)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    fs::write(contents.join("MacOS").join(exe), b"\xcf\xfa\xed\xfe").expect("Failed to write executable");
    bundle
}

/// Pack the bundles at `rels` into a gzipped tarball and return its bytes.
pub fn bundle_tarball(work: &Path, name: &str, rels: &[&str]) -> Vec<u8> {
    let staging = work.join(format!("{}.src", name));
    for rel in rels {
        create_bundle(&staging, rel);
    }
    let archive = work.join(name);
    Cmd::new("tar")
        .arg("czf")
        .arg_path(&archive)
        .arg("-C")
        .arg_path(&staging)
        .arg(".")
        .run()
        .expect("tar failed");
    fs::read(&archive).expect("Failed to read tarball")
}

/// A 16 GiB device with nothing mounted.
pub fn sample_device(removable: bool) -> BlockDevice {
    BlockDevice {
        id: "sdz".to_string(),
        dev_number: "8:208".to_string(),
        path: PathBuf::from("/dev/sdz"),
        display_name: "Test Flash Drive".to_string(),
        size_bytes: 16 * 1024 * 1024 * 1024,
        bus_type: "usb".to_string(),
        removable,
        mount_points: Vec::new(),
    }
}

/// One recorded call on [`RecordingDiskOps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCall {
    Wipe(String),
    WriteGpt(String),
    Create { number: u32, label: String },
    WaitReady(PathBuf),
    Format { node: PathBuf, label: String },
}

impl DiskCall {
    pub fn name(&self) -> &'static str {
        match self {
            DiskCall::Wipe(_) => "wipe",
            DiskCall::WriteGpt(_) => "gpt",
            DiskCall::Create { .. } => "create",
            DiskCall::WaitReady(_) => "wait",
            DiskCall::Format { .. } => "format",
        }
    }
}

/// [`DiskOps`] double that records every call and can fail the n-th call
/// of a given kind.
#[derive(Debug, Default)]
pub struct RecordingDiskOps {
    pub calls: Vec<DiskCall>,
    fail_on: Option<(&'static str, usize)>,
}

impl RecordingDiskOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` (1-based) call named `op`.
    pub fn failing_at(op: &'static str, nth: usize) -> Self {
        Self {
            calls: Vec::new(),
            fail_on: Some((op, nth)),
        }
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| c.name() == op).count()
    }

    fn record(&mut self, call: DiskCall) -> Result<()> {
        let op = call.name();
        self.calls.push(call);
        if let Some((fail_op, nth)) = self.fail_on {
            if fail_op == op && self.count(op) == nth {
                bail!("simulated {} failure", op);
            }
        }
        Ok(())
    }
}

impl DiskOps for RecordingDiskOps {
    fn wipe_signatures(&mut self, device: &BlockDevice) -> Result<()> {
        self.record(DiskCall::Wipe(device.id.clone()))
    }

    fn write_gpt(&mut self, device: &BlockDevice) -> Result<()> {
        self.record(DiskCall::WriteGpt(device.id.clone()))
    }

    fn create_partition(&mut self, _device: &BlockDevice, number: u32, spec: &PartitionSpec) -> Result<()> {
        self.record(DiskCall::Create {
            number,
            label: spec.label.clone(),
        })
    }

    fn wait_until_ready(&mut self, node: &Path, _timeout: Duration) -> Result<()> {
        self.record(DiskCall::WaitReady(node.to_path_buf()))
    }

    fn format(&mut self, node: &Path, spec: &PartitionSpec) -> Result<()> {
        self.record(DiskCall::Format {
            node: node.to_path_buf(),
            label: spec.label.clone(),
        })
    }
}
