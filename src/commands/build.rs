//! Build command - config, kexts and (optionally) a provisioned device in one run.
//!
//! Steps run in order and degrade instead of stopping where they can: a
//! missing kext is skipped, and a failed provisioning run still leaves a
//! complete EFI tree in the cache directory. Serialization failure is fatal.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use efistage::assets::stage;
use efistage::cache;
use efistage::config::Config;
use efistage::disk::{self, PartitionPlan, SystemDiskOps};
use efistage::opencore::{self, profile};
use efistage::preflight;
use efistage::process::Cmd;

use super::config::generate;
use super::fetch::fetch_specs;
use super::provision::{ask_confirmation, print_report, select_device, ConfirmArgs};
use crate::timing::Timer;

pub struct BuildArgs {
    pub profile: String,
    /// Target device; without one the EFI tree is only assembled locally.
    pub device: Option<String>,
    pub confirm: ConfirmArgs,
    /// Where to assemble the EFI tree when no device is given.
    pub efi_root: Option<PathBuf>,
}

/// Default local EFI root.
pub fn default_efi_root(config: &Config) -> PathBuf {
    cache::output_dir(&config.cache_dir).join("efi")
}

/// Copy bundles and the config into `efi_root`.
fn place(efi_root: &Path, bundles: &[efistage::assets::DiscoveredBundle], xml: &str) -> Result<()> {
    let staged = stage::stage(efi_root, bundles)?;
    let config_path = stage::install_config(efi_root, xml)?;
    println!("  {} bundle(s) -> {}", staged.len(), stage::kexts_dir(efi_root).display());
    println!("  config -> {}", config_path.display());
    Ok(())
}

/// Mount `node` on `mount_point`, run `f`, and unmount even if `f` failed.
fn with_mounted<T>(node: &Path, mount_point: &Path, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    fs::create_dir_all(mount_point)
        .with_context(|| format!("Failed to create {}", mount_point.display()))?;
    Cmd::new("mount")
        .arg_path(node)
        .arg_path(mount_point)
        .error_msg(format!("Failed to mount {}", node.display()))
        .run()?;

    let result = f(mount_point);

    let unmount = Cmd::new("umount")
        .arg_path(mount_point)
        .error_msg(format!("Failed to unmount {}", mount_point.display()))
        .run();
    let value = result?;
    unmount?;
    Ok(value)
}

/// Execute the build command.
pub fn cmd_build(config: &Config, args: &BuildArgs) -> Result<()> {
    println!("=== efistage build ===\n");
    let build_start = Instant::now();

    let profile = profile::resolve(&args.profile)?;

    // confirm before any network work
    let devices = match &args.device {
        Some(_) => {
            preflight::run_preflight_or_fail(config)?;
            disk::list_devices()?
        }
        None => Vec::new(),
    };
    let target = match &args.device {
        Some(wanted) => {
            let device = select_device(&devices, wanted)?;
            let confirmation = ask_confirmation(device, &args.confirm)?;
            disk::check_preconditions(device, &PartitionPlan::installer(), &confirmation)?;
            Some((device, confirmation))
        }
        None => None,
    };

    // 1. Config
    println!("\n1. Generating config.plist for '{}'...", profile.name);
    let t = Timer::start("config");
    let (xml, _identity) = generate(config, &profile)?;
    t.finish();

    // 2. Kexts
    println!("\n2. Fetching kexts...");
    let t = Timer::start("kexts");
    let (specs, unknown) = opencore::required_kexts(&profile)?;
    for bundle in &unknown {
        println!("  Note: {} has no release source; stage it by hand", bundle);
    }
    let outcome = fetch_specs(config, &specs)?;
    let bundles: Vec<_> = outcome.bundles().cloned().collect();
    t.finish();

    // 3. Device
    let mut provision_error = None;
    if let Some((device, confirmation)) = &target {
        println!("\n3. Provisioning {}...", device.path.display());
        let t = Timer::start("provision");
        let mut ops = SystemDiskOps;
        let report = disk::provision(
            device,
            &PartitionPlan::installer(),
            confirmation,
            &mut ops,
            config.ready_timeout,
        )?;
        print_report(&report);
        t.finish();

        match (&report.failure, report.efi_partition()) {
            (None, Some(efi)) => {
                println!("\n4. Installing onto {}...", efi.node.display());
                let mount_point = config.cache_dir.join("mnt").join("efi");
                with_mounted(&efi.node, &mount_point, |root| place(root, &bundles, &xml))?;
            }
            (Some(err), _) => provision_error = Some(err.to_string()),
            (None, None) => provision_error = Some("no EFI partition was created".to_string()),
        }
    }

    // Without a device, or when provisioning failed, leave the tree in the cache.
    if target.is_none() || provision_error.is_some() {
        let efi_root = args.efi_root.clone().unwrap_or_else(|| default_efi_root(config));
        println!("\n{}. Assembling EFI tree locally...", if target.is_some() { 4 } else { 3 });
        place(&efi_root, &bundles, &xml)?;
    }

    println!(
        "\n=== Done in {} ===",
        crate::timing::format_elapsed(build_start.elapsed())
    );
    if !outcome.all_succeeded() {
        println!("{} kext(s) could not be fetched; see above.", outcome.failures.len());
    }
    if let Some(err) = provision_error {
        bail!("Provisioning failed: {}", err);
    }
    Ok(())
}
