//! Provision command - erases a device and lays out the installer partitions.

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};

use efistage::config::Config;
use efistage::disk::{
    self, BlockDevice, Confirmation, PartitionPlan, ProvisionReport, ProvisionState, SystemDiskOps,
};

/// How the operator confirms the erase.
#[derive(Debug, Clone, Default)]
pub struct ConfirmArgs {
    /// Skip the yes/no prompt.
    pub yes: bool,
    /// `major:minor` device number given up front instead of typed at the prompt.
    pub confirm_id: Option<String>,
}

/// Look up `wanted` among the host's disks.
pub fn select_device<'a>(devices: &'a [BlockDevice], wanted: &str) -> Result<&'a BlockDevice> {
    match disk::find_device(devices, wanted) {
        Some(device) => Ok(device),
        None => {
            let names: Vec<&str> = disk::candidate_devices(devices)
                .iter()
                .map(|d| d.id.as_str())
                .collect();
            if names.is_empty() {
                bail!("Device '{}' not found and no eligible target device is present", wanted);
            }
            bail!("Device '{}' not found. Eligible devices: {}", wanted, names.join(", "))
        }
    }
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read confirmation from stdin")?;
    Ok(line.trim().to_string())
}

/// Collect the operator's confirmation, prompting for whatever was not given
/// on the command line.
pub fn ask_confirmation(device: &BlockDevice, args: &ConfirmArgs) -> Result<Confirmation> {
    println!();
    println!("  WARNING: everything on {} will be destroyed.", device.path.display());
    println!(
        "  {} {} ({}, {})",
        device.id,
        device.display_name,
        device.size_human(),
        if device.removable { "removable" } else { "NOT removable" }
    );
    println!();

    let accepted = args.yes || prompt("  Type 'yes' to continue: ")?.eq_ignore_ascii_case("yes");
    if !accepted {
        return Ok(Confirmation::declined());
    }
    if device.removable {
        return Ok(Confirmation::accepted());
    }

    let typed = match &args.confirm_id {
        Some(id) => id.clone(),
        None => prompt(&format!(
            "  {} is not removable. Type its device number (MAJ:MIN, {}) to confirm: ",
            device.path.display(),
            device.dev_number
        ))?,
    };
    Ok(Confirmation::accepted_with_identifier(typed))
}

pub fn print_report(report: &ProvisionReport<'_>) {
    println!("Provisioning {}:", report.device.path.display());
    for state in &report.visited {
        match state {
            ProvisionState::Aborted { stage, cause } => {
                println!("  ✗ aborted at {}: {}", stage, cause)
            }
            other => println!("  ✓ {:?}", other),
        }
    }
    for part in &report.partitions {
        println!(
            "  partition {}: {} {} {}",
            part.number,
            part.node.display(),
            part.filesystem,
            part.label
        );
    }
}

/// Execute the provision command.
pub fn cmd_provision(config: &Config, wanted: &str, args: &ConfirmArgs) -> Result<()> {
    let devices = disk::list_devices()?;
    let device = select_device(&devices, wanted)?;
    let confirmation = ask_confirmation(device, args)?;

    let plan = PartitionPlan::installer();
    let mut ops = SystemDiskOps;
    let report = disk::provision(device, &plan, &confirmation, &mut ops, config.ready_timeout)?;

    print_report(&report);
    if let Some(err) = &report.failure {
        bail!("Provisioning failed: {}", err);
    }
    println!("\nDevice ready.");
    Ok(())
}
