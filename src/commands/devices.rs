//! Devices command - lists block devices.

use anyhow::{bail, Result};

use efistage::disk::{self, BlockDevice};

fn print_device(device: &BlockDevice) {
    let removable = if device.removable { "removable" } else { "fixed" };
    let name = if device.display_name.is_empty() {
        "(unknown model)"
    } else {
        device.display_name.as_str()
    };
    println!(
        "  {:10} {:7} {:>10}  {:5} {:9}  {}",
        device.id,
        device.dev_number,
        device.size_human(),
        device.bus_type,
        removable,
        name
    );
    if device.is_mounted() {
        println!("  {:18} mounted: {}", "", device.mount_points.join(", "));
    }
}

/// Execute the devices command.
pub fn cmd_devices(all: bool) -> Result<()> {
    let devices = disk::list_devices()?;

    let shown: Vec<&BlockDevice> = if all {
        devices.iter().collect()
    } else {
        disk::candidate_devices(&devices)
    };

    if shown.is_empty() {
        bail!("No eligible target device found. Plug in a USB drive and try again.");
    }

    println!("Block devices{}:", if all { "" } else { " eligible for provisioning" });
    for device in shown {
        print_device(device);
    }
    Ok(())
}
