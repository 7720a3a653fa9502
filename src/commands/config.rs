//! Config command - generates config.plist for a hardware profile.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use efistage::cache;
use efistage::config::Config;
use efistage::opencore::{self, profile, HardwareProfile};
use efistage::serial::{self, IdentitySource, PlatformIdentity};

/// Generate a fresh identity and render the config for `profile`.
pub fn generate(config: &Config, profile: &HardwareProfile) -> Result<(String, PlatformIdentity)> {
    let identity = serial::generate(&profile.smbios, &config.macserial_path);
    match identity.source {
        IdentitySource::Generated => {}
        IdentitySource::UtilityMissing => println!(
            "  Warning: {} not found, writing placeholder serials",
            config.macserial_path.display()
        ),
        IdentitySource::UtilityError => {
            println!("  Warning: macserial output was unusable, writing placeholder serials")
        }
    }

    let xml = opencore::render(profile, &identity, Utc::now())
        .with_context(|| format!("Failed to serialize config for profile '{}'", profile.name))?;
    Ok((xml, identity))
}

/// Default location of the generated config.
pub fn default_output(config: &Config) -> PathBuf {
    cache::output_dir(&config.cache_dir).join("config.plist")
}

/// Execute the config command. Returns where the file was written.
pub fn cmd_config(config: &Config, profile_name: &str, output: Option<&Path>) -> Result<PathBuf> {
    let profile = profile::resolve(profile_name)?;
    println!("Generating config.plist for '{}' ({})...", profile.name, profile.smbios);

    let (xml, identity) = generate(config, &profile)?;

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(config));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, &xml).with_context(|| format!("Failed to write {}", path.display()))?;

    println!("  SystemSerialNumber: {}", identity.serial_number);
    println!("  MLB:                {}", identity.board_serial);
    println!("  SystemUUID:         {}", identity.system_uuid);
    println!("  Written: {} ({} bytes)", path.display(), xml.len());
    Ok(path)
}
