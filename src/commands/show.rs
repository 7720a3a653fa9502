//! Show command - displays information.

use anyhow::Result;

use efistage::assets::CATALOG;
use efistage::config::Config;
use efistage::opencore::profile::{self, BUILTIN_PROFILES};

/// Show target for the show command.
pub enum ShowTarget {
    /// Built-in hardware profiles
    Profiles,
    /// Effective configuration
    Config,
    /// Kext release catalog
    Kexts,
}

fn show_profiles() {
    println!("Built-in profiles:");
    for name in BUILTIN_PROFILES {
        if let Some(p) = profile::builtin(name) {
            println!("  {:22} {:12} {}", p.name, p.smbios, p.description);
        }
    }
    println!("\nA path to a JSON file with the same fields is accepted wherever a profile name is.");
}

fn show_kexts() {
    println!("Kext catalog:");
    for spec in CATALOG {
        let fallback = spec
            .fallback_pattern
            .map(|f| format!(" (fallback {})", f))
            .unwrap_or_default();
        println!("  {:20} {:35} {}{}", spec.name, spec.repo, spec.pattern, fallback);
        if spec.is_multi_plugin() {
            println!("  {:20} plugins: {}", "", spec.plugins.join(", "));
        }
    }
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Profiles => show_profiles(),
        ShowTarget::Config => config.print(),
        ShowTarget::Kexts => show_kexts(),
    }
    Ok(())
}
