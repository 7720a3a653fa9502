//! efistage - OpenCore installer media builder.
//!
//! Turns a blank removable disk plus kexts fetched from GitHub releases into
//! a bootable EFI layout with a generated config.plist:
//! - GPT with a 512 MiB FAT32 `EFI` partition and an exFAT data partition
//! - `EFI/OC/Kexts/*.kext` from the latest upstream releases
//! - `EFI/OC/config.plist` built from a hardware profile

mod commands;
mod timing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use efistage::config::Config;

use commands::build::BuildArgs;
use commands::fetch::FetchSelection;
use commands::provision::ConfirmArgs;

#[derive(Parser)]
#[command(name = "efistage")]
#[command(about = "OpenCore installer media builder")]
#[command(
    after_help = "QUICK START:\n  efistage preflight                     Check host tools\n  efistage devices                       List target devices\n  efistage build --profile generic       Assemble an EFI tree in the cache\n  efistage build --profile generic --device sdb   Write it to a USB drive"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfirmFlags {
    /// Do not ask before erasing a removable device
    #[arg(long)]
    yes: bool,

    /// Device number (MAJ:MIN), required to erase a non-removable device without a prompt
    #[arg(long, value_name = "MAJ:MIN")]
    confirm_device: Option<String>,
}

impl From<ConfirmFlags> for ConfirmArgs {
    fn from(flags: ConfirmFlags) -> Self {
        ConfirmArgs {
            yes: flags.yes,
            confirm_id: flags.confirm_device,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List devices that can be provisioned
    Devices {
        /// Include devices backing the running system
        #[arg(long)]
        all: bool,
    },

    /// Erase a device and create the EFI and data partitions
    Provision {
        /// Device name or node (sdb, /dev/sdb)
        device: String,

        #[command(flatten)]
        confirm: ConfirmFlags,
    },

    /// Download and expand kext releases into the cache
    Fetch {
        /// Kexts to fetch (default: the whole catalog)
        kexts: Vec<String>,

        /// Fetch what this profile's config loads
        #[arg(long, conflicts_with = "kexts")]
        profile: Option<String>,

        /// Copy the bundles into this EFI root
        #[arg(long, value_name = "DIR")]
        stage: Option<PathBuf>,
    },

    /// Generate config.plist for a hardware profile
    Config {
        /// Built-in profile name or path to a JSON profile
        #[arg(short, long, default_value = "generic")]
        profile: String,

        /// Output file (default: <cache>/output/config.plist)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a config.plist or an EFI root
    Verify {
        /// config.plist, or a directory containing EFI/OC/config.plist
        path: PathBuf,
    },

    /// Generate config, fetch kexts and optionally write a device
    Build {
        /// Built-in profile name or path to a JSON profile
        #[arg(short, long, default_value = "generic")]
        profile: String,

        /// Device to provision and install onto
        #[arg(long)]
        device: Option<String>,

        /// Local EFI root when no device is given (default: <cache>/output/efi)
        #[arg(long, value_name = "DIR")]
        efi_root: Option<PathBuf>,

        #[command(flatten)]
        confirm: ConfirmFlags,
    },

    /// Run preflight checks (host tools, permissions, cache)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// List built-in hardware profiles
    Profiles,
    /// Show current configuration
    Config,
    /// List the kext release catalog
    Kexts,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Devices { all } => {
            commands::cmd_devices(all)?;
        }

        Commands::Provision { device, confirm } => {
            commands::cmd_provision(&config, &device, &confirm.into())?;
        }

        Commands::Fetch {
            kexts,
            profile,
            stage,
        } => {
            let selection = match profile {
                Some(profile) => FetchSelection::Profile(profile),
                None if kexts.is_empty() => FetchSelection::All,
                None => FetchSelection::Names(kexts),
            };
            commands::cmd_fetch(&config, selection, stage.as_deref())?;
        }

        Commands::Config { profile, output } => {
            commands::cmd_config(&config, &profile, output.as_deref())?;
        }

        Commands::Verify { path } => {
            commands::cmd_verify(&path)?;
        }

        Commands::Build {
            profile,
            device,
            efi_root,
            confirm,
        } => {
            let args = BuildArgs {
                profile,
                device,
                confirm: confirm.into(),
                efi_root,
            };
            commands::cmd_build(&config, &args)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Profiles => commands::show::ShowTarget::Profiles,
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Kexts => commands::show::ShowTarget::Kexts,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
