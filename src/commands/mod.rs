//! CLI command handlers.
//!
//! Each submodule handles one CLI command:
//! - `devices` - List candidate target devices
//! - `provision` - Erase and partition a device
//! - `fetch` - Download and expand kexts into the cache
//! - `config` - Generate config.plist for a profile
//! - `verify` - Check a config.plist and its staged kexts
//! - `build` - Everything above in one run
//! - `preflight` - Run preflight checks
//! - `show` - Display information

pub mod build;
pub mod config;
mod devices;
pub mod fetch;
mod preflight;
pub mod provision;
pub mod show;
mod verify;

pub use build::cmd_build;
pub use config::cmd_config;
pub use devices::cmd_devices;
pub use fetch::cmd_fetch;
pub use preflight::cmd_preflight;
pub use provision::cmd_provision;
pub use show::cmd_show;
pub use verify::cmd_verify;
