//! OpenCore `config.plist` generation from a hardware profile.

pub mod builder;
pub mod kexts;
pub mod parts;
pub mod profile;

pub use builder::{build_config, render, required_kexts};
pub use kexts::{referenced_bundles, required_assets};
pub use parts::{APPLE_BOOT_GUID, APPLE_VENDOR_GUID};
pub use profile::{HardwareProfile, BUILTIN_PROFILES};
