//! efistage library: provision a removable disk into an OpenCore EFI layout.
//!
//! The binary in `main.rs` is a thin shell over these modules; integration
//! tests in `tests/` drive them directly.

pub mod assets;
pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod opencore;
pub mod plist;
pub mod preflight;
pub mod process;
pub mod serial;

pub use config::Config;
pub use error::{
    ArchiveError, AssetError, DiscoveryError, DownloadError, ProvisionError, ResolveError,
    SerializeError, UtilityError,
};
