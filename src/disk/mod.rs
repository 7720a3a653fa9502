//! Target device discovery and destructive provisioning.

pub mod device;
pub mod ops;
pub mod plan;
pub mod provision;
pub mod ready;

pub use device::{candidate_devices, find_device, list_devices, parse_lsblk, BlockDevice};
pub use ops::{DiskOps, SystemDiskOps};
pub use plan::{Filesystem, PartitionPlan, PartitionSize, PartitionSpec};
pub use provision::{
    check_preconditions, provision, Confirmation, ProvisionReport, ProvisionStage, ProvisionState,
    ProvisionedPartition,
};
pub use ready::wait_until_ready;
