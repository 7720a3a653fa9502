//! Destructive provisioning of a target device.
//!
//! The run is a straight line of states:
//!
//! ```text
//! Unconfirmed -> Cleared -> InitializedGpt -> EfiPartitionReady
//!             -> DataPartitionReady -> Done
//! ```
//!
//! Any failed step ends the run in `Aborted(stage, cause)`. Nothing is rolled
//! back and no step is retried; the report says how far the run got.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use super::device::BlockDevice;
use super::ops::DiskOps;
use super::plan::{Filesystem, PartitionPlan};
use crate::error::ProvisionError;

/// A step of the run, named after the state it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Cleared,
    InitializedGpt,
    EfiPartitionReady,
    DataPartitionReady,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStage::Cleared => "signature wipe",
            ProvisionStage::InitializedGpt => "GPT initialization",
            ProvisionStage::EfiPartitionReady => "EFI partition",
            ProvisionStage::DataPartitionReady => "data partition",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionState {
    Unconfirmed,
    Cleared,
    InitializedGpt,
    EfiPartitionReady,
    DataPartitionReady,
    Done,
    Aborted { stage: ProvisionStage, cause: String },
}

impl From<ProvisionStage> for ProvisionState {
    fn from(stage: ProvisionStage) -> Self {
        match stage {
            ProvisionStage::Cleared => ProvisionState::Cleared,
            ProvisionStage::InitializedGpt => ProvisionState::InitializedGpt,
            ProvisionStage::EfiPartitionReady => ProvisionState::EfiPartitionReady,
            ProvisionStage::DataPartitionReady => ProvisionState::DataPartitionReady,
        }
    }
}

/// The operator's answer to "erase this device?".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confirmation {
    pub accepted: bool,
    /// What the operator typed when asked to repeat the device number.
    pub typed_identifier: Option<String>,
}

impl Confirmation {
    pub fn declined() -> Self {
        Self::default()
    }

    pub fn accepted() -> Self {
        Self {
            accepted: true,
            typed_identifier: None,
        }
    }

    pub fn accepted_with_identifier(typed: impl Into<String>) -> Self {
        Self {
            accepted: true,
            typed_identifier: Some(typed.into()),
        }
    }

    /// Removable devices need a plain yes. Anything else needs the exact
    /// `major:minor` device number as well.
    pub fn authorizes(&self, device: &BlockDevice) -> bool {
        if !self.accepted {
            return false;
        }
        if device.removable {
            return true;
        }
        !device.dev_number.is_empty()
            && self.typed_identifier.as_deref() == Some(device.dev_number.as_str())
    }
}

/// A partition created by a run. Borrows the device it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedPartition<'a> {
    pub number: u32,
    pub filesystem: Filesystem,
    pub label: String,
    pub node: PathBuf,
    pub mount_point: Option<PathBuf>,
    pub device: &'a BlockDevice,
}

/// Outcome of a run that got past its preconditions.
#[derive(Debug, Clone)]
pub struct ProvisionReport<'a> {
    pub device: &'a BlockDevice,
    /// Every state entered, in order, ending in `Done` or `Aborted`.
    pub visited: Vec<ProvisionState>,
    /// Partitions completed before the run ended.
    pub partitions: Vec<ProvisionedPartition<'a>>,
    pub failure: Option<ProvisionError>,
}

impl<'a> ProvisionReport<'a> {
    pub fn success(&self) -> bool {
        self.failure.is_none() && self.final_state() == &ProvisionState::Done
    }

    pub fn final_state(&self) -> &ProvisionState {
        self.visited.last().unwrap_or(&ProvisionState::Unconfirmed)
    }

    pub fn failed_stage(&self) -> Option<ProvisionStage> {
        match self.final_state() {
            ProvisionState::Aborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn efi_partition(&self) -> Option<&ProvisionedPartition<'a>> {
        self.partitions.first()
    }

    pub fn data_partition(&self) -> Option<&ProvisionedPartition<'a>> {
        self.partitions.get(1)
    }
}

/// Check everything that must hold before the first mutation.
pub fn check_preconditions(
    device: &BlockDevice,
    plan: &PartitionPlan,
    confirmation: &Confirmation,
) -> Result<(), ProvisionError> {
    if !confirmation.authorizes(device) {
        return Err(ProvisionError::ConfirmationDeclined {
            device: device.id.clone(),
        });
    }

    let system = device.system_mounts();
    if !system.is_empty() {
        return Err(ProvisionError::Precondition(format!(
            "{} backs the running system (mounted at {})",
            device.path.display(),
            system.join(", ")
        )));
    }

    plan.validate()?;

    if device.size_bytes <= plan.fixed_bytes() {
        return Err(ProvisionError::Precondition(format!(
            "{} is too small: {} bytes, plan needs more than {}",
            device.path.display(),
            device.size_bytes,
            plan.fixed_bytes()
        )));
    }
    Ok(())
}

/// Erase `device` and lay out `plan` on it.
///
/// Returns `Err` only when a precondition fails, in which case the device has
/// not been touched. Once mutation starts, failures are reported through
/// [`ProvisionReport::failure`] together with the partial progress.
pub fn provision<'a>(
    device: &'a BlockDevice,
    plan: &PartitionPlan,
    confirmation: &Confirmation,
    ops: &mut dyn DiskOps,
    ready_timeout: Duration,
) -> Result<ProvisionReport<'a>, ProvisionError> {
    check_preconditions(device, plan, confirmation)?;

    info!(device = %device.path.display(), size = device.size_bytes, "provisioning device");

    let mut report = ProvisionReport {
        device,
        visited: vec![ProvisionState::Unconfirmed],
        partitions: Vec::new(),
        failure: None,
    };

    match run_steps(device, plan, ops, ready_timeout, &mut report) {
        Ok(()) => {
            report.visited.push(ProvisionState::Done);
            info!(device = %device.path.display(), "provisioning complete");
        }
        Err(err) => {
            if let ProvisionError::DiskOperation { stage, cause } = &err {
                error!(device = %device.path.display(), %stage, %cause, "provisioning aborted");
                report.visited.push(ProvisionState::Aborted {
                    stage: *stage,
                    cause: cause.clone(),
                });
            }
            report.failure = Some(err);
        }
    }
    Ok(report)
}

fn run_steps<'a>(
    device: &'a BlockDevice,
    plan: &PartitionPlan,
    ops: &mut dyn DiskOps,
    ready_timeout: Duration,
    report: &mut ProvisionReport<'a>,
) -> Result<(), ProvisionError> {
    let failed = |stage: ProvisionStage| {
        move |e: anyhow::Error| ProvisionError::DiskOperation {
            stage,
            cause: format!("{:#}", e),
        }
    };

    ops.wipe_signatures(device).map_err(failed(ProvisionStage::Cleared))?;
    report.visited.push(ProvisionState::Cleared);

    ops.write_gpt(device).map_err(failed(ProvisionStage::InitializedGpt))?;
    report.visited.push(ProvisionState::InitializedGpt);

    let stages = [ProvisionStage::EfiPartitionReady, ProvisionStage::DataPartitionReady];
    for ((spec, stage), number) in plan.specs().iter().zip(stages).zip(1u32..) {
        let node = device.partition_path(number);

        ops.create_partition(device, number, spec).map_err(failed(stage))?;
        ops.wait_until_ready(&node, ready_timeout).map_err(failed(stage))?;
        ops.format(&node, spec).map_err(failed(stage))?;

        info!(partition = %node.display(), label = %spec.label, fs = %spec.filesystem, "partition ready");
        report.partitions.push(ProvisionedPartition {
            number,
            filesystem: spec.filesystem,
            label: spec.label.clone(),
            node,
            mount_point: None,
            device,
        });
        report.visited.push(stage.into());
    }
    Ok(())
}
