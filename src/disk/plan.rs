//! Partition layout for installer media.

use std::fmt;

use crate::error::ProvisionError;

pub const MIB: u64 = 1024 * 1024;

/// EFI system partition size.
pub const EFI_SIZE_BYTES: u64 = 512 * MIB;
pub const EFI_LABEL: &str = "EFI";
pub const DATA_LABEL: &str = "OCINSTALL";

/// GPT type codes as understood by sgdisk.
pub const GPT_TYPE_EFI: &str = "EF00";
pub const GPT_TYPE_BASIC_DATA: &str = "0700";

/// FAT and exFAT volume labels are limited to 11 characters.
const MAX_LABEL_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    Fat32,
    ExFat,
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filesystem::Fat32 => write!(f, "FAT32"),
            Filesystem::ExFat => write!(f, "exFAT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    Fixed(u64),
    /// Everything left on the device after the preceding partitions.
    Remaining,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub label: String,
    pub filesystem: Filesystem,
    pub size: PartitionSize,
    pub type_code: String,
}

impl PartitionSpec {
    pub fn efi() -> Self {
        Self {
            label: EFI_LABEL.to_string(),
            filesystem: Filesystem::Fat32,
            size: PartitionSize::Fixed(EFI_SIZE_BYTES),
            type_code: GPT_TYPE_EFI.to_string(),
        }
    }

    pub fn remaining(label: &str, filesystem: Filesystem) -> Self {
        Self {
            label: label.to_string(),
            filesystem,
            size: PartitionSize::Remaining,
            type_code: GPT_TYPE_BASIC_DATA.to_string(),
        }
    }

    /// sgdisk `--new` argument for this spec as partition `number`.
    pub fn sgdisk_new_arg(&self, number: u32) -> String {
        match self.size {
            PartitionSize::Fixed(bytes) => format!("{}:0:+{}M", number, bytes / MIB),
            PartitionSize::Remaining => format!("{}:0:0", number),
        }
    }
}

/// Ordered partition specs.
///
/// A valid plan is exactly: a fixed-size FAT32 partition labelled `EFI`,
/// then one partition over the remaining space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    specs: Vec<PartitionSpec>,
}

impl PartitionPlan {
    /// Build and validate a plan.
    pub fn new(specs: Vec<PartitionSpec>) -> Result<Self, ProvisionError> {
        let plan = Self { specs };
        plan.validate()?;
        Ok(plan)
    }

    /// EFI 512 MiB FAT32 plus an exFAT installer volume.
    pub fn installer() -> Self {
        Self {
            specs: vec![
                PartitionSpec::efi(),
                PartitionSpec::remaining(DATA_LABEL, Filesystem::ExFat),
            ],
        }
    }

    pub fn specs(&self) -> &[PartitionSpec] {
        &self.specs
    }

    /// Bytes claimed by fixed-size partitions.
    pub fn fixed_bytes(&self) -> u64 {
        self.specs
            .iter()
            .map(|s| match s.size {
                PartitionSize::Fixed(bytes) => bytes,
                PartitionSize::Remaining => 0,
            })
            .sum()
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        let invalid = |msg: String| Err(ProvisionError::Precondition(format!("invalid partition plan: {}", msg)));

        let [efi, data] = self.specs.as_slice() else {
            return invalid(format!("expected 2 partitions, got {}", self.specs.len()));
        };

        if efi.label != EFI_LABEL || efi.filesystem != Filesystem::Fat32 {
            return invalid(format!(
                "partition 1 must be FAT32 labelled {}, got {} '{}'",
                EFI_LABEL, efi.filesystem, efi.label
            ));
        }
        match efi.size {
            PartitionSize::Fixed(bytes) if bytes >= MIB && bytes % MIB == 0 => {}
            PartitionSize::Fixed(bytes) => {
                return invalid(format!("EFI size {} is not a whole number of MiB", bytes));
            }
            PartitionSize::Remaining => return invalid("EFI partition must have a fixed size".to_string()),
        }
        if !efi.type_code.eq_ignore_ascii_case(GPT_TYPE_EFI) {
            return invalid(format!(
                "partition 1 must use GPT type {}, got {}",
                GPT_TYPE_EFI, efi.type_code
            ));
        }
        if data.size != PartitionSize::Remaining {
            return invalid("partition 2 must consume the remaining space".to_string());
        }

        for spec in &self.specs {
            if spec.label.is_empty() || spec.label.len() > MAX_LABEL_LEN {
                return invalid(format!("label '{}' must be 1-{} characters", spec.label, MAX_LABEL_LEN));
            }
            if spec.type_code.len() != 4 || !spec.type_code.chars().all(|c| c.is_ascii_hexdigit()) {
                return invalid(format!("GPT type code '{}' is not a 4-digit hex code", spec.type_code));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installer_plan_is_valid() {
        let plan = PartitionPlan::installer();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.fixed_bytes(), 512 * MIB);
        assert_eq!(plan.specs()[0].sgdisk_new_arg(1), "1:0:+512M");
        assert_eq!(plan.specs()[1].sgdisk_new_arg(2), "2:0:0");
    }

    #[test]
    fn test_single_partition_rejected() {
        let err = PartitionPlan::new(vec![PartitionSpec::efi()]).unwrap_err();
        assert!(matches!(err, ProvisionError::Precondition(_)));
    }

    #[test]
    fn test_remaining_first_rejected() {
        let specs = vec![
            PartitionSpec::remaining("DATA", Filesystem::ExFat),
            PartitionSpec::efi(),
        ];
        assert!(PartitionPlan::new(specs).is_err());
    }

    #[test]
    fn test_efi_must_be_fat32() {
        let mut efi = PartitionSpec::efi();
        efi.filesystem = Filesystem::ExFat;
        let specs = vec![efi, PartitionSpec::remaining("DATA", Filesystem::ExFat)];
        assert!(PartitionPlan::new(specs).is_err());
    }

    #[test]
    fn test_efi_must_use_esp_type_code() {
        let mut efi = PartitionSpec::efi();
        efi.type_code = GPT_TYPE_BASIC_DATA.to_string();
        let specs = vec![efi, PartitionSpec::remaining("DATA", Filesystem::ExFat)];
        let err = PartitionPlan::new(specs).unwrap_err();
        assert!(err.to_string().contains("EF00"), "{}", err);

        let mut lower = PartitionSpec::efi();
        lower.type_code = "ef00".to_string();
        let specs = vec![lower, PartitionSpec::remaining("DATA", Filesystem::ExFat)];
        assert!(PartitionPlan::new(specs).is_ok());
    }

    #[test]
    fn test_label_length_enforced() {
        let specs = vec![
            PartitionSpec::efi(),
            PartitionSpec::remaining("FAR-TOO-LONG-LABEL", Filesystem::ExFat),
        ];
        assert!(PartitionPlan::new(specs).is_err());
    }

    #[test]
    fn test_fat32_data_partition_allowed() {
        let specs = vec![
            PartitionSpec::efi(),
            PartitionSpec::remaining("INSTALL", Filesystem::Fat32),
        ];
        assert!(PartitionPlan::new(specs).is_ok());
    }
}
