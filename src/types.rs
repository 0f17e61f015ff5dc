//! Type-safe vocabulary for disk layouts
//!
//! Closed enums replace the stringly-typed values of installer configs, so
//! every match is exhaustive and typos fail at parse time instead of falling
//! back to a default.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Filesystem type of a planned partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FilesystemType {
    #[default]
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    Ntfs,
    /// FAT32 filesystem for the boot/EFI System Partition
    Fat32,
    /// Swap signature, created with mkswap rather than a mkfs tool
    #[serde(rename = "linux-swap")]
    #[strum(serialize = "linux-swap")]
    LinuxSwap,
}

impl FilesystemType {
    /// Filesystems the default layout offers as the main root filesystem
    pub fn is_main_candidate(self) -> bool {
        matches!(self, Self::Ext4 | Self::Btrfs | Self::Xfs | Self::F2fs | Self::Ntfs)
    }
}

/// Partition table format of a block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionTableType {
    #[default]
    Gpt,
    /// Legacy MS-DOS table, reported by lsblk as `dos`
    #[strum(to_string = "mbr", serialize = "dos", serialize = "msdos")]
    Mbr,
}

impl PartitionTableType {
    pub fn is_gpt(self) -> bool {
        matches!(self, Self::Gpt)
    }

    /// Maximum number of primary partitions, if the format has a ceiling
    pub fn max_primary_partitions(self) -> Option<usize> {
        match self {
            Self::Gpt => None,
            Self::Mbr => Some(4),
        }
    }
}

/// Partition flag
///
/// Ordered so a `BTreeSet<PartitionFlag>` serializes deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartitionFlag {
    Boot,
    /// EFI System Partition
    Esp,
    /// GPT "Linux /home" partition type
    LinuxHome,
    Swap,
}

/// What the execution collaborator must do with a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModificationStatus {
    #[default]
    Create,
    Modify,
    Delete,
    Existing,
}

/// MBR-style partition kind (GPT partitions are always primary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    #[default]
    Primary,
    Extended,
    Logical,
}

/// How a disk layout was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum DiskLayoutType {
    /// Suggested automatically by the layout engine
    #[default]
    #[serde(rename = "default_layout")]
    #[strum(serialize = "default_layout")]
    Default,
    /// Partitioned by hand
    #[serde(rename = "manual_partitioning")]
    #[strum(serialize = "manual_partitioning")]
    Manual,
}

impl DiskLayoutType {
    pub fn display_msg(self) -> &'static str {
        match self {
            Self::Default => "Use a best-effort default partition layout",
            Self::Manual => "Manual Partitioning",
        }
    }
}

/// Swap strategy
///
/// Only `Partition` changes the disk layout; the others are runtime services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwapType {
    None,
    /// Compressed swap in RAM
    #[default]
    Zram,
    Swapfile,
    Partition,
}

/// Btrfs mount options offered for the main filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum BtrfsMountOption {
    #[strum(serialize = "compress=zstd")]
    Compress,
    #[strum(serialize = "nodatacow")]
    NoDataCow,
}

impl BtrfsMountOption {
    /// The literal option passed to `mount -o`
    pub fn as_option(self) -> String {
        self.to_string()
    }
}

/// Btrfs snapshot tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum SnapshotType {
    Snapper,
    Timeshift,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_filesystem_serialization() {
        assert_eq!(FilesystemType::Ext4.to_string(), "ext4");
        assert_eq!(FilesystemType::LinuxSwap.to_string(), "linux-swap");
        assert_eq!(
            serde_json::to_string(&FilesystemType::LinuxSwap).unwrap(),
            "\"linux-swap\""
        );
    }

    #[test]
    fn test_filesystem_parsing() {
        assert_eq!(FilesystemType::from_str("btrfs").unwrap(), FilesystemType::Btrfs);
        assert_eq!(FilesystemType::from_str("fat32").unwrap(), FilesystemType::Fat32);
        assert!(FilesystemType::from_str("ext5").is_err());
    }

    #[test]
    fn test_main_candidates_exclude_boot_and_swap() {
        let candidates: Vec<FilesystemType> = FilesystemType::iter()
            .filter(|fs| fs.is_main_candidate())
            .collect();
        assert!(candidates.contains(&FilesystemType::Ext4));
        assert!(!candidates.contains(&FilesystemType::Fat32));
        assert!(!candidates.contains(&FilesystemType::LinuxSwap));
    }

    #[test]
    fn test_partition_table_aliases() {
        assert_eq!(PartitionTableType::from_str("gpt").unwrap(), PartitionTableType::Gpt);
        assert_eq!(PartitionTableType::from_str("dos").unwrap(), PartitionTableType::Mbr);
        assert_eq!(PartitionTableType::from_str("msdos").unwrap(), PartitionTableType::Mbr);
        assert_eq!(PartitionTableType::Mbr.max_primary_partitions(), Some(4));
        assert_eq!(PartitionTableType::Gpt.max_primary_partitions(), None);
    }

    #[test]
    fn test_swap_type_strings() {
        assert_eq!(SwapType::from_str("partition").unwrap(), SwapType::Partition);
        assert_eq!(SwapType::from_str("swapfile").unwrap(), SwapType::Swapfile);
        assert!(SwapType::from_str("partiton").is_err());
        assert_eq!(SwapType::default(), SwapType::Zram);
    }

    #[test]
    fn test_btrfs_mount_option_literal() {
        assert_eq!(BtrfsMountOption::Compress.as_option(), "compress=zstd");
        assert_eq!(BtrfsMountOption::NoDataCow.as_option(), "nodatacow");
    }

    #[test]
    fn test_flag_ordering_is_stable() {
        let mut flags = vec![PartitionFlag::Esp, PartitionFlag::Boot];
        flags.sort();
        assert_eq!(flags, vec![PartitionFlag::Boot, PartitionFlag::Esp]);
    }

    #[test]
    fn test_layout_type_serde() {
        let json = serde_json::to_string(&DiskLayoutType::Default).unwrap();
        assert_eq!(json, "\"default_layout\"");
        let parsed: DiskLayoutType = serde_json::from_str("\"manual_partitioning\"").unwrap();
        assert_eq!(parsed, DiskLayoutType::Manual);
    }
}
