//! Planned disk layout model
//!
//! These are the values the suggesters produce and the execution collaborator
//! consumes: a `DiskLayoutConfiguration` holds one `DeviceModification` per
//! device, each holding the ordered `PartitionModification`s to apply.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use super::size::{SectorSize, Size};
use crate::error::{LayoutError, Result};
use crate::types::{
    DiskLayoutType, FilesystemType, ModificationStatus, PartitionFlag, PartitionTableType,
    PartitionType, SnapshotType, SwapType,
};

/// A block device as reported by device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub path: PathBuf,
    pub total_size: Size,
    #[serde(default)]
    pub sector_size: SectorSize,
    #[serde(default)]
    pub partition_table: PartitionTableType,
}

impl BlockDevice {
    pub fn new(
        path: impl Into<PathBuf>,
        total_size: Size,
        sector_size: SectorSize,
        partition_table: PartitionTableType,
    ) -> Self {
        Self {
            path: path.into(),
            total_size: total_size.with_sector_size(sector_size),
            sector_size,
            partition_table,
        }
    }

    /// Whole sectors on the device
    pub fn total_sectors(&self) -> u64 {
        self.total_size.to_bytes() / self.sector_size.bytes()
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, sector {})",
            self.path.display(),
            self.total_size.format_highest(),
            self.partition_table,
            self.sector_size
        )
    }
}

/// A btrfs subvolume and where it is mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubvolumeModification {
    pub name: PathBuf,
    pub mountpoint: PathBuf,
}

impl SubvolumeModification {
    pub fn new(name: impl Into<PathBuf>, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mountpoint: mountpoint.into(),
        }
    }

    /// Mountpoint relative to the installation target (`/` becomes empty)
    pub fn relative_mountpoint(&self) -> &Path {
        relative_to_root(&self.mountpoint)
    }

    pub fn is_root(&self) -> bool {
        self.mountpoint == Path::new("/")
    }
}

/// The subvolume layout used for btrfs root partitions
pub fn default_btrfs_subvols() -> Vec<SubvolumeModification> {
    vec![
        SubvolumeModification::new("@", "/"),
        SubvolumeModification::new("@home", "/home"),
        SubvolumeModification::new("@log", "/var/log"),
        SubvolumeModification::new("@pkg", "/var/cache/pacman/pkg"),
    ]
}

/// One planned partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionModification {
    #[serde(default)]
    pub status: ModificationStatus,
    #[serde(rename = "type", default)]
    pub part_type: PartitionType,
    pub start: Size,
    pub length: Size,
    #[serde(default)]
    pub fs_type: Option<FilesystemType>,
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,
    #[serde(default)]
    pub mount_options: Vec<String>,
    #[serde(default)]
    pub flags: BTreeSet<PartitionFlag>,
    #[serde(default)]
    pub btrfs_subvols: Vec<SubvolumeModification>,
    /// Block device node, known once the execution collaborator has
    /// created the partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_path: Option<PathBuf>,
}

impl PartitionModification {
    /// A primary partition to be created, with nothing else set
    pub fn new(start: Size, length: Size) -> Self {
        Self {
            status: ModificationStatus::Create,
            part_type: PartitionType::Primary,
            start,
            length,
            fs_type: None,
            mountpoint: None,
            mount_options: Vec::new(),
            flags: BTreeSet::new(),
            btrfs_subvols: Vec::new(),
            dev_path: None,
        }
    }

    pub fn with_fs(mut self, fs_type: FilesystemType) -> Self {
        self.fs_type = Some(fs_type);
        self
    }

    pub fn with_mountpoint(mut self, mountpoint: impl Into<PathBuf>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = PartitionFlag>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn with_mount_options(mut self, options: Vec<String>) -> Self {
        self.mount_options = options;
        self
    }

    pub fn with_status(mut self, status: ModificationStatus) -> Self {
        self.status = status;
        self
    }

    /// First byte past the partition
    pub fn end(&self) -> Size {
        self.start + self.length
    }

    pub fn is_boot(&self) -> bool {
        self.flags.contains(&PartitionFlag::Boot)
    }

    pub fn is_efi(&self) -> bool {
        self.flags.contains(&PartitionFlag::Esp)
    }

    pub fn is_swap(&self) -> bool {
        self.fs_type == Some(FilesystemType::LinuxSwap) || self.flags.contains(&PartitionFlag::Swap)
    }

    pub fn is_root(&self) -> bool {
        match &self.mountpoint {
            Some(mountpoint) => mountpoint == Path::new("/"),
            None => self.btrfs_subvols.iter().any(SubvolumeModification::is_root),
        }
    }

    pub fn is_home(&self) -> bool {
        self.mountpoint.as_deref() == Some(Path::new("/home"))
            || self.flags.contains(&PartitionFlag::LinuxHome)
            || self
                .btrfs_subvols
                .iter()
                .any(|sv| sv.mountpoint == Path::new("/home"))
    }

    pub fn is_btrfs(&self) -> bool {
        self.fs_type == Some(FilesystemType::Btrfs)
    }

    /// Partitions marked for deletion take no space in the final layout
    pub fn is_live(&self) -> bool {
        self.status != ModificationStatus::Delete
    }

    /// Byte ranges `[start, end)` intersect
    pub fn overlaps(&self, other: &PartitionModification) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    pub fn relative_mountpoint(&self) -> Option<&Path> {
        self.mountpoint.as_deref().map(relative_to_root)
    }
}

/// All planned changes for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModification {
    pub device: BlockDevice,
    pub wipe: bool,
    #[serde(default)]
    pub partitions: Vec<PartitionModification>,
}

impl DeviceModification {
    pub fn new(device: BlockDevice, wipe: bool) -> Self {
        Self {
            device,
            wipe,
            partitions: Vec::new(),
        }
    }

    pub fn device_path(&self) -> &Path {
        &self.device.path
    }

    pub fn add_partition(&mut self, partition: PartitionModification) {
        self.partitions.push(partition);
    }

    pub fn live_partitions(&self) -> impl Iterator<Item = &PartitionModification> {
        self.partitions.iter().filter(|p| p.is_live())
    }

    pub fn has_swap(&self) -> bool {
        self.live_partitions().any(PartitionModification::is_swap)
    }

    pub fn has_root(&self) -> bool {
        self.live_partitions().any(PartitionModification::is_root)
    }

    pub fn boot_partition(&self) -> Option<&PartitionModification> {
        self.live_partitions().find(|p| p.is_boot() || p.is_efi())
    }

    pub fn root_partition(&self) -> Option<&PartitionModification> {
        self.live_partitions().find(|p| p.is_root())
    }

    /// Check the layout can be handed to the execution collaborator.
    ///
    /// Live partitions must be non-empty, sector aligned, inside the device
    /// (before the backup region on GPT) and must not overlap one another.
    /// Partitions to be created start on a 1 MiB boundary. MBR tables hold
    /// at most four live partitions.
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        let live: Vec<&PartitionModification> = self.live_partitions().collect();

        if let Some(max) = device.partition_table.max_primary_partitions() {
            if live.len() > max {
                return Err(LayoutError::PartitionTableLimitExceeded {
                    device: device.path.clone(),
                    count: live.len(),
                });
            }
        }

        let usable_end = if device.partition_table.is_gpt() {
            device.total_size.gpt_end()
        } else {
            device.total_size
        };

        for (index, partition) in live.iter().enumerate() {
            if partition.length.is_zero() {
                return Err(LayoutError::invalid_layout(format!(
                    "partition {} on {} has zero length",
                    index + 1,
                    device.path.display()
                )));
            }
            let start = partition.start.with_sector_size(device.sector_size);
            if !start.is_sector_aligned() {
                return Err(LayoutError::invalid_layout(format!(
                    "partition {} on {} starts at byte {}, not a multiple of the {} byte sector",
                    index + 1,
                    device.path.display(),
                    start.to_bytes(),
                    device.sector_size.bytes()
                )));
            }
            if partition.status == ModificationStatus::Create && !start.is_aligned() {
                return Err(LayoutError::invalid_layout(format!(
                    "new partition {} on {} starts at {}, not on a 1 MiB boundary",
                    index + 1,
                    device.path.display(),
                    start.format_highest()
                )));
            }
            if partition.end() > usable_end {
                return Err(LayoutError::BoundaryOverflow {
                    device: device.path.clone(),
                    end: partition.end().with_sector_size(device.sector_size).to_sectors_ceil(),
                    device_sectors: usable_end.with_sector_size(device.sector_size).to_sectors(),
                });
            }
            for other in &live[index + 1..] {
                if partition.overlaps(other) {
                    return Err(LayoutError::invalid_layout(format!(
                        "partitions at {} and {} overlap on {}",
                        partition.start.format_highest(),
                        other.start.format_highest(),
                        device.path.display()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Btrfs snapshot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub snapshot_type: SnapshotType,
}

/// Btrfs-wide options of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BtrfsOptions {
    #[serde(default)]
    pub snapshot_config: Option<SnapshotConfig>,
}

/// A complete disk layout across every selected device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayoutConfiguration {
    pub config_type: DiskLayoutType,
    #[serde(default)]
    pub device_modifications: Vec<DeviceModification>,
    #[serde(default)]
    pub btrfs_options: Option<BtrfsOptions>,
}

impl DiskLayoutConfiguration {
    pub fn new(config_type: DiskLayoutType, device_modifications: Vec<DeviceModification>) -> Self {
        Self {
            config_type,
            device_modifications,
            btrfs_options: None,
        }
    }

    pub fn has_swap_partition(&self) -> bool {
        self.device_modifications.iter().any(DeviceModification::has_swap)
    }

    pub fn validate(&self) -> Result<()> {
        self.device_modifications
            .iter()
            .try_for_each(DeviceModification::validate)
    }

    /// Returns a summary of the layout for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Disk layout: {}", self.config_type.display_msg())];
        for modification in &self.device_modifications {
            lines.push(format!(
                "  {} (wipe: {})",
                modification.device, modification.wipe
            ));
            for (i, partition) in modification.partitions.iter().enumerate() {
                let mountpoint = match (&partition.mountpoint, partition.is_swap()) {
                    (Some(mountpoint), _) => mountpoint.display().to_string(),
                    (None, true) => "[SWAP]".to_string(),
                    (None, false) if !partition.btrfs_subvols.is_empty() => "[btrfs]".to_string(),
                    (None, false) => "-".to_string(),
                };
                let fs = partition
                    .fs_type
                    .map(|fs| fs.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let flags: Vec<String> = partition.flags.iter().map(|f| f.to_string()).collect();
                lines.push(format!(
                    "    {}. {} start={} length={} fs={} mount={} flags=[{}]",
                    i + 1,
                    partition.status,
                    partition.start.format_highest(),
                    partition.length.format_highest(),
                    fs,
                    mountpoint,
                    flags.join(",")
                ));
                for subvol in &partition.btrfs_subvols {
                    lines.push(format!(
                        "       {} -> {}",
                        subvol.name.display(),
                        subvol.mountpoint.display()
                    ));
                }
            }
        }
        lines.join("\n")
    }
}

/// Swap policy chosen by the user
///
/// Built only through its validating deserializer or `new`; the planning
/// code never sees raw config maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapConfiguration {
    pub swap_type: SwapType,
    pub size: Size,
}

impl SwapConfiguration {
    pub fn new(swap_type: SwapType, size: Size) -> Self {
        Self { swap_type, size }
    }

    /// Swap as a dedicated partition of `size`
    pub fn partition(size: Size) -> Self {
        Self::new(SwapType::Partition, size)
    }

    pub fn is_partition(&self) -> bool {
        self.swap_type == SwapType::Partition
    }

    /// Swap size in the sector size of a given device
    pub fn size_for(&self, sector_size: SectorSize) -> Size {
        self.size.with_sector_size(sector_size)
    }
}

impl Default for SwapConfiguration {
    fn default() -> Self {
        Self::new(
            SwapType::Zram,
            Size::gib(super::size::FALLBACK_SIZE_GIB, SectorSize::default()),
        )
    }
}

/// Size as it may appear in a persisted config: `"4G"` or `{value, unit}`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Text(String),
    Exact(Size),
}

#[derive(Deserialize)]
struct RawSwapConfiguration {
    #[serde(default)]
    swap_type: Option<String>,
    #[serde(default)]
    size: Option<RawSize>,
}

impl<'de> Deserialize<'de> for SwapConfiguration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawSwapConfiguration::deserialize(deserializer)?;
        let swap_type = match raw.swap_type.as_deref() {
            None => SwapType::default(),
            Some(text) => text.trim().to_ascii_lowercase().parse::<SwapType>().map_err(|_| {
                serde::de::Error::custom(format!(
                    "unknown swap_type '{}', expected one of: none, zram, swapfile, partition",
                    text
                ))
            })?,
        };
        let size = match raw.size {
            None => Size::gib(super::size::FALLBACK_SIZE_GIB, SectorSize::default()),
            Some(RawSize::Exact(size)) => size,
            Some(RawSize::Text(text)) => Size::parse_or_default(&text, SectorSize::default()),
        };
        Ok(Self { swap_type, size })
    }
}

fn relative_to_root(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::size::Unit;

    const SS: SectorSize = SectorSize::new(512);

    fn device(gib: u64) -> BlockDevice {
        BlockDevice::new("/dev/sda", Size::gib(gib, SS), SS, PartitionTableType::Gpt)
    }

    fn part(start_mib: u64, length_mib: u64) -> PartitionModification {
        PartitionModification::new(Size::mib(start_mib, SS), Size::mib(length_mib, SS))
    }

    #[test]
    fn test_role_predicates() {
        let boot = part(1, 1024).with_flags([PartitionFlag::Boot, PartitionFlag::Esp]);
        assert!(boot.is_boot() && boot.is_efi());
        assert!(!boot.is_root());

        let swap = part(1025, 4096).with_fs(FilesystemType::LinuxSwap);
        assert!(swap.is_swap());

        let root = part(5121, 1024).with_mountpoint("/");
        assert!(root.is_root());

        let mut btrfs = part(5121, 1024).with_fs(FilesystemType::Btrfs);
        btrfs.btrfs_subvols = default_btrfs_subvols();
        assert!(btrfs.is_root());
        assert!(btrfs.is_home());

        let home = part(6145, 1024).with_flags([PartitionFlag::LinuxHome]);
        assert!(home.is_home());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = part(1, 1024);
        let b = part(1025, 10);
        assert!(!a.overlaps(&b));
        let c = part(1024, 10);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut modification = DeviceModification::new(device(10), true);
        modification.add_partition(part(1, 1024));
        modification.add_partition(part(512, 1024));
        assert!(matches!(
            modification.validate(),
            Err(LayoutError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_validate_ignores_deleted_partitions() {
        let mut modification = DeviceModification::new(device(10), false);
        modification.add_partition(part(1, 1024).with_status(ModificationStatus::Delete));
        modification.add_partition(part(512, 1024));
        assert!(modification.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_partition_past_device_end() {
        let mut modification = DeviceModification::new(device(1), true);
        modification.add_partition(part(1, 1024));
        assert!(matches!(
            modification.validate(),
            Err(LayoutError::BoundaryOverflow { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unaligned_start() {
        let mut modification = DeviceModification::new(device(10), true);
        modification.add_partition(PartitionModification::new(
            Size::bytes(1000, SS),
            Size::mib(1, SS),
        ));
        assert!(modification.validate().is_err());
    }

    #[test]
    fn test_validate_keeps_gpt_backup_region_free() {
        let mut modification = DeviceModification::new(device(10), true);
        modification.add_partition(part(1, 10 * 1024 - 1));
        assert!(matches!(
            modification.validate(),
            Err(LayoutError::BoundaryOverflow { .. })
        ));

        let mut mbr = modification.clone();
        mbr.device.partition_table = PartitionTableType::Mbr;
        assert!(mbr.validate().is_ok());

        modification.partitions[0].length = Size::mib(10 * 1024 - 2, SS);
        assert!(modification.validate().is_ok());
    }

    #[test]
    fn test_validate_mbr_partition_limit() {
        let device = BlockDevice::new("/dev/sda", Size::gib(10, SS), SS, PartitionTableType::Mbr);
        let mut modification = DeviceModification::new(device, true);
        for i in 0..5 {
            modification.add_partition(part(1 + i * 1024, 1024));
        }
        assert!(matches!(
            modification.validate(),
            Err(LayoutError::PartitionTableLimitExceeded { count: 5, .. })
        ));

        modification.partitions[4].status = ModificationStatus::Delete;
        assert!(modification.validate().is_ok());
    }

    #[test]
    fn test_validate_new_partitions_start_on_mib_boundary() {
        let unaligned = PartitionModification::new(Size::sectors(2049, SS), Size::mib(1, SS));
        let mut modification = DeviceModification::new(device(10), true);
        modification.add_partition(unaligned.clone());
        assert!(matches!(
            modification.validate(),
            Err(LayoutError::InvalidLayout(_))
        ));

        // partitions already on disk keep whatever start they have
        modification.partitions[0] = unaligned.with_status(ModificationStatus::Existing);
        assert!(modification.validate().is_ok());
    }

    #[test]
    fn test_subvolume_relative_mountpoint() {
        let root = SubvolumeModification::new("@", "/");
        assert_eq!(root.relative_mountpoint(), Path::new(""));
        let log = SubvolumeModification::new("@log", "/var/log");
        assert_eq!(log.relative_mountpoint(), Path::new("var/log"));
    }

    #[test]
    fn test_swap_config_accepts_size_string() {
        let config: SwapConfiguration =
            serde_json::from_str(r#"{"swap_type": "partition", "size": "8G"}"#).unwrap();
        assert_eq!(config.swap_type, SwapType::Partition);
        assert_eq!(config.size, Size::gib(8, SS));
    }

    #[test]
    fn test_swap_config_accepts_size_object() {
        let config: SwapConfiguration = serde_json::from_str(
            r#"{"swap_type": "swapfile", "size": {"value": 512, "unit": "MiB"}}"#,
        )
        .unwrap();
        assert_eq!(config.swap_type, SwapType::Swapfile);
        assert_eq!(config.size.unit(), Unit::MiB);
    }

    #[test]
    fn test_swap_config_bad_size_recovers() {
        let config: SwapConfiguration =
            serde_json::from_str(r#"{"swap_type": "partition", "size": "huge"}"#).unwrap();
        assert_eq!(config.size, Size::gib(4, SS));
    }

    #[test]
    fn test_swap_config_unknown_type_is_rejected() {
        let result: std::result::Result<SwapConfiguration, _> =
            serde_json::from_str(r#"{"swap_type": "partiton", "size": "4G"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_swap_config_defaults() {
        let config: SwapConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SwapConfiguration::default());
        assert_eq!(config.swap_type, SwapType::Zram);
    }

    #[test]
    fn test_summary_mentions_every_partition() {
        let mut modification = DeviceModification::new(device(10), true);
        modification.add_partition(part(1, 1024).with_mountpoint("/boot"));
        modification.add_partition(part(1025, 2048).with_fs(FilesystemType::LinuxSwap));
        let config = DiskLayoutConfiguration::new(DiskLayoutType::Default, vec![modification]);
        let summary = config.summary();
        assert!(summary.contains("/dev/sda"));
        assert!(summary.contains("/boot"));
        assert!(summary.contains("[SWAP]"));
    }
}
