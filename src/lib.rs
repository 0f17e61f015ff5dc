//! ArchLayout Library
//!
//! This library provides the disk layout planning engine of the Arch Linux
//! installer: default partition layouts, swap placement and mount ordering.

pub mod cli;
pub mod config_file;
pub mod devices;
pub mod engine;
pub mod error;
pub mod types;

// Re-export main types for convenience
pub use config_file::InstallerConfig;
pub use error::{LayoutError, Result};
pub use types::{
    BtrfsMountOption, DiskLayoutType, FilesystemType, ModificationStatus, PartitionFlag,
    PartitionTableType, PartitionType, SnapshotType, SwapType,
};

// Planning engine
pub use engine::executor::{
    apply_layout, apply_mount_plan, partition_path, DeviceHandler, DryRunHandler, HandlerCall,
};
pub use engine::layout::{
    get_default_partition_layout, process_root_partition_size, suggest_disk_layout_config,
    suggest_multi_disk_layout, suggest_single_disk_layout, LayoutPreferences,
};
pub use engine::model::{
    BlockDevice, BtrfsOptions, DeviceModification, DiskLayoutConfiguration,
    PartitionModification, SnapshotConfig, SubvolumeModification, SwapConfiguration,
};
pub use engine::mount::{resolve_mount_order, MountOp};
pub use engine::prompt::{DefaultPrompt, LayoutPrompt};
pub use engine::size::{SectorSize, Size, Unit};
pub use engine::swap::{plan_fresh_swap, retrofit_swap, RetrofitOutcome, SwapPlacement, SwapRetrofit};
