//! Execution collaborator seam
//!
//! The planning engine never touches a disk. A `DeviceHandler` receives the
//! finished plan and does the work; `DryRunHandler` records what would have
//! happened.
//!
//! # Sequence
//!
//! | Step | Call |
//! |------|------|
//! | 1 | `partition` per device (materializes `dev_path`) |
//! | 2 | `format` per created partition |
//! | 3 | `create_btrfs_volumes` per btrfs partition with subvolumes |
//! | 4 | `mount` / `swapon` per resolved [`MountOp`] |

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::model::{DeviceModification, DiskLayoutConfiguration, PartitionModification};
use super::mount::MountOp;
use crate::types::{FilesystemType, ModificationStatus};

/// Executes a disk layout on real (or simulated) devices.
///
/// # Contract
///
/// - `partition` applies the partition table changes of one device and
///   fills in `dev_path` of every live partition it created or kept.
/// - The other calls receive materialized device paths only.
pub trait DeviceHandler {
    fn partition(&mut self, modification: &mut DeviceModification) -> Result<()>;

    fn format(&mut self, fs_type: FilesystemType, path: &Path) -> Result<()>;

    fn mount(&mut self, path: &Path, target: &Path, options: &[String]) -> Result<()>;

    fn swapon(&mut self, path: &Path) -> Result<()>;

    fn create_btrfs_volumes(&mut self, partition: &PartitionModification) -> Result<()>;
}

/// Partition device node for partition number `number` of `disk`.
///
/// Handles both `/dev/sdX` → `/dev/sdX1` and `/dev/nvme0n1` → `/dev/nvme0n1p1` patterns.
pub fn partition_path(disk: &Path, number: usize) -> PathBuf {
    let disk_str = disk.display().to_string();

    // NVMe, mmcblk and loop devices use a 'p' separator
    if disk_str.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", disk_str, number))
    } else {
        PathBuf::from(format!("{}{}", disk_str, number))
    }
}

/// A call received by the dry-run handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Partition {
        device: PathBuf,
        wipe: bool,
        partitions: usize,
    },
    Format {
        fs_type: FilesystemType,
        path: PathBuf,
    },
    Mount {
        path: PathBuf,
        target: PathBuf,
        options: Vec<String>,
    },
    SwapOn {
        path: PathBuf,
    },
    CreateBtrfsVolumes {
        path: PathBuf,
        subvolumes: Vec<PathBuf>,
    },
}

impl fmt::Display for HandlerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition {
                device,
                wipe,
                partitions,
            } => write!(
                f,
                "Partition({}, wipe={}, partitions={})",
                device.display(),
                wipe,
                partitions
            ),
            Self::Format { fs_type, path } => write!(f, "Format({}, {})", path.display(), fs_type),
            Self::Mount {
                path,
                target,
                options,
            } => write!(
                f,
                "Mount({} -> {}, options=[{}])",
                path.display(),
                target.display(),
                options.join(",")
            ),
            Self::SwapOn { path } => write!(f, "SwapOn({})", path.display()),
            Self::CreateBtrfsVolumes { path, subvolumes } => {
                let names: Vec<String> = subvolumes.iter().map(|s| s.display().to_string()).collect();
                write!(f, "CreateBtrfsVolumes({}, [{}])", path.display(), names.join(", "))
            }
        }
    }
}

/// Records every call instead of executing it.
///
/// Partitions are numbered in list order, skipping deleted ones, the way a
/// freshly written partition table numbers them.
#[derive(Debug, Default)]
pub struct DryRunHandler {
    pub calls: Vec<HandlerCall>,
}

impl DryRunHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceHandler for DryRunHandler {
    fn partition(&mut self, modification: &mut DeviceModification) -> Result<()> {
        let disk = modification.device.path.clone();
        let mut number = 0;
        for partition in modification.partitions.iter_mut().filter(|p| p.is_live()) {
            number += 1;
            if partition.dev_path.is_none() {
                partition.dev_path = Some(partition_path(&disk, number));
            }
        }

        self.calls.push(HandlerCall::Partition {
            device: disk,
            wipe: modification.wipe,
            partitions: number,
        });
        Ok(())
    }

    fn format(&mut self, fs_type: FilesystemType, path: &Path) -> Result<()> {
        self.calls.push(HandlerCall::Format {
            fs_type,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn mount(&mut self, path: &Path, target: &Path, options: &[String]) -> Result<()> {
        self.calls.push(HandlerCall::Mount {
            path: path.to_path_buf(),
            target: target.to_path_buf(),
            options: options.to_vec(),
        });
        Ok(())
    }

    fn swapon(&mut self, path: &Path) -> Result<()> {
        self.calls.push(HandlerCall::SwapOn {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn create_btrfs_volumes(&mut self, partition: &PartitionModification) -> Result<()> {
        let path = partition
            .dev_path
            .clone()
            .context("btrfs partition has no device path")?;
        self.calls.push(HandlerCall::CreateBtrfsVolumes {
            path,
            subvolumes: partition.btrfs_subvols.iter().map(|s| s.name.clone()).collect(),
        });
        Ok(())
    }
}

/// Partition and format every device of `config`.
///
/// `config` is updated in place with the device paths the handler
/// materialized.
pub fn apply_layout(handler: &mut dyn DeviceHandler, config: &mut DiskLayoutConfiguration) -> Result<()> {
    for modification in &mut config.device_modifications {
        info!("Partitioning {}", modification.device);
        handler
            .partition(modification)
            .with_context(|| format!("Failed to partition {}", modification.device_path().display()))?;

        for partition in modification.live_partitions() {
            if partition.status != ModificationStatus::Create {
                continue;
            }
            let Some(fs_type) = partition.fs_type else {
                continue;
            };
            let Some(path) = partition.dev_path.as_deref() else {
                warn!(
                    "Partition at {} on {} was not materialized; not formatting",
                    partition.start.format_highest(),
                    modification.device_path().display()
                );
                continue;
            };

            handler
                .format(fs_type, path)
                .with_context(|| format!("Failed to format {} as {}", path.display(), fs_type))?;

            if partition.is_btrfs() && !partition.btrfs_subvols.is_empty() {
                handler
                    .create_btrfs_volumes(partition)
                    .with_context(|| format!("Failed to create subvolumes on {}", path.display()))?;
            }
        }
    }
    Ok(())
}

/// Feed a resolved mount sequence into `handler`, stopping at the first failure.
pub fn apply_mount_plan(handler: &mut dyn DeviceHandler, ops: &[MountOp]) -> Result<()> {
    for op in ops {
        match op {
            MountOp::Mount {
                device,
                target,
                options,
            } => handler
                .mount(device, target, options)
                .with_context(|| format!("Failed to mount {} at {}", device.display(), target.display()))?,
            MountOp::SwapOn { device } => handler
                .swapon(device)
                .with_context(|| format!("Failed to enable swap on {}", device.display()))?,
        }
    }
    Ok(())
}
