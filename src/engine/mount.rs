//! Mount-order resolution
//!
//! Turns a materialized layout into the sequence of mount/swapon operations
//! that brings up the target system. Parents always come before children:
//! the root device first, partitions by mountpoint, btrfs subvolumes by
//! their own mountpoints.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::model::{DiskLayoutConfiguration, PartitionModification};

/// One step of bringing up the installation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOp {
    /// Mount a block device (options comma-joined, possibly empty)
    Mount {
        device: PathBuf,
        target: PathBuf,
        options: Vec<String>,
    },
    /// Activate a swap partition
    SwapOn { device: PathBuf },
}

impl fmt::Display for MountOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mount {
                device,
                target,
                options,
            } if options.is_empty() => {
                write!(f, "mount {} {}", device.display(), target.display())
            }
            Self::Mount {
                device,
                target,
                options,
            } => write!(
                f,
                "mount -o {} {} {}",
                options.join(","),
                device.display(),
                target.display()
            ),
            Self::SwapOn { device } => write!(f, "swapon {}", device.display()),
        }
    }
}

/// `target` joined with a path relative to the new root; empty means `target`
fn under_target(target: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        target.to_path_buf()
    } else {
        target.join(relative)
    }
}

fn sort_key(partition: &PartitionModification) -> &Path {
    partition.mountpoint.as_deref().unwrap_or(Path::new("/"))
}

fn partition_ops(partition: &PartitionModification, device: &Path, target: &Path) -> Vec<MountOp> {
    if let Some(relative) = partition.relative_mountpoint() {
        return vec![MountOp::Mount {
            device: device.to_path_buf(),
            target: under_target(target, relative),
            options: partition.mount_options.clone(),
        }];
    }

    if partition.is_btrfs() {
        let mut subvols: Vec<_> = partition.btrfs_subvols.iter().collect();
        subvols.sort_by(|a, b| a.relative_mountpoint().cmp(b.relative_mountpoint()));

        return subvols
            .into_iter()
            .map(|subvol| {
                let mut options = partition.mount_options.clone();
                options.push(format!("subvol={}", subvol.name.display()));
                MountOp::Mount {
                    device: device.to_path_buf(),
                    target: under_target(target, subvol.relative_mountpoint()),
                    options,
                }
            })
            .collect();
    }

    if partition.is_swap() {
        return vec![MountOp::SwapOn {
            device: device.to_path_buf(),
        }];
    }

    Vec::new()
}

/// Mount sequence for `config` below `target`.
///
/// Partitions without a `dev_path` have not been created yet and are
/// skipped. Deleted partitions are never mounted.
pub fn resolve_mount_order(config: &DiskLayoutConfiguration, target: &Path) -> Vec<MountOp> {
    let mut modifications: Vec<_> = config.device_modifications.iter().collect();
    // stable: only the root device moves
    modifications.sort_by_key(|m| !m.has_root());

    let mut ops = Vec::new();
    for modification in modifications {
        let mut partitions: Vec<_> = modification.live_partitions().collect();
        partitions.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));

        for partition in partitions {
            let Some(device) = partition.dev_path.as_deref() else {
                debug!(
                    "Skipping unmaterialized partition at {} on {}",
                    partition.start.format_highest(),
                    modification.device_path().display()
                );
                continue;
            };
            ops.extend(partition_ops(partition, device, target));
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{default_btrfs_subvols, BlockDevice, DeviceModification};
    use crate::engine::size::{SectorSize, Size};
    use crate::types::{DiskLayoutType, FilesystemType, PartitionFlag, PartitionTableType};

    const SS: SectorSize = SectorSize::new(512);

    fn materialized(dev: &str, partition: PartitionModification) -> PartitionModification {
        let mut partition = partition;
        partition.dev_path = Some(PathBuf::from(dev));
        partition
    }

    fn part() -> PartitionModification {
        PartitionModification::new(Size::mib(1, SS), Size::mib(1, SS))
    }

    fn config(partitions: Vec<PartitionModification>) -> DiskLayoutConfiguration {
        let device = BlockDevice::new("/dev/sda", Size::gib(10, SS), SS, PartitionTableType::Gpt);
        let mut modification = DeviceModification::new(device, true);
        modification.partitions = partitions;
        DiskLayoutConfiguration::new(DiskLayoutType::Default, vec![modification])
    }

    #[test]
    fn test_root_mounts_before_boot() {
        let layout = config(vec![
            materialized("/dev/sda1", part().with_mountpoint("/boot")),
            materialized("/dev/sda2", part().with_mountpoint("/")),
        ]);
        let ops = resolve_mount_order(&layout, Path::new("/mnt"));
        assert_eq!(
            ops,
            vec![
                MountOp::Mount {
                    device: "/dev/sda2".into(),
                    target: "/mnt".into(),
                    options: vec![],
                },
                MountOp::Mount {
                    device: "/dev/sda1".into(),
                    target: "/mnt/boot".into(),
                    options: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_btrfs_subvolumes_in_nesting_order() {
        let mut btrfs = part().with_fs(FilesystemType::Btrfs);
        btrfs.btrfs_subvols = default_btrfs_subvols().into_iter().rev().collect();
        btrfs.mount_options = vec!["compress=zstd".into()];
        let layout = config(vec![materialized("/dev/sda2", btrfs)]);

        let ops = resolve_mount_order(&layout, Path::new("/mnt"));
        let targets: Vec<String> = ops
            .iter()
            .map(|op| match op {
                MountOp::Mount { target, .. } => target.display().to_string(),
                MountOp::SwapOn { device } => device.display().to_string(),
            })
            .collect();
        assert_eq!(
            targets,
            vec!["/mnt", "/mnt/home", "/mnt/var/cache/pacman/pkg", "/mnt/var/log"]
        );
        assert_eq!(
            ops[0],
            MountOp::Mount {
                device: "/dev/sda2".into(),
                target: "/mnt".into(),
                options: vec!["compress=zstd".into(), "subvol=@".into()],
            }
        );
    }

    #[test]
    fn test_swap_is_activated_not_mounted() {
        let swap = part()
            .with_fs(FilesystemType::LinuxSwap)
            .with_flags([PartitionFlag::Swap]);
        let layout = config(vec![materialized("/dev/sda2", swap)]);
        let ops = resolve_mount_order(&layout, Path::new("/mnt"));
        assert_eq!(ops, vec![MountOp::SwapOn { device: "/dev/sda2".into() }]);
        assert_eq!(ops[0].to_string(), "swapon /dev/sda2");
    }

    #[test]
    fn test_unmaterialized_partitions_are_skipped() {
        let layout = config(vec![
            part().with_mountpoint("/"),
            materialized("/dev/sda1", part().with_mountpoint("/boot")),
        ]);
        let ops = resolve_mount_order(&layout, Path::new("/mnt"));
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_mount_display_includes_options() {
        let op = MountOp::Mount {
            device: "/dev/sda2".into(),
            target: "/mnt".into(),
            options: vec!["compress=zstd".into(), "subvol=@".into()],
        };
        assert_eq!(op.to_string(), "mount -o compress=zstd,subvol=@ /dev/sda2 /mnt");
    }
}
