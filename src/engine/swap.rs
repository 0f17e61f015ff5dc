//! Swap partition planning
//!
//! Two entry points share one placement policy: swap sits directly after the
//! boot partition and before root.
//!
//! - `plan_fresh_swap` is used while a suggester builds a layout from scratch.
//! - `retrofit_swap` adds swap to a layout that already exists, e.g. when the
//!   user switches the swap policy after choosing a disk layout. It is a pure
//!   function: the input plan is never modified.
//!
//! # Retrofit sequence (per device, first success wins)
//!
//! | Step | Check | Rejection |
//! |------|-------|-----------|
//! | 1 | MBR with 4 live partitions | `PartitionTableLimitExceeded` |
//! | 2 | Shrink last partition by the swap size | `InsufficientCapacity` |
//! | 3 | Insert after boot, shift following `Create` partitions | - |
//! | 4 | Otherwise append 1 MiB after the last partition, or near the device end | `BoundaryOverflow` |
//! | 5 | Resulting device plan validates (GPT backup region kept free) | `InvalidLayout`, `BoundaryOverflow` |

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::model::{
    DeviceModification, DiskLayoutConfiguration, PartitionModification, SwapConfiguration,
};
use super::size::{SectorSize, Size, Unit};
use crate::error::{LayoutError, Result};
use crate::types::{FilesystemType, ModificationStatus, PartitionFlag};

/// Gap left between the last partition and a swap partition appended after it
pub const SWAP_PADDING_MIB: u64 = 1;

/// Distance kept from the device end when swap is repositioned to fit
pub const END_SAFETY_MARGIN_KIB: u64 = 512;

/// A swap partition of `length` at `start`
pub fn swap_partition(start: Size, length: Size) -> PartitionModification {
    PartitionModification::new(start, length)
        .with_fs(FilesystemType::LinuxSwap)
        .with_flags([PartitionFlag::Swap])
}

/// Swap length for a device, rounded up so following starts stay aligned
fn swap_length(swap: &SwapConfiguration, sector_size: SectorSize) -> Size {
    swap.size_for(sector_size).align_up()
}

/// Swap partition for a layout being built from scratch.
///
/// Returns `None` unless swap is configured as a partition. The partition
/// starts where `boot` ends; the caller places root after it.
pub fn plan_fresh_swap(
    swap: Option<&SwapConfiguration>,
    boot: &PartitionModification,
    sector_size: SectorSize,
) -> Option<PartitionModification> {
    let swap = swap.filter(|s| s.is_partition())?;
    let length = swap_length(swap, sector_size);

    if length.is_zero() {
        warn!("Swap partition requested with a zero size; no swap partition will be created");
        return None;
    }

    debug!(
        "Placing {} swap partition after boot at {}",
        length.format_highest(),
        boot.end().format_highest()
    );
    Some(swap_partition(boot.end(), length))
}

/// Where a retrofitted swap partition ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPlacement {
    /// Directly after the boot/ESP partition, later partitions shifted
    AfterBoot,
    /// After every existing partition (no boot partition to anchor to, or
    /// a partition after boot cannot be moved)
    EndOfDevice,
}

/// A device that could not take the swap partition, and why
#[derive(Debug)]
pub struct SwapRejection {
    pub device: PathBuf,
    pub reason: LayoutError,
}

/// What `retrofit_swap` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrofitOutcome {
    /// The swap policy is not `partition`
    NotRequested,
    /// Some device already carries a swap partition
    AlreadyPresent,
    /// Swap was added as partition `index` (0-based) on `device`
    Added {
        device: PathBuf,
        index: usize,
        placement: SwapPlacement,
    },
    /// Every device rejected the swap partition; the layout is unchanged
    NotPlaced,
}

/// Result of a swap retrofit: the new plan plus a report
#[derive(Debug)]
pub struct SwapRetrofit {
    pub config: DiskLayoutConfiguration,
    pub outcome: RetrofitOutcome,
    pub rejections: Vec<SwapRejection>,
}

impl SwapRetrofit {
    pub fn is_added(&self) -> bool {
        matches!(self.outcome, RetrofitOutcome::Added { .. })
    }
}

/// Add a swap partition to an already planned layout.
///
/// Devices are tried in order and only the first that can take the partition
/// receives it. Rejections are logged and reported, never raised. Calling
/// this again on the returned plan is a no-op.
pub fn retrofit_swap(config: &DiskLayoutConfiguration, swap: &SwapConfiguration) -> SwapRetrofit {
    let mut retrofit = SwapRetrofit {
        config: config.clone(),
        outcome: RetrofitOutcome::NotRequested,
        rejections: Vec::new(),
    };

    if !swap.is_partition() {
        return retrofit;
    }

    if config.has_swap_partition() {
        info!("Swap partition already exists in disk configuration");
        retrofit.outcome = RetrofitOutcome::AlreadyPresent;
        return retrofit;
    }

    info!("Creating {} swap partition as configured", swap.size.format_highest());
    retrofit.outcome = RetrofitOutcome::NotPlaced;

    for (i, modification) in config.device_modifications.iter().enumerate() {
        info!(
            "Device {} has {} existing partitions",
            modification.device_path().display(),
            modification.partitions.len()
        );

        match retrofit_device(modification, swap) {
            Ok(planned) => {
                info!(
                    "Added {} swap partition to {} as partition {}",
                    swap.size.format_highest(),
                    modification.device_path().display(),
                    planned.index + 1
                );
                retrofit.outcome = RetrofitOutcome::Added {
                    device: modification.device.path.clone(),
                    index: planned.index,
                    placement: planned.placement,
                };
                retrofit.config.device_modifications[i].partitions = planned.partitions;
                break;
            }
            Err(reason) => {
                warn!(
                    "Cannot add swap partition to {}: {}",
                    modification.device_path().display(),
                    reason
                );
                retrofit.rejections.push(SwapRejection {
                    device: modification.device.path.clone(),
                    reason,
                });
            }
        }
    }

    if retrofit.outcome == RetrofitOutcome::NotPlaced {
        warn!("No device could take a swap partition; continuing without one");
    }

    retrofit
}

/// New partition list for one device
struct PlannedSwap {
    partitions: Vec<PartitionModification>,
    index: usize,
    placement: SwapPlacement,
}

fn retrofit_device(modification: &DeviceModification, swap: &SwapConfiguration) -> Result<PlannedSwap> {
    let device = &modification.device;
    let sector_size = device.sector_size;
    let length = swap_length(swap, sector_size);

    if length.is_zero() {
        return Err(LayoutError::insufficient_capacity("swap size is zero"));
    }

    let live_count = modification.live_partitions().count();
    if let Some(max) = device.partition_table.max_primary_partitions() {
        if live_count >= max {
            return Err(LayoutError::PartitionTableLimitExceeded {
                device: device.path.clone(),
                count: live_count,
            });
        }
    }

    let mut partitions = modification.partitions.clone();
    if let Some(last) = partitions.iter_mut().rev().find(|p| p.is_live()) {
        if last.length > length {
            info!(
                "Shrinking last partition by {} to make room for swap",
                length.format_highest()
            );
            last.length = last.length - length;
            if last.status == ModificationStatus::Existing {
                last.status = ModificationStatus::Modify;
            }
        } else {
            return Err(LayoutError::insufficient_capacity(format!(
                "last partition too small to shrink for swap ({} < {})",
                last.length.format_highest(),
                length.format_highest()
            )));
        }
    }

    let candidate = match boot_anchor(&partitions) {
        Anchor::AfterBoot(boot_index) => {
            debug!("Inserting swap after boot partition {}", boot_index + 1);
            insert_after_boot(&partitions, boot_index, length)
        }
        Anchor::NoBoot => {
            let start = end_of_device_start(modification, &partitions, length)?;
            warn!(
                "{}; appending swap at sector {}",
                LayoutError::NoBootPartitionFound(device.path.clone()),
                start.to_sectors()
            );
            append_at_end(partitions, start, length)
        }
        Anchor::Immovable(index) => {
            let start = end_of_device_start(modification, &partitions, length)?;
            info!(
                "Partition {} after boot is not being created and cannot move; appending swap at sector {}",
                index + 1,
                start.to_sectors()
            );
            append_at_end(partitions, start, length)
        }
    };

    // also rejects an appended swap reaching into the GPT backup region
    let check = DeviceModification {
        device: device.clone(),
        wipe: modification.wipe,
        partitions: candidate.partitions.clone(),
    };
    check.validate()?;

    Ok(candidate)
}

/// Start for a swap partition placed after every live partition.
///
/// Uses the end of the furthest partition plus padding; when that would run
/// past the device, tries again anchored at the device end.
fn end_of_device_start(
    modification: &DeviceModification,
    partitions: &[PartitionModification],
    length: Size,
) -> Result<Size> {
    let device = &modification.device;
    let sector_size = device.sector_size;
    let to_sectors = |size: Size| size.to_bytes().div_ceil(sector_size.bytes());

    let last_end = partitions
        .iter()
        .filter(|p| p.is_live())
        .map(|p| to_sectors(p.end()))
        .max();

    let Some(last_end) = last_end else {
        info!("No existing partitions, starting swap at 1 MiB");
        return Ok(Size::mib(1, sector_size));
    };

    let device_sectors = device.total_sectors();
    let swap_sectors = to_sectors(length);
    let padding = Size::mib(SWAP_PADDING_MIB, sector_size).to_sectors();
    let proposed_start = Size::sectors(last_end + padding, sector_size)
        .align_up()
        .to_sectors();
    let proposed_end = proposed_start + swap_sectors;

    if proposed_end <= device_sectors {
        debug!("Calculated swap start position: {} sectors", proposed_start);
        return Ok(Size::sectors(proposed_start, sector_size));
    }

    info!(
        "Swap partition would exceed disk boundary: proposed_end={}, disk_end={}",
        proposed_end, device_sectors
    );

    let margin = Size::new(END_SAFETY_MARGIN_KIB, Unit::KiB, sector_size).to_sectors();
    let anchored = device_sectors.saturating_sub(swap_sectors + margin);
    let start = Size::sectors(anchored, sector_size).align();
    if start.to_sectors() < last_end {
        return Err(LayoutError::BoundaryOverflow {
            device: device.path.clone(),
            end: proposed_end,
            device_sectors,
        });
    }

    info!("Repositioned swap to fit: start={} sectors", start.to_sectors());
    Ok(start)
}

enum Anchor {
    AfterBoot(usize),
    NoBoot,
    /// Index of the first live, non-`Create` partition following boot
    Immovable(usize),
}

fn boot_anchor(partitions: &[PartitionModification]) -> Anchor {
    let Some(boot_index) = partitions
        .iter()
        .position(|p| p.is_live() && (p.is_boot() || p.is_efi()))
    else {
        return Anchor::NoBoot;
    };

    let immovable = partitions[boot_index + 1..]
        .iter()
        .position(|p| p.is_live() && p.status != ModificationStatus::Create);

    match immovable {
        Some(offset) => Anchor::Immovable(boot_index + 1 + offset),
        None => Anchor::AfterBoot(boot_index),
    }
}

/// Swap right after boot; every later `Create` partition moves forward by
/// the swap length.
fn insert_after_boot(
    partitions: &[PartitionModification],
    boot_index: usize,
    length: Size,
) -> PlannedSwap {
    let swap = swap_partition(partitions[boot_index].end(), length);

    let shifted = partitions[boot_index + 1..].iter().cloned().map(|mut p| {
        if p.is_live() && p.status == ModificationStatus::Create {
            p.start = p.start + length;
        }
        p
    });

    let partitions: Vec<PartitionModification> = partitions[..=boot_index]
        .iter()
        .cloned()
        .chain(std::iter::once(swap))
        .chain(shifted)
        .collect();

    PlannedSwap {
        partitions,
        index: boot_index + 1,
        placement: SwapPlacement::AfterBoot,
    }
}

fn append_at_end(
    mut partitions: Vec<PartitionModification>,
    start: Size,
    length: Size,
) -> PlannedSwap {
    partitions.push(swap_partition(start, length));
    PlannedSwap {
        index: partitions.len() - 1,
        partitions,
        placement: SwapPlacement::EndOfDevice,
    }
}
