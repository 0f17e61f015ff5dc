//! Default layout suggesters
//!
//! Produces a best-effort partition plan for one device, or splits root and
//! home across several devices by capacity.
//!
//! # Single disk
//!
//! | # | Partition | Start      | Length                         |
//! |---|-----------|------------|--------------------------------|
//! | 1 | boot      | 1 MiB      | 1 GiB                          |
//! | 2 | swap      | boot end   | configured size (optional)     |
//! | 3 | root      | cursor     | remainder, or sized for home   |
//! | 4 | home      | root end   | remainder (optional)           |
//!
//! # Multiple disks
//!
//! - home device: largest device of at least 40 GiB
//! - root device: closest to 32 GiB among the rest, smaller disks included
//!
//! The suggesters never touch a disk. Missing preferences are asked through
//! a [`LayoutPrompt`]; capacity failures come back as
//! [`LayoutError::InsufficientCapacity`] so the caller can re-prompt.

use tracing::{debug, info};

use super::model::{
    default_btrfs_subvols, BlockDevice, DeviceModification, DiskLayoutConfiguration,
    PartitionModification, SwapConfiguration,
};
use super::prompt::LayoutPrompt;
use super::size::{SectorSize, Size, Unit};
use super::swap::plan_fresh_swap;
use crate::error::{LayoutError, Result};
use crate::types::{BtrfsMountOption, DiskLayoutType, FilesystemType, PartitionFlag};

// ============================================================================
// Sizing constants
// ============================================================================

pub const BOOT_START_MIB: u64 = 1;
pub const BOOT_SIZE_GIB: u64 = 1;

/// Devices smaller than this never get a separate home on a single disk
pub const SINGLE_DISK_HOME_THRESHOLD_GIB: u64 = 64;

/// Minimum capacity of the home device in a multi-disk layout
pub const MIN_HOME_DEVICE_GIB: u64 = 40;

/// Root size the multi-disk suggester tries to fit closest
pub const DESIRED_ROOT_GIB: u64 = 32;

// ============================================================================
// Preferences
// ============================================================================

/// What the user already decided before a layout is suggested.
///
/// `None` means "not decided yet"; the suggester asks the prompt.
#[derive(Debug, Clone, Default)]
pub struct LayoutPreferences {
    pub filesystem: Option<FilesystemType>,
    pub swap: Option<SwapConfiguration>,
    pub separate_home: Option<bool>,
    pub mount_options: Option<Vec<BtrfsMountOption>>,
}

impl LayoutPreferences {
    pub fn with_filesystem(mut self, filesystem: FilesystemType) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn with_swap(mut self, swap: SwapConfiguration) -> Self {
        self.swap = Some(swap);
        self
    }

    pub fn with_separate_home(mut self, separate_home: bool) -> Self {
        self.separate_home = Some(separate_home);
        self
    }

    pub fn with_mount_options(mut self, options: Vec<BtrfsMountOption>) -> Self {
        self.mount_options = Some(options);
        self
    }

    fn filesystem(&self, prompt: &dyn LayoutPrompt) -> Result<FilesystemType> {
        let filesystem = self.filesystem.unwrap_or_else(|| prompt.select_filesystem());
        if !filesystem.is_main_candidate() {
            return Err(LayoutError::config(format!(
                "{} cannot be used as the main filesystem",
                filesystem
            )));
        }
        Ok(filesystem)
    }

    /// Literal mount options for a partition of `filesystem`
    fn mount_options_for(&self, filesystem: FilesystemType, prompt: &dyn LayoutPrompt) -> Vec<String> {
        if filesystem != FilesystemType::Btrfs {
            return Vec::new();
        }
        self.mount_options
            .clone()
            .unwrap_or_else(|| prompt.select_btrfs_mount_options())
            .into_iter()
            .map(BtrfsMountOption::as_option)
            .collect()
    }
}

// ============================================================================
// Building blocks
// ============================================================================

/// Root size when a separate home partition shares the disk.
///
/// | Total           | Root              |
/// |-----------------|-------------------|
/// | > 500 GiB       | 50 GiB            |
/// | < 320 GiB       | 32 GiB            |
/// | otherwise       | total / 10 (GiB)  |
pub fn process_root_partition_size(total: Size, sector_size: SectorSize) -> Size {
    let total_gib = total.to(Unit::GiB, sector_size).value();

    if total_gib > 500 {
        Size::gib(50, sector_size)
    } else if total_gib < 320 {
        Size::gib(32, sector_size)
    } else {
        Size::gib(total_gib / 10, sector_size)
    }
}

/// The 1 GiB FAT32 boot partition at 1 MiB; also the ESP on GPT.
pub fn boot_partition(sector_size: SectorSize, using_gpt: bool) -> PartitionModification {
    let mut flags = vec![PartitionFlag::Boot];
    if using_gpt {
        flags.push(PartitionFlag::Esp);
    }

    PartitionModification::new(
        Size::mib(BOOT_START_MIB, sector_size),
        Size::gib(BOOT_SIZE_GIB, sector_size),
    )
    .with_fs(FilesystemType::Fat32)
    .with_mountpoint("/boot")
    .with_flags(flags)
}

/// Space a device can offer to partitions: GPT backup region removed,
/// floored to the alignment boundary
fn available_space(device: &BlockDevice) -> Size {
    let mut available = device.total_size;
    if device.partition_table.is_gpt() {
        available = available.gpt_end();
    }
    available.align()
}

fn use_separate_home(
    filesystem: FilesystemType,
    device: &BlockDevice,
    prefs: &LayoutPreferences,
    prompt: &dyn LayoutPrompt,
) -> bool {
    // btrfs gets an @home subvolume instead
    if filesystem == FilesystemType::Btrfs {
        return false;
    }
    if device.total_size < Size::gib(SINGLE_DISK_HOME_THRESHOLD_GIB, device.sector_size) {
        return false;
    }
    prefs
        .separate_home
        .unwrap_or_else(|| prompt.confirm_separate_home())
}

/// Boot plus the optional swap partition; returns the first free byte after them
fn add_boot_and_swap(modification: &mut DeviceModification, prefs: &LayoutPreferences) -> Size {
    let sector_size = modification.device.sector_size;
    let boot = boot_partition(sector_size, modification.device.partition_table.is_gpt());
    let swap = plan_fresh_swap(prefs.swap.as_ref(), &boot, sector_size);

    let mut cursor = boot.end();
    modification.add_partition(boot);
    if let Some(swap) = swap {
        cursor = swap.end();
        modification.add_partition(swap);
    }
    cursor
}

fn too_small(device: &BlockDevice, role: &str) -> LayoutError {
    LayoutError::insufficient_capacity(format!(
        "{} is too small to hold a {} partition",
        device, role
    ))
}

// ============================================================================
// Single disk
// ============================================================================

/// Suggest a complete layout for a single device.
///
/// The device is wiped; the plan holds boot, optional swap, root and an
/// optional separate home.
pub fn suggest_single_disk_layout(
    device: &BlockDevice,
    prefs: &LayoutPreferences,
    prompt: &dyn LayoutPrompt,
) -> Result<DeviceModification> {
    let filesystem = prefs.filesystem(prompt)?;
    let sector_size = device.sector_size;
    let using_gpt = device.partition_table.is_gpt();
    let available = available_space(device);

    info!("Suggesting default layout for {} with {}", device, filesystem);

    let mut modification = DeviceModification::new(device.clone(), true);
    let root_start = add_boot_and_swap(&mut modification, prefs);

    let using_home = use_separate_home(filesystem, device, prefs, prompt);
    let mount_options = prefs.mount_options_for(filesystem, prompt);

    let remaining = available
        .checked_sub(root_start)
        .filter(|remaining| !remaining.is_zero())
        .ok_or_else(|| too_small(device, "root"))?;

    let root_length = if using_home {
        process_root_partition_size(device.total_size, sector_size)
    } else {
        remaining
    };
    if root_length >= remaining && using_home {
        return Err(too_small(device, "home"));
    }

    let mut root = PartitionModification::new(root_start, root_length)
        .with_fs(filesystem)
        .with_mount_options(mount_options.clone());
    if filesystem == FilesystemType::Btrfs {
        root.btrfs_subvols = default_btrfs_subvols();
    } else {
        root = root.with_mountpoint("/");
    }

    debug!(
        "Root partition: start={} length={}",
        root.start.format_highest(),
        root.length.format_highest()
    );

    let home_start = root.end();
    modification.add_partition(root);

    if using_home {
        let mut home = PartitionModification::new(home_start, available - home_start)
            .with_fs(filesystem)
            .with_mountpoint("/home")
            .with_mount_options(mount_options);
        if using_gpt {
            home = home.with_flags([PartitionFlag::LinuxHome]);
        }
        debug!("Home partition: length={}", home.length.format_highest());
        modification.add_partition(home);
    }

    Ok(modification)
}

// ============================================================================
// Multiple disks
// ============================================================================

/// Index of the largest device with at least 40 GiB; the first wins ties.
fn select_home_device(devices: &[BlockDevice]) -> Option<usize> {
    let mut best: Option<(usize, Size)> = None;
    for (i, device) in devices.iter().enumerate() {
        if device.total_size < Size::gib(MIN_HOME_DEVICE_GIB, device.sector_size) {
            continue;
        }
        match best {
            Some((_, size)) if device.total_size <= size => {}
            _ => best = Some((i, device.total_size)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the device, other than `home`, whose capacity is closest to
/// 32 GiB in either direction; the first wins ties.
fn select_root_device(devices: &[BlockDevice], home: usize) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, device) in devices.iter().enumerate() {
        if i == home {
            continue;
        }
        let desired = Size::gib(DESIRED_ROOT_GIB, device.sector_size);
        let delta = device.total_size.to_bytes().abs_diff(desired.to_bytes());
        match best {
            Some((_, best_delta)) if delta >= best_delta => {}
            _ => best = Some((i, delta)),
        }
    }
    best.map(|(i, _)| i)
}

/// Suggest root and home on separate devices.
///
/// Returns the root device's plan first, then the home device's plan.
/// Every other device is left untouched.
pub fn suggest_multi_disk_layout(
    devices: &[BlockDevice],
    prefs: &LayoutPreferences,
    prompt: &dyn LayoutPrompt,
) -> Result<Vec<DeviceModification>> {
    let home_index = select_home_device(devices);
    let root_index = home_index.and_then(|home| select_root_device(devices, home));

    let (Some(home_index), Some(root_index)) = (home_index, root_index) else {
        return Err(LayoutError::insufficient_capacity(format!(
            "No suitable devices found: /home needs a device of at least {} GiB and / needs a second device (ideally {} GiB)",
            MIN_HOME_DEVICE_GIB, DESIRED_ROOT_GIB
        )));
    };

    let home_device = &devices[home_index];
    let root_device = &devices[root_index];
    info!("Suggesting multi-disk layout: root on {}, /home on {}", root_device, home_device);

    let filesystem = prefs.filesystem(prompt)?;
    let mount_options = prefs.mount_options_for(filesystem, prompt);

    let mut root_modification = DeviceModification::new(root_device.clone(), true);
    let root_start = add_boot_and_swap(&mut root_modification, prefs);

    let mut root_length = root_device.total_size - root_start;
    if root_device.partition_table.is_gpt() {
        root_length = root_length.gpt_end();
    }
    let root_length = root_length.align();
    if root_length.is_zero() {
        return Err(too_small(root_device, "root"));
    }

    root_modification.add_partition(
        PartitionModification::new(root_start, root_length)
            .with_fs(filesystem)
            .with_mountpoint("/")
            .with_mount_options(mount_options.clone()),
    );

    let home_start = Size::mib(1, home_device.sector_size);
    let mut home_length = home_device.total_size - home_start;
    if home_device.partition_table.is_gpt() {
        home_length = home_length.gpt_end();
    }

    let mut home = PartitionModification::new(home_start, home_length.align())
        .with_fs(filesystem)
        .with_mountpoint("/home")
        .with_mount_options(mount_options);
    if home_device.partition_table.is_gpt() {
        home = home.with_flags([PartitionFlag::LinuxHome]);
    }

    let mut home_modification = DeviceModification::new(home_device.clone(), true);
    home_modification.add_partition(home);

    Ok(vec![root_modification, home_modification])
}

// ============================================================================
// Entry points
// ============================================================================

/// Pick the single- or multi-disk suggester by device count.
pub fn get_default_partition_layout(
    devices: &[BlockDevice],
    prefs: &LayoutPreferences,
    prompt: &dyn LayoutPrompt,
) -> Result<Vec<DeviceModification>> {
    match devices {
        [] => Err(LayoutError::insufficient_capacity("no devices selected")),
        [device] => Ok(vec![suggest_single_disk_layout(device, prefs, prompt)?]),
        _ => suggest_multi_disk_layout(devices, prefs, prompt),
    }
}

/// A validated `Default` layout configuration for `devices`.
pub fn suggest_disk_layout_config(
    devices: &[BlockDevice],
    prefs: &LayoutPreferences,
    prompt: &dyn LayoutPrompt,
) -> Result<DiskLayoutConfiguration> {
    let modifications = get_default_partition_layout(devices, prefs, prompt)?;
    let config = DiskLayoutConfiguration::new(DiskLayoutType::Default, modifications);
    config.validate()?;
    Ok(config)
}
