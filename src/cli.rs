use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::devices::DeviceSpec;
use crate::engine::model::SwapConfiguration;
use crate::engine::size::{SectorSize, Size, FALLBACK_SIZE_GIB};
use crate::types::{BtrfsMountOption, FilesystemType, SwapType};

/// ArchLayout - disk layout planner for the Arch Linux installer
#[derive(Parser)]
#[command(name = "archlayout")]
#[command(about = "Plan partition layouts, swap placement and mount order without touching disks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Suggest a default partition layout for one or more devices
    Suggest {
        /// Device as path:size[:table[:sector]] (e.g., /dev/sda:100GiB:gpt)
        #[arg(short, long = "device")]
        devices: Vec<DeviceSpec>,

        /// Read devices from `lsblk --json --bytes` output
        #[arg(long)]
        lsblk: Option<PathBuf>,

        /// Main filesystem (ext4, btrfs, xfs, f2fs, ntfs)
        #[arg(short, long)]
        filesystem: Option<FilesystemType>,

        /// Swap policy: none, zram, swapfile or partition[:SIZE] (e.g., partition:4G)
        #[arg(long, value_parser = parse_swap)]
        swap: Option<SwapConfiguration>,

        /// Create a separate /home partition (yes/no)
        #[arg(long, value_parser = clap::builder::BoolishValueParser::new())]
        separate_home: Option<bool>,

        /// Btrfs mount options, comma separated (compress=zstd, nodatacow)
        #[arg(long, value_delimiter = ',')]
        btrfs_options: Vec<BtrfsMountOption>,

        /// Write the installer configuration here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also print the handler calls that would execute the layout
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a swap partition to the layout in a configuration file
    AddSwap {
        /// Path to configuration file
        config: PathBuf,

        /// Swap size (e.g., 4G); implies swap_type partition
        #[arg(long)]
        size: Option<String>,

        /// Write the updated configuration here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the mount sequence for the layout in a configuration file
    MountPlan {
        /// Path to configuration file
        config: PathBuf,

        /// Installation target directory
        #[arg(short, long, default_value = "/mnt")]
        target: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

/// Parse `--swap`: a swap type, with an optional size after a colon.
///
/// A size that does not parse falls back to the 4 GiB default.
pub fn parse_swap(value: &str) -> Result<SwapConfiguration, String> {
    let (kind, size) = match value.split_once(':') {
        Some((kind, size)) => (kind, Some(size)),
        None => (value, None),
    };

    let swap_type: SwapType = kind
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| format!("unknown swap type '{}' (none, zram, swapfile, partition)", kind))?;

    let size = match size {
        Some(size) => Size::parse_or_default(size, SectorSize::default()),
        None => Size::gib(FALLBACK_SIZE_GIB, SectorSize::default()),
    };

    Ok(SwapConfiguration::new(swap_type, size))
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
