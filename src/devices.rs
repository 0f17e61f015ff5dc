//! Block device enumeration input
//!
//! Turns what the device-enumeration collaborator reports into
//! [`BlockDevice`] values. Nothing here spawns a process: the caller runs
//! `lsblk --json --bytes --output PATH,NAME,SIZE,TYPE,LOG-SEC,PTTYPE` and
//! hands over the text.

use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::model::BlockDevice;
use crate::engine::size::{SectorSize, Size};
use crate::error::{LayoutError, Result};
use crate::types::PartitionTableType;

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

/// lsblk prints numbers as strings on some versions
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LsblkNumber {
    Number(u64),
    Text(String),
}

impl LsblkNumber {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    size: LsblkNumber,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "log-sec", default)]
    log_sec: Option<LsblkNumber>,
    #[serde(default)]
    pttype: Option<String>,
}

impl LsblkDevice {
    fn into_block_device(self) -> Option<BlockDevice> {
        let path = self.path.unwrap_or_else(|| format!("/dev/{}", self.name));

        let Some(size) = self.size.value() else {
            warn!("Skipping {}: unreadable size", path);
            return None;
        };

        let sector_size = SectorSize::new(self.log_sec.and_then(|n| n.value()).unwrap_or(0));

        // Blank disks have no table yet; the installer writes GPT
        let partition_table = match self.pttype.as_deref() {
            None | Some("") => PartitionTableType::Gpt,
            Some(text) => text.parse().unwrap_or_else(|_| {
                warn!("{}: unknown partition table '{}', assuming gpt", path, text);
                PartitionTableType::Gpt
            }),
        };

        Some(BlockDevice::new(
            path,
            Size::bytes(size, sector_size),
            sector_size,
            partition_table,
        ))
    }
}

/// Parse `lsblk --json --bytes` output into the list of whole disks.
///
/// Partitions, loop devices and ROM drives are ignored.
pub fn parse_lsblk_json(json: &str) -> Result<Vec<BlockDevice>> {
    let output: LsblkOutput = serde_json::from_str(json)?;

    let devices: Vec<BlockDevice> = output
        .blockdevices
        .into_iter()
        .filter(|device| device.kind == "disk")
        .filter_map(LsblkDevice::into_block_device)
        .collect();

    debug!("Found {} disk(s) in lsblk output", devices.len());
    Ok(devices)
}

/// A device described on the command line as `path:size[:table[:sector]]`,
/// e.g. `/dev/sda:100GiB:gpt` or `/dev/nvme0n1:1T:gpt:4096`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec(pub BlockDevice);

impl FromStr for DeviceSpec {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(':');
        let path = fields.next().filter(|p| !p.is_empty());
        let size = fields.next();

        let (Some(path), Some(size)) = (path, size) else {
            return Err(LayoutError::config(format!(
                "device '{}' must be written as path:size[:table[:sector]]",
                s
            )));
        };

        let partition_table = match fields.next() {
            None => PartitionTableType::default(),
            Some(table) => table.parse().map_err(|_| {
                LayoutError::config(format!("unknown partition table '{}' (expected gpt or mbr)", table))
            })?,
        };

        let sector_size = match fields.next() {
            None => SectorSize::default(),
            Some(sector) => sector
                .parse::<u64>()
                .ok()
                .filter(|bytes| bytes.is_power_of_two() && *bytes >= 512)
                .map(SectorSize::new)
                .ok_or_else(|| LayoutError::config(format!("invalid sector size '{}'", sector)))?,
        };

        if fields.next().is_some() {
            return Err(LayoutError::config(format!("too many fields in device '{}'", s)));
        }

        let total_size = Size::parse(size, sector_size)?;
        Ok(Self(BlockDevice::new(path, total_size, sector_size, partition_table)))
    }
}

impl From<DeviceSpec> for BlockDevice {
    fn from(spec: DeviceSpec) -> Self {
        spec.0
    }
}
