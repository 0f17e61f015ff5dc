//! Exact size arithmetic for partition planning
//!
//! A `Size` is a value in one unit plus the sector size of the device it
//! describes. All arithmetic and comparisons normalize both operands to
//! bytes first, so `Size(1, GiB) == Size(2097152, sectors)` on a 512-byte
//! device.
//!
//! # Rounding
//!
//! | Operation          | Rounding |
//! |--------------------|----------|
//! | `to(larger unit)`  | floor    |
//! | `to_sectors()`     | floor    |
//! | `to_sectors_ceil()`| ceiling  |
//! | `align()`          | floor to 1 MiB |
//! | `align_up()`       | ceiling to 1 MiB |

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::warn;

use crate::error::{LayoutError, Result};

/// Sector size assumed when a device does not report one
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Partition boundary every planned start is aligned to
pub const ALIGNMENT_BYTES: u64 = 1024 * 1024;

/// Sectors reserved at the end of a GPT disk for the backup header and table
pub const GPT_BACKUP_SECTORS: u64 = 33;

/// Size used when a user-entered size string cannot be parsed
pub const FALLBACK_SIZE_GIB: u64 = 4;

/// Logical sector size of a block device, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct SectorSize(u64);

impl SectorSize {
    /// Create a sector size; zero is treated as the 512-byte default.
    pub const fn new(bytes: u64) -> Self {
        if bytes == 0 {
            Self(DEFAULT_SECTOR_SIZE)
        } else {
            Self(bytes)
        }
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl Default for SectorSize {
    fn default() -> Self {
        Self(DEFAULT_SECTOR_SIZE)
    }
}

impl From<u64> for SectorSize {
    fn from(bytes: u64) -> Self {
        Self::new(bytes)
    }
}

impl From<SectorSize> for u64 {
    fn from(sector_size: SectorSize) -> Self {
        sector_size.0
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B", self.0)
    }
}

/// Unit a size value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Unit {
    B,
    KiB,
    MiB,
    GiB,
    TiB,
    #[serde(rename = "sectors")]
    #[strum(serialize = "sectors")]
    Sectors,
}

impl Unit {
    /// Number of bytes in one of this unit
    pub const fn multiplier(self, sector_size: SectorSize) -> u64 {
        match self {
            Self::B => 1,
            Self::KiB => 1 << 10,
            Self::MiB => 1 << 20,
            Self::GiB => 1 << 30,
            Self::TiB => 1 << 40,
            Self::Sectors => sector_size.bytes(),
        }
    }
}

/// An immutable size: `value` × `unit`, for a device with `sector_size`.
///
/// Equality and ordering compare byte counts, not the unit chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Size {
    value: u64,
    unit: Unit,
    #[serde(default)]
    sector_size: SectorSize,
}

impl Size {
    pub const fn new(value: u64, unit: Unit, sector_size: SectorSize) -> Self {
        Self {
            value,
            unit,
            sector_size,
        }
    }

    pub const fn zero(sector_size: SectorSize) -> Self {
        Self::new(0, Unit::B, sector_size)
    }

    pub const fn bytes(value: u64, sector_size: SectorSize) -> Self {
        Self::new(value, Unit::B, sector_size)
    }

    pub const fn sectors(value: u64, sector_size: SectorSize) -> Self {
        Self::new(value, Unit::Sectors, sector_size)
    }

    pub const fn mib(value: u64, sector_size: SectorSize) -> Self {
        Self::new(value, Unit::MiB, sector_size)
    }

    pub const fn gib(value: u64, sector_size: SectorSize) -> Self {
        Self::new(value, Unit::GiB, sector_size)
    }

    pub const fn value(&self) -> u64 {
        self.value
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    /// Total byte count. Saturates instead of wrapping on absurd values.
    pub const fn to_bytes(&self) -> u64 {
        self.value.saturating_mul(self.unit.multiplier(self.sector_size))
    }

    pub const fn is_zero(&self) -> bool {
        self.to_bytes() == 0
    }

    /// Convert to `unit`, flooring when the target unit is larger.
    ///
    /// Converting to `Unit::Sectors` uses `sector_size`; the result carries
    /// `sector_size` as its own.
    pub fn to(&self, unit: Unit, sector_size: SectorSize) -> Size {
        let value = self.to_bytes() / unit.multiplier(sector_size);
        Size::new(value, unit, sector_size)
    }

    /// Whole sectors (floor) in this size's own sector size
    pub fn to_sectors(&self) -> u64 {
        self.to_bytes() / self.sector_size.bytes()
    }

    /// Sectors needed to hold this size (ceiling), for boundary checks
    pub fn to_sectors_ceil(&self) -> u64 {
        self.to_bytes().div_ceil(self.sector_size.bytes())
    }

    /// The same byte count re-expressed for a different sector size.
    ///
    /// Sector-unit values become bytes so the byte count is preserved.
    pub fn with_sector_size(&self, sector_size: SectorSize) -> Size {
        match self.unit {
            Unit::Sectors => Size::bytes(self.to_bytes(), sector_size),
            unit => Size::new(self.value, unit, sector_size),
        }
    }

    /// Floor to the 1 MiB alignment boundary.
    pub fn align(&self) -> Size {
        let remainder = self.to_bytes() % ALIGNMENT_BYTES;
        if remainder == 0 {
            *self
        } else {
            Size::bytes(self.to_bytes() - remainder, self.sector_size)
        }
    }

    /// Round up to the 1 MiB alignment boundary.
    pub fn align_up(&self) -> Size {
        let remainder = self.to_bytes() % ALIGNMENT_BYTES;
        if remainder == 0 {
            *self
        } else {
            Size::bytes(
                self.to_bytes().saturating_add(ALIGNMENT_BYTES - remainder),
                self.sector_size,
            )
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.to_bytes() % ALIGNMENT_BYTES == 0
    }

    pub fn is_sector_aligned(&self) -> bool {
        self.to_bytes() % self.sector_size.bytes() == 0
    }

    /// Usable space once the trailing GPT backup region is reserved.
    ///
    /// Callers `align()` the result before offering it to a partition.
    pub fn gpt_end(&self) -> Size {
        *self - Size::sectors(GPT_BACKUP_SECTORS, self.sector_size)
    }

    pub fn checked_sub(&self, other: Size) -> Option<Size> {
        self.to_bytes()
            .checked_sub(other.to_bytes())
            .map(|bytes| self.combine(other, bytes))
    }

    /// Value in `unit` as a floating point number, for display only
    pub fn as_f64(&self, unit: Unit) -> f64 {
        self.to_bytes() as f64 / unit.multiplier(self.sector_size) as f64
    }

    /// Two-decimal rendering in `unit`, e.g. `"98.99"` for GiB
    pub fn format_size(&self, unit: Unit) -> String {
        format!("{:.2}", self.as_f64(unit))
    }

    /// Human-readable rendering in the largest unit that keeps the value >= 1
    pub fn format_highest(&self) -> String {
        let bytes = self.to_bytes();
        let unit = [Unit::TiB, Unit::GiB, Unit::MiB, Unit::KiB]
            .into_iter()
            .find(|unit| bytes >= unit.multiplier(self.sector_size))
            .unwrap_or(Unit::B);
        format!("{} {}", self.format_size(unit), unit)
    }

    /// Parse a user-entered size such as `"4G"`, `"512MiB"` or `"4096"`.
    ///
    /// The number is an unsigned integer; suffixes are case-insensitive and
    /// binary (`G`, `GB` and `GiB` all mean 2^30). A bare number is bytes and
    /// `S`/`sectors` counts sectors of `sector_size`.
    pub fn parse(input: &str, sector_size: SectorSize) -> Result<Size> {
        let trimmed = input.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if digits_end == 0 {
            return Err(LayoutError::invalid_size(input));
        }

        let value: u64 = trimmed[..digits_end]
            .parse()
            .map_err(|_| LayoutError::invalid_size(input))?;

        let unit = match trimmed[digits_end..].trim().to_ascii_lowercase().as_str() {
            "" | "b" => Unit::B,
            "k" | "kb" | "kib" => Unit::KiB,
            "m" | "mb" | "mib" => Unit::MiB,
            "g" | "gb" | "gib" => Unit::GiB,
            "t" | "tb" | "tib" => Unit::TiB,
            "s" | "sector" | "sectors" => Unit::Sectors,
            _ => return Err(LayoutError::invalid_size(input)),
        };

        if value.checked_mul(unit.multiplier(sector_size)).is_none() {
            return Err(LayoutError::invalid_size(input));
        }

        Ok(Size::new(value, unit, sector_size))
    }

    /// Parse a user-entered size, falling back to 4 GiB with a warning.
    ///
    /// Layout planning never aborts because of a typo in a size string.
    pub fn parse_or_default(input: &str, sector_size: SectorSize) -> Size {
        match Size::parse(input, sector_size) {
            Ok(size) => size,
            Err(err) => {
                warn!(
                    "{}; using the {} GiB default instead",
                    err, FALLBACK_SIZE_GIB
                );
                Size::gib(FALLBACK_SIZE_GIB, sector_size)
            }
        }
    }

    /// Result of an arithmetic operation: keeps the unit when both sides
    /// share it, otherwise expressed in bytes.
    fn combine(&self, other: Size, bytes: u64) -> Size {
        if self.unit == other.unit && self.sector_size == other.sector_size {
            Size::new(
                bytes / self.unit.multiplier(self.sector_size),
                self.unit,
                self.sector_size,
            )
        } else {
            Size::bytes(bytes, self.sector_size)
        }
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        let bytes = self.to_bytes().saturating_add(rhs.to_bytes());
        self.combine(rhs, bytes)
    }
}

impl Sub for Size {
    type Output = Size;

    /// Saturates at zero; use `checked_sub` to detect underflow.
    fn sub(self, rhs: Size) -> Size {
        let bytes = self.to_bytes().saturating_sub(rhs.to_bytes());
        self.combine(rhs, bytes)
    }
}

impl PartialEq for Size {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Size {}

impl PartialOrd for Size {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Size {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

impl FromStr for Size {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        Size::parse(s, SectorSize::default())
    }
}
