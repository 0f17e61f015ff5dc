//! Configuration file handling for saving and loading installer configs.
//!
//! Only the sections the layout engine owns are modelled: `disk_config` and
//! `swap_config`. Other keys of a full installer config are ignored on load.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::model::{DiskLayoutConfiguration, SwapConfiguration};

/// Installer configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default)]
    pub disk_config: Option<DiskLayoutConfiguration>,
    #[serde(default)]
    pub swap_config: SwapConfiguration,
}

impl InstallerConfig {
    pub fn new(disk_config: DiskLayoutConfiguration, swap_config: SwapConfiguration) -> Self {
        Self {
            disk_config: Some(disk_config),
            swap_config,
        }
    }

    /// Pretty-printed JSON, as written to disk
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize configuration to JSON")
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// The disk layout, or an error naming the missing section
    pub fn disk_config(&self) -> Result<&DiskLayoutConfiguration> {
        self.disk_config
            .as_ref()
            .context("Configuration has no disk_config section")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let disk_config = self.disk_config()?;

        if disk_config.device_modifications.is_empty() {
            anyhow::bail!("Disk layout must include at least one device");
        }

        let mut seen = BTreeSet::new();
        for modification in &disk_config.device_modifications {
            let path = modification.device_path();
            if path.as_os_str().is_empty() {
                anyhow::bail!("Device path must be specified");
            }
            if !seen.insert(path) {
                anyhow::bail!("Device {} appears more than once", path.display());
            }
        }

        disk_config
            .validate()
            .context("Disk layout failed validation")?;

        if !disk_config
            .device_modifications
            .iter()
            .any(|m| m.has_root())
        {
            anyhow::bail!("Disk layout has no root partition");
        }

        if self.swap_config.is_partition() && !disk_config.has_swap_partition() {
            warn!("Swap is configured as a partition but the layout has none; run add-swap");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{BlockDevice, DeviceModification, PartitionModification};
    use crate::engine::size::{SectorSize, Size};
    use crate::types::{DiskLayoutType, PartitionTableType, SwapType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SS: SectorSize = SectorSize::new(512);

    fn create_test_config() -> InstallerConfig {
        let device = BlockDevice::new("/dev/sda", Size::gib(20, SS), SS, PartitionTableType::Gpt);
        let mut modification = DeviceModification::new(device, true);
        modification.add_partition(
            PartitionModification::new(Size::mib(1, SS), Size::gib(10, SS)).with_mountpoint("/"),
        );
        InstallerConfig::new(
            DiskLayoutConfiguration::new(DiskLayoutType::Default, vec![modification]),
            SwapConfiguration::default(),
        )
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_disk_config() {
        let config = InstallerConfig::default();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("disk_config"));
    }

    #[test]
    fn test_validation_duplicate_device() {
        let mut config = create_test_config();
        let disk = config.disk_config.as_mut().unwrap();
        let copy = disk.device_modifications[0].clone();
        disk.device_modifications.push(copy);
        assert!(config.validate().unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validation_requires_root() {
        let mut config = create_test_config();
        let disk = config.disk_config.as_mut().unwrap();
        disk.device_modifications[0].partitions[0].mountpoint = Some("/data".into());
        assert!(config.validate().unwrap_err().to_string().contains("root"));
    }

    #[test]
    fn test_roundtrip_save_load() {
        let original = create_test_config();
        let temp_file = NamedTempFile::new().unwrap();

        original.save_to_file(temp_file.path()).unwrap();
        let loaded = InstallerConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_ignores_unrelated_sections() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{"hostname": "archbox", "swap_config": {"swap_type": "partition", "size": "2G"}}"#)
            .unwrap();
        temp_file.flush().unwrap();

        let loaded = InstallerConfig::load_from_file(temp_file.path()).unwrap();
        assert!(loaded.disk_config.is_none());
        assert_eq!(loaded.swap_config.swap_type, SwapType::Partition);
        assert_eq!(loaded.swap_config.size, Size::gib(2, SS));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = InstallerConfig::load_from_file(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ invalid json }").unwrap();
        temp_file.flush().unwrap();

        let result = InstallerConfig::load_from_file(temp_file.path());
        assert!(result.is_err());
    }
}
