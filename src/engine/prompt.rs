//! Decision points the layout suggesters consult
//!
//! The interactive menus live outside this crate. When a preference was not
//! supplied up front, the suggesters ask a `LayoutPrompt` instead of reading
//! ambient state.

use crate::types::{BtrfsMountOption, FilesystemType};

/// Questions a suggester may need answered while planning.
///
/// # Contract
///
/// - Each method is called at most once per suggestion.
/// - Implementations must not fail; a cancelled question maps to the
///   conservative answer.
pub trait LayoutPrompt {
    /// Main filesystem for root (and home) when none was preselected
    fn select_filesystem(&self) -> FilesystemType;

    /// Whether a separate `/home` partition should be created
    fn confirm_separate_home(&self) -> bool;

    /// Mount options for btrfs partitions (compression, CoW)
    fn select_btrfs_mount_options(&self) -> Vec<BtrfsMountOption>;
}

/// Non-interactive answers, used by headless runs and the CLI.
///
/// Defaults mirror the focused choice of the interactive menus: ext4, a
/// separate home partition when the disk allows one, no extra btrfs options.
#[derive(Debug, Clone, Default)]
pub struct DefaultPrompt {
    pub filesystem: FilesystemType,
    pub separate_home: Option<bool>,
    pub btrfs_mount_options: Vec<BtrfsMountOption>,
}

impl LayoutPrompt for DefaultPrompt {
    fn select_filesystem(&self) -> FilesystemType {
        self.filesystem
    }

    fn confirm_separate_home(&self) -> bool {
        self.separate_home.unwrap_or(true)
    }

    fn select_btrfs_mount_options(&self) -> Vec<BtrfsMountOption> {
        self.btrfs_mount_options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_answers() {
        let prompt = DefaultPrompt::default();
        assert_eq!(prompt.select_filesystem(), FilesystemType::Ext4);
        assert!(prompt.confirm_separate_home());
        assert!(prompt.select_btrfs_mount_options().is_empty());
    }

    #[test]
    fn test_default_prompt_overrides() {
        let prompt = DefaultPrompt {
            filesystem: FilesystemType::Xfs,
            separate_home: Some(false),
            btrfs_mount_options: vec![BtrfsMountOption::Compress],
        };
        assert_eq!(prompt.select_filesystem(), FilesystemType::Xfs);
        assert!(!prompt.confirm_separate_home());
        assert_eq!(prompt.select_btrfs_mount_options(), vec![BtrfsMountOption::Compress]);
    }
}
