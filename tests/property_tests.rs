//! Property-Based Tests for ArchLayout
//!
//! Uses proptest for testing invariants over arbitrary devices and sizes.
//!
//! These tests verify:
//! - Size unit round-trips for 512 and 4096 byte sectors
//! - Suggested layouts never overlap and stay aligned
//! - Swap retrofit is idempotent
//! - Enum string round-trips (to_string → parse)

use proptest::prelude::*;

use archlayout::{
    retrofit_swap, suggest_disk_layout_config, BlockDevice, DefaultPrompt, FilesystemType,
    LayoutPreferences, PartitionTableType, RetrofitOutcome, SectorSize, Size, SwapConfiguration,
    Unit,
};

// =============================================================================
// Strategies
// =============================================================================

fn sector_size_strategy() -> impl Strategy<Value = SectorSize> {
    prop_oneof![Just(SectorSize::new(512)), Just(SectorSize::new(4096))]
}

fn table_strategy() -> impl Strategy<Value = PartitionTableType> {
    prop_oneof![Just(PartitionTableType::Gpt), Just(PartitionTableType::Mbr)]
}

/// Filesystems offered as the main filesystem
fn filesystem_strategy() -> impl Strategy<Value = FilesystemType> {
    prop_oneof![
        Just(FilesystemType::Ext4),
        Just(FilesystemType::Btrfs),
        Just(FilesystemType::Xfs),
        Just(FilesystemType::F2fs),
    ]
}

/// Devices from 16 GiB to 4 TiB, sizes not necessarily MiB-aligned
fn device_strategy() -> impl Strategy<Value = BlockDevice> {
    (16u64..4096, 0u64..2048, sector_size_strategy(), table_strategy()).prop_map(
        |(gib, extra_sectors, sector_size, table)| {
            let bytes = gib * (1 << 30) + extra_sectors * sector_size.bytes();
            BlockDevice::new("/dev/sda", Size::bytes(bytes, sector_size), sector_size, table)
        },
    )
}

fn prefs_strategy() -> impl Strategy<Value = LayoutPreferences> {
    (filesystem_strategy(), proptest::option::of(1u64..16), any::<bool>()).prop_map(
        |(filesystem, swap_gib, separate_home)| {
            let mut prefs = LayoutPreferences::default()
                .with_filesystem(filesystem)
                .with_separate_home(separate_home)
                .with_mount_options(vec![]);
            if let Some(gib) = swap_gib {
                prefs = prefs.with_swap(SwapConfiguration::partition(Size::gib(gib, SectorSize::default())));
            }
            prefs
        },
    )
}

// =============================================================================
// Size Property Tests
// =============================================================================

proptest! {
    /// GiB → sectors → GiB is lossless for whole GiB values
    #[test]
    fn size_sector_roundtrip(gib in 0u64..100_000, sector_size in sector_size_strategy()) {
        let size = Size::gib(gib, sector_size);
        let back = size.to(Unit::Sectors, sector_size).to(Unit::GiB, sector_size);
        prop_assert_eq!(back.value(), gib);
        prop_assert_eq!(back, size);
    }

    /// align() never grows a size and always lands on the boundary
    #[test]
    fn align_floors_to_boundary(bytes in 0u64..(1 << 42)) {
        let size = Size::bytes(bytes, SectorSize::default());
        let aligned = size.align();
        prop_assert!(aligned <= size);
        prop_assert!(aligned.is_aligned());
        prop_assert!(size.to_bytes() - aligned.to_bytes() < 1 << 20);
    }

    /// Parsing a rendered whole-unit size gives back the same byte count
    #[test]
    fn size_parse_display_roundtrip(value in 0u64..1_000_000, unit_index in 0usize..4) {
        let unit = [Unit::B, Unit::KiB, Unit::MiB, Unit::GiB][unit_index];
        let size = Size::new(value, unit, SectorSize::default());
        let parsed: Size = size.to_string().parse().expect("Should parse");
        prop_assert_eq!(parsed, size);
    }
}

// =============================================================================
// Layout Property Tests
// =============================================================================

proptest! {
    /// Suggested layouts hold together: aligned, inside the device, no overlap
    #[test]
    fn suggested_layout_is_consistent(device in device_strategy(), prefs in prefs_strategy()) {
        let Ok(config) = suggest_disk_layout_config(&[device.clone()], &prefs, &DefaultPrompt::default()) else {
            // only tiny devices with a large swap may be refused
            prop_assert!(prefs.swap.is_some());
            return Ok(());
        };

        prop_assert!(config.validate().is_ok());
        let partitions = &config.device_modifications[0].partitions;
        for pair in partitions.windows(2) {
            prop_assert!(pair[0].end() <= pair[1].start);
        }
        for partition in partitions {
            prop_assert!(partition.start.is_aligned());
            prop_assert!(partition.end() <= device.total_size);
        }
        if device.partition_table == PartitionTableType::Gpt {
            let last = partitions.last().expect("layout has partitions");
            prop_assert!(last.end() <= device.total_size.gpt_end());
        }
    }

    /// Retrofitting swap twice is the same as retrofitting once
    #[test]
    fn retrofit_is_idempotent(device in device_strategy(), swap_gib in 1u64..16) {
        let prefs = LayoutPreferences::default()
            .with_filesystem(FilesystemType::Ext4)
            .with_separate_home(false);
        let config = suggest_disk_layout_config(&[device], &prefs, &DefaultPrompt::default())
            .expect("layout without swap always fits");
        let swap = SwapConfiguration::partition(Size::gib(swap_gib, SectorSize::default()));

        let once = retrofit_swap(&config, &swap);
        prop_assert!(once.config.validate().is_ok());
        let twice = retrofit_swap(&once.config, &swap);

        prop_assert_eq!(&twice.config, &once.config);
        if once.is_added() {
            prop_assert_eq!(twice.outcome, RetrofitOutcome::AlreadyPresent);
        }
    }
}

// =============================================================================
// Enum Property Tests
// =============================================================================

proptest! {
    /// FilesystemType: to_string → parse round-trip is identity
    #[test]
    fn filesystem_roundtrip(fs in filesystem_strategy()) {
        let s = fs.to_string();
        let parsed: FilesystemType = s.parse().expect("Should parse");
        prop_assert_eq!(fs, parsed);
    }

    /// PartitionTableType: Display output parses back
    #[test]
    fn partition_table_roundtrip(table in table_strategy()) {
        let parsed: PartitionTableType = table.to_string().parse().expect("Should parse");
        prop_assert_eq!(table, parsed);
    }
}
