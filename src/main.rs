//! ArchLayout - Main entry point
//!
//! Command-line front end of the disk layout planner. Nothing here touches
//! a disk: plans are printed or written to a configuration file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use archlayout::cli::{Cli, Commands};
use archlayout::devices::{parse_lsblk_json, DeviceSpec};
use archlayout::engine::swap::RetrofitOutcome;
use archlayout::{
    apply_layout, apply_mount_plan, resolve_mount_order, retrofit_swap, suggest_disk_layout_config,
    BlockDevice, BtrfsMountOption, DefaultPrompt, DryRunHandler, FilesystemType, InstallerConfig,
    LayoutPreferences, SectorSize, Size, SwapConfiguration,
};

/// Initialize the logger: `info` by default, `RUST_LOG` overrides
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main application entry point
fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    match cli.command {
        Commands::Suggest {
            devices,
            lsblk,
            filesystem,
            swap,
            separate_home,
            btrfs_options,
            output,
            dry_run,
        } => {
            let devices = collect_devices(devices, lsblk.as_deref())?;
            let request = SuggestRequest {
                filesystem,
                swap,
                separate_home,
                btrfs_options,
            };
            run_suggest(&devices, request, output.as_deref(), dry_run)?;
        }
        Commands::AddSwap {
            config,
            size,
            output,
        } => run_add_swap(&config, size.as_deref(), output.as_deref())?,
        Commands::MountPlan { config, target } => run_mount_plan(&config, &target)?,
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            match InstallerConfig::load_from_file(&config).and_then(|c| c.validate()) {
                Ok(()) => {
                    info!("Configuration validation successful");
                    println!("✓ Configuration file is valid: {}", config.display());
                }
                Err(e) => {
                    error!("Configuration validation failed: {:#}", e);
                    eprintln!("✗ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Command-line preferences for `suggest`
struct SuggestRequest {
    filesystem: Option<FilesystemType>,
    swap: Option<SwapConfiguration>,
    separate_home: Option<bool>,
    btrfs_options: Vec<BtrfsMountOption>,
}

fn collect_devices(specs: Vec<DeviceSpec>, lsblk: Option<&Path>) -> Result<Vec<BlockDevice>> {
    let mut devices: Vec<BlockDevice> = specs.into_iter().map(BlockDevice::from).collect();

    if let Some(path) = lsblk {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lsblk output from {:?}", path))?;
        devices.extend(parse_lsblk_json(&json).context("Failed to parse lsblk output")?);
    }

    if devices.is_empty() {
        anyhow::bail!("No devices given; use --device or --lsblk");
    }
    Ok(devices)
}

fn run_suggest(
    devices: &[BlockDevice],
    request: SuggestRequest,
    output: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let swap = request.swap.unwrap_or_default();
    let mut prefs = LayoutPreferences {
        filesystem: request.filesystem,
        swap: Some(swap),
        separate_home: request.separate_home,
        mount_options: None,
    };
    if !request.btrfs_options.is_empty() {
        prefs.mount_options = Some(request.btrfs_options);
    }

    let disk_config = suggest_disk_layout_config(devices, &prefs, &DefaultPrompt::default())
        .context("Could not suggest a disk layout")?;
    info!("{}", disk_config.summary());

    if dry_run {
        let mut preview = disk_config.clone();
        let mut handler = DryRunHandler::new();
        apply_layout(&mut handler, &mut preview)?;
        for call in &handler.calls {
            eprintln!("[DRY RUN] {}", call);
        }
    }

    write_config(&InstallerConfig::new(disk_config, swap), output)
}

fn run_add_swap(path: &Path, size: Option<&str>, output: Option<&Path>) -> Result<()> {
    let mut config = InstallerConfig::load_from_file(path)?;

    if let Some(size) = size {
        config.swap_config =
            SwapConfiguration::partition(Size::parse_or_default(size, SectorSize::default()));
    }

    let retrofit = retrofit_swap(config.disk_config()?, &config.swap_config);
    match &retrofit.outcome {
        RetrofitOutcome::NotRequested => {
            println!("Swap type is '{}'; layout unchanged", config.swap_config.swap_type)
        }
        RetrofitOutcome::AlreadyPresent => println!("Layout already has a swap partition"),
        RetrofitOutcome::Added { device, index, .. } => {
            println!("✓ Added swap partition {} on {}", index + 1, device.display())
        }
        RetrofitOutcome::NotPlaced => {
            for rejection in &retrofit.rejections {
                eprintln!("✗ {}: {}", rejection.device.display(), rejection.reason);
            }
            println!("No device could take a swap partition; layout unchanged");
        }
    }

    config.disk_config = Some(retrofit.config);
    write_config(&config, output)
}

fn run_mount_plan(path: &Path, target: &Path) -> Result<()> {
    let config = InstallerConfig::load_from_file(path)?;
    let mut disk_config = config.disk_config()?.clone();

    // predict device nodes for partitions the handler has not created yet
    apply_layout(&mut DryRunHandler::new(), &mut disk_config)?;

    let ops = resolve_mount_order(&disk_config, target);
    let mut handler = DryRunHandler::new();
    apply_mount_plan(&mut handler, &ops)?;
    for call in &handler.calls {
        println!("{}", call);
    }
    Ok(())
}

fn write_config(config: &InstallerConfig, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            config.save_to_file(path)?;
            println!("✓ Configuration written to {}", path.display());
        }
        None => println!("{}", config.to_json()?),
    }
    Ok(())
}
