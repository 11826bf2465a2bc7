mod commands;
mod common;
mod config;
mod execution;
mod logging;
mod plan;
mod ui;
mod usb;
mod wizard;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::common::paths::CONFIG_ENV;
use crate::config::Config;
use crate::execution::cleanup::{self, CleanupGuard};
use crate::execution::preflight;
use crate::ui::prelude::*;

/// Prepare a USB stick with storage, EFI and system partitions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for reports
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Configuration file (defaults to $BOOTSTICK_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print commands instead of changing any device
    #[arg(long, global = true)]
    dry_run: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Run the interactive wizard (default)
    Wizard,
    /// List removable USB disks
    Devices,
    /// Compute a layout and print the sfdisk script without writing it
    Plan {
        /// Read the size from this device
        #[arg(long, conflicts_with = "size", required_unless_present = "size")]
        device: Option<String>,
        /// Device size, e.g. 8000M or 16G
        #[arg(long)]
        size: Option<String>,
        /// Logical sector size used with --size
        #[arg(long, default_value_t = 512)]
        sector_size: u64,
        /// Leave out the storage partition
        #[arg(long)]
        no_storage: bool,
        /// Leave out the system partition
        #[arg(long)]
        no_system: bool,
        /// Keep unallocated space at the end
        #[arg(long)]
        free: bool,
    },
    /// Check whether the layout on a device can be reused
    Detect {
        /// Device path, e.g. /dev/sdb
        device: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    human_panic::setup_panic!();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        emit(Level::Error, "bootstick.error", &format!("Error: {:#}", e), None);
        cleanup::release_all();
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    ui::init(cli.output, cli.output == OutputFormat::Text);
    ui::set_debug_mode(cli.debug);

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = Config::load(config_path.as_deref())?;

    let command = cli.command.clone().unwrap_or(Commands::Wizard);
    let interactive = matches!(command, Commands::Wizard);

    if interactive && !cli.dry_run {
        preflight::ensure_root()?;
        preflight::check_tools(&config)?;
    }

    let verbosity = if cli.debug {
        cli.verbose.max(1)
    } else {
        cli.verbose
    };
    let _logger = logging::init(
        verbosity,
        &config.logging.file_path()?,
        !interactive && cli.verbose > 0,
    )?;
    let _cleanup = CleanupGuard::new();

    log::info!(target: "bootstick.start", "{:?}", command);

    match command {
        Commands::Wizard => commands::handle_wizard(config, cli.dry_run),
        Commands::Devices => commands::handle_devices(),
        Commands::Plan {
            device,
            size,
            sector_size,
            no_storage,
            no_system,
            free,
        } => commands::handle_plan(
            &config,
            commands::PlanArgs {
                device,
                size,
                sector_size,
                storage: !no_storage,
                system: !no_system,
                free,
            },
        ),
        Commands::Detect { device } => commands::handle_detect(&config, &device),
        Commands::Config => commands::handle_config(&config),
    }
}
