use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nvprep_core::{LogOptions, NvmeOpts, ScanOpts};
use std::path::PathBuf;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "nvprep")]
#[command(about = "Prepare, reset and scan NVMe devices for userspace I/O", long_about = None)]
struct Cli {
    /// Server config file
    #[arg(short = 'o', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Run without the server config
    #[arg(long, global = true, conflicts_with = "config")]
    ignore_config: bool,

    /// Print JSON on stdout
    #[arg(short, long, global = true)]
    json: bool,

    /// Write logs to a file instead of stderr
    #[arg(short = 'l', long = "log-file", global = true)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage NVMe devices
    #[command(subcommand)]
    Nvme(NvmeCommands),
}

#[derive(Subcommand, Debug)]
enum NvmeCommands {
    /// Bind NVMe devices to a userspace driver and allocate hugepages
    Prepare {
        #[command(flatten)]
        devices: DeviceArgs,

        /// Hugepages to allocate on NUMA node 0
        #[arg(short = 'p', long)]
        hugepages: Option<u64>,
    },

    /// Return NVMe devices to the kernel driver
    Reset {
        #[command(flatten)]
        devices: DeviceArgs,
    },

    /// List NVMe controllers
    Scan {
        /// Don't enable VMD while scanning
        #[arg(long)]
        disable_vmd: bool,

        /// Scan without binding devices first
        #[arg(long)]
        skip_prep: bool,
    },
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// PCI addresses to act on (comma separated)
    pci_allow_list: Option<String>,

    /// PCI addresses to leave alone (comma separated)
    #[arg(short = 'b', long)]
    pci_block_list: Option<String>,

    /// User that should own the devices afterwards
    #[arg(short = 'u', long)]
    target_user: Option<String>,

    /// Use a UIO driver instead of vfio-pci (root only)
    #[arg(long)]
    disable_vfio: bool,
}

impl From<DeviceArgs> for NvmeOpts {
    fn from(args: DeviceArgs) -> Self {
        NvmeOpts {
            pci_allow_list: args.pci_allow_list,
            pci_block_list: args.pci_block_list,
            target_user: args.target_user,
            disable_vfio: args.disable_vfio,
            disable_vmd: false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    nvprep_core::init_logging(&LogOptions { debug: cli.debug, log_file: cli.log_file.clone() })?;

    let config = commands::load_config(cli.config.as_deref(), cli.ignore_config)?;
    let orchestrator = commands::nvme::system_orchestrator(config);

    match cli.command {
        Commands::Nvme(nvme_cmd) => match nvme_cmd {
            NvmeCommands::Prepare { devices, hugepages } => {
                let opts = NvmeOpts::from(devices);
                commands::nvme::prepare(&orchestrator, &opts, hugepages.unwrap_or(0), cli.json)
                    .await?;
            }

            NvmeCommands::Reset { devices } => {
                commands::nvme::reset(&orchestrator, &NvmeOpts::from(devices), cli.json).await?;
            }

            NvmeCommands::Scan { disable_vmd, skip_prep } => {
                let opts = ScanOpts { disable_vmd, skip_prep };
                commands::nvme::scan(&orchestrator, &opts, cli.json).await?;
            }
        },
    }

    Ok(())
}
