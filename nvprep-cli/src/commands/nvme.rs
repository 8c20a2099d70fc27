//! `nvprep nvme` commands

use anyhow::{Context, Result};
use colored::Colorize;
use nvprep_core::{
    BdevPrepareResponse, NvmeController, NvmeOpts, NvmeOrchestrator, ScanOpts, ServerConfig,
    SysfsBackend, SystemHost, SystemMemInfo,
};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ControllerRow {
    #[tabled(rename = "PCI ADDRESS")]
    pci_addr: String,
    #[tabled(rename = "MODEL")]
    model: String,
    #[tabled(rename = "SERIAL")]
    serial: String,
    #[tabled(rename = "FIRMWARE")]
    fw_rev: String,
    #[tabled(rename = "SOCKET")]
    socket: String,
    #[tabled(rename = "DRIVER")]
    driver: String,
}

impl From<&NvmeController> for ControllerRow {
    fn from(c: &NvmeController) -> Self {
        Self {
            pci_addr: c.pci_addr.to_string(),
            model: or_dash(&c.model),
            serial: or_dash(&c.serial),
            fw_rev: or_dash(&c.fw_rev),
            socket: if c.socket_id < 0 { "-".to_string() } else { c.socket_id.to_string() },
            driver: c.driver.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Orchestrator wired to the running host.
pub fn system_orchestrator(config: Option<ServerConfig>) -> NvmeOrchestrator {
    NvmeOrchestrator::new(
        Arc::new(SysfsBackend::new()),
        Arc::new(SystemHost::new()),
        Arc::new(SystemMemInfo::new()),
        config,
    )
}

/// Prepare NVMe devices
pub async fn prepare(
    orchestrator: &NvmeOrchestrator,
    opts: &NvmeOpts,
    nr_hugepages: u64,
    json: bool,
) -> Result<()> {
    let resp = orchestrator.prepare(opts, nr_hugepages).await.context("nvme prepare")?;
    print_prepare_result(&resp, json, "NVMe devices prepared")
}

/// Reset NVMe devices
pub async fn reset(orchestrator: &NvmeOrchestrator, opts: &NvmeOpts, json: bool) -> Result<()> {
    let resp = orchestrator.reset(opts).await.context("nvme reset")?;
    print_prepare_result(&resp, json, "NVMe devices reset")
}

/// Scan NVMe devices
pub async fn scan(orchestrator: &NvmeOrchestrator, opts: &ScanOpts, json: bool) -> Result<()> {
    let resp = orchestrator.scan(opts).await.context("nvme scan")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resp.controllers)?);
        return Ok(());
    }

    if resp.controllers.is_empty() {
        println!("No NVMe controllers found");
        return Ok(());
    }

    println!("{}", controller_table(&resp.controllers));
    Ok(())
}

fn print_prepare_result(resp: &BdevPrepareResponse, json: bool, message: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resp)?);
        return Ok(());
    }

    println!("{} {}", "✓".green().bold(), message);
    if resp.vmd_prepared {
        println!("  {} VMD domain handled", "•".dimmed());
    }
    Ok(())
}

fn controller_table(controllers: &[NvmeController]) -> Table {
    let rows: Vec<ControllerRow> = controllers.iter().map(ControllerRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table
}
