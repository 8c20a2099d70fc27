use super::{pci_lists, NvmeOpts, NvmeOrchestrator, ScanOpts};
use crate::error::{BackendPhase, NvprepError, Result};
use crate::types::bdev::{BdevScanRequest, BdevScanResponse};
use crate::types::pci::PciAddressList;
use tracing::{debug, info, instrument};

impl NvmeOrchestrator {
    /// Enumerate NVMe controllers.
    ///
    /// Devices are bound for the duration of the scan and reset afterwards,
    /// unless `skip_prep` is set. A failed scan call returns at once without
    /// the reset.
    #[instrument(skip(self))]
    pub async fn scan(&self, opts: &ScanOpts) -> Result<BdevScanResponse> {
        self.check_hugepages_enabled()?;

        let device_list = match self.config.as_ref() {
            Some(cfg) => pci_lists::config_device_list(cfg)?,
            None => None,
        };

        if opts.skip_prep {
            debug!("Skipping device prepare and reset around scan");
            return self.scan_devices(device_list).await;
        }

        let prep_opts = NvmeOpts {
            target_user: Some(self.host.current_username()?),
            disable_vmd: opts.disable_vmd,
            ..Default::default()
        };
        let resolved = self.resolve(&prep_opts)?;

        self.prepare_resolved(&resolved, 0).await?;
        let resp = self.scan_devices(device_list).await?;
        self.reset_resolved(&resolved).await?;

        Ok(resp)
    }

    async fn scan_devices(&self, device_list: Option<PciAddressList>) -> Result<BdevScanResponse> {
        let resp = self
            .backend
            .scan(&BdevScanRequest { device_list })
            .await
            .map_err(|e| NvprepError::backend(BackendPhase::Scan, e))?;

        info!(controllers = resp.controllers.len(), "NVMe scan complete");
        Ok(resp)
    }
}
