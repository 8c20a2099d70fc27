use super::{vmd, NvmeOpts, NvmeOrchestrator, ResolvedOpts};
use crate::error::{BackendPhase, NvprepError, Result};
use crate::types::bdev::{BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse};
use tracing::{info, instrument};

impl NvmeOrchestrator {
    /// Return devices to their kernel drivers.
    ///
    /// Returns the response of the first reset call.
    #[instrument(skip(self))]
    pub async fn reset(&self, opts: &NvmeOpts) -> Result<BdevPrepareResponse> {
        self.check_hugepages_enabled()?;
        let resolved = self.resolve(opts)?;
        self.reset_resolved(&resolved).await
    }

    pub(super) async fn reset_resolved(&self, opts: &ResolvedOpts) -> Result<BdevPrepareResponse> {
        self.clean(opts).await?;

        let first = BdevPrepareRequest {
            op: BdevPrepareOp::Reset { enable_vmd: opts.enable_vmd },
            target_user: Some(opts.target_user.clone()),
            pci_allow_list: opts.lists.allow.clone(),
            pci_block_list: opts.lists.block.clone(),
            disable_vfio: opts.disable_vfio,
        };

        info!(enable_vmd = opts.enable_vmd, backend = self.backend.name(), "Resetting NVMe devices");
        let resp = self
            .backend
            .prepare(&first)
            .await
            .map_err(|e| NvprepError::backend(BackendPhase::Reset, e))?;

        if let Some(second) = vmd::second_reset(&first, &resp) {
            info!("VMD domain was acted on, resetting again without address filter");
            self.backend
                .prepare(&second)
                .await
                .map_err(|e| NvprepError::backend(BackendPhase::VmdReset, e))?;
        }

        Ok(resp)
    }
}
