use super::{hugepages, NvmeOpts, NvmeOrchestrator, ResolvedOpts};
use crate::error::{BackendPhase, NvprepError, Result};
use crate::types::bdev::{BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse};
use tracing::{info, instrument};

impl NvmeOrchestrator {
    /// Allocate hugepages and bind devices to a userspace driver.
    ///
    /// `nr_hugepages` is the command-line count, 0 when unset.
    #[instrument(skip(self))]
    pub async fn prepare(
        &self,
        opts: &NvmeOpts,
        nr_hugepages: u64,
    ) -> Result<BdevPrepareResponse> {
        self.check_hugepages_enabled()?;
        let resolved = self.resolve(opts)?;
        self.prepare_resolved(&resolved, nr_hugepages).await
    }

    pub(super) async fn prepare_resolved(
        &self,
        opts: &ResolvedOpts,
        nr_hugepages: u64,
    ) -> Result<BdevPrepareResponse> {
        self.clean(opts).await?;

        let mem = self.mem_info()?;
        let huge_nodes = hugepages::huge_nodes(nr_hugepages, &mem);
        let req = BdevPrepareRequest {
            op: BdevPrepareOp::Prepare { huge_nodes, enable_vmd: opts.enable_vmd },
            target_user: Some(opts.target_user.clone()),
            pci_allow_list: opts.lists.allow.clone(),
            pci_block_list: opts.lists.block.clone(),
            disable_vfio: opts.disable_vfio,
        };

        info!(
            hugepages = %huge_nodes,
            memory = %mem.summary(),
            enable_vmd = opts.enable_vmd,
            backend = self.backend.name(),
            "Preparing NVMe devices"
        );
        self.backend
            .prepare(&req)
            .await
            .map_err(|e| NvprepError::backend(BackendPhase::Prepare, e))
    }
}
