//! Shared fixtures for the NVMe command tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nvprep_core::{
    BdevBackend, BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse, BdevScanRequest,
    BdevScanResponse, HostEnv, HugeNodes, MemInfo, NvmeController, NvmeOrchestrator,
    NvprepError, PciAddressList, Result, ServerConfig, StaticMemInfo, SysMemInfo, UserIds,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Non-root user the tests run as.
pub const CURRENT_USER: &str = "alice";

pub const ADDR_1: &str = "0000:01:00.0";
pub const ADDR_2: &str = "0000:02:00.0";
pub const MULTI_ADDR_CLI: &str = "0000:01:00.0,0000:02:00.0";

/// Accounts known to [`MockHost`].
pub const KNOWN_USERS: [&str; 3] = ["root", CURRENT_USER, "bob"];

/// Host probe with a fixed user and IOMMU state.
pub struct MockHost {
    user: String,
    iommu: bool,
}

impl MockHost {
    pub fn new(user: &str) -> Self {
        Self { user: user.to_string(), iommu: true }
    }

    pub fn without_iommu(mut self) -> Self {
        self.iommu = false;
        self
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new(CURRENT_USER)
    }
}

impl HostEnv for MockHost {
    fn current_username(&self) -> Result<String> {
        Ok(self.user.clone())
    }

    fn running_as_root(&self) -> bool {
        self.user == "root"
    }

    fn iommu_enabled(&self) -> Result<bool> {
        Ok(self.iommu)
    }

    fn resolve_user(&self, name: &str) -> Result<UserIds> {
        let pos = KNOWN_USERS.iter().position(|u| *u == name).ok_or_else(|| {
            NvprepError::UserLookup { user: name.to_string(), reason: "no such user".to_string() }
        })?;
        let id = if pos == 0 { 0 } else { 1000 + pos as u32 };
        Ok(UserIds { uid: id, gid: id })
    }
}

/// Canned results for [`MockBackend`]. Errors are given as messages and
/// surface as [`NvprepError::Internal`].
#[derive(Debug, Clone, Default)]
pub struct MockBackendConfig {
    pub clean_err: Option<String>,
    pub prepare_res: Option<BdevPrepareResponse>,
    pub prepare_err: Option<String>,
    pub reset_res: Option<BdevPrepareResponse>,
    pub reset_err: Option<String>,
    pub scan_res: Option<BdevScanResponse>,
    pub scan_err: Option<String>,
}

/// Kind of a backend call, in the order received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Clean,
    Prepare,
    Reset,
    Scan,
}

/// Calls received by a [`MockBackend`].
///
/// Clean and prepare requests land in `prepare_calls`, reset requests in
/// `reset_calls`. `sequence` records every call across all three lists.
#[derive(Debug, Default)]
pub struct MockCalls {
    pub prepare_calls: Vec<BdevPrepareRequest>,
    pub reset_calls: Vec<BdevPrepareRequest>,
    pub scan_calls: Vec<BdevScanRequest>,
    pub sequence: Vec<MockCall>,
}

/// Backend that records requests and answers from a [`MockBackendConfig`].
#[derive(Debug, Default)]
pub struct MockBackend {
    config: MockBackendConfig,
    calls: Mutex<MockCalls>,
}

impl MockBackend {
    pub fn new(config: MockBackendConfig) -> Self {
        Self { config, calls: Mutex::new(MockCalls::default()) }
    }

    pub fn calls(&self) -> MutexGuard<'_, MockCalls> {
        self.calls.lock().unwrap()
    }
}

fn canned<T: Clone + Default>(err: &Option<String>, res: &Option<T>) -> Result<T> {
    match err {
        Some(msg) => Err(NvprepError::Internal(msg.clone())),
        None => Ok(res.clone().unwrap_or_default()),
    }
}

#[async_trait]
impl BdevBackend for MockBackend {
    async fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        let mut calls = self.calls();
        if req.is_reset() {
            calls.sequence.push(MockCall::Reset);
            calls.reset_calls.push(req.clone());
            return canned(&self.config.reset_err, &self.config.reset_res);
        }

        calls.prepare_calls.push(req.clone());
        if req.is_clean() {
            calls.sequence.push(MockCall::Clean);
            return canned(&self.config.clean_err, &None);
        }
        calls.sequence.push(MockCall::Prepare);
        canned(&self.config.prepare_err, &self.config.prepare_res)
    }

    async fn scan(&self, req: &BdevScanRequest) -> Result<BdevScanResponse> {
        let mut calls = self.calls();
        calls.sequence.push(MockCall::Scan);
        calls.scan_calls.push(req.clone());
        canned(&self.config.scan_err, &self.config.scan_res)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Two NUMA nodes, 1024 hugepages all on node 0.
pub fn def_sys_mem_info() -> SysMemInfo {
    SysMemInfo {
        system: MemInfo { hugepages_total: 1024, hugepage_size_kib: 2048, ..Default::default() },
        numa_nodes: vec![
            MemInfo { numa_node_index: Some(0), hugepages_total: 1024, ..Default::default() },
            MemInfo { numa_node_index: Some(1), hugepages_total: 0, ..Default::default() },
        ],
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub orchestrator: NvmeOrchestrator,
}

pub struct HarnessBuilder {
    backend_cfg: MockBackendConfig,
    host: MockHost,
    mem: Option<SysMemInfo>,
    config: Option<ServerConfig>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            backend_cfg: MockBackendConfig::default(),
            host: MockHost::default(),
            mem: Some(def_sys_mem_info()),
            config: None,
        }
    }

    pub fn backend(mut self, cfg: MockBackendConfig) -> Self {
        self.backend_cfg = cfg;
        self
    }

    pub fn host(mut self, host: MockHost) -> Self {
        self.host = host;
        self
    }

    pub fn mem(mut self, mem: Option<SysMemInfo>) -> Self {
        self.mem = mem;
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Harness {
        let backend = Arc::new(MockBackend::new(self.backend_cfg));
        let orchestrator = NvmeOrchestrator::new(
            backend.clone(),
            Arc::new(self.host),
            Arc::new(StaticMemInfo(self.mem)),
            self.config,
        );
        Harness { backend, orchestrator }
    }
}

pub fn list(addrs: &[&str]) -> Option<PciAddressList> {
    Some(PciAddressList::from_strings(addrs).unwrap())
}

pub fn clean_call(
    allow: Option<PciAddressList>,
    block: Option<PciAddressList>,
) -> BdevPrepareRequest {
    BdevPrepareRequest::clean(allow, block)
}

/// Prepare request as sent for [`CURRENT_USER`] without lists.
pub fn prepare_call(count: u64, enable_vmd: bool) -> BdevPrepareRequest {
    BdevPrepareRequest {
        op: BdevPrepareOp::Prepare { huge_nodes: HugeNodes::node0(count), enable_vmd },
        target_user: Some(CURRENT_USER.to_string()),
        pci_allow_list: None,
        pci_block_list: None,
        disable_vfio: false,
    }
}

pub fn reset_call(user: &str, enable_vmd: bool) -> BdevPrepareRequest {
    BdevPrepareRequest {
        op: BdevPrepareOp::Reset { enable_vmd },
        target_user: Some(user.to_string()),
        pci_allow_list: None,
        pci_block_list: None,
        disable_vfio: false,
    }
}

pub fn mock_controller(idx: u8) -> NvmeController {
    NvmeController {
        pci_addr: format!("0000:{:02x}:00.0", idx).parse().unwrap(),
        model: format!("model-{}", idx),
        serial: format!("serial-{}", idx),
        fw_rev: format!("fwRev-{}", idx),
        vendor_id: "8086".to_string(),
        device_id: "0a54".to_string(),
        socket_id: i32::from(idx % 2),
        driver: None,
    }
}
