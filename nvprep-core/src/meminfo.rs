//! Hugepage and RAM statistics from procfs and sysfs.
//!
//! System figures come from `/proc/meminfo`. Per-NUMA-node figures come from
//! `/sys/devices/system/node/node<N>/meminfo`, whose lines carry a
//! `Node <N> ` prefix.

use crate::error::{NvprepError, Result};
use crate::types::meminfo::{MemInfo, SysMemInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

static NODE_DIR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^node(\d+)$").expect("Invalid node dir regex"));

static NODE_PREFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Node (\d+) ").expect("Invalid node prefix regex"));

/// Source of memory snapshots.
///
/// `Ok(None)` means no information could be produced; callers treat that as
/// [`NvprepError::MemInfoUnavailable`] rather than guessing.
pub trait MemInfoProvider: Send + Sync {
    fn sys_mem_info(&self) -> Result<Option<SysMemInfo>>;
}

/// Reads memory info from the running system.
#[derive(Debug, Clone)]
pub struct SystemMemInfo {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for SystemMemInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMemInfo {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Read from alternative procfs and sysfs mount points.
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self { proc_root: proc_root.into(), sys_root: sys_root.into() }
    }

    /// Read the system-wide snapshot and every per-node snapshot.
    pub fn read(&self) -> Result<SysMemInfo> {
        let system = read_mem_info(&self.proc_root.join("meminfo"))?;
        let numa_nodes = self.read_nodes()?;

        let smi = SysMemInfo { system, numa_nodes };
        debug!(summary = %smi.summary(), "Read system memory info");
        Ok(smi)
    }

    fn read_nodes(&self) -> Result<Vec<MemInfo>> {
        let nodes_path = self.sys_root.join("devices/system/node");
        if !nodes_path.exists() {
            return Ok(Vec::new());
        }

        let mut node_dirs: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&nodes_path)
            .map_err(|e| NvprepError::IoError { path: nodes_path.clone(), source: e })?
        {
            let entry = entry.map_err(NvprepError::internal)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(caps) = NODE_DIR_REGEX.captures(&name) {
                let idx: u32 = caps[1].parse().map_err(NvprepError::internal)?;
                node_dirs.push((idx, entry.path()));
            }
        }
        node_dirs.sort_by_key(|(idx, _)| *idx);

        let mut nodes = Vec::with_capacity(node_dirs.len());
        for (_, dir) in node_dirs {
            let path = dir.join("meminfo");
            if path.is_dir() {
                return Err(NvprepError::MemInfoParse {
                    path,
                    reason: "expected a file but found a directory".to_string(),
                });
            }
            if !path.exists() {
                continue;
            }

            let mi = read_mem_info(&path)?;
            if mi.numa_node_index.is_none() {
                return Err(NvprepError::MemInfoParse {
                    path,
                    reason: "missing numa node id in meminfo file".to_string(),
                });
            }
            nodes.push(mi);
        }

        Ok(nodes)
    }
}

impl MemInfoProvider for SystemMemInfo {
    fn sys_mem_info(&self) -> Result<Option<SysMemInfo>> {
        self.read().map(Some)
    }
}

/// Provider returning a fixed snapshot, for callers that already hold one.
#[derive(Debug, Clone, Default)]
pub struct StaticMemInfo(pub Option<SysMemInfo>);

impl MemInfoProvider for StaticMemInfo {
    fn sys_mem_info(&self) -> Result<Option<SysMemInfo>> {
        Ok(self.0.clone())
    }
}

/// Read and parse a single meminfo file.
pub fn read_mem_info(path: &Path) -> Result<MemInfo> {
    let content = fs::read_to_string(path)
        .map_err(|e| NvprepError::IoError { path: path.to_path_buf(), source: e })?;
    parse_mem_info(&content)
        .map_err(|reason| NvprepError::MemInfoParse { path: path.to_path_buf(), reason })
}

/// Parse meminfo content. Unknown keys and unparsable counts are ignored.
pub fn parse_mem_info(content: &str) -> std::result::Result<MemInfo, String> {
    let mut mi = MemInfo::default();

    for raw in content.lines() {
        let mut line = raw;

        if let Some(caps) = NODE_PREFIX_REGEX.captures(raw) {
            let id: u32 = caps[1].parse().map_err(|e| format!("bad node id: {}", e))?;
            match mi.numa_node_index {
                None => mi.numa_node_index = Some(id),
                Some(existing) if existing != id => {
                    return Err("unexpected mix of node ids in meminfo file".to_string());
                }
                Some(_) => {}
            }
            line = &raw[caps[0].len()..];
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        match key {
            "HugePages_Total" => parse_count(value, &mut mi.hugepages_total),
            "HugePages_Free" => parse_count(value, &mut mi.hugepages_free),
            "HugePages_Rsvd" => parse_count(value, &mut mi.hugepages_reserved),
            "HugePages_Surp" => parse_count(value, &mut mi.hugepages_surplus),
            "Hugepagesize" | "MemTotal" | "MemFree" | "MemAvailable" | "MemUsed" => {
                let fields: Vec<&str> = value.split_whitespace().collect();
                if fields.len() != 2 {
                    return Err(format!("unable to parse {:?}", value));
                }
                // units are hard-coded to kB in the kernel
                if fields[1] != "kB" {
                    return Err(format!("unhandled size unit {:?}", fields[1]));
                }
                let target = match key {
                    "Hugepagesize" => &mut mi.hugepage_size_kib,
                    "MemTotal" => &mut mi.mem_total_kib,
                    "MemFree" => &mut mi.mem_free_kib,
                    "MemAvailable" => &mut mi.mem_available_kib,
                    _ => &mut mi.mem_used_kib,
                };
                parse_count(fields[0], target);
            }
            _ => continue,
        }
    }

    Ok(mi)
}

fn parse_count(value: &str, target: &mut u64) {
    if let Ok(v) = value.trim().parse() {
        *target = v;
    }
}
