//! Hardware probe: CPU and memory figures the pool and its clients consult
//! when sizing work.

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, System};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Snapshot of the host taken at construction: logical and physical CPU
/// counts, physical memory and current memory load.
#[derive(Debug)]
pub struct SystemDescription {
    logical_cpus: usize,
    physical_cpus: usize,
    physical_memory_bytes: u64,
    memory_load_percent: u32,
}

impl SystemDescription {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());
        system.refresh_memory_specifics(MemoryRefreshKind::everything());

        let logical_cpus = system.cpus().len().max(1);
        let physical_cpus = system.physical_core_count().unwrap_or(logical_cpus);

        let total = system.total_memory();
        let used = system.used_memory();
        let memory_load_percent = if total > 0 {
            ((used as u128 * 100) / total as u128) as u32
        } else {
            0
        };

        SystemDescription {
            logical_cpus,
            physical_cpus,
            physical_memory_bytes: total,
            memory_load_percent,
        }
    }

    /// Number of logical processors.
    pub fn processor_count(&self) -> usize {
        self.logical_cpus
    }

    /// Whether the host exposes more logical processors than physical
    /// cores, i.e. SMT/hyper-threading is in play.
    pub fn hyperthreading_available(&self) -> bool {
        self.logical_cpus > self.physical_cpus
    }

    /// Total physical memory in bytes.
    pub fn physical_memory_bytes(&self) -> u64 {
        self.physical_memory_bytes
    }

    /// Memory in use as a percentage of total, 0..=100.
    pub fn memory_load(&self) -> u32 {
        self.memory_load_percent
    }

    /// Whether physical memory exceeds the given number of mebibytes.
    pub fn memory_exceeds(&self, mebibytes: u64) -> bool {
        self.physical_memory_bytes / BYTES_PER_MIB > mebibytes
    }
}

impl Default for SystemDescription {
    fn default() -> Self {
        SystemDescription::new()
    }
}
