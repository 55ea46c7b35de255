//! Node load and capacity stats, served to the manager's schedulers.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// A snapshot of this node's load and remaining capacity.
///
/// The greedy scheduler reads `task_count`; the resource-fit scheduler
/// reads the capacity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Tasks currently scheduled or running on this node.
    pub task_count: usize,
    /// Physical cores.
    pub cpu_total: f64,
    /// Aggregate CPU usage, percent.
    pub cpu_usage: f64,
    /// Memory in bytes.
    pub memory_total: u64,
    pub memory_available: u64,
    /// Disk in bytes, summed over mounted disks.
    pub disk_total: u64,
    pub disk_available: u64,
}

/// Measure the node.
pub fn collect(task_count: usize) -> WorkerStats {
    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    let disks = Disks::new_with_refreshed_list();
    let disk_total: u64 = disks.iter().map(|d| d.total_space()).sum();
    let disk_available: u64 = disks.iter().map(|d| d.available_space()).sum();

    WorkerStats {
        task_count,
        cpu_total: sys.cpus().len() as f64,
        cpu_usage: sys.global_cpu_usage() as f64,
        memory_total: sys.total_memory(),
        memory_available: sys.available_memory(),
        disk_total,
        disk_available,
    }
}
