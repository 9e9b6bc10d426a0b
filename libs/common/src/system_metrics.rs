//! System resource checks for daily housekeeping
//!
//! Memory and disk figures come from the sysinfo crate.

use std::path::Path;

use serde::Serialize;
use sysinfo::{Disks, System};

/// System resource snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    /// Total system memory (MB)
    pub memory_total_mb: u64,
    /// Memory available to new allocations (MB)
    pub memory_available_mb: u64,
}

impl SystemMetrics {
    /// Collect current memory figures
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            memory_total_mb: sys.total_memory() / 1024 / 1024,
            memory_available_mb: sys.available_memory() / 1024 / 1024,
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::collect()
    }
}

/// Free space on the filesystem holding `path`, in MB
///
/// Picks the disk with the longest mount point that prefixes the
/// canonicalized path. Returns `None` when no disk matches.
pub fn available_space_mb(path: &Path) -> Option<u64> {
    let resolved = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / 1024 / 1024)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_memory() {
        let metrics = SystemMetrics::collect();
        assert!(metrics.memory_total_mb >= metrics.memory_available_mb);
    }

    #[test]
    fn test_missing_path_has_no_disk() {
        assert_eq!(available_space_mb(Path::new("/definitely/not/here")), None);
    }
}
