//! `sysinfo`-backed OS metrics sampling for Monitoring (C8, §4.8).

use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

use crate::ports::metrics_source::{MetricsSource, OsMetrics};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Samples CPU, memory, and disk usage for the volume backing `export_root`.
pub struct SysinfoMetrics {
    system: System,
    disks: Disks,
    export_root: PathBuf,
}

impl SysinfoMetrics {
    /// Create a sampler that reports free space on the disk holding `export_root`.
    pub fn new(export_root: impl AsRef<Path>) -> Self {
        let mut system = System::new_all();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            export_root: export_root.as_ref().to_path_buf(),
        }
    }

    fn cpu_usage_percent(&self) -> f32 {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        }
    }

    fn disk_free_mb(&self) -> f64 {
        let mut best: Option<(usize, u64)> = None;
        for disk in self.disks.list() {
            let mount = disk.mount_point();
            if self.export_root.starts_with(mount) {
                let depth = mount.components().count();
                if best.map(|(d, _)| depth > d).unwrap_or(true) {
                    best = Some((depth, disk.available_space()));
                }
            }
        }
        best.map(|(_, bytes)| bytes as f64 / BYTES_PER_MB)
            .unwrap_or(0.0)
    }
}

impl MetricsSource for SysinfoMetrics {
    fn sample(&mut self) -> OsMetrics {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh(true);

        let cpu_usage_percent = self.cpu_usage_percent();
        let memory_used_mb = self.system.used_memory() as f64 / BYTES_PER_MB;
        let memory_total_mb = self.system.total_memory() as f64 / BYTES_PER_MB;
        let disk_free_mb = self.disk_free_mb();

        OsMetrics {
            cpu_usage_percent,
            memory_used_mb,
            memory_total_mb,
            disk_free_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_plausible_memory_totals() {
        let mut metrics = SysinfoMetrics::new(std::env::temp_dir());
        let sample = metrics.sample();
        assert!(sample.memory_total_mb > 0.0);
        assert!(sample.memory_used_mb <= sample.memory_total_mb * 1.05);
    }
}
