//! Metrics Source Port
//!
//! Abstracts the OS-level sampling monitoring depends on (§4.8), so the
//! monitoring sampler can be tested without a real `sysinfo::System`.

/// A single OS-level sample: CPU, memory, and disk usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OsMetrics {
    /// Overall CPU utilization, 0.0-100.0.
    pub cpu_usage_percent: f32,
    /// Resident memory in use, in megabytes.
    pub memory_used_mb: f64,
    /// Total memory, in megabytes.
    pub memory_total_mb: f64,
    /// Free disk space on the export volume, in megabytes.
    pub disk_free_mb: f64,
}

/// Abstraction over OS metrics sampling, implemented with `sysinfo` in production.
pub trait MetricsSource: Send + Sync {
    /// Refresh internal counters and return a fresh sample.
    fn sample(&mut self) -> OsMetrics;
}
