//! Prometheus metrics definitions for herakles-proc-monitor.
//!
//! Per-process gauges mirror the rows of the last published display frame.

use herakles_proc_monitor::DisplayFrame;
use prometheus::{GaugeVec, Opts, Registry};

/// Per-process gauges.
#[derive(Clone)]
pub struct MonitorMetrics {
    pub cpu_slope: GaugeVec,
    pub cpu_user_slope: GaugeVec,
    pub cpu_kernel_slope: GaugeVec,
    pub cpu_time: GaugeVec,
    pub resident: GaugeVec,
    pub resident_delta: GaugeVec,
    pub virtual_memory: GaugeVec,
    pub threads: GaugeVec,
    pub hung: GaugeVec,
}

impl MonitorMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let labels = &["pid", "name", "type"];

        let gauge = |name: &str, help: &str| GaugeVec::new(Opts::new(name, help), labels);

        let metrics = Self {
            cpu_slope: gauge(
                "herakles_proc_monitor_cpu_cores",
                "CPU use per process in cores (user + kernel) over the retention window",
            )?,
            cpu_user_slope: gauge(
                "herakles_proc_monitor_cpu_user_cores",
                "User CPU use per process in cores over the retention window",
            )?,
            cpu_kernel_slope: gauge(
                "herakles_proc_monitor_cpu_kernel_cores",
                "Kernel CPU use per process in cores over the retention window",
            )?,
            cpu_time: gauge(
                "herakles_proc_monitor_cpu_time_seconds",
                "Total CPU time used per process",
            )?,
            resident: gauge(
                "herakles_proc_monitor_resident_bytes",
                "Resident set size per process in bytes",
            )?,
            resident_delta: gauge(
                "herakles_proc_monitor_resident_delta_bytes",
                "Resident set size change per process over the retention window",
            )?,
            virtual_memory: gauge(
                "herakles_proc_monitor_virtual_bytes",
                "Virtual memory size per process in bytes",
            )?,
            threads: gauge(
                "herakles_proc_monitor_threads",
                "Number of threads per process",
            )?,
            hung: gauge(
                "herakles_proc_monitor_hung",
                "Whether the process was reported hung during the last display pass",
            )?,
        };

        registry.register(Box::new(metrics.cpu_slope.clone()))?;
        registry.register(Box::new(metrics.cpu_user_slope.clone()))?;
        registry.register(Box::new(metrics.cpu_kernel_slope.clone()))?;
        registry.register(Box::new(metrics.cpu_time.clone()))?;
        registry.register(Box::new(metrics.resident.clone()))?;
        registry.register(Box::new(metrics.resident_delta.clone()))?;
        registry.register(Box::new(metrics.virtual_memory.clone()))?;
        registry.register(Box::new(metrics.threads.clone()))?;
        registry.register(Box::new(metrics.hung.clone()))?;

        Ok(metrics)
    }

    /// Clears all label sets so that exited processes disappear.
    pub fn reset(&self) {
        self.cpu_slope.reset();
        self.cpu_user_slope.reset();
        self.cpu_kernel_slope.reset();
        self.cpu_time.reset();
        self.resident.reset();
        self.resident_delta.reset();
        self.virtual_memory.reset();
        self.threads.reset();
        self.hung.reset();
    }

    /// Replaces all gauges with the rows of `frame`. Returns the number of
    /// exported processes.
    pub fn publish(&self, frame: &DisplayFrame) -> usize {
        self.reset();

        for row in &frame.rows {
            let p = &row.process;
            let pid = p.pid.to_string();
            let labels = &[pid.as_str(), p.name(), p.process_type.as_str()];

            // Slopes are unknown for processes seen only once.
            if let Some(slope) = p.slope_cpu {
                self.cpu_slope.with_label_values(labels).set(slope);
            }
            if let Some(slope) = p.slope_cpu_user {
                self.cpu_user_slope.with_label_values(labels).set(slope);
            }
            if let Some(slope) = p.slope_cpu_kernel {
                self.cpu_kernel_slope.with_label_values(labels).set(slope);
            }
            if let Some(delta) = p.delta_resident_size {
                self.resident_delta
                    .with_label_values(labels)
                    .set(delta as f64);
            }
            self.cpu_time
                .with_label_values(labels)
                .set(p.total_cpu as f64 / 1e9);
            self.resident
                .with_label_values(labels)
                .set(p.total_resident_size as f64);
            self.virtual_memory
                .with_label_values(labels)
                .set(p.total_virtual_memory_size as f64);
            self.threads
                .with_label_values(labels)
                .set(p.threads.len() as f64);
            self.hung
                .with_label_values(labels)
                .set(if row.is_hung { 1.0 } else { 0.0 });
        }

        frame.rows.len()
    }
}
