//! Host sampler: one refresh per host interval.
//!
//! Each query is best-effort. A `None` from the platform becomes the zero
//! value for that field and the rest of the cycle proceeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::counters::{CounterRate, TickSnapshot, per_core_utilization, utilization};
use crate::history::{PerCoreHistory, RollingHistory};
use crate::platform::{HostPlatform, LoadAverage, ThermalState};
use crate::topology::{CoreTopology, CpuIdentity};

/// Flat per-cycle stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    /// Completed refreshes since the sampler was created.
    pub cycle: u64,
    pub cpu_usage: f64,
    pub core_usage: Vec<f64>,
    pub ram_used_bytes: u64,
    pub ram_total_bytes: u64,
    pub load: LoadAverage,
    pub uptime_secs: u64,
    pub thermal: ThermalState,
    pub process_count: usize,
    /// Context switches across all processes since the previous cycle.
    pub context_switch_rate: u64,
    pub gpu_utilization: f64,
    /// Signed; negative while discharging.
    pub battery_amperage_ma: i64,
    pub neural_engine_active: bool,
}

/// Everything the host sampler publishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostTelemetry {
    pub stats: HostStats,
    pub topology: Option<CoreTopology>,
    pub cpu: CpuIdentity,
    pub cpu_history: Vec<f64>,
    pub core_history: Vec<Vec<f64>>,
    pub load_history: Vec<LoadAverage>,
}

pub struct HostSampler {
    platform: Arc<dyn HostPlatform>,
    topology: CoreTopology,
    cpu: CpuIdentity,
    total_memory: u64,
    prev_host: Option<TickSnapshot>,
    prev_cores: Vec<TickSnapshot>,
    cpu_history: RollingHistory<f64>,
    core_history: PerCoreHistory,
    load_history: RollingHistory<LoadAverage>,
    context_switches: CounterRate,
    stats: HostStats,
}

impl HostSampler {
    /// Detects topology, CPU identity and total RAM once.
    pub fn new(platform: Arc<dyn HostPlatform>, history_capacity: usize) -> Self {
        let topology = CoreTopology::detect(platform.as_ref());
        let cpu = platform.cpu_identity();
        let total_memory = platform.total_memory_bytes().unwrap_or(0);
        log::debug!(
            "host sampler on {}: {} cores, {} bytes RAM",
            platform.name(),
            topology.total_cores(),
            total_memory
        );
        Self {
            platform,
            topology,
            cpu,
            total_memory,
            prev_host: None,
            prev_cores: Vec::new(),
            cpu_history: RollingHistory::new(history_capacity),
            core_history: PerCoreHistory::new(history_capacity),
            load_history: RollingHistory::new(history_capacity),
            context_switches: CounterRate::new(),
            stats: HostStats {
                ram_total_bytes: total_memory,
                ..HostStats::default()
            },
        }
    }

    pub fn topology(&self) -> CoreTopology {
        self.topology
    }

    pub fn cpu_identity(&self) -> &CpuIdentity {
        &self.cpu
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    pub fn cpu_history(&self) -> &RollingHistory<f64> {
        &self.cpu_history
    }

    pub fn core_history(&self) -> &PerCoreHistory {
        &self.core_history
    }

    /// Run one sampling cycle.
    pub fn refresh(&mut self) {
        let p = Arc::clone(&self.platform);

        // Aggregate CPU.
        let cpu_usage = match p.host_ticks() {
            Some(curr) => {
                let usage = self
                    .prev_host
                    .map_or(0.0, |prev| utilization(&prev, &curr));
                self.prev_host = Some(curr);
                usage
            }
            None => 0.0,
        };
        self.cpu_history.push(cpu_usage);

        // Per-core CPU; previous snapshots are allocated on first sight.
        let core_usage = match p.per_core_ticks() {
            Some(curr) => {
                let usage = per_core_utilization(&self.prev_cores, &curr);
                self.prev_cores = curr;
                usage
            }
            None => Vec::new(),
        };
        self.core_history.record(&core_usage);

        let ram_used_bytes = p.memory_pages().map_or(0, |m| m.used_bytes());

        let load = p.load_average().unwrap_or_default();
        self.load_history.push(load);

        let uptime_secs = p.uptime().map_or(0, |d| d.as_secs());
        let thermal = p.thermal_state().unwrap_or_default();
        let process_count = p.process_count().unwrap_or(0);
        let context_switch_rate = p
            .context_switch_total()
            .map_or(0, |total| self.context_switches.update(total));

        let gpu_utilization = p.gpu_utilization().unwrap_or(0.0);
        let battery_amperage_ma = p.battery_amperage_ma().unwrap_or(0);
        let neural_engine_active = p.neural_engine_active().unwrap_or(false);

        self.stats = HostStats {
            cycle: self.stats.cycle + 1,
            cpu_usage,
            core_usage,
            ram_used_bytes,
            ram_total_bytes: self.total_memory,
            load,
            uptime_secs,
            thermal,
            process_count,
            context_switch_rate,
            gpu_utilization,
            battery_amperage_ma,
            neural_engine_active,
        };
        log::trace!(
            "host cycle {}: cpu {:.1}%, {} procs",
            self.stats.cycle,
            cpu_usage,
            process_count
        );
    }

    pub fn publish(&self) -> HostTelemetry {
        HostTelemetry {
            stats: self.stats.clone(),
            topology: Some(self.topology),
            cpu: self.cpu.clone(),
            cpu_history: self.cpu_history.snapshot(),
            core_history: self.core_history.snapshot(),
            load_history: self.load_history.snapshot(),
        }
    }
}
