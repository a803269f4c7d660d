//! Host platform layer.
//!
//! Every OS query the samplers make goes through [`HostPlatform`]. Each method
//! is best-effort: `None` means "not available right now" and the caller
//! substitutes the zero value. The default method bodies return `None`, so a
//! platform only implements what it can actually observe.
//!
//! [`native`] picks the implementation for the compile target: Darwin
//! (mach/libproc/IOKit registry), Linux (procfs/sysfs), or a null platform.

pub mod helpers;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::counters::TickSnapshot;
use crate::processes::{AppEntry, ProcessUsage};
use crate::topology::CpuIdentity;

/// Resident memory page counters plus the page size to convert them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryPages {
    pub active: u64,
    pub wired: u64,
    pub page_size: u64,
}

impl MemoryPages {
    /// Used RAM approximation: active + wired. Compressed and cached pages
    /// are not counted as used.
    pub fn used_bytes(&self) -> u64 {
        self.active
            .saturating_add(self.wired)
            .saturating_mul(self.page_size)
    }
}

/// 1/5/15 minute load averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// System thermal pressure, ordered from best to worst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    /// Map an ordinal level (0 nominal .. 3+ critical).
    pub fn from_level(level: u64) -> Self {
        match level {
            0 => Self::Nominal,
            1 => Self::Fair,
            2 => Self::Serious,
            _ => Self::Critical,
        }
    }

    /// Parse the labels used by the thermal notification API and by
    /// `powermetrics` (`Nominal`, `Moderate`, `Heavy`, `Trapping`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "nominal" | "normal" => Some(Self::Nominal),
            "fair" | "moderate" | "light" => Some(Self::Fair),
            "serious" | "heavy" => Some(Self::Serious),
            "critical" | "trapping" | "sleeping" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Nominal => 0,
            Self::Fair => 1,
            Self::Serious => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for ThermalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nominal => write!(f, "nominal"),
            Self::Fair => write!(f, "fair"),
            Self::Serious => write!(f, "serious"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Internal battery state from the power-source list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level, 0.0 to 1.0.
    pub level: f64,
    pub charging: bool,
    /// Minutes to empty, -1 if unknown.
    pub minutes_remaining: i64,
}

impl Default for BatteryStatus {
    fn default() -> Self {
        Self {
            level: 0.0,
            charging: false,
            minutes_remaining: -1,
        }
    }
}

/// Source of every host observation the samplers consume.
pub trait HostPlatform: Send + Sync {
    /// Short name for logs (`"darwin"`, `"linux"`, ...).
    fn name(&self) -> &'static str;

    /// Host-aggregate cumulative CPU ticks.
    fn host_ticks(&self) -> Option<TickSnapshot> {
        None
    }

    /// Per-logical-core cumulative CPU ticks, kernel order, one batch.
    fn per_core_ticks(&self) -> Option<Vec<TickSnapshot>> {
        None
    }

    /// Number of logical CPUs.
    fn logical_cpu_count(&self) -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    }

    /// Logical CPUs at a performance level (0 = performance, 1 = efficiency).
    fn perf_level_cpu_count(&self, _level: u32) -> Option<usize> {
        None
    }

    /// Brand string, cache sizes, feature flags.
    fn cpu_identity(&self) -> CpuIdentity {
        CpuIdentity {
            logical_cpus: self.logical_cpu_count(),
            ..CpuIdentity::default()
        }
    }

    /// Physical memory in bytes.
    fn total_memory_bytes(&self) -> Option<u64> {
        None
    }

    fn memory_pages(&self) -> Option<MemoryPages> {
        None
    }

    fn load_average(&self) -> Option<LoadAverage> {
        None
    }

    fn uptime(&self) -> Option<Duration> {
        None
    }

    fn thermal_state(&self) -> Option<ThermalState> {
        None
    }

    /// Process count from the process-listing syscall (no enumeration).
    fn process_count(&self) -> Option<usize> {
        None
    }

    /// Sum of per-process context-switch counters across every PID.
    fn context_switch_total(&self) -> Option<u64> {
        None
    }

    /// Utilization (percent) of the first accelerator device.
    fn gpu_utilization(&self) -> Option<f64> {
        None
    }

    /// Instantaneous battery current in mA; negative while discharging.
    fn battery_amperage_ma(&self) -> Option<i64> {
        None
    }

    /// Whether the neural engine co-processor is powered up.
    fn neural_engine_active(&self) -> Option<bool> {
        None
    }

    /// Level / charging / time remaining of the internal battery.
    fn battery_status(&self) -> Option<BatteryStatus> {
        None
    }

    /// Regular (user-facing) applications currently running.
    fn running_apps(&self) -> Vec<AppEntry> {
        Vec::new()
    }

    /// `pid → (owning user, %cpu)` from the process-listing accessory.
    fn process_usage(&self) -> HashMap<u32, ProcessUsage> {
        HashMap::new()
    }
}

/// Platform that observes nothing. Used on unsupported targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlatform;

impl HostPlatform for NullPlatform {
    fn name(&self) -> &'static str {
        "null"
    }
}

/// The platform implementation for the compile target.
pub fn native(command_timeout: Duration) -> Arc<dyn HostPlatform> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::DarwinPlatform::new(command_timeout))
    }
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxPlatform::new(command_timeout))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = command_timeout;
        Arc::new(NullPlatform)
    }
}
