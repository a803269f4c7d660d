//! # liquidmon-core
//!
//! Live host telemetry for Apple Silicon Macs, with a Linux fallback for
//! development machines.
//!
//! ## Quick Start
//!
//! ```no_run
//! use liquidmon_core::{Monitor, MonitorConfig};
//!
//! let mut monitor = Monitor::new(MonitorConfig::from_env());
//! monitor.start().expect("spawn sampling threads");
//! std::thread::sleep(std::time::Duration::from_secs(2));
//!
//! let snap = monitor.snapshot();
//! println!("cpu {:.1}%", snap.host.stats.cpu_usage);
//! monitor.stop();
//! ```
//!
//! ## Architecture
//!
//! Platform queries → samplers (tick deltas, rolling histories) → shared store → presentation
//!
//! Three independent schedules feed the [`TelemetryStore`]:
//! - **host** (1 Hz): CPU ticks, memory, load, thermal, GPU, battery current
//! - **processes** (1 Hz): user apps joined with `ps` CPU usage, top-N summary
//! - **battery** (0.2 Hz): charge level and time remaining
//!
//! Package power and cluster clocks come from a privileged `powermetrics`
//! daemon whose rolling plist output is decoded on a worker thread; see
//! [`power`].

pub mod config;
pub mod counters;
pub mod history;
pub mod monitor;
pub mod platform;
pub mod power;
pub mod processes;
pub mod sampler;
pub mod state;
pub mod topology;

pub use config::{MonitorConfig, SamplerConfig};
pub use counters::{CounterRate, TickSnapshot, per_core_utilization, used_fraction, utilization};
pub use history::{DEFAULT_HISTORY_CAPACITY, PerCoreHistory, RollingHistory, TrailingWindow};
pub use monitor::{Monitor, PeriodicTask};
pub use platform::{
    BatteryStatus, HostPlatform, LoadAverage, MemoryPages, NullPlatform, ThermalState,
};
pub use power::{
    ClusterKind, ClusterSample, DecodeError, LaunchError, PowerSample, PowerSlot,
    PrivilegedLauncher, PrivilegedSampleSource, PrivilegedSession, SamplerCommand, SessionState,
};
pub use processes::{
    AppEntry, AppUsage, OTHERS_LABEL, ProcessAggregator, ProcessHistorySnapshot, ProcessRecord,
    ProcessTelemetry, ProcessUsage, Rgb, stable_color, top_usage,
};
pub use sampler::{HostSampler, HostStats, HostTelemetry};
pub use state::{TelemetrySnapshot, TelemetryStore};
pub use topology::{CoreTopology, CpuIdentity};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
